//! Single-process append-only file: reservation engine with no on-disk
//! state. Offset and completion counters live purely in memory, so this
//! variant cannot be reopened from another process — the moment the
//! process exits, the bookkeeping is gone and the file is simply bytes.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::encoding::{self, ByteOrder};
use crate::error::{Error, Result};
use crate::region::MappedRegion;

/// Sentinel returned when a reservation could not fit in the current file.
pub const NULL_OFFSET: i64 = -1;

/// An append-only file with no in-file header, used when a single process
/// owns the whole file and no other process needs to reopen it.
pub struct SingleProcessFile {
    region: MappedRegion,
    capacity: u64,
    next_write_offset: AtomicU64,
    write_complete: AtomicU64,
    final_file_size: AtomicI64,
    local_reserved: AtomicU64,
    local_completed: AtomicU64,
}

impl SingleProcessFile {
    /// Create a brand-new file of `capacity` bytes.
    pub fn create(path: &Path, capacity: u64, fill_zero: bool) -> Result<Self> {
        let region = MappedRegion::create_empty(path, capacity, fill_zero)?;
        Ok(Self {
            region,
            capacity,
            next_write_offset: AtomicU64::new(0),
            write_complete: AtomicU64::new(0),
            final_file_size: AtomicI64::new(-1),
            local_reserved: AtomicU64::new(0),
            local_completed: AtomicU64::new(0),
        })
    }

    /// Usable capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// True if a reservation could still fit without rolling.
    pub fn has_available_capacity(&self) -> bool {
        self.next_write_offset.load(Ordering::Acquire) < self.capacity
    }

    /// Carve out `length` bytes, returning the offset to write at, or
    /// [`NULL_OFFSET`] if the file has no more room.
    ///
    /// The first reservation to push `next_write_offset` past `capacity`
    /// is the designated finalizer: it phantom-commits its own (full,
    /// unclamped) `length` so `write_complete` can still catch up, and
    /// records `capacity`'s effective end in `final_file_size` for
    /// truncation at close. Per spec design note 9(b), the phantom commit
    /// uses the caller's full requested length rather than the partial
    /// remainder that actually fit.
    ///
    /// `cur` strictly greater than `capacity` means some earlier call
    /// already ran the finalizing branch below and recorded
    /// `final_file_size`; only then is a fast NULL warranted. A file
    /// sitting exactly at `cur == capacity` (a prior write landed flush
    /// with the boundary) still needs one more call to pass through the
    /// finalizing branch, or it would never set `final_file_size` at all.
    pub fn reserve(&self, length: u64) -> Result<i64> {
        loop {
            let cur = self.next_write_offset.load(Ordering::Acquire);
            if cur > self.capacity {
                return Ok(NULL_OFFSET);
            }
            let new = cur + length;
            match self.next_write_offset.compare_exchange_weak(
                cur,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.local_reserved.fetch_add(length, Ordering::Relaxed);
                    if new > self.capacity {
                        self.commit(length);
                        self.final_file_size.store(cur as i64, Ordering::Release);
                        return Ok(NULL_OFFSET);
                    }
                    return Ok(cur as i64);
                }
                Err(_) => continue,
            }
        }
    }

    /// Bulk-copy `src` into the reserved range starting at `dst_offset`.
    ///
    /// Exposed alongside [`Self::reserve`] and [`Self::commit`] for callers
    /// that need sub-payload control over how a reservation's bytes are
    /// laid out — e.g. the framing wrapper, which must write its payload
    /// before its length header rather than in one bulk copy.
    pub fn put_bytes(&self, dst_offset: u64, src: &[u8]) {
        self.region.put_bytes(dst_offset, src);
    }

    /// Signal that a previously reserved range of `length` bytes has been
    /// fully written.
    pub fn commit(&self, length: u64) {
        self.write_complete.fetch_add(length, Ordering::Release);
        self.local_completed.fetch_add(length, Ordering::Relaxed);
    }

    /// Reserve, copy `payload` into the reserved range, then commit — in
    /// that exact order. The commit runs even if the copy step were to
    /// unwind, via a scoped drop guard, so `write_complete` can never get
    /// stuck behind a reservation whose payload never lands.
    pub fn write(&self, payload: &[u8]) -> Result<i64> {
        if payload.len() as u64 > self.capacity {
            return Err(Error::CapacityExceededSingleWrite {
                length: payload.len() as u64,
                capacity: self.capacity,
            });
        }

        let offset = self.reserve(payload.len() as u64)?;
        if offset == NULL_OFFSET {
            return Ok(NULL_OFFSET);
        }

        let _commit_on_drop = CommitGuard {
            file: self,
            length: payload.len() as u64,
        };
        self.region.put_bytes(offset as u64, payload);
        Ok(offset)
    }

    /// Write `text` as ASCII, replacing any non-ASCII code point with `?`.
    pub fn write_ascii(&self, text: &str) -> Result<i64> {
        self.write(&encoding::ascii_lossy(text))
    }

    /// Write `text` as UTF-16 code units in `order`.
    pub fn write_chars(&self, text: &str, order: ByteOrder) -> Result<i64> {
        self.write(&encoding::utf16_bytes(text, order))
    }

    /// Write the unread remainder of `cursor` (`cursor.position()..end`),
    /// leaving the cursor's position unchanged — the writer-surface
    /// equivalent of passing a buffer whose own position must survive the
    /// call.
    pub fn write_from_cursor<T: AsRef<[u8]>>(&self, cursor: &mut Cursor<T>) -> Result<i64> {
        let pos = cursor.position() as usize;
        let remaining = &cursor.get_ref().as_ref()[pos..];
        let offset = self.write(remaining)?;
        cursor.set_position(pos as u64);
        Ok(offset)
    }

    /// Reserve `len` bytes and hand the caller a direct mutable view of the
    /// reserved range via `writer`. The caller must fill the entire slice;
    /// the commit fires on return (even on panic) regardless.
    pub fn write_with<F: FnOnce(&mut [u8])>(&self, len: u64, writer: F) -> Result<i64> {
        if len > self.capacity {
            return Err(Error::CapacityExceededSingleWrite {
                length: len,
                capacity: self.capacity,
            });
        }

        let offset = self.reserve(len)?;
        if offset == NULL_OFFSET {
            return Ok(NULL_OFFSET);
        }

        let _commit_on_drop = CommitGuard { file: self, length: len };
        self.region.with_mut_slice(offset as u64, len as usize, writer);
        Ok(offset)
    }

    /// True iff this instance has reservations outstanding that have not
    /// yet committed. Local to this instance, not file-wide.
    pub fn is_pending(&self) -> bool {
        self.local_reserved.load(Ordering::Acquire) != self.local_completed.load(Ordering::Acquire)
    }

    /// True iff the file is full and every reservation against it has
    /// committed.
    pub fn is_finished(&self) -> bool {
        let complete = self.write_complete.load(Ordering::Acquire);
        let next = self.next_write_offset.load(Ordering::Acquire);
        let final_size = self.final_file_size.load(Ordering::Acquire);
        complete == next && complete >= self.capacity && final_size > 0
    }

    /// Force finalization by reserving more than the remaining capacity.
    pub fn finish(&self) -> Result<()> {
        self.reserve(i32::MAX as u64)?;
        Ok(())
    }

    /// Truncate to `final_file_size` (if the overflow path set one), unmap,
    /// and close. Fails if writes issued by this instance are still
    /// pending. Callable through a shared reference — rolling coordinators
    /// hold files behind `Arc` and close them without unique ownership.
    pub fn close(&self) -> Result<()> {
        if self.is_pending() {
            return Err(Error::ClosePending {
                path: self.region.path().to_path_buf(),
            });
        }
        let final_size = self.final_file_size.load(Ordering::Acquire);
        if final_size >= 0 {
            self.region.truncate_and_close(final_size as u64)
        } else {
            self.region.close()
        }
    }
}

struct CommitGuard<'a> {
    file: &'a SingleProcessFile,
    length: u64,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.file.commit(self.length);
    }
}

/// Path helper shared by single- and multi-process overflow handling: given
/// a sentinel-bearing reservation result, report whether it represents "no
/// room" rather than a real offset.
pub fn is_null_offset(offset: i64) -> bool {
    offset == NULL_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn small_write_lands_at_offset_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        let offset = file.write(b"Hello World!").unwrap();
        assert_eq!(offset, 0);
        assert!(!file.is_finished());
    }

    #[test]
    fn overflow_split_returns_null_for_third_writer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 20, false).unwrap();
        assert_eq!(file.write(b"buffer1").unwrap(), 0);
        assert_eq!(file.write(b"buffer2").unwrap(), 7);
        assert_eq!(file.write(b"buffer3").unwrap(), NULL_OFFSET);
    }

    #[test]
    fn write_longer_than_capacity_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 8, false).unwrap();
        let err = file.write(b"too long for this file").unwrap_err();
        assert!(matches!(err, Error::CapacityExceededSingleWrite { .. }));
    }

    #[test]
    fn close_fails_while_pending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        file.reserve(4).unwrap();
        assert!(file.is_pending());
        assert!(matches!(file.close(), Err(Error::ClosePending { .. })));
    }

    #[test]
    fn exact_capacity_then_null() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 12, false).unwrap();
        assert_eq!(file.write(b"Hello World!").unwrap(), 0);
        // The exact-fill write above lands flush with capacity; the next
        // reservation attempt is what actually runs the finalizing branch
        // and sets final_file_size.
        assert_eq!(file.write(b"x").unwrap(), NULL_OFFSET);
        assert!(file.is_finished());
    }

    #[test]
    fn write_ascii_replaces_non_ascii_with_question_mark() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        let offset = file.write_ascii("café").unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[offset as usize..offset as usize + 4], b"caf?");
    }

    #[test]
    fn write_chars_round_trips_as_utf16() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        let text = "hi\u{1F980}";
        let byte_len = text.encode_utf16().count() * 2;
        let offset = file.write_chars(text, ByteOrder::Little).unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        let units: Vec<u16> = data[offset as usize..offset as usize + byte_len]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), text);
    }

    #[test]
    fn write_from_cursor_leaves_position_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        let mut cursor = Cursor::new(b"prefixpayload".to_vec());
        cursor.set_position(6);
        let offset = file.write_from_cursor(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 6);
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[offset as usize..offset as usize + 7], b"payload");
    }

    #[test]
    fn write_with_exposes_direct_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, 128, false).unwrap();
        let offset = file
            .write_with(4, |buf| buf.copy_from_slice(b"ABCD"))
            .unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[offset as usize..offset as usize + 4], b"ABCD");
    }

    #[test]
    fn reopening_existing_path_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let _first = SingleProcessFile::create(&path, 16, false).unwrap();
        let second = SingleProcessFile::create(&path, 16, false);
        assert!(matches!(second, Err(Error::AlreadyExists { .. })));
    }
}
