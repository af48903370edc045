//! Multi-process append-only file: same reservation protocol as
//! [`crate::single`], but the offset and completion counters live inside a
//! 32-byte in-file header so any process can reopen and keep writing.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::encoding::{self, ByteOrder};
use crate::error::{Error, Result};
use crate::region::MappedRegion;
use crate::single::NULL_OFFSET;

/// Size, in bytes, of the in-file header (see spec.md §3 for the layout).
pub const HEADER_SIZE: u64 = 32;

const DATA_START: u64 = 0;
const FILE_SIZE: u64 = 8;
const NEXT_WRITE: u64 = 16;
const WRITE_COMPLETE: u64 = 24;

/// A file whose reservation cursors live in an in-file header, so the file
/// can be reopened by any cooperating process.
pub struct MultiProcessFile {
    region: MappedRegion,
    local_reserved: AtomicU64,
    local_completed: AtomicU64,
    /// Set only by the instance whose reservation triggered overflow; only
    /// that instance may truncate at close, to avoid cutting off bytes
    /// another process already reserved.
    is_truncator: AtomicBool,
}

impl MultiProcessFile {
    /// Create-or-open `path` and run the header initialization handshake.
    ///
    /// Nested CAS: only the process that wins `data_start: 0 -> 32` goes on
    /// to initialize `next_write` and `write_complete`. A late opener that
    /// finds `data_start == 32` leaves the other fields alone — they were
    /// either set by the same winner or are already non-zero.
    pub fn map(path: &Path, capacity: u64) -> Result<Self> {
        let region = if path.exists() {
            MappedRegion::map_existing(path)?
        } else {
            MappedRegion::create_empty(path, capacity + HEADER_SIZE, false)?
        };

        if region
            .compare_exchange(DATA_START, 0, HEADER_SIZE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = region.compare_exchange(
                NEXT_WRITE,
                0,
                HEADER_SIZE,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            let _ = region.compare_exchange(
                WRITE_COMPLETE,
                0,
                HEADER_SIZE,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        if region.load(DATA_START, Ordering::Acquire) != HEADER_SIZE {
            return Err(Error::InvalidHeader {
                path: region.path().to_path_buf(),
                reason: "data_start not initialized after mapping".into(),
            });
        }

        Ok(Self {
            region,
            local_reserved: AtomicU64::new(0),
            local_completed: AtomicU64::new(0),
            is_truncator: AtomicBool::new(false),
        })
    }

    /// Usable capacity: the backing file's length minus the header, not
    /// the header's own (unrelated) `file_size` field.
    pub fn capacity(&self) -> u64 {
        self.region.len() - HEADER_SIZE
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// True if a reservation could still fit without rolling.
    pub fn has_available_capacity(&self) -> bool {
        self.region.load(NEXT_WRITE, Ordering::Acquire) < self.region.len()
    }

    fn fetch_add_header(&self, offset: u64, delta: u64) -> u64 {
        loop {
            let cur = self.region.load(offset, Ordering::Acquire);
            let new = cur.wrapping_add(delta);
            if self
                .region
                .compare_exchange(offset, cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return cur;
            }
        }
    }

    /// Carve out `length` bytes from the shared header cursor.
    ///
    /// `cur` strictly greater than `total_len` means some earlier reserver
    /// already ran the overflow branch below and designated the truncator;
    /// `cur == total_len` (zero bytes left) still has to pass through that
    /// branch once more so `file_size`/`is_truncator` get set at all.
    pub fn reserve(&self, length: u64) -> Result<i64> {
        let total_len = self.region.len();
        loop {
            let cur = self.region.load(NEXT_WRITE, Ordering::Acquire);
            if cur > total_len {
                return Ok(NULL_OFFSET);
            }
            let new = cur + length;
            match self.region.compare_exchange(
                NEXT_WRITE,
                cur,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.local_reserved.fetch_add(length, Ordering::Relaxed);
                    if new > total_len {
                        self.commit(length);
                        self.region.store(FILE_SIZE, cur, Ordering::Release);
                        self.is_truncator.store(true, Ordering::Release);
                        return Ok(NULL_OFFSET);
                    }
                    return Ok(cur as i64);
                }
                Err(_) => continue,
            }
        }
    }

    /// Signal that a previously reserved range of `length` bytes has been
    /// fully written. Shared header-wide cursor, visible to every process
    /// mapping this file.
    pub fn commit(&self, length: u64) {
        self.fetch_add_header(WRITE_COMPLETE, length);
        self.local_completed.fetch_add(length, Ordering::Relaxed);
    }

    /// Reserve, copy `payload` into the reserved range, then commit.
    pub fn write(&self, payload: &[u8]) -> Result<i64> {
        let capacity = self.capacity();
        if payload.len() as u64 > capacity {
            return Err(Error::CapacityExceededSingleWrite {
                length: payload.len() as u64,
                capacity,
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

    /// Write the unread remainder of `cursor`, leaving its position
    /// unchanged.
    pub fn write_from_cursor<T: AsRef<[u8]>>(&self, cursor: &mut Cursor<T>) -> Result<i64> {
        let pos = cursor.position() as usize;
        let remaining = &cursor.get_ref().as_ref()[pos..];
        let offset = self.write(remaining)?;
        cursor.set_position(pos as u64);
        Ok(offset)
    }

    /// Reserve `len` bytes and hand the caller a direct mutable view of the
    /// reserved range.
    pub fn write_with<F: FnOnce(&mut [u8])>(&self, len: u64, writer: F) -> Result<i64> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(Error::CapacityExceededSingleWrite { length: len, capacity });
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
    /// yet committed. Local to this instance, not process-wide.
    pub fn is_pending(&self) -> bool {
        self.local_reserved.load(Ordering::Acquire) != self.local_completed.load(Ordering::Acquire)
    }

    /// True iff `write_complete == next_write >= file_size > 0`.
    pub fn is_finished(&self) -> bool {
        let complete = self.region.load(WRITE_COMPLETE, Ordering::Acquire);
        let next = self.region.load(NEXT_WRITE, Ordering::Acquire);
        let file_size = self.region.load(FILE_SIZE, Ordering::Acquire);
        complete == next && complete >= file_size && file_size > 0
    }

    /// Force finalization by reserving more than the remaining capacity.
    pub fn finish(&self) -> Result<()> {
        self.reserve(i32::MAX as u64)?;
        Ok(())
    }

    /// Close the file. Only the instance that triggered overflow truncates
    /// the backing file to the header's `file_size`; others simply unmap,
    /// so a process that never saw overflow never clips bytes another
    /// writer reserved after it stopped watching. Callable through a shared
    /// reference.
    pub fn close(&self) -> Result<()> {
        if self.is_pending() {
            return Err(Error::ClosePending {
                path: self.region.path().to_path_buf(),
            });
        }
        if self.is_truncator.load(Ordering::Acquire) {
            let final_size = self.region.load(FILE_SIZE, Ordering::Acquire);
            self.region.truncate_and_close(final_size)
        } else {
            self.region.close()
        }
    }
}

struct CommitGuard<'a> {
    file: &'a MultiProcessFile,
    length: u64,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.file.commit(self.length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn header_initializes_to_32() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 128).unwrap();
        assert_eq!(file.region.load(DATA_START, Ordering::Acquire), HEADER_SIZE);
        assert_eq!(file.region.load(NEXT_WRITE, Ordering::Acquire), HEADER_SIZE);
        assert_eq!(
            file.region.load(WRITE_COMPLETE, Ordering::Acquire),
            HEADER_SIZE
        );
        assert_eq!(file.capacity(), 128);
    }

    #[test]
    fn two_writers_share_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let first = MultiProcessFile::map(&path, 128).unwrap();
        let second = MultiProcessFile::map(&path, 128).unwrap();

        let a = first.write(b"Hello ").unwrap();
        let b = second.write(b"World!").unwrap();
        assert_eq!(a, HEADER_SIZE as i64);
        assert_eq!(b, HEADER_SIZE as i64 + 6);
    }

    #[test]
    fn late_opener_finds_fully_initialized_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        {
            let _first = MultiProcessFile::map(&path, 128).unwrap();
        }
        let second = MultiProcessFile::map(&path, 128).unwrap();
        assert_eq!(
            second.region.load(DATA_START, Ordering::Acquire),
            HEADER_SIZE
        );
    }

    #[test]
    fn overflow_sets_file_size_and_designates_truncator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 10).unwrap();
        // Lands flush with capacity; zero bytes remain after this call, so
        // the very next reservation attempt is the one that overflows.
        assert_eq!(file.write(b"0123456789").unwrap(), HEADER_SIZE as i64);
        assert_eq!(file.write(b"x").unwrap(), NULL_OFFSET);
        assert!(file.is_truncator.load(Ordering::Acquire));
    }

    #[test]
    fn mid_file_overflow_also_designates_truncator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 10).unwrap();
        assert_eq!(file.write(b"0123456").unwrap(), HEADER_SIZE as i64);
        assert_eq!(file.write(b"abcdefg").unwrap(), NULL_OFFSET);
        assert!(file.is_truncator.load(Ordering::Acquire));
        assert_eq!(
            file.region.load(FILE_SIZE, Ordering::Acquire),
            HEADER_SIZE + 7
        );
    }

    #[test]
    fn write_ascii_replaces_non_ascii_with_question_mark() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 128).unwrap();
        let offset = file.write_ascii("café").unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[offset as usize..offset as usize + 4], b"caf?");
    }

    #[test]
    fn write_chars_round_trips_as_utf16() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 128).unwrap();
        let offset = file.write_chars("hi", ByteOrder::Big).unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        let units: Vec<u16> = data[offset as usize..offset as usize + 4]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "hi");
    }

    #[test]
    fn write_from_cursor_leaves_position_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = MultiProcessFile::map(&path, 128).unwrap();
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
        let file = MultiProcessFile::map(&path, 128).unwrap();
        let offset = file
            .write_with(4, |buf| buf.copy_from_slice(b"ABCD"))
            .unwrap();
        file.close().unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[offset as usize..offset as usize + 4], b"ABCD");
    }
}
