//! Owns a memory-mapped byte range and its backing file handle.
//!
//! [`MappedRegion`] is the only place in this crate that touches `mmap`,
//! `File`, or raw pointers. Everything above it — [`crate::single`] and
//! [`crate::multi`] — talks to the file only through atomic load/store/CAS
//! on naturally aligned 8-byte offsets, and bulk byte copies.

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{Error, Result};

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A contiguous mapped byte range backed by a single file.
///
/// Close is idempotent: once closed, the mapping and the file handle are
/// both released and further calls are no-ops. `close`/`truncate_and_close`
/// take `&self` rather than `&mut self` — rolling coordinators hold regions
/// behind a shared `Arc` and need to close them without first proving sole
/// ownership, so the one-time release is gated by `closed` instead of by the
/// borrow checker.
pub struct MappedRegion {
    path: PathBuf,
    len: u64,
    file: UnsafeCell<Option<File>>,
    mmap: UnsafeCell<Option<MmapMut>>,
    closed: AtomicBool,
}

// SAFETY: every accessor either (a) only reads through the mapped bytes
// behind an already-initialized `MmapMut`, never touching the `Option`
// wrapper itself (`atomic_ptr`, `read_bytes`, `put_bytes`, `with_mut_slice`),
// or (b) is reached only after winning the `closed` compare-and-swap, which
// admits exactly one caller, ever, into the code that mutates the `Option`s.
// Bucket (a) and (b) never run concurrently on the same region because (b)
// only fires once the region is already unreachable for further I/O calls
// by every well-behaved caller in this crate (the rolling coordinators stop
// issuing writes against a file before closing it).
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Create a new backing file of exactly `length` bytes and map it.
    ///
    /// Fails with [`Error::AlreadyExists`] if `path` already exists — callers
    /// must not reopen an existing file through this constructor.
    pub fn create_empty(path: &Path, length: u64, fill_zero: bool) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyExists {
                path: path.to_path_buf(),
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        file.set_len(length).map_err(|e| io_err(path, e))?;

        // SAFETY: `file` was just created and sized to `length`; no other
        // process can hold a reference to it yet, so mapping the whole
        // region is valid.
        let mut mmap = unsafe {
            MmapOptions::new()
                .len(length as usize)
                .map_mut(&file)
                .map_err(|e| io_err(path, e))?
        };

        if fill_zero {
            mmap.fill(0);
        }

        Ok(Self {
            path: path.to_path_buf(),
            len: length,
            file: UnsafeCell::new(Some(file)),
            mmap: UnsafeCell::new(Some(mmap)),
            closed: AtomicBool::new(false),
        })
    }

    /// Map an existing file in its entirety.
    pub fn map_existing(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;

        let len = file.metadata().map_err(|e| io_err(path, e))?.len();

        // SAFETY: the file exists and is opened read/write; mapping its
        // current length is always valid.
        let mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|e| io_err(path, e))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            len,
            file: UnsafeCell::new(Some(file)),
            mmap: UnsafeCell::new(Some(mmap)),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the mapped region in bytes, even after closing.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if the region has already been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mmap_ref(&self) -> &MmapMut {
        // SAFETY: only ever `None` after `closed` is set, and every caller
        // of this method (the atomic/bulk-copy paths) is only reachable
        // before that happens.
        unsafe { (*self.mmap.get()).as_ref() }.expect("region already closed")
    }

    fn atomic_ptr(&self, offset: u64) -> *const AtomicU64 {
        debug_assert_eq!(offset % 8, 0, "atomic access must be 8-byte aligned");
        let mmap = self.mmap_ref();
        debug_assert!((offset as usize) + 8 <= mmap.len());
        // SAFETY: offset is 8-byte aligned and within bounds (checked above),
        // and `AtomicU64` has the same layout as `u64`.
        unsafe { mmap.as_ptr().add(offset as usize) as *const AtomicU64 }
    }

    /// Atomically load the 64-bit word at `offset`.
    pub fn load(&self, offset: u64, order: Ordering) -> u64 {
        // SAFETY: pointer is valid and aligned per `atomic_ptr`.
        unsafe { (*self.atomic_ptr(offset)).load(order) }
    }

    /// Atomically store `value` at `offset`.
    pub fn store(&self, offset: u64, value: u64, order: Ordering) {
        // SAFETY: pointer is valid and aligned per `atomic_ptr`.
        unsafe { (*self.atomic_ptr(offset)).store(value, order) }
    }

    /// Compare-and-swap the 64-bit word at `offset`.
    pub fn compare_exchange(
        &self,
        offset: u64,
        current: u64,
        new: u64,
        success: Ordering,
        failure: Ordering,
    ) -> std::result::Result<u64, u64> {
        // SAFETY: pointer is valid and aligned per `atomic_ptr`.
        unsafe { (*self.atomic_ptr(offset)).compare_exchange(current, new, success, failure) }
    }

    /// Bulk-copy `len` bytes out of the mapped region starting at `offset`.
    pub fn read_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        let mmap = self.mmap_ref();
        let start = offset as usize;
        let end = start + len;
        assert!(end <= mmap.len(), "read_bytes out of bounds");
        mmap[start..end].to_vec()
    }

    /// Bulk-copy `src` into the mapped region starting at `dst_offset`.
    ///
    /// Panics (via `expect`) if `src` does not fit — callers are expected to
    /// have validated the write against capacity before reaching here.
    pub fn put_bytes(&self, dst_offset: u64, src: &[u8]) {
        let mmap = self.mmap_ref();
        let start = dst_offset as usize;
        let end = start + src.len();
        assert!(end <= mmap.len(), "put_bytes out of bounds");
        // SAFETY: the destination range was just bounds-checked. Concurrent
        // writers never overlap because reservation hands out disjoint
        // ranges; the mutable-through-shared-reference pattern here mirrors
        // memmap2's own `MmapMut::as_ptr` + `copy_nonoverlapping` idiom.
        unsafe {
            let dst = mmap.as_ptr().add(start) as *mut u8;
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
    }

    /// Invoke `f` with a mutable view of `len` bytes starting at `offset`,
    /// for callers supplying their own direct-buffer writer.
    pub fn with_mut_slice<F: FnOnce(&mut [u8])>(&self, offset: u64, len: usize, f: F) {
        let mmap = self.mmap_ref();
        let start = offset as usize;
        let end = start + len;
        assert!(end <= mmap.len(), "with_mut_slice out of bounds");
        // SAFETY: range bounds-checked above; disjoint from every other
        // writer's range by the same reservation-engine invariant as
        // `put_bytes`.
        let slice = unsafe { std::slice::from_raw_parts_mut(mmap.as_ptr().add(start) as *mut u8, len) };
        f(slice);
    }

    fn flush_and_drop_mmap(&self) -> Result<()> {
        // SAFETY: reached only by the single caller that won the `closed`
        // CAS in `close`/`truncate_and_close`.
        let mmap = unsafe { (*self.mmap.get()).take() };
        if let Some(mmap) = mmap {
            mmap.flush().map_err(|e| io_err(&self.path, e))?;
        }
        Ok(())
    }

    /// Flush and unmap, then truncate the backing file to `new_len` before
    /// closing the handle. Idempotent: calling this (or [`Self::close`])
    /// again is a no-op, from any holder of a shared reference.
    pub fn truncate_and_close(&self, new_len: u64) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.flush_and_drop_mmap()?;
        // SAFETY: reached only by the single caller that won the CAS above.
        let file = unsafe { (*self.file.get()).take() };
        if let Some(file) = file {
            file.set_len(new_len).map_err(|e| io_err(&self.path, e))?;
        }
        Ok(())
    }

    /// Flush, unmap, and close without truncating. Idempotent, from any
    /// holder of a shared reference.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.flush_and_drop_mmap()?;
        // SAFETY: reached only by the single caller that won the CAS above.
        unsafe {
            (*self.file.get()).take();
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(err) = self.close() {
                tracing::warn!(path = ?self.path, %err, "failed to close mapped region on drop");
            }
        }
    }
}
