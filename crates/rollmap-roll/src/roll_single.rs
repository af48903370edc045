//! Single-process rolling coordinator (component E): swaps the active file
//! when it exhausts capacity, electing exactly one writer to perform the
//! roll, with optional async close and background preallocation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rollmap_core::{FileNameProvider, SingleProcessFile, NULL_OFFSET};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::common::{next_preallocator_id, FileCompleteCallback};
use crate::error::Result;
use crate::options::RollingFileOptions;
use crate::policy::YieldPolicy;

/// Rolls a sequence of [`SingleProcessFile`]s, handing writers whichever one
/// currently has room.
pub struct SingleProcessRollingFile {
    naming: Arc<dyn FileNameProvider>,
    options: RollingFileOptions,
    on_file_complete: Option<FileCompleteCallback>,
    current: RwLock<Arc<SingleProcessFile>>,
    preallocated: RwLock<Option<Arc<SingleProcessFile>>>,
    allocating: AtomicBool,
    keep_running: Arc<AtomicBool>,
    preallocator: RwLock<Option<JoinHandle<()>>>,
}

impl SingleProcessRollingFile {
    /// Create the coordinator and map its first file.
    pub fn new(
        naming: Arc<dyn FileNameProvider>,
        options: RollingFileOptions,
        on_file_complete: Option<FileCompleteCallback>,
    ) -> Result<Arc<Self>> {
        let first = Arc::new(Self::allocate(&naming, &options)?);
        let this = Arc::new(Self {
            naming,
            options,
            on_file_complete,
            current: RwLock::new(first),
            preallocated: RwLock::new(None),
            allocating: AtomicBool::new(false),
            keep_running: Arc::new(AtomicBool::new(true)),
            preallocator: RwLock::new(None),
        });

        if this.options.preallocate {
            this.spawn_preallocator();
        }

        Ok(this)
    }

    fn allocate(
        naming: &Arc<dyn FileNameProvider>,
        options: &RollingFileOptions,
    ) -> Result<SingleProcessFile> {
        let path = naming.next_file();
        Ok(SingleProcessFile::create(
            &path,
            options.capacity(),
            options.fill_zero,
        )?)
    }

    fn spawn_preallocator(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let keep_running = Arc::clone(&this.keep_running);
        let id = next_preallocator_id();
        let handle = tokio::spawn(async move {
            debug!(preallocator_id = id, "preallocator started");
            while keep_running.load(Ordering::Acquire) {
                if this.preallocated.read().is_some() {
                    tokio::time::sleep(this.options.preallocate_check_interval).await;
                    continue;
                }
                let path = this.naming.next_file();
                match SingleProcessFile::create(&path, this.options.capacity(), this.options.fill_zero)
                {
                    Ok(file) => {
                        *this.preallocated.write() = Some(Arc::new(file));
                    }
                    Err(err) => {
                        warn!(preallocator_id = id, %err, ?path, "preallocation failed, retrying");
                        let _ = std::fs::remove_file(&path);
                        if !keep_running.load(Ordering::Acquire) {
                            break;
                        }
                    }
                }
            }
            debug!(preallocator_id = id, "preallocator stopped");
        });
        *self.preallocator.write() = Some(handle);
    }

    /// Return the file to use for the next reservation, rolling to a new
    /// file if the current one is exhausted.
    #[instrument(skip(self))]
    pub fn file_for_write(&self) -> Result<Arc<SingleProcessFile>> {
        loop {
            let current = self.current.read().clone();
            if current.has_available_capacity() {
                return Ok(current);
            }

            if self
                .allocating
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                self.options.yield_policy.relax();
                continue;
            }

            let reloaded = self.current.read().clone();
            if !Arc::ptr_eq(&reloaded, &current) {
                // another writer already rolled while we were contending
                self.allocating.store(false, Ordering::Release);
                return Ok(reloaded);
            }

            let result = self.roll_from(reloaded);
            self.allocating.store(false, Ordering::Release);
            return result;
        }
    }

    /// Install a successor (from the preallocated slot, or allocated
    /// inline) as `current`, then retire `old`. Installing the successor
    /// before retiring `old` means no other writer ever observes `current
    /// == old` mid-close — symmetric with the documented rule for clearing
    /// `preallocated` only after `current` is updated.
    fn roll_from(&self, old: Arc<SingleProcessFile>) -> Result<Arc<SingleProcessFile>> {
        let successor = match self.preallocated.write().take() {
            Some(file) => file,
            None => Arc::new(Self::allocate(&self.naming, &self.options)?),
        };
        *self.current.write() = Arc::clone(&successor);
        self.close_file(old);
        Ok(successor)
    }

    fn close_file(&self, file: Arc<SingleProcessFile>) {
        let yield_policy = self.options.yield_policy;
        let on_file_complete = self.on_file_complete.clone();
        if self.options.async_close {
            tokio::task::spawn_blocking(move || {
                close_file_blocking(&file, yield_policy, on_file_complete);
            });
        } else {
            close_file_blocking(&file, yield_policy, on_file_complete);
        }
    }

    /// The writer-visible rolling write: retries against whichever file is
    /// current until the payload lands. Terminates because each iteration
    /// either succeeds or `current_file` monotonically advances.
    pub fn write(&self, payload: &[u8]) -> Result<i64> {
        if payload.len() as u64 > self.options.capacity() {
            return Err(rollmap_core::Error::CapacityExceededSingleWrite {
                length: payload.len() as u64,
                capacity: self.options.capacity(),
            }
            .into());
        }
        loop {
            let file = self.file_for_write()?;
            let offset = file.write(payload)?;
            if offset != NULL_OFFSET {
                return Ok(offset);
            }
        }
    }

    /// Signal shutdown: stop the preallocator, drop its unpublished
    /// successor, and close the current file synchronously.
    pub async fn shutdown(&self) {
        self.keep_running.store(false, Ordering::Release);
        if let Some(handle) = self.preallocator.write().take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(preallocated) = self.preallocated.write().take() {
            let path = preallocated.path().to_path_buf();
            close_file_blocking(&preallocated, self.options.yield_policy, None);
            let _ = std::fs::remove_file(&path);
        }
        let current = self.current.read().clone();
        close_file_blocking(&current, self.options.yield_policy, self.on_file_complete.clone());
    }
}

/// Spin (per `yield_policy`) until `file` has no pending writes, then close
/// it and fire the completion callback. Takes `file` by shared reference:
/// `SingleProcessFile::close` is safe to call concurrently with any other
/// holder of the same `Arc`, so there is no need to wait for (or prove) sole
/// ownership first — doing so would deadlock, since `roll_from` installs the
/// successor before retiring `old`, and callers like `shutdown` keep their
/// own clone alive for the whole call.
fn close_file_blocking(
    file: &Arc<SingleProcessFile>,
    yield_policy: YieldPolicy,
    on_file_complete: Option<FileCompleteCallback>,
) {
    while file.is_pending() {
        yield_policy.relax();
    }
    let path = file.path().to_path_buf();
    match file.close() {
        Ok(()) => {
            if let Some(cb) = on_file_complete {
                cb(&path);
            }
        }
        Err(err) => warn!(%err, ?path, "error closing rolled file"),
    }
}

/// Convenience re-export so callers constructing from a plain directory
/// don't need to reach into `rollmap_core::naming` directly.
pub fn default_naming(dir: impl Into<PathBuf>) -> Arc<dyn FileNameProvider> {
    Arc::new(rollmap_core::TimestampFileNameProvider::with_defaults(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn rolls_to_a_new_file_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(16).build();
        let coordinator = SingleProcessRollingFile::new(naming, options, None).unwrap();

        let offsets: Vec<i64> = (0..4)
            .map(|_| coordinator.write(b"buffer12").unwrap())
            .collect();
        // Two 8-byte records fit in the first 16-byte file, the next two
        // roll into a second file, each starting at offset 0.
        assert_eq!(offsets, vec![0, 8, 0, 8]);
    }

    #[tokio::test]
    async fn file_complete_callback_fires_on_roll() {
        let dir = tempfile::tempdir().unwrap();
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(8).build();
        let completed = Arc::new(Mutex::new(Vec::new()));
        let completed_clone = Arc::clone(&completed);
        let coordinator = SingleProcessRollingFile::new(
            naming,
            options,
            Some(Arc::new(move |path: &std::path::Path| {
                completed_clone.lock().unwrap().push(path.to_path_buf());
            })),
        )
        .unwrap();

        coordinator.write(b"buffer1r").unwrap();
        coordinator.write(b"buffer2r").unwrap();
        coordinator.shutdown().await;

        assert_eq!(completed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn payload_larger_than_capacity_errors() {
        let dir = tempfile::tempdir().unwrap();
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(4).build();
        let coordinator = SingleProcessRollingFile::new(naming, options, None).unwrap();
        assert!(coordinator.write(b"too long").is_err());
    }
}
