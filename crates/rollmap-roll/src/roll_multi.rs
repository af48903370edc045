//! Multi-process rolling coordinator (component G): the same outward
//! contract as [`crate::roll_single::SingleProcessRollingFile`], but every
//! roll is agreed across processes through the [`CoordinationFile`] before a
//! successor is mapped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rollmap_core::{FileNameProvider, MultiProcessFile, NULL_OFFSET};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::common::{next_preallocator_id, FileCompleteCallback};
use crate::coordination::{cur_file, preallocated_file, CoordinationFile};
use crate::error::Result;
use crate::options::RollingFileOptions;
use crate::policy::YieldPolicy;

/// Rolls a sequence of [`MultiProcessFile`]s with cross-process agreement on
/// file names via a shared coordination file.
pub struct MultiProcessRollingFile {
    naming: Arc<dyn FileNameProvider>,
    options: RollingFileOptions,
    on_file_complete: Option<FileCompleteCallback>,
    coordination: CoordinationFile,
    current: RwLock<Arc<MultiProcessFile>>,
    preallocated: RwLock<Option<Arc<MultiProcessFile>>>,
    /// Our cached view of the coordination payload, used to detect whether
    /// we are the one to advance it or whether a peer already has.
    local_contents: RwLock<String>,
    allocating: AtomicBool,
    keep_running: Arc<AtomicBool>,
    preallocator: RwLock<Option<JoinHandle<()>>>,
}

impl MultiProcessRollingFile {
    /// Open the coordination file at `coordination_path`, bootstrapping it
    /// (and the first data file) if it is empty, then map the current file.
    pub fn new(
        naming: Arc<dyn FileNameProvider>,
        options: RollingFileOptions,
        coordination_path: PathBuf,
        on_file_complete: Option<FileCompleteCallback>,
    ) -> Result<Arc<Self>> {
        let coordination = CoordinationFile::open(&coordination_path, options.yield_policy)?;
        let on_disk = coordination.read()?;
        let local_contents = if on_disk.is_empty() {
            let path = naming.next_file();
            coordination.next(&on_disk, &path, false)?
        } else {
            on_disk
        };

        let current_path = PathBuf::from(cur_file(&local_contents));
        let current = Arc::new(MultiProcessFile::map(&current_path, options.capacity())?);

        let this = Arc::new(Self {
            naming,
            options,
            on_file_complete,
            coordination,
            current: RwLock::new(current),
            preallocated: RwLock::new(None),
            local_contents: RwLock::new(local_contents),
            allocating: AtomicBool::new(false),
            keep_running: Arc::new(AtomicBool::new(true)),
            preallocator: RwLock::new(None),
        });

        if this.options.preallocate {
            this.spawn_preallocator();
        }

        Ok(this)
    }

    fn spawn_preallocator(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let keep_running = Arc::clone(&this.keep_running);
        let id = next_preallocator_id();
        let handle = tokio::spawn(async move {
            debug!(preallocator_id = id, "multi-process preallocator started");
            while keep_running.load(Ordering::Acquire) {
                this.preallocator_tick(id);
                tokio::time::sleep(this.options.preallocate_check_interval).await;
            }
            debug!(preallocator_id = id, "multi-process preallocator stopped");
        });
        *self.preallocator.write() = Some(handle);
    }

    /// One pass of the preallocator, implementing the three cases a peer's
    /// roll may have produced since our last look: no preallocation
    /// announced (a peer advanced with preallocation disabled — nothing to
    /// preallocate, we simply resync our cached contents so the next roll
    /// picks up the right current file); current has moved past what we
    /// cached (we fell behind by more than one roll — resync the same way);
    /// or a preallocated name is announced and we don't hold it yet, in
    /// which case map it.
    fn preallocator_tick(&self, id: u64) {
        if self.preallocated.read().is_some() {
            return;
        }
        let candidate = self.naming.next_file();
        let local = self.local_contents.read().clone();
        match self.coordination.next(&local, &candidate, true) {
            Ok(advanced) => {
                if let Some(name) = preallocated_file(&advanced) {
                    let path = PathBuf::from(name);
                    let already_held = self
                        .preallocated
                        .read()
                        .as_ref()
                        .map(|f| f.path() == path)
                        .unwrap_or(false);
                    if !already_held {
                        match MultiProcessFile::map(&path, self.options.capacity()) {
                            Ok(file) => *self.preallocated.write() = Some(Arc::new(file)),
                            Err(err) => {
                                warn!(preallocator_id = id, %err, ?path, "preallocation failed");
                                let _ = std::fs::remove_file(&path);
                            }
                        }
                    }
                }
                *self.local_contents.write() = advanced;
            }
            Err(err) => warn!(preallocator_id = id, %err, "coordination read failed"),
        }
    }

    /// Return the file to use for the next reservation, rolling (with
    /// cross-process agreement) if the current one is exhausted.
    #[instrument(skip(self))]
    pub fn file_for_write(&self) -> Result<Arc<MultiProcessFile>> {
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
                self.allocating.store(false, Ordering::Release);
                return Ok(reloaded);
            }

            let result = self.roll_from(reloaded);
            self.allocating.store(false, Ordering::Release);
            return result;
        }
    }

    /// Consult the coordination file for the next current path — whether we
    /// are the one advancing it or a peer already has — then map it,
    /// install it as `current`, and retire `old`. As with the single-process
    /// coordinator, the successor is installed before `old` is closed.
    fn roll_from(&self, old: Arc<MultiProcessFile>) -> Result<Arc<MultiProcessFile>> {
        let candidate = self.naming.next_file();
        let local = self.local_contents.read().clone();
        let advanced = self
            .coordination
            .next(&local, &candidate, self.options.preallocate)?;
        *self.local_contents.write() = advanced.clone();

        let next_path = PathBuf::from(cur_file(&advanced));
        let successor = match self.preallocated.write().take() {
            Some(file) if file.path() == next_path => file,
            _ => Arc::new(MultiProcessFile::map(&next_path, self.options.capacity())?),
        };

        *self.current.write() = Arc::clone(&successor);
        self.close_file(old);
        Ok(successor)
    }

    fn close_file(&self, file: Arc<MultiProcessFile>) {
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
    /// current until the payload lands.
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

    /// Stop the preallocator, drop its unpublished successor, and close the
    /// current file synchronously.
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
        close_file_blocking(
            &current,
            self.options.yield_policy,
            self.on_file_complete.clone(),
        );
    }
}

/// Spin (per `yield_policy`) until `file` has no pending writes, then close
/// it through the shared reference and fire the completion callback. See
/// the single-process coordinator's twin for why this takes `&Arc` rather
/// than requiring sole ownership.
fn close_file_blocking(
    file: &Arc<MultiProcessFile>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll_single::default_naming;

    #[tokio::test]
    async fn two_coordinators_share_one_rolled_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let coordination_path = dir.path().join(".coord");
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(16).build();

        let a = MultiProcessRollingFile::new(
            Arc::clone(&naming),
            options.clone(),
            coordination_path.clone(),
            None,
        )
        .unwrap();
        let b =
            MultiProcessRollingFile::new(naming, options, coordination_path, None).unwrap();

        let off_a = a.write(b"Hello ").unwrap();
        let off_b = b.write(b"World!").unwrap();
        assert_eq!(off_a, rollmap_core::multi::HEADER_SIZE as i64);
        assert_eq!(off_b, rollmap_core::multi::HEADER_SIZE as i64 + 6);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn rolls_when_current_file_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let coordination_path = dir.path().join(".coord");
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(8).build();
        let coordinator =
            MultiProcessRollingFile::new(naming, options, coordination_path, None).unwrap();

        coordinator.write(b"buffer12").unwrap();
        let second_offset = coordinator.write(b"buffer34").unwrap();
        assert_eq!(second_offset, rollmap_core::multi::HEADER_SIZE as i64);
        coordinator.shutdown().await;
    }
}
