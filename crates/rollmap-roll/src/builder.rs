//! High-level file-mapper builder surface: chooses among the four
//! combinations of single/multi-process and rolling/non-rolling, and
//! constructs the matching type.
//!
//! The distilled spec flagged that the original builder rejected
//! `multiProcess && roll` outright even though both the coordination file
//! and the multi-process rolling coordinator existed and worked — an
//! unreachable combination. This builder exposes all four combinations;
//! `multi_process(true).roll(true)` reaches [`MappedFile::MultiRolling`]
//! instead of being rejected.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rollmap_core::{FileNameProvider, MultiProcessFile, SingleProcessFile};

use crate::common::FileCompleteCallback;
use crate::coordination::default_coordination_path;
use crate::error::Result;
use crate::policy::YieldPolicy;
use crate::roll_multi::MultiProcessRollingFile;
use crate::roll_single::{default_naming, SingleProcessRollingFile};
use crate::RollingFileOptions;

/// The constructed file-mapper, in whichever of the four shapes the
/// builder's flags selected.
pub enum MappedFile {
    /// Non-rolling, single-process: a bare reservation engine (component B).
    Single(SingleProcessFile),
    /// Non-rolling, multi-process: a bare reservation engine with an in-file
    /// header (component C).
    Multi(MultiProcessFile),
    /// Rolling, single-process (component E).
    SingleRolling(Arc<SingleProcessRollingFile>),
    /// Rolling, multi-process, coordinated through a shared coordination
    /// file (component G).
    MultiRolling(Arc<MultiProcessRollingFile>),
}

/// Builds a [`MappedFile`] from a target directory and a set of flags,
/// generalizing the teacher's `ComediStreamWriterBuilder` fluent idiom.
pub struct RollingFileBuilder {
    dir: PathBuf,
    capacity: u64,
    fill_zero: bool,
    framed: bool,
    yield_policy: YieldPolicy,
    async_close: bool,
    preallocate: bool,
    preallocate_check_interval: Duration,
    multi_process: bool,
    roll: bool,
    naming: Option<Arc<dyn FileNameProvider>>,
    on_file_complete: Option<FileCompleteCallback>,
}

impl RollingFileBuilder {
    /// Start building against `dir` with `capacity` bytes per file.
    pub fn new(dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            fill_zero: false,
            framed: false,
            yield_policy: YieldPolicy::Spin,
            async_close: false,
            preallocate: false,
            preallocate_check_interval: Duration::from_millis(50),
            multi_process: false,
            roll: false,
            naming: None,
            on_file_complete: None,
        }
    }

    /// Zero-fill newly created single-process files.
    pub fn fill_zero(mut self, fill_zero: bool) -> Self {
        self.fill_zero = fill_zero;
        self
    }

    /// Note that writes will go through the length-prefix framing wrapper;
    /// recorded here so callers can introspect the built configuration, but
    /// wrapping a rolling file in [`crate::framing::FramedWriter`] is the
    /// caller's responsibility.
    pub fn framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    /// How contention is backed off.
    pub fn yield_policy(mut self, policy: YieldPolicy) -> Self {
        self.yield_policy = policy;
        self
    }

    /// Close retired files on a background task.
    pub fn async_close(mut self, async_close: bool) -> Self {
        self.async_close = async_close;
        self
    }

    /// Keep a hot-swappable successor file mapped ahead of time. Only
    /// meaningful when `roll(true)`.
    pub fn preallocate(mut self, preallocate: bool) -> Self {
        self.preallocate = preallocate;
        self
    }

    /// Preallocator poll interval.
    pub fn preallocate_check_interval(mut self, interval: Duration) -> Self {
        self.preallocate_check_interval = interval;
        self
    }

    /// Use the in-file header protocol so the file (or file sequence) can
    /// be reopened by cooperating processes.
    pub fn multi_process(mut self, multi_process: bool) -> Self {
        self.multi_process = multi_process;
        self
    }

    /// Wrap the file in a rolling coordinator instead of producing a bare,
    /// non-rolling file. Composes freely with `multi_process`.
    pub fn roll(mut self, roll: bool) -> Self {
        self.roll = roll;
        self
    }

    /// Override the file-name provider (defaults to a timestamp-based one
    /// rooted at `dir`).
    pub fn naming(mut self, naming: Arc<dyn FileNameProvider>) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Callback fired with the path of each file once it is fully retired.
    pub fn on_file_complete(mut self, callback: FileCompleteCallback) -> Self {
        self.on_file_complete = Some(callback);
        self
    }

    fn options(&self) -> RollingFileOptions {
        RollingFileOptions::builder(self.capacity)
            .fill_zero(self.fill_zero)
            .framed(self.framed)
            .yield_policy(self.yield_policy)
            .async_close(self.async_close)
            .preallocate(self.preallocate)
            .preallocate_check_interval(self.preallocate_check_interval)
            .build()
    }

    fn naming_or_default(&self) -> Arc<dyn FileNameProvider> {
        self.naming
            .clone()
            .unwrap_or_else(|| default_naming(self.dir.clone()))
    }

    /// Construct the file-mapper per the configured flags.
    pub fn build(self) -> Result<MappedFile> {
        match (self.multi_process, self.roll) {
            (false, false) => {
                let naming = self.naming_or_default();
                let path = naming.next_file();
                let file = SingleProcessFile::create(&path, self.capacity, self.fill_zero)?;
                Ok(MappedFile::Single(file))
            }
            (true, false) => {
                let naming = self.naming_or_default();
                let path = naming.next_file();
                let file = MultiProcessFile::map(&path, self.capacity)?;
                Ok(MappedFile::Multi(file))
            }
            (false, true) => {
                let naming = self.naming_or_default();
                let options = self.options();
                let coordinator =
                    SingleProcessRollingFile::new(naming, options, self.on_file_complete)?;
                Ok(MappedFile::SingleRolling(coordinator))
            }
            (true, true) => {
                let naming = self.naming_or_default();
                let options = self.options();
                let coordination_path = default_coordination_path(self.dir.clone());
                let coordinator = MultiProcessRollingFile::new(
                    naming,
                    options,
                    coordination_path,
                    self.on_file_complete,
                )?;
                Ok(MappedFile::MultiRolling(coordinator))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_rolling_single_process_is_reachable() {
        let dir = tempfile::tempdir().unwrap();
        let built = RollingFileBuilder::new(dir.path(), 64).build().unwrap();
        assert!(matches!(built, MappedFile::Single(_)));
    }

    #[test]
    fn multi_process_rolling_is_reachable() {
        let dir = tempfile::tempdir().unwrap();
        let built = RollingFileBuilder::new(dir.path(), 64)
            .multi_process(true)
            .roll(true)
            .build()
            .unwrap();
        assert!(matches!(built, MappedFile::MultiRolling(_)));
    }
}
