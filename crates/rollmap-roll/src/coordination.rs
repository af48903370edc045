//! Coordination file (component F): a fixed-size shared map processes use to
//! agree on the current and preallocated roll file names, guarded by a
//! shared-memory spin-lock rather than an OS file lock — the critical
//! section is a handful of bytes of I/O, so a CAS word is cheap enough and
//! avoids the portability mess of advisory file locks.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use rollmap_core::MappedRegion;

use crate::error::{Error, Result};
use crate::policy::YieldPolicy;

/// Total size of the coordination mapping.
pub const COORDINATION_FILE_SIZE: u64 = 256 * 1024;

const LOCK_WORD: u64 = 0;
const PAYLOAD_START: u64 = 8;
const PAYLOAD_CAPACITY: usize = (COORDINATION_FILE_SIZE - PAYLOAD_START) as usize;

/// Shared memory-mapped file agreeing cross-process on `current` and
/// `preallocated` roll file paths.
pub struct CoordinationFile {
    region: MappedRegion,
    yield_policy: YieldPolicy,
}

impl CoordinationFile {
    /// Open or create the coordination file at `path`.
    pub fn open(path: &Path, yield_policy: YieldPolicy) -> Result<Self> {
        let region = if path.exists() {
            MappedRegion::map_existing(path)?
        } else {
            MappedRegion::create_empty(path, COORDINATION_FILE_SIZE, true)?
        };
        Ok(Self {
            region,
            yield_policy,
        })
    }

    /// Spin-CAS the lock word from unlocked (0) to locked (1).
    fn lock_file(&self) {
        loop {
            if self
                .region
                .compare_exchange(LOCK_WORD, 0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            self.yield_policy.relax();
        }
    }

    /// Release the lock word.
    fn unlock_file(&self) {
        self.region.store(LOCK_WORD, 0, Ordering::Release);
    }

    /// Read the current payload. Caller must already hold the lock.
    fn read_payload(&self) -> Result<String> {
        let raw = self.region.read_bytes(PAYLOAD_START, PAYLOAD_CAPACITY);
        let nul = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8(raw[..nul].to_vec())
            .map_err(|_| Error::MalformedCoordinationPayload("non-ascii payload".into()))
    }

    /// Overwrite the payload and NUL-terminate it. Caller must already hold
    /// the lock.
    fn write_payload(&self, payload: &str) {
        let mut bytes = payload.as_bytes().to_vec();
        bytes.push(0);
        assert!(
            bytes.len() <= PAYLOAD_CAPACITY,
            "coordination payload exceeds fixed capacity"
        );
        self.region.put_bytes(PAYLOAD_START, &bytes);
    }

    /// Read the current payload under the lock.
    pub fn read(&self) -> Result<String> {
        self.lock_file();
        let payload = self.read_payload();
        self.unlock_file();
        payload
    }

    /// Advance the coordination payload to `next_path`, composing it with
    /// `local_contents` per whether preallocation is in play.
    ///
    /// If the on-disk payload still matches `local_contents`, this caller is
    /// the one to advance: it writes the new payload and returns it. If the
    /// payload has already diverged, some other process got there first —
    /// return what is actually on disk, unmodified.
    pub fn next(
        &self,
        local_contents: &str,
        next_path: &Path,
        preallocate: bool,
    ) -> Result<String> {
        self.lock_file();
        let on_disk = self.read_payload();
        let result = (|| -> Result<String> {
            let on_disk = on_disk?;
            if on_disk != local_contents {
                return Ok(on_disk);
            }
            let next_str = next_path.to_string_lossy();
            let new_contents = if preallocate {
                let old_preallocated = preallocated_file(local_contents).unwrap_or_default();
                format!("{old_preallocated}|{next_str}")
            } else {
                next_str.into_owned()
            };
            self.write_payload(&new_contents);
            Ok(new_contents)
        })();
        self.unlock_file();
        result
    }
}

/// The portion of `payload` before the first `|`.
pub fn cur_file(payload: &str) -> &str {
    payload.split('|').next().unwrap_or("")
}

/// The portion of `payload` after the first `|`, or `None` if absent.
pub fn preallocated_file(payload: &str) -> Option<&str> {
    payload.split_once('|').map(|(_, rest)| rest)
}

/// Default coordination file path alongside a rolling file directory.
pub fn default_coordination_path(dir: impl Into<PathBuf>) -> PathBuf {
    dir.into().join(".rollmap-coordination")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_and_unlock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord");
        let coord = CoordinationFile::open(&path, YieldPolicy::Spin).unwrap();
        assert_eq!(coord.read().unwrap(), "");
    }

    #[test]
    fn next_advances_when_contents_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord");
        let coord = CoordinationFile::open(&path, YieldPolicy::Spin).unwrap();
        let local = coord.read().unwrap();
        let next_path = dir.path().join("roll-1_log");
        let advanced = coord.next(&local, &next_path, false).unwrap();
        assert_eq!(advanced, next_path.to_string_lossy());
        assert_eq!(cur_file(&advanced), next_path.to_string_lossy());
        assert_eq!(preallocated_file(&advanced), None);
    }

    #[test]
    fn next_composes_preallocated_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord");
        let coord = CoordinationFile::open(&path, YieldPolicy::Spin).unwrap();
        let local = coord.read().unwrap();
        let next_path = dir.path().join("roll-1_log");
        let advanced = coord.next(&local, &next_path, true).unwrap();
        assert_eq!(preallocated_file(&advanced), Some(next_path.to_string_lossy()).as_deref());
    }

    #[test]
    fn stale_caller_gets_current_on_disk_value_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord");
        let coord = CoordinationFile::open(&path, YieldPolicy::Spin).unwrap();
        let local = coord.read().unwrap();
        let winner_path = dir.path().join("roll-winner_log");
        let winner_result = coord.next(&local, &winner_path, false).unwrap();

        // A second caller still holding the stale `local` loses the race.
        let loser_path = dir.path().join("roll-loser_log");
        let loser_result = coord.next(&local, &loser_path, false).unwrap();
        assert_eq!(loser_result, winner_result);
    }
}
