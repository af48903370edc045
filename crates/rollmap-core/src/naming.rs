//! File-name provider: the pluggable "what's the next roll file called"
//! capability. Treated as an external collaborator by the spec — only the
//! trait and a minimal default timestamp-based implementation are needed
//! here; the full file-mapper builder surface that wires a provider into a
//! running rolling coordinator lives outside this crate's scope.

use std::path::{Path, PathBuf};

use chrono::Local;

/// Produces the next file path in a roll sequence.
pub trait FileNameProvider: Send + Sync {
    /// Return a path that does not currently exist, to use for the next
    /// file in the sequence.
    fn next_file(&self) -> PathBuf;
}

/// Default provider: `"<prefix><timestamp><-N>_<suffix>"`, where `-N` is the
/// smallest non-negative integer (N=0 rendered as nothing) yielding a path
/// that does not currently exist. Collision with an existing file is the
/// only signal consulted; a concurrent creator racing this check is benign
/// because callers retry on a failed create.
pub struct TimestampFileNameProvider {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    timestamp_fmt: String,
}

impl TimestampFileNameProvider {
    /// `timestamp_fmt` is a `chrono` strftime format string.
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        timestamp_fmt: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            timestamp_fmt: timestamp_fmt.into(),
        }
    }

    /// Convenience constructor matching the spec's default format.
    pub fn with_defaults(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, "roll-", "log", "%Y%m%d%H%M%S")
    }

    fn candidate(&self, timestamp: &str, n: u32) -> PathBuf {
        let suffix_part = if n == 0 {
            String::new()
        } else {
            format!("-{n}")
        };
        self.dir
            .join(format!("{}{}{}_{}", self.prefix, timestamp, suffix_part, self.suffix))
    }
}

impl FileNameProvider for TimestampFileNameProvider {
    fn next_file(&self) -> PathBuf {
        let timestamp = Local::now().format(&self.timestamp_fmt).to_string();
        for n in 0u32.. {
            let candidate = self.candidate(&timestamp, n);
            if !path_exists(&candidate) {
                return candidate;
            }
        }
        unreachable!("u32 space exhausted choosing a roll file name")
    }
}

fn path_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_has_no_dash_n() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TimestampFileNameProvider::new(dir.path(), "roll", "log", "%Y%m%d%H%M%S");
        let first = provider.next_file();
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        let stem = name.strip_suffix("_log").expect("suffix present");
        assert!(!stem.contains('-'), "unexpected -N in {name}");
    }

    #[test]
    fn collisions_bump_the_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TimestampFileNameProvider::new(dir.path(), "roll", "log", "%Y%m%d%H%M%S");
        let first = provider.next_file();
        std::fs::write(&first, b"").unwrap();
        let second = provider.next_file();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().contains("-1_log"));
    }
}
