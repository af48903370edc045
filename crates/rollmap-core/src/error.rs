//! Error types for the reservation engine and header protocol.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`crate::region`], [`crate::single`], [`crate::multi`] and
/// [`crate::naming`].
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying map/create/truncate/close syscall failed.
    #[error("io failure on {path:?}: {source}")]
    Io {
        /// File the syscall was operating on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Caller asked to write more bytes than the file's usable capacity.
    #[error("write length {length} exceeds file capacity {capacity}")]
    CapacityExceededSingleWrite {
        /// Requested write length.
        length: u64,
        /// Usable capacity of the file.
        capacity: u64,
    },

    /// `close()` was called while writes issued by this instance are still
    /// pending (reserved but not yet committed).
    #[error("close called with pending writes on {path:?}")]
    ClosePending {
        /// File that still has pending writes.
        path: PathBuf,
    },

    /// Attempted to open a file that is already mapped/finished in a way
    /// that conflicts with the requested mode.
    #[error("file already exists: {path:?}")]
    AlreadyExists {
        /// Conflicting path.
        path: PathBuf,
    },

    /// Multi-process header failed validation (bad magic/size) on reopen.
    #[error("invalid header in {path:?}: {reason}")]
    InvalidHeader {
        /// File whose header failed validation.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },
}

/// Convenience alias used throughout `rollmap-core`.
pub type Result<T> = std::result::Result<T, Error>;
