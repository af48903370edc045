//! Error types for the rolling coordinators, coordination file, and framing
//! wrapper.

use thiserror::Error;

/// Errors raised by [`crate::roll_single`], [`crate::roll_multi`],
/// [`crate::coordination`] and [`crate::framing`].
#[derive(Error, Debug)]
pub enum Error {
    /// A single payload is larger than the file capacity; it could never
    /// fit in any rolled file, so the rolling write loop cannot recover.
    #[error(transparent)]
    Core(#[from] rollmap_core::Error),

    /// The coordination file's payload could not be parsed.
    #[error("malformed coordination payload: {0:?}")]
    MalformedCoordinationPayload(String),
}

/// Convenience alias used throughout `rollmap-roll`.
pub type Result<T> = std::result::Result<T, Error>;
