//! Reservation engine and header protocol for lock-free, append-only,
//! memory-mapped files.
//!
//! This crate covers components A–D of the system: the mapped region
//! primitive, the single-process and multi-process reservation engines, and
//! the file-name provider trait. Rolling and cross-process coordination live
//! in `rollmap-roll`.

pub mod encoding;
pub mod error;
pub mod multi;
pub mod naming;
pub mod region;
pub mod single;

pub use encoding::ByteOrder;
pub use error::{Error, Result};
pub use multi::MultiProcessFile;
pub use naming::{FileNameProvider, TimestampFileNameProvider};
pub use region::MappedRegion;
pub use single::{SingleProcessFile, NULL_OFFSET};
