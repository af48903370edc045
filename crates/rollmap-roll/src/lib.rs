//! Rolling coordinators and cross-process roll coordination.
//!
//! Builds on `rollmap-core`'s reservation engines to cover components E–H:
//! the single-process rolling coordinator, the cross-process coordination
//! file, the multi-process rolling coordinator, and the length-prefix
//! framing wrapper.

pub mod builder;
pub mod common;
pub mod coordination;
pub mod error;
pub mod framing;
pub mod options;
pub mod policy;
pub mod roll_multi;
pub mod roll_single;

pub use builder::{MappedFile, RollingFileBuilder};
pub use common::FileCompleteCallback;
pub use coordination::CoordinationFile;
pub use error::{Error, Result};
pub use framing::FramedWriter;
pub use options::{RollingFileOptions, RollingFileOptionsBuilder};
pub use policy::YieldPolicy;
pub use roll_multi::MultiProcessRollingFile;
pub use roll_single::{default_naming, SingleProcessRollingFile};
