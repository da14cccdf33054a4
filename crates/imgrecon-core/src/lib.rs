//! # imgrecon Core
//!
//! Core traits, types, and error handling for the imgrecon disk-image
//! toolkit.
//!
//! This crate provides the foundational abstractions shared by the
//! partition scanner, mount driver, extraction walker, and session
//! coordinator:
//! - **Partition**: a discovered partition with its derived byte offset
//! - **ToolRunner**: injected external-command execution
//! - **FsBinding / FsVolume**: the filesystem-binding seam used to walk a
//!   partition's contents without an OS-level mount
//!
//! ## Example
//!
//! ```rust
//! use imgrecon_core::{Partition, SECTOR_SIZE};
//!
//! let p = Partition::new(1, 2048, 9764863, 9762816, "NTFS (0x07)".into(), SECTOR_SIZE).unwrap();
//! assert_eq!(p.byte_offset, 1_048_576);
//! ```

pub mod error;
pub mod process;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{Error, Result};
pub use process::SystemToolRunner;
pub use traits::{FsBinding, FsVolume, ReadSeek, ToolRunner};
pub use types::{
    EntryInfo, EntryKind, ExtractReport, Partition, SkippedEntry, ToolOutput, COPY_CHUNK_SIZE,
    SECTOR_SIZE,
};
