//! # imgrecon Extract
//!
//! Unprivileged content extraction: opens a filesystem at a byte offset
//! inside a disk image through an [`FsBinding`](imgrecon_core::FsBinding)
//! and copies its tree into a destination directory, no mount required.
//!
//! - [`ExtractionWalker`]: the worklist tree copy with chunked reads,
//!   pseudo-entry filtering, per-entry error absorption, and a
//!   skipped-entries report
//! - [`NtfsBinding`]: real binding over the `ntfs` crate
//! - [`MemoryVolume`] / [`MemoryBinding`]: synthetic volumes for fixtures

pub mod memory;
pub mod ntfs;
pub mod walker;

pub use memory::{MemoryBinding, MemoryVolume};
pub use ntfs::{NtfsBinding, NtfsVolume};
pub use walker::ExtractionWalker;
