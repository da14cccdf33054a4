//! # imgrecon Table
//!
//! Partition discovery: runs an external enumeration tool against a raw
//! disk image and turns its text output into ordered
//! [`Partition`](imgrecon_core::Partition) records.
//!
//! ## Example
//!
//! ```rust,no_run
//! use imgrecon_core::SystemToolRunner;
//! use imgrecon_table::PartitionScanner;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let scanner = PartitionScanner::new(Arc::new(SystemToolRunner::new()));
//! for partition in scanner.scan(Path::new("disk.dd")) {
//!     println!("{}", partition);
//! }
//! ```

pub mod scanner;

pub use scanner::{parse_table, PartitionScanner, DEFAULT_TOOL};
