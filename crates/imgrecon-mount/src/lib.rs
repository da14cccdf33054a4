//! # imgrecon Mount
//!
//! Privileged loopback mounting: maps a partition's byte region of a disk
//! image onto a directory with the OS mount primitive, and unmounts it
//! again. The command runner is injected so the driver is testable (and
//! wrappable with a privilege helper) without real elevated access.

pub mod driver;

pub use driver::{mount_options, MountDriver};
