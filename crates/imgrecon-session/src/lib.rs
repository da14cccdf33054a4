//! # imgrecon Session
//!
//! The subsystem facade: acquisition sessions over disk images. A caller
//! lists partitions, then activates a target path by either a privileged
//! loopback mount or an unprivileged extraction walk; the coordinator
//! owns the session registry and serializes access per target.
//!
//! ## Example
//!
//! ```rust,no_run
//! use imgrecon_core::SystemToolRunner;
//! use imgrecon_extract::NtfsBinding;
//! use imgrecon_session::{ActivateRequest, Coordinator, SessionMode};
//! use std::sync::Arc;
//!
//! # fn demo() -> imgrecon_core::Result<()> {
//! let coordinator = Coordinator::new(
//!     Arc::new(SystemToolRunner::new()),
//!     Arc::new(NtfsBinding::new()),
//! );
//!
//! let partitions = coordinator.list_partitions_blocking("disk.dd".as_ref());
//! let request = ActivateRequest::new("disk.dd", "/tmp/evidence", SessionMode::Extracted)
//!     .with_partition(partitions[1].clone());
//! let session = coordinator.activate_blocking(request)?;
//! println!("working copy at {}", session.target_path.display());
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod session;

pub use coordinator::Coordinator;
pub use session::{ActivateRequest, Session, SessionMode, SessionState};
