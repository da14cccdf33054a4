//! Acquisition sessions and activation requests

use chrono::{DateTime, Utc};
use imgrecon_core::{Error, ExtractReport, Partition, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a session's working copy was produced
///
/// The choice is always the caller's; the coordinator never falls back
/// from one strategy to the other, because an investigator must know by
/// which method a working copy was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Privileged loopback mount; the target is a live mount point
    Mounted,
    /// Unprivileged filesystem walk; the target holds copied content
    Extracted,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Mounted => write!(f, "mounted"),
            SessionMode::Extracted => write!(f, "extracted"),
        }
    }
}

/// Lifecycle state of a target path
///
/// `Idle → Activating → Active → Releasing → Idle`; a failed activation
/// returns to `Idle`, and only an explicit release leaves `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Activating,
    Active,
    Releasing,
}

/// Parameters for activating a session
///
/// The selected partition's own offset and the caller-supplied
/// `extra_offset_bytes` are two distinct fields; the effective offset is
/// their sum, and both are recorded on the resulting session so the
/// combination stays auditable.
#[derive(Debug, Clone)]
pub struct ActivateRequest {
    /// Path of the disk image
    pub image_path: PathBuf,

    /// Mount point or extraction destination; unique session key
    pub target_path: PathBuf,

    /// Acquisition strategy, chosen explicitly by the caller
    pub mode: SessionMode,

    /// Selected partition; `None` means whole-image
    pub partition: Option<Partition>,

    /// Fine-tune offset added on top of the partition's own offset
    pub extra_offset_bytes: u64,

    /// Mount read-only (default true; ignored for extraction)
    pub read_only: bool,
}

impl ActivateRequest {
    pub fn new(
        image_path: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        mode: SessionMode,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            target_path: target_path.into(),
            mode,
            partition: None,
            extra_offset_bytes: 0,
            read_only: true,
        }
    }

    /// Select a partition; its byte offset contributes to the effective
    /// offset
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Add a caller-supplied offset on top of the partition offset
    pub fn with_extra_offset(mut self, extra_offset_bytes: u64) -> Self {
        self.extra_offset_bytes = extra_offset_bytes;
        self
    }

    /// Override the read-only default for mounts
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// The effective byte offset: partition offset plus extra offset
    ///
    /// # Errors
    ///
    /// `OffsetInvalid` if the sum overflows a u64.
    pub fn effective_offset(&self) -> Result<u64> {
        let base = self.partition.as_ref().map_or(0, |p| p.byte_offset);
        base.checked_add(self.extra_offset_bytes).ok_or_else(|| {
            Error::offset_invalid(format!(
                "partition offset {} + extra offset {} overflows",
                base, self.extra_offset_bytes
            ))
        })
    }
}

/// An active (or transitioning) acquisition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Path of the disk image the session was opened from
    pub image_path: PathBuf,

    /// Acquisition strategy used
    pub mode: SessionMode,

    /// Mount point or extraction destination; the registry key
    pub target_path: PathBuf,

    /// Selected partition, if not whole-image
    pub partition: Option<Partition>,

    /// Effective byte offset used for the activation
    pub offset_bytes: u64,

    /// Caller-supplied component of `offset_bytes`
    pub extra_offset_bytes: u64,

    /// Whether the mount was read-only
    pub read_only: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Lifecycle state
    pub state: SessionState,

    /// Walk outcome for extracted sessions, including skipped entries
    pub extract_report: Option<ExtractReport>,
}

impl Session {
    pub(crate) fn activating(request: &ActivateRequest, offset_bytes: u64) -> Self {
        Self {
            image_path: request.image_path.clone(),
            mode: request.mode,
            target_path: request.target_path.clone(),
            partition: request.partition.clone(),
            offset_bytes,
            extra_offset_bytes: request.extra_offset_bytes,
            read_only: request.read_only,
            created_at: Utc::now(),
            state: SessionState::Activating,
            extract_report: None,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (offset {}, {:?})",
            self.mode,
            self.image_path.display(),
            self.target_path.display(),
            self.offset_bytes,
            self.state
        )
    }
}
