//! Error taxonomy shared across the imgrecon crates

use thiserror::Error;

/// The main error type for imgrecon operations
///
/// External tool and binding diagnostics are carried verbatim in the
/// variant payloads so that a failure reason shown to an investigator is
/// reproducible, not a re-interpretation.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading an image or writing extracted content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external enumeration or mount tool could not be spawned at all
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The external tool ran and reported failure; `diagnostic` is its own
    /// stderr, unmodified
    #[error("{tool} failed: {diagnostic}")]
    ToolFailed { tool: String, diagnostic: String },

    /// The operation requires privileges the process does not hold
    #[error("Privilege denied: {0}")]
    PrivilegeDenied(String),

    /// The target path already has an active mount or session
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    /// A byte offset is out of range for the image or overflowed
    #[error("Invalid offset: {0}")]
    OffsetInvalid(String),

    /// The disk image does not exist or is empty
    #[error("Image not found or empty: {0}")]
    ImageNotFound(String),

    /// No filesystem binding could open the image at the given offset
    #[error("Filesystem binding unavailable: {0}")]
    BindingUnavailable(String),

    /// File or directory not found inside an opened volume
    #[error("Not found: {0}")]
    NotFound(String),

    /// A session operation was attempted in the wrong lifecycle state
    #[error("Invalid session state: {0}")]
    SessionState(String),

    /// A partition record violates its own invariants
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// The caller requested cancellation; checked between I/O chunks
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for imgrecon operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a tool-unavailable error
    pub fn tool_unavailable(msg: impl Into<String>) -> Self {
        Error::ToolUnavailable(msg.into())
    }

    /// Create a tool-failed error carrying the tool's own diagnostic
    pub fn tool_failed(tool: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Error::ToolFailed {
            tool: tool.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a privilege-denied error
    pub fn privilege_denied(msg: impl Into<String>) -> Self {
        Error::PrivilegeDenied(msg.into())
    }

    /// Create a resource-busy error
    pub fn resource_busy(msg: impl Into<String>) -> Self {
        Error::ResourceBusy(msg.into())
    }

    /// Create an invalid-offset error
    pub fn offset_invalid(msg: impl Into<String>) -> Self {
        Error::OffsetInvalid(msg.into())
    }

    /// Create an image-not-found error
    pub fn image_not_found(msg: impl Into<String>) -> Self {
        Error::ImageNotFound(msg.into())
    }

    /// Create a binding-unavailable error
    pub fn binding_unavailable(msg: impl Into<String>) -> Self {
        Error::BindingUnavailable(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a session-state error
    pub fn session_state(msg: impl Into<String>) -> Self {
        Error::SessionState(msg.into())
    }

    /// True if this error indicates a missing privilege, so a caller can
    /// suggest extraction mode instead of mounting
    pub fn is_privilege(&self) -> bool {
        match self {
            Error::PrivilegeDenied(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}
