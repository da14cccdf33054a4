//! Seam traits between the subsystem and its external collaborators

use crate::{
    error::Result,
    types::{EntryInfo, ToolOutput},
};
use std::io::{Read, Seek};
use std::path::Path;

/// Runs an external command and captures its output
///
/// Injected rather than hard-coded so the partition scanner and mount
/// driver are testable without the real tools or elevated privileges.
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`, capturing stdout and stderr
    ///
    /// # Errors
    ///
    /// Returns `ToolUnavailable` if the program cannot be spawned at all.
    /// A non-zero exit is not an error at this level; callers inspect the
    /// returned [`ToolOutput`].
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput>;
}

/// An opened filesystem inside a disk image
///
/// Paths are slash-separated and relative to the volume root; the empty
/// string names the root itself. Listings include whatever the underlying
/// format reports, self/parent pseudo-entries included; filtering them is
/// the walker's job.
pub trait FsVolume: Send {
    /// Human-readable identifier for the volume's filesystem
    fn identify(&self) -> &str;

    /// List the entries of the directory at `path`
    fn list_dir(&mut self, path: &str) -> Result<Vec<EntryInfo>>;

    /// Read up to `buf.len()` bytes of the file at `path`, starting at
    /// `offset` bytes into its content; returns the number of bytes read
    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Opens filesystems out of disk images at byte offsets
pub trait FsBinding: Send + Sync {
    /// Human-readable identifier for the binding
    fn identify(&self) -> &str;

    /// Open the filesystem starting `offset_bytes` into `image_path`
    ///
    /// # Errors
    ///
    /// `ImageNotFound` if the image is missing or empty,
    /// `BindingUnavailable` if no filesystem can be opened at the offset.
    fn open(&self, image_path: &Path, offset_bytes: u64) -> Result<Box<dyn FsVolume>>;
}

/// Combined trait for Read + Seek
pub trait ReadSeek: Read + Seek + Send {}

/// Blanket implementation for any type that implements Read + Seek
impl<T: Read + Seek + Send> ReadSeek for T {}
