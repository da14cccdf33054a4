//! Core data model for partition discovery and extraction

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default sector size in bytes, used when the caller does not override it
pub const SECTOR_SIZE: u64 = 512;

/// Chunk size for random-access file copies (1 MiB)
///
/// Bounds peak memory independent of file size and keeps cancellation
/// latency to one chunk's worth of I/O.
pub const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// A partition entry discovered by the enumeration tool
///
/// `byte_offset` is derived from `start_sector` at construction and never
/// independently mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Ordinal reported by the enumeration tool, ascending by start sector
    pub index: u64,

    /// First sector of the partition
    pub start_sector: u64,

    /// Last sector of the partition
    pub end_sector: u64,

    /// Number of sectors in the partition
    pub length_sectors: u64,

    /// Free-form classification text from the enumeration tool
    pub description: String,

    /// Byte offset of the partition start within the image
    pub byte_offset: u64,
}

impl Partition {
    /// Create a partition record, deriving the byte offset
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if `end_sector < start_sector`, and
    /// `OffsetInvalid` if the byte offset overflows a u64.
    pub fn new(
        index: u64,
        start_sector: u64,
        end_sector: u64,
        length_sectors: u64,
        description: String,
        sector_size: u64,
    ) -> Result<Self> {
        if end_sector < start_sector {
            return Err(Error::InvalidPartition(format!(
                "end sector {} precedes start sector {}",
                end_sector, start_sector
            )));
        }
        let byte_offset = start_sector.checked_mul(sector_size).ok_or_else(|| {
            Error::offset_invalid(format!(
                "start sector {} * sector size {} overflows",
                start_sector, sector_size
            ))
        })?;
        Ok(Self {
            index,
            start_sector,
            end_sector,
            length_sectors,
            description,
            byte_offset,
        })
    }

    /// Size of the partition in bytes at the given sector size
    pub fn byte_length(&self, sector_size: u64) -> u64 {
        self.length_sectors.saturating_mul(sector_size)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition {} [sectors {}..{}, {} sectors, offset 0x{:08X}] {}",
            self.index,
            self.start_sector,
            self.end_sector,
            self.length_sectors,
            self.byte_offset,
            self.description
        )
    }
}

/// Captured output of one external tool invocation
///
/// Produced by a [`ToolRunner`](crate::traits::ToolRunner); consumed, not
/// owned, by this subsystem. Diagnostic text is kept verbatim.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Process exit code, if the process exited normally
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    /// True if the tool exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The tool's own diagnostic text, preferring stderr
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim_end()
        } else {
            self.stderr.trim_end()
        }
    }
}

/// Classification of a directory entry inside an opened volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A subdirectory
    Directory,
    /// A regular file with a declared size
    File,
    /// Anything else: symlink, device node, entry with no usable metadata
    Other,
}

/// One entry of a directory listing surfaced by a filesystem binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Entry name within its parent directory
    pub name: String,

    /// Entry classification
    pub kind: EntryKind,

    /// Declared size in bytes (0 for directories and `Other` entries)
    pub size: u64,
}

impl EntryInfo {
    /// Create a file entry
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
        }
    }

    /// Create a directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    /// Create an entry of unusable type
    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Other,
            size: 0,
        }
    }

    /// True for the self/parent pseudo-entries
    ///
    /// These must be filtered before a walk recurses; leaving them in makes
    /// traversal non-terminating.
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// An entry the extraction walk saw but did not copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Path of the entry relative to the volume root
    pub path: String,

    /// Human-readable reason, carrying any underlying diagnostic verbatim
    pub reason: String,
}

impl SkippedEntry {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a completed extraction walk
///
/// The walk reports success once the top-level traversal finishes; skipped
/// entries are listed here rather than treated as overall failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Number of regular files copied
    pub files_copied: u64,

    /// Number of destination directories created
    pub directories_created: u64,

    /// Total content bytes written
    pub bytes_copied: u64,

    /// Entries seen but not copied, with reasons
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    /// True if every entry the walk saw was copied
    pub fn complete(&self) -> bool {
        self.skipped.is_empty()
    }
}
