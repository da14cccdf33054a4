//! Recursive content extraction through a filesystem binding
//!
//! Copies a volume's tree into a destination directory without an
//! OS-level mount. Traversal uses an explicit worklist rather than call
//! recursion, so depth is bounded only by memory, and the self/parent
//! pseudo-entries are filtered before a directory is enqueued; that
//! filter is what makes the walk terminate at all.

use imgrecon_core::{
    EntryKind, Error, ExtractReport, FsVolume, Result, SkippedEntry, COPY_CHUNK_SIZE,
};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Walks an opened volume and copies its contents to a directory
pub struct ExtractionWalker {
    chunk_size: usize,
    cancel_flag: Arc<AtomicBool>,
}

impl ExtractionWalker {
    /// Create a walker with the default 1 MiB copy chunk
    pub fn new() -> Self {
        Self::with_chunk_size(COPY_CHUNK_SIZE)
    }

    /// Create a walker with a custom chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels the walk; checked per entry and per chunk, so
    /// worst-case cancellation latency is one chunk's I/O
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Copy the volume's tree into `dest`
    ///
    /// Per-entry failures are absorbed: the entry (or subtree) is skipped
    /// with a reason and the walk continues with its siblings. Only
    /// precondition-level failures fail the operation: an unlistable
    /// root, an uncreatable destination, or cancellation.
    pub fn extract(&self, volume: &mut dyn FsVolume, dest: &Path) -> Result<ExtractReport> {
        std::fs::create_dir_all(dest)?;

        let mut report = ExtractReport::default();
        let mut worklist: VecDeque<String> = VecDeque::new();
        worklist.push_back(String::new());

        while let Some(dir_path) = worklist.pop_front() {
            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let entries = match volume.list_dir(&dir_path) {
                Ok(entries) => entries,
                Err(e) if dir_path.is_empty() => {
                    // The root must be listable for the walk to mean anything
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(path = dir_path, error = %e, "skipping unreadable directory");
                    report
                        .skipped
                        .push(SkippedEntry::new(dir_path, e.to_string()));
                    continue;
                }
            };

            for entry in entries {
                if self.cancel_flag.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                if entry.is_pseudo() {
                    continue;
                }
                if entry.name.contains('/') || entry.name.contains('\\') {
                    report.skipped.push(SkippedEntry::new(
                        join(&dir_path, &entry.name),
                        "entry name contains a path separator",
                    ));
                    continue;
                }

                let rel_path = join(&dir_path, &entry.name);
                let dest_path = dest.join(&rel_path);

                match entry.kind {
                    EntryKind::Directory => match std::fs::create_dir_all(&dest_path) {
                        Ok(()) => {
                            report.directories_created += 1;
                            worklist.push_back(rel_path);
                        }
                        Err(e) => {
                            tracing::warn!(path = rel_path, error = %e, "cannot create directory");
                            report
                                .skipped
                                .push(SkippedEntry::new(rel_path, e.to_string()));
                        }
                    },
                    EntryKind::File => {
                        match self.copy_file(volume, &rel_path, entry.size, &dest_path) {
                            Ok(bytes) => {
                                report.files_copied += 1;
                                report.bytes_copied += bytes;
                            }
                            Err(Error::Cancelled) => return Err(Error::Cancelled),
                            Err(e) => {
                                tracing::warn!(path = rel_path, error = %e, "skipping unreadable file");
                                report
                                    .skipped
                                    .push(SkippedEntry::new(rel_path, e.to_string()));
                            }
                        }
                    }
                    EntryKind::Other => {
                        report.skipped.push(SkippedEntry::new(
                            rel_path,
                            "unsupported entry type (symlink or special file)",
                        ));
                    }
                }
            }
        }

        tracing::info!(
            files = report.files_copied,
            directories = report.directories_created,
            bytes = report.bytes_copied,
            skipped = report.skipped.len(),
            "extraction walk complete"
        );
        Ok(report)
    }

    /// Copy one file in chunked random-access reads up to its declared
    /// size; a zero-size file yields an empty destination file
    fn copy_file(
        &self,
        volume: &mut dyn FsVolume,
        rel_path: &str,
        declared_size: u64,
        dest_path: &Path,
    ) -> Result<u64> {
        let mut out = File::create(dest_path)?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut offset: u64 = 0;

        while offset < declared_size {
            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            let want = ((declared_size - offset) as usize).min(self.chunk_size);
            let got = volume.read_at(rel_path, offset, &mut buf[..want])?;
            if got == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "short read: {} of {} declared bytes",
                        offset, declared_size
                    ),
                )));
            }
            out.write_all(&buf[..got])?;
            offset += got as u64;
        }

        out.flush()?;
        Ok(offset)
    }
}

impl Default for ExtractionWalker {
    fn default() -> Self {
        Self::new()
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
