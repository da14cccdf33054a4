//! NTFS filesystem binding
//!
//! Opens an NTFS filesystem at a byte offset inside a raw image using the
//! [ntfs crate](https://crates.io/crates/ntfs) over an
//! [`ImageWindow`](imgrecon_pipeline::ImageWindow), read-only. Every call
//! navigates from the root by path, which keeps the volume object-safe
//! behind [`FsVolume`] at the cost of re-walking the index per call.

use imgrecon_core::{EntryInfo, Error, FsBinding, FsVolume, Result};
use imgrecon_pipeline::ImageWindow;
use ntfs::structured_values::NtfsFileNamespace;
use ntfs::{Ntfs, NtfsFile, NtfsReadSeek};
use std::fs::File;
use std::io::{BufReader, SeekFrom};
use std::path::Path;

/// FILE_ATTRIBUTE_REPARSE_POINT: the entry is a symlink or junction
const ATTR_REPARSE_POINT: u32 = 0x0400;

type Reader = BufReader<ImageWindow<File>>;

/// Binding that opens NTFS volumes out of raw images
#[derive(Debug, Default, Clone, Copy)]
pub struct NtfsBinding;

impl NtfsBinding {
    pub fn new() -> Self {
        Self
    }
}

impl FsBinding for NtfsBinding {
    fn identify(&self) -> &str {
        "ntfs"
    }

    fn open(&self, image_path: &Path, offset_bytes: u64) -> Result<Box<dyn FsVolume>> {
        let meta = std::fs::metadata(image_path)
            .map_err(|_| Error::image_not_found(image_path.display().to_string()))?;
        if meta.len() == 0 {
            return Err(Error::image_not_found(format!(
                "{} is empty",
                image_path.display()
            )));
        }
        if offset_bytes >= meta.len() {
            return Err(Error::offset_invalid(format!(
                "offset {} beyond image end {}",
                offset_bytes,
                meta.len()
            )));
        }

        let window = ImageWindow::open_path(image_path, offset_bytes)?;
        let mut reader = BufReader::new(window);
        let ntfs = Ntfs::new(&mut reader)
            .map_err(|e| Error::binding_unavailable(format!("not an NTFS filesystem: {e}")))?;

        let identifier = format!("NTFS (cluster size {})", ntfs.cluster_size());
        Ok(Box::new(NtfsVolume {
            ntfs,
            reader,
            identifier,
        }))
    }
}

/// A read-only NTFS volume opened at a byte offset
pub struct NtfsVolume {
    ntfs: Ntfs,
    reader: Reader,
    identifier: String,
}

impl FsVolume for NtfsVolume {
    fn identify(&self) -> &str {
        &self.identifier
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<EntryInfo>> {
        let ntfs = &self.ntfs;
        let reader = &mut self.reader;
        let dir = find_by_path(ntfs, reader, path)?;
        if !dir.is_directory() {
            return Err(Error::not_found(format!("not a directory: {path}")));
        }

        let index = dir
            .directory_index(reader)
            .map_err(|e| Error::binding_unavailable(format!("cannot read directory index: {e}")))?;
        let mut iter = index.entries();
        let mut entries = Vec::new();

        while let Some(entry_result) = iter.next(reader) {
            let entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(path, error = %e, "unreadable directory entry");
                    continue;
                }
            };
            let filename = match entry.key() {
                Some(Ok(key)) => key,
                _ => continue,
            };
            // The short 8.3 names duplicate Win32 names
            if filename.namespace() == NtfsFileNamespace::Dos {
                continue;
            }

            let name = filename.name().to_string_lossy();
            // NTFS metadata files are format internals, not content
            if name.starts_with('$') {
                continue;
            }

            let attributes = filename.file_attributes().bits();
            entries.push(if filename.is_directory() {
                EntryInfo::directory(name)
            } else if attributes & ATTR_REPARSE_POINT != 0 {
                EntryInfo::other(name)
            } else {
                EntryInfo::file(name, filename.data_size())
            });
        }

        Ok(entries)
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let ntfs = &self.ntfs;
        let reader = &mut self.reader;
        let file = find_by_path(ntfs, reader, path)?;

        // Unnamed $DATA attribute holds the file content
        let item = file
            .data(reader, "")
            .ok_or_else(|| Error::not_found(format!("no data attribute: {path}")))?
            .map_err(|e| Error::binding_unavailable(format!("cannot read data run: {e}")))?;
        let attribute = item
            .to_attribute()
            .map_err(|e| Error::binding_unavailable(format!("bad data attribute: {e}")))?;
        let mut value = attribute
            .value(reader)
            .map_err(|e| Error::binding_unavailable(format!("bad attribute value: {e}")))?;

        value
            .seek(reader, SeekFrom::Start(offset))
            .map_err(|e| Error::binding_unavailable(format!("seek failed at {offset}: {e}")))?;
        let n = value
            .read(reader, buf)
            .map_err(|e| Error::binding_unavailable(format!("read failed at {offset}: {e}")))?;
        Ok(n)
    }
}

/// Navigate from the root directory to `path` ("" is the root)
fn find_by_path<'n>(ntfs: &'n Ntfs, reader: &mut Reader, path: &str) -> Result<NtfsFile<'n>> {
    let mut current = ntfs
        .root_directory(reader)
        .map_err(|e| Error::binding_unavailable(format!("cannot open root directory: {e}")))?;

    for part in path.split('/').filter(|p| !p.is_empty()) {
        let index = current
            .directory_index(reader)
            .map_err(|e| Error::not_found(format!("cannot read directory index: {e}")))?;
        let mut iter = index.entries();
        let mut found = None;

        while let Some(entry_result) = iter.next(reader) {
            let entry = match entry_result {
                Ok(e) => e,
                Err(_) => continue,
            };
            if let Some(Ok(key)) = entry.key() {
                if key.name().to_string_lossy() == part {
                    found = Some(entry.file_reference());
                    break;
                }
            }
        }

        let file_ref =
            found.ok_or_else(|| Error::not_found(format!("path component not found: {part}")))?;
        current = file_ref
            .to_file(ntfs, reader)
            .map_err(|e| Error::not_found(format!("cannot open '{part}': {e}")))?;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_image_is_rejected() {
        let binding = NtfsBinding::new();
        let result = binding.open(Path::new("/nonexistent/disk.dd"), 0);
        assert!(matches!(result, Err(Error::ImageNotFound(_))));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("empty.dd");
        std::fs::write(&image, b"").unwrap();

        let result = NtfsBinding::new().open(&image, 0);
        assert!(matches!(result, Err(Error::ImageNotFound(_))));
    }

    #[test]
    fn test_offset_beyond_end_is_rejected() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("disk.dd");
        std::fs::write(&image, vec![0u8; 1024]).unwrap();

        let result = NtfsBinding::new().open(&image, 4096);
        assert!(matches!(result, Err(Error::OffsetInvalid(_))));
    }

    #[test]
    fn test_non_ntfs_content_is_binding_unavailable() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("random.dd");
        std::fs::write(&image, vec![0x5Au8; 64 * 1024]).unwrap();

        let result = NtfsBinding::new().open(&image, 0);
        assert!(matches!(result, Err(Error::BindingUnavailable(_))));
    }
}
