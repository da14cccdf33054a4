//! In-memory volume for fixtures and parity checks
//!
//! A synthetic [`FsVolume`] built from explicit files, directories, and
//! unusable entries. Lets the walker and coordinator be exercised against
//! small known trees, including trees that deliberately expose the
//! self/parent pseudo-entries or fail on selected paths.

use imgrecon_core::{EntryInfo, Error, FsBinding, FsVolume, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone)]
enum Node {
    Dir(BTreeMap<String, Node>),
    File(Vec<u8>),
    Other,
}

/// A synthetic in-memory filesystem volume
#[derive(Debug, Clone)]
pub struct MemoryVolume {
    root: BTreeMap<String, Node>,
    emit_pseudo: bool,
    poisoned_files: HashSet<String>,
    poisoned_dirs: HashSet<String>,
}

impl MemoryVolume {
    /// Create an empty volume
    pub fn new() -> Self {
        Self {
            root: BTreeMap::new(),
            emit_pseudo: false,
            poisoned_files: HashSet::new(),
            poisoned_dirs: HashSet::new(),
        }
    }

    /// Emit `.` and `..` in every directory listing, as bindings over
    /// real filesystem formats do
    pub fn with_pseudo_entries(mut self) -> Self {
        self.emit_pseudo = true;
        self
    }

    /// Add a regular file, creating intermediate directories
    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        self.insert(path, Node::File(content.to_vec()));
    }

    /// Add a directory, creating intermediate directories
    pub fn add_dir(&mut self, path: &str) {
        self.insert(path, Node::Dir(BTreeMap::new()));
    }

    /// Add an entry of unusable type (symlink, device node)
    pub fn add_other(&mut self, path: &str) {
        self.insert(path, Node::Other);
    }

    /// Make reads of `path` fail, to exercise per-entry absorption
    pub fn poison_file(&mut self, path: &str) {
        self.poisoned_files.insert(path.to_string());
    }

    /// Make listing `path` fail ("" poisons the root)
    pub fn poison_dir(&mut self, path: &str) {
        self.poisoned_dirs.insert(path.to_string());
    }

    fn insert(&mut self, path: &str, node: Node) {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some(last) = parts.pop() else { return };

        let mut current = &mut self.root;
        for part in parts {
            let next = current
                .entry(part.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            match next {
                Node::Dir(children) => current = children,
                // A non-directory in the middle of the path: replace it
                other => {
                    *other = Node::Dir(BTreeMap::new());
                    match other {
                        Node::Dir(children) => current = children,
                        _ => unreachable!(),
                    }
                }
            }
        }
        current.insert(last.to_string(), node);
    }

    fn resolve(&self, path: &str) -> Option<&Node> {
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        let first = parts.next()?;
        let mut node = self.root.get(first)?;
        for part in parts {
            match node {
                Node::Dir(children) => node = children.get(part)?,
                _ => return None,
            }
        }
        Some(node)
    }

    fn dir_children(&self, path: &str) -> Result<&BTreeMap<String, Node>> {
        if path.is_empty() {
            return Ok(&self.root);
        }
        match self.resolve(path) {
            Some(Node::Dir(children)) => Ok(children),
            Some(_) => Err(Error::not_found(format!("{path} is not a directory"))),
            None => Err(Error::not_found(path.to_string())),
        }
    }
}

impl Default for MemoryVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl FsVolume for MemoryVolume {
    fn identify(&self) -> &str {
        "memory"
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<EntryInfo>> {
        if self.poisoned_dirs.contains(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("corrupt directory index: {path}"),
            )));
        }

        let mut entries = Vec::new();
        if self.emit_pseudo {
            entries.push(EntryInfo::directory("."));
            entries.push(EntryInfo::directory(".."));
        }
        for (name, node) in self.dir_children(path)? {
            entries.push(match node {
                Node::Dir(_) => EntryInfo::directory(name.clone()),
                Node::File(content) => EntryInfo::file(name.clone(), content.len() as u64),
                Node::Other => EntryInfo::other(name.clone()),
            });
        }
        Ok(entries)
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.poisoned_files.contains(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unreadable cluster run: {path}"),
            )));
        }

        let content = match self.resolve(path) {
            Some(Node::File(content)) => content,
            Some(_) => return Err(Error::not_found(format!("{path} is not a file"))),
            None => return Err(Error::not_found(path.to_string())),
        };

        let offset = offset as usize;
        if offset >= content.len() {
            return Ok(0);
        }
        let n = buf.len().min(content.len() - offset);
        buf[..n].copy_from_slice(&content[offset..offset + n]);
        Ok(n)
    }
}

/// Binding that hands out clones of a prepared [`MemoryVolume`]
///
/// The image path is still validated so coordinator preconditions behave
/// as they would with a real binding.
pub struct MemoryBinding {
    template: MemoryVolume,
}

impl MemoryBinding {
    pub fn new(template: MemoryVolume) -> Self {
        Self { template }
    }
}

impl FsBinding for MemoryBinding {
    fn identify(&self) -> &str {
        "memory"
    }

    fn open(&self, image_path: &Path, _offset_bytes: u64) -> Result<Box<dyn FsVolume>> {
        let meta = std::fs::metadata(image_path)
            .map_err(|_| Error::image_not_found(image_path.display().to_string()))?;
        if meta.len() == 0 {
            return Err(Error::image_not_found(format!(
                "{} is empty",
                image_path.display()
            )));
        }
        Ok(Box::new(self.template.clone()))
    }
}
