// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{InputFileSystem, OutputFileSystem};

#[derive(Debug, Clone)]
pub enum MemoryEntry {
    File(Arc<[u8]>),
    Dir(BTreeSet<String>),
}

/// In-memory file system implementing both input and output sides.
///
/// `mkdir` behaves like `mkdir(2)`: it fails on existing paths and on
/// missing parents. `add_file` creates parents implicitly to keep fixtures
/// short. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MemoryEntry>>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {}", path.display()))
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), MemoryEntry::Dir(BTreeSet::new()));
        entries.insert(PathBuf::from("."), MemoryEntry::Dir(BTreeSet::new()));
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a file, creating parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let content: Vec<u8> = content.into();
        let mut entries = self.lock();
        if let Some(parent) = parent_of(path) {
            ensure_dir(&mut entries, parent);
            link_child(&mut entries, parent, path);
        }
        entries.insert(path.to_path_buf(), MemoryEntry::File(Arc::from(content)));
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut entries = self.lock();
        let removed = entries.remove(path).is_some();
        if let (Some(parent), Some(name)) = (parent_of(path), path.file_name()) {
            if let Some(MemoryEntry::Dir(children)) = entries.get_mut(parent) {
                children.remove(&name.to_string_lossy().into_owned());
            }
        }
        removed
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains_key(path.as_ref())
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> io::Result<String> {
        let bytes = self.read(path.as_ref())?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Every file path currently stored, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock()
            .iter()
            .filter(|(_, e)| matches!(e, MemoryEntry::File(_)))
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn list_dir(&self, path: impl AsRef<Path>) -> io::Result<Vec<String>> {
        let path = path.as_ref();
        match self.lock().get(path) {
            Some(MemoryEntry::Dir(children)) => Ok(children.iter().cloned().collect()),
            Some(MemoryEntry::File(_)) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }
}

fn ensure_dir(entries: &mut BTreeMap<PathBuf, MemoryEntry>, path: &Path) {
    if entries.contains_key(path) {
        return;
    }
    entries.insert(path.to_path_buf(), MemoryEntry::Dir(BTreeSet::new()));
    if let Some(parent) = parent_of(path) {
        if parent != path {
            ensure_dir(entries, parent);
            link_child(entries, parent, path);
        }
    }
}

fn link_child(entries: &mut BTreeMap<PathBuf, MemoryEntry>, parent: &Path, child: &Path) {
    if let (Some(MemoryEntry::Dir(children)), Some(name)) =
        (entries.get_mut(parent), child.file_name())
    {
        children.insert(name.to_string_lossy().into_owned());
    }
}

impl InputFileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().get(path) {
            Some(MemoryEntry::File(content)) => Ok(content.to_vec()),
            Some(MemoryEntry::Dir(_)) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MemoryEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MemoryEntry::Dir(_)))
    }
}

impl OutputFileSystem for MemoryFileSystem {
    fn mkdir(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        let parent = parent_of(path).ok_or_else(|| not_found(path))?;
        match entries.get(parent) {
            Some(MemoryEntry::Dir(_)) => {}
            Some(MemoryEntry::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", parent.display()),
                ));
            }
            None => return Err(not_found(parent)),
        }
        entries.insert(path.to_path_buf(), MemoryEntry::Dir(BTreeSet::new()));
        link_child(&mut entries, parent, path);
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut entries = self.lock();
        let parent = parent_of(path).ok_or_else(|| not_found(path))?;
        if !matches!(entries.get(parent), Some(MemoryEntry::Dir(_))) {
            return Err(not_found(parent));
        }
        if matches!(entries.get(path), Some(MemoryEntry::Dir(_))) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            ));
        }
        entries.insert(path.to_path_buf(), MemoryEntry::File(Arc::from(contents)));
        link_child(&mut entries, parent, path);
        Ok(())
    }
}
