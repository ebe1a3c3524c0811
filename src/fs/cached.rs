// src/fs/cached.rs

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::InputFileSystem;

#[derive(Debug, Default)]
struct Entries {
    contents: HashMap<PathBuf, Arc<[u8]>>,
    stats: HashMap<PathBuf, Kind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
    Missing,
}

/// Wraps another input file system and remembers reads and stats until
/// [`InputFileSystem::purge`] is called.
///
/// Watch mode purges it before each run caused by file changes so edited
/// files are re-read.
#[derive(Debug)]
pub struct CachedInputFileSystem<F> {
    inner: F,
    entries: Mutex<Entries>,
}

impl<F: InputFileSystem> CachedInputFileSystem<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Number of cached file contents.
    pub fn cached_reads(&self) -> usize {
        self.lock().contents.len()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn kind(&self, path: &Path) -> Kind {
        if let Some(kind) = self.lock().stats.get(path) {
            return *kind;
        }
        let kind = if self.inner.is_file(path) {
            Kind::File
        } else if self.inner.is_dir(path) {
            Kind::Dir
        } else {
            Kind::Missing
        };
        self.lock().stats.insert(path.to_path_buf(), kind);
        kind
    }
}

impl<F: InputFileSystem> InputFileSystem for CachedInputFileSystem<F> {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(content) = self.lock().contents.get(path) {
            return Ok(content.to_vec());
        }
        let content = self.inner.read(path)?;
        self.lock()
            .contents
            .insert(path.to_path_buf(), Arc::from(content.as_slice()));
        Ok(content)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.kind(path) == Kind::File
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.kind(path) == Kind::Dir
    }

    fn purge(&self) {
        let mut entries = self.lock();
        debug!(
            contents = entries.contents.len(),
            stats = entries.stats.len(),
            "purging input file system cache"
        );
        entries.contents.clear();
        entries.stats.clear();
        drop(entries);
        self.inner.purge();
    }
}
