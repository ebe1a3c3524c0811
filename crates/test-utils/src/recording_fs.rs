use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use packwatch::fs::{InputFileSystem, MemoryFileSystem, OutputFileSystem};

/// One call made against a [`RecordingOutputFileSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Mkdir(PathBuf),
    Write(PathBuf),
}

/// Output file system that stores into memory and records every call.
#[derive(Debug, Default)]
pub struct RecordingOutputFileSystem {
    storage: MemoryFileSystem,
    ops: Mutex<Vec<FsOp>>,
    fail_writes: AtomicBool,
}

impl RecordingOutputFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage(&self) -> &MemoryFileSystem {
        &self.storage
    }

    pub fn ops(&self) -> Vec<FsOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Paths passed to `write_file`, in call order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FsOp::Write(p) => Some(p),
                FsOp::Mkdir(_) => None,
            })
            .collect()
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        self.storage.read_to_string(path).ok()
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.storage.exists(path)
    }

    /// Make every following `write_file` fail with `PermissionDenied`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }
}

impl OutputFileSystem for RecordingOutputFileSystem {
    fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.ops.lock().unwrap().push(FsOp::Mkdir(path.to_path_buf()));
        self.storage.mkdir(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.ops.lock().unwrap().push(FsOp::Write(path.to_path_buf()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write refused: {}", path.display()),
            ));
        }
        self.storage.write_file(path, contents)
    }
}

/// Input file system over a [`MemoryFileSystem`] that counts reads and
/// purges.
#[derive(Debug, Clone)]
pub struct CountingInputFileSystem {
    inner: MemoryFileSystem,
    reads: Arc<AtomicUsize>,
    purges: Arc<AtomicUsize>,
}

impl CountingInputFileSystem {
    pub fn new(inner: MemoryFileSystem) -> Self {
        Self {
            inner,
            reads: Arc::new(AtomicUsize::new(0)),
            purges: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn inner(&self) -> &MemoryFileSystem {
        &self.inner
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }
}

impl InputFileSystem for CountingInputFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn purge(&self) {
        self.purges.fetch_add(1, Ordering::SeqCst);
    }
}
