// src/fs/mod.rs

//! File-system capabilities injected into a compiler.
//!
//! Inputs and outputs are separate traits so a compiler can read from disk
//! and write into memory (or the other way round in tests).

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;

pub mod cached;
pub mod mock;

pub use cached::CachedInputFileSystem;
pub use mock::MemoryFileSystem;

/// Where sources are read from.
pub trait InputFileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Drop any internal read/stat caches. Implementations without a cache
    /// keep the default no-op.
    fn purge(&self) {}
}

/// Where assets are written to.
pub trait OutputFileSystem: Send + Sync + Debug {
    /// Create one directory. Fails with `AlreadyExists` if it is already
    /// there and `NotFound` if its parent is missing.
    fn mkdir(&self, path: &Path) -> io::Result<()>;
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl InputFileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

impl OutputFileSystem for RealFileSystem {
    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }
}
