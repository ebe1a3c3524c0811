// src/builder/mod.rs

//! Graph-building collaborator abstraction.
//!
//! The compiler never resolves or renders modules itself. It hands a fresh
//! [`Compilation`] to a [`GraphBuilder`] which fills in modules, chunks,
//! assets and diagnostics, consulting the artifact cache on the way.
//!
//! - [`SimpleGraphBuilder`] is the default implementation: a CommonJS
//!   bundler used by the binary and the integration tests.
//! - Tests can provide their own builder that, for example, fails on
//!   demand or blocks until released.

pub mod resolve;
pub mod runtime;
pub mod simple;

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use crate::cache::Cache;
use crate::compilation::Compilation;
use crate::config::CompilerOptions;
use crate::errors::Result;
use crate::fs::InputFileSystem;
use crate::watch::ChangeSet;

pub use simple::SimpleGraphBuilder;

/// Everything a builder may read for one build.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub options: &'a CompilerOptions,
    pub input_file_system: &'a dyn InputFileSystem,
    /// `None` when caching is disabled.
    pub cache: Option<&'a Cache>,
    /// Files that changed since the previous watch run; empty otherwise.
    pub changes: &'a ChangeSet,
}

impl Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("context", &self.options.context)
            .field("cached", &self.cache.is_some())
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

pub type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Produces the module graph and assets of a compilation.
///
/// Unresolvable requests and malformed sources become diagnostics on the
/// compilation. An `Err` means the build itself could not proceed (for
/// example an input could not be read) and fails the run.
pub trait GraphBuilder: Send + Sync + Debug {
    fn build<'a>(&'a self, ctx: BuildContext<'a>, compilation: &'a mut Compilation)
    -> BuildFuture<'a>;
}
