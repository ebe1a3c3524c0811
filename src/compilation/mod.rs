// src/compilation/mod.rs

//! Compilation result: the record of one unit of work.
//!
//! A [`Compilation`] is mutable while its run is in progress (hooks adjust
//! it, the graph builder fills it, emission marks assets). Once emission is
//! over the compiler wraps it in an `Arc`; from then on it is sealed and
//! only read (by `after_emit`, `done`, the caller and the cache).

pub mod stats;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::cache::Fingerprint;
use crate::compiler::Compiler;

pub use stats::{AssetStats, ChunkStats, ModuleStats, Stats, StatsJson};

pub type CompilationId = u64;

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ModuleNotFound,
    ModuleBuild,
    Plugin,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::ModuleNotFound => "ModuleNotFoundError",
            DiagnosticKind::ModuleBuild => "ModuleBuildError",
            DiagnosticKind::Plugin => "PluginError",
        };
        f.write_str(name)
    }
}

/// Non-fatal error or warning attached to a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Identifier of the module that raised it, if any.
    pub module: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            module: None,
        }
    }

    pub fn module_not_found(request: &str, dir: &Path) -> Self {
        Self::new(
            DiagnosticKind::ModuleNotFound,
            format!(
                "Module not found: Error: Can't resolve '{}' in '{}'",
                request,
                dir.display()
            ),
        )
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(module) = &self.module {
            write!(f, " (in {module})")?;
        }
        Ok(())
    }
}

/// One resolved module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Context-relative id, e.g. `./src/a.js`.
    pub identifier: String,
    pub resource: PathBuf,
    /// Identifiers of the modules this one requires, in source order.
    pub dependencies: Vec<String>,
    pub fingerprint: Fingerprint,
    /// Rendered module function.
    pub artifact: Arc<str>,
    /// True when `artifact` came from the cache instead of being produced in
    /// this run.
    pub cached: bool,
}

impl Module {
    pub fn size(&self) -> usize {
        self.artifact.len()
    }
}

/// A group of modules written out as one or more files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub entry_module: String,
    pub modules: Vec<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content: Arc<[u8]>,
    /// Set once the asset has been written through the output file system.
    pub emitted: bool,
}

impl Asset {
    pub fn new(content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content: content.into(),
            emitted: false,
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

pub struct Compilation {
    id: CompilationId,
    name: Option<String>,
    compiler: Weak<Compiler>,
    /// Promote the first error diagnostic to a fatal failure.
    pub bail: bool,
    modules: BTreeMap<String, Module>,
    chunks: Vec<Chunk>,
    assets: BTreeMap<String, Asset>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    file_dependencies: BTreeSet<PathBuf>,
    missing_dependencies: BTreeSet<PathBuf>,
    children: Vec<Arc<Compilation>>,
}

impl fmt::Debug for Compilation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compilation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bail", &self.bail)
            .field("modules", &self.modules.len())
            .field("assets", &self.assets.keys().collect::<Vec<_>>())
            .field("errors", &self.errors.len())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

impl Compilation {
    pub fn new(
        id: CompilationId,
        name: Option<String>,
        compiler: Weak<Compiler>,
        bail: bool,
    ) -> Self {
        Self {
            id,
            name,
            compiler,
            bail,
            modules: BTreeMap::new(),
            chunks: Vec::new(),
            assets: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            file_dependencies: BTreeSet::new(),
            missing_dependencies: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> CompilationId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The compiler that produced this compilation, if it is still alive.
    pub fn compiler(&self) -> Option<Arc<Compiler>> {
        self.compiler.upgrade()
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.identifier.clone(), module);
    }

    pub fn module(&self, identifier: &str) -> Option<&Module> {
        self.modules.get(identifier)
    }

    /// Modules ordered by identifier.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Register an output file. Two different contents for the same name
    /// is a conflict and becomes an error diagnostic; the first one stays.
    pub fn emit_asset(&mut self, name: impl Into<String>, content: impl Into<Arc<[u8]>>) {
        let name = name.into();
        let content = content.into();
        if let Some(existing) = self.assets.get(&name) {
            if existing.content != content {
                self.push_error(Diagnostic::new(
                    DiagnosticKind::Plugin,
                    format!("Conflict: Multiple assets emit different content to the same filename {name}"),
                ));
            }
            return;
        }
        self.assets.insert(name, Asset::new(content));
    }

    /// Replace an asset's content (used by `emit` observers).
    pub fn update_asset(&mut self, name: &str, content: impl Into<Arc<[u8]>>) -> bool {
        match self.assets.get_mut(name) {
            Some(asset) => {
                asset.content = content.into();
                asset.emitted = false;
                true
            }
            None => false,
        }
    }

    pub fn delete_asset(&mut self, name: &str) -> Option<Asset> {
        self.assets.remove(name)
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.assets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    pub(crate) fn mark_emitted(&mut self, name: &str) {
        if let Some(asset) = self.assets.get_mut(name) {
            asset.emitted = true;
        }
    }

    pub fn push_error(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn push_warning(&mut self, diagnostic: Diagnostic) {
        self.warnings.push(diagnostic);
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.children.iter().any(|c| c.has_errors())
    }

    /// First error in this compilation, else the first one found in its
    /// children.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.errors
            .first()
            .or_else(|| self.children.iter().find_map(|c| c.first_error()))
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty() || self.children.iter().any(|c| c.has_warnings())
    }

    pub fn add_file_dependency(&mut self, path: impl Into<PathBuf>) {
        self.file_dependencies.insert(path.into());
    }

    pub fn add_missing_dependency(&mut self, path: impl Into<PathBuf>) {
        self.missing_dependencies.insert(path.into());
    }

    /// Files read while building; the watcher subscribes to these.
    pub fn file_dependencies(&self) -> &BTreeSet<PathBuf> {
        &self.file_dependencies
    }

    /// Paths probed during resolution that did not exist.
    pub fn missing_dependencies(&self) -> &BTreeSet<PathBuf> {
        &self.missing_dependencies
    }

    /// Attach a finished child compilation. Its assets join this
    /// compilation's assets; its files join the watched set.
    pub fn add_child(&mut self, child: Arc<Compilation>) {
        for (name, asset) in child.assets() {
            self.emit_asset(name, Arc::clone(&asset.content));
        }
        self.file_dependencies
            .extend(child.file_dependencies().iter().cloned());
        self.missing_dependencies
            .extend(child.missing_dependencies().iter().cloned());
        self.children.push(child);
    }

    pub fn children(&self) -> &[Arc<Compilation>] {
        &self.children
    }
}
