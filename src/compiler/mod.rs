// src/compiler/mod.rs

//! The compiler: owns options, hooks, the cache and the injected
//! collaborators, and drives runs through their phases.
//!
//! - `run.rs`: one-shot runs, child runs and the shared phase sequence.
//! - `emit.rs`: writing assets through the output file system.
//! - `watching.rs`: the watch session and its driver task.
//! - `state.rs`: the pure re-entrancy state machine.

pub mod emit;
pub mod parent;
pub mod plugin;
pub mod run;
pub mod state;
pub mod watching;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, error, warn};

use crate::builder::{GraphBuilder, SimpleGraphBuilder};
use crate::cache::Cache;
use crate::compilation::{Compilation, CompilationId, Stats};
use crate::config::{CompilerOptions, validate_options};
use crate::errors::{CompileError, ConfigError};
use crate::fs::{CachedInputFileSystem, InputFileSystem, OutputFileSystem, RealFileSystem};
use crate::hooks::{CompilerHooks, InvalidEvent};
use crate::watch::{ChangeSet, NotifyWatchFileSystem, WatchFileSystem};

pub use parent::{CompilationRef, ParentMarker};
pub use plugin::{NoEmitOnErrorsPlugin, Plugin};
pub use state::CompilerState;
pub use watching::{WatchPhase, Watching};

pub struct Compiler {
    hooks: CompilerHooks,
    options: CompilerOptions,
    state: Mutex<CompilerState>,
    /// Held for a run's whole phase sequence, `after_done` included. A run
    /// started from a callback or hook waits here for the previous one.
    lifecycle: Arc<tokio::sync::Mutex<()>>,
    cache: Option<Arc<Cache>>,
    parent_compilation: RwLock<ParentMarker>,
    input_file_system: RwLock<Arc<dyn InputFileSystem>>,
    output_file_system: RwLock<Arc<dyn OutputFileSystem>>,
    watch_file_system: RwLock<Arc<dyn WatchFileSystem>>,
    graph_builder: Arc<dyn GraphBuilder>,
    /// Change set behind the current watch run.
    changes: Mutex<ChangeSet>,
    /// Shared with child compilers so compilation ids stay unique.
    next_compilation_id: Arc<AtomicU64>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("name", &self.options.name)
            .field("state", &*self.lock_state())
            .field("is_child", &self.is_child())
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn builder(options: CompilerOptions) -> CompilerBuilder {
        CompilerBuilder::new(options)
    }

    pub fn hooks(&self) -> &CompilerHooks {
        &self.hooks
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.as_ref()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, CompilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CompilerState {
        *self.lock_state()
    }

    /// True while a run (one-shot, child or watch run) is in flight.
    pub fn running(&self) -> bool {
        self.lock_state().is_running()
    }

    /// True from `watch` until the session is fully closed.
    pub fn watch_mode(&self) -> bool {
        self.lock_state().is_watching()
    }

    pub fn input_file_system(&self) -> Arc<dyn InputFileSystem> {
        Arc::clone(&self.input_file_system.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_input_file_system(&self, fs: Arc<dyn InputFileSystem>) {
        *self.input_file_system.write().unwrap_or_else(PoisonError::into_inner) = fs;
    }

    pub fn output_file_system(&self) -> Arc<dyn OutputFileSystem> {
        Arc::clone(&self.output_file_system.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_output_file_system(&self, fs: Arc<dyn OutputFileSystem>) {
        *self.output_file_system.write().unwrap_or_else(PoisonError::into_inner) = fs;
    }

    pub fn watch_file_system(&self) -> Arc<dyn WatchFileSystem> {
        Arc::clone(&self.watch_file_system.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_watch_file_system(&self, fs: Arc<dyn WatchFileSystem>) {
        *self.watch_file_system.write().unwrap_or_else(PoisonError::into_inner) = fs;
    }

    /// Drop the input file system's read caches, if it has any.
    pub fn purge_input_file_system(&self) {
        debug!("purging input file system");
        self.input_file_system().purge();
    }

    pub fn parent_compilation(&self) -> ParentMarker {
        self.parent_compilation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_parent_compilation(&self, marker: impl Into<ParentMarker>) {
        *self
            .parent_compilation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = marker.into();
    }

    /// Whether this compiler runs on behalf of another compilation. Uses
    /// the loose truthiness of [`ParentMarker`].
    pub fn is_child(&self) -> bool {
        self.parent_compilation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_truthy()
    }

    /// Files changed since the previous watch run.
    pub fn modified_files(&self) -> BTreeSet<PathBuf> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .changed
            .clone()
    }

    /// Files removed since the previous watch run.
    pub fn removed_files(&self) -> BTreeSet<PathBuf> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .removed
            .clone()
    }

    pub(crate) fn set_changes(&self, changes: ChangeSet) {
        *self.changes.lock().unwrap_or_else(PoisonError::into_inner) = changes;
    }

    fn changes_snapshot(&self) -> ChangeSet {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_id(&self) -> CompilationId {
        self.next_compilation_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn new_compilation(self: &Arc<Self>) -> Compilation {
        Compilation::new(
            self.next_id(),
            self.options.name.clone(),
            Arc::downgrade(self),
            self.options.bail,
        )
    }

    /// Build a compiler that works on behalf of `compilation`.
    ///
    /// The child shares file systems, graph builder, cache and id counter
    /// with this compiler but has its own hook table, so `plugins` only see
    /// the child. `entry` replaces the parent's entries when given.
    pub fn create_child_compiler(
        self: &Arc<Self>,
        compilation: &Compilation,
        name: &str,
        entry: Option<BTreeMap<String, String>>,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Arc<Compiler> {
        let mut options = self.options.clone();
        options.name = Some(match &self.options.name {
            Some(parent) => format!("{parent}/{name}"),
            None => name.to_string(),
        });
        if let Some(entry) = entry {
            options.entry = entry;
        }

        let child = Arc::new(Compiler {
            hooks: CompilerHooks::new(),
            options,
            state: Mutex::new(CompilerState::Idle),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            cache: self.cache.clone(),
            parent_compilation: RwLock::new(ParentMarker::from(compilation)),
            input_file_system: RwLock::new(self.input_file_system()),
            output_file_system: RwLock::new(self.output_file_system()),
            watch_file_system: RwLock::new(self.watch_file_system()),
            graph_builder: Arc::clone(&self.graph_builder),
            changes: Mutex::new(self.changes_snapshot()),
            next_compilation_id: Arc::clone(&self.next_compilation_id),
        });
        for plugin in &plugins {
            debug!(plugin = plugin.name(), child = name, "applying plugin to child compiler");
            plugin.apply(&child);
        }
        child
    }

    /// Log a compilation's diagnostics. Child compilers stay quiet; their
    /// parent reports them once the child is attached.
    pub(crate) fn report_diagnostics(&self, compilation: &Compilation) {
        if self.is_child() {
            if compilation.has_errors() || compilation.has_warnings() {
                debug!(
                    errors = compilation.errors().len(),
                    warnings = compilation.warnings().len(),
                    "child compilation diagnostics left to the parent"
                );
            }
            return;
        }
        report_tree(compilation);
    }

    // Errors from these observers cannot change the outcome of a run that
    // has already ended, so they are logged.

    pub(crate) fn call_failed(&self, err: &CompileError) {
        if let Err(hook_err) = self.hooks.failed.call(err) {
            warn!(error = %hook_err, "failed hook observer errored");
        }
    }

    pub(crate) fn call_after_done(&self, stats: Option<Stats>) {
        if let Err(hook_err) = self.hooks.after_done.call(&stats) {
            warn!(error = %hook_err, "after_done hook observer errored");
        }
    }

    pub(crate) fn call_invalid(&self, event: InvalidEvent) {
        if let Err(hook_err) = self.hooks.invalid.call(&event) {
            warn!(error = %hook_err, "invalid hook observer errored");
        }
    }

    pub(crate) fn call_watch_close(&self) {
        if let Err(hook_err) = self.hooks.watch_close.call(&()) {
            warn!(error = %hook_err, "watch_close hook observer errored");
        }
    }
}

fn report_tree(compilation: &Compilation) {
    for e in compilation.errors() {
        error!(compilation = compilation.name().unwrap_or_default(), "{e}");
    }
    for w in compilation.warnings() {
        warn!(compilation = compilation.name().unwrap_or_default(), "{w}");
    }
    for child in compilation.children() {
        report_tree(child);
    }
}

/// Assembles a [`Compiler`] with its collaborators and plugins.
pub struct CompilerBuilder {
    options: CompilerOptions,
    input_file_system: Option<Arc<dyn InputFileSystem>>,
    output_file_system: Option<Arc<dyn OutputFileSystem>>,
    watch_file_system: Option<Arc<dyn WatchFileSystem>>,
    graph_builder: Option<Arc<dyn GraphBuilder>>,
    plugins: Vec<Box<dyn Plugin>>,
    parent: ParentMarker,
}

impl fmt::Debug for CompilerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerBuilder")
            .field("options", &self.options)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl CompilerBuilder {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            input_file_system: None,
            output_file_system: None,
            watch_file_system: None,
            graph_builder: None,
            plugins: Vec::new(),
            parent: ParentMarker::Null,
        }
    }

    pub fn input_file_system(mut self, fs: Arc<dyn InputFileSystem>) -> Self {
        self.input_file_system = Some(fs);
        self
    }

    pub fn output_file_system(mut self, fs: Arc<dyn OutputFileSystem>) -> Self {
        self.output_file_system = Some(fs);
        self
    }

    pub fn watch_file_system(mut self, fs: Arc<dyn WatchFileSystem>) -> Self {
        self.watch_file_system = Some(fs);
        self
    }

    pub fn graph_builder(mut self, builder: Arc<dyn GraphBuilder>) -> Self {
        self.graph_builder = Some(builder);
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn boxed_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn parent_compilation(mut self, marker: impl Into<ParentMarker>) -> Self {
        self.parent = marker.into();
        self
    }

    /// Validate options, create the compiler and apply plugins: the ones
    /// passed in first, then the built-ins implied by the options.
    pub fn build(self) -> Result<Arc<Compiler>, ConfigError> {
        validate_options(&self.options)?;

        let cache = self.options.cache.then(|| Arc::new(Cache::new()));
        let no_emit_on_errors = self.options.optimization.no_emit_on_errors;

        let compiler = Arc::new(Compiler {
            hooks: CompilerHooks::new(),
            options: self.options,
            state: Mutex::new(CompilerState::Idle),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            cache,
            parent_compilation: RwLock::new(self.parent),
            input_file_system: RwLock::new(
                self.input_file_system
                    .unwrap_or_else(|| Arc::new(CachedInputFileSystem::new(RealFileSystem))),
            ),
            output_file_system: RwLock::new(
                self.output_file_system
                    .unwrap_or_else(|| Arc::new(RealFileSystem)),
            ),
            watch_file_system: RwLock::new(
                self.watch_file_system
                    .unwrap_or_else(|| Arc::new(NotifyWatchFileSystem::new())),
            ),
            graph_builder: self
                .graph_builder
                .unwrap_or_else(|| Arc::new(SimpleGraphBuilder::new())),
            changes: Mutex::new(ChangeSet::new()),
            next_compilation_id: Arc::new(AtomicU64::new(0)),
        });

        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), "applying plugin");
            plugin.apply(&compiler);
        }
        if no_emit_on_errors {
            NoEmitOnErrorsPlugin.apply(&compiler);
        }
        Ok(compiler)
    }

    /// [`CompilerBuilder::build`] and start a run right away. Invalid
    /// options are returned as an error and `callback` is never called.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<F>(self, callback: F) -> Result<Arc<Compiler>, ConfigError>
    where
        F: FnOnce(crate::errors::Result<Stats>) + Send + 'static,
    {
        let compiler = self.build()?;
        compiler.run(callback);
        Ok(compiler)
    }
}
