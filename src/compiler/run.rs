// src/compiler/run.rs

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::builder::BuildContext;
use crate::compilation::{Compilation, Stats};
use crate::errors::{CompileError, Result};
use crate::watch::ChangeSet;

use super::Compiler;

impl Compiler {
    /// Start one run.
    ///
    /// The re-entrancy check happens before this returns: if a run or watch
    /// is already active, `callback` gets `Err(ConcurrentCompilation)`
    /// right away and no hook fires. Otherwise the phases run on a spawned
    /// task and `callback` is invoked once they are over, followed by
    /// `after_done`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Result<Stats>) + Send + 'static,
    {
        let begun = self.lock_state().begin_run();
        if let Err(err) = begun {
            warn!(compiler = self.name().unwrap_or_default(), "run rejected: {err}");
            callback(Err(err));
            return;
        }

        let compiler = Arc::clone(self);
        tokio::spawn(async move {
            let _gate = Arc::clone(&compiler.lifecycle).lock_owned().await;
            info!(compiler = compiler.name().unwrap_or_default(), "run started");
            compiler.set_changes(ChangeSet::new());

            let phases = tokio::spawn({
                let compiler = Arc::clone(&compiler);
                async move { compiler.run_phases().await }
            });
            let result = phases.await.unwrap_or_else(|err| Err(aborted(err)));
            if let Err(err) = &result {
                compiler.call_failed(err);
            }
            compiler.lock_state().end_run();

            match result {
                Ok(stats) => {
                    info!(
                        errors = stats.compilation().errors().len(),
                        warnings = stats.compilation().warnings().len(),
                        elapsed_ms = stats.duration().as_millis() as u64,
                        "run finished"
                    );
                    callback(Ok(stats.clone()));
                    compiler.call_after_done(Some(stats));
                }
                Err(err) => {
                    warn!(error = %err, "run failed");
                    callback(Err(err));
                    compiler.call_after_done(None);
                }
            }
        });
    }

    /// [`Compiler::run`] as a future resolving to the callback's value.
    ///
    /// The future may resolve before `after_done` observers have run.
    pub async fn run_async(self: &Arc<Self>) -> Result<Stats> {
        let (tx, rx) = oneshot::channel();
        self.run(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .map_err(|_| CompileError::Other(anyhow!("run task ended without reporting a result")))?
    }

    /// Compile on behalf of a parent compilation: `this_compilation`,
    /// `compilation`, build, `after_compile`. No emission, no `done`, no
    /// `after_done`; the caller attaches the result with
    /// [`Compilation::add_child`].
    pub async fn run_as_child(self: &Arc<Self>) -> Result<Arc<Compilation>> {
        let begun = self.lock_state().begin_run();
        begun?;
        let _gate = Arc::clone(&self.lifecycle).lock_owned().await;
        debug!(compiler = self.name().unwrap_or_default(), "child run started");

        let result = self.compile().await;
        if let Err(err) = &result {
            self.call_failed(err);
        }
        self.lock_state().end_run();
        result.map(Arc::new)
    }

    async fn run_phases(self: &Arc<Self>) -> Result<Stats> {
        let started = Instant::now();
        self.hooks.before_run.call(Arc::clone(self)).await?;
        self.hooks.run.call(Arc::clone(self)).await?;
        let compilation = self.compile().await?;
        self.emit_and_seal(compilation, started).await
    }

    /// Create a compilation and let the graph builder fill it.
    pub(crate) async fn compile(self: &Arc<Self>) -> Result<Compilation> {
        let mut compilation = self.new_compilation();
        self.hooks.this_compilation.call(&mut compilation)?;
        self.hooks.compilation.call(&mut compilation)?;

        let changes = self.changes_snapshot();
        let input = self.input_file_system();
        let ctx = BuildContext {
            options: &self.options,
            input_file_system: input.as_ref(),
            cache: self.cache.as_deref(),
            changes: &changes,
        };
        self.graph_builder.build(ctx, &mut compilation).await?;

        if let Some(cache) = &self.cache {
            if !self.is_child() {
                let mut reachable = Vec::new();
                collect_module_ids(&compilation, &mut reachable);
                cache.retain_reachable(reachable.iter().map(String::as_str));
            }
        }

        self.report_diagnostics(&compilation);
        self.hooks.after_compile.call(&compilation)?;
        Ok(compilation)
    }

    /// Bail check, optional emission, then seal the compilation and fire
    /// `after_emit` and `done`.
    pub(crate) async fn emit_and_seal(
        self: &Arc<Self>,
        mut compilation: Compilation,
        started: Instant,
    ) -> Result<Stats> {
        if compilation.bail {
            if let Some(first) = compilation.first_error() {
                return Err(CompileError::Bail(first.clone()));
            }
        }

        let should_emit = self.hooks.should_emit.call(&compilation)?.unwrap_or(true);
        if should_emit {
            self.hooks.emit.call(&mut compilation)?;
            self.emit_assets(&mut compilation)?;
            let compilation = Arc::new(compilation);
            self.hooks.after_emit.call(Arc::clone(&compilation)).await?;
            self.finish_compilation(compilation, started).await
        } else {
            info!("emission skipped");
            self.finish_compilation(Arc::new(compilation), started).await
        }
    }

    async fn finish_compilation(
        &self,
        compilation: Arc<Compilation>,
        started: Instant,
    ) -> Result<Stats> {
        let stats = Stats::new(compilation, started.elapsed());
        self.hooks.done.call(stats.clone()).await?;
        Ok(stats)
    }
}

/// A run whose phases panicked still ends through the failure path.
pub(crate) fn aborted(err: JoinError) -> CompileError {
    if err.is_panic() {
        CompileError::Other(anyhow!("compiler task panicked"))
    } else {
        CompileError::Other(anyhow!("compiler task was cancelled"))
    }
}

fn collect_module_ids(compilation: &Compilation, out: &mut Vec<String>) {
    out.extend(compilation.modules().map(|m| m.identifier.clone()));
    for child in compilation.children() {
        collect_module_ids(child, out);
    }
}
