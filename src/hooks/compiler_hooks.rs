// src/hooks/compiler_hooks.rs

//! The typed hook table owned by every [`Compiler`].
//!
//! Firing order for one run:
//!
//! `before_run -> run -> this_compilation -> compilation -> (build) ->
//! after_compile -> should_emit -> emit -> asset_emitted* -> after_emit ->
//! done -> (caller callback) -> after_done`
//!
//! Watch runs replace `before_run`/`run` with `watch_run`; when the session
//! is closing, `watch_close` fires after the handler and before
//! `after_done`. A fatal error
//! replaces everything after the failing step with `failed -> (callback) ->
//! after_done(None)`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::compilation::{Compilation, Stats};
use crate::compiler::Compiler;
use crate::errors::CompileError;

use super::{AsyncSeriesHook, SyncBailHook, SyncHook, SyncMutHook};

/// Payload of the `invalid` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEvent {
    /// The file whose change caused the invalidation; `None` for a manual
    /// `Watching::invalidate`.
    pub file: Option<PathBuf>,
    pub at: SystemTime,
}

impl InvalidEvent {
    pub fn manual() -> Self {
        Self {
            file: None,
            at: SystemTime::now(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            at: SystemTime::now(),
        }
    }
}

/// Payload of the `asset_emitted` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEmitted {
    pub name: String,
    pub target_path: PathBuf,
    pub size: usize,
}

/// The `Arc<Compiler>` handed to `before_run`, `run` and `watch_run` taps
/// must not be stored as is: the compiler owns this table, so a kept strong
/// reference is a cycle. Downgrade it with [`Arc::downgrade`] instead.
#[derive(Debug)]
pub struct CompilerHooks {
    pub before_run: AsyncSeriesHook<Arc<Compiler>>,
    pub run: AsyncSeriesHook<Arc<Compiler>>,
    /// Fires at the start of every watch run, before inputs are re-read.
    pub watch_run: AsyncSeriesHook<Arc<Compiler>>,
    pub this_compilation: SyncMutHook<Compilation>,
    /// The compilation shell exists but nothing has been built yet; observers
    /// may flip flags such as `bail`.
    pub compilation: SyncMutHook<Compilation>,
    pub after_compile: SyncHook<Compilation>,
    /// Returning `Some(false)` skips emission; `done` still fires.
    pub should_emit: SyncBailHook<Compilation, bool>,
    /// Last chance to add or replace assets before they are written.
    pub emit: SyncMutHook<Compilation>,
    pub asset_emitted: SyncHook<AssetEmitted>,
    pub after_emit: AsyncSeriesHook<Arc<Compilation>>,
    pub done: AsyncSeriesHook<Stats>,
    pub failed: SyncHook<CompileError>,
    /// Fires once per run after the caller's callback returned; `None` when
    /// the run failed.
    pub after_done: SyncHook<Option<Stats>>,
    pub invalid: SyncHook<InvalidEvent>,
    pub watch_close: SyncHook<()>,
}

impl CompilerHooks {
    pub fn new() -> Self {
        Self {
            before_run: AsyncSeriesHook::new("before_run"),
            run: AsyncSeriesHook::new("run"),
            watch_run: AsyncSeriesHook::new("watch_run"),
            this_compilation: SyncMutHook::new("this_compilation"),
            compilation: SyncMutHook::new("compilation"),
            after_compile: SyncHook::new("after_compile"),
            should_emit: SyncBailHook::new("should_emit"),
            emit: SyncMutHook::new("emit"),
            asset_emitted: SyncHook::new("asset_emitted"),
            after_emit: AsyncSeriesHook::new("after_emit"),
            done: AsyncSeriesHook::new("done"),
            failed: SyncHook::new("failed"),
            after_done: SyncHook::new("after_done"),
            invalid: SyncHook::new("invalid"),
            watch_close: SyncHook::new("watch_close"),
        }
    }
}

impl Default for CompilerHooks {
    fn default() -> Self {
        Self::new()
    }
}
