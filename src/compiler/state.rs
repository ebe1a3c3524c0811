// src/compiler/state.rs

//! Pure compiler state machine.
//!
//! All `run` / `watch` re-entrancy decisions go through this type. It has
//! no Tokio types and performs no IO, so every transition is unit tested
//! here; the compiler wraps it in a mutex and only holds that lock for the
//! duration of one transition.

use tracing::warn;

use crate::errors::CompileError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompilerState {
    #[default]
    Idle,
    /// A one-shot run (or a child run) is in flight.
    Running,
    /// A watching session owns the compiler. `active_run` is true while one
    /// of its runs is in flight.
    Watching { active_run: bool },
}

impl CompilerState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            CompilerState::Running | CompilerState::Watching { active_run: true }
        )
    }

    pub fn is_watching(&self) -> bool {
        matches!(self, CompilerState::Watching { .. })
    }

    /// `Idle -> Running`. Anything else is rejected without changing state.
    pub fn begin_run(&mut self) -> Result<(), CompileError> {
        match self {
            CompilerState::Idle => {
                *self = CompilerState::Running;
                Ok(())
            }
            _ => Err(CompileError::ConcurrentCompilation),
        }
    }

    /// `Running -> Idle`.
    pub fn end_run(&mut self) {
        match self {
            CompilerState::Running => *self = CompilerState::Idle,
            other => warn!(state = ?other, "end_run outside of a run"),
        }
    }

    /// `Idle -> Watching`. Anything else is rejected without changing state.
    pub fn begin_watch(&mut self) -> Result<(), CompileError> {
        match self {
            CompilerState::Idle => {
                *self = CompilerState::Watching { active_run: false };
                Ok(())
            }
            _ => Err(CompileError::ConcurrentCompilation),
        }
    }

    /// Mark a watch run as in flight. Returns false if the compiler is not
    /// watching or a watch run is already active.
    pub fn begin_watch_run(&mut self) -> bool {
        match self {
            CompilerState::Watching { active_run } if !*active_run => {
                *active_run = true;
                true
            }
            other => {
                warn!(state = ?other, "begin_watch_run in unexpected state");
                false
            }
        }
    }

    pub fn end_watch_run(&mut self) {
        match self {
            CompilerState::Watching { active_run } => *active_run = false,
            other => warn!(state = ?other, "end_watch_run outside of watch mode"),
        }
    }

    /// `Watching -> Idle`.
    pub fn end_watch(&mut self) {
        match self {
            CompilerState::Watching { .. } => *self = CompilerState::Idle,
            other => warn!(state = ?other, "end_watch outside of watch mode"),
        }
    }
}
