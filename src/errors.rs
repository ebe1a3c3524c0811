// src/errors.rs

//! Crate-wide error types.
//!
//! Two families:
//! - [`CompileError`]: everything that can end a run fatally (or reject it
//!   before it starts). Diagnostics on a compilation are *not* errors in
//!   this sense; they travel on the compilation itself.
//! - [`ConfigError`]: loading and validating the TOML configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compilation::Diagnostic;

#[derive(Error, Debug)]
pub enum CompileError {
    /// `run` / `watch` called while another run or watch is active.
    #[error(
        "compiler is already running; a second run or watch cannot start until the first has finished"
    )]
    ConcurrentCompilation,

    /// First error diagnostic promoted to a fatal failure because `bail` is set.
    #[error("{0}")]
    Bail(Diagnostic),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A hook observer returned an error.
    #[error("hook '{hook}' failed in tap '{tap}': {source}")]
    Hook {
        hook: &'static str,
        tap: String,
        #[source]
        source: anyhow::Error,
    },

    /// The graph-building collaborator gave up.
    #[error("build error: {0}")]
    Build(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CompileError>;
