// src/config/mod.rs

//! Configuration loading and validation for packwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate entries, output naming and ignore globs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CompilerOptions, EntrySpec, Mode, Optimization, OutputOptions, RawCompilerOptions,
    WatchOptions,
};
pub use validate::validate_options;
