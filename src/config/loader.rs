// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{CompilerOptions, RawCompilerOptions};
use crate::errors::ConfigError;

/// Load a configuration file and return the raw `RawCompilerOptions`.
///
/// This only performs TOML deserialization; it does **not** validate or
/// resolve paths. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawCompilerOptions, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawCompilerOptions = toml::from_str(&contents)?;
    Ok(config)
}

/// Load, validate, and resolve relative paths.
///
/// - `context` is resolved against the directory holding the config file.
/// - `output.path` is resolved against `context`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<CompilerOptions, ConfigError> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let mut options = CompilerOptions::try_from(raw)?;

    let base = config_dir(path)?;
    options.context = absolutize(&base, &options.context);
    options.output.path = absolutize(&options.context, &options.output.path);
    debug!(
        config = %path.display(),
        context = %options.context.display(),
        output = %options.output.path.display(),
        "configuration loaded"
    );
    Ok(options)
}

/// Default config location: `Packwatch.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Packwatch.toml")
}

fn config_dir(config_path: &Path) -> Result<PathBuf, ConfigError> {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Ok(std::env::current_dir()?),
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    crate::builder::resolve::normalize(&joined)
}
