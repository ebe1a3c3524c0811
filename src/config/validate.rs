// src/config/validate.rs

use std::path::{Component, Path};

use crate::config::model::{CompilerOptions, RawCompilerOptions};
use crate::errors::ConfigError;
use crate::watch::patterns::check_pattern;

type Result<T> = std::result::Result<T, ConfigError>;

impl TryFrom<RawCompilerOptions> for CompilerOptions {
    type Error = ConfigError;

    fn try_from(raw: RawCompilerOptions) -> Result<Self> {
        let options = CompilerOptions::new_unchecked(raw);
        validate_options(&options)?;
        Ok(options)
    }
}

/// Check invariants the rest of the crate relies on. Also used for options
/// built in code instead of loaded from TOML.
pub fn validate_options(options: &CompilerOptions) -> Result<()> {
    validate_entries(options)?;
    validate_output(options)?;
    validate_watch_options(options)?;
    if let Some(name) = &options.name {
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid("`name` must not be empty".to_string()));
        }
    }
    Ok(())
}

fn validate_entries(options: &CompilerOptions) -> Result<()> {
    if options.entry.is_empty() {
        return Err(ConfigError::Invalid(
            "config must contain at least one entry (`entry = \"./src/index.js\"` or an [entry] table)"
                .to_string(),
        ));
    }
    for (name, request) in &options.entry {
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid("entry names must not be empty".to_string()));
        }
        if request.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "entry '{name}' has an empty request"
            )));
        }
    }
    Ok(())
}

fn validate_output(options: &CompilerOptions) -> Result<()> {
    let filename = &options.output.filename;
    if filename.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "[output].filename must not be empty".to_string(),
        ));
    }
    let path = Path::new(filename);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(ConfigError::Invalid(format!(
            "[output].filename must be a relative path inside the output directory (got '{filename}')"
        )));
    }
    if options.entry.len() > 1 && !filename.contains("[name]") {
        return Err(ConfigError::Invalid(format!(
            "[output].filename '{filename}' must contain [name] when there are several entries"
        )));
    }
    Ok(())
}

fn validate_watch_options(options: &CompilerOptions) -> Result<()> {
    for pattern in &options.watch_options.ignored {
        check_pattern(pattern)
            .map_err(|e| ConfigError::Invalid(format!("[watch_options].ignored: {e:#}")))?;
    }
    Ok(())
}
