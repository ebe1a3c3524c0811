// src/compiler/emit.rs

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::compilation::Compilation;
use crate::errors::{CompileError, Result};
use crate::fs::OutputFileSystem;
use crate::hooks::AssetEmitted;

use super::Compiler;

/// Create `path` and any missing parents. An existing directory counts as
/// success.
pub fn mkdirp(fs: &dyn OutputFileSystem, path: &Path) -> io::Result<()> {
    match fs.mkdir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() && p != path => p,
                _ => return Err(e),
            };
            mkdirp(fs, parent)?;
            match fs.mkdir(path) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                other => other,
            }
        }
        Err(e) => Err(e),
    }
}

impl Compiler {
    /// Write every asset below `output.path`.
    pub(crate) fn emit_assets(&self, compilation: &mut Compilation) -> Result<()> {
        let out = self.output_file_system();
        let output_path = self.options.output.path.as_path();

        mkdirp(out.as_ref(), output_path).map_err(|e| CompileError::io(output_path, e))?;

        let names = compilation.asset_names();
        for name in &names {
            let Some(content) = compilation.asset(name).map(|a| Arc::clone(&a.content)) else {
                continue;
            };
            let target = output_path.join(name);
            if let Some(dir) = target.parent() {
                if dir != output_path {
                    mkdirp(out.as_ref(), dir).map_err(|e| CompileError::io(dir, e))?;
                }
            }
            out.write_file(&target, &content)
                .map_err(|e| CompileError::io(&target, e))?;
            compilation.mark_emitted(name);
            debug!(asset = %name, path = %target.display(), size = content.len(), "asset emitted");

            self.hooks.asset_emitted.call(&AssetEmitted {
                name: name.clone(),
                target_path: target,
                size: content.len(),
            })?;
        }

        info!(
            assets = names.len(),
            output = %output_path.display(),
            "assets written"
        );
        Ok(())
    }
}
