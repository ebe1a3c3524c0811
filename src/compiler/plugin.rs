// src/compiler/plugin.rs

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Compiler;

/// Something that taps hooks on a compiler when it is built.
///
/// Taps that need the compiler later should hold a `Weak` to it; the hook
/// table lives inside the compiler.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, compiler: &Arc<Compiler>);
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plugin({})", self.name())
    }
}

/// Skips emission for any compilation that carries error diagnostics.
/// `done` still fires and reports the errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmitOnErrorsPlugin;

impl Plugin for NoEmitOnErrorsPlugin {
    fn name(&self) -> &str {
        "NoEmitOnErrorsPlugin"
    }

    fn apply(&self, compiler: &Arc<Compiler>) {
        compiler.hooks().should_emit.tap(self.name(), |compilation| {
            if compilation.has_errors() {
                debug!(
                    errors = compilation.errors().len(),
                    "skipping emission because the compilation has errors"
                );
                return Ok(Some(false));
            }
            Ok(None)
        });
    }
}
