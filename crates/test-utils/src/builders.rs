#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use packwatch::compiler::{Compiler, Plugin};
use packwatch::config::{CompilerOptions, Mode, Optimization};
use packwatch::fs::MemoryFileSystem;

use crate::manual_watch::ManualWatchFileSystem;
use crate::recording_fs::RecordingOutputFileSystem;

/// Context directory used by [`fixture_fs`] and [`OptionsBuilder`].
pub const CONTEXT: &str = "/project";

/// In-memory project:
///
/// - `a.js`, `b.js`: leaves
/// - `c.js`: requires `a` and `b`
/// - `abc.js`: requires `a`, `b` and `c`
/// - `main1.js`: requires `./a` and the package module `m1/a`
/// - `missing.js`: requires a file that does not exist
/// - `node_modules/m1/a.js`
pub fn fixture_fs() -> MemoryFileSystem {
    let fs = MemoryFileSystem::new();
    fs.add_file(
        "/project/a.js",
        "module.exports = function a() {\n  return \"This is a\";\n};\n",
    );
    fs.add_file(
        "/project/b.js",
        "module.exports = function b() {\n  return \"This is b\";\n};\n",
    );
    fs.add_file(
        "/project/c.js",
        "var a = require(\"./a\");\nvar b = require(\"./b\");\nmodule.exports = function c() {\n  return a() + b() + \"This is c\";\n};\n",
    );
    fs.add_file(
        "/project/abc.js",
        "require(\"./a\");\nrequire(\"./b\");\nrequire(\"./c\");\n",
    );
    fs.add_file(
        "/project/main1.js",
        "var a = require(\"./a\");\nvar m1 = require(\"m1/a\");\nmodule.exports = a() + m1();\n",
    );
    fs.add_file(
        "/project/missing.js",
        "require(\"./a\");\nrequire(\"./does-not-exist\");\n",
    );
    fs.add_file(
        "/project/node_modules/m1/a.js",
        "module.exports = function m1() {\n  return \"This is m1/a\";\n};\n",
    );
    fs
}

/// Builder for `CompilerOptions` rooted at [`CONTEXT`].
pub struct OptionsBuilder {
    options: CompilerOptions,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: CompilerOptions::new(CONTEXT),
        }
    }

    /// Set the `main` entry.
    pub fn entry(self, request: &str) -> Self {
        self.named_entry("main", request)
    }

    pub fn named_entry(mut self, name: &str, request: &str) -> Self {
        self.options.entry.insert(name.to_string(), request.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.options.name = Some(name.to_string());
        self
    }

    pub fn bail(mut self, bail: bool) -> Self {
        self.options.bail = bail;
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.options.cache = cache;
        self
    }

    /// Also resets `optimization` to the mode's defaults.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.options.mode = mode;
        self.options.optimization = Optimization::for_mode(mode);
        self
    }

    pub fn no_emit_on_errors(mut self, value: bool) -> Self {
        self.options.optimization.no_emit_on_errors = value;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.output.path = path.into();
        self
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.options.output.filename = filename.to_string();
        self
    }

    pub fn build(self) -> CompilerOptions {
        self.options
    }
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiler wired to in-memory collaborators.
pub struct Harness {
    pub compiler: Arc<Compiler>,
    pub input: MemoryFileSystem,
    pub output: Arc<RecordingOutputFileSystem>,
    pub watcher: Arc<ManualWatchFileSystem>,
}

impl Harness {
    /// Harness over [`fixture_fs`].
    pub fn new(options: CompilerOptions) -> Self {
        Self::with_plugins(options, fixture_fs(), Vec::new())
    }

    pub fn with_input(options: CompilerOptions, input: MemoryFileSystem) -> Self {
        Self::with_plugins(options, input, Vec::new())
    }

    pub fn with_plugins(
        options: CompilerOptions,
        input: MemoryFileSystem,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Self {
        let output = Arc::new(RecordingOutputFileSystem::new());
        let watcher = Arc::new(ManualWatchFileSystem::new());

        let mut builder = Compiler::builder(options)
            .input_file_system(Arc::new(input.clone()))
            .output_file_system(output.clone())
            .watch_file_system(watcher.clone());
        for plugin in plugins {
            builder = builder.boxed_plugin(plugin);
        }
        let compiler = builder.build().expect("test options should be valid");

        Self {
            compiler,
            input,
            output,
            watcher,
        }
    }
}
