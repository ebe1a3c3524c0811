// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Build mode. Mostly affects defaults (see [`Optimization`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Development,
    None,
}

/// `entry = "./src/index.js"` or
///
/// ```toml
/// [entry]
/// main = "./src/index.js"
/// admin = "./src/admin.js"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntrySpec {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl Default for EntrySpec {
    fn default() -> Self {
        EntrySpec::Named(BTreeMap::new())
    }
}

impl EntrySpec {
    /// Chunk name to request. A single request becomes chunk `main`.
    pub fn into_map(self) -> BTreeMap<String, String> {
        match self {
            EntrySpec::Single(request) => BTreeMap::from([("main".to_string(), request)]),
            EntrySpec::Named(map) => map,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputOptions {
    /// Output directory. Relative paths are resolved against `context`.
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// File name template; `[name]` is replaced by the chunk name.
    #[serde(default = "default_output_filename")]
    pub filename: String,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("dist")
}

fn default_output_filename() -> String {
    "[name].js".to_string()
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            filename: default_output_filename(),
        }
    }
}

impl OutputOptions {
    pub fn filename_for(&self, chunk: &str) -> String {
        self.filename.replace("[name]", chunk)
    }
}

/// `[watch_options]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchOptions {
    /// Delay after the first change before a rebuild starts, so a burst of
    /// saves becomes one run.
    #[serde(default = "default_aggregate_timeout_ms")]
    pub aggregate_timeout_ms: u64,

    /// Glob patterns for paths whose changes never trigger a rebuild.
    #[serde(default)]
    pub ignored: Vec<String>,
}

fn default_aggregate_timeout_ms() -> u64 {
    200
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout_ms: default_aggregate_timeout_ms(),
            ignored: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOptimization {
    pub no_emit_on_errors: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Optimization {
    /// Skip emission for compilations that carry error diagnostics.
    pub no_emit_on_errors: bool,
}

impl Optimization {
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            no_emit_on_errors: mode == Mode::Production,
        }
    }
}

/// Configuration exactly as read from TOML. Turned into
/// [`CompilerOptions`] by validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCompilerOptions {
    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_context")]
    pub context: PathBuf,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub bail: bool,

    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default)]
    pub entry: EntrySpec,

    #[serde(default)]
    pub output: OutputOptions,

    #[serde(default)]
    pub optimization: RawOptimization,

    #[serde(default)]
    pub watch_options: WatchOptions,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

/// Validated compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub mode: Mode,
    /// Base directory for entry requests.
    pub context: PathBuf,
    pub name: Option<String>,
    pub bail: bool,
    /// Keep an artifact cache across runs of the same compiler.
    pub cache: bool,
    /// Chunk name to entry request.
    pub entry: BTreeMap<String, String>,
    pub output: OutputOptions,
    pub optimization: Optimization,
    pub watch_options: WatchOptions,
}

impl CompilerOptions {
    /// Defaults for `context` with no entries.
    pub fn new(context: impl Into<PathBuf>) -> Self {
        let context = context.into();
        let mode = Mode::default();
        Self {
            mode,
            output: OutputOptions {
                path: context.join(default_output_path()),
                filename: default_output_filename(),
            },
            context,
            name: None,
            bail: false,
            cache: true,
            entry: BTreeMap::new(),
            optimization: Optimization::for_mode(mode),
            watch_options: WatchOptions::default(),
        }
    }

    pub fn with_entry(mut self, name: impl Into<String>, request: impl Into<String>) -> Self {
        self.entry.insert(name.into(), request.into());
        self
    }

    pub(crate) fn new_unchecked(raw: RawCompilerOptions) -> Self {
        let optimization = Optimization {
            no_emit_on_errors: raw
                .optimization
                .no_emit_on_errors
                .unwrap_or_else(|| Optimization::for_mode(raw.mode).no_emit_on_errors),
        };
        Self {
            mode: raw.mode,
            context: raw.context,
            name: raw.name,
            bail: raw.bail,
            cache: raw.cache,
            entry: raw.entry.into_map(),
            output: raw.output,
            optimization,
            watch_options: raw.watch_options,
        }
    }
}
