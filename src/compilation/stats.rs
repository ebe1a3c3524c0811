// src/compilation/stats.rs

//! Read-only view of a finished compilation, handed to `done` observers and
//! to run callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::Compilation;

#[derive(Debug, Clone)]
pub struct Stats {
    compilation: Arc<Compilation>,
    duration: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssetStats {
    pub name: String,
    pub size: usize,
    pub emitted: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChunkStats {
    pub name: String,
    pub entry: String,
    pub modules: Vec<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModuleStats {
    pub identifier: String,
    pub size: usize,
    pub fingerprint: String,
    pub cached: bool,
}

/// Serializable summary of a compilation and its children.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsJson {
    pub name: Option<String>,
    pub time_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub assets: Vec<AssetStats>,
    pub chunks: Vec<ChunkStats>,
    pub modules: Vec<ModuleStats>,
    pub children: Vec<StatsJson>,
}

impl Stats {
    pub fn new(compilation: Arc<Compilation>, duration: Duration) -> Self {
        Self {
            compilation,
            duration,
        }
    }

    pub fn compilation(&self) -> &Arc<Compilation> {
        &self.compilation
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn has_errors(&self) -> bool {
        self.compilation.has_errors()
    }

    pub fn has_warnings(&self) -> bool {
        self.compilation.has_warnings()
    }

    pub fn to_json(&self) -> StatsJson {
        to_json(&self.compilation, self.duration)
    }
}

fn to_json(c: &Compilation, duration: Duration) -> StatsJson {
    StatsJson {
        name: c.name().map(str::to_string),
        time_ms: duration.as_millis() as u64,
        errors: c.errors().iter().map(ToString::to_string).collect(),
        warnings: c.warnings().iter().map(ToString::to_string).collect(),
        assets: c
            .assets()
            .map(|(name, asset)| AssetStats {
                name: name.to_string(),
                size: asset.size(),
                emitted: asset.emitted,
            })
            .collect(),
        chunks: c
            .chunks()
            .iter()
            .map(|chunk| ChunkStats {
                name: chunk.name.clone(),
                entry: chunk.entry_module.clone(),
                modules: chunk.modules.clone(),
                files: chunk.files.clone(),
            })
            .collect(),
        modules: c
            .modules()
            .map(|m| ModuleStats {
                identifier: m.identifier.clone(),
                size: m.size(),
                fingerprint: m.fingerprint.short(),
                cached: m.cached,
            })
            .collect(),
        children: c
            .children()
            .iter()
            .map(|child| to_json(child, Duration::ZERO))
            .collect(),
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.compilation;
        let label = c.name().unwrap_or("compilation");
        let cached = c.modules().filter(|m| m.cached).count();
        writeln!(
            f,
            "{label}: {} modules ({cached} cached), {} assets in {} ms",
            c.modules().count(),
            c.assets().count(),
            self.duration.as_millis()
        )?;
        for (name, asset) in c.assets() {
            let flag = if asset.emitted { "[emitted]" } else { "" };
            writeln!(f, "  {name}  {} bytes {flag}", asset.size())?;
        }
        for w in c.warnings() {
            writeln!(f, "WARNING {w}")?;
        }
        for e in c.errors() {
            writeln!(f, "ERROR {e}")?;
        }
        Ok(())
    }
}
