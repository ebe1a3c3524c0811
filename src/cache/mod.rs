// src/cache/mod.rs

//! In-memory artifact cache shared by successive runs of one compiler.
//!
//! Entries are keyed by module identifier and validated by fingerprint. A
//! lookup with a different fingerprint never returns the stored artifact;
//! the stale entry is dropped instead.

pub mod fingerprint;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::compilation::CompilationId;

pub use fingerprint::{Fingerprint, GraphNode, fingerprint_graph};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub artifact: Arc<str>,
    /// Compilation that produced the artifact.
    pub stored_in: CompilationId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

#[derive(Debug, Default)]
pub struct Cache {
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `identifier`. Returns the artifact only when the stored
    /// fingerprint equals `fingerprint`.
    pub fn get(&self, identifier: &str, fingerprint: &Fingerprint) -> Option<Arc<str>> {
        let mut inner = self.lock();
        match inner.entries.get(identifier) {
            Some(entry) if entry.fingerprint == *fingerprint => {
                let artifact = Arc::clone(&entry.artifact);
                inner.stats.hits += 1;
                trace!(module = %identifier, fingerprint = %fingerprint.short(), "cache hit");
                Some(artifact)
            }
            Some(entry) => {
                debug!(
                    module = %identifier,
                    stored = %entry.fingerprint.short(),
                    current = %fingerprint.short(),
                    "cache entry stale; dropping"
                );
                inner.entries.remove(identifier);
                inner.stats.misses += 1;
                inner.stats.evictions += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn store(
        &self,
        identifier: impl Into<String>,
        fingerprint: Fingerprint,
        artifact: Arc<str>,
        stored_in: CompilationId,
    ) {
        let identifier = identifier.into();
        let mut inner = self.lock();
        trace!(module = %identifier, fingerprint = %fingerprint.short(), "cache store");
        inner.entries.insert(
            identifier,
            CacheEntry {
                fingerprint,
                artifact,
                stored_in,
            },
        );
        inner.stats.stores += 1;
    }

    /// Read-through lookup. `produce` runs only on a miss and its output is
    /// stored. The flag is true for a hit.
    ///
    /// The lock is not held while `produce` runs.
    pub fn get_or_insert_with<E>(
        &self,
        identifier: &str,
        fingerprint: Fingerprint,
        stored_in: CompilationId,
        produce: impl FnOnce() -> Result<Arc<str>, E>,
    ) -> Result<(Arc<str>, bool), E> {
        if let Some(artifact) = self.get(identifier, &fingerprint) {
            return Ok((artifact, true));
        }
        let artifact = produce()?;
        self.store(identifier, fingerprint, Arc::clone(&artifact), stored_in);
        Ok((artifact, false))
    }

    /// Drop entries whose identifier is not in `reachable`.
    pub fn retain_reachable<'a, I>(&self, reachable: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: std::collections::HashSet<&str> = reachable.into_iter().collect();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|id, _| keep.contains(id.as_str()));
        let removed = before - inner.entries.len();
        inner.stats.evictions += removed as u64;
        if removed > 0 {
            debug!(removed, "dropped unreachable cache entries");
        }
        removed
    }

    pub fn entry(&self, identifier: &str) -> Option<CacheEntry> {
        self.lock().entries.get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let removed = inner.entries.len() as u64;
        inner.entries.clear();
        inner.stats.evictions += removed;
    }
}
