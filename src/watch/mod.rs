// src/watch/mod.rs

//! File watching collaborator.
//!
//! A [`WatchFileSystem`] is told which files a compilation depended on and
//! pushes aggregated [`ChangeSet`]s into a channel until its handle is
//! closed. It knows nothing about compilers or hooks; the watching session
//! in `compiler::watching` turns change sets into runs.

pub mod patterns;
pub mod watcher;

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::WatchOptions;

pub use patterns::IgnoreMatcher;
pub use watcher::NotifyWatchFileSystem;

/// Paths that changed since the last notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changed<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            changed: paths.into_iter().map(Into::into).collect(),
            removed: BTreeSet::new(),
        }
    }

    pub fn removed<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            changed: BTreeSet::new(),
            removed: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    /// Fold a later change set into this one. The later state of a path
    /// wins: a file removed and then re-created counts as changed.
    pub fn merge(&mut self, later: ChangeSet) {
        for path in later.changed {
            self.removed.remove(&path);
            self.changed.insert(path);
        }
        for path in later.removed {
            self.changed.remove(&path);
            self.removed.insert(path);
        }
    }

    /// Changed and removed paths together, sorted.
    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.changed.union(&self.removed).cloned().collect()
    }
}

/// What a watch subscription should observe.
#[derive(Debug, Clone, Default)]
pub struct WatchRequest {
    /// Files the last compilation read.
    pub files: BTreeSet<PathBuf>,
    /// Paths probed during resolution that did not exist yet.
    pub missing: BTreeSet<PathBuf>,
    /// Base for relative ignore patterns.
    pub context: PathBuf,
    pub options: WatchOptions,
}

/// Keeps a subscription alive. Closing (or dropping) it stops delivery.
pub trait WatcherHandle: Send + Debug {
    fn close(&mut self);
}

pub trait WatchFileSystem: Send + Sync + Debug {
    fn watch(
        &self,
        request: WatchRequest,
        sink: mpsc::UnboundedSender<ChangeSet>,
    ) -> anyhow::Result<Box<dyn WatcherHandle>>;
}
