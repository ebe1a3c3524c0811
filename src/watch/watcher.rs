// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChangeSet, IgnoreMatcher, WatchFileSystem, WatchRequest, WatcherHandle};

/// [`WatchFileSystem`] backed by `notify`.
///
/// Watches the parent directory of every requested file (non-recursively),
/// keeps only events for requested paths, and waits
/// `aggregate_timeout_ms` after the first event so a burst of saves turns
/// into one change set.
#[derive(Debug, Clone, Default)]
pub struct NotifyWatchFileSystem;

impl NotifyWatchFileSystem {
    pub fn new() -> Self {
        Self
    }
}

/// Keeps the notify watcher and the aggregation task alive.
pub struct NotifyWatcherHandle {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for NotifyWatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcherHandle")
            .field("open", &self.watcher.is_some())
            .finish()
    }
}

impl WatcherHandle for NotifyWatcherHandle {
    fn close(&mut self) {
        if self.watcher.take().is_some() {
            debug!("file watcher closed");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NotifyWatcherHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Directories to subscribe to: the parent of each path, or its nearest
/// existing ancestor for paths whose parent does not exist yet.
fn watch_roots(paths: impl Iterator<Item = PathBuf>) -> BTreeSet<PathBuf> {
    let mut roots = BTreeSet::new();
    for path in paths {
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d.is_dir() {
                roots.insert(d);
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
    }
    roots
}

struct Filter {
    context: PathBuf,
    wanted: BTreeSet<PathBuf>,
    /// Missing paths; anything created below one of these also counts.
    missing: BTreeSet<PathBuf>,
    ignore: IgnoreMatcher,
}

impl Filter {
    fn accepts(&self, path: &Path) -> bool {
        if self.ignore.is_ignored(&self.context, path) {
            return false;
        }
        self.wanted.contains(path)
            || self.missing.contains(path)
            || self.missing.iter().any(|m| m.starts_with(path))
    }
}

impl WatchFileSystem for NotifyWatchFileSystem {
    fn watch(
        &self,
        request: WatchRequest,
        sink: mpsc::UnboundedSender<ChangeSet>,
    ) -> Result<Box<dyn WatcherHandle>> {
        let filter = Arc::new(Filter {
            context: request.context.clone(),
            wanted: request.files.clone(),
            missing: request.missing.clone(),
            ignore: IgnoreMatcher::new(&request.options.ignored)?,
        });
        let aggregate = Duration::from_millis(request.options.aggregate_timeout_ms);

        // Channel from the blocking notify callback into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    // Receiver gone means the session is closing.
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    warn!(error = %err, "file watch error");
                }
            },
            Config::default(),
        )?;

        let roots = watch_roots(
            request
                .files
                .iter()
                .chain(request.missing.iter())
                .cloned(),
        );
        for root in &roots {
            watcher.watch(root, RecursiveMode::NonRecursive)?;
        }
        info!(
            files = request.files.len(),
            missing = request.missing.len(),
            dirs = roots.len(),
            "file watcher started"
        );

        let task = tokio::spawn(async move {
            loop {
                let Some(first) = event_rx.recv().await else {
                    break;
                };
                let mut touched: BTreeSet<PathBuf> = BTreeSet::new();
                collect(&filter, first, &mut touched);
                if touched.is_empty() {
                    continue;
                }

                // Aggregate the burst.
                let deadline = tokio::time::sleep(aggregate);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        next = event_rx.recv() => match next {
                            Some(event) => collect(&filter, event, &mut touched),
                            None => break,
                        },
                    }
                }

                let mut changes = ChangeSet::new();
                for path in touched {
                    if path.exists() {
                        changes.changed.insert(path);
                    } else {
                        changes.removed.insert(path);
                    }
                }
                debug!(
                    changed = changes.changed.len(),
                    removed = changes.removed.len(),
                    "aggregated file changes"
                );
                if sink.send(changes).is_err() {
                    break;
                }
            }
            debug!("watcher event loop finished");
        });

        Ok(Box::new(NotifyWatcherHandle {
            watcher: Some(watcher),
            task: Some(task),
        }))
    }
}

fn collect(filter: &Filter, event: Event, touched: &mut BTreeSet<PathBuf>) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in event.paths {
        if filter.accepts(&path) {
            touched.insert(path);
        }
    }
}
