use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use packwatch::watch::{ChangeSet, WatchFileSystem, WatchRequest, WatcherHandle};
use tokio::sync::mpsc;

/// Watch file system driven by the test: it records subscriptions and
/// forwards whatever [`ManualWatchFileSystem::push`] is given to the most
/// recent one.
#[derive(Debug, Default)]
pub struct ManualWatchFileSystem {
    requests: Mutex<Vec<WatchRequest>>,
    sink: Mutex<Option<mpsc::UnboundedSender<ChangeSet>>>,
    closed: Arc<AtomicUsize>,
    fail_next: AtomicBool,
}

impl ManualWatchFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a change set to the latest subscription. Returns false if
    /// there is none or its receiver is gone.
    pub fn push(&self, changes: ChangeSet) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.send(changes).is_ok(),
            None => false,
        }
    }

    pub fn requests(&self) -> Vec<WatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<WatchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn subscriptions(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of handles closed so far.
    pub fn closed_handles(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make the next `watch` call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl WatchFileSystem for ManualWatchFileSystem {
    fn watch(
        &self,
        request: WatchRequest,
        sink: mpsc::UnboundedSender<ChangeSet>,
    ) -> anyhow::Result<Box<dyn WatcherHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("watch refused");
        }
        self.requests.lock().unwrap().push(request);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(ManualHandle {
            closed: Arc::clone(&self.closed),
            done: false,
        }))
    }
}

#[derive(Debug)]
struct ManualHandle {
    closed: Arc<AtomicUsize>,
    done: bool,
}

impl WatcherHandle for ManualHandle {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
