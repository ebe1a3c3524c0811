// src/compiler/watching.rs

//! Watch session.
//!
//! [`Compiler::watch`] spawns a driver task that owns everything mutable
//! about the session: the current subscription, queued invalidations,
//! pending change sets. The [`Watching`] handle talks to it over a channel.
//! Runs happen only inside the driver, one at a time, so a change or an
//! invalidation arriving mid-run is folded into the next run.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::compilation::{Compilation, Stats};
use crate::config::WatchOptions;
use crate::errors::Result;
use crate::hooks::InvalidEvent;
use crate::watch::{ChangeSet, WatchRequest, WatcherHandle};

use super::Compiler;
use super::run::aborted;

type Callback = Box<dyn FnOnce() + Send + 'static>;
type Handler = Box<dyn FnMut(Result<Stats>) + Send + 'static>;

/// `Active -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Active,
    Closing,
    Closed,
}

enum Signal {
    Invalidate(Option<Callback>),
    Close(Option<Callback>),
}

impl Signal {
    fn into_callback(self) -> Option<Callback> {
        match self {
            Signal::Invalidate(cb) | Signal::Close(cb) => cb,
        }
    }
}

#[derive(Debug)]
struct Shared {
    phase: Mutex<WatchPhase>,
    last_change: Mutex<Option<ChangeSet>>,
}

impl Shared {
    fn lock_phase(&self) -> MutexGuard<'_, WatchPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_change(&self) -> MutexGuard<'_, Option<ChangeSet>> {
        self.last_change.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running watch session. Dropping it closes the session
/// without a callback.
#[derive(Debug)]
pub struct Watching {
    compiler: Arc<Compiler>,
    shared: Arc<Shared>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl Compiler {
    /// Start watching.
    ///
    /// Fails with `ConcurrentCompilation` if a run or another watch session
    /// is active. Otherwise an initial run starts right away and every
    /// later change notification or [`Watching::invalidate`] schedules one
    /// more. `handler` sees every run's result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch<F>(self: &Arc<Self>, options: WatchOptions, handler: F) -> Result<Watching>
    where
        F: FnMut(Result<Stats>) + Send + 'static,
    {
        let begun = self.lock_state().begin_watch();
        begun?;

        let shared = Arc::new(Shared {
            phase: Mutex::new(WatchPhase::Active),
            last_change: Mutex::new(None),
        });
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            compiler: Arc::clone(self),
            shared: Arc::clone(&shared),
            options,
            handler: Box::new(handler),
            signals: signal_rx,
            changes_tx,
            changes_rx,
            watcher: None,
            pending_changes: ChangeSet::new(),
            pending_invalidate: Vec::new(),
            close_callbacks: Vec::new(),
            run_requested: true,
            closing: false,
            runs: 0,
        };
        tokio::spawn(driver.drive());

        Ok(Watching {
            compiler: Arc::clone(self),
            shared,
            signals: signal_tx,
        })
    }
}

impl Watching {
    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }

    pub fn phase(&self) -> WatchPhase {
        *self.shared.lock_phase()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == WatchPhase::Closed
    }

    /// Change set that triggered the most recent run, if any did.
    pub fn last_change(&self) -> Option<ChangeSet> {
        self.shared.lock_last_change().clone()
    }

    /// Force another run. `callback` is called after that run's handler,
    /// before its `after_done`. On a closed session it is called at once.
    pub fn invalidate(&self, callback: impl FnOnce() + Send + 'static) {
        if self.phase() == WatchPhase::Active {
            self.compiler.call_invalid(InvalidEvent::manual());
        }
        let callback: Callback = Box::new(callback);
        let rejected = {
            let phase = self.shared.lock_phase();
            if *phase == WatchPhase::Closed {
                Some(callback)
            } else {
                self.signals
                    .send(Signal::Invalidate(Some(callback)))
                    .err()
                    .and_then(|e| e.0.into_callback())
            }
        };
        if let Some(cb) = rejected {
            cb();
        }
    }

    /// [`Watching::invalidate`], resolving when the callback would run.
    pub async fn invalidate_async(&self) {
        let (tx, rx) = oneshot::channel();
        self.invalidate(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// Stop watching. An in-flight run finishes first (its handler still
    /// sees the result); then the subscription is torn down, `watch_close`
    /// fires once and `callback` runs, all before that run's `after_done`.
    /// Closing twice is harmless: the later callback runs too but
    /// `watch_close` does not fire again.
    pub fn close(&self, callback: impl FnOnce() + Send + 'static) {
        let callback: Callback = Box::new(callback);
        let rejected = {
            let mut phase = self.shared.lock_phase();
            match *phase {
                WatchPhase::Closed => Some(callback),
                WatchPhase::Active | WatchPhase::Closing => {
                    *phase = WatchPhase::Closing;
                    self.signals
                        .send(Signal::Close(Some(callback)))
                        .err()
                        .and_then(|e| e.0.into_callback())
                }
            }
        };
        if let Some(cb) = rejected {
            cb();
        }
    }

    pub async fn close_async(&self) {
        let (tx, rx) = oneshot::channel();
        self.close(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

enum Event {
    Signal(Option<Signal>),
    Changes(ChangeSet),
}

struct Driver {
    compiler: Arc<Compiler>,
    shared: Arc<Shared>,
    options: WatchOptions,
    handler: Handler,
    signals: mpsc::UnboundedReceiver<Signal>,
    changes_tx: mpsc::UnboundedSender<ChangeSet>,
    changes_rx: mpsc::UnboundedReceiver<ChangeSet>,
    watcher: Option<Box<dyn WatcherHandle>>,
    pending_changes: ChangeSet,
    /// Invalidate callbacks waiting for the next run to finish.
    pending_invalidate: Vec<Callback>,
    close_callbacks: Vec<Callback>,
    run_requested: bool,
    closing: bool,
    runs: u64,
}

impl Driver {
    async fn drive(mut self) {
        info!(compiler = self.compiler.name().unwrap_or_default(), "watch session started");
        loop {
            if !self.run_requested && !self.closing {
                let event = tokio::select! {
                    signal = self.signals.recv() => Event::Signal(signal),
                    Some(changes) = self.changes_rx.recv() => Event::Changes(changes),
                };
                match event {
                    Event::Signal(Some(signal)) => self.on_signal(signal),
                    // every Watching handle is gone
                    Event::Signal(None) => self.closing = true,
                    Event::Changes(changes) => self.on_changes(changes),
                }
            }
            self.drain_queued();

            if self.closing {
                self.close_now();
                return;
            }
            if self.run_requested {
                self.run_requested = false;
                self.go().await;
                if self.closing {
                    return;
                }
            }
        }
    }

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Invalidate(cb) => {
                self.pending_invalidate.extend(cb);
                self.run_requested = true;
            }
            Signal::Close(cb) => {
                self.close_callbacks.extend(cb);
                self.closing = true;
            }
        }
    }

    fn on_changes(&mut self, changes: ChangeSet) {
        if self.closing || changes.is_empty() {
            return;
        }
        for path in changes.paths() {
            self.compiler.call_invalid(InvalidEvent::file(path));
        }
        debug!(
            changed = changes.changed.len(),
            removed = changes.removed.len(),
            "change notification"
        );
        self.pending_changes.merge(changes);
        self.run_requested = true;
    }

    fn drain_queued(&mut self) {
        loop {
            match self.signals.try_recv() {
                Ok(signal) => self.on_signal(signal),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closing = true;
                    break;
                }
            }
        }
        while let Ok(changes) = self.changes_rx.try_recv() {
            self.on_changes(changes);
        }
    }

    async fn go(&mut self) {
        let compiler = Arc::clone(&self.compiler);
        let _gate = Arc::clone(&compiler.lifecycle).lock_owned().await;
        let started = Instant::now();
        self.runs += 1;

        let changes = mem::take(&mut self.pending_changes);
        if !changes.is_empty() {
            compiler.purge_input_file_system();
            *self.shared.lock_last_change() = Some(changes.clone());
        }
        info!(
            run = self.runs,
            changed = changes.changed.len(),
            removed = changes.removed.len(),
            "watch run started"
        );
        compiler.set_changes(changes);

        let callbacks = mem::take(&mut self.pending_invalidate);
        compiler.lock_state().begin_watch_run();

        let phases = tokio::spawn(watch_run(Arc::clone(&compiler), started));
        let result = phases.await.unwrap_or_else(|err| Err(aborted(err)));

        compiler.lock_state().end_watch_run();
        if let Err(err) = &result {
            compiler.call_failed(err);
        }

        let stats = match &result {
            Ok(stats) => {
                info!(
                    run = self.runs,
                    errors = stats.compilation().errors().len(),
                    warnings = stats.compilation().warnings().len(),
                    elapsed_ms = stats.duration().as_millis() as u64,
                    "watch run finished"
                );
                Some(stats.clone())
            }
            Err(err) => {
                warn!(run = self.runs, error = %err, "watch run failed");
                None
            }
        };

        (self.handler)(result);
        for cb in callbacks {
            cb();
        }

        // a close requested up to here is carried out before `after_done`
        self.drain_queued();
        if self.closing {
            self.close_now();
        } else {
            match &stats {
                Some(stats) => self.resubscribe(stats.compilation()),
                None => debug!("keeping previous subscription after failed run"),
            }
        }

        compiler.call_after_done(stats);
    }

    fn resubscribe(&mut self, compilation: &Compilation) {
        let request = WatchRequest {
            files: compilation.file_dependencies().clone(),
            missing: compilation.missing_dependencies().clone(),
            context: self.compiler.options().context.clone(),
            options: self.options.clone(),
        };
        let files = request.files.len();
        let missing = request.missing.len();

        match self
            .compiler
            .watch_file_system()
            .watch(request, self.changes_tx.clone())
        {
            Ok(handle) => {
                if let Some(mut old) = self.watcher.replace(handle) {
                    old.close();
                }
                debug!(files, missing, "watching dependencies");
            }
            Err(err) => {
                warn!(error = %err, "failed to watch dependencies; keeping previous subscription");
            }
        }
    }

    fn close_now(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.close();
        }
        {
            let mut phase = self.shared.lock_phase();
            *phase = WatchPhase::Closed;
            self.signals.close();
        }
        while let Ok(signal) = self.signals.try_recv() {
            match signal {
                Signal::Invalidate(cb) => self.pending_invalidate.extend(cb),
                Signal::Close(cb) => self.close_callbacks.extend(cb),
            }
        }

        self.compiler.lock_state().end_watch();
        self.compiler.call_watch_close();
        info!(runs = self.runs, "watch session closed");

        for cb in mem::take(&mut self.close_callbacks) {
            cb();
        }
        for cb in mem::take(&mut self.pending_invalidate) {
            cb();
        }
    }
}

async fn watch_run(compiler: Arc<Compiler>, started: Instant) -> Result<Stats> {
    compiler.hooks.watch_run.call(Arc::clone(&compiler)).await?;
    let compilation = compiler.compile().await?;
    compiler.emit_and_seal(compilation, started).await
}
