// src/hooks/mod.rs

//! Hook registry: named extension points that plugins tap into.
//!
//! Every hook keeps an ordered list of taps. Taps fire strictly in
//! registration order and each one finishes (including any async work)
//! before the next starts.
//!
//! - [`SyncHook`]: observers get `&A`.
//! - [`SyncMutHook`]: observers get `&mut A` (used to adjust a compilation
//!   shell before it is built).
//! - [`SyncBailHook`]: the first observer returning `Some(r)` decides.
//! - [`AsyncSeriesHook`]: observers return a future; futures are awaited one
//!   after the other.
//!
//! `call` works on a snapshot of the tap list, so an observer may register
//! more taps (or start another run) without deadlocking on the registry.

pub mod compiler_hooks;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::{CompileError, Result};

pub use compiler_hooks::{AssetEmitted, CompilerHooks, InvalidEvent};

/// Boxed future returned by async observers.
pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

type SyncFn<A> = dyn Fn(&A) -> anyhow::Result<()> + Send + Sync;
type SyncMutFn<A> = dyn Fn(&mut A) -> anyhow::Result<()> + Send + Sync;
type BailFn<A, R> = dyn Fn(&A) -> anyhow::Result<Option<R>> + Send + Sync;
type SeriesFn<A> = dyn Fn(A) -> HookFuture + Send + Sync;

struct Tap<F: ?Sized> {
    name: String,
    f: Arc<F>,
}

impl<F: ?Sized> Clone for Tap<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

/// Ordered tap storage shared by all hook kinds.
struct Taps<F: ?Sized> {
    hook: &'static str,
    taps: RwLock<Vec<Tap<F>>>,
}

impl<F: ?Sized> Taps<F> {
    fn new(hook: &'static str) -> Self {
        Self {
            hook,
            taps: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, name: String, f: Arc<F>) {
        tracing::trace!(hook = self.hook, tap = %name, "tap registered");
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Tap { name, f });
    }

    fn snapshot(&self) -> Vec<Tap<F>> {
        self.taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn names(&self) -> Vec<String> {
        self.taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    fn wrap_err(&self, tap: &Tap<F>, source: anyhow::Error) -> CompileError {
        CompileError::Hook {
            hook: self.hook,
            tap: tap.name.clone(),
            source,
        }
    }
}

impl<F: ?Sized> fmt::Debug for Taps<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.hook)
            .field("taps", &self.names())
            .finish()
    }
}

/// Synchronous hook; observers see a shared reference.
pub struct SyncHook<A: ?Sized> {
    taps: Taps<SyncFn<A>>,
}

impl<A: ?Sized> fmt::Debug for SyncHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.taps.fmt(f)
    }
}

impl<A: ?Sized> SyncHook<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            taps: Taps::new(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.taps.hook
    }

    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    pub fn is_used(&self) -> bool {
        !self.taps.names().is_empty()
    }

    pub fn tap_names(&self) -> Vec<String> {
        self.taps.names()
    }

    /// Invoke every observer in order; the first error stops the chain.
    pub fn call(&self, arg: &A) -> Result<()> {
        for tap in self.taps.snapshot() {
            (tap.f)(arg).map_err(|e| self.taps.wrap_err(&tap, e))?;
        }
        Ok(())
    }
}

/// Synchronous hook whose observers may mutate the argument.
pub struct SyncMutHook<A: ?Sized> {
    taps: Taps<SyncMutFn<A>>,
}

impl<A: ?Sized> fmt::Debug for SyncMutHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.taps.fmt(f)
    }
}

impl<A: ?Sized> SyncMutHook<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            taps: Taps::new(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.taps.hook
    }

    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    pub fn is_used(&self) -> bool {
        !self.taps.names().is_empty()
    }

    pub fn call(&self, arg: &mut A) -> Result<()> {
        for tap in self.taps.snapshot() {
            (tap.f)(arg).map_err(|e| self.taps.wrap_err(&tap, e))?;
        }
        Ok(())
    }
}

/// Synchronous hook where the first observer to return `Some` wins.
pub struct SyncBailHook<A: ?Sized, R> {
    taps: Taps<BailFn<A, R>>,
}

impl<A: ?Sized, R> fmt::Debug for SyncBailHook<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.taps.fmt(f)
    }
}

impl<A: ?Sized, R> SyncBailHook<A, R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            taps: Taps::new(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.taps.hook
    }

    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&A) -> anyhow::Result<Option<R>> + Send + Sync + 'static,
    {
        self.taps.push(name.into(), Arc::new(f));
    }

    pub fn is_used(&self) -> bool {
        !self.taps.names().is_empty()
    }

    /// Returns the first `Some` produced, or `None` when every observer
    /// passed.
    pub fn call(&self, arg: &A) -> Result<Option<R>> {
        for tap in self.taps.snapshot() {
            if let Some(value) = (tap.f)(arg).map_err(|e| self.taps.wrap_err(&tap, e))? {
                tracing::trace!(hook = self.taps.hook, tap = %tap.name, "bail hook decided");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Asynchronous hook; observers run one after another.
pub struct AsyncSeriesHook<A> {
    taps: Taps<SeriesFn<A>>,
}

impl<A> fmt::Debug for AsyncSeriesHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.taps.fmt(f)
    }
}

impl<A> AsyncSeriesHook<A>
where
    A: Clone + Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            taps: Taps::new(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.taps.hook
    }

    /// Register a synchronous observer.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(move |arg: A| -> HookFuture {
            let result = f(arg);
            Box::pin(async move { result })
        });
        self.taps.push(name.into(), f);
    }

    /// Register an observer that performs async work. The next observer
    /// starts only after the returned future resolves.
    pub fn tap_async<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f = Arc::new(move |arg: A| -> HookFuture { Box::pin(f(arg)) });
        self.taps.push(name.into(), f);
    }

    pub fn is_used(&self) -> bool {
        !self.taps.names().is_empty()
    }

    pub async fn call(&self, arg: A) -> Result<()> {
        for tap in self.taps.snapshot() {
            (tap.f)(arg.clone())
                .await
                .map_err(|e| self.taps.wrap_err(&tap, e))?;
        }
        Ok(())
    }
}
