use std::sync::{Arc, Mutex};

use packwatch::compiler::Compiler;

/// Shared, ordered list of lifecycle events recorded by tests.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Tap every lifecycle hook of `compiler`, recording the hook name.
    pub fn tap_lifecycle(&self, compiler: &Compiler) {
        let hooks = compiler.hooks();

        let log = self.clone();
        hooks.before_run.tap("log", move |_| {
            log.push("before_run");
            Ok(())
        });
        let log = self.clone();
        hooks.run.tap("log", move |_| {
            log.push("run");
            Ok(())
        });
        let log = self.clone();
        hooks.watch_run.tap("log", move |_| {
            log.push("watch_run");
            Ok(())
        });
        let log = self.clone();
        hooks.this_compilation.tap("log", move |_| {
            log.push("this_compilation");
            Ok(())
        });
        let log = self.clone();
        hooks.compilation.tap("log", move |_| {
            log.push("compilation");
            Ok(())
        });
        let log = self.clone();
        hooks.after_compile.tap("log", move |_| {
            log.push("after_compile");
            Ok(())
        });
        let log = self.clone();
        hooks.emit.tap("log", move |_| {
            log.push("emit");
            Ok(())
        });
        let log = self.clone();
        hooks.after_emit.tap("log", move |_| {
            log.push("after_emit");
            Ok(())
        });
        let log = self.clone();
        hooks.done.tap("log", move |_| {
            log.push("done");
            Ok(())
        });
        let log = self.clone();
        hooks.failed.tap("log", move |_| {
            log.push("failed");
            Ok(())
        });
        let log = self.clone();
        hooks.after_done.tap("log", move |_| {
            log.push("after_done");
            Ok(())
        });
        let log = self.clone();
        hooks.invalid.tap("log", move |_| {
            log.push("invalid");
            Ok(())
        });
        let log = self.clone();
        hooks.watch_close.tap("log", move |_| {
            log.push("watch_close");
            Ok(())
        });
    }
}
