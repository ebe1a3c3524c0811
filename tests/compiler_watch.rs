// tests/compiler_watch.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use packwatch::compilation::Stats;
use packwatch::compiler::{WatchPhase, Watching};
use packwatch::config::Mode;
use packwatch::errors::CompileError;
use packwatch::watch::ChangeSet;
use packwatch_test_utils::{
    EventLog, Harness, OptionsBuilder, eventually, init_tracing, with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;
type Results = mpsc::UnboundedReceiver<Result<Stats, CompileError>>;

fn start_watch(h: &Harness, log: &EventLog) -> (Watching, Results) {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = log.clone();
    let options = h.compiler.options().watch_options.clone();
    let watching = h
        .compiler
        .watch(options, move |result| {
            log.push("handler");
            let _ = tx.send(result);
        })
        .expect("watch should start");
    (watching, rx)
}

async fn next(rx: &mut Results) -> Result<Stats, CompileError> {
    with_timeout(rx.recv()).await.expect("watch session ended")
}

/// Make every watch run linger so tests can act while it is in flight.
fn slow_watch_runs(h: &Harness) -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    h.compiler.hooks().watch_run.tap_async("slow", move |_| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(());
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(())
        }
    });
    rx
}

fn positions(events: &[String], name: &str) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.as_str() == name)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn change_notification_triggers_rebuild_with_cache_reuse() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./c").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);
    let seen_changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen_changes);
    h.compiler.hooks().watch_run.tap("record-changes", move |compiler| {
        sink.lock().unwrap().push(compiler.modified_files());
        Ok(())
    });

    let (watching, mut rx) = start_watch(&h, &log);
    assert!(h.compiler.watch_mode());

    let first = next(&mut rx).await?;
    assert!(first.compilation().modules().all(|m| !m.cached));
    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() == 1).await;
    let request = h.watcher.last_request().unwrap();
    for file in ["/project/a.js", "/project/b.js", "/project/c.js"] {
        assert!(request.files.contains(Path::new(file)), "{file} not watched");
    }

    h.input.add_file(
        "/project/a.js",
        "module.exports = function a() {\n  return \"This is a, edited\";\n};\n",
    );
    assert!(h.watcher.push(ChangeSet::changed(["/project/a.js"])));

    let second = next(&mut rx).await?;
    let c = second.compilation();
    assert!(!c.module("./a.js").unwrap().cached);
    assert!(c.module("./b.js").unwrap().cached);
    assert!(!c.module("./c.js").unwrap().cached);
    assert!(
        h.output
            .read("/project/dist/main.js")
            .unwrap()
            .contains("This is a, edited")
    );

    assert_eq!(log.count("invalid"), 1);
    assert_eq!(
        watching.last_change(),
        Some(ChangeSet::changed(["/project/a.js"]))
    );
    let seen = seen_changes.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_empty());
    assert!(seen[1].contains(Path::new("/project/a.js")));

    watching.close_async().await;
    assert_eq!(log.count("watch_close"), 1);
    assert!(!h.compiler.watch_mode());
    assert_eq!(h.watcher.closed_handles(), h.watcher.subscriptions());
    Ok(())
}

#[tokio::test]
async fn run_and_watch_exclude_each_other() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;

    let rejected = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&rejected);
    h.compiler.run(move |result| {
        *slot.lock().unwrap() = Some(result.is_err());
    });
    assert_eq!(*rejected.lock().unwrap(), Some(true));

    let again = h.compiler.watch(Default::default(), |_| {});
    assert!(matches!(again, Err(CompileError::ConcurrentCompilation)));

    watching.close_async().await;
    h.compiler.run_async().await?;
    Ok(())
}

#[tokio::test]
async fn watch_is_rejected_while_a_run_is_in_flight() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());

    let (tx, rx) = tokio::sync::oneshot::channel();
    h.compiler.run(move |result| {
        let _ = tx.send(result);
    });
    let watch = h.compiler.watch(Default::default(), |_| {});
    assert!(matches!(watch, Err(CompileError::ConcurrentCompilation)));

    with_timeout(rx).await??;
    Ok(())
}

#[tokio::test]
async fn invalidate_forces_one_run_and_calls_back_after_watch_run() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;
    let log2 = log.clone();
    eventually(move || log2.count("after_done") == 1).await;

    let cb_log = log.clone();
    watching.invalidate(move || cb_log.push("invalidate-cb"));
    next(&mut rx).await?;
    let log3 = log.clone();
    eventually(move || log3.count("after_done") == 2).await;

    let events = log.events();
    let watch_runs = positions(&events, "watch_run");
    assert_eq!(watch_runs.len(), 2);
    let cb = positions(&events, "invalidate-cb");
    assert_eq!(cb.len(), 1);
    assert!(cb[0] > watch_runs[1]);
    assert!(cb[0] > positions(&events, "handler")[1]);
    assert!(cb[0] < positions(&events, "after_done")[1]);
    assert_eq!(log.count("invalid"), 1);

    // nothing else was scheduled
    let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err());

    watching.close_async().await;
    Ok(())
}

#[tokio::test]
async fn invalidate_during_a_run_is_honoured_after_its_after_done() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);
    let mut started = slow_watch_runs(&h);

    let (watching, mut rx) = start_watch(&h, &log);
    with_timeout(started.recv()).await;
    assert!(h.compiler.running());

    let cb_log = log.clone();
    watching.invalidate(move || cb_log.push("invalidate-cb"));

    next(&mut rx).await?;
    next(&mut rx).await?;
    let log2 = log.clone();
    eventually(move || log2.count("after_done") == 2).await;

    let events = log.events();
    let watch_runs = positions(&events, "watch_run");
    let after_done = positions(&events, "after_done");
    let handlers = positions(&events, "handler");
    let cb = positions(&events, "invalidate-cb");

    assert_eq!(watch_runs.len(), 2);
    assert!(watch_runs[1] > after_done[0]);
    assert_eq!(cb.len(), 1);
    assert!(cb[0] > handlers[1] && cb[0] < after_done[1]);

    watching.close_async().await;
    Ok(())
}

#[tokio::test]
async fn close_waits_for_the_in_flight_run() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);
    let mut started = slow_watch_runs(&h);

    let (watching, mut rx) = start_watch(&h, &log);
    with_timeout(started.recv()).await;

    let cb_log = log.clone();
    watching.close(move || cb_log.push("close-cb"));
    assert_eq!(watching.phase(), WatchPhase::Closing);
    assert!(h.compiler.watch_mode());

    assert!(next(&mut rx).await.is_ok());
    let log2 = log.clone();
    eventually(move || log2.position("close-cb").is_some()).await;

    let log2 = log.clone();
    eventually(move || log2.position("after_done").is_some()).await;

    let events = log.events();
    let handler = log.position("handler").unwrap();
    let after_done = log.position("after_done").unwrap();
    let watch_close = log.position("watch_close").unwrap();
    let close_cb = log.position("close-cb").unwrap();
    // the run completes for the handler, the close lands before its after_done
    assert!(handler < watch_close);
    assert_eq!(close_cb, watch_close + 1);
    assert_eq!(after_done, close_cb + 1);
    assert_eq!(positions(&events, "watch_run").len(), 1);

    assert!(watching.is_closed());
    assert!(!h.compiler.watch_mode());
    assert!(!h.compiler.running());
    Ok(())
}

#[tokio::test]
async fn close_from_the_handler_finishes_before_after_done() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let slot: Arc<Mutex<Option<Watching>>> = Arc::new(Mutex::new(None));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler_log = log.clone();
    let handler_slot = Arc::clone(&slot);
    let mut runs = 0;
    let watching = h.compiler.watch(
        h.compiler.options().watch_options.clone(),
        move |result| {
            runs += 1;
            handler_log.push("handler");
            if runs == 2 {
                if let Some(w) = handler_slot.lock().unwrap().as_ref() {
                    let cb_log = handler_log.clone();
                    w.close(move || cb_log.push("close-cb"));
                }
            }
            let _ = tx.send(result);
        },
    )?;
    next(&mut rx).await?;

    *slot.lock().unwrap() = Some(watching);
    if let Some(w) = slot.lock().unwrap().as_ref() {
        w.invalidate(|| {});
    }
    next(&mut rx).await?;
    let log2 = log.clone();
    eventually(move || log2.count("after_done") == 2).await;

    let events = log.events();
    let handler = positions(&events, "handler")[1];
    let watch_close = log.position("watch_close").unwrap();
    let close_cb = log.position("close-cb").unwrap();
    let after_done = positions(&events, "after_done")[1];
    assert!(handler < watch_close);
    assert_eq!(close_cb, watch_close + 1);
    assert_eq!(after_done, close_cb + 1);
    assert_eq!(events.last().map(String::as_str), Some("after_done"));

    assert!(!h.compiler.watch_mode());
    assert!(slot.lock().unwrap().as_ref().is_some_and(Watching::is_closed));
    Ok(())
}

#[tokio::test]
async fn panicking_watch_run_fails_that_run_only() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);
    let armed = Arc::new(AtomicBool::new(true));
    let trigger = Arc::clone(&armed);
    h.compiler.hooks().watch_run.tap("explode", move |_| {
        if trigger.swap(false, Ordering::SeqCst) {
            panic!("watch_run observer exploded");
        }
        Ok(())
    });

    let (watching, mut rx) = start_watch(&h, &log);
    let first = next(&mut rx).await;
    assert!(matches!(first, Err(CompileError::Other(_))), "{first:?}");
    assert!(h.compiler.watch_mode());
    assert!(!h.compiler.running());

    watching.invalidate(|| {});
    let second = next(&mut rx).await?;
    assert!(!second.has_errors());
    assert_eq!(log.count("failed"), 1);

    watching.close_async().await;
    assert!(!h.compiler.watch_mode());
    Ok(())
}

#[tokio::test]
async fn closing_twice_fires_watch_close_once() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;

    let first = log.clone();
    watching.close(move || first.push("close-cb:1"));
    let second = log.clone();
    watching.close(move || second.push("close-cb:2"));

    let log2 = log.clone();
    eventually(move || log2.count("close-cb:1") == 1 && log2.count("close-cb:2") == 1).await;
    assert_eq!(log.count("watch_close"), 1);

    // after closing, callbacks run immediately
    let third = log.clone();
    watching.close(move || third.push("close-cb:3"));
    assert_eq!(log.count("close-cb:3"), 1);
    let fourth = log.clone();
    watching.invalidate(move || fourth.push("invalidate-cb"));
    assert_eq!(log.count("invalidate-cb"), 1);
    assert_eq!(log.count("watch_close"), 1);
    assert_eq!(log.count("invalid"), 0);
    Ok(())
}

#[tokio::test]
async fn queued_change_sets_are_merged_into_one_run() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./c").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;
    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() == 1).await;

    assert!(h.watcher.push(ChangeSet::changed(["/project/a.js"])));
    assert!(h.watcher.push(ChangeSet::changed(["/project/b.js"])));

    next(&mut rx).await?;
    let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err(), "expected a single rebuild");

    let last = watching.last_change().unwrap();
    assert_eq!(
        last.changed.into_iter().collect::<Vec<_>>(),
        vec![PathBuf::from("/project/a.js"), PathBuf::from("/project/b.js")]
    );
    assert_eq!(log.count("invalid"), 2);
    assert_eq!(log.count("watch_run"), 2);

    watching.close_async().await;
    Ok(())
}

#[tokio::test]
async fn removed_dependency_becomes_a_diagnostic_and_is_watched_as_missing() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().mode(Mode::Development).entry("./c").build());
    let log = EventLog::new();

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;

    assert!(h.input.remove("/project/b.js"));
    assert!(h.watcher.push(ChangeSet::removed(["/project/b.js"])));

    let stats = next(&mut rx).await?;
    assert_eq!(stats.compilation().errors().len(), 1);
    assert!(h.compiler.removed_files().contains(Path::new("/project/b.js")));

    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() == 2).await;
    let request = h.watcher.last_request().unwrap();
    assert!(request.missing.contains(Path::new("/project/b.js")));
    assert!(!request.files.contains(Path::new("/project/b.js")));

    // bringing the file back fixes the build
    h.input.add_file("/project/b.js", "module.exports = function b() { return \"b\"; };\n");
    assert!(h.watcher.push(ChangeSet::changed(["/project/b.js"])));
    let stats = next(&mut rx).await?;
    assert!(!stats.has_errors());

    watching.close_async().await;
    Ok(())
}

#[tokio::test]
async fn failed_watch_run_keeps_the_previous_subscription() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;
    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() == 1).await;

    h.output.fail_writes(true);
    assert!(h.watcher.push(ChangeSet::changed(["/project/a.js"])));
    let failed = next(&mut rx).await;
    assert!(matches!(failed, Err(CompileError::Io { .. })));
    let log2 = log.clone();
    eventually(move || log2.count("after_done") == 2).await;
    assert_eq!(log.count("failed"), 1);
    assert_eq!(h.watcher.subscriptions(), 1);
    assert_eq!(h.watcher.closed_handles(), 0);

    h.output.fail_writes(false);
    assert!(h.watcher.push(ChangeSet::changed(["/project/a.js"])));
    next(&mut rx).await?;
    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() == 2).await;
    assert_eq!(h.watcher.closed_handles(), 1);

    watching.close_async().await;
    assert_eq!(h.watcher.closed_handles(), 2);
    Ok(())
}

#[tokio::test]
async fn dropping_the_handle_closes_the_session() -> TestResult {
    init_tracing();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    let log = EventLog::new();
    log.tap_lifecycle(&h.compiler);

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;
    drop(watching);

    let compiler = Arc::clone(&h.compiler);
    eventually(move || !compiler.watch_mode()).await;
    assert_eq!(log.count("watch_close"), 1);
    assert!(rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn changes_purge_the_input_file_system() -> TestResult {
    init_tracing();
    let input = packwatch_test_utils::CountingInputFileSystem::new(packwatch_test_utils::fixture_fs());
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    h.compiler.set_input_file_system(Arc::new(input.clone()));
    let log = EventLog::new();

    let (watching, mut rx) = start_watch(&h, &log);
    next(&mut rx).await?;
    assert_eq!(input.purges(), 0);

    watching.invalidate(|| {});
    next(&mut rx).await?;
    assert_eq!(input.purges(), 0, "manual invalidation does not purge");

    let watcher = Arc::clone(&h.watcher);
    eventually(move || watcher.subscriptions() >= 1).await;
    assert!(h.watcher.push(ChangeSet::changed(["/project/a.js"])));
    next(&mut rx).await?;
    assert_eq!(input.purges(), 1);

    watching.close_async().await;
    Ok(())
}
