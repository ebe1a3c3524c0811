// tests/child_compiler.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use packwatch::builder::{BuildContext, BuildFuture, GraphBuilder, SimpleGraphBuilder};
use packwatch::compilation::Compilation;
use packwatch::compiler::{Compiler, CompilationRef, ParentMarker, Plugin};
use packwatch::config::Mode;
use packwatch::fs::{CachedInputFileSystem, MemoryFileSystem};
use packwatch_test_utils::{
    CountingInputFileSystem, EventLog, Harness, OptionsBuilder, fixture_fs, init_tracing,
};

type TestResult = Result<(), Box<dyn Error>>;

/// Builds the normal graph, then compiles `request` in a child compiler and
/// attaches the result. Child compilers share this builder, so it only
/// spawns from a top-level compilation.
#[derive(Debug)]
struct WithWorker {
    request: &'static str,
    child_log: EventLog,
}

impl GraphBuilder for WithWorker {
    fn build<'a>(
        &'a self,
        ctx: BuildContext<'a>,
        compilation: &'a mut Compilation,
    ) -> BuildFuture<'a> {
        Box::pin(async move {
            SimpleGraphBuilder::new().build(ctx, compilation).await?;
            let Some(compiler) = compilation.compiler() else {
                return Ok(());
            };
            if compiler.is_child() {
                return Ok(());
            }
            let entry = BTreeMap::from([("worker".to_string(), self.request.to_string())]);
            let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(LogPlugin(self.child_log.clone()))];
            let child = compiler.create_child_compiler(compilation, "worker", Some(entry), plugins);
            let child_compilation = child.run_as_child().await?;
            compilation.add_child(child_compilation);
            Ok(())
        })
    }
}

struct LogPlugin(EventLog);

impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        "LogPlugin"
    }

    fn apply(&self, compiler: &Arc<Compiler>) {
        self.0.tap_lifecycle(compiler);
    }
}

fn harness_with_worker(options: packwatch::config::CompilerOptions, request: &'static str) -> (Harness, EventLog) {
    let child_log = EventLog::new();
    let h = Harness::new(options);
    let compiler = Compiler::builder(h.compiler.options().clone())
        .input_file_system(Arc::new(h.input.clone()))
        .output_file_system(h.output.clone())
        .watch_file_system(h.watcher.clone())
        .graph_builder(Arc::new(WithWorker {
            request,
            child_log: child_log.clone(),
        }))
        .build()
        .expect("valid options");
    (Harness { compiler, ..h }, child_log)
}

#[test]
fn is_child_follows_loose_truthiness() {
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    assert!(!h.compiler.is_child());

    let falsy = [
        ParentMarker::Null,
        ParentMarker::from(false),
        ParentMarker::from(0_i64),
        ParentMarker::from(f64::NAN),
        ParentMarker::from(""),
    ];
    for marker in falsy {
        h.compiler.set_parent_compilation(marker.clone());
        assert!(!h.compiler.is_child(), "{marker:?}");
    }

    let truthy = [
        ParentMarker::from(true),
        ParentMarker::from(1_i64),
        ParentMarker::from(-0.5),
        ParentMarker::from("parent"),
        ParentMarker::List(Vec::new()),
        ParentMarker::Object(BTreeMap::new()),
        ParentMarker::Compilation(CompilationRef { id: 7, name: None }),
    ];
    for marker in truthy {
        h.compiler.set_parent_compilation(marker.clone());
        assert!(h.compiler.is_child(), "{marker:?}");
    }

    h.compiler.set_parent_compilation(None::<bool>);
    assert!(!h.compiler.is_child());
}

#[test]
fn builder_accepts_a_parent_marker() {
    let compiler = Compiler::builder(OptionsBuilder::new().entry("./a").build())
        .input_file_system(Arc::new(fixture_fs()))
        .parent_compilation("from-config")
        .build()
        .unwrap();
    assert!(compiler.is_child());
    assert_eq!(compiler.parent_compilation(), ParentMarker::from("from-config"));
}

#[tokio::test]
async fn child_compilation_assets_join_the_parent() -> TestResult {
    init_tracing();
    let (h, child_log) = harness_with_worker(OptionsBuilder::new().name("web").entry("./a").build(), "./b");
    let parent_log = EventLog::new();
    parent_log.tap_lifecycle(&h.compiler);

    let stats = h.compiler.run_async().await?;

    let c = stats.compilation();
    assert_eq!(c.children().len(), 1);
    let child = &c.children()[0];
    assert_eq!(child.name(), Some("web/worker"));
    assert!(child.module("./b.js").is_some());
    assert!(c.asset("worker.js").is_some());
    assert!(h.output.read("/project/dist/main.js").is_some());
    assert!(h.output.read("/project/dist/worker.js").unwrap().contains("This is b"));
    assert!(c.file_dependencies().contains(std::path::Path::new("/project/b.js")));

    // the child only sees its own hook table and never emits
    assert_eq!(
        child_log.events(),
        vec!["this_compilation", "compilation", "after_compile"]
    );
    assert_eq!(parent_log.count("done"), 1);
    assert_eq!(parent_log.count("this_compilation"), 1);

    let json = stats.to_json();
    assert_eq!(json.children.len(), 1);
    assert_eq!(json.children[0].name.as_deref(), Some("web/worker"));
    Ok(())
}

#[tokio::test]
async fn child_errors_surface_through_the_parent() -> TestResult {
    init_tracing();
    let (h, _) = harness_with_worker(
        OptionsBuilder::new().mode(Mode::Production).entry("./a").build(),
        "./no-such-worker",
    );

    let stats = h.compiler.run_async().await?;

    let c = stats.compilation();
    assert!(c.errors().is_empty());
    assert!(c.has_errors());
    assert_eq!(c.children()[0].errors().len(), 1);
    // production skips emission when any compilation in the tree has errors
    assert!(h.output.ops().is_empty());
    Ok(())
}

#[tokio::test]
async fn child_compilers_share_the_cache() -> TestResult {
    init_tracing();
    let (h, _) = harness_with_worker(OptionsBuilder::new().entry("./c").build(), "./b");

    h.compiler.run_async().await?;
    let stats = h.compiler.run_async().await?;

    let child = &stats.compilation().children()[0];
    assert!(child.module("./b.js").unwrap().cached);
    // child modules stay reachable, so the parent run does not evict them
    assert!(h.compiler.cache().unwrap().entry("./b.js").is_some());
    Ok(())
}

#[tokio::test]
async fn purge_reaches_the_input_file_system() -> TestResult {
    init_tracing();
    let counting = CountingInputFileSystem::new(fixture_fs());
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    h.compiler.set_input_file_system(Arc::new(counting.clone()));

    h.compiler.purge_input_file_system();
    h.compiler.purge_input_file_system();
    assert_eq!(counting.purges(), 2);

    // a file system without caches accepts the call too
    h.compiler.set_input_file_system(Arc::new(MemoryFileSystem::new()));
    h.compiler.purge_input_file_system();
    Ok(())
}

#[tokio::test]
async fn purge_drops_stale_reads() -> TestResult {
    init_tracing();
    let memory = fixture_fs();
    let h = Harness::new(OptionsBuilder::new().entry("./a").build());
    h.compiler
        .set_input_file_system(Arc::new(CachedInputFileSystem::new(memory.clone())));

    h.compiler.run_async().await?;
    memory.add_file("/project/a.js", "module.exports = \"fresh\";\n");

    h.compiler.run_async().await?;
    assert!(!h.output.read("/project/dist/main.js").unwrap().contains("fresh"));

    h.compiler.purge_input_file_system();
    h.compiler.run_async().await?;
    assert!(h.output.read("/project/dist/main.js").unwrap().contains("fresh"));
    Ok(())
}
