// tests/real_fs.rs

use std::error::Error;
use std::fs;
use std::io::Write;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};
use tokio::sync::mpsc;

use packwatch::compiler::Compiler;
use packwatch::config::{Mode, load_and_validate};
use packwatch::errors::ConfigError;
use packwatch_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn project() -> Result<TempDir, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;
    fs::write(
        dir.path().join("src/index.js"),
        "var util = require(\"./util\");\nconsole.log(util());\n",
    )?;
    fs::write(
        dir.path().join("src/util.js"),
        "module.exports = function () { return \"util v1\"; };\n",
    )?;
    fs::write(
        dir.path().join("Packwatch.toml"),
        r#"
mode = "development"
entry = "./src/index.js"

[output]
path = "build/out"
filename = "[name].bundle.js"

[watch_options]
aggregate_timeout_ms = 50
ignored = ["**/build/**"]
"#,
    )?;
    Ok(dir)
}

#[tokio::test]
async fn config_on_disk_builds_into_the_output_directory() -> TestResult {
    init_tracing();
    let dir = project()?;
    let options = load_and_validate(dir.path().join("Packwatch.toml"))?;

    assert_eq!(options.mode, Mode::Development);
    assert!(!options.optimization.no_emit_on_errors);
    assert_eq!(options.output.path, dir.path().join("build/out"));
    assert_eq!(options.entry.get("main").map(String::as_str), Some("./src/index.js"));

    let compiler = Compiler::builder(options).build()?;
    let stats = compiler.run_async().await?;
    assert!(!stats.has_errors(), "{stats}");

    let bundle = fs::read_to_string(dir.path().join("build/out/main.bundle.js"))?;
    assert!(bundle.contains("util v1"));
    assert!(bundle.contains("__packwatch_require__(\"./src/util.js\")"));

    // the output directory now exists; a second run must not trip over it
    compiler.run_async().await?;
    Ok(())
}

#[tokio::test]
async fn notify_watcher_picks_up_edits() -> TestResult {
    init_tracing();
    let dir = project()?;
    let options = load_and_validate(dir.path().join("Packwatch.toml"))?;
    let watch_options = options.watch_options.clone();
    let compiler = Compiler::builder(options).build()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watching = compiler.watch(watch_options, move |result| {
        let _ = tx.send(result.map(|stats| stats.compilation().modules().count()));
    })?;

    let first = with_timeout(rx.recv()).await.expect("initial run");
    assert_eq!(first?, 2);

    // give the backend a moment to register its watches
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(
        dir.path().join("src/util.js"),
        "module.exports = function () { return \"util v2\"; };\n",
    )?;

    let second = with_timeout(rx.recv()).await.expect("rebuild");
    assert_eq!(second?, 2);
    let bundle = fs::read_to_string(dir.path().join("build/out/main.bundle.js"))?;
    assert!(bundle.contains("util v2"));
    let last = watching.last_change().expect("change recorded");
    assert!(
        last.changed
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == "util.js"))
    );

    watching.close_async().await;
    assert!(!compiler.watch_mode());
    Ok(())
}

#[test]
fn config_without_entries_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
mode = "production"

[output]
path = "dist"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("at least one entry")),
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn unknown_keys_are_toml_errors() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
entry = "./index.js"
bundle_everything = true
"#
    )
    .unwrap();

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_and_validate(dir.path().join("Packwatch.toml")),
        Err(ConfigError::Io(_))
    ));
}
