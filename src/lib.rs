// src/lib.rs

pub mod builder;
pub mod cache;
pub mod cli;
pub mod compilation;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod fs;
pub mod hooks;
pub mod logging;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

pub use crate::compilation::{Compilation, Stats};
pub use crate::compiler::{Compiler, CompilerBuilder, Watching};
pub use crate::config::CompilerOptions;
pub use crate::errors::{CompileError, ConfigError};

use crate::cli::CliArgs;
use crate::config::load_and_validate;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds a compiler with the default collaborators and
/// either runs it once or watches until Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut options = load_and_validate(&config_path)?;
    if args.bail {
        options.bail = true;
    }

    if args.dry_run {
        print_dry_run(&options);
        return Ok(());
    }

    let compiler = Compiler::builder(options).build()?;
    if args.watch {
        watch_until_interrupted(&compiler).await
    } else {
        run_once(&compiler).await
    }
}

async fn run_once(compiler: &Arc<Compiler>) -> Result<()> {
    let stats = compiler.run_async().await?;
    println!("{stats}");
    if stats.has_errors() {
        bail!("compilation finished with errors");
    }
    Ok(())
}

async fn watch_until_interrupted(compiler: &Arc<Compiler>) -> Result<()> {
    let options = compiler.options().watch_options.clone();
    let watching = compiler.watch(options, |result| match result {
        Ok(stats) => println!("{stats}"),
        Err(err) => eprintln!("packwatch: build failed: {err}"),
    })?;
    info!("watching for changes; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; closing watcher");
    }
    watching.close_async().await;
    Ok(())
}

/// Print the resolved options without building anything.
fn print_dry_run(options: &CompilerOptions) {
    println!("packwatch dry-run");
    if let Some(name) = &options.name {
        println!("  name = {name}");
    }
    println!("  mode = {:?}", options.mode);
    println!("  context = {}", options.context.display());
    println!("  bail = {}", options.bail);
    println!("  cache = {}", options.cache);
    println!(
        "  optimization.no_emit_on_errors = {}",
        options.optimization.no_emit_on_errors
    );
    println!();

    println!("entries ({}):", options.entry.len());
    for (name, request) in &options.entry {
        println!(
            "  - {name}: {request} -> {}",
            options.output.path.join(options.output.filename_for(name)).display()
        );
    }

    println!();
    println!(
        "watch: aggregate_timeout_ms = {}",
        options.watch_options.aggregate_timeout_ms
    );
    if !options.watch_options.ignored.is_empty() {
        println!("  ignored: {:?}", options.watch_options.ignored);
    }

    debug!("dry-run complete (nothing built)");
}
