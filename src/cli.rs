// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `packwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "packwatch",
    version,
    about = "Bundle CommonJS modules, once or continuously on file changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Packwatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Packwatch.toml")]
    pub config: String,

    /// Keep running and rebuild when watched files change.
    #[arg(long)]
    pub watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PACKWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved options, but don't build.
    #[arg(long)]
    pub dry_run: bool,

    /// Treat the first error diagnostic as fatal.
    #[arg(long)]
    pub bail: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["packwatch"]);
        assert_eq!(args.config, "Packwatch.toml");
        assert!(!args.watch);
        assert!(!args.bail);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn flags() {
        let args = CliArgs::parse_from([
            "packwatch",
            "--config",
            "web/Packwatch.toml",
            "--watch",
            "--log-level",
            "debug",
            "--bail",
        ]);
        assert_eq!(args.config, "web/Packwatch.toml");
        assert!(args.watch);
        assert!(args.bail);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
