//! CLI command definitions for the `stepflow` binary.

pub mod demo;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use stepflow_types::config::HostConfig;

use crate::config::DEFAULT_CONFIG_FILE;

/// Run and inspect stepflow workflows.
#[derive(Parser)]
#[command(name = "stepflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the host configuration file.
    #[arg(long, global = true, env = "STEPFLOW_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the built-in order saga (reserve, charge, ship, notify).
    Demo(demo::DemoArgs),

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Log filter for the given verbosity flags.
///
/// Without flags the configured filter applies; `--quiet` narrows it to
/// errors, `-v` adds engine debug output, `-vv` enables everything.
pub fn log_filter(configured: &str, verbose: u8, quiet: bool) -> String {
    match verbose {
        0 if quiet => "error".to_string(),
        0 => configured.to_string(),
        1 => format!("{configured},stepflow_core=debug,stepflow=debug"),
        _ => "trace".to_string(),
    }
}

/// Handle `stepflow config`.
pub fn show_config(config: &HostConfig, path: &std::path::Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Configuration").bold(),
        style(format!("({})", path.display())).dim()
    );
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_demo_flags() {
        let cli = Cli::try_parse_from([
            "stepflow",
            "--json",
            "-vv",
            "demo",
            "--fail-at",
            "charge_payment",
            "--compensate",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Demo(args) => {
                assert_eq!(args.fail_at.as_deref(), Some("charge_payment"));
                assert!(args.compensate);
                assert!(!args.cancel);
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn log_filter_follows_flags() {
        assert_eq!(log_filter("info", 0, false), "info");
        assert_eq!(log_filter("info", 0, true), "error");
        assert_eq!(
            log_filter("warn", 1, false),
            "warn,stepflow_core=debug,stepflow=debug"
        );
        assert_eq!(log_filter("info", 3, true), "trace");
    }
}
