//! stepflow host entry point.
//!
//! Binary name: `stepflow`
//!
//! Loads `stepflow.toml`, initializes tracing, then dispatches to the
//! requested command.

mod cli;
mod config;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions need neither config nor tracing
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "stepflow", &mut std::io::stdout());
        return Ok(());
    }

    let host_config = config::load_host_config(&cli.config).await?;

    let filter = cli::log_filter(&host_config.logging.filter, cli.verbose, cli.quiet);
    stepflow_observe::tracing_setup::init_tracing(&filter, host_config.logging.otel)?;

    let outcome = match cli.command {
        Commands::Demo(args) => {
            cli::demo::handle_demo(args, &host_config, cli.json, cli.quiet).await
        }
        Commands::Config => cli::show_config(&host_config, &cli.config, cli.json),
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    stepflow_observe::tracing_setup::shutdown_tracing();
    outcome
}
