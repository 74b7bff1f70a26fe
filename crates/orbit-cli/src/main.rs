mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use orbit_config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let cli::Commands::Completions { shell } = cli.command {
        commands::completions::handle(shell);
        return Ok(());
    }

    let config = Config::load_from(cli.config.as_deref())?;

    match cli.command {
        cli::Commands::Categorize {
            input,
            output_dir,
            no_checkpoint,
            planner,
            run,
        } => {
            commands::categorize::handle(config, input, output_dir, no_checkpoint, planner, run)
                .await
        }
        cli::Commands::Plan {
            input,
            json,
            planner,
        } => commands::plan::handle(config, input, json, planner),
        cli::Commands::Merge {
            ideas,
            categorized,
            output,
        } => commands::merge::handle(&config, ideas, categorized, output),
        cli::Commands::Prepare { input, output } => {
            commands::prepare::handle(&config, input, output)
        }
        cli::Commands::Tally { input, json } => commands::tally::handle(input, json),
        cli::Commands::Completions { .. } => Ok(()),
    }
}
