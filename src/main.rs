//! Crash risk - Main Entry Point

use clap::Parser;
use crash_risk::cli::{cmd_info, cmd_predict, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crash_risk=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config, data_dir, output } => {
            cmd_train(&config, &data_dir, output.as_deref())?;
        }
        Commands::Predict { model, data, crashes, segment_column, output } => {
            cmd_predict(&model, &data, crashes.as_deref(), &segment_column, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
