//! Harvest AutoML - Main Entry Point
//!
//! Batch pipeline from raw FAOSTAT observations to a persisted production model.

use clap::Parser;
use harvest_automl::cli::{cmd_clean, cmd_predict, cmd_run, cmd_train, resolve_config, Cli, Commands, Overrides};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "harvest_automl=debug" } else { "harvest_automl=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Clean { data, output_dir, simultaneous } => {
            let overrides = Overrides { output_dir, simultaneous, ..Default::default() };
            cmd_clean(resolve_config(config_path, &overrides)?, &data)?;
        }
        Commands::Train { data, models_dir, output_dir, sequential } => {
            let overrides = Overrides { output_dir, models_dir, sequential, ..Default::default() };
            cmd_train(resolve_config(config_path, &overrides)?, &data)?;
        }
        Commands::Run { data, models_dir, output_dir, sequential, simultaneous } => {
            let overrides = Overrides { output_dir, models_dir, sequential, simultaneous };
            cmd_run(resolve_config(config_path, &overrides)?, &data)?;
        }
        Commands::Predict { model, area_harvested, crop_yield } => {
            cmd_predict(&model, area_harvested, crop_yield)?;
        }
    }

    Ok(())
}
