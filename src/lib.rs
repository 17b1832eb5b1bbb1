pub mod bot_classifier;
pub mod cli;
pub mod compression;
pub mod configuration;
pub mod driver;
pub mod error;
pub mod parsers;
pub mod providers;
pub mod record;
pub mod registry;
pub mod security;
pub mod storage;
pub mod timestamp;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use configuration::{Configuration, ConfigurationError};
use driver::{DriverConfig, EXIT_FATAL_ERROR, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS};
use error::IngestionError;
use providers::IngestOptions;

#[derive(Debug, Error)]
pub enum RunError {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),

	#[error(transparent)]
	Ingestion(#[from] IngestionError),
}

fn init_tracing(verbosity: u8) {
	let default_level = match verbosity {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Parse CLI args, load configuration, and run the ingestion pipeline.
/// Returns the process exit code to use, per §4.6.
pub async fn run() -> Result<i32, RunError> {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	if cli.list_providers {
		for name in registry::list_providers() {
			println!("{name}");
		}
		return Ok(EXIT_SUCCESS);
	}

	let mut configuration = Configuration::load(&cli.config)?;
	configuration.apply_cli_overrides(&cli);

	let base_dir = configuration.base_dir.clone();
	let inputs = driver::expand_and_validate_inputs(&cli.input, &base_dir)?;

	let options = IngestOptions {
		start_time: cli.start_date,
		end_time: cli.end_date,
		filter_bots: configuration.filter_bots,
		base_dir: Some(base_dir.clone()),
	};

	let driver_config = DriverConfig {
		provider_name: cli.provider.clone(),
		inputs,
		source_type: None,
		db_path: configuration.db_path.clone(),
		base_dir,
		batch_size: configuration.batch_size,
		validate_only: cli.validate_only,
		options,
		cloudflare_api_token: configuration.cloudflare_api_token.clone(),
		cloudflare_zone_id: configuration.cloudflare_zone_id.clone(),
	};

	let summary = driver::run(driver_config).await?;
	tracing::info!(
		ingested = summary.records_ingested,
		skipped = summary.records_skipped,
		failed = summary.records_failed,
		"ingestion complete"
	);

	if summary.records_failed > 0 {
		Ok(EXIT_PARTIAL_FAILURE)
	} else {
		Ok(EXIT_SUCCESS)
	}
}
