//! Layered configuration (§6 ambient), grounded on the teacher's
//! `configuration.rs::Configuration::load` + `apply_cli_overrides` pattern:
//! built-in defaults, then a system config file, then a user config file,
//! then a project-local `ingest-logs.toml`, then three named environment
//! variables, then CLI flags, each layer overriding the last.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error(transparent)]
	Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Configuration {
	#[serde(default = "default_db_path")]
	pub db_path: PathBuf,

	#[serde(default = "default_base_dir")]
	pub base_dir: PathBuf,

	#[serde(default = "default_batch_size")]
	pub batch_size: usize,

	#[serde(default = "default_max_file_size_bytes")]
	pub max_file_size_bytes: u64,

	#[serde(default = "default_filter_bots")]
	pub filter_bots: bool,

	pub cloudflare_api_token: Option<String>,
	pub cloudflare_zone_id: Option<String>,
}

fn default_db_path() -> PathBuf {
	dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("ingest-logs").join("ingest-logs.sqlite3")
}

fn default_base_dir() -> PathBuf {
	PathBuf::from(".")
}

fn default_batch_size() -> usize {
	1000
}

fn default_max_file_size_bytes() -> u64 {
	10 * 1024u64.pow(3) // 10 GiB
}

fn default_filter_bots() -> bool {
	true
}

impl Default for Configuration {
	fn default() -> Self {
		Self {
			db_path: default_db_path(),
			base_dir: default_base_dir(),
			batch_size: default_batch_size(),
			max_file_size_bytes: default_max_file_size_bytes(),
			filter_bots: default_filter_bots(),
			cloudflare_api_token: None,
			cloudflare_zone_id: None,
		}
	}
}

impl Configuration {
	/// Load configuration from every layer, honoring an explicit
	/// `--config` path if one was given on the CLI.
	pub fn load(explicit_path: &Option<PathBuf>) -> Result<Self, ConfigurationError> {
		let mut builder = Config::builder().add_source(Config::try_from(&Configuration::default())?);

		if let Some(path) = explicit_path {
			builder = builder.add_source(File::from(path.clone()).required(true));
		} else {
			if let Some(system_dir) = dirs::config_dir() {
				builder = builder
					.add_source(File::from(system_dir.join("ingest-logs").join("config")).required(false));
			}
			if let Some(user_dir) = dirs::config_local_dir().or_else(dirs::config_dir) {
				builder = builder
					.add_source(File::from(user_dir.join("ingest-logs").join("config")).required(false));
			}
			builder = builder.add_source(File::with_name("ingest-logs").required(false));
		}

		builder = builder.add_source(
			Environment::default()
				.prefix("INGEST_LOGS")
				.try_parsing(true)
				.list_separator(",")
				.with_list_parse_key("inputs"),
		);

		let config = builder.build()?;
		Ok(config.try_deserialize()?)
	}

	/// Apply CLI flags on top of the loaded layers; CLI always wins.
	pub fn apply_cli_overrides(&mut self, cli: &Cli) {
		if let Some(db_path) = &cli.db_path {
			self.db_path = db_path.clone();
		}
		if let Some(base_dir) = &cli.base_dir {
			self.base_dir = base_dir.clone();
		}
		if let Some(batch_size) = cli.batch_size {
			self.batch_size = batch_size;
		}
		if let Some(max_file_size) = cli.max_file_size {
			self.max_file_size_bytes = max_file_size.0;
		}
		self.filter_bots = cli.effective_filter_bots();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let config = Configuration::default();
		assert_eq!(config.batch_size, 1000);
		assert!(config.filter_bots);
	}

	#[test]
	fn cli_overrides_win_over_defaults() {
		let mut config = Configuration::default();
		let cli = Cli {
			provider: None,
			input: vec![],
			start_date: None,
			end_date: None,
			filter_bots: true,
			no_filter_bots: true,
			db_path: Some(PathBuf::from("/tmp/custom.sqlite3")),
			base_dir: None,
			max_file_size: None,
			batch_size: Some(42),
			validate_only: false,
			list_providers: false,
			config: None,
			verbose: 0,
		};
		config.apply_cli_overrides(&cli);
		assert_eq!(config.db_path, PathBuf::from("/tmp/custom.sqlite3"));
		assert_eq!(config.batch_size, 42);
		assert!(!config.filter_bots);
	}
}
