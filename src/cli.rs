//! Command-line interface (§6). A single command, not a subcommand tree:
//! ingest-logs does one thing. Flags follow the teacher's `clap` derive
//! style (`value_name`, `value_enum`, `ArgAction::Count` for verbosity).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ingest-logs", version, about = "Multi-provider log ingestion and normalization engine")]
pub struct Cli {
	/// Provider to use (e.g. aws_cloudfront, aws_alb, cloudflare). Omit to
	/// auto-detect from the input's content and extension.
	#[arg(long, value_name = "PROVIDER")]
	pub provider: Option<String>,

	/// One or more input files, directories, glob patterns, or `api://`
	/// URIs to ingest.
	#[arg(required_unless_present = "list_providers")]
	pub input: Vec<String>,

	/// Only records at or after this RFC 3339 timestamp are kept.
	#[arg(long, value_name = "TIMESTAMP")]
	pub start_date: Option<DateTime<Utc>>,

	/// Only records at or before this RFC 3339 timestamp are kept.
	#[arg(long, value_name = "TIMESTAMP")]
	pub end_date: Option<DateTime<Utc>>,

	/// Drop records whose user agent matches the known LLM bot catalog.
	#[arg(long, default_value_t = true, overrides_with = "no_filter_bots")]
	pub filter_bots: bool,

	/// Keep bot-matched records instead of dropping them.
	#[arg(long)]
	pub no_filter_bots: bool,

	/// Path to the SQLite database records are written to.
	#[arg(long, value_name = "PATH")]
	pub db_path: Option<PathBuf>,

	/// Directory every input path must resolve inside of; rejects
	/// traversal outside it.
	#[arg(long, value_name = "PATH")]
	pub base_dir: Option<PathBuf>,

	/// Maximum size of a single input file, e.g. `500MB`, `10GB`. Defaults
	/// to 10GiB.
	#[arg(long, value_name = "SIZE")]
	pub max_file_size: Option<MaxFileSize>,

	/// Number of records to batch into a single storage transaction.
	#[arg(long, value_name = "N")]
	pub batch_size: Option<usize>,

	/// Parse and validate inputs without writing to storage.
	#[arg(long)]
	pub validate_only: bool,

	/// Print the registered provider names and exit.
	#[arg(long)]
	pub list_providers: bool,

	/// Path to a configuration file, overriding the normal search order.
	#[arg(long, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Increase log verbosity; repeat for more (-v, -vv, -vvv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

impl Cli {
	pub fn effective_filter_bots(&self) -> bool {
		!self.no_filter_bots && self.filter_bots
	}
}

/// A file-size limit parsed from strings like `500MB`, `10GB`, `1TB`.
/// Multipliers are binary (1024-based), matching the teacher's own
/// byte-size handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxFileSize(pub u64);

impl std::str::FromStr for MaxFileSize {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let (digits, suffix) = s.find(|c: char| !c.is_ascii_digit() && c != '.').map(|i| s.split_at(i)).unwrap_or((s, ""));

		let number: f64 = digits.parse().map_err(|_| format!("invalid size: '{s}'"))?;
		let multiplier: u64 = match suffix.trim().to_uppercase().as_str() {
			"" | "B" => 1,
			"KB" => 1024,
			"MB" => 1024 * 1024,
			"GB" => 1024 * 1024 * 1024,
			"TB" => 1024 * 1024 * 1024 * 1024,
			other => return Err(format!("unknown size suffix: '{other}'")),
		};
		Ok(MaxFileSize((number * multiplier as f64) as u64))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn max_file_size_parses_binary_multipliers() {
		assert_eq!("10MB".parse::<MaxFileSize>().unwrap().0, 10 * 1024 * 1024);
		assert_eq!("1GB".parse::<MaxFileSize>().unwrap().0, 1024 * 1024 * 1024);
		assert_eq!("512".parse::<MaxFileSize>().unwrap().0, 512);
		assert!("bogus".parse::<MaxFileSize>().is_err());
	}

	#[test]
	fn effective_filter_bots_respects_no_filter_override() {
		let cli = Cli {
			provider: None,
			input: vec![],
			start_date: None,
			end_date: None,
			filter_bots: true,
			no_filter_bots: true,
			db_path: None,
			base_dir: None,
			max_file_size: None,
			batch_size: None,
			validate_only: false,
			list_providers: false,
			config: None,
			verbose: 0,
		};
		assert!(!cli.effective_filter_bots());
	}
}
