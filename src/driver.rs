//! Ingestion driver (C7): resolves a provider, runs it, batches the
//! results into storage, and reports progress. Grounded on the teacher's
//! `cli.rs::process_files_parallel` (rayon worker pool) and
//! `data/database/dumps.rs::write_all` (batched transactional insert).

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::error::IngestionError;
use crate::providers::{IngestOptions, IngestOutcome, IngestionSource};
use crate::record::SourceType;
use crate::storage::Storage;
use crate::{registry, security};

#[derive(Debug, Default, Clone)]
pub struct DriverSummary {
	pub records_ingested: usize,
	pub records_skipped: usize,
	pub records_failed: usize,
}

/// Process-exit codes, per §4.6: 0 success, 1 partial failure (some
/// records dropped but the run completed), 2 fatal error, 130 interrupted.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL_FAILURE: i32 = 1;
pub const EXIT_FATAL_ERROR: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

pub struct DriverConfig {
	pub provider_name: Option<String>,
	pub inputs: Vec<String>,
	pub source_type: Option<SourceType>,
	pub db_path: PathBuf,
	pub base_dir: PathBuf,
	pub batch_size: usize,
	pub validate_only: bool,
	pub options: IngestOptions,
	pub cloudflare_api_token: Option<String>,
	pub cloudflare_zone_id: Option<String>,
}

/// Run the full ingestion pipeline against every input in `config.inputs`,
/// resolving a provider per-input (explicit override, or auto-detected),
/// batching parsed records into storage as they arrive.
pub async fn run(config: DriverConfig) -> Result<DriverSummary, IngestionError> {
	let resolved: Vec<(String, IngestionSource)> = config
		.inputs
		.iter()
		.map(|input| resolve_source(input, &config))
		.collect::<Result<_, _>>()?;

	let base_dir = config.base_dir.clone();
	let options = IngestOptions { base_dir: Some(base_dir), ..config.options.clone() };

	let progress_failed = Arc::new(AtomicUsize::new(0));
	let progress_ingested = Arc::new(AtomicUsize::new(0));

	let progress_handle = {
		let ingested = progress_ingested.clone();
		let failed = progress_failed.clone();
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(5));
			loop {
				interval.tick().await;
				tracing::info!(
					ingested = ingested.load(Ordering::Relaxed),
					failed = failed.load(Ordering::Relaxed),
					"ingestion progress"
				);
			}
		})
	};

	let mut storage = if config.validate_only {
		None
	} else {
		Some(Storage::open(&config.db_path)?)
	};

	let mut summary = DriverSummary::default();

	for (provider_name, source) in resolved {
		let adapter = registry::get_adapter(&provider_name)?;
		adapter.validate_source(&source)?;

		let outcome: IngestOutcome = tokio::select! {
			result = adapter.ingest(&source, &options) => result?,
			_ = tokio::signal::ctrl_c() => {
				progress_handle.abort();
				return Err(IngestionError::Io(std::io::Error::new(
					std::io::ErrorKind::Interrupted,
					"ingestion interrupted by signal",
				)));
			}
		};

		summary.records_skipped += outcome.records_skipped;
		summary.records_failed += outcome.records_failed;
		progress_failed.fetch_add(outcome.records_failed, Ordering::Relaxed);

		if let Some(storage) = storage.as_mut() {
			for batch in outcome.records.chunks(config.batch_size) {
				let inserted = storage.insert_batch(&provider_name, batch)?;
				summary.records_ingested += inserted;
				summary.records_failed += batch.len() - inserted;
				progress_ingested.fetch_add(inserted, Ordering::Relaxed);
			}
		} else {
			summary.records_ingested += outcome.records.len();
		}
	}

	progress_handle.abort();
	if let Some(storage) = storage {
		storage.close()?;
	}

	Ok(summary)
}

fn resolve_source(input: &str, config: &DriverConfig) -> Result<(String, IngestionSource), IngestionError> {
	let provider_name = match &config.provider_name {
		Some(name) => name.clone(),
		None => registry::detect_provider(input).ok_or_else(|| {
			IngestionError::ProviderNotFound(crate::error::ProviderNotFoundError {
				provider_name: format!("<auto-detect: {input}>"),
				available_providers: registry::list_providers(),
			})
		})?,
	};

	let source_type = config
		.source_type
		.unwrap_or_else(|| registry::default_source_type_for_provider(&provider_name, input));
	let mut source = IngestionSource::new(source_type, input);
	if provider_name == "cloudflare" {
		source = source.with_credentials(crate::providers::ProviderCredentials {
			api_token: config.cloudflare_api_token.clone(),
			zone_id: config.cloudflare_zone_id.clone(),
		});
	}
	Ok((provider_name, source))
}

/// Discover the files a glob/directory input expands to, applying the
/// path-safety check against `base_dir` for every match. Used by the CLI
/// layer before any provider sees the inputs, so a traversal attempt is
/// rejected before provider-specific parsing begins.
pub fn expand_and_validate_inputs(patterns: &[String], base_dir: &std::path::Path) -> Result<Vec<String>, IngestionError> {
	let mut out = Vec::new();
	for pattern in patterns {
		let matches: Vec<PathBuf> = glob::glob(pattern)
			.map_err(|e| IngestionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?
			.filter_map(Result::ok)
			.collect();

		if matches.is_empty() {
			out.push(pattern.clone());
			continue;
		}
		for path in matches {
			let resolved = security::validate_path_safe(&path, base_dir, true)?;
			out.push(resolved.to_string_lossy().to_string());
		}
	}
	Ok(out)
}

/// Run CPU-bound per-file parsing work across a rayon thread pool, the
/// same shape as the teacher's `process_files_parallel`. Not currently
/// wired into `run` (providers already offload parsing via
/// `spawn_blocking`), kept here as the entry point future multi-file
/// parallel adapters should use.
pub fn process_files_parallel<T, F>(files: &[PathBuf], worker_count: usize, work: F) -> Vec<T>
where
	F: Fn(&PathBuf) -> T + Sync,
	T: Send,
{
	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(worker_count.max(1))
		.build()
		.expect("failed to build rayon thread pool");
	pool.install(|| files.par_iter().map(|f| work(f)).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn process_files_parallel_preserves_order() {
		let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("file{i}.log"))).collect();
		let results = process_files_parallel(&files, 2, |f| f.to_string_lossy().to_string());
		assert_eq!(results, vec!["file0.log", "file1.log", "file2.log", "file3.log", "file4.log"]);
	}
}
