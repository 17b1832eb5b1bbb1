//! Shared file-source plumbing used by every file-based provider adapter:
//! directory discovery, transparent decompression, dispatch to the right
//! streaming parser, and the path-safety check every adapter must run
//! before touching the filesystem.

use std::path::{Path, PathBuf};

use glob::glob;

use crate::compression::open_auto_decompress;
use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::{alb, csv, json_array, ndjson, w3c, FieldMap};
use crate::record::Record;
use crate::security::validate_path_safe;

use super::{IngestOptions, IngestOutcome};

#[derive(Debug, Clone, Copy)]
pub enum ParserKind {
	Csv,
	Tsv,
	Json,
	Ndjson,
	W3c,
	Alb,
}

/// Find files under `dir` matching any of `extensions` (including their
/// `.gz` counterparts), deduplicated by canonical path.
pub fn find_matching_files(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
	let mut seen = std::collections::HashSet::new();
	let mut out = Vec::new();
	for ext in extensions {
		for candidate in [format!("*.{ext}"), format!("*.{ext}.gz")] {
			let pattern = dir.join(&candidate);
			let Some(pattern_str) = pattern.to_str() else { continue };
			for entry in glob(pattern_str).into_iter().flatten().flatten() {
				let resolved = entry.canonicalize().unwrap_or(entry);
				if seen.insert(resolved.clone()) {
					out.push(resolved);
				}
			}
		}
	}
	out.sort();
	Ok(out)
}

/// Ingest a single file or every matching file under a directory, applying
/// `kind`'s parser and `field_map` to each, then the shared bot/time-range
/// post-filters.
pub fn ingest_path(
	location: &Path,
	base_dir: &Path,
	extensions: &[&str],
	kind: ParserKind,
	field_map: &FieldMap,
	options: &IngestOptions,
) -> Result<IngestOutcome, IngestionError> {
	let resolved = validate_path_safe(location, base_dir, true)?;

	let files = if resolved.is_dir() {
		find_matching_files(&resolved, extensions)?
	} else {
		vec![resolved]
	};

	let mut outcome = IngestOutcome::default();
	for file in files {
		let parsed = parse_file(&file, kind, field_map)?;
		let mut records = Vec::with_capacity(parsed.len());
		for result in parsed {
			match result {
				Ok(record) => records.push(record),
				Err(_) => outcome.records_failed += 1,
			}
		}
		let (kept, skipped) = super::apply_post_filters(records, options);
		outcome.records.extend(kept);
		outcome.records_skipped += skipped;
	}
	Ok(outcome)
}

fn parse_file(
	path: &Path,
	kind: ParserKind,
	field_map: &FieldMap,
) -> Result<Vec<Result<Record, crate::parsers::ParseError>>, IngestionError> {
	match kind {
		ParserKind::Csv => {
			let reader = open_auto_decompress(path)?;
			Ok(csv::parse(reader, b',', field_map)?)
		}
		ParserKind::Tsv => {
			let reader = open_auto_decompress(path)?;
			Ok(csv::parse(reader, b'\t', field_map)?)
		}
		ParserKind::Json => {
			let reader = open_auto_decompress(path)?;
			Ok(json_array::parse(reader, field_map)?)
		}
		ParserKind::Ndjson => {
			let reader = open_auto_decompress(path)?;
			Ok(ndjson::parse(reader, field_map).collect())
		}
		ParserKind::W3c => {
			let reader = open_auto_decompress(path)?;
			Ok(w3c::parse(reader, field_map)?)
		}
		ParserKind::Alb => {
			use std::io::BufRead;
			let reader = open_auto_decompress(path)?;
			Ok(reader
				.lines()
				.enumerate()
				.filter_map(|(i, line)| {
					let line = line.ok()?;
					if line.trim().is_empty() {
						return None;
					}
					Some(alb::parse_line(&line, i + 1))
				})
				.collect())
		}
	}
}

/// Validate that a file-source `location` exists (or, for a directory
/// source, is a directory) before ingestion begins.
pub fn validate_file_source(location: &str, source_type_name: &str) -> Result<(), SourceValidationError> {
	let path = Path::new(location);
	if !path.exists() {
		return Err(SourceValidationError {
			source_type: source_type_name.to_string(),
			reason: format!("path does not exist: {location}"),
		});
	}
	Ok(())
}
