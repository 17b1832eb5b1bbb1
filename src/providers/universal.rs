//! The "universal" provider: no vendor-specific field renaming, just the
//! canonical schema's own field names read straight off the source. This
//! is what a hand-built or already-normalized log file uses.

use async_trait::async_trait;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::SourceType;

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] =
	&[SourceType::CsvFile, SourceType::TsvFile, SourceType::JsonFile, SourceType::NdjsonFile, SourceType::W3cFile];

const FILE_EXTENSIONS: &[&str] = &["csv", "tsv", "json", "ndjson", "log", "txt"];

pub struct UniversalAdapter;

#[async_trait]
impl ProviderAdapter for UniversalAdapter {
	fn provider_name(&self) -> &'static str {
		"universal"
	}

	fn supported_source_types(&self) -> &'static [SourceType] {
		SOURCE_TYPES
	}

	fn validate_source(&self, source: &IngestionSource) -> Result<(), SourceValidationError> {
		validate_file_source(&source.location, source.source_type.as_str())
	}

	async fn ingest(
		&self,
		source: &IngestionSource,
		options: &IngestOptions,
	) -> Result<IngestOutcome, IngestionError> {
		let kind = match source.source_type {
			SourceType::CsvFile => ParserKind::Csv,
			SourceType::TsvFile => ParserKind::Tsv,
			SourceType::JsonFile => ParserKind::Json,
			SourceType::NdjsonFile => ParserKind::Ndjson,
			SourceType::W3cFile => ParserKind::W3c,
			other => {
				return Err(IngestionError::SourceValidation(SourceValidationError {
					source_type: other.as_str().to_string(),
					reason: "unsupported by the universal provider".to_string(),
				}))
			}
		};

		let field_map = FieldMap::new();
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		tokio::task::spawn_blocking({
			let options = options.clone();
			move || ingest_path(&path, &base_dir, FILE_EXTENSIONS, kind, &field_map, &options)
		})
		.await
		.expect("ingest_path worker panicked")
	}
}
