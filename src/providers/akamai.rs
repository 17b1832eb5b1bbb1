//! Akamai DataStream 2 delivery logs, JSON or NDJSON.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::SourceType;

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] = &[SourceType::AkamaiJsonFile, SourceType::AkamaiNdjsonFile];
const FILE_EXTENSIONS: &[&str] = &["json", "ndjson"];

static FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("requestTime".to_string(), "timestamp".to_string()),
		("clientIP".to_string(), "client_ip".to_string()),
		("requestMethod".to_string(), "method".to_string()),
		("requestHost".to_string(), "host".to_string()),
		("requestPath".to_string(), "path".to_string()),
		("responseStatus".to_string(), "status_code".to_string()),
		("userAgent".to_string(), "user_agent".to_string()),
		("bytes".to_string(), "response_bytes".to_string()),
		("turnaroundTimeMs".to_string(), "response_time_ms".to_string()),
		("queryString".to_string(), "query_string".to_string()),
		("cacheStatus".to_string(), "cache_status".to_string()),
		("tlsVersion".to_string(), "ssl_protocol".to_string()),
		("requestProtocol".to_string(), "protocol".to_string()),
	])
});

pub struct AkamaiAdapter;

#[async_trait]
impl ProviderAdapter for AkamaiAdapter {
	fn provider_name(&self) -> &'static str {
		"akamai"
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
			SourceType::AkamaiJsonFile => ParserKind::Json,
			SourceType::AkamaiNdjsonFile => ParserKind::Ndjson,
			other => {
				return Err(IngestionError::SourceValidation(SourceValidationError {
					source_type: other.as_str().to_string(),
					reason: "unsupported by the akamai provider".to_string(),
				}))
			}
		};
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		let options = options.clone();
		tokio::task::spawn_blocking(move || {
			ingest_path(&path, &base_dir, FILE_EXTENSIONS, kind, &FIELD_MAP, &options)
		})
		.await
		.expect("ingest_path worker panicked")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[tokio::test]
	async fn ingests_akamai_ndjson_log() {
		let mut file = NamedTempFile::with_suffix(".ndjson").unwrap();
		writeln!(
			file,
			r#"{{"requestTime":1696946136,"clientIP":"192.0.2.1","requestMethod":"GET","requestHost":"example.com","requestPath":"/","responseStatus":200,"userAgent":"UA"}}"#
		)
		.unwrap();

		let adapter = AkamaiAdapter;
		let source = IngestionSource::new(SourceType::AkamaiNdjsonFile, file.path().to_str().unwrap());
		let mut options = IngestOptions::default();
		options.base_dir = file.path().parent().map(|p| p.to_path_buf());
		let outcome = adapter.ingest(&source, &options).await.unwrap();
		assert_eq!(outcome.records.len(), 1);
		assert_eq!(outcome.records[0].status_code, 200);
	}
}
