//! AWS CloudFront standard access logs: W3C Extended Log Format with a
//! CloudFront-specific field vocabulary (`x-edge-location`,
//! `x-edge-response-result-type`, `cs(Referer)`, ...).

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::SourceType;

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] = &[SourceType::W3cFile];
const FILE_EXTENSIONS: &[&str] = &["log", "txt"];

// `time-taken` (fractional seconds) is left unmapped on purpose: the W3C
// parser recognizes it by its literal column name and scales it to
// milliseconds, so mapping it onto `response_time_ms` directly here would
// feed the raw seconds value into the plain-integer path and truncate it.
static FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("c-ip".to_string(), "client_ip".to_string()),
		("cs-method".to_string(), "method".to_string()),
		("cs(Host)".to_string(), "host".to_string()),
		("cs-uri-stem".to_string(), "path".to_string()),
		("cs-uri-query".to_string(), "query_string".to_string()),
		("sc-status".to_string(), "status_code".to_string()),
		("cs(User-Agent)".to_string(), "user_agent".to_string()),
		("cs(Referer)".to_string(), "referer".to_string()),
		("sc-bytes".to_string(), "response_bytes".to_string()),
		("cs-bytes".to_string(), "request_bytes".to_string()),
		("x-edge-location".to_string(), "edge_location".to_string()),
		("x-edge-response-result-type".to_string(), "cache_status".to_string()),
		("cs-protocol".to_string(), "protocol".to_string()),
		("ssl-protocol".to_string(), "ssl_protocol".to_string()),
	])
});

pub struct AwsCloudFrontAdapter;

#[async_trait]
impl ProviderAdapter for AwsCloudFrontAdapter {
	fn provider_name(&self) -> &'static str {
		"aws_cloudfront"
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
		if !self.supports_source_type(source.source_type) {
			return Err(IngestionError::SourceValidation(SourceValidationError {
				source_type: source.source_type.as_str().to_string(),
				reason: "aws_cloudfront only accepts w3c_file sources".to_string(),
			}));
		}
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		let options = options.clone();
		tokio::task::spawn_blocking(move || {
			ingest_path(&path, &base_dir, FILE_EXTENSIONS, ParserKind::W3c, &FIELD_MAP, &options)
		})
		.await
		.expect("ingest_path worker panicked")
	}
}
