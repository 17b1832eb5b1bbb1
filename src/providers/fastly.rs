//! Fastly real-time log streaming: CSV, JSON, or NDJSON depending on the
//! logging endpoint configured in the Fastly service, all sharing the same
//! field vocabulary. Fastly VCL logging configs vary in the exact names
//! they emit for a handful of fields, so a small alias table is consulted
//! after the primary field map for any canonical field that came back
//! empty.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::{ExtraValue, SourceType};

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] =
	&[SourceType::FastlyCsvFile, SourceType::FastlyJsonFile, SourceType::FastlyNdjsonFile];
const FILE_EXTENSIONS: &[&str] = &["csv", "json", "ndjson", "log"];

static FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("timestamp".to_string(), "timestamp".to_string()),
		("client_ip".to_string(), "client_ip".to_string()),
		("request_method".to_string(), "method".to_string()),
		("host".to_string(), "host".to_string()),
		("url".to_string(), "path".to_string()),
		("response_status".to_string(), "status_code".to_string()),
		("user_agent".to_string(), "user_agent".to_string()),
		("referer".to_string(), "referer".to_string()),
		("response_bytes".to_string(), "response_bytes".to_string()),
		("request_bytes".to_string(), "request_bytes".to_string()),
		("response_time_ms".to_string(), "response_time_ms".to_string()),
		("fastly_pop".to_string(), "edge_location".to_string()),
		("cache_status".to_string(), "cache_status".to_string()),
		("protocol".to_string(), "protocol".to_string()),
		("tls_version".to_string(), "ssl_protocol".to_string()),
	])
});

/// Fallback aliases consulted when a canonical field comes back empty from
/// `FIELD_MAP`, for VCL logging configs that emit slightly different names.
const ALIAS_TABLE: &[(&str, &[&str])] = &[
	("client_ip", &["clientip", "client", "ip", "remote_addr"]),
	("method", &["verb", "http_method"]),
	("edge_location", &["pop", "datacenter"]),
];

/// Promote the first matching alias out of `extra` into `record`'s empty
/// canonical field.
fn apply_aliases(record: &mut crate::record::Record) {
	for (canonical, aliases) in ALIAS_TABLE {
		let is_empty = match *canonical {
			"client_ip" => record.client_ip.is_empty(),
			"method" => record.method.is_empty(),
			"edge_location" => record.edge_location.is_none(),
			_ => false,
		};
		if !is_empty {
			continue;
		}
		for alias in *aliases {
			if let Some(ExtraValue::String(value)) = record.extra.remove(*alias) {
				match *canonical {
					"client_ip" => record.client_ip = value,
					"method" => record.method = value.to_uppercase(),
					"edge_location" => record.edge_location = Some(value),
					_ => {}
				}
				break;
			}
		}
	}
}

pub struct FastlyAdapter;

#[async_trait]
impl ProviderAdapter for FastlyAdapter {
	fn provider_name(&self) -> &'static str {
		"fastly"
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
			SourceType::FastlyCsvFile => ParserKind::Csv,
			SourceType::FastlyJsonFile => ParserKind::Json,
			SourceType::FastlyNdjsonFile => ParserKind::Ndjson,
			other => {
				return Err(IngestionError::SourceValidation(SourceValidationError {
					source_type: other.as_str().to_string(),
					reason: "unsupported by the fastly provider".to_string(),
				}))
			}
		};
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		let options = options.clone();
		let mut outcome = tokio::task::spawn_blocking(move || {
			ingest_path(&path, &base_dir, FILE_EXTENSIONS, kind, &FIELD_MAP, &options)
		})
		.await
		.expect("ingest_path worker panicked")?;

		for record in &mut outcome.records {
			apply_aliases(record);
		}

		Ok(outcome)
	}
}
