//! Azure CDN / Front Door diagnostic logs. Two dialects are accepted: the
//! native resource-log shape (NDJSON/JSON, fields nested under `properties`)
//! and the Log Analytics export shape (CSV or flat JSON, columns suffixed
//! `_s`/`_d`), merged into one field map per format. `TimeTaken`/`timeTaken_d`
//! is reported in fractional seconds rather than milliseconds, so it is
//! deliberately left out of both field maps and converted by hand after
//! parsing. A full request URL found in `path` is split into host/path/query
//! in the same post-processing step.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use url::Url;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::{ExtraValue, Record, SourceType};

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] =
	&[SourceType::JsonFile, SourceType::NdjsonFile, SourceType::CsvFile];
const FILE_EXTENSIONS: &[&str] = &["json", "ndjson", "csv"];

const TIME_TAKEN_KEYS: &[&str] = &["properties.timeTaken", "timeTaken_d", "TimeTaken"];

/// Used for JSON/NDJSON sources: the native nested-`properties` dialect
/// merged with the flat Log Analytics `_s`/`_d` suffix dialect (which has no
/// dots, so it coexists in the same map without shadowing the nested keys).
static FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("time".to_string(), "timestamp".to_string()),
		("properties.clientIp".to_string(), "client_ip".to_string()),
		("properties.httpMethod".to_string(), "method".to_string()),
		("properties.hostName".to_string(), "host".to_string()),
		("properties.requestUri".to_string(), "path".to_string()),
		("properties.httpStatusCode".to_string(), "status_code".to_string()),
		("properties.userAgent".to_string(), "user_agent".to_string()),
		("properties.referer".to_string(), "referer".to_string()),
		("properties.requestBytes".to_string(), "request_bytes".to_string()),
		("properties.responseBytes".to_string(), "response_bytes".to_string()),
		("properties.cacheStatus".to_string(), "cache_status".to_string()),
		("properties.pop".to_string(), "edge_location".to_string()),
		("TimeGenerated".to_string(), "timestamp".to_string()),
		("clientIp_s".to_string(), "client_ip".to_string()),
		("httpMethod_s".to_string(), "method".to_string()),
		("hostName_s".to_string(), "host".to_string()),
		("requestUri_s".to_string(), "path".to_string()),
		("httpStatusCode_d".to_string(), "status_code".to_string()),
		("userAgent_s".to_string(), "user_agent".to_string()),
		("referer_s".to_string(), "referer".to_string()),
		("requestBytes_d".to_string(), "request_bytes".to_string()),
		("responseBytes_d".to_string(), "response_bytes".to_string()),
		("cacheStatus_s".to_string(), "cache_status".to_string()),
		("pop_s".to_string(), "edge_location".to_string()),
	])
});

/// Used for CSV sources, which have no nested structure: the native
/// `PascalCase` column dialect merged with the same flat Log Analytics
/// suffix dialect used for JSON.
static CSV_FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("TimeGenerated".to_string(), "timestamp".to_string()),
		("ClientIp".to_string(), "client_ip".to_string()),
		("HttpMethod".to_string(), "method".to_string()),
		("HostName".to_string(), "host".to_string()),
		("RequestUri".to_string(), "path".to_string()),
		("HttpStatusCode".to_string(), "status_code".to_string()),
		("UserAgent".to_string(), "user_agent".to_string()),
		("Referer".to_string(), "referer".to_string()),
		("RequestBytes".to_string(), "request_bytes".to_string()),
		("ResponseBytes".to_string(), "response_bytes".to_string()),
		("CacheStatus".to_string(), "cache_status".to_string()),
		("Pop".to_string(), "edge_location".to_string()),
		("clientIp_s".to_string(), "client_ip".to_string()),
		("httpMethod_s".to_string(), "method".to_string()),
		("hostName_s".to_string(), "host".to_string()),
		("requestUri_s".to_string(), "path".to_string()),
		("httpStatusCode_d".to_string(), "status_code".to_string()),
		("userAgent_s".to_string(), "user_agent".to_string()),
		("referer_s".to_string(), "referer".to_string()),
		("requestBytes_d".to_string(), "request_bytes".to_string()),
		("responseBytes_d".to_string(), "response_bytes".to_string()),
		("cacheStatus_s".to_string(), "cache_status".to_string()),
		("pop_s".to_string(), "edge_location".to_string()),
	])
});

pub struct AzureCdnAdapter;

#[async_trait]
impl ProviderAdapter for AzureCdnAdapter {
	fn provider_name(&self) -> &'static str {
		"azure_cdn"
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
		let (kind, field_map): (ParserKind, &FieldMap) = match source.source_type {
			SourceType::JsonFile => (ParserKind::Json, &FIELD_MAP),
			SourceType::NdjsonFile => (ParserKind::Ndjson, &FIELD_MAP),
			SourceType::CsvFile => (ParserKind::Csv, &CSV_FIELD_MAP),
			other => {
				return Err(IngestionError::SourceValidation(SourceValidationError {
					source_type: other.as_str().to_string(),
					reason: "azure_cdn only accepts json_file, ndjson_file, or csv_file sources".to_string(),
				}))
			}
		};
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		let options = options.clone();
		let mut outcome = tokio::task::spawn_blocking(move || {
			ingest_path(&path, &base_dir, FILE_EXTENSIONS, kind, field_map, &options)
		})
		.await
		.expect("ingest_path worker panicked")?;

		for record in &mut outcome.records {
			for key in TIME_TAKEN_KEYS {
				if let Some(ExtraValue::String(raw)) = record.extra.remove(*key) {
					if let Ok(seconds) = raw.parse::<f64>() {
						record.response_time_ms = Some((seconds * 1000.0).round() as i64);
					}
					break;
				}
			}

			if let Ok(url) = Url::parse(&record.path) {
				let existing_query = record.query_string.clone();
				record.host = url.host_str().unwrap_or(&record.host).to_string();
				record.path = Record::normalize_path(Some(url.path()));
				record.query_string = url.query().map(str::to_string).or(existing_query);
			}
		}

		Ok(outcome)
	}
}
