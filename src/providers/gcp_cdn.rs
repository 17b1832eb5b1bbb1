//! Google Cloud CDN / Load Balancing logs, delivered as Cloud Logging
//! JSON entries with the request fields nested under `httpRequest`.
//! `httpRequest.latency` is a duration string (`"0.042s"`) rather than a
//! plain number, so it is left out of the field map and converted by hand
//! after parsing, the same way `azure_cdn` handles its `timeTaken` field.
//! `requestUrl` carries a full URL rather than a bare path, and `cache_status`
//! is derived from the `cacheHit`/`cacheLookup` booleans rather than mapped
//! directly, so both are also handled in post-processing.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use url::Url;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::{ExtraValue, Record, SourceType};

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] = &[SourceType::JsonFile, SourceType::NdjsonFile];
const FILE_EXTENSIONS: &[&str] = &["json", "ndjson"];

const LATENCY_KEY: &str = "httpRequest.latency";
const REQUEST_URL_KEY: &str = "httpRequest.requestUrl";
const CACHE_HIT_KEY: &str = "httpRequest.cacheHit";
const CACHE_LOOKUP_KEY: &str = "httpRequest.cacheLookup";

static FIELD_MAP: Lazy<FieldMap> = Lazy::new(|| {
	FieldMap::from([
		("timestamp".to_string(), "timestamp".to_string()),
		("httpRequest.remoteIp".to_string(), "client_ip".to_string()),
		("httpRequest.requestMethod".to_string(), "method".to_string()),
		("httpRequest.status".to_string(), "status_code".to_string()),
		("httpRequest.userAgent".to_string(), "user_agent".to_string()),
		("httpRequest.referer".to_string(), "referer".to_string()),
		("httpRequest.responseSize".to_string(), "response_bytes".to_string()),
		("httpRequest.requestSize".to_string(), "request_bytes".to_string()),
		("httpRequest.serverIp".to_string(), "edge_location".to_string()),
		("httpRequest.protocol".to_string(), "protocol".to_string()),
	])
});

/// Parse a Cloud Logging duration string (`"0.042s"`) into milliseconds.
fn parse_latency_ms(raw: &str) -> Option<i64> {
	let seconds: f64 = raw.strip_suffix('s').unwrap_or(raw).parse().ok()?;
	Some((seconds * 1000.0).round() as i64)
}

/// `cacheHit=true -> HIT`; `cacheHit=false and cacheLookup=true -> MISS`;
/// `cacheLookup=false -> BYPASS`; anything else is left unset.
fn derive_cache_status(cache_hit: Option<&str>, cache_lookup: Option<&str>) -> Option<String> {
	match (cache_hit, cache_lookup) {
		(Some("true"), _) => Some("HIT".to_string()),
		(Some("false"), Some("true")) => Some("MISS".to_string()),
		(_, Some("false")) => Some("BYPASS".to_string()),
		_ => None,
	}
}

pub struct GcpCdnAdapter;

#[async_trait]
impl ProviderAdapter for GcpCdnAdapter {
	fn provider_name(&self) -> &'static str {
		"gcp_cdn"
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
			SourceType::JsonFile => ParserKind::Json,
			SourceType::NdjsonFile => ParserKind::Ndjson,
			other => {
				return Err(IngestionError::SourceValidation(SourceValidationError {
					source_type: other.as_str().to_string(),
					reason: "gcp_cdn only accepts json_file or ndjson_file sources".to_string(),
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
			if let Some(ExtraValue::String(raw)) = record.extra.remove(LATENCY_KEY) {
				if let Some(ms) = parse_latency_ms(&raw) {
					record.response_time_ms = Some(ms);
				}
			}

			if let Some(ExtraValue::String(raw)) = record.extra.remove(REQUEST_URL_KEY) {
				if let Ok(url) = Url::parse(&raw) {
					record.host = url.host_str().unwrap_or(&record.host).to_string();
					record.path = Record::normalize_path(Some(url.path()));
					record.query_string = url.query().map(str::to_string);
				}
			}

			let cache_hit = match record.extra.remove(CACHE_HIT_KEY) {
				Some(ExtraValue::String(raw)) => Some(raw),
				_ => None,
			};
			let cache_lookup = match record.extra.remove(CACHE_LOOKUP_KEY) {
				Some(ExtraValue::String(raw)) => Some(raw),
				_ => None,
			};
			record.cache_status = derive_cache_status(cache_hit.as_deref(), cache_lookup.as_deref());
		}

		Ok(outcome)
	}
}
