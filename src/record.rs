//! Universal record schema (C1): the canonical in-memory representation
//! every provider adapter normalizes into.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Open-ended value carried in [`Record::extra`] for fields that have no
/// canonical home in the universal schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
	String(String),
	Integer(i64),
	Float(f64),
	Bool(bool),
	Map(BTreeMap<String, ExtraValue>),
	Null,
}

impl From<&str> for ExtraValue {
	fn from(value: &str) -> Self {
		ExtraValue::String(value.to_string())
	}
}

impl From<String> for ExtraValue {
	fn from(value: String) -> Self {
		ExtraValue::String(value)
	}
}

impl From<i64> for ExtraValue {
	fn from(value: i64) -> Self {
		ExtraValue::Integer(value)
	}
}

impl From<bool> for ExtraValue {
	fn from(value: bool) -> Self {
		ExtraValue::Bool(value)
	}
}

/// A single normalized HTTP request log entry. Immutable: post-processing
/// steps construct a new `Record` rather than mutating one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
	pub timestamp: DateTime<Utc>,
	pub client_ip: String,
	pub method: String,
	pub host: String,
	pub path: String,
	pub status_code: i64,
	pub user_agent: String,

	pub query_string: Option<String>,
	pub response_bytes: Option<i64>,
	pub request_bytes: Option<i64>,
	pub response_time_ms: Option<i64>,
	pub cache_status: Option<String>,
	pub edge_location: Option<String>,
	pub referer: Option<String>,
	pub protocol: Option<String>,
	pub ssl_protocol: Option<String>,

	pub extra: BTreeMap<String, ExtraValue>,
}

/// Names of the required universal schema fields, in declaration order.
pub const REQUIRED_FIELDS: &[&str] = &[
	"timestamp",
	"client_ip",
	"method",
	"host",
	"path",
	"status_code",
	"user_agent",
];

/// Names of the optional universal schema fields.
pub const OPTIONAL_FIELDS: &[&str] = &[
	"query_string",
	"response_bytes",
	"request_bytes",
	"response_time_ms",
	"cache_status",
	"edge_location",
	"referer",
	"protocol",
	"ssl_protocol",
];

impl Record {
	/// `path` always begins with `/`, substituting `/` when empty or absent.
	pub fn normalize_path(path: Option<&str>) -> String {
		match path {
			Some(p) if !p.is_empty() => {
				if p.starts_with('/') {
					p.to_string()
				} else {
					format!("/{p}")
				}
			}
			_ => "/".to_string(),
		}
	}

	/// Split a raw URI into `(path, query_string)`, per the invariant that a
	/// `?` never survives into `path`.
	pub fn split_query(uri: &str) -> (String, Option<String>) {
		match uri.split_once('?') {
			Some((path, query)) => (Self::normalize_path(Some(path)), Some(query.to_string())),
			None => (Self::normalize_path(Some(uri)), None),
		}
	}

	/// Flatten to a mapping, matching the round-trip law in §8: `extra`
	/// entries are namespaced with an `_extra_` prefix so that
	/// [`Record::from_mapping`] can recover them unambiguously.
	pub fn to_mapping(&self) -> BTreeMap<String, ExtraValue> {
		let mut map = BTreeMap::new();
		map.insert(
			"timestamp".into(),
			ExtraValue::String(self.timestamp.to_rfc3339()),
		);
		map.insert("client_ip".into(), ExtraValue::String(self.client_ip.clone()));
		map.insert("method".into(), ExtraValue::String(self.method.clone()));
		map.insert("host".into(), ExtraValue::String(self.host.clone()));
		map.insert("path".into(), ExtraValue::String(self.path.clone()));
		map.insert("status_code".into(), ExtraValue::Integer(self.status_code));
		map.insert("user_agent".into(), ExtraValue::String(self.user_agent.clone()));

		macro_rules! opt_str {
			($field:ident) => {
				map.insert(
					stringify!($field).into(),
					match &self.$field {
						Some(v) => ExtraValue::String(v.clone()),
						None => ExtraValue::Null,
					},
				);
			};
		}
		macro_rules! opt_int {
			($field:ident) => {
				map.insert(
					stringify!($field).into(),
					match self.$field {
						Some(v) => ExtraValue::Integer(v),
						None => ExtraValue::Null,
					},
				);
			};
		}

		opt_str!(query_string);
		opt_int!(response_bytes);
		opt_int!(request_bytes);
		opt_int!(response_time_ms);
		opt_str!(cache_status);
		opt_str!(edge_location);
		opt_str!(referer);
		opt_str!(protocol);
		opt_str!(ssl_protocol);

		for (k, v) in &self.extra {
			map.insert(format!("_extra_{k}"), v.clone());
		}
		map
	}

	/// Inverse of [`Record::to_mapping`]: recovers a `Record` equal on all
	/// fields, including `extra`, from a mapping produced by `to_mapping`.
	pub fn from_mapping(map: &BTreeMap<String, ExtraValue>) -> Result<Record, RecordMappingError> {
		fn require_str<'a>(map: &'a BTreeMap<String, ExtraValue>, key: &str) -> Result<&'a str, RecordMappingError> {
			match map.get(key) {
				Some(ExtraValue::String(s)) => Ok(s.as_str()),
				_ => Err(RecordMappingError(key.to_string())),
			}
		}
		fn require_int(map: &BTreeMap<String, ExtraValue>, key: &str) -> Result<i64, RecordMappingError> {
			match map.get(key) {
				Some(ExtraValue::Integer(i)) => Ok(*i),
				_ => Err(RecordMappingError(key.to_string())),
			}
		}
		fn opt_str(map: &BTreeMap<String, ExtraValue>, key: &str) -> Result<Option<String>, RecordMappingError> {
			match map.get(key) {
				Some(ExtraValue::String(s)) => Ok(Some(s.clone())),
				Some(ExtraValue::Null) | None => Ok(None),
				_ => Err(RecordMappingError(key.to_string())),
			}
		}
		fn opt_int(map: &BTreeMap<String, ExtraValue>, key: &str) -> Result<Option<i64>, RecordMappingError> {
			match map.get(key) {
				Some(ExtraValue::Integer(i)) => Ok(Some(*i)),
				Some(ExtraValue::Null) | None => Ok(None),
				_ => Err(RecordMappingError(key.to_string())),
			}
		}

		let timestamp = DateTime::parse_from_rfc3339(require_str(map, "timestamp")?)
			.map_err(|_| RecordMappingError("timestamp".to_string()))?
			.with_timezone(&Utc);

		let extra = map
			.iter()
			.filter_map(|(k, v)| k.strip_prefix("_extra_").map(|stripped| (stripped.to_string(), v.clone())))
			.collect();

		Ok(Record {
			timestamp,
			client_ip: require_str(map, "client_ip")?.to_string(),
			method: require_str(map, "method")?.to_string(),
			host: require_str(map, "host")?.to_string(),
			path: require_str(map, "path")?.to_string(),
			status_code: require_int(map, "status_code")?,
			user_agent: require_str(map, "user_agent")?.to_string(),
			query_string: opt_str(map, "query_string")?,
			response_bytes: opt_int(map, "response_bytes")?,
			request_bytes: opt_int(map, "request_bytes")?,
			response_time_ms: opt_int(map, "response_time_ms")?,
			cache_status: opt_str(map, "cache_status")?,
			edge_location: opt_str(map, "edge_location")?,
			referer: opt_str(map, "referer")?,
			protocol: opt_str(map, "protocol")?,
			ssl_protocol: opt_str(map, "ssl_protocol")?,
			extra,
		})
	}
}

/// A required mapping key was missing or held a value of the wrong shape
/// for [`Record::from_mapping`] to recover.
#[derive(Debug, Error)]
#[error("malformed or missing field '{0}' in record mapping")]
pub struct RecordMappingError(pub String);

/// Closed set of source types a [`crate::providers::IngestionSource`] may
/// carry. Construction from an unknown string is rejected at the type
/// level, the Rust analogue of the Python `__post_init__` validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
	Api,
	CsvFile,
	TsvFile,
	JsonFile,
	NdjsonFile,
	W3cFile,
	AlbLogFile,
	FastlyJsonFile,
	FastlyNdjsonFile,
	FastlyCsvFile,
	AkamaiJsonFile,
	AkamaiNdjsonFile,
	S3,
	Gcs,
	AzureBlob,
}

impl SourceType {
	pub fn as_str(&self) -> &'static str {
		match self {
			SourceType::Api => "api",
			SourceType::CsvFile => "csv_file",
			SourceType::TsvFile => "tsv_file",
			SourceType::JsonFile => "json_file",
			SourceType::NdjsonFile => "ndjson_file",
			SourceType::W3cFile => "w3c_file",
			SourceType::AlbLogFile => "alb_log_file",
			SourceType::FastlyJsonFile => "fastly_json_file",
			SourceType::FastlyNdjsonFile => "fastly_ndjson_file",
			SourceType::FastlyCsvFile => "fastly_csv_file",
			SourceType::AkamaiJsonFile => "akamai_json_file",
			SourceType::AkamaiNdjsonFile => "akamai_ndjson_file",
			SourceType::S3 => "s3",
			SourceType::Gcs => "gcs",
			SourceType::AzureBlob => "azure_blob",
		}
	}

	pub fn is_file_source(&self) -> bool {
		matches!(
			self,
			SourceType::CsvFile
				| SourceType::TsvFile
				| SourceType::JsonFile
				| SourceType::NdjsonFile
				| SourceType::W3cFile
				| SourceType::AlbLogFile
				| SourceType::FastlyJsonFile
				| SourceType::FastlyNdjsonFile
				| SourceType::FastlyCsvFile
				| SourceType::AkamaiJsonFile
				| SourceType::AkamaiNdjsonFile
		)
	}

	pub fn is_cloud_source(&self) -> bool {
		matches!(self, SourceType::S3 | SourceType::Gcs | SourceType::AzureBlob)
	}

	pub fn is_api_source(&self) -> bool {
		matches!(self, SourceType::Api)
	}
}

#[derive(Debug, Error)]
#[error("invalid source_type: '{0}'")]
pub struct InvalidSourceType(pub String);

impl FromStr for SourceType {
	type Err = InvalidSourceType;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"api" => SourceType::Api,
			"csv_file" => SourceType::CsvFile,
			"tsv_file" => SourceType::TsvFile,
			"json_file" => SourceType::JsonFile,
			"ndjson_file" => SourceType::NdjsonFile,
			"w3c_file" => SourceType::W3cFile,
			"alb_log_file" => SourceType::AlbLogFile,
			"fastly_json_file" => SourceType::FastlyJsonFile,
			"fastly_ndjson_file" => SourceType::FastlyNdjsonFile,
			"fastly_csv_file" => SourceType::FastlyCsvFile,
			"akamai_json_file" => SourceType::AkamaiJsonFile,
			"akamai_ndjson_file" => SourceType::AkamaiNdjsonFile,
			"s3" => SourceType::S3,
			"gcs" => SourceType::Gcs,
			"azure_blob" => SourceType::AzureBlob,
			other => return Err(InvalidSourceType(other.to_string())),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::SubsecRound;

	#[test]
	fn normalize_path_substitutes_slash() {
		assert_eq!(Record::normalize_path(None), "/");
		assert_eq!(Record::normalize_path(Some("")), "/");
		assert_eq!(Record::normalize_path(Some("api/data")), "/api/data");
		assert_eq!(Record::normalize_path(Some("/api/data")), "/api/data");
	}

	#[test]
	fn split_query_strips_question_mark() {
		let (path, query) = Record::split_query("/api/data?key=value");
		assert_eq!(path, "/api/data");
		assert_eq!(query.as_deref(), Some("key=value"));

		let (path, query) = Record::split_query("/api/data");
		assert_eq!(path, "/api/data");
		assert_eq!(query, None);
	}

	#[test]
	fn source_type_rejects_unknown() {
		assert!("bogus".parse::<SourceType>().is_err());
		assert_eq!("csv_file".parse::<SourceType>().unwrap(), SourceType::CsvFile);
	}

	#[test]
	fn to_mapping_namespaces_extra() {
		let record = Record {
			timestamp: Utc::now(),
			client_ip: "192.0.2.1".into(),
			method: "GET".into(),
			host: "example.com".into(),
			path: "/".into(),
			status_code: 200,
			user_agent: "Mozilla/5.0".into(),
			query_string: None,
			response_bytes: None,
			request_bytes: None,
			response_time_ms: None,
			cache_status: None,
			edge_location: None,
			referer: None,
			protocol: None,
			ssl_protocol: None,
			extra: BTreeMap::from([("pop".to_string(), ExtraValue::String("LAX1".into()))]),
		};
		let mapping = record.to_mapping();
		assert_eq!(mapping.get("_extra_pop"), Some(&ExtraValue::String("LAX1".into())));
	}

	#[test]
	fn from_mapping_inverts_to_mapping() {
		let record = Record {
			timestamp: Utc::now().trunc_subsecs(3),
			client_ip: "2001:db8::1".into(),
			method: "GET".into(),
			host: "example.com".into(),
			path: "/data".into(),
			status_code: 200,
			user_agent: "Mozilla/5.0".into(),
			query_string: Some("x=1".into()),
			response_bytes: Some(1024),
			request_bytes: None,
			response_time_ms: Some(150),
			cache_status: Some("Hit".into()),
			edge_location: Some("LAX1".into()),
			referer: None,
			protocol: Some("https".into()),
			ssl_protocol: Some("TLSv1.2".into()),
			extra: BTreeMap::from([("pop".to_string(), ExtraValue::String("LAX1".into()))]),
		};
		let mapping = record.to_mapping();
		let round_tripped = Record::from_mapping(&mapping).unwrap();
		assert_eq!(round_tripped, record);
	}

	#[test]
	fn from_mapping_rejects_missing_required_field() {
		let mapping = BTreeMap::new();
		assert!(Record::from_mapping(&mapping).is_err());
	}
}
