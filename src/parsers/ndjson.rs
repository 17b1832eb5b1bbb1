//! Newline-delimited JSON parsing (C2): one JSON object per line, streamed
//! without loading the whole file, unlike the JSON-array format.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde_json::Value;

use crate::record::{ExtraValue, Record, OPTIONAL_FIELDS, REQUIRED_FIELDS};
use crate::timestamp;

use super::flatten::{flatten_object, value_to_string};
use super::{FieldMap, ParseError};

/// Parse an NDJSON stream into [`Record`]s, one result per non-blank line.
pub fn parse<R: BufRead>(reader: R, field_map: &FieldMap) -> impl Iterator<Item = Result<Record, ParseError>> + '_ {
	reader.lines().enumerate().filter_map(move |(i, line)| {
		let line = match line {
			Ok(l) => l,
			Err(e) => return Some(Err(ParseError::Io(e))),
		};
		if line.trim().is_empty() {
			return None;
		}
		Some(parse_line(&line, i + 1, field_map))
	})
}

fn parse_line(line: &str, line_number: usize, field_map: &FieldMap) -> Result<Record, ParseError> {
	let value: Value = serde_json::from_str(line).map_err(|e| ParseError::MalformedLine {
		line_number,
		message: e.to_string(),
		line_content: line.to_string(),
	})?;
	parse_value(&value, line_number, line, field_map)
}

/// Parse a single already-decoded JSON object into a [`Record`]. Shared by
/// the NDJSON parser (one value per line) and the JSON-array parser (one
/// value per array element).
pub(crate) fn parse_value(
	value: &Value,
	line_number: usize,
	line_content: &str,
	field_map: &FieldMap,
) -> Result<Record, ParseError> {
	let flat = flatten_object(value);

	let lookup = |canonical: &str| -> Option<String> {
		for (source_key, target) in field_map {
			if target == canonical {
				if let Some(v) = flat.get(source_key) {
					return value_to_string(v);
				}
			}
		}
		flat.get(canonical).and_then(value_to_string)
	};

	let timestamp_raw = lookup("timestamp").ok_or_else(|| ParseError::MalformedLine {
		line_number,
		message: "missing timestamp".to_string(),
		line_content: line_content.to_string(),
	})?;
	let ts = timestamp::parse_any(&timestamp_raw).map_err(|e| ParseError::MalformedLine {
		line_number,
		message: e.to_string(),
		line_content: line_content.to_string(),
	})?;

	let status_code = lookup("status_code")
		.and_then(|s| super::parse_optional_int(&s))
		.ok_or_else(|| ParseError::MalformedLine {
			line_number,
			message: "missing or invalid status_code".to_string(),
			line_content: line_content.to_string(),
		})?;

	let mapped_sources: std::collections::HashSet<&str> = field_map.keys().map(|s| s.as_str()).collect();
	let mut extra = BTreeMap::new();
	for (key, value) in &flat {
		let is_canonical = REQUIRED_FIELDS.contains(&key.as_str()) || OPTIONAL_FIELDS.contains(&key.as_str());
		let is_mapped = mapped_sources.contains(key.as_str());
		if !is_canonical && !is_mapped {
			if let Some(s) = value_to_string(value) {
				extra.insert(key.clone(), ExtraValue::String(s));
			}
		}
	}

	Ok(Record {
		timestamp: ts,
		client_ip: lookup("client_ip").unwrap_or_default(),
		method: lookup("method").unwrap_or_default(),
		host: lookup("host").unwrap_or_default(),
		path: Record::normalize_path(lookup("path").as_deref()),
		status_code,
		user_agent: lookup("user_agent").unwrap_or_default(),
		query_string: lookup("query_string"),
		response_bytes: lookup("response_bytes").and_then(|s| super::parse_optional_int(&s)),
		request_bytes: lookup("request_bytes").and_then(|s| super::parse_optional_int(&s)),
		response_time_ms: lookup("response_time_ms").and_then(|s| super::parse_optional_int(&s)),
		cache_status: lookup("cache_status"),
		edge_location: lookup("edge_location"),
		referer: lookup("referer"),
		protocol: lookup("protocol"),
		ssl_protocol: lookup("ssl_protocol"),
		extra,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_flat_ndjson_line() {
		let data = r#"{"timestamp":"2023-10-10T13:55:36Z","client_ip":"192.0.2.1","method":"GET","host":"example.com","path":"/","status_code":200,"user_agent":"UA"}"#;
		let field_map = FieldMap::new();
		let results: Vec<_> = parse(Cursor::new(data), &field_map).collect();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].as_ref().unwrap().status_code, 200);
	}

	#[test]
	fn skips_blank_lines() {
		let data = "\n{\"timestamp\":\"2023-10-10T13:55:36Z\",\"client_ip\":\"1.1.1.1\",\"method\":\"GET\",\"host\":\"h\",\"path\":\"/\",\"status_code\":200,\"user_agent\":\"UA\"}\n\n";
		let field_map = FieldMap::new();
		let results: Vec<_> = parse(Cursor::new(data), &field_map).collect();
		assert_eq!(results.len(), 1);
	}

	#[test]
	fn nested_field_is_reachable_via_flattening() {
		let data = r#"{"timestamp":"2023-10-10T13:55:36Z","httpRequest":{"requestMethod":"GET","requestUrl":"https://example.com/","status":200,"remoteIp":"192.0.2.1","userAgent":"UA"}}"#;
		let mut field_map = FieldMap::new();
		field_map.insert("httpRequest.requestMethod".into(), "method".into());
		field_map.insert("httpRequest.status".into(), "status_code".into());
		field_map.insert("httpRequest.remoteIp".into(), "client_ip".into());
		field_map.insert("httpRequest.userAgent".into(), "user_agent".into());
		let results: Vec<_> = parse(Cursor::new(data), &field_map).collect();
		let record = results[0].as_ref().unwrap();
		assert_eq!(record.method, "GET");
		assert_eq!(record.status_code, 200);
		assert_eq!(record.client_ip, "192.0.2.1");
	}
}
