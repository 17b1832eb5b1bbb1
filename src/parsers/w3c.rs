//! W3C Extended Log Format parsing (C2), grounded on
//! `ingestion/parsers/w3c_parser.py`. The header consists of `#`-prefixed
//! directive lines (`#Version:`, `#Fields:`) that must be parsed without
//! discarding the first data line that follows them.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::record::{ExtraValue, Record, OPTIONAL_FIELDS, REQUIRED_FIELDS};
use crate::timestamp;

use super::{FieldMap, ParseError};

const URL_DECODED_FIELDS: &[&str] = &["cs-uri-query", "cs(Referer)", "cs(User-Agent)", "cs-uri-stem"];

struct Header {
	fields: Vec<String>,
	first_data_line: Option<String>,
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<Header, ParseError> {
	let mut fields = Vec::new();
	let mut line = String::new();

	loop {
		line.clear();
		let bytes_read = reader.read_line(&mut line)?;
		if bytes_read == 0 {
			return Ok(Header { fields, first_data_line: None });
		}
		let trimmed = line.trim_end_matches(['\r', '\n']);
		if trimmed.is_empty() {
			continue;
		}
		if let Some(rest) = trimmed.strip_prefix("#Fields:") {
			fields = rest.trim().split_whitespace().map(str::to_string).collect();
			continue;
		}
		if trimmed.starts_with('#') {
			continue;
		}
		return Ok(Header { fields, first_data_line: Some(trimmed.to_string()) });
	}
}

fn decode_value(field_name: &str, raw: &str) -> String {
	if URL_DECODED_FIELDS.contains(&field_name) {
		urlencoding::decode(raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.to_string())
	} else {
		raw.to_string()
	}
}

/// Parse a W3C Extended Log Format stream into [`Record`]s.
pub fn parse<R: BufRead>(
	mut reader: R,
	field_map: &FieldMap,
) -> Result<Vec<Result<Record, ParseError>>, ParseError> {
	let header = parse_header(&mut reader)?;
	if header.fields.is_empty() {
		return Err(ParseError::MissingRequiredFields { missing: vec!["#Fields directive".to_string()], available: vec![] });
	}

	let canonical_of = |column: &str| -> Option<String> {
		if let Some(mapped) = field_map.get(column) {
			return Some(mapped.clone());
		}
		if REQUIRED_FIELDS.contains(&column) || OPTIONAL_FIELDS.contains(&column) {
			return Some(column.to_string());
		}
		None
	};

	let mut out = Vec::new();
	let mut line_number = 1usize;

	let mut next_line = header.first_data_line.clone();
	loop {
		let raw_line = match next_line.take() {
			Some(l) => Some(l),
			None => {
				let mut buf = String::new();
				let bytes_read = reader.read_line(&mut buf)?;
				if bytes_read == 0 {
					None
				} else {
					Some(buf.trim_end_matches(['\r', '\n']).to_string())
				}
			}
		};
		let Some(raw_line) = raw_line else { break };
		line_number += 1;
		if raw_line.trim().is_empty() || raw_line.starts_with('#') {
			continue;
		}
		out.push(parse_row(&raw_line, &header.fields, &canonical_of, line_number));
	}

	Ok(out)
}

fn parse_row(
	line: &str,
	source_fields: &[String],
	canonical_of: &dyn Fn(&str) -> Option<String>,
	line_number: usize,
) -> Result<Record, ParseError> {
	let values: Vec<&str> = line.split('\t').collect();
	let mut fields: BTreeMap<String, String> = BTreeMap::new();

	for (i, source_name) in source_fields.iter().enumerate() {
		let Some(raw_value) = values.get(i) else { continue };
		if let Some(canonical) = canonical_of(source_name) {
			fields.insert(canonical, decode_value(source_name, raw_value));
		} else {
			fields.insert(source_name.clone(), decode_value(source_name, raw_value));
		}
	}

	let get = |name: &str| fields.get(name).map(|s| s.as_str());

	let ts = if let Some(raw) = get("timestamp") {
		timestamp::parse_any(raw)
	} else {
		let date = get("date").ok_or_else(|| ParseError::MalformedLine {
			line_number,
			message: "missing date/time fields".to_string(),
			line_content: line.to_string(),
		})?;
		let time = get("time").ok_or_else(|| ParseError::MalformedLine {
			line_number,
			message: "missing date/time fields".to_string(),
			line_content: line.to_string(),
		})?;
		timestamp::parse_w3c_datetime(date, time)
	}
	.map_err(|e| ParseError::MalformedLine { line_number, message: e.to_string(), line_content: line.to_string() })?;

	let status_code = get("status_code")
		.or_else(|| get("sc-status"))
		.and_then(super::parse_optional_int)
		.ok_or_else(|| ParseError::MalformedLine {
			line_number,
			message: "missing or invalid status_code".to_string(),
			line_content: line.to_string(),
		})?;

	let response_time_ms = get("response_time_ms")
		.and_then(super::parse_optional_int)
		.or_else(|| get("time-taken").and_then(|s| s.parse::<f64>().ok()).map(|secs| (secs * 1000.0) as i64));

	let mut extra = BTreeMap::new();
	for (key, value) in &fields {
		if !REQUIRED_FIELDS.contains(&key.as_str()) && !OPTIONAL_FIELDS.contains(&key.as_str()) {
			if let Some(v) = super::normalize_optional(value) {
				extra.insert(key.clone(), ExtraValue::String(v.to_string()));
			}
		}
	}

	Ok(Record {
		timestamp: ts,
		client_ip: get("client_ip").unwrap_or("").to_string(),
		method: get("method").unwrap_or("").to_string(),
		host: get("host").unwrap_or("").to_string(),
		path: Record::normalize_path(get("path")),
		status_code,
		user_agent: get("user_agent").unwrap_or("").to_string(),
		query_string: get("query_string").and_then(super::normalize_optional).map(str::to_string),
		response_bytes: get("response_bytes").and_then(super::parse_optional_int),
		request_bytes: get("request_bytes").and_then(super::parse_optional_int),
		response_time_ms,
		cache_status: get("cache_status").and_then(super::normalize_optional).map(str::to_string),
		edge_location: get("edge_location").and_then(super::normalize_optional).map(str::to_string),
		referer: get("referer").and_then(super::normalize_optional).map(str::to_string),
		protocol: get("protocol").and_then(super::normalize_optional).map(str::to_string),
		ssl_protocol: get("ssl_protocol").and_then(super::normalize_optional).map(str::to_string),
		extra,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_cloudfront_style_w3c_log() {
		let data = "#Version: 1.0\n\
			#Fields: date time client_ip method host path status_code user_agent time-taken\n\
			2023-10-10\t13:55:36\t192.0.2.1\tGET\texample.com\t/\t200\tMozilla/5.0\t0.042\n";
		let mut field_map = FieldMap::new();
		field_map.insert("client_ip".into(), "client_ip".into());
		let results = parse(Cursor::new(data), &field_map).unwrap();
		assert_eq!(results.len(), 1);
		let record = results[0].as_ref().unwrap();
		assert_eq!(record.client_ip, "192.0.2.1");
		assert_eq!(record.response_time_ms, Some(42));
	}

	#[test]
	fn first_data_line_after_header_is_not_lost() {
		let data = "#Fields: date time client_ip method host path status_code user_agent\n\
			2023-10-10\t13:55:36\t192.0.2.1\tGET\th\t/\t200\tUA\n\
			2023-10-10\t13:55:37\t192.0.2.2\tGET\th\t/\t200\tUA\n";
		let field_map = FieldMap::new();
		let results = parse(Cursor::new(data), &field_map).unwrap();
		assert_eq!(results.len(), 2);
	}

	#[test]
	fn url_decodes_query_and_user_agent_fields() {
		let data = "#Fields: date time client_ip method host cs-uri-stem cs-uri-query status_code user_agent\n\
			2023-10-10\t13:55:36\t192.0.2.1\tGET\th\t/a\tkey%3Dvalue\t200\tUA%2F1.0\n";
		let mut field_map = FieldMap::new();
		field_map.insert("cs-uri-stem".into(), "path".into());
		field_map.insert("cs-uri-query".into(), "query_string".into());
		field_map.insert("cs(User-Agent)".into(), "user_agent".into());
		let results = parse(Cursor::new(data), &field_map).unwrap();
		let record = results[0].as_ref().unwrap();
		assert_eq!(record.query_string.as_deref(), Some("key=value"));
	}
}
