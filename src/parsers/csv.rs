//! CSV/TSV parsing (C2), grounded on `ingestion/parsers/csv_parser.py`.
//! Unlike the original hand-rolled row splitter, this uses the `csv` crate
//! for correct RFC 4180 quoting, and is driven with either a comma or tab
//! delimiter for the TSV variant.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::record::{ExtraValue, Record, OPTIONAL_FIELDS, REQUIRED_FIELDS};
use crate::timestamp;

use super::{FieldMap, ParseError};

/// Parse a delimited (CSV or TSV) stream into [`Record`]s.
///
/// `field_map` maps a source column header to a canonical field name;
/// columns absent from `field_map` are matched by identity against the
/// universal schema's field names, then carried into `extra` if still
/// unmatched.
pub fn parse<R: BufRead>(
	reader: R,
	delimiter: u8,
	field_map: &FieldMap,
) -> Result<Vec<Result<Record, ParseError>>, ParseError> {
	let mut rdr = ::csv::ReaderBuilder::new()
		.delimiter(delimiter)
		.has_headers(false)
		.flexible(true)
		.from_reader(reader);

	let mut records_iter = rdr.records();
	let header_row = records_iter
		.next()
		.ok_or_else(|| ParseError::MissingRequiredFields { missing: REQUIRED_FIELDS.to_vec(), available: vec![] })??;

	let headers: Vec<String> = header_row
		.iter()
		.enumerate()
		.map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}').to_string() } else { h.to_string() })
		.collect();

	let canonical_of = |column: &str| -> Option<String> {
		if let Some(mapped) = field_map.get(column) {
			return Some(mapped.clone());
		}
		if REQUIRED_FIELDS.contains(&column) || OPTIONAL_FIELDS.contains(&column) {
			return Some(column.to_string());
		}
		None
	};

	let column_targets: Vec<Option<String>> = headers.iter().map(|h| canonical_of(h)).collect();

	let present: Vec<&str> = column_targets.iter().filter_map(|c| c.as_deref()).collect();
	let missing: Vec<String> =
		REQUIRED_FIELDS.iter().filter(|f| !present.contains(f)).map(|f| f.to_string()).collect();
	if !missing.is_empty() {
		return Err(ParseError::MissingRequiredFields { missing, available: headers.clone() });
	}

	let mut out = Vec::new();
	for (line_number, row) in records_iter.enumerate() {
		let row = match row {
			Ok(r) => r,
			Err(e) => {
				out.push(Err(ParseError::MalformedLine {
					line_number: line_number + 2,
					message: e.to_string(),
					line_content: String::new(),
				}));
				continue;
			}
		};

		let mut fields: BTreeMap<String, String> = BTreeMap::new();
		for (i, value) in row.iter().enumerate() {
			if let Some(Some(target)) = column_targets.get(i) {
				fields.insert(target.clone(), value.to_string());
			}
		}

		out.push(parse_row(&fields, line_number + 2));
	}

	Ok(out)
}

fn parse_row(fields: &BTreeMap<String, String>, line_number: usize) -> Result<Record, ParseError> {
	let get = |name: &str| fields.get(name).map(|s| s.as_str());

	let timestamp_raw = get("timestamp").ok_or_else(|| ParseError::MalformedLine {
		line_number,
		message: "missing timestamp".to_string(),
		line_content: String::new(),
	})?;
	let ts = parse_timestamp(timestamp_raw).map_err(|e| ParseError::MalformedLine {
		line_number,
		message: e.to_string(),
		line_content: timestamp_raw.to_string(),
	})?;

	let status_code = super::parse_optional_int(get("status_code").unwrap_or("")).ok_or_else(|| {
		ParseError::MalformedLine {
			line_number,
			message: "missing or invalid status_code".to_string(),
			line_content: String::new(),
		}
	})?;

	let mut extra = BTreeMap::new();
	for (key, value) in fields {
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
		response_time_ms: get("response_time_ms").and_then(super::parse_optional_int),
		cache_status: get("cache_status").and_then(super::normalize_optional).map(str::to_string),
		edge_location: get("edge_location").and_then(super::normalize_optional).map(str::to_string),
		referer: get("referer").and_then(super::normalize_optional).map(str::to_string),
		protocol: get("protocol").and_then(super::normalize_optional).map(str::to_string),
		ssl_protocol: get("ssl_protocol").and_then(super::normalize_optional).map(str::to_string),
		extra,
	})
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, timestamp::TimestampParseError> {
	timestamp::parse_iso8601(raw)
		.or_else(|_| timestamp::parse_common_log_format(raw))
		.or_else(|_| raw.parse::<f64>().map_err(|_| timestamp::TimestampParseError(raw.to_string())).and_then(timestamp::parse_numeric_epoch))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_simple_csv_with_identity_mapping() {
		let data = "timestamp,client_ip,method,host,path,status_code,user_agent\n\
			2023-10-10T13:55:36Z,192.0.2.1,GET,example.com,/,200,Mozilla/5.0\n";
		let field_map = FieldMap::new();
		let results = parse(Cursor::new(data), b',', &field_map).unwrap();
		assert_eq!(results.len(), 1);
		let record = results[0].as_ref().unwrap();
		assert_eq!(record.client_ip, "192.0.2.1");
		assert_eq!(record.status_code, 200);
	}

	#[test]
	fn missing_required_column_is_rejected() {
		let data = "client_ip,method\n192.0.2.1,GET\n";
		let field_map = FieldMap::new();
		let err = parse(Cursor::new(data), b',', &field_map).unwrap_err();
		assert!(matches!(err, ParseError::MissingRequiredFields { .. }));
	}

	#[test]
	fn bom_is_stripped_from_first_header() {
		let data = "\u{feff}timestamp,client_ip,method,host,path,status_code,user_agent\n\
			2023-10-10T13:55:36Z,192.0.2.1,GET,example.com,/,200,UA\n";
		let field_map = FieldMap::new();
		let results = parse(Cursor::new(data), b',', &field_map).unwrap();
		assert_eq!(results.len(), 1);
		assert!(results[0].is_ok());
	}

	#[test]
	fn unmapped_columns_land_in_extra() {
		let data = "timestamp,client_ip,method,host,path,status_code,user_agent,pop\n\
			2023-10-10T13:55:36Z,192.0.2.1,GET,example.com,/,200,UA,LAX1\n";
		let field_map = FieldMap::new();
		let results = parse(Cursor::new(data), b',', &field_map).unwrap();
		let record = results[0].as_ref().unwrap();
		assert_eq!(record.extra.get("pop"), Some(&ExtraValue::String("LAX1".into())));
	}
}
