//! AWS Application Load Balancer access log parsing, grounded on
//! `ingestion/providers/aws_alb/adapter.py`. The format is space-separated
//! with shell-style quoting around the request line and user agent, hence
//! `shell-words` (the Rust analogue of Python's `shlex`) rather than a
//! plain `split_whitespace`.

use std::collections::BTreeMap;

use url::Url;

use crate::record::{ExtraValue, Record};
use crate::timestamp;

use super::ParseError;

const MIN_FIELD_COUNT: usize = 17;

const FIELD_NAMES: &[&str] = &[
	"type",
	"time",
	"elb",
	"client_port",
	"target_port",
	"request_processing_time",
	"target_processing_time",
	"response_processing_time",
	"elb_status_code",
	"target_status_code",
	"received_bytes",
	"sent_bytes",
	"request",
	"user_agent",
	"ssl_cipher",
	"ssl_protocol",
	"target_group_arn",
];

/// Parse one ALB access log line into a [`Record`].
pub fn parse_line(line: &str, line_number: usize) -> Result<Record, ParseError> {
	let tokens = shell_words::split(line).map_err(|e| ParseError::MalformedLine {
		line_number,
		message: format!("unbalanced quoting: {e}"),
		line_content: line.to_string(),
	})?;

	if tokens.len() < MIN_FIELD_COUNT {
		return Err(ParseError::MalformedLine {
			line_number,
			message: format!("expected at least {MIN_FIELD_COUNT} fields, got {}", tokens.len()),
			line_content: line.to_string(),
		});
	}

	let field = |name: &str| -> &str {
		let idx = FIELD_NAMES.iter().position(|f| *f == name).expect("known field name");
		tokens[idx].as_str()
	};

	let ts = parse_alb_timestamp(field("time")).map_err(|e| ParseError::MalformedLine {
		line_number,
		message: e.to_string(),
		line_content: line.to_string(),
	})?;

	let client_ip = extract_client_ip(field("client_port"));
	let elb_status_code = field("elb_status_code").parse::<i64>().map_err(|_| ParseError::MalformedLine {
		line_number,
		message: "invalid elb_status_code".to_string(),
		line_content: line.to_string(),
	})?;

	let (method, host, path, query_string, protocol) = parse_request_line(field("request"));
	let response_time_ms = calculate_response_time(
		field("request_processing_time"),
		field("target_processing_time"),
		field("response_processing_time"),
	);

	let mut extra = BTreeMap::new();
	extra.insert("type".to_string(), ExtraValue::String(field("type").to_string()));
	extra.insert("elb".to_string(), ExtraValue::String(field("elb").to_string()));
	extra.insert("target_group_arn".to_string(), ExtraValue::String(field("target_group_arn").to_string()));
	if let Some(target_status) = field("target_status_code").parse::<i64>().ok() {
		extra.insert("target_status_code".to_string(), ExtraValue::Integer(target_status));
	}
	if let Some(trace_id) = tokens.get(MIN_FIELD_COUNT) {
		extra.insert("trace_id".to_string(), ExtraValue::String(trace_id.clone()));
	}
	for (i, token) in tokens.iter().enumerate().skip(MIN_FIELD_COUNT + 1) {
		extra.insert(format!("trace_field_{}", i - MIN_FIELD_COUNT), ExtraValue::String(token.clone()));
	}

	Ok(Record {
		timestamp: ts,
		client_ip,
		method: method.unwrap_or_default(),
		host: host.unwrap_or_default(),
		path,
		status_code: elb_status_code,
		user_agent: field("user_agent").to_string(),
		query_string,
		response_bytes: field("sent_bytes").parse::<i64>().ok(),
		request_bytes: field("received_bytes").parse::<i64>().ok(),
		response_time_ms,
		cache_status: None,
		edge_location: None,
		referer: None,
		protocol,
		ssl_protocol: super::normalize_optional(field("ssl_protocol")).map(str::to_string),
		extra,
	})
}

fn parse_alb_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, timestamp::TimestampParseError> {
	timestamp::parse_iso8601(raw)
}

/// `client:port` for IPv4, `[ipv6]:port` for IPv6. Returns just the
/// address, dropping the port.
fn extract_client_ip(client_port: &str) -> String {
	if let Some(rest) = client_port.strip_prefix('[') {
		if let Some(end) = rest.find(']') {
			return rest[..end].to_string();
		}
	}
	match client_port.rsplit_once(':') {
		Some((ip, _port)) => ip.to_string(),
		None => client_port.to_string(),
	}
}

/// Split the ALB `request` field (`"METHOD url HTTP/1.1"`) into method,
/// host, path, query string, and protocol. Tolerates the malformed
/// `-`/`"- - -"` sentinel ALB emits for connections that never produced a
/// request line.
fn parse_request_line(raw: &str) -> (Option<String>, Option<String>, String, Option<String>, Option<String>) {
	let tokens: Vec<&str> = raw.split_whitespace().collect();
	if tokens.len() < 2 || raw.trim() == "- - -" {
		return (None, None, "/".to_string(), None, None);
	}

	let method = Some(tokens[0].to_string());
	let url_str = tokens[1];
	let protocol = tokens.get(2).map(|s| s.to_string());

	match Url::parse(url_str) {
		Ok(url) => {
			let host = url.host_str().map(str::to_string);
			let path = Record::normalize_path(Some(url.path()));
			let query = url.query().map(str::to_string);
			(method, host, path, query, protocol)
		}
		Err(_) => {
			let (path, query) = Record::split_query(url_str);
			(method, None, path, query, protocol)
		}
	}
}

/// Sum the three ALB processing-time fields (seconds, `-1` meaning
/// "not applicable"), converting to milliseconds.
fn calculate_response_time(request_time: &str, target_time: &str, response_time: &str) -> Option<i64> {
	let mut total = 0.0f64;
	let mut any = false;
	for raw in [request_time, target_time, response_time] {
		if raw == "-1" || raw == "-" {
			continue;
		}
		if let Ok(v) = raw.parse::<f64>() {
			total += v;
			any = true;
		}
	}
	if any {
		Some((total * 1000.0) as i64)
	} else {
		None
	}
}
