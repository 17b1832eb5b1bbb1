//! Streaming format parsers (C2). Each parser takes a field map (source
//! column/key name -> canonical field name) and a reader, and yields
//! [`crate::record::Record`]s one at a time rather than materializing the
//! whole source in memory (the JSON-array parser is the one necessary
//! exception, since a JSON array cannot be split without parsing it whole).

pub mod alb;
pub mod csv;
pub mod flatten;
pub mod json_array;
pub mod ndjson;
pub mod w3c;

use std::collections::HashMap;

use thiserror::Error;

/// A mapping from a source field name (column header, JSON key, or dotted
/// path) to the canonical universal schema field name it should populate.
pub type FieldMap = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum ParseError {
	#[error("line {line_number}: {message} (content: {})", truncate(line_content))]
	MalformedLine { line_number: usize, message: String, line_content: String },

	#[error("missing required fields: {missing:?} (available columns: {available:?})")]
	MissingRequiredFields { missing: Vec<String>, available: Vec<String> },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Timestamp(#[from] crate::timestamp::TimestampParseError),
}

fn truncate(content: &str) -> String {
	if content.len() > 100 {
		format!("{}...", &content[..100])
	} else {
		content.to_string()
	}
}

/// Treat the common "absent value" sentinels (`""`, `-`, `null`,
/// case-insensitive) as `None`, matching the original CSV/ALB parsers.
pub fn normalize_optional(raw: &str) -> Option<&str> {
	let trimmed = raw.trim();
	if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("null") {
		None
	} else {
		Some(trimmed)
	}
}

/// Parse an optional integer field, tolerating a float-looking string such
/// as `"123.0"` (seen in some provider exports) by truncating it.
pub fn parse_optional_int(raw: &str) -> Option<i64> {
	let value = normalize_optional(raw)?;
	if let Ok(i) = value.parse::<i64>() {
		return Some(i);
	}
	value.parse::<f64>().ok().map(|f| f as i64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_optional_treats_sentinels_as_none() {
		assert_eq!(normalize_optional(""), None);
		assert_eq!(normalize_optional("-"), None);
		assert_eq!(normalize_optional("NULL"), None);
		assert_eq!(normalize_optional("value"), Some("value"));
	}

	#[test]
	fn parse_optional_int_tolerates_float_strings() {
		assert_eq!(parse_optional_int("123"), Some(123));
		assert_eq!(parse_optional_int("123.0"), Some(123));
		assert_eq!(parse_optional_int("-"), None);
	}
}
