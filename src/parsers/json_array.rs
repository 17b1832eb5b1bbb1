//! JSON-array parsing (C2). The one format the streaming contract cannot
//! honor literally: a top-level JSON array must be parsed whole before any
//! element is available, since array elements are not separated by
//! newlines the way NDJSON's are.

use std::io::Read;

use serde_json::Value;

use super::ndjson::parse_value;
use super::{FieldMap, ParseError};
use crate::record::Record;

/// Parse an entire JSON-array document into [`Record`]s.
pub fn parse<R: Read>(mut reader: R, field_map: &FieldMap) -> Result<Vec<Result<Record, ParseError>>, ParseError> {
	let mut buf = String::new();
	reader.read_to_string(&mut buf)?;
	let value: Value = serde_json::from_str(&buf)?;

	let elements = value.as_array().ok_or_else(|| ParseError::MalformedLine {
		line_number: 1,
		message: "top-level JSON value is not an array".to_string(),
		line_content: buf.chars().take(100).collect(),
	})?;

	Ok(elements
		.iter()
		.enumerate()
		.map(|(i, element)| {
			let line_content = element.to_string();
			parse_value(element, i + 1, &line_content, field_map)
		})
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_array_of_records() {
		let data = r#"[
			{"timestamp":"2023-10-10T13:55:36Z","client_ip":"1.1.1.1","method":"GET","host":"h","path":"/","status_code":200,"user_agent":"UA"},
			{"timestamp":"2023-10-10T13:55:37Z","client_ip":"1.1.1.2","method":"POST","host":"h","path":"/a","status_code":201,"user_agent":"UA"}
		]"#;
		let field_map = FieldMap::new();
		let results = parse(Cursor::new(data), &field_map).unwrap();
		assert_eq!(results.len(), 2);
		assert_eq!(results[1].as_ref().unwrap().status_code, 201);
	}

	#[test]
	fn rejects_non_array_top_level_value() {
		let data = r#"{"not": "an array"}"#;
		let field_map = FieldMap::new();
		let err = parse(Cursor::new(data), &field_map).unwrap_err();
		assert!(matches!(err, ParseError::MalformedLine { .. }));
	}
}
