//! Dotted-path flattening for nested JSON objects (used by the JSON-array,
//! NDJSON, and several provider adapters' field maps, e.g. GCP Cloud CDN's
//! nested `httpRequest` object and Azure's nested diagnostic properties).

use std::collections::BTreeMap;

use serde_json::Value;

/// Flatten a nested JSON object into a map keyed by dotted path, e.g.
/// `{"httpRequest": {"status": 200}}` becomes `{"httpRequest.status": 200}`.
/// Arrays are kept as opaque leaf values rather than indexed, since no
/// provider field map in this crate reaches into an array.
pub fn flatten_object(value: &Value) -> BTreeMap<String, Value> {
	let mut out = BTreeMap::new();
	flatten_into(value, String::new(), &mut out);
	out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
	match value {
		Value::Object(map) => {
			for (key, child) in map {
				let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
				flatten_into(child, path, out);
			}
		}
		other => {
			out.insert(prefix, other.clone());
		}
	}
}

/// Look up a dotted path (`"httpRequest.status"`) in a nested JSON value
/// without fully flattening it.
pub fn get_nested_value<'a>(value: &'a Value, dotted_path: &str) -> Option<&'a Value> {
	let mut current = value;
	for segment in dotted_path.split('.') {
		current = current.as_object()?.get(segment)?;
	}
	Some(current)
}

/// Coerce a JSON value to a plain string, the way every parser needs when
/// reading a canonical field out of a flattened map.
pub fn value_to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		Value::Null => None,
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn flattens_nested_http_request_object() {
		let value = json!({
			"httpRequest": {"status": 200, "requestMethod": "GET"},
			"timestamp": "2023-10-10T13:55:36Z"
		});
		let flat = flatten_object(&value);
		assert_eq!(flat.get("httpRequest.status"), Some(&json!(200)));
		assert_eq!(flat.get("httpRequest.requestMethod"), Some(&json!("GET")));
		assert_eq!(flat.get("timestamp"), Some(&json!("2023-10-10T13:55:36Z")));
	}

	#[test]
	fn get_nested_value_walks_dotted_path() {
		let value = json!({"a": {"b": {"c": 42}}});
		assert_eq!(get_nested_value(&value, "a.b.c"), Some(&json!(42)));
		assert_eq!(get_nested_value(&value, "a.b.missing"), None);
	}
}
