//! Universal timestamp rule (§4.1.4): every parser and provider adapter
//! normalizes timestamps through this module so that the tz-aware-UTC and
//! numeric-scale-inference behavior stays in exactly one place.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("could not parse timestamp: '{0}'")]
pub struct TimestampParseError(pub String);

/// Parse a raw timestamp value of unknown shape (RFC 3339 string, common
/// log format, or an epoch number at s/ms/us/ns scale) into UTC.
///
/// Scale inference mirrors the original: values greater than 1e18 are
/// nanoseconds, greater than 1e15 microseconds, greater than 1e12
/// milliseconds, otherwise seconds.
pub fn parse_numeric_epoch(value: f64) -> Result<DateTime<Utc>, TimestampParseError> {
	let (secs, nanos) = if value.abs() > 1e18 {
		let ns = value as i128;
		((ns / 1_000_000_000) as i64, (ns % 1_000_000_000) as u32)
	} else if value.abs() > 1e15 {
		let us = value as i128;
		((us / 1_000_000) as i64, ((us % 1_000_000) * 1_000) as u32)
	} else if value.abs() > 1e12 {
		let ms = value as i128;
		((ms / 1_000) as i64, ((ms % 1_000) * 1_000_000) as u32)
	} else {
		(value.trunc() as i64, (value.fract() * 1e9).round() as u32)
	};
	Utc.timestamp_opt(secs, nanos)
		.single()
		.ok_or_else(|| TimestampParseError(value.to_string()))
}

/// Parse an RFC 3339 / ISO-8601 string, accepting a trailing `Z` and
/// normalizing any embedded offset to UTC. Naive (offset-less) strings are
/// assumed to already be UTC.
pub fn parse_iso8601(raw: &str) -> Result<DateTime<Utc>, TimestampParseError> {
	let normalized = if let Some(stripped) = raw.strip_suffix('Z') {
		format!("{stripped}+00:00")
	} else {
		raw.to_string()
	};

	if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
		return Ok(dt.with_timezone(&Utc));
	}

	for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
			return Ok(Utc.from_utc_datetime(&naive));
		}
	}

	Err(TimestampParseError(raw.to_string()))
}

/// Parse the common/combined log format timestamp, e.g.
/// `10/Oct/2023:13:55:36 +0000`.
pub fn parse_common_log_format(raw: &str) -> Result<DateTime<Utc>, TimestampParseError> {
	DateTime::parse_from_str(raw, "%d/%b/%Y:%H:%M:%S %z")
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| TimestampParseError(raw.to_string()))
}

/// Parse a W3C-style `date time` pair (`2023-10-10 13:55:36`), assumed UTC.
pub fn parse_w3c_datetime(date: &str, time: &str) -> Result<DateTime<Utc>, TimestampParseError> {
	let combined = format!("{date} {time}");
	NaiveDateTime::parse_from_str(&combined, "%Y-%m-%d %H:%M:%S")
		.map(|naive| Utc.from_utc_datetime(&naive))
		.map_err(|_| TimestampParseError(combined))
}

/// Best-effort universal entry point: try ISO-8601, then common log
/// format, then bare numeric epoch. This is what parsers call when a raw
/// field's shape is not already known from context.
pub fn parse_any(raw: &str) -> Result<DateTime<Utc>, TimestampParseError> {
	if let Ok(value) = raw.trim().parse::<f64>() {
		return parse_numeric_epoch(value);
	}
	parse_iso8601(raw).or_else(|_| parse_common_log_format(raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn numeric_scale_inference_boundaries() {
		let secs = parse_numeric_epoch(1_700_000_000.0).unwrap();
		assert_eq!(secs.timestamp(), 1_700_000_000);

		let millis = parse_numeric_epoch(1_700_000_000_000.0).unwrap();
		assert_eq!(millis.timestamp(), 1_700_000_000);

		let micros = parse_numeric_epoch(1_700_000_000_000_000.0).unwrap();
		assert_eq!(micros.timestamp(), 1_700_000_000);

		let nanos = parse_numeric_epoch(1_700_000_000_000_000_000.0).unwrap();
		assert_eq!(nanos.timestamp(), 1_700_000_000);
	}

	#[test]
	fn iso8601_accepts_z_suffix() {
		let dt = parse_iso8601("2023-10-10T13:55:36Z").unwrap();
		assert_eq!(dt.timestamp(), parse_iso8601("2023-10-10T13:55:36+00:00").unwrap().timestamp());
	}

	#[test]
	fn common_log_format_roundtrip() {
		let dt = parse_common_log_format("10/Oct/2023:13:55:36 +0000").unwrap();
		assert_eq!(dt.timestamp(), 1696946136);
	}

	#[test]
	fn w3c_datetime_combines_date_and_time() {
		let dt = parse_w3c_datetime("2023-10-10", "13:55:36").unwrap();
		assert_eq!(dt.timestamp(), 1696946136);
	}

	#[test]
	fn parse_any_rejects_garbage() {
		assert!(parse_any("not-a-timestamp").is_err());
	}
}
