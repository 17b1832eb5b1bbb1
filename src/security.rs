//! Path safety, field-length limits, and rate limiting (C4, §4.3). Grounded
//! on `ingestion/security.py` in the original implementation: a containment
//! check against a base directory, a small catalog of suspicious path
//! patterns, and a sliding-window request limiter.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathTraversalError {
	#[error("path '{path}' contains suspicious pattern '{pattern}'")]
	SuspiciousPattern { path: String, pattern: String },
	#[error("path '{path}' escapes base directory '{base_dir}'")]
	Escapes { path: String, base_dir: String },
	#[error("path '{path}' is a symlink and symlinks are not allowed")]
	SymlinkRejected { path: String },
	#[error("path contains a NUL byte")]
	NulByte,
	#[error("failed to resolve path '{path}': {source}")]
	Unresolvable { path: String, source: std::io::Error },
}

#[derive(Debug, Error)]
pub enum SecurityValidationError {
	#[error("field '{field}' exceeds maximum length {max} (got {actual})")]
	FieldTooLong { field: String, max: usize, actual: usize },
	#[error("field '{field}' is not valid UTF-8")]
	InvalidEncoding { field: String },
}

static SUSPICIOUS_PATH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
	[r"\.\.", r"^~", r"\$\{", r"\$\(", r"`", r"\|", r";", r"&", r">", r"<"]
		.iter()
		.map(|p| Regex::new(p).expect("static pattern"))
		.collect()
});

/// Per-field maximum lengths, matching `DEFAULT_FIELD_LIMITS` in the
/// original implementation. Fields not listed fall back to 65535.
pub fn field_max_length(field: &str) -> usize {
	match field {
		"client_ip" => 45,
		"method" => 10,
		"host" => 253,
		"path" => 2048,
		"query_string" => 8192,
		"user_agent" => 2048,
		"referer" => 2048,
		"protocol" => 20,
		"ssl_protocol" => 20,
		"cache_status" => 50,
		"edge_location" => 50,
		_ => 65535,
	}
}

/// Validate that `path` contains no suspicious shell/traversal patterns,
/// resolves to a location inside `base_dir`, and (unless `allow_symlinks`)
/// is not itself a symlink.
pub fn validate_path_safe(
	path: &Path,
	base_dir: &Path,
	allow_symlinks: bool,
) -> Result<PathBuf, PathTraversalError> {
	let raw = path.to_string_lossy();
	if raw.contains('\0') {
		return Err(PathTraversalError::NulByte);
	}

	for pattern in SUSPICIOUS_PATH_PATTERNS.iter() {
		if pattern.is_match(&raw) {
			return Err(PathTraversalError::SuspiciousPattern {
				path: raw.to_string(),
				pattern: pattern.as_str().to_string(),
			});
		}
	}

	if !allow_symlinks && path.is_symlink() {
		return Err(PathTraversalError::SymlinkRejected { path: raw.to_string() });
	}

	let resolved = path.canonicalize().map_err(|source| PathTraversalError::Unresolvable {
		path: raw.to_string(),
		source,
	})?;
	let base_resolved = base_dir.canonicalize().map_err(|source| PathTraversalError::Unresolvable {
		path: base_dir.to_string_lossy().to_string(),
		source,
	})?;

	if !resolved.starts_with(&base_resolved) {
		return Err(PathTraversalError::Escapes {
			path: resolved.to_string_lossy().to_string(),
			base_dir: base_resolved.to_string_lossy().to_string(),
		});
	}

	Ok(resolved)
}

/// Validate a single path component (no separators, no traversal token).
pub fn validate_path_component(component: &str) -> Result<(), PathTraversalError> {
	if component.contains('\0') {
		return Err(PathTraversalError::NulByte);
	}
	if component == ".." || component.contains('/') || component.contains('\\') {
		return Err(PathTraversalError::SuspiciousPattern {
			path: component.to_string(),
			pattern: "path separator or traversal token".to_string(),
		});
	}
	Ok(())
}

/// Reject fields longer than their configured maximum.
pub fn validate_field_length(field: &str, value: &str) -> Result<(), SecurityValidationError> {
	let max = field_max_length(field);
	if value.len() > max {
		return Err(SecurityValidationError::FieldTooLong {
			field: field.to_string(),
			max,
			actual: value.len(),
		});
	}
	Ok(())
}

/// Strip control characters other than tab, newline, and carriage return.
pub fn sanitize_string(value: &str) -> String {
	value
		.chars()
		.filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
		.collect()
}

/// Sliding-window rate limiter keyed by an arbitrary string (typically a
/// provider name or source identifier). Uses the monotonic clock so it is
/// immune to wall-clock adjustments.
pub struct RateLimiter {
	window: Duration,
	max_requests: usize,
	hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self { window, max_requests, hits: Mutex::new(HashMap::new()) }
	}

	/// Returns `true` if the call is permitted under `key`'s budget,
	/// recording it as consumed. Returns `false` (without recording) if the
	/// window is already saturated.
	pub fn check(&self, key: &str) -> bool {
		let now = Instant::now();
		let mut hits = self.hits.lock().expect("rate limiter mutex poisoned");
		let entry = hits.entry(key.to_string()).or_default();

		while let Some(&front) = entry.front() {
			if now.duration_since(front) > self.window {
				entry.pop_front();
			} else {
				break;
			}
		}

		if entry.len() >= self.max_requests {
			return false;
		}
		entry.push_back(now);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::tempdir;

	#[test]
	fn rejects_dot_dot_pattern() {
		let dir = tempdir().unwrap();
		let err = validate_path_safe(Path::new("../escape"), dir.path(), true).unwrap_err();
		assert!(matches!(err, PathTraversalError::SuspiciousPattern { .. }));
	}

	#[test]
	fn accepts_file_within_base_dir() {
		let dir = tempdir().unwrap();
		let file = dir.path().join("access.log");
		fs::write(&file, "data").unwrap();
		let resolved = validate_path_safe(&file, dir.path(), true).unwrap();
		assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
	}

	#[test]
	fn field_length_limits_match_catalog() {
		assert_eq!(field_max_length("client_ip"), 45);
		assert_eq!(field_max_length("unknown_field"), 65535);
		assert!(validate_field_length("method", &"G".repeat(11)).is_err());
	}

	#[test]
	fn sanitize_string_keeps_tab_and_newline() {
		let cleaned = sanitize_string("a\tb\nc\u{0007}d");
		assert_eq!(cleaned, "a\tb\ncd");
	}

	#[test]
	fn rate_limiter_enforces_window() {
		let limiter = RateLimiter::new(2, Duration::from_secs(60));
		assert!(limiter.check("cloudflare"));
		assert!(limiter.check("cloudflare"));
		assert!(!limiter.check("cloudflare"));
		assert!(limiter.check("other"));
	}
}
