//! Error taxonomy (§4.7), mirrored from the original exception hierarchy:
//! a single root `IngestionError` that every other error converts into via
//! `#[from]`, so callers at the driver level can match on one type.

use thiserror::Error;

use crate::parsers::ParseError;
use crate::security::{PathTraversalError, SecurityValidationError};

#[derive(Debug, Error)]
#[error("validation failed for field '{field}': {value}")]
pub struct ValidationError {
	pub field: String,
	pub value: String,
}

#[derive(Debug, Error)]
#[error(
	"provider '{provider_name}' is not registered (available providers: {})",
	available_providers.join(", ")
)]
pub struct ProviderNotFoundError {
	pub provider_name: String,
	pub available_providers: Vec<String>,
}

#[derive(Debug, Error)]
#[error("source validation failed for source_type '{source_type}': {reason}")]
pub struct SourceValidationError {
	pub source_type: String,
	pub reason: String,
}

/// Root error type. Every ingestion-path fallible operation eventually
/// returns this.
#[derive(Debug, Error)]
pub enum IngestionError {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error(transparent)]
	Parse(#[from] ParseError),

	#[error(transparent)]
	ProviderNotFound(#[from] ProviderNotFoundError),

	#[error(transparent)]
	SourceValidation(#[from] SourceValidationError),

	#[error(transparent)]
	PathTraversal(#[from] PathTraversalError),

	#[error(transparent)]
	SecurityValidation(#[from] SecurityValidationError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Storage(#[from] rusqlite::Error),

	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error("rate limit exceeded for provider '{0}'")]
	RateLimited(String),
}
