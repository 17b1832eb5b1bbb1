//! AWS Application Load Balancer access logs: space-separated with
//! shell-style quoting, handled by [`crate::parsers::alb`].

use async_trait::async_trait;

use crate::error::{IngestionError, SourceValidationError};
use crate::parsers::FieldMap;
use crate::record::SourceType;

use super::common::{ingest_path, validate_file_source, ParserKind};
use super::{IngestOptions, IngestOutcome, IngestionSource, ProviderAdapter};

const SOURCE_TYPES: &[SourceType] = &[SourceType::AlbLogFile];
const FILE_EXTENSIONS: &[&str] = &["log", "txt"];

pub struct AwsAlbAdapter;

#[async_trait]
impl ProviderAdapter for AwsAlbAdapter {
	fn provider_name(&self) -> &'static str {
		"aws_alb"
	}

	fn supported_source_types(&self) -> &'static [SourceType] {
		SOURCE_TYPES
	}

	fn validate_source(&self, source: &IngestionSource) -> Result<(), SourceValidationError> {
		validate_file_source(&source.location, source.source_type.as_str())
	}

	async fn ingest(
		&self,
		source: &IngestionSource,
		options: &IngestOptions,
	) -> Result<IngestOutcome, IngestionError> {
		let base_dir = options.base_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
		let path = source.as_path();
		let options = options.clone();
		let field_map = FieldMap::new();
		tokio::task::spawn_blocking(move || {
			ingest_path(&path, &base_dir, FILE_EXTENSIONS, ParserKind::Alb, &field_map, &options)
		})
		.await
		.expect("ingest_path worker panicked")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[tokio::test]
	async fn ingests_alb_log_with_ipv6_client() {
		let mut file = NamedTempFile::with_suffix(".log").unwrap();
		writeln!(
			file,
			"http 2023-10-10T13:55:36.123456Z app/my-lb/abc [2001:db8::1]:54321 10.0.0.5:80 0.001 0.002 0.000 200 200 100 200 \"GET http://example.com:80/api/data HTTP/1.1\" \"Mozilla/5.0\" - TLSv1.2 arn:aws:elasticloadbalancing:target/group"
		).unwrap();

		let adapter = AwsAlbAdapter;
		let source = IngestionSource::new(SourceType::AlbLogFile, file.path().to_str().unwrap());
		let mut options = IngestOptions::default();
		options.base_dir = file.path().parent().map(|p| p.to_path_buf());
		let outcome = adapter.ingest(&source, &options).await.unwrap();
		assert_eq!(outcome.records.len(), 1);
		assert_eq!(outcome.records[0].client_ip, "2001:db8::1");
	}
}
