use std::process;

use ingest_logs::driver::{EXIT_FATAL_ERROR, EXIT_INTERRUPTED};
use ingest_logs::error::IngestionError;
use ingest_logs::RunError;

#[tokio::main]
async fn main() {
	match ingest_logs::run().await {
		Ok(exit_code) => process::exit(exit_code),
		Err(e) => {
			let code = match &e {
				RunError::Ingestion(IngestionError::Io(io_err))
					if io_err.kind() == std::io::ErrorKind::Interrupted =>
				{
					EXIT_INTERRUPTED
				}
				_ => EXIT_FATAL_ERROR,
			};
			tracing::error!(error = %e, "ingest-logs failed");
			process::exit(code);
		}
	}
}
