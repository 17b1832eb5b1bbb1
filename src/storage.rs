//! SQLite-backed storage for normalized records. Schema creation and the
//! transaction-with-row-by-row-fallback batch insert are grounded on the
//! teacher's `storage/db/schema.rs` and `data/database/dumps.rs::write_all`
//! patterns, carried over to the ingest-logs record shape.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::record::{ExtraValue, Record};

pub struct Storage {
	conn: Connection,
}

/// A single result row from [`Storage::query`]: column name to SQLite
/// value, used by validation/health checks that need arbitrary read access
/// rather than one of the typed convenience queries above.
pub type StorageRow = std::collections::BTreeMap<String, rusqlite::types::Value>;

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
	conn.execute_batch(
		"CREATE TABLE IF NOT EXISTS records (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			provider TEXT NOT NULL,
			timestamp TEXT NOT NULL,
			client_ip TEXT NOT NULL,
			method TEXT NOT NULL,
			host TEXT NOT NULL,
			path TEXT NOT NULL,
			status_code INTEGER NOT NULL,
			user_agent TEXT NOT NULL,
			query_string TEXT,
			response_bytes INTEGER,
			request_bytes INTEGER,
			response_time_ms INTEGER,
			cache_status TEXT,
			edge_location TEXT,
			referer TEXT,
			protocol TEXT,
			ssl_protocol TEXT,
			extra TEXT NOT NULL DEFAULT '{}',
			is_bot INTEGER NOT NULL DEFAULT 0,
			bot_provider TEXT,
			bot_category TEXT
		);
		CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records (timestamp);
		CREATE INDEX IF NOT EXISTS idx_records_provider ON records (provider);",
	)
}

impl Storage {
	/// Open (creating if absent) the SQLite database at `path` and ensure
	/// its schema exists.
	pub fn open(path: &Path) -> rusqlite::Result<Self> {
		let conn = Connection::open(path)?;
		conn.pragma_update(None, "journal_mode", "WAL")?;
		conn.pragma_update(None, "foreign_keys", "ON")?;
		create_schema(&conn)?;
		Ok(Self { conn })
	}

	/// In-memory database, used by tests and `--validate-only` dry runs.
	pub fn open_in_memory() -> rusqlite::Result<Self> {
		let conn = Connection::open_in_memory()?;
		create_schema(&conn)?;
		Ok(Self { conn })
	}

	/// Insert a batch of records inside one transaction. If any row in the
	/// batch fails (a constraint violation, a serialization error), the
	/// whole transaction is rolled back and the batch is retried one row
	/// at a time so that only the offending rows are actually lost.
	pub fn insert_batch(&mut self, provider: &str, records: &[Record]) -> rusqlite::Result<usize> {
		let tx = self.conn.transaction()?;
		let mut inserted = 0usize;
		let mut failed_indices = Vec::new();

		{
			let mut stmt = tx.prepare_cached(INSERT_SQL)?;
			for (i, record) in records.iter().enumerate() {
				if let Err(e) = insert_one(&mut stmt, provider, record) {
					tracing::warn!(error = %e, index = i, "batch insert failed, will retry individually");
					failed_indices.push(i);
				} else {
					inserted += 1;
				}
			}
		}

		if failed_indices.is_empty() {
			tx.commit()?;
			return Ok(inserted);
		}
		tx.rollback()?;

		inserted = 0;
		for record in records {
			let tx = self.conn.transaction()?;
			let result = {
				let mut stmt = tx.prepare_cached(INSERT_SQL)?;
				insert_one(&mut stmt, provider, record)
			};
			match result {
				Ok(()) => {
					tx.commit()?;
					inserted += 1;
				}
				Err(e) => {
					tx.rollback()?;
					tracing::warn!(error = %e, client_ip = %record.client_ip, "dropping record that failed individual insert");
				}
			}
		}
		Ok(inserted)
	}

	pub fn close(self) -> rusqlite::Result<()> {
		self.conn.close().map_err(|(_, e)| e)
	}

	/// Count of rows currently stored, used by integration tests to assert
	/// an end-to-end ingestion scenario landed the expected number of
	/// records.
	pub fn record_count(&self) -> rusqlite::Result<i64> {
		self.conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
	}

	pub fn record_count_for_provider(&self, provider: &str) -> rusqlite::Result<i64> {
		self.conn.query_row("SELECT COUNT(*) FROM records WHERE provider = ?1", params![provider], |row| row.get(0))
	}

	/// Run an arbitrary read-only query, used by validation/health checks
	/// that need more than the typed count helpers above.
	pub fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> rusqlite::Result<Vec<StorageRow>> {
		let mut stmt = self.conn.prepare(sql)?;
		let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
		let rows = stmt.query_map(params, move |row| {
			let mut map = StorageRow::new();
			for (i, name) in column_names.iter().enumerate() {
				map.insert(name.clone(), row.get(i)?);
			}
			Ok(map)
		})?;
		rows.collect()
	}

	/// Run an arbitrary mutating statement, returning the number of
	/// affected rows.
	pub fn execute(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> rusqlite::Result<usize> {
		self.conn.execute(sql, params)
	}
}

const INSERT_SQL: &str = "INSERT INTO records (
	provider, timestamp, client_ip, method, host, path, status_code, user_agent,
	query_string, response_bytes, request_bytes, response_time_ms,
	cache_status, edge_location, referer, protocol, ssl_protocol, extra,
	is_bot, bot_provider, bot_category
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)";

fn insert_one(stmt: &mut rusqlite::CachedStatement<'_>, provider: &str, record: &Record) -> rusqlite::Result<()> {
	let bot_match = crate::bot_classifier::classify(&record.user_agent);
	let extra_json = extra_to_json(record);

	stmt.execute(params![
		provider,
		record.timestamp.to_rfc3339(),
		record.client_ip,
		record.method,
		record.host,
		record.path,
		record.status_code,
		record.user_agent,
		record.query_string,
		record.response_bytes,
		record.request_bytes,
		record.response_time_ms,
		record.cache_status,
		record.edge_location,
		record.referer,
		record.protocol,
		record.ssl_protocol,
		extra_json,
		bot_match.is_some() as i64,
		bot_match.map(|b| b.provider),
		bot_match.map(|b| match b.category {
			crate::bot_classifier::BotCategory::Training => "training",
			crate::bot_classifier::BotCategory::UserRequest => "user_request",
		}),
	])?;
	Ok(())
}

fn extra_to_json(record: &Record) -> String {
	fn convert(value: &ExtraValue) -> Value {
		match value {
			ExtraValue::String(s) => Value::String(s.clone()),
			ExtraValue::Integer(i) => Value::from(*i),
			ExtraValue::Float(f) => Value::from(*f),
			ExtraValue::Bool(b) => Value::Bool(*b),
			ExtraValue::Null => Value::Null,
			ExtraValue::Map(m) => Value::Object(m.iter().map(|(k, v)| (k.clone(), convert(v))).collect()),
		}
	}
	let object: serde_json::Map<String, Value> = record.extra.iter().map(|(k, v)| (k.clone(), convert(v))).collect();
	serde_json::Value::Object(object).to_string()
}

/// Returns `true` if a database already exists at `path` (used to decide
/// whether `--validate-only` should refuse to touch it).
pub fn database_exists(path: &Path) -> rusqlite::Result<bool> {
	if !path.exists() {
		return Ok(false);
	}
	let conn = Connection::open(path)?;
	let exists: Option<i64> = conn
		.query_row("SELECT 1 FROM sqlite_master WHERE type='table' AND name='records'", [], |row| row.get(0))
		.optional()?;
	Ok(exists.is_some())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	fn sample_record() -> Record {
		Record {
			timestamp: chrono::Utc::now(),
			client_ip: "192.0.2.1".into(),
			method: "GET".into(),
			host: "example.com".into(),
			path: "/".into(),
			status_code: 200,
			user_agent: "GPTBot/1.0".into(),
			query_string: None,
			response_bytes: None,
			request_bytes: None,
			response_time_ms: None,
			cache_status: None,
			edge_location: None,
			referer: None,
			protocol: None,
			ssl_protocol: None,
			extra: BTreeMap::from([("pop".to_string(), ExtraValue::String("LAX1".into()))]),
		}
	}

	#[test]
	fn insert_batch_roundtrips_and_flags_bots() {
		let mut storage = Storage::open_in_memory().unwrap();
		let inserted = storage.insert_batch("universal", &[sample_record()]).unwrap();
		assert_eq!(inserted, 1);
		assert_eq!(storage.record_count().unwrap(), 1);

		let is_bot: i64 = storage
			.conn
			.query_row("SELECT is_bot FROM records LIMIT 1", [], |row| row.get(0))
			.unwrap();
		assert_eq!(is_bot, 1);
	}

	#[test]
	fn record_count_for_provider_filters_correctly() {
		let mut storage = Storage::open_in_memory().unwrap();
		storage.insert_batch("aws_alb", &[sample_record()]).unwrap();
		storage.insert_batch("universal", &[sample_record(), sample_record()]).unwrap();
		assert_eq!(storage.record_count_for_provider("universal").unwrap(), 2);
		assert_eq!(storage.record_count_for_provider("aws_alb").unwrap(), 1);
	}

	#[test]
	fn query_returns_arbitrary_rows() {
		let mut storage = Storage::open_in_memory().unwrap();
		storage.insert_batch("universal", &[sample_record()]).unwrap();
		let rows = storage.query("SELECT client_ip, status_code FROM records", &[]).unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].get("client_ip"), Some(&rusqlite::types::Value::Text("192.0.2.1".to_string())));
		assert_eq!(rows[0].get("status_code"), Some(&rusqlite::types::Value::Integer(200)));
	}

	#[test]
	fn execute_returns_affected_row_count() {
		let mut storage = Storage::open_in_memory().unwrap();
		storage.insert_batch("universal", &[sample_record(), sample_record()]).unwrap();
		let affected = storage
			.execute("DELETE FROM records WHERE provider = ?1", &[&"universal" as &dyn rusqlite::ToSql])
			.unwrap();
		assert_eq!(affected, 2);
		assert_eq!(storage.record_count().unwrap(), 0);
	}
}
