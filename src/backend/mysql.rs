//! MySQL backend.
//!
//! Holds a single long-lived connection (a sqlx pool capped at one
//! connection so session state such as `USE` and the session timeouts
//! survives across calls) and a 15-minute keep-alive ping task that keeps
//! the server from dropping the idle connection. Ping failures are logged
//! and never escalated; the gateway performs no reconnects.

use std::time::Duration;

use serde_json::{Value, json};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Connection, Either, Executor, Row};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;

use crate::backend::BackendKind;
use crate::config::MySqlConfig;
use crate::error::{GatewayError, Result};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const SESSION_TIMEOUT_SECS: u64 = 60 * 60;

/// Relational backend over MySQL.
pub struct MySqlBackend {
	config: MySqlConfig,
	keep_alive_interval: Duration,
	pool: OnceCell<MySqlPool>,
	keep_alive: Mutex<Option<JoinHandle<()>>>,
}

impl MySqlBackend {
	pub fn new(config: MySqlConfig) -> Self {
		Self {
			config,
			keep_alive_interval: KEEP_ALIVE_INTERVAL,
			pool: OnceCell::new(),
			keep_alive: Mutex::new(None),
		}
	}

	#[cfg(test)]
	fn with_keep_alive_interval(config: MySqlConfig, interval: Duration) -> Self {
		Self {
			keep_alive_interval: interval,
			..Self::new(config)
		}
	}

	/// Establish the connection, configure session-level timeouts on it
	/// and start the keep-alive ping. Idempotent: a second call before a
	/// disconnect reuses the existing handle.
	pub async fn connect(&self) -> Result<()> {
		self.pool
			.get_or_try_init(|| async {
				let mut options = MySqlConnectOptions::new()
					.host(&self.config.host)
					.port(self.config.port)
					.username(&self.config.user)
					.password(&self.config.password);
				if let Some(database) = &self.config.database {
					options = options.database(database);
				}

				let pool = MySqlPoolOptions::new()
					.max_connections(1)
					.idle_timeout(None)
					.max_lifetime(None)
					.after_connect(|conn, _meta| {
						Box::pin(async move {
							// Session timeout failures are logged only,
							// mirroring the keep-alive policy.
							let statements = [
								format!("SET SESSION wait_timeout = {SESSION_TIMEOUT_SECS}"),
								format!("SET SESSION interactive_timeout = {SESSION_TIMEOUT_SECS}"),
							];
							for statement in statements {
								if let Err(error) = conn.execute(sqlx::raw_sql(&statement)).await {
									tracing::warn!(%error, "failed to set MySQL session timeout");
								}
							}
							Ok(())
						})
					})
					.connect_with(options)
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;

				let mut conn = pool
					.acquire()
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				conn.ping()
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				drop(conn);

				tracing::info!("MySQL connection established");
				Ok(pool)
			})
			.await?;

		self.start_keep_alive().await;
		Ok(())
	}

	/// Cancel the keep-alive task, then close the connection. Idempotent
	/// when never connected.
	pub async fn disconnect(&self) {
		let handle = self.keep_alive.lock().await.take();
		if let Some(handle) = handle {
			handle.abort();
			let _ = handle.await;
		}
		if let Some(pool) = self.pool.get() {
			if !pool.is_closed() {
				pool.close().await;
				tracing::info!("disconnected from MySQL");
			}
		}
	}

	async fn start_keep_alive(&self) {
		let mut slot = self.keep_alive.lock().await;
		if slot.is_some() {
			return;
		}
		let Some(pool) = self.pool.get().cloned() else {
			return;
		};
		let period = self.keep_alive_interval;
		*slot = Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.tick().await;
			loop {
				interval.tick().await;
				let ping = async {
					let mut conn = pool.acquire().await?;
					conn.ping().await
				};
				if let Err(error) = ping.await {
					tracing::warn!(%error, "MySQL keep-alive ping failed");
				}
			}
		}));
	}

	fn pool(&self) -> Result<&MySqlPool> {
		match self.pool.get() {
			Some(pool) if !pool.is_closed() => Ok(pool),
			_ => Err(GatewayError::NotConnected(BackendKind::MySql)),
		}
	}

	/// Execute an arbitrary SQL statement, passed through unchanged over
	/// the text protocol. Row-producing statements return an array of
	/// column→value objects; others return the server's OK summary.
	pub async fn execute_query(&self, query: &str) -> Result<Value> {
		use futures::TryStreamExt;

		let pool = self.pool()?;
		let mut stream = pool.fetch_many(sqlx::raw_sql(query));
		let mut rows = Vec::new();
		let mut summary = None;
		while let Some(step) = stream.try_next().await.map_err(GatewayError::backend)? {
			match step {
				Either::Left(result) => summary = Some(result),
				Either::Right(row) => rows.push(row_to_json(&row)),
			}
		}
		match summary {
			Some(result) if rows.is_empty() && !opens_result_set(query) => Ok(json!({
				"rowsAffected": result.rows_affected(),
				"lastInsertId": result.last_insert_id(),
			})),
			_ => Ok(Value::Array(rows)),
		}
	}

	pub async fn show_tables(&self) -> Result<Value> {
		self.fetch_rows("SHOW TABLES").await
	}

	pub async fn describe_table(&self, table_name: &str) -> Result<Value> {
		self.fetch_rows(&format!("DESCRIBE `{table_name}`")).await
	}

	/// Switch the session's default database.
	pub async fn use_database(&self, database_name: &str) -> Result<Value> {
		let pool = self.pool()?;
		pool.execute(sqlx::raw_sql(&format!("USE `{database_name}`")))
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::String(format!(
			"Successfully switched to database: {database_name}"
		)))
	}

	pub async fn list_databases(&self) -> Result<Value> {
		self.fetch_rows("SHOW DATABASES").await
	}

	pub async fn get_schema(&self, table_name: &str) -> Result<Value> {
		self.fetch_rows(&format!("SHOW CREATE TABLE `{table_name}`"))
			.await
	}

	async fn fetch_rows(&self, sql: &str) -> Result<Value> {
		let pool = self.pool()?;
		let rows = sqlx::query(sql)
			.fetch_all(pool)
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::Array(rows.iter().map(row_to_json).collect()))
	}
}

/// Whether a statement opens a result set even when it matches nothing.
/// The OK summary on the wire cannot tell an empty SELECT from a DML
/// acknowledgement, so zero-row results are classified by the leading
/// keyword: result-set statements render as `[]`, not as a summary.
fn opens_result_set(query: &str) -> bool {
	let verb = query
		.trim_start_matches(|c: char| c.is_whitespace() || c == '(')
		.split_whitespace()
		.next()
		.unwrap_or("");
	matches!(
		verb.to_ascii_uppercase().as_str(),
		"SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH" | "TABLE" | "VALUES"
	)
}

fn row_to_json(row: &MySqlRow) -> Value {
	let mut object = serde_json::Map::new();
	for column in row.columns() {
		let name = column.name();
		object.insert(name.to_string(), column_to_json(row, name));
	}
	Value::Object(object)
}

/// Decode one column into JSON by trying the plausible Rust types in
/// order, most specific first. Anything undecodable (or NULL) comes back
/// as JSON null.
fn column_to_json(row: &MySqlRow, name: &str) -> Value {
	if let Ok(value) = row.try_get::<bool, _>(name) {
		Value::Bool(value)
	} else if let Ok(value) = row.try_get::<i64, _>(name) {
		json!(value)
	} else if let Ok(value) = row.try_get::<u64, _>(name) {
		json!(value)
	} else if let Ok(value) = row.try_get::<f64, _>(name) {
		json!(value)
	} else if let Ok(value) = row.try_get::<String, _>(name) {
		Value::String(value)
	} else if let Ok(value) = row.try_get::<Value, _>(name) {
		value
	} else if let Ok(value) = row.try_get::<Vec<u8>, _>(name) {
		match String::from_utf8(value) {
			Ok(text) => Value::String(text),
			Err(raw) => json!(raw.into_bytes()),
		}
	} else if let Ok(value) = row.try_get::<chrono::NaiveDateTime, _>(name) {
		// TIMESTAMP/DATETIME without timezone
		let utc: chrono::DateTime<chrono::Utc> =
			chrono::DateTime::from_naive_utc_and_offset(value, chrono::Utc);
		Value::String(utc.to_rfc3339())
	} else if let Ok(value) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
		Value::String(value.to_rfc3339())
	} else {
		Value::Null
	}
}
