//! Backend variants and the factory that builds them.
//!
//! Each variant wraps one backend kind behind its native operation set.
//! The kind space is closed: runtime identifier strings are mapped onto
//! [`BackendKind`] and every dispatch site matches exhaustively, so adding
//! a backend is a compile-time change rather than a table registration.

pub mod mongodb;
pub mod mysql;
pub mod redis;

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

pub use self::mongodb::MongoBackend;
pub use self::mysql::MySqlBackend;
pub use self::redis::RedisBackend;

/// Closed enumeration of supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
	MySql,
	MongoDb,
	Redis,
}

impl BackendKind {
	/// Operation name prefix used when several backends are active.
	pub fn prefix(&self) -> &'static str {
		match self {
			BackendKind::MySql => "mysql_",
			BackendKind::MongoDb => "mongodb_",
			BackendKind::Redis => "redis_",
		}
	}
}

impl std::fmt::Display for BackendKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			BackendKind::MySql => "mysql",
			BackendKind::MongoDb => "mongodb",
			BackendKind::Redis => "redis",
		};
		f.write_str(name)
	}
}

impl FromStr for BackendKind {
	type Err = GatewayError;

	fn from_str(identifier: &str) -> Result<Self> {
		match identifier {
			"mysql" => Ok(BackendKind::MySql),
			"mongodb" => Ok(BackendKind::MongoDb),
			"redis" => Ok(BackendKind::Redis),
			other => Err(GatewayError::Configuration(format!(
				"Unsupported database type: {other}"
			))),
		}
	}
}

/// A capability-typed handle over one backend kind.
///
/// Constructed by [`Backend::create`] in a not-yet-connected state; the
/// underlying driver handle only exists between `connect` and
/// `disconnect`.
#[derive(Clone)]
pub enum Backend {
	MySql(Arc<MySqlBackend>),
	MongoDb(Arc<MongoBackend>),
	Redis(Arc<RedisBackend>),
}

impl std::fmt::Debug for Backend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("Backend").field(&self.kind()).finish()
	}
}

impl Backend {
	/// Build a backend variant from a configuration identifier.
	///
	/// An unrecognized identifier (or a mongodb backend without
	/// `MONGODB_URI`) is a configuration error; no partially-valid
	/// variant is ever returned.
	pub fn create(identifier: &str, config: &GatewayConfig) -> Result<Self> {
		match BackendKind::from_str(identifier)? {
			BackendKind::MySql => Ok(Backend::MySql(Arc::new(MySqlBackend::new(
				config.mysql.clone(),
			)))),
			BackendKind::MongoDb => {
				let uri = config.mongodb.uri.clone().ok_or_else(|| {
					GatewayError::Configuration(
						"MONGODB_URI is not defined in the environment".to_string(),
					)
				})?;
				Ok(Backend::MongoDb(Arc::new(MongoBackend::new(uri))))
			}
			BackendKind::Redis => Ok(Backend::Redis(Arc::new(RedisBackend::new(
				config.redis.clone(),
			)))),
		}
	}

	pub fn kind(&self) -> BackendKind {
		match self {
			Backend::MySql(_) => BackendKind::MySql,
			Backend::MongoDb(_) => BackendKind::MongoDb,
			Backend::Redis(_) => BackendKind::Redis,
		}
	}

	/// Establish the backend connection. Idempotent: repeated calls
	/// before a disconnect reuse the existing handle.
	pub async fn connect(&self) -> Result<()> {
		match self {
			Backend::MySql(backend) => backend.connect().await,
			Backend::MongoDb(backend) => backend.connect().await,
			Backend::Redis(backend) => backend.connect().await,
		}
	}

	/// Tear down the connection, cancelling any background liveness task
	/// first. Idempotent when never connected.
	pub async fn disconnect(&self) {
		match self {
			Backend::MySql(backend) => backend.disconnect().await,
			Backend::MongoDb(backend) => backend.disconnect().await,
			Backend::Redis(backend) => backend.disconnect().await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn config() -> GatewayConfig {
		GatewayConfig {
			backends: vec!["mysql".to_string()],
			..GatewayConfig::default()
		}
	}

	#[rstest]
	#[case("postgres")]
	#[case("cassandra")]
	#[case("MYSQL")]
	#[case("")]
	fn unknown_identifiers_fail_with_configuration_error(#[case] identifier: &str) {
		let error = Backend::create(identifier, &config()).unwrap_err();
		assert_eq!(
			error.to_string(),
			format!("Configuration error: Unsupported database type: {identifier}")
		);
	}

	#[rstest]
	fn known_identifiers_build_the_matching_variant() {
		let mut config = config();
		config.mongodb.uri = Some("mongodb://localhost:27017".to_string());
		assert_eq!(
			Backend::create("mysql", &config).unwrap().kind(),
			BackendKind::MySql
		);
		assert_eq!(
			Backend::create("mongodb", &config).unwrap().kind(),
			BackendKind::MongoDb
		);
		assert_eq!(
			Backend::create("redis", &config).unwrap().kind(),
			BackendKind::Redis
		);
	}

	#[rstest]
	fn mongodb_without_uri_is_a_configuration_error() {
		let error = Backend::create("mongodb", &config()).unwrap_err();
		assert!(error.to_string().contains("MONGODB_URI"));
	}

	#[rstest]
	fn kind_prefixes_match_their_identifiers() {
		assert_eq!(BackendKind::MySql.prefix(), "mysql_");
		assert_eq!(BackendKind::MongoDb.prefix(), "mongodb_");
		assert_eq!(BackendKind::Redis.prefix(), "redis_");
	}
}
