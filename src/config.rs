//! Environment-derived gateway configuration.
//!
//! The set of backends to activate comes from the `DBS` variable, a
//! comma-separated list of backend identifiers evaluated in order.
//! Per-backend connection parameters have documented defaults so a local
//! development setup needs nothing beyond `DBS` itself.

use crate::error::{GatewayError, Result};

/// MySQL connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlConfig {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub password: String,
	pub database: Option<String>,
}

impl Default for MySqlConfig {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 3306,
			user: "root".to_string(),
			password: String::new(),
			database: None,
		}
	}
}

/// MongoDB connection parameters. The URI carries everything, including
/// credentials and the default database; it has no usable default and is
/// checked by the factory when a mongodb backend is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MongoConfig {
	pub uri: Option<String>,
}

/// Redis connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
	pub host: String,
	pub port: u16,
	pub password: Option<String>,
}

impl Default for RedisConfig {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 6379,
			password: None,
		}
	}
}

impl RedisConfig {
	/// Connection URL in the form the redis crate accepts.
	pub fn url(&self) -> String {
		match &self.password {
			Some(password) => format!("redis://:{}@{}:{}", password, self.host, self.port),
			None => format!("redis://{}:{}", self.host, self.port),
		}
	}
}

/// Full gateway configuration, fixed for the life of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
	/// Ordered backend identifiers from `DBS`, still unparsed so the
	/// factory is the single place that rejects unknown identifiers.
	pub backends: Vec<String>,
	pub mysql: MySqlConfig,
	pub mongodb: MongoConfig,
	pub redis: RedisConfig,
}

impl GatewayConfig {
	/// Read configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_vars(|key| std::env::var(key).ok())
	}

	/// Read configuration through an arbitrary variable lookup.
	pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let backends: Vec<String> = lookup("DBS")
			.unwrap_or_default()
			.split(',')
			.map(str::trim)
			.filter(|identifier| !identifier.is_empty())
			.map(str::to_string)
			.collect();
		if backends.is_empty() {
			return Err(GatewayError::Configuration(
				"no databases configured; set the DBS environment variable".to_string(),
			));
		}

		let defaults = MySqlConfig::default();
		let mysql = MySqlConfig {
			host: lookup("DB_HOST").unwrap_or(defaults.host),
			port: parse_port(lookup("DB_PORT"), "DB_PORT", defaults.port)?,
			user: lookup("DB_USER").unwrap_or(defaults.user),
			password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
			database: lookup("DB_DATABASE"),
		};

		let mongodb = MongoConfig {
			uri: lookup("MONGODB_URI"),
		};

		let redis_defaults = RedisConfig::default();
		let redis = RedisConfig {
			host: lookup("REDIS_HOST").unwrap_or(redis_defaults.host),
			port: parse_port(lookup("REDIS_PORT"), "REDIS_PORT", redis_defaults.port)?,
			password: lookup("REDIS_PASSWORD"),
		};

		Ok(Self {
			backends,
			mysql,
			mongodb,
			redis,
		})
	}
}

fn parse_port(value: Option<String>, variable: &str, default: u16) -> Result<u16> {
	match value {
		None => Ok(default),
		Some(raw) => raw.parse().map_err(|_| {
			GatewayError::Configuration(format!("{variable} is not a valid port: {raw}"))
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::collections::HashMap;

	fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[rstest]
	fn defaults_apply_when_only_dbs_is_set() {
		let env = vars(&[("DBS", "mysql")]);
		let config = GatewayConfig::from_vars(|key| env.get(key).cloned()).unwrap();
		assert_eq!(config.backends, vec!["mysql"]);
		assert_eq!(config.mysql.host, "localhost");
		assert_eq!(config.mysql.port, 3306);
		assert_eq!(config.mysql.user, "root");
		assert_eq!(config.mysql.password, "");
		assert_eq!(config.redis.port, 6379);
	}

	#[rstest]
	fn identifiers_are_trimmed_and_kept_in_order() {
		let env = vars(&[("DBS", " mysql , redis,mongodb ")]);
		let config = GatewayConfig::from_vars(|key| env.get(key).cloned()).unwrap();
		assert_eq!(config.backends, vec!["mysql", "redis", "mongodb"]);
	}

	#[rstest]
	fn empty_dbs_is_a_configuration_error() {
		let env = vars(&[("DBS", " , ")]);
		let error = GatewayConfig::from_vars(|key| env.get(key).cloned()).unwrap_err();
		assert!(error.to_string().starts_with("Configuration error:"));
	}

	#[rstest]
	fn missing_dbs_is_a_configuration_error() {
		let error = GatewayConfig::from_vars(|_| None).unwrap_err();
		assert!(matches!(error, GatewayError::Configuration(_)));
	}

	#[rstest]
	#[case("DB_PORT", "not-a-port")]
	#[case("REDIS_PORT", "70000")]
	fn invalid_ports_are_rejected(#[case] variable: &str, #[case] value: &str) {
		let env = vars(&[("DBS", "mysql"), (variable, value)]);
		let error = GatewayConfig::from_vars(|key| env.get(key).cloned()).unwrap_err();
		assert!(matches!(error, GatewayError::Configuration(_)));
	}

	#[rstest]
	fn redis_url_includes_password_when_present() {
		let config = RedisConfig {
			host: "cache".to_string(),
			port: 6380,
			password: Some("secret".to_string()),
		};
		assert_eq!(config.url(), "redis://:secret@cache:6380");
		let config = RedisConfig::default();
		assert_eq!(config.url(), "redis://localhost:6379");
	}
}
