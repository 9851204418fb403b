//! Error types for the gateway.
//!
//! Every error that can reach the dispatch boundary is converted into an
//! error envelope there; only configuration and connection errors raised
//! during startup are allowed to terminate the process.

use thiserror::Error;

use crate::backend::BackendKind;

/// Errors that can occur inside the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
	/// Invalid startup configuration. Fatal at startup.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// Initial connection to a configured backend failed.
	#[error("Connection error: {0}")]
	Connection(String),

	/// An operation was invoked on a backend without a live connection.
	#[error("Not connected to {0}")]
	NotConnected(BackendKind),

	/// A required argument is missing or has the wrong primitive kind.
	/// The backend call is never invoked.
	#[error("Argument '{field}' {message}")]
	Validation {
		/// Field that failed validation.
		field: String,
		/// What was wrong with it.
		message: String,
	},

	/// The requested operation name is not in the registry.
	#[error("Unknown tool: {0}")]
	UnknownOperation(String),

	/// The native backend call failed. The connection is assumed to still
	/// be usable unless the backend itself closed it.
	#[error("{0}")]
	Backend(String),
}

impl GatewayError {
	/// Validation error for a field that was absent from the bundle.
	pub fn missing_argument(field: impl Into<String>) -> Self {
		GatewayError::Validation {
			field: field.into(),
			message: "is required.".to_string(),
		}
	}

	/// Validation error for a field present with the wrong kind.
	pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
		GatewayError::Validation {
			field: field.into(),
			message: message.into(),
		}
	}

	/// Wrap a native driver failure.
	pub fn backend(err: impl std::fmt::Display) -> Self {
		GatewayError::Backend(err.to_string())
	}
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn unknown_operation_names_the_tool() {
		let error = GatewayError::UnknownOperation("unknown_op".to_string());
		assert_eq!(error.to_string(), "Unknown tool: unknown_op");
	}

	#[rstest]
	fn missing_argument_names_the_field() {
		let error = GatewayError::missing_argument("filter");
		assert_eq!(error.to_string(), "Argument 'filter' is required.");
	}

	#[rstest]
	fn invalid_argument_describes_the_expected_kind() {
		let error = GatewayError::invalid_argument("query", "must be a string.");
		assert_eq!(error.to_string(), "Argument 'query' must be a string.");
	}

	#[rstest]
	fn not_connected_names_the_backend() {
		let error = GatewayError::NotConnected(BackendKind::MySql);
		assert_eq!(error.to_string(), "Not connected to mysql");
	}
}
