//! The uniform response wrapper returned for every call across the boundary.

use serde::Serialize;
use serde_json::Value;

/// Success/error wrapper. This is the only shape ever returned to callers.
///
/// String payloads pass through verbatim as JSON strings; structured
/// results are carried as-is and serialized deterministically when the
/// envelope crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
	/// `{ "ok": true, "payload": <value> }`
	Success {
		/// Always `true`.
		ok: bool,
		/// Native backend result, passed through unmodified.
		payload: Value,
	},
	/// `{ "ok": false, "message": <string> }`
	Error {
		/// Always `false`.
		ok: bool,
		/// Human-readable failure message.
		message: String,
	},
}

impl Envelope {
	pub fn success(payload: Value) -> Self {
		Envelope::Success { ok: true, payload }
	}

	pub fn error(message: impl Into<String>) -> Self {
		Envelope::Error {
			ok: false,
			message: message.into(),
		}
	}

	pub fn is_ok(&self) -> bool {
		matches!(self, Envelope::Success { .. })
	}

	/// The payload of a success envelope.
	pub fn payload(&self) -> Option<&Value> {
		match self {
			Envelope::Success { payload, .. } => Some(payload),
			Envelope::Error { .. } => None,
		}
	}

	/// The message of an error envelope.
	pub fn message(&self) -> Option<&str> {
		match self {
			Envelope::Success { .. } => None,
			Envelope::Error { message, .. } => Some(message),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn success_serializes_with_ok_and_payload() {
		let envelope = Envelope::success(json!([{"id": 1}]));
		let wire = serde_json::to_value(&envelope).unwrap();
		assert_eq!(wire, json!({"ok": true, "payload": [{"id": 1}]}));
	}

	#[test]
	fn error_serializes_with_ok_and_message() {
		let envelope = Envelope::error("Unknown tool: unknown_op");
		let wire = serde_json::to_value(&envelope).unwrap();
		assert_eq!(wire, json!({"ok": false, "message": "Unknown tool: unknown_op"}));
	}

	#[test]
	fn string_payloads_pass_through_verbatim() {
		let envelope = Envelope::success(Value::String("OK".to_string()));
		assert_eq!(envelope.payload(), Some(&json!("OK")));
	}
}
