//! Request dispatch over the operation registry.
//!
//! The dispatcher is the single entry point for callers: it resolves the
//! operation by name, validates the argument bundle against the declared
//! schema, and only then invokes the bound backend call. Every failure is
//! folded into an error envelope; the dispatcher itself never returns
//! `Err`.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::envelope::Envelope;
use crate::error::{GatewayError, Result};
use crate::registry::{Args, OperationRegistry};

/// Cheaply cloneable handle used by every in-flight request.
#[derive(Clone)]
pub struct Dispatcher {
	registry: Arc<OperationRegistry>,
}

impl Dispatcher {
	pub fn new(registry: Arc<OperationRegistry>) -> Self {
		Self { registry }
	}

	/// Descriptors of every registered operation, in sorted order.
	pub fn list_operations(&self) -> Vec<Value> {
		self.registry
			.descriptors()
			.map(|descriptor| descriptor.to_value())
			.collect()
	}

	/// Resolve, validate and invoke one operation.
	pub async fn call(&self, name: &str, arguments: Option<&Value>) -> Envelope {
		match self.try_call(name, arguments).await {
			Ok(payload) => Envelope::success(payload),
			Err(error) => {
				debug!(operation = name, %error, "operation failed");
				Envelope::error(error.to_string())
			}
		}
	}

	async fn try_call(&self, name: &str, arguments: Option<&Value>) -> Result<Value> {
		let operation = self
			.registry
			.get(name)
			.ok_or_else(|| GatewayError::UnknownOperation(name.to_string()))?;

		let empty = Args::new();
		let args = match arguments {
			None | Some(Value::Null) => &empty,
			Some(Value::Object(map)) => map,
			Some(_) => {
				return Err(GatewayError::invalid_argument("arguments", "must be an object."));
			}
		};

		operation.descriptor.schema.validate(args)?;
		operation.call.invoke(args).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	use crate::registry::{BoundCall, FieldKind, FieldSpec, Operation, StubCall};

	fn dispatcher_with(operations: Vec<Operation>) -> Dispatcher {
		Dispatcher::new(Arc::new(
			OperationRegistry::from_operations(operations).unwrap(),
		))
	}

	fn echo_operation(stub: Arc<StubCall>) -> Operation {
		Operation::new(
			"",
			"execute_query",
			"Execute SQL query on MySQL database",
			vec![FieldSpec::required(
				"query",
				FieldKind::String,
				"SQL query to execute",
			)],
			BoundCall::Stub(stub),
		)
	}

	#[rstest]
	#[tokio::test]
	async fn unknown_names_produce_the_canonical_message() {
		let dispatcher = dispatcher_with(Vec::new());
		let envelope = dispatcher.call("unknown_op", None).await;
		assert!(!envelope.is_ok());
		assert_eq!(envelope.message(), Some("Unknown tool: unknown_op"));
	}

	#[rstest]
	#[tokio::test]
	async fn validation_failures_never_reach_the_backend() {
		let stub = StubCall::ok(json!([]));
		let dispatcher = dispatcher_with(vec![echo_operation(stub.clone())]);

		let envelope = dispatcher
			.call("execute_query", Some(&json!({"query": 123})))
			.await;
		assert_eq!(envelope.message(), Some("Argument 'query' must be a string."));
		assert_eq!(stub.call_count(), 0);

		let envelope = dispatcher.call("execute_query", Some(&json!({}))).await;
		assert_eq!(envelope.message(), Some("Argument 'query' is required."));
		assert_eq!(stub.call_count(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn valid_arguments_invoke_the_bound_call_once() {
		let stub = StubCall::ok(json!([{"id": 1}]));
		let dispatcher = dispatcher_with(vec![echo_operation(stub.clone())]);

		let envelope = dispatcher
			.call("execute_query", Some(&json!({"query": "SELECT 1"})))
			.await;
		assert!(envelope.is_ok());
		assert_eq!(envelope.payload(), Some(&json!([{"id": 1}])));
		assert_eq!(stub.call_count(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn backend_failures_become_error_envelopes() {
		let stub = StubCall::err("connection reset");
		let dispatcher = dispatcher_with(vec![echo_operation(stub)]);

		let envelope = dispatcher
			.call("execute_query", Some(&json!({"query": "SELECT 1"})))
			.await;
		assert!(!envelope.is_ok());
		assert_eq!(envelope.message(), Some("connection reset"));
	}

	#[rstest]
	#[tokio::test]
	async fn non_object_argument_bundles_are_rejected() {
		let stub = StubCall::ok(json!(null));
		let dispatcher = dispatcher_with(vec![echo_operation(stub.clone())]);

		let envelope = dispatcher.call("execute_query", Some(&json!([1, 2]))).await;
		assert_eq!(
			envelope.message(),
			Some("Argument 'arguments' must be an object.")
		);
		assert_eq!(stub.call_count(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn missing_arguments_default_to_an_empty_bundle() {
		let stub = StubCall::ok(json!(["users"]));
		let dispatcher = dispatcher_with(vec![Operation::new(
			"",
			"show_tables",
			"Show all tables in the database",
			Vec::new(),
			BoundCall::Stub(stub.clone()),
		)]);

		let envelope = dispatcher.call("show_tables", None).await;
		assert!(envelope.is_ok());
		assert_eq!(stub.call_count(), 1);
	}

	#[rstest]
	fn listing_is_stable_and_sorted() {
		let dispatcher = dispatcher_with(vec![
			Operation::new("", "b_op", "second", Vec::new(), BoundCall::Stub(StubCall::ok(json!(1)))),
			Operation::new("", "a_op", "first", Vec::new(), BoundCall::Stub(StubCall::ok(json!(1)))),
		]);

		let first = dispatcher.list_operations();
		let second = dispatcher.list_operations();
		assert_eq!(first, second);
		assert_eq!(first[0]["name"], "a_op");
		assert_eq!(first[1]["name"], "b_op");
	}
}
