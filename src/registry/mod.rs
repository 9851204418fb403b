//! Operation registry and argument validation.
//!
//! At startup the registry absorbs the full operation set of every
//! connected backend into one lookup table. Each entry couples an
//! immutable descriptor (name, description, argument schema) with a bound
//! call: a closed pairing of the owning backend handle and an op-code,
//! matched exhaustively at invoke time. The registry is never mutated
//! after construction.

pub(crate) mod mongodb;
pub(crate) mod mysql;
pub(crate) mod redis;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::backend::{Backend, MongoBackend, MySqlBackend, RedisBackend};
use crate::error::{GatewayError, Result};

/// Argument bundle as received from the caller.
pub type Args = serde_json::Map<String, Value>;

/// Primitive kinds an argument field may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
	String,
	Number,
	Object,
	Array,
}

impl FieldKind {
	fn schema_type(&self) -> &'static str {
		match self {
			FieldKind::String => "string",
			FieldKind::Number => "number",
			FieldKind::Object => "object",
			FieldKind::Array => "array",
		}
	}

	fn matches(&self, value: &Value) -> bool {
		match self {
			FieldKind::String => value.is_string(),
			FieldKind::Number => value.is_number(),
			FieldKind::Object => value.is_object(),
			FieldKind::Array => value.is_array(),
		}
	}

	fn expectation(&self) -> &'static str {
		match self {
			FieldKind::String => "must be a string.",
			FieldKind::Number => "must be a number.",
			FieldKind::Object => "must be an object.",
			FieldKind::Array => "must be an array.",
		}
	}
}

/// One declared argument field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
	pub name: &'static str,
	pub kind: FieldKind,
	pub required: bool,
	pub description: &'static str,
}

impl FieldSpec {
	pub fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
		Self {
			name,
			kind,
			required: true,
			description,
		}
	}

	pub fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
		Self {
			name,
			kind,
			required: false,
			description,
		}
	}
}

/// Ordered argument schema for one operation.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
	pub fields: Vec<FieldSpec>,
}

impl ArgumentSchema {
	pub fn new(fields: Vec<FieldSpec>) -> Self {
		Self { fields }
	}

	/// Check every required field for presence and exact primitive kind.
	/// Object and array fields are presence-checked only; their internal
	/// shape is opaque pass-through. Optional absent fields stay unset.
	pub fn validate(&self, args: &Args) -> Result<()> {
		for field in &self.fields {
			match args.get(field.name) {
				None if field.required => {
					return Err(GatewayError::missing_argument(field.name));
				}
				None => {}
				Some(value) if !field.kind.matches(value) => {
					return Err(GatewayError::invalid_argument(
						field.name,
						field.kind.expectation(),
					));
				}
				Some(_) => {}
			}
		}
		Ok(())
	}

	/// JSON-schema shaped rendering for the "list operations" surface.
	pub fn to_value(&self) -> Value {
		let mut properties = serde_json::Map::new();
		let mut required = Vec::new();
		for field in &self.fields {
			properties.insert(
				field.name.to_string(),
				json!({
					"type": field.kind.schema_type(),
					"description": field.description,
				}),
			);
			if field.required {
				required.push(Value::String(field.name.to_string()));
			}
		}
		let mut schema = serde_json::Map::new();
		schema.insert("type".to_string(), json!("object"));
		schema.insert("properties".to_string(), Value::Object(properties));
		if !required.is_empty() {
			schema.insert("required".to_string(), Value::Array(required));
		}
		Value::Object(schema)
	}
}

/// Immutable description of one registered operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
	pub name: String,
	pub description: &'static str,
	pub schema: ArgumentSchema,
}

impl OperationDescriptor {
	pub fn to_value(&self) -> Value {
		json!({
			"name": self.name,
			"description": self.description,
			"inputSchema": self.schema.to_value(),
		})
	}
}

/// A descriptor together with its bound backend call.
pub struct Operation {
	pub descriptor: OperationDescriptor,
	pub(crate) call: BoundCall,
}

impl Operation {
	pub(crate) fn new(
		prefix: &str,
		name: &str,
		description: &'static str,
		fields: Vec<FieldSpec>,
		call: BoundCall,
	) -> Self {
		Self {
			descriptor: OperationDescriptor {
				name: format!("{prefix}{name}"),
				description,
				schema: ArgumentSchema::new(fields),
			},
			call,
		}
	}
}

/// Closed pairing of a backend handle and an op-code.
pub(crate) enum BoundCall {
	MySql(Arc<MySqlBackend>, mysql::MySqlOp),
	MongoDb(Arc<MongoBackend>, mongodb::MongoOp),
	Redis(Arc<RedisBackend>, redis::RedisOp),
	#[cfg(test)]
	Stub(Arc<StubCall>),
}

impl BoundCall {
	pub(crate) async fn invoke(&self, args: &Args) -> Result<Value> {
		match self {
			BoundCall::MySql(backend, op) => op.invoke(backend, args).await,
			BoundCall::MongoDb(backend, op) => op.invoke(backend, args).await,
			BoundCall::Redis(backend, op) => op.invoke(backend, args).await,
			#[cfg(test)]
			BoundCall::Stub(stub) => stub.invoke(),
		}
	}
}

/// Test stand-in for a backend call, counting invocations.
#[cfg(test)]
pub(crate) struct StubCall {
	pub calls: std::sync::atomic::AtomicUsize,
	pub result: std::result::Result<Value, String>,
}

#[cfg(test)]
impl StubCall {
	pub fn ok(result: Value) -> Arc<Self> {
		Arc::new(Self {
			calls: std::sync::atomic::AtomicUsize::new(0),
			result: Ok(result),
		})
	}

	pub fn err(message: &str) -> Arc<Self> {
		Arc::new(Self {
			calls: std::sync::atomic::AtomicUsize::new(0),
			result: Err(message.to_string()),
		})
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(std::sync::atomic::Ordering::SeqCst)
	}

	fn invoke(&self) -> Result<Value> {
		self.calls
			.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		match &self.result {
			Ok(value) => Ok(value.clone()),
			Err(message) => Err(GatewayError::Backend(message.clone())),
		}
	}
}

/// Merged, namespaced lookup table over all active backends.
pub struct OperationRegistry {
	operations: BTreeMap<String, Operation>,
}

impl std::fmt::Debug for OperationRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OperationRegistry")
			.field("operations", &self.operations.keys())
			.finish()
	}
}

impl OperationRegistry {
	/// Absorb the operation set of every connected backend. With several
	/// active backends every name carries its backend prefix; a single
	/// backend registers unprefixed names. Duplicate names are rejected.
	pub fn build(backends: &[Backend]) -> Result<Self> {
		let namespaced = backends.len() > 1;
		let mut operations = BTreeMap::new();
		for backend in backends {
			let prefix = if namespaced { backend.kind().prefix() } else { "" };
			for operation in backend_operations(backend, prefix) {
				let name = operation.descriptor.name.clone();
				if operations.insert(name.clone(), operation).is_some() {
					return Err(GatewayError::Configuration(format!(
						"duplicate operation name in registry: {name}"
					)));
				}
			}
		}
		Ok(Self { operations })
	}

	#[cfg(test)]
	pub(crate) fn from_operations(list: Vec<Operation>) -> Result<Self> {
		let mut operations = BTreeMap::new();
		for operation in list {
			let name = operation.descriptor.name.clone();
			if operations.insert(name.clone(), operation).is_some() {
				return Err(GatewayError::Configuration(format!(
					"duplicate operation name in registry: {name}"
				)));
			}
		}
		Ok(Self { operations })
	}

	pub fn get(&self, name: &str) -> Option<&Operation> {
		self.operations.get(name)
	}

	/// Descriptors in deterministic (sorted) order.
	pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
		self.operations.values().map(|operation| &operation.descriptor)
	}

	pub fn len(&self) -> usize {
		self.operations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}
}

fn backend_operations(backend: &Backend, prefix: &str) -> Vec<Operation> {
	match backend {
		Backend::MySql(handle) => mysql::operations(handle, prefix),
		Backend::MongoDb(handle) => mongodb::operations(handle, prefix),
		Backend::Redis(handle) => redis::operations(handle, prefix),
	}
}

// Argument extraction helpers. Schema validation runs first, so these are
// a second, fail-closed line rather than the primary check.

pub(crate) fn require_value<'a>(args: &'a Args, field: &'static str) -> Result<&'a Value> {
	args.get(field)
		.ok_or_else(|| GatewayError::missing_argument(field))
}

pub(crate) fn require_str<'a>(args: &'a Args, field: &'static str) -> Result<&'a str> {
	require_value(args, field)?
		.as_str()
		.ok_or_else(|| GatewayError::invalid_argument(field, "must be a string."))
}

pub(crate) fn require_i64(args: &Args, field: &'static str) -> Result<i64> {
	require_value(args, field)?
		.as_i64()
		.ok_or_else(|| GatewayError::invalid_argument(field, "must be a number."))
}

pub(crate) fn require_array<'a>(args: &'a Args, field: &'static str) -> Result<&'a Vec<Value>> {
	require_value(args, field)?
		.as_array()
		.ok_or_else(|| GatewayError::invalid_argument(field, "must be an array."))
}

pub(crate) fn require_string_array(args: &Args, field: &'static str) -> Result<Vec<String>> {
	require_array(args, field)?
		.iter()
		.map(|item| {
			item.as_str().map(str::to_string).ok_or_else(|| {
				GatewayError::invalid_argument(field, "must be an array of strings.")
			})
		})
		.collect()
}

pub(crate) fn optional_object<'a>(
	args: &'a Args,
	field: &'static str,
) -> Result<Option<&'a Args>> {
	match args.get(field) {
		None => Ok(None),
		Some(value) => value
			.as_object()
			.map(Some)
			.ok_or_else(|| GatewayError::invalid_argument(field, "must be an object.")),
	}
}
