//! MongoDB backend.
//!
//! One shared `mongodb::Client` per process; every operation addresses its
//! target database and collection explicitly. Filters, updates and
//! pipelines arrive as opaque JSON and are converted structurally to BSON
//! without interpretation.

use std::sync::atomic::{AtomicBool, Ordering};

use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::Client;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::backend::BackendKind;
use crate::error::{GatewayError, Result};

/// Recognized options for `find_one` / `find_many`.
#[derive(Debug, Default)]
pub struct FindArgs {
	pub sort: Option<Document>,
	pub projection: Option<Document>,
	pub limit: Option<i64>,
	pub skip: Option<u64>,
}

/// Recognized options for `aggregate`.
#[derive(Debug, Default)]
pub struct AggregateArgs {
	pub allow_disk_use: Option<bool>,
	pub batch_size: Option<u32>,
}

/// Document backend over MongoDB.
pub struct MongoBackend {
	uri: String,
	client: OnceCell<Client>,
	closed: AtomicBool,
}

impl MongoBackend {
	pub fn new(uri: String) -> Self {
		Self {
			uri,
			client: OnceCell::new(),
			closed: AtomicBool::new(false),
		}
	}

	/// Establish the client and verify connectivity with a ping.
	/// Idempotent before a disconnect.
	pub async fn connect(&self) -> Result<()> {
		self.client
			.get_or_try_init(|| async {
				let client = Client::with_uri_str(&self.uri)
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				client
					.database("admin")
					.run_command(doc! {"ping": 1})
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				tracing::info!("MongoDB connection established");
				Ok(client)
			})
			.await?;
		Ok(())
	}

	/// Shut down the client. Idempotent when never connected.
	pub async fn disconnect(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(client) = self.client.get() {
			client.clone().shutdown().await;
			tracing::info!("disconnected from MongoDB");
		}
	}

	fn client(&self) -> Result<&Client> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(GatewayError::NotConnected(BackendKind::MongoDb));
		}
		self.client
			.get()
			.ok_or(GatewayError::NotConnected(BackendKind::MongoDb))
	}

	fn collection(
		&self,
		db_name: &str,
		collection_name: &str,
	) -> Result<mongodb::Collection<Document>> {
		Ok(self
			.client()?
			.database(db_name)
			.collection::<Document>(collection_name))
	}

	pub async fn list_databases(&self) -> Result<Value> {
		let reply = self
			.client()?
			.database("admin")
			.run_command(doc! {"listDatabases": 1})
			.await
			.map_err(GatewayError::backend)?;
		match reply.get("databases") {
			Some(databases) => Ok(bson_to_json(databases.clone())),
			None => Ok(document_to_json(reply)),
		}
	}

	pub async fn list_collections(&self, db_name: &str) -> Result<Value> {
		let names = self
			.client()?
			.database(db_name)
			.list_collection_names()
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(names))
	}

	pub async fn drop_collection(&self, db_name: &str, collection_name: &str) -> Result<Value> {
		self.collection(db_name, collection_name)?
			.drop()
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({"acknowledged": true}))
	}

	/// Create an index through the `createIndexes` command so arbitrary
	/// index options pass through unchanged. Returns the index name.
	pub async fn create_index(
		&self,
		db_name: &str,
		collection_name: &str,
		field_spec: Document,
		options: Option<Document>,
	) -> Result<Value> {
		let mut index = options.unwrap_or_default();
		if !index.contains_key("name") {
			index.insert("name", index_name(&field_spec));
		}
		index.insert("key", field_spec);
		let name = index
			.get("name")
			.cloned()
			.unwrap_or(Bson::String(String::new()));

		self.client()?
			.database(db_name)
			.run_command(doc! {
				"createIndexes": collection_name,
				"indexes": [index],
			})
			.await
			.map_err(GatewayError::backend)?;
		Ok(bson_to_json(name))
	}

	pub async fn find_one(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
		options: FindArgs,
	) -> Result<Value> {
		let collection = self.collection(db_name, collection_name)?;
		let mut action = collection.find_one(filter);
		if let Some(sort) = options.sort {
			action = action.sort(sort);
		}
		if let Some(projection) = options.projection {
			action = action.projection(projection);
		}
		if let Some(skip) = options.skip {
			action = action.skip(skip);
		}
		let found = action.await.map_err(GatewayError::backend)?;
		Ok(found.map(document_to_json).unwrap_or(Value::Null))
	}

	pub async fn find_many(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
		options: FindArgs,
	) -> Result<Value> {
		let collection = self.collection(db_name, collection_name)?;
		let mut action = collection.find(filter);
		if let Some(sort) = options.sort {
			action = action.sort(sort);
		}
		if let Some(projection) = options.projection {
			action = action.projection(projection);
		}
		if let Some(limit) = options.limit {
			action = action.limit(limit);
		}
		if let Some(skip) = options.skip {
			action = action.skip(skip);
		}
		let documents: Vec<Document> = action
			.await
			.map_err(GatewayError::backend)?
			.try_collect()
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::Array(documents.into_iter().map(document_to_json).collect()))
	}

	pub async fn insert_one(
		&self,
		db_name: &str,
		collection_name: &str,
		document: Document,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.insert_one(document)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({"insertedId": bson_to_json(result.inserted_id)}))
	}

	pub async fn insert_many(
		&self,
		db_name: &str,
		collection_name: &str,
		documents: Vec<Document>,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.insert_many(documents)
			.await
			.map_err(GatewayError::backend)?;
		let mut inserted = serde_json::Map::new();
		for (index, id) in result.inserted_ids {
			inserted.insert(index.to_string(), bson_to_json(id));
		}
		Ok(json!({"insertedIds": inserted}))
	}

	pub async fn update_one(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
		update: Document,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.update_one(filter, update)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({
			"matchedCount": result.matched_count,
			"modifiedCount": result.modified_count,
		}))
	}

	pub async fn update_many(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
		update: Document,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.update_many(filter, update)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({
			"matchedCount": result.matched_count,
			"modifiedCount": result.modified_count,
		}))
	}

	pub async fn delete_one(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.delete_one(filter)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({"deletedCount": result.deleted_count}))
	}

	pub async fn delete_many(
		&self,
		db_name: &str,
		collection_name: &str,
		filter: Document,
	) -> Result<Value> {
		let result = self
			.collection(db_name, collection_name)?
			.delete_many(filter)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!({"deletedCount": result.deleted_count}))
	}

	pub async fn aggregate(
		&self,
		db_name: &str,
		collection_name: &str,
		pipeline: Vec<Document>,
		options: AggregateArgs,
	) -> Result<Value> {
		let collection = self.collection(db_name, collection_name)?;
		let mut action = collection.aggregate(pipeline);
		if let Some(allow_disk_use) = options.allow_disk_use {
			action = action.allow_disk_use(allow_disk_use);
		}
		if let Some(batch_size) = options.batch_size {
			action = action.batch_size(batch_size);
		}
		let documents: Vec<Document> = action
			.await
			.map_err(GatewayError::backend)?
			.try_collect()
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::Array(documents.into_iter().map(document_to_json).collect()))
	}
}

/// Default index name, matching the driver convention `field_direction`
/// joined with underscores.
fn index_name(field_spec: &Document) -> String {
	field_spec
		.iter()
		.map(|(field, direction)| match direction {
			Bson::Int32(n) => format!("{field}_{n}"),
			Bson::Int64(n) => format!("{field}_{n}"),
			Bson::Double(n) => format!("{field}_{n}"),
			Bson::String(s) => format!("{field}_{s}"),
			other => format!("{field}_{other:?}"),
		})
		.collect::<Vec<_>>()
		.join("_")
}

/// Structural JSON→BSON conversion. Integers map to `Int64`, everything
/// else to its direct counterpart; no extended-JSON interpretation.
pub fn json_to_bson(value: &Value) -> Bson {
	match value {
		Value::Null => Bson::Null,
		Value::Bool(b) => Bson::Boolean(*b),
		Value::Number(n) => {
			if let Some(i) = n.as_i64() {
				Bson::Int64(i)
			} else {
				Bson::Double(n.as_f64().unwrap_or(f64::NAN))
			}
		}
		Value::String(s) => Bson::String(s.clone()),
		Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
		Value::Object(map) => {
			let mut document = Document::new();
			for (key, item) in map {
				document.insert(key.clone(), json_to_bson(item));
			}
			Bson::Document(document)
		}
	}
}

/// Convert a JSON value into a BSON document, failing validation when the
/// value is not an object.
pub fn json_to_document(value: &Value, field: &str) -> Result<Document> {
	match json_to_bson(value) {
		Bson::Document(document) => Ok(document),
		_ => Err(GatewayError::invalid_argument(field, "must be an object.")),
	}
}

/// Convert a JSON array into BSON documents, failing validation when any
/// element is not an object.
pub fn json_to_documents(value: &Value, field: &str) -> Result<Vec<Document>> {
	let items = value
		.as_array()
		.ok_or_else(|| GatewayError::invalid_argument(field, "must be an array."))?;
	items
		.iter()
		.map(|item| json_to_document(item, field))
		.collect::<Result<Vec<_>>>()
		.map_err(|_| GatewayError::invalid_argument(field, "must be an array of objects."))
}

/// BSON→JSON conversion for results. ObjectIds render as their hex form,
/// datetimes as RFC 3339 strings.
pub fn bson_to_json(bson: Bson) -> Value {
	match bson {
		Bson::Null | Bson::Undefined => Value::Null,
		Bson::Boolean(b) => Value::Bool(b),
		Bson::Int32(n) => json!(n),
		Bson::Int64(n) => json!(n),
		Bson::Double(n) if n.is_finite() => json!(n),
		Bson::Double(_) => Value::Null,
		Bson::String(s) => Value::String(s),
		Bson::Symbol(s) => Value::String(s),
		Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
		Bson::Document(document) => document_to_json(document),
		Bson::ObjectId(oid) => Value::String(oid.to_hex()),
		Bson::DateTime(dt) => dt
			.try_to_rfc3339_string()
			.map(Value::String)
			.unwrap_or(Value::Null),
		Bson::Timestamp(ts) => json!({"t": ts.time, "i": ts.increment}),
		Bson::Decimal128(d) => Value::String(d.to_string()),
		Bson::Binary(bin) => json!(bin.bytes),
		other => Value::String(format!("{other:?}")),
	}
}

pub fn document_to_json(document: Document) -> Value {
	let mut object = serde_json::Map::new();
	for (key, value) in document {
		object.insert(key, bson_to_json(value));
	}
	Value::Object(object)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[tokio::test]
	async fn operations_without_a_connection_fail_with_not_connected() {
		let backend = MongoBackend::new("mongodb://localhost:27017".to_string());
		let error = backend.list_databases().await.unwrap_err();
		assert!(matches!(
			error,
			GatewayError::NotConnected(BackendKind::MongoDb)
		));
	}

	#[tokio::test]
	async fn disconnect_before_connect_is_a_no_op() {
		let backend = MongoBackend::new("mongodb://localhost:27017".to_string());
		backend.disconnect().await;
		backend.disconnect().await;
	}

	#[rstest]
	fn json_round_trips_structurally() {
		let value = json!({"name": "test", "n": 3, "pi": 1.5, "nested": {"flag": true}, "tags": ["a", "b"], "none": null});
		let document = json_to_document(&value, "doc").unwrap();
		assert_eq!(document.get_str("name").unwrap(), "test");
		assert_eq!(document.get_i64("n").unwrap(), 3);
		assert_eq!(bson_to_json(Bson::Document(document)), value);
	}

	#[rstest]
	fn non_objects_are_rejected_as_documents() {
		let error = json_to_document(&json!([1, 2]), "filter").unwrap_err();
		assert_eq!(error.to_string(), "Argument 'filter' must be an object.");
		let error = json_to_documents(&json!([{"x": 1}, 5]), "docs").unwrap_err();
		assert_eq!(error.to_string(), "Argument 'docs' must be an array of objects.");
	}

	#[rstest]
	fn object_ids_render_as_hex() {
		let oid = bson::oid::ObjectId::new();
		assert_eq!(bson_to_json(Bson::ObjectId(oid)), json!(oid.to_hex()));
	}

	#[rstest]
	fn index_names_follow_the_driver_convention() {
		let spec = doc! {"age": 1, "name": -1};
		assert_eq!(index_name(&spec), "age_1_name_-1");
	}
}
