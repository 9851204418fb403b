//! MongoDB operation table.
//!
//! Filters, update documents and pipelines are declared as opaque object
//! or array fields; only the option bags are picked apart, and any option
//! key the gateway cannot forward is rejected rather than coerced.

use std::sync::Arc;

use bson::Document;
use serde_json::Value;

use crate::backend::MongoBackend;
use crate::backend::mongodb::{AggregateArgs, FindArgs, json_to_document, json_to_documents};
use crate::error::{GatewayError, Result};
use crate::registry::{
	Args, BoundCall, FieldKind, FieldSpec, Operation, optional_object, require_str, require_value,
};

/// Op-codes for the document operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MongoOp {
	ListDatabases,
	ListCollections,
	DropCollection,
	CreateIndex,
	FindOne,
	FindMany,
	InsertOne,
	InsertMany,
	UpdateOne,
	UpdateMany,
	DeleteOne,
	DeleteMany,
	Aggregate,
}

impl MongoOp {
	pub(crate) async fn invoke(&self, backend: &MongoBackend, args: &Args) -> Result<Value> {
		if matches!(self, MongoOp::ListDatabases) {
			return backend.list_databases().await;
		}

		let db_name = require_str(args, "dbName")?;
		if matches!(self, MongoOp::ListCollections) {
			return backend.list_collections(db_name).await;
		}

		let collection_name = require_str(args, "collectionName")?;
		match self {
			MongoOp::ListDatabases | MongoOp::ListCollections => unreachable!(),
			MongoOp::DropCollection => backend.drop_collection(db_name, collection_name).await,
			MongoOp::CreateIndex => {
				let field_spec = document(args, "fieldSpec")?;
				let options = match optional_object(args, "options")? {
					Some(map) => Some(json_to_document(&Value::Object(map.clone()), "options")?),
					None => None,
				};
				backend
					.create_index(db_name, collection_name, field_spec, options)
					.await
			}
			MongoOp::FindOne => {
				let filter = document(args, "filter")?;
				let options = find_args(args)?;
				backend.find_one(db_name, collection_name, filter, options).await
			}
			MongoOp::FindMany => {
				let filter = document(args, "filter")?;
				let options = find_args(args)?;
				backend.find_many(db_name, collection_name, filter, options).await
			}
			MongoOp::InsertOne => {
				let doc = document(args, "doc")?;
				backend.insert_one(db_name, collection_name, doc).await
			}
			MongoOp::InsertMany => {
				let docs = json_to_documents(require_value(args, "docs")?, "docs")?;
				backend.insert_many(db_name, collection_name, docs).await
			}
			MongoOp::UpdateOne => {
				let filter = document(args, "filter")?;
				let update = document(args, "update")?;
				backend
					.update_one(db_name, collection_name, filter, update)
					.await
			}
			MongoOp::UpdateMany => {
				let filter = document(args, "filter")?;
				let update = document(args, "update")?;
				backend
					.update_many(db_name, collection_name, filter, update)
					.await
			}
			MongoOp::DeleteOne => {
				let filter = document(args, "filter")?;
				backend.delete_one(db_name, collection_name, filter).await
			}
			MongoOp::DeleteMany => {
				let filter = document(args, "filter")?;
				backend.delete_many(db_name, collection_name, filter).await
			}
			MongoOp::Aggregate => {
				let pipeline = json_to_documents(require_value(args, "pipeline")?, "pipeline")?;
				let options = aggregate_args(args)?;
				backend
					.aggregate(db_name, collection_name, pipeline, options)
					.await
			}
		}
	}
}

fn document(args: &Args, field: &'static str) -> Result<Document> {
	json_to_document(require_value(args, field)?, field)
}

fn find_args(args: &Args) -> Result<FindArgs> {
	let Some(options) = optional_object(args, "options")? else {
		return Ok(FindArgs::default());
	};
	let mut parsed = FindArgs::default();
	for (key, value) in options {
		match key.as_str() {
			"sort" => parsed.sort = Some(option_document(value, key)?),
			"projection" => parsed.projection = Some(option_document(value, key)?),
			"limit" => parsed.limit = Some(option_i64(value, key)?),
			"skip" => {
				let skip = option_i64(value, key)?;
				parsed.skip = Some(u64::try_from(skip).map_err(|_| unsupported_value(key))?);
			}
			other => return Err(unsupported_key(other)),
		}
	}
	Ok(parsed)
}

fn aggregate_args(args: &Args) -> Result<AggregateArgs> {
	let Some(options) = optional_object(args, "options")? else {
		return Ok(AggregateArgs::default());
	};
	let mut parsed = AggregateArgs::default();
	for (key, value) in options {
		match key.as_str() {
			"allowDiskUse" => {
				parsed.allow_disk_use =
					Some(value.as_bool().ok_or_else(|| unsupported_value(key))?);
			}
			"batchSize" => {
				let size = option_i64(value, key)?;
				parsed.batch_size =
					Some(u32::try_from(size).map_err(|_| unsupported_value(key))?);
			}
			other => return Err(unsupported_key(other)),
		}
	}
	Ok(parsed)
}

fn option_document(value: &Value, key: &str) -> Result<Document> {
	if !value.is_object() {
		return Err(unsupported_value(key));
	}
	json_to_document(value, "options")
}

fn option_i64(value: &Value, key: &str) -> Result<i64> {
	value.as_i64().ok_or_else(|| unsupported_value(key))
}

fn unsupported_key(key: &str) -> GatewayError {
	GatewayError::invalid_argument("options", format!("contains unsupported key '{key}'."))
}

fn unsupported_value(key: &str) -> GatewayError {
	GatewayError::invalid_argument("options", format!("key '{key}' has an invalid value."))
}

pub(crate) fn operations(backend: &Arc<MongoBackend>, prefix: &str) -> Vec<Operation> {
	let op = |name, description, fields, code| {
		Operation::new(
			prefix,
			name,
			description,
			fields,
			BoundCall::MongoDb(backend.clone(), code),
		)
	};
	let db_name = || FieldSpec::required("dbName", FieldKind::String, "Name of the database");
	let collection_name = || {
		FieldSpec::required(
			"collectionName",
			FieldKind::String,
			"Name of the collection",
		)
	};

	vec![
		op(
			"list_databases",
			"List all databases in MongoDB",
			Vec::new(),
			MongoOp::ListDatabases,
		),
		op(
			"list_collections",
			"List all collections in a specified MongoDB database",
			vec![db_name()],
			MongoOp::ListCollections,
		),
		op(
			"drop_collection",
			"Drop a collection from a specified MongoDB database",
			vec![
				db_name(),
				FieldSpec::required(
					"collectionName",
					FieldKind::String,
					"Name of the collection to drop",
				),
			],
			MongoOp::DropCollection,
		),
		op(
			"create_index",
			"Create an index on a specified MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required(
					"fieldSpec",
					FieldKind::Object,
					"Index field specification (e.g., { field: 1 } for ascending)",
				),
				FieldSpec::optional("options", FieldKind::Object, "Optional index options"),
			],
			MongoOp::CreateIndex,
		),
		op(
			"find_one",
			"Find a single document in a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required(
					"filter",
					FieldKind::Object,
					"Query filter (e.g., { name: 'test' })",
				),
				FieldSpec::optional("options", FieldKind::Object, "Optional find options"),
			],
			MongoOp::FindOne,
		),
		op(
			"find_many",
			"Find multiple documents in a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required(
					"filter",
					FieldKind::Object,
					"Query filter (e.g., { age: { $gt: 30 } })",
				),
				FieldSpec::optional("options", FieldKind::Object, "Optional find options"),
			],
			MongoOp::FindMany,
		),
		op(
			"insert_one",
			"Insert a single document into a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required("doc", FieldKind::Object, "Document to insert"),
			],
			MongoOp::InsertOne,
		),
		op(
			"insert_many",
			"Insert multiple documents into a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required("docs", FieldKind::Array, "Array of documents to insert"),
			],
			MongoOp::InsertMany,
		),
		op(
			"update_one",
			"Update a single document in a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required("filter", FieldKind::Object, "Filter to select the document"),
				FieldSpec::required(
					"update",
					FieldKind::Object,
					"Update operations (e.g., { $set: { status: 'active' } })",
				),
			],
			MongoOp::UpdateOne,
		),
		op(
			"update_many",
			"Update multiple documents in a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required("filter", FieldKind::Object, "Filter to select documents"),
				FieldSpec::required("update", FieldKind::Object, "Update operations"),
			],
			MongoOp::UpdateMany,
		),
		op(
			"delete_one",
			"Delete a single document from a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required(
					"filter",
					FieldKind::Object,
					"Filter to select the document to delete",
				),
			],
			MongoOp::DeleteOne,
		),
		op(
			"delete_many",
			"Delete multiple documents from a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required(
					"filter",
					FieldKind::Object,
					"Filter to select documents to delete",
				),
			],
			MongoOp::DeleteMany,
		),
		op(
			"aggregate",
			"Perform an aggregation pipeline on a MongoDB collection",
			vec![
				db_name(),
				collection_name(),
				FieldSpec::required("pipeline", FieldKind::Array, "Aggregation pipeline stages"),
				FieldSpec::optional("options", FieldKind::Object, "Optional aggregation options"),
			],
			MongoOp::Aggregate,
		),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn bundle(value: Value) -> Args {
		value.as_object().cloned().unwrap_or_default()
	}

	#[rstest]
	fn find_options_accept_the_forwardable_subset() {
		let args = bundle(json!({
			"options": {"sort": {"age": -1}, "projection": {"_id": 0}, "limit": 5, "skip": 2}
		}));
		let parsed = find_args(&args).unwrap();
		assert_eq!(parsed.limit, Some(5));
		assert_eq!(parsed.skip, Some(2));
		assert!(parsed.sort.is_some());
		assert!(parsed.projection.is_some());
	}

	#[rstest]
	fn absent_options_stay_unset() {
		let parsed = find_args(&bundle(json!({}))).unwrap();
		assert!(parsed.sort.is_none());
		assert!(parsed.limit.is_none());
	}

	#[rstest]
	fn unknown_option_keys_are_rejected() {
		let args = bundle(json!({"options": {"hint": "idx"}}));
		let error = find_args(&args).unwrap_err();
		assert_eq!(
			error.to_string(),
			"Argument 'options' contains unsupported key 'hint'."
		);
	}

	#[rstest]
	fn malformed_option_values_are_rejected() {
		let args = bundle(json!({"options": {"limit": "five"}}));
		let error = find_args(&args).unwrap_err();
		assert_eq!(
			error.to_string(),
			"Argument 'options' key 'limit' has an invalid value."
		);
	}

	#[rstest]
	fn aggregate_options_accept_disk_use_and_batch_size() {
		let args = bundle(json!({"options": {"allowDiskUse": true, "batchSize": 100}}));
		let parsed = aggregate_args(&args).unwrap();
		assert_eq!(parsed.allow_disk_use, Some(true));
		assert_eq!(parsed.batch_size, Some(100));
	}
}
