//! End-to-end exercises against live backing services.
//!
//! These tests need real servers listening on the default local ports and
//! are ignored by default. Run them explicitly:
//!
//! ```text
//! cargo test --test live_backends -- --ignored
//! ```

use serde_json::json;
use std::collections::HashMap;

use dbgate::{Gateway, GatewayConfig};

fn config_for(dbs: &str) -> GatewayConfig {
	let mut env: HashMap<String, String> = std::env::vars().collect();
	env.insert("DBS".to_string(), dbs.to_string());
	env.entry("MONGODB_URI".to_string())
		.or_insert_with(|| "mongodb://localhost:27017".to_string());
	GatewayConfig::from_vars(|key| env.get(key).cloned()).unwrap()
}

#[tokio::test]
#[ignore = "requires a running MySQL server on localhost:3306"]
async fn mysql_queries_round_trip_through_the_envelope() {
	let gateway = Gateway::connect(&config_for("mysql")).await.unwrap();
	let dispatcher = gateway.dispatcher();

	let envelope = dispatcher
		.call("execute_query", Some(&json!({"query": "SELECT 1 AS one"})))
		.await;
	assert!(envelope.is_ok(), "{:?}", envelope.message());
	assert_eq!(envelope.payload(), Some(&json!([{"one": 1}])));

	// A SELECT that matches nothing is still a result set, not a summary.
	let envelope = dispatcher
		.call(
			"execute_query",
			Some(&json!({"query": "SELECT 1 AS one FROM DUAL WHERE FALSE"})),
		)
		.await;
	assert_eq!(envelope.payload(), Some(&json!([])));

	// Validation failures come back as envelopes, not transport errors.
	let envelope = dispatcher
		.call("execute_query", Some(&json!({"query": 123})))
		.await;
	assert_eq!(envelope.message(), Some("Argument 'query' must be a string."));

	let envelope = dispatcher.call("unknown_op", None).await;
	assert_eq!(envelope.message(), Some("Unknown tool: unknown_op"));

	gateway.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a running Redis server on localhost:6379"]
async fn redis_set_then_get_returns_the_stored_value() {
	let gateway = Gateway::connect(&config_for("redis")).await.unwrap();
	let dispatcher = gateway.dispatcher();

	let envelope = dispatcher
		.call(
			"set",
			Some(&json!({"key": "dbgate:test:key", "value": "hello", "options": {"EX": 60}})),
		)
		.await;
	assert!(envelope.is_ok(), "{:?}", envelope.message());
	assert_eq!(envelope.payload(), Some(&json!("OK")));

	let envelope = dispatcher
		.call("get", Some(&json!({"key": "dbgate:test:key"})))
		.await;
	assert_eq!(envelope.payload(), Some(&json!("hello")));

	let envelope = dispatcher
		.call("del", Some(&json!({"keys": ["dbgate:test:key"]})))
		.await;
	assert_eq!(envelope.payload(), Some(&json!(1)));

	gateway.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB server on localhost:27017"]
async fn mongodb_insert_then_find_returns_the_document() {
	let gateway = Gateway::connect(&config_for("mongodb")).await.unwrap();
	let dispatcher = gateway.dispatcher();

	let envelope = dispatcher
		.call(
			"insert_one",
			Some(&json!({
				"dbName": "dbgate_test",
				"collectionName": "people",
				"doc": {"name": "ada", "age": 36},
			})),
		)
		.await;
	assert!(envelope.is_ok(), "{:?}", envelope.message());
	assert!(envelope.payload().unwrap().get("insertedId").is_some());

	let envelope = dispatcher
		.call(
			"find_one",
			Some(&json!({
				"dbName": "dbgate_test",
				"collectionName": "people",
				"filter": {"name": "ada"},
			})),
		)
		.await;
	let found = envelope.payload().unwrap();
	assert_eq!(found["name"], json!("ada"));
	assert_eq!(found["age"], json!(36));

	let envelope = dispatcher
		.call(
			"delete_many",
			Some(&json!({
				"dbName": "dbgate_test",
				"collectionName": "people",
				"filter": {"name": "ada"},
			})),
		)
		.await;
	assert!(envelope.payload().unwrap()["deletedCount"].as_i64() >= Some(1));

	gateway.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a running MySQL and Redis server on the default ports"]
async fn multiple_backends_namespace_their_operations() {
	let gateway = Gateway::connect(&config_for("mysql,redis")).await.unwrap();
	let dispatcher = gateway.dispatcher();

	let names: Vec<String> = dispatcher
		.list_operations()
		.iter()
		.map(|tool| tool["name"].as_str().unwrap_or_default().to_string())
		.collect();
	assert!(names.contains(&"mysql_execute_query".to_string()));
	assert!(names.contains(&"redis_get".to_string()));
	assert!(!names.contains(&"execute_query".to_string()));

	// Unprefixed names are unknown when several backends are active.
	let envelope = dispatcher
		.call("execute_query", Some(&json!({"query": "SELECT 1"})))
		.await;
	assert_eq!(envelope.message(), Some("Unknown tool: execute_query"));

	gateway.shutdown().await;
}

#[tokio::test]
#[ignore = "requires a running Redis server on localhost:6379"]
async fn repeated_connects_reuse_one_handle() {
	let config = config_for("redis");
	let backend = dbgate::Backend::create("redis", &config).unwrap();
	backend.connect().await.unwrap();
	backend.connect().await.unwrap();

	let dbgate::Backend::Redis(redis) = &backend else {
		panic!("expected a redis backend");
	};
	redis.get("dbgate:test:absent").await.unwrap();

	backend.disconnect().await;
	backend.disconnect().await;
}
