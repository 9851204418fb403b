//! Line-delimited JSON protocol over stdin/stdout.
//!
//! One request object per line; each request is dispatched on its own task
//! so a slow backend call never blocks the read loop. Responses are
//! funneled through a single writer task, one line per response. On
//! SIGINT/SIGTERM the loop stops reading, in-flight requests drain, and
//! the gateway disconnects its backends before the process exits.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::gateway::Gateway;

#[derive(Debug, Deserialize)]
struct Request {
	#[serde(default)]
	id: Value,
	method: String,
	#[serde(default)]
	params: Option<Params>,
}

#[derive(Debug, Default, Deserialize)]
struct Params {
	#[serde(default)]
	name: String,
	#[serde(default)]
	arguments: Option<Value>,
}

/// Run the request loop until stdin closes or a shutdown signal arrives.
pub async fn serve(gateway: &Gateway) -> Result<()> {
	let dispatcher = gateway.dispatcher();

	let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Value>();
	let writer = tokio::spawn(async move {
		let mut stdout = tokio::io::stdout();
		while let Some(response) = response_rx.recv().await {
			let mut line = response.to_string();
			line.push('\n');
			if let Err(err) = stdout.write_all(line.as_bytes()).await {
				error!(%err, "failed to write response");
				break;
			}
			if let Err(err) = stdout.flush().await {
				error!(%err, "failed to flush stdout");
				break;
			}
		}
	});

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut in_flight = JoinSet::new();
	let shutdown = shutdown_signal();
	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			line = lines.next_line() => match line {
				Ok(Some(line)) => {
					if line.trim().is_empty() {
						continue;
					}
					handle_line(line, &dispatcher, &response_tx, &mut in_flight);
				}
				Ok(None) => {
					info!("stdin closed, shutting down");
					break;
				}
				Err(err) => {
					error!(%err, "failed to read request line");
					break;
				}
			},
			() = &mut shutdown => {
				info!("shutdown signal received");
				break;
			}
		}
	}

	// Let in-flight requests finish before tearing the backends down.
	while let Some(joined) = in_flight.join_next().await {
		if let Err(err) = joined {
			warn!(%err, "request task failed");
		}
	}
	drop(response_tx);
	if let Err(err) = writer.await {
		warn!(%err, "writer task failed");
	}

	gateway.shutdown().await;
	Ok(())
}

fn handle_line(
	line: String,
	dispatcher: &Dispatcher,
	response_tx: &mpsc::UnboundedSender<Value>,
	in_flight: &mut JoinSet<()>,
) {
	let request: Request = match serde_json::from_str(&line) {
		Ok(request) => request,
		Err(err) => {
			debug!(%err, "malformed request line");
			let _ = response_tx.send(json!({
				"id": null,
				"error": format!("Invalid request: {err}"),
			}));
			return;
		}
	};

	let dispatcher = dispatcher.clone();
	let response_tx = response_tx.clone();
	in_flight.spawn(async move {
		let response = respond(&dispatcher, request).await;
		let _ = response_tx.send(response);
	});
}

async fn respond(dispatcher: &Dispatcher, request: Request) -> Value {
	match request.method.as_str() {
		"list_tools" => json!({
			"id": request.id,
			"result": {"tools": dispatcher.list_operations()},
		}),
		"call_tool" => {
			let params = request.params.unwrap_or_default();
			let envelope = dispatcher
				.call(&params.name, params.arguments.as_ref())
				.await;
			json!({"id": request.id, "result": envelope})
		}
		other => json!({
			"id": request.id,
			"error": format!("Unknown method: {other}"),
		}),
	}
}

async fn shutdown_signal() {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};
		let mut terminate = match signal(SignalKind::terminate()) {
			Ok(terminate) => terminate,
			Err(err) => {
				warn!(%err, "failed to install SIGTERM handler");
				let _ = ctrl_c.await;
				return;
			}
		};
		tokio::select! {
			_ = ctrl_c => {}
			_ = terminate.recv() => {}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = ctrl_c.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use std::sync::Arc;

	use crate::registry::{BoundCall, FieldKind, FieldSpec, Operation, OperationRegistry, StubCall};

	fn dispatcher() -> Dispatcher {
		let operations = vec![Operation::new(
			"",
			"execute_query",
			"Execute SQL query on MySQL database",
			vec![FieldSpec::required(
				"query",
				FieldKind::String,
				"SQL query to execute",
			)],
			BoundCall::Stub(StubCall::ok(json!([{"id": 1}]))),
		)];
		Dispatcher::new(Arc::new(
			OperationRegistry::from_operations(operations).unwrap(),
		))
	}

	#[rstest]
	#[tokio::test]
	async fn list_tools_echoes_the_request_id() {
		let request: Request =
			serde_json::from_str(r#"{"id": 7, "method": "list_tools"}"#).unwrap();
		let response = respond(&dispatcher(), request).await;
		assert_eq!(response["id"], json!(7));
		assert_eq!(response["result"]["tools"][0]["name"], "execute_query");
	}

	#[rstest]
	#[tokio::test]
	async fn call_tool_wraps_the_envelope_in_result() {
		let request: Request = serde_json::from_str(
			r#"{"id": "a", "method": "call_tool", "params": {"name": "execute_query", "arguments": {"query": "SELECT 1"}}}"#,
		)
		.unwrap();
		let response = respond(&dispatcher(), request).await;
		assert_eq!(
			response["result"],
			json!({"ok": true, "payload": [{"id": 1}]})
		);
	}

	#[rstest]
	#[tokio::test]
	async fn call_tool_without_params_reports_unknown_tool() {
		let request: Request =
			serde_json::from_str(r#"{"id": 1, "method": "call_tool"}"#).unwrap();
		let response = respond(&dispatcher(), request).await;
		assert_eq!(response["result"]["ok"], json!(false));
		assert_eq!(response["result"]["message"], json!("Unknown tool: "));
	}

	#[rstest]
	#[tokio::test]
	async fn unknown_methods_are_reported_without_terminating() {
		let request: Request =
			serde_json::from_str(r#"{"id": 2, "method": "shutdown"}"#).unwrap();
		let response = respond(&dispatcher(), request).await;
		assert_eq!(response["error"], json!("Unknown method: shutdown"));
	}

	#[rstest]
	fn malformed_lines_yield_a_null_id_error() {
		let dispatcher = dispatcher();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut in_flight = JoinSet::new();
		handle_line("not json".to_string(), &dispatcher, &tx, &mut in_flight);
		let response = rx.try_recv().unwrap();
		assert_eq!(response["id"], Value::Null);
		assert!(
			response["error"]
				.as_str()
				.unwrap()
				.starts_with("Invalid request:")
		);
		assert!(in_flight.is_empty());
	}
}
