//! MySQL operation table.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::MySqlBackend;
use crate::error::Result;
use crate::registry::{Args, BoundCall, FieldKind, FieldSpec, Operation, require_str};

/// Op-codes for the relational operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MySqlOp {
	ExecuteQuery,
	ShowTables,
	DescribeTable,
	UseDatabase,
	ListDatabases,
	GetSchema,
}

impl MySqlOp {
	pub(crate) async fn invoke(&self, backend: &MySqlBackend, args: &Args) -> Result<Value> {
		match self {
			MySqlOp::ExecuteQuery => backend.execute_query(require_str(args, "query")?).await,
			MySqlOp::ShowTables => backend.show_tables().await,
			MySqlOp::DescribeTable => {
				backend.describe_table(require_str(args, "table_name")?).await
			}
			MySqlOp::UseDatabase => {
				backend.use_database(require_str(args, "database_name")?).await
			}
			MySqlOp::ListDatabases => backend.list_databases().await,
			MySqlOp::GetSchema => backend.get_schema(require_str(args, "table_name")?).await,
		}
	}
}

pub(crate) fn operations(backend: &Arc<MySqlBackend>, prefix: &str) -> Vec<Operation> {
	let op = |name, description, fields, code| {
		Operation::new(
			prefix,
			name,
			description,
			fields,
			BoundCall::MySql(backend.clone(), code),
		)
	};

	vec![
		op(
			"execute_query",
			"Execute SQL query on MySQL database",
			vec![FieldSpec::required(
				"query",
				FieldKind::String,
				"SQL query to execute",
			)],
			MySqlOp::ExecuteQuery,
		),
		op(
			"show_tables",
			"Show all tables in the database",
			Vec::new(),
			MySqlOp::ShowTables,
		),
		op(
			"describe_table",
			"Describe the structure of a table",
			vec![FieldSpec::required(
				"table_name",
				FieldKind::String,
				"Name of the table to describe",
			)],
			MySqlOp::DescribeTable,
		),
		op(
			"use_database",
			"Switch to a different database",
			vec![FieldSpec::required(
				"database_name",
				FieldKind::String,
				"Name of the database to switch to",
			)],
			MySqlOp::UseDatabase,
		),
		op(
			"list_databases",
			"List all databases the current user can see",
			Vec::new(),
			MySqlOp::ListDatabases,
		),
		op(
			"get_schema",
			"Get the CREATE TABLE statement for a specific table",
			vec![FieldSpec::required(
				"table_name",
				FieldKind::String,
				"The name of the table to get the schema for",
			)],
			MySqlOp::GetSchema,
		),
	]
}
