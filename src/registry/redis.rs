//! Redis operation table.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::RedisBackend;
use crate::backend::redis::{RangeBound, ScoredMember, SetArgs, ZRangeArgs, ZRangeBy};
use crate::error::{GatewayError, Result};
use crate::registry::{
	Args, BoundCall, FieldKind, FieldSpec, Operation, optional_object, require_array,
	require_i64, require_str, require_string_array, require_value,
};

/// Op-codes for the key-value operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RedisOp {
	Get,
	Set,
	Del,
	Incr,
	Decr,
	HGet,
	HSet,
	HGetAll,
	HDel,
	LPush,
	RPush,
	LPop,
	RPop,
	LRange,
	SAdd,
	SRem,
	SMembers,
	SIsMember,
	ZAdd,
	ZRange,
	ZRem,
	Keys,
	Expire,
	Ttl,
	FlushDb,
	FlushAll,
}

impl RedisOp {
	pub(crate) async fn invoke(&self, backend: &RedisBackend, args: &Args) -> Result<Value> {
		match self {
			RedisOp::Get => backend.get(require_str(args, "key")?).await,
			RedisOp::Set => {
				backend
					.set(
						require_str(args, "key")?,
						require_str(args, "value")?,
						set_args(args)?,
					)
					.await
			}
			RedisOp::Del => backend.del(require_string_array(args, "keys")?).await,
			RedisOp::Incr => backend.incr(require_str(args, "key")?).await,
			RedisOp::Decr => backend.decr(require_str(args, "key")?).await,
			RedisOp::HGet => {
				backend
					.hget(require_str(args, "key")?, require_str(args, "field")?)
					.await
			}
			RedisOp::HSet => {
				backend
					.hset(
						require_str(args, "key")?,
						require_str(args, "field")?,
						require_str(args, "value")?,
					)
					.await
			}
			RedisOp::HGetAll => backend.hgetall(require_str(args, "key")?).await,
			RedisOp::HDel => {
				backend
					.hdel(
						require_str(args, "key")?,
						require_string_array(args, "fields")?,
					)
					.await
			}
			RedisOp::LPush => {
				backend
					.lpush(
						require_str(args, "key")?,
						require_string_array(args, "elements")?,
					)
					.await
			}
			RedisOp::RPush => {
				backend
					.rpush(
						require_str(args, "key")?,
						require_string_array(args, "elements")?,
					)
					.await
			}
			RedisOp::LPop => backend.lpop(require_str(args, "key")?).await,
			RedisOp::RPop => backend.rpop(require_str(args, "key")?).await,
			RedisOp::LRange => {
				backend
					.lrange(
						require_str(args, "key")?,
						require_i64(args, "start")?,
						require_i64(args, "stop")?,
					)
					.await
			}
			RedisOp::SAdd => {
				backend
					.sadd(
						require_str(args, "key")?,
						require_string_array(args, "members")?,
					)
					.await
			}
			RedisOp::SRem => {
				backend
					.srem(
						require_str(args, "key")?,
						require_string_array(args, "members")?,
					)
					.await
			}
			RedisOp::SMembers => backend.smembers(require_str(args, "key")?).await,
			RedisOp::SIsMember => {
				backend
					.sismember(require_str(args, "key")?, require_str(args, "member")?)
					.await
			}
			RedisOp::ZAdd => {
				backend
					.zadd(require_str(args, "key")?, scored_members(args)?)
					.await
			}
			RedisOp::ZRange => {
				backend
					.zrange(
						require_str(args, "key")?,
						range_bound(args, "min")?,
						range_bound(args, "max")?,
						zrange_args(args)?,
					)
					.await
			}
			RedisOp::ZRem => {
				backend
					.zrem(
						require_str(args, "key")?,
						require_string_array(args, "members")?,
					)
					.await
			}
			RedisOp::Keys => backend.keys(require_str(args, "pattern")?).await,
			RedisOp::Expire => {
				backend
					.expire(require_str(args, "key")?, require_i64(args, "seconds")?)
					.await
			}
			RedisOp::Ttl => backend.ttl(require_str(args, "key")?).await,
			RedisOp::FlushDb => backend.flushdb().await,
			RedisOp::FlushAll => backend.flushall().await,
		}
	}
}

fn set_args(args: &Args) -> Result<SetArgs> {
	let Some(options) = optional_object(args, "options")? else {
		return Ok(SetArgs::default());
	};
	let mut parsed = SetArgs::default();
	for (key, value) in options {
		match key.as_str() {
			"EX" => parsed.ex = Some(option_u64(value, key)?),
			"PX" => parsed.px = Some(option_u64(value, key)?),
			"KEEPTTL" => parsed.keep_ttl = option_bool(value, key)?,
			"NX" => parsed.nx = option_bool(value, key)?,
			"XX" => parsed.xx = option_bool(value, key)?,
			"GET" => parsed.get = option_bool(value, key)?,
			other => return Err(unsupported_key(other)),
		}
	}
	Ok(parsed)
}

fn zrange_args(args: &Args) -> Result<ZRangeArgs> {
	let Some(options) = optional_object(args, "options")? else {
		return Ok(ZRangeArgs::default());
	};
	let mut parsed = ZRangeArgs::default();
	for (key, value) in options {
		match key.as_str() {
			"BY" => {
				parsed.by = match value.as_str() {
					Some("SCORE") => Some(ZRangeBy::Score),
					Some("LEX") => Some(ZRangeBy::Lex),
					_ => return Err(invalid_value(key)),
				};
			}
			"REV" => parsed.rev = option_bool(value, key)?,
			"WITHSCORES" => parsed.with_scores = option_bool(value, key)?,
			"LIMIT" => {
				let limit = value.as_object().ok_or_else(|| invalid_value(key))?;
				let offset = limit
					.get("offset")
					.and_then(Value::as_i64)
					.ok_or_else(|| invalid_value(key))?;
				let count = limit
					.get("count")
					.and_then(Value::as_i64)
					.ok_or_else(|| invalid_value(key))?;
				parsed.limit = Some((offset, count));
			}
			other => return Err(unsupported_key(other)),
		}
	}
	Ok(parsed)
}

fn scored_members(args: &Args) -> Result<Vec<ScoredMember>> {
	require_array(args, "members")?
		.iter()
		.map(|item| {
			let entry = item.as_object().ok_or_else(member_shape)?;
			let score = entry
				.get("score")
				.and_then(Value::as_f64)
				.ok_or_else(member_shape)?;
			let value = entry
				.get("value")
				.and_then(Value::as_str)
				.ok_or_else(member_shape)?;
			Ok(ScoredMember {
				score,
				value: value.to_string(),
			})
		})
		.collect()
}

fn range_bound(args: &Args, field: &'static str) -> Result<RangeBound> {
	let value = require_value(args, field)?;
	if let Some(n) = value.as_i64() {
		Ok(RangeBound::Number(n))
	} else if let Some(f) = value.as_f64() {
		Ok(RangeBound::Float(f))
	} else {
		Err(GatewayError::invalid_argument(field, "must be a number."))
	}
}

fn option_u64(value: &Value, key: &str) -> Result<u64> {
	value.as_u64().ok_or_else(|| invalid_value(key))
}

fn option_bool(value: &Value, key: &str) -> Result<bool> {
	value.as_bool().ok_or_else(|| invalid_value(key))
}

fn member_shape() -> GatewayError {
	GatewayError::invalid_argument(
		"members",
		"must be an array of { score, value } objects.",
	)
}

fn unsupported_key(key: &str) -> GatewayError {
	GatewayError::invalid_argument("options", format!("contains unsupported key '{key}'."))
}

fn invalid_value(key: &str) -> GatewayError {
	GatewayError::invalid_argument("options", format!("key '{key}' has an invalid value."))
}

pub(crate) fn operations(backend: &Arc<RedisBackend>, prefix: &str) -> Vec<Operation> {
	let op = |name, description, fields, code| {
		Operation::new(
			prefix,
			name,
			description,
			fields,
			BoundCall::Redis(backend.clone(), code),
		)
	};

	vec![
		// String operations
		op(
			"get",
			"Get the value of a string key in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The key to retrieve")],
			RedisOp::Get,
		),
		op(
			"set",
			"Set the string value of a key in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The key to set"),
				FieldSpec::required("value", FieldKind::String, "The value to set"),
				FieldSpec::optional(
					"options",
					FieldKind::Object,
					"Optional SET options (e.g., EX, PX, NX, XX)",
				),
			],
			RedisOp::Set,
		),
		op(
			"del",
			"Delete one or more keys from Redis",
			vec![FieldSpec::required("keys", FieldKind::Array, "Keys to delete")],
			RedisOp::Del,
		),
		op(
			"incr",
			"Increment the integer value of a key by one in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The key to increment")],
			RedisOp::Incr,
		),
		op(
			"decr",
			"Decrement the integer value of a key by one in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The key to decrement")],
			RedisOp::Decr,
		),
		// Hash operations
		op(
			"hget",
			"Get the value of a hash field in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The hash key"),
				FieldSpec::required("field", FieldKind::String, "The field to retrieve"),
			],
			RedisOp::HGet,
		),
		op(
			"hset",
			"Set the string value of a hash field in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The hash key"),
				FieldSpec::required("field", FieldKind::String, "The field to set"),
				FieldSpec::required("value", FieldKind::String, "The value to set"),
			],
			RedisOp::HSet,
		),
		op(
			"hgetall",
			"Get all fields and values of a hash in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The hash key")],
			RedisOp::HGetAll,
		),
		op(
			"hdel",
			"Delete one or more hash fields from Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The hash key"),
				FieldSpec::required("fields", FieldKind::Array, "Fields to delete"),
			],
			RedisOp::HDel,
		),
		// List operations
		op(
			"lpush",
			"Prepend one or multiple values to a list in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The list key"),
				FieldSpec::required("elements", FieldKind::Array, "Elements to prepend"),
			],
			RedisOp::LPush,
		),
		op(
			"rpush",
			"Append one or multiple values to a list in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The list key"),
				FieldSpec::required("elements", FieldKind::Array, "Elements to append"),
			],
			RedisOp::RPush,
		),
		op(
			"lpop",
			"Remove and return the first element of a list in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The list key")],
			RedisOp::LPop,
		),
		op(
			"rpop",
			"Remove and return the last element of a list in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The list key")],
			RedisOp::RPop,
		),
		op(
			"lrange",
			"Get a range of elements from a list in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The list key"),
				FieldSpec::required("start", FieldKind::Number, "Start index"),
				FieldSpec::required("stop", FieldKind::Number, "Stop index"),
			],
			RedisOp::LRange,
		),
		// Set operations
		op(
			"sadd",
			"Add one or more members to a set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The set key"),
				FieldSpec::required("members", FieldKind::Array, "Members to add"),
			],
			RedisOp::SAdd,
		),
		op(
			"srem",
			"Remove one or more members from a set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The set key"),
				FieldSpec::required("members", FieldKind::Array, "Members to remove"),
			],
			RedisOp::SRem,
		),
		op(
			"smembers",
			"Get all members of a set in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The set key")],
			RedisOp::SMembers,
		),
		op(
			"sismember",
			"Check if a member is a member of a set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The set key"),
				FieldSpec::required("member", FieldKind::String, "The member to check"),
			],
			RedisOp::SIsMember,
		),
		// Sorted-set operations
		op(
			"zadd",
			"Add one or more members to a sorted set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The sorted set key"),
				FieldSpec::required(
					"members",
					FieldKind::Array,
					"Members to add with their scores",
				),
			],
			RedisOp::ZAdd,
		),
		op(
			"zrange",
			"Get a range of members from a sorted set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The sorted set key"),
				FieldSpec::required("min", FieldKind::Number, "Start index or score"),
				FieldSpec::required("max", FieldKind::Number, "Stop index or score"),
				FieldSpec::optional(
					"options",
					FieldKind::Object,
					"Optional ZRANGE options (e.g., BY, REV, WITHSCORES, LIMIT)",
				),
			],
			RedisOp::ZRange,
		),
		op(
			"zrem",
			"Remove one or more members from a sorted set in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The sorted set key"),
				FieldSpec::required("members", FieldKind::Array, "Members to remove"),
			],
			RedisOp::ZRem,
		),
		// General operations
		op(
			"keys",
			"Find all keys matching the given pattern in Redis",
			vec![FieldSpec::required("pattern", FieldKind::String, "The key pattern")],
			RedisOp::Keys,
		),
		op(
			"expire",
			"Set a key's time to live in seconds in Redis",
			vec![
				FieldSpec::required("key", FieldKind::String, "The key to set TTL for"),
				FieldSpec::required("seconds", FieldKind::Number, "Time to live in seconds"),
			],
			RedisOp::Expire,
		),
		op(
			"ttl",
			"Get the time to live for a key in Redis",
			vec![FieldSpec::required("key", FieldKind::String, "The key to check TTL for")],
			RedisOp::Ttl,
		),
		op(
			"flushdb",
			"Delete all keys of the currently selected Redis database",
			Vec::new(),
			RedisOp::FlushDb,
		),
		op(
			"flushall",
			"Delete all keys of all Redis databases",
			Vec::new(),
			RedisOp::FlushAll,
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
	fn set_options_map_onto_native_modifiers() {
		let args = bundle(json!({"options": {"EX": 60, "NX": true, "GET": true}}));
		let parsed = set_args(&args).unwrap();
		assert_eq!(
			parsed,
			SetArgs {
				ex: Some(60),
				nx: true,
				get: true,
				..SetArgs::default()
			}
		);
	}

	#[rstest]
	fn unknown_set_options_are_rejected() {
		let args = bundle(json!({"options": {"EXAT": 1}}));
		let error = set_args(&args).unwrap_err();
		assert_eq!(
			error.to_string(),
			"Argument 'options' contains unsupported key 'EXAT'."
		);
	}

	#[rstest]
	fn zrange_options_map_onto_native_modifiers() {
		let args = bundle(json!({
			"options": {"BY": "SCORE", "REV": true, "WITHSCORES": true, "LIMIT": {"offset": 0, "count": 10}}
		}));
		let parsed = zrange_args(&args).unwrap();
		assert_eq!(
			parsed,
			ZRangeArgs {
				by: Some(ZRangeBy::Score),
				rev: true,
				with_scores: true,
				limit: Some((0, 10)),
			}
		);
	}

	#[rstest]
	fn scored_members_require_score_and_value() {
		let args = bundle(json!({"members": [{"score": 1.5, "value": "a"}]}));
		let parsed = scored_members(&args).unwrap();
		assert_eq!(
			parsed,
			vec![ScoredMember {
				score: 1.5,
				value: "a".to_string()
			}]
		);

		let args = bundle(json!({"members": [{"score": "high", "value": "a"}]}));
		let error = scored_members(&args).unwrap_err();
		assert_eq!(
			error.to_string(),
			"Argument 'members' must be an array of { score, value } objects."
		);
	}

	#[rstest]
	fn range_bounds_accept_indexes_and_scores_only() {
		let args = bundle(json!({"min": 0, "max": 1.5, "lexical": "(b"}));
		assert_eq!(range_bound(&args, "min").unwrap(), RangeBound::Number(0));
		assert_eq!(range_bound(&args, "max").unwrap(), RangeBound::Float(1.5));
		// String bounds are rejected, matching the declared number schema.
		let error = range_bound(&args, "lexical").unwrap_err();
		assert_eq!(error.to_string(), "Argument 'lexical' must be a number.");
	}
}
