//! Redis backend.
//!
//! One shared `ConnectionManager` per process (cheap to clone, safe for
//! concurrent use). Commands that take option bags (`SET`, `ZRANGE`) are
//! assembled through the command builder so the options pass through in
//! the server's own vocabulary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::backend::BackendKind;
use crate::config::RedisConfig;
use crate::error::{GatewayError, Result};

/// Options accepted by `set`, mirroring the native SET modifiers.
#[derive(Debug, Default, PartialEq)]
pub struct SetArgs {
	pub ex: Option<u64>,
	pub px: Option<u64>,
	pub keep_ttl: bool,
	pub nx: bool,
	pub xx: bool,
	pub get: bool,
}

/// Options accepted by `zrange`, mirroring the native ZRANGE modifiers.
#[derive(Debug, Default, PartialEq)]
pub struct ZRangeArgs {
	pub by: Option<ZRangeBy>,
	pub rev: bool,
	pub with_scores: bool,
	pub limit: Option<(i64, i64)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ZRangeBy {
	Score,
	Lex,
}

/// A sorted-set member paired with its score.
#[derive(Debug, PartialEq)]
pub struct ScoredMember {
	pub score: f64,
	pub value: String,
}

/// Either end of a ZRANGE interval, an index or a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
	Number(i64),
	Float(f64),
}

impl redis::ToRedisArgs for RangeBound {
	fn write_redis_args<W: ?Sized + redis::RedisWrite>(&self, out: &mut W) {
		match self {
			RangeBound::Number(n) => n.write_redis_args(out),
			RangeBound::Float(f) => f.write_redis_args(out),
		}
	}
}

/// Key-value backend over Redis.
pub struct RedisBackend {
	config: RedisConfig,
	manager: OnceCell<ConnectionManager>,
	closed: AtomicBool,
}

impl RedisBackend {
	pub fn new(config: RedisConfig) -> Self {
		Self {
			config,
			manager: OnceCell::new(),
			closed: AtomicBool::new(false),
		}
	}

	/// Establish the managed connection. Idempotent before a disconnect.
	pub async fn connect(&self) -> Result<()> {
		self.manager
			.get_or_try_init(|| async {
				let client = redis::Client::open(self.config.url())
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				let manager = client
					.get_connection_manager()
					.await
					.map_err(|e| GatewayError::Connection(e.to_string()))?;
				tracing::info!("Redis connection established");
				Ok(manager)
			})
			.await?;
		Ok(())
	}

	/// Drop the managed connection. Idempotent when never connected.
	pub async fn disconnect(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if self.manager.get().is_some() {
			tracing::info!("disconnected from Redis");
		}
	}

	fn connection(&self) -> Result<ConnectionManager> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(GatewayError::NotConnected(BackendKind::Redis));
		}
		self.manager
			.get()
			.cloned()
			.ok_or(GatewayError::NotConnected(BackendKind::Redis))
	}

	// String operations

	pub async fn get(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: Option<String> = conn.get(key).await.map_err(GatewayError::backend)?;
		Ok(value.map(Value::String).unwrap_or(Value::Null))
	}

	pub async fn set(&self, key: &str, value: &str, options: SetArgs) -> Result<Value> {
		let mut conn = self.connection()?;
		let mut cmd = redis::cmd("SET");
		cmd.arg(key).arg(value);
		if let Some(seconds) = options.ex {
			cmd.arg("EX").arg(seconds);
		}
		if let Some(millis) = options.px {
			cmd.arg("PX").arg(millis);
		}
		if options.keep_ttl {
			cmd.arg("KEEPTTL");
		}
		if options.nx {
			cmd.arg("NX");
		}
		if options.xx {
			cmd.arg("XX");
		}
		if options.get {
			cmd.arg("GET");
		}
		let reply: Option<String> = cmd
			.query_async(&mut conn)
			.await
			.map_err(GatewayError::backend)?;
		Ok(reply.map(Value::String).unwrap_or(Value::Null))
	}

	pub async fn del(&self, keys: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let removed: i64 = conn.del(keys).await.map_err(GatewayError::backend)?;
		Ok(json!(removed))
	}

	pub async fn incr(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: i64 = conn.incr(key, 1).await.map_err(GatewayError::backend)?;
		Ok(json!(value))
	}

	pub async fn decr(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: i64 = conn.decr(key, 1).await.map_err(GatewayError::backend)?;
		Ok(json!(value))
	}

	// Hash operations

	pub async fn hget(&self, key: &str, field: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: Option<String> = conn.hget(key, field).await.map_err(GatewayError::backend)?;
		Ok(value.map(Value::String).unwrap_or(Value::Null))
	}

	pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let added: i64 = conn
			.hset(key, field, value)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(added))
	}

	pub async fn hgetall(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let entries: HashMap<String, String> =
			conn.hgetall(key).await.map_err(GatewayError::backend)?;
		Ok(json!(entries))
	}

	pub async fn hdel(&self, key: &str, fields: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let removed: i64 = conn.hdel(key, fields).await.map_err(GatewayError::backend)?;
		Ok(json!(removed))
	}

	// List operations

	pub async fn lpush(&self, key: &str, elements: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let length: i64 = conn
			.lpush(key, elements)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(length))
	}

	pub async fn rpush(&self, key: &str, elements: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let length: i64 = conn
			.rpush(key, elements)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(length))
	}

	pub async fn lpop(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: Option<String> = conn.lpop(key, None).await.map_err(GatewayError::backend)?;
		Ok(value.map(Value::String).unwrap_or(Value::Null))
	}

	pub async fn rpop(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let value: Option<String> = conn.rpop(key, None).await.map_err(GatewayError::backend)?;
		Ok(value.map(Value::String).unwrap_or(Value::Null))
	}

	pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Value> {
		let mut conn = self.connection()?;
		let elements: Vec<String> = conn
			.lrange(key, start as isize, stop as isize)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(elements))
	}

	// Set operations

	pub async fn sadd(&self, key: &str, members: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let added: i64 = conn.sadd(key, members).await.map_err(GatewayError::backend)?;
		Ok(json!(added))
	}

	pub async fn srem(&self, key: &str, members: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let removed: i64 = conn.srem(key, members).await.map_err(GatewayError::backend)?;
		Ok(json!(removed))
	}

	pub async fn smembers(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let members: Vec<String> = conn.smembers(key).await.map_err(GatewayError::backend)?;
		Ok(json!(members))
	}

	pub async fn sismember(&self, key: &str, member: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let is_member: i64 = conn
			.sismember(key, member)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(is_member))
	}

	// Sorted-set operations

	pub async fn zadd(&self, key: &str, members: Vec<ScoredMember>) -> Result<Value> {
		let mut conn = self.connection()?;
		let items: Vec<(f64, String)> = members
			.into_iter()
			.map(|member| (member.score, member.value))
			.collect();
		let added: i64 = conn
			.zadd_multiple(key, &items)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(added))
	}

	pub async fn zrange(
		&self,
		key: &str,
		min: RangeBound,
		max: RangeBound,
		options: ZRangeArgs,
	) -> Result<Value> {
		let mut conn = self.connection()?;
		let mut cmd = redis::cmd("ZRANGE");
		cmd.arg(key).arg(min).arg(max);
		match options.by {
			Some(ZRangeBy::Score) => {
				cmd.arg("BYSCORE");
			}
			Some(ZRangeBy::Lex) => {
				cmd.arg("BYLEX");
			}
			None => {}
		}
		if options.rev {
			cmd.arg("REV");
		}
		if let Some((offset, count)) = options.limit {
			cmd.arg("LIMIT").arg(offset).arg(count);
		}
		if options.with_scores {
			cmd.arg("WITHSCORES");
		}
		let members: Vec<String> = cmd
			.query_async(&mut conn)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(members))
	}

	pub async fn zrem(&self, key: &str, members: Vec<String>) -> Result<Value> {
		let mut conn = self.connection()?;
		let removed: i64 = conn.zrem(key, members).await.map_err(GatewayError::backend)?;
		Ok(json!(removed))
	}

	// General operations

	pub async fn keys(&self, pattern: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let keys: Vec<String> = conn.keys(pattern).await.map_err(GatewayError::backend)?;
		Ok(json!(keys))
	}

	pub async fn expire(&self, key: &str, seconds: i64) -> Result<Value> {
		let mut conn = self.connection()?;
		let applied: i64 = conn
			.expire(key, seconds)
			.await
			.map_err(GatewayError::backend)?;
		Ok(json!(applied))
	}

	pub async fn ttl(&self, key: &str) -> Result<Value> {
		let mut conn = self.connection()?;
		let remaining: i64 = conn.ttl(key).await.map_err(GatewayError::backend)?;
		Ok(json!(remaining))
	}

	pub async fn flushdb(&self) -> Result<Value> {
		let mut conn = self.connection()?;
		let status: String = redis::cmd("FLUSHDB")
			.query_async(&mut conn)
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::String(status))
	}

	pub async fn flushall(&self) -> Result<Value> {
		let mut conn = self.connection()?;
		let status: String = redis::cmd("FLUSHALL")
			.query_async(&mut conn)
			.await
			.map_err(GatewayError::backend)?;
		Ok(Value::String(status))
	}
}
