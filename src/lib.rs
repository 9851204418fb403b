//! Protocol gateway exposing MySQL, MongoDB and Redis over one uniform
//! operation surface.
//!
//! The gateway connects the backends named in its configuration, merges
//! their operation sets into a single validated registry, and serves a
//! line-delimited JSON protocol over stdio. Every call returns the same
//! envelope shape: `{ ok: true, payload }` on success, `{ ok: false,
//! message }` on any failure.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod server;

pub use backend::{Backend, BackendKind};
pub use config::GatewayConfig;
pub use dispatch::Dispatcher;
pub use envelope::Envelope;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
