//! Gateway lifecycle: backend construction, connection and teardown.
//!
//! Construction is two-phase. Unknown backend identifiers abort startup
//! immediately; a known backend whose connection attempt fails is skipped
//! with a logged error and the gateway continues with whatever connected.
//! Only a fully empty result set is fatal.

use std::sync::Arc;

use tracing::{error, info};

use crate::backend::Backend;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::registry::OperationRegistry;

/// The connected gateway: active backends plus their merged registry.
pub struct Gateway {
	backends: Vec<Backend>,
	registry: Arc<OperationRegistry>,
}

impl Gateway {
	/// Build every configured backend, connect each in order, and absorb
	/// the operation sets of the ones that came up.
	pub async fn connect(config: &GatewayConfig) -> Result<Self> {
		let mut backends = Vec::with_capacity(config.backends.len());
		for identifier in &config.backends {
			let backend = Backend::create(identifier, config)?;
			match backend.connect().await {
				Ok(()) => {
					info!(backend = %backend.kind(), "backend connected");
					backends.push(backend);
				}
				Err(err) => {
					error!(backend = %backend.kind(), %err, "backend connection failed, skipping");
				}
			}
		}

		if backends.is_empty() {
			return Err(GatewayError::Connection(
				"no backend could be connected".to_string(),
			));
		}

		let registry = Arc::new(OperationRegistry::build(&backends)?);
		info!(operations = registry.len(), "operation registry built");
		Ok(Self { backends, registry })
	}

	pub fn dispatcher(&self) -> Dispatcher {
		Dispatcher::new(self.registry.clone())
	}

	/// Disconnect every backend in registration order.
	pub async fn shutdown(&self) {
		for backend in &self.backends {
			backend.disconnect().await;
			info!(backend = %backend.kind(), "backend disconnected");
		}
	}
}
