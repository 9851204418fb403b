use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dbgate::{Gateway, GatewayConfig, server};

#[tokio::main]
async fn main() {
	// Stdout carries the protocol, so diagnostics go to stderr.
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	let config = match GatewayConfig::from_env() {
		Ok(config) => config,
		Err(err) => {
			error!(%err, "invalid configuration");
			std::process::exit(1);
		}
	};

	let gateway = match Gateway::connect(&config).await {
		Ok(gateway) => gateway,
		Err(err) => {
			error!(%err, "startup failed");
			std::process::exit(1);
		}
	};

	if let Err(err) = server::serve(&gateway).await {
		error!(%err, "server error");
		std::process::exit(1);
	}
}
