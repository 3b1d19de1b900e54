//! `wise-builder-check` -- connectivity probe for a WISE Builder.
//!
//! Connects to the Builder control socket, requests the job defaults and
//! logs every entry. Exits non-zero when the Builder cannot be reached.
//!
//! # Environment variables
//!
//! | Variable       | Required | Default     | Description                  |
//! |----------------|----------|-------------|------------------------------|
//! | `BUILDER_HOST` | no       | `127.0.0.1` | Builder control socket host  |
//! | `BUILDER_PORT` | no       | `32479`     | Builder control socket port  |
//! | `RUST_LOG`     | no       | `wise_builder=info` | Log filter           |

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wise_builder::BuilderClient;
use wise_core::EndpointRegistry;

#[tokio::main]
async fn main() {
    wise_core::config::load_dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wise_builder=info,wise_builder_check=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = match EndpointRegistry::from_env() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!(error = %e, "Invalid Builder configuration");
            std::process::exit(2);
        }
    };

    let endpoint = registry.current();
    tracing::info!(endpoint = %endpoint, "Requesting job defaults from Builder");

    let client = BuilderClient::new(registry);
    match client.job_defaults().await {
        Ok(Some(defaults)) => {
            tracing::info!(count = defaults.len(), "Builder reachable");
            for (key, value) in &defaults.entries {
                tracing::info!(key = %key, value = %value, "Job default");
            }
        }
        Ok(None) => {
            tracing::warn!("Builder answered, but the job defaults could not be read");
        }
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %e, "Builder check failed");
            std::process::exit(1);
        }
    }
}
