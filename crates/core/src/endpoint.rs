//! Registry of the Builder's control socket address.
//!
//! Sessions take a snapshot of the current [`Endpoint`] when an exchange
//! starts, so updating the registry never affects an exchange that is
//! already in flight.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::config;
use crate::error::CoreError;

/// Default host of a locally running Builder.
pub const DEFAULT_BUILDER_HOST: &str = "127.0.0.1";

/// Default control socket port of the Builder.
pub const DEFAULT_BUILDER_PORT: u16 = 32479;

/// Host and port of a Builder control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BUILDER_HOST, DEFAULT_BUILDER_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Shared, updatable holder of the current Builder endpoint.
///
/// Typically wrapped in an `Arc` and handed to every session.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    current: RwLock<Endpoint>,
}

impl EndpointRegistry {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            current: RwLock::new(endpoint),
        }
    }

    /// Load the endpoint from environment variables with defaults.
    ///
    /// | Env Var        | Default     |
    /// |----------------|-------------|
    /// | `BUILDER_HOST` | `127.0.0.1` |
    /// | `BUILDER_PORT` | `32479`     |
    pub fn from_env() -> Result<Self, CoreError> {
        let host = config::env_or("BUILDER_HOST", DEFAULT_BUILDER_HOST);
        let port = config::env_parse("BUILDER_PORT", DEFAULT_BUILDER_PORT)?;
        Ok(Self::new(Endpoint::new(host, port)))
    }

    /// Snapshot of the endpoint at this instant.
    pub fn current(&self) -> Endpoint {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the endpoint used by exchanges started from now on.
    pub fn set(&self, endpoint: Endpoint) {
        tracing::debug!(endpoint = %endpoint, "Builder endpoint updated");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = endpoint;
    }

    pub fn set_host(&self, host: impl Into<String>) {
        let mut current = self.current();
        current.host = host.into();
        self.set(current);
    }

    pub fn set_port(&self, port: u16) {
        let mut current = self.current();
        current.port = port;
        self.set(current);
    }
}
