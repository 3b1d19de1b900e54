//! Broker transport seam.
//!
//! The SDK does not ship a network broker client. Applications plug one
//! in by implementing [`BrokerConnector`] and [`BrokerConnection`]; the
//! in-process [`MemoryBroker`](crate::memory::MemoryBroker) implements
//! both for tests and embedding.

use async_trait::async_trait;
use wise_core::config;
use wise_core::CoreError;

/// Default broker host.
pub const DEFAULT_BROKER_HOST: &str = "127.0.0.1";

/// Default broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Default first topic segment.
pub const DEFAULT_BASE_TOPIC: &str = "wise";

/// Delivery guarantee requested for a subscription or publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// How to reach the broker and which topic tree to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    /// First segment of every topic.
    pub base_topic: String,
    /// Identifies this client on the broker and in management topics.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionOptions {
    /// Options with a freshly generated client id and no credentials.
    pub fn new(host: impl Into<String>, port: u16, base_topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            base_topic: base_topic.into(),
            client_id: uuid::Uuid::new_v4().to_string(),
            username: None,
            password: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Load options from environment variables with defaults.
    ///
    /// | Env Var            | Default          |
    /// |--------------------|------------------|
    /// | `BROKER_HOST`      | `127.0.0.1`      |
    /// | `BROKER_PORT`      | `1883`           |
    /// | `BROKER_TOPIC`     | `wise`           |
    /// | `BROKER_CLIENT_ID` | random UUID v4   |
    /// | `BROKER_USERNAME`  | unset            |
    /// | `BROKER_PASSWORD`  | unset            |
    pub fn from_env() -> Result<Self, CoreError> {
        let host = config::env_or("BROKER_HOST", DEFAULT_BROKER_HOST);
        let port = config::env_parse("BROKER_PORT", DEFAULT_BROKER_PORT)?;
        let base_topic = config::env_or("BROKER_TOPIC", DEFAULT_BASE_TOPIC);

        let mut options = Self::new(host, port, base_topic);
        if let Some(client_id) = config::env_opt("BROKER_CLIENT_ID") {
            options.client_id = client_id;
        }
        options.username = config::env_opt("BROKER_USERNAME");
        options.password = config::env_opt("BROKER_PASSWORD");
        Ok(options)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_BASE_TOPIC)
    }
}

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Opens broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// One open broker connection.
#[async_trait]
pub trait BrokerConnection: Send {
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), BrokerError>;

    /// Publish and wait for the broker's acknowledgement.
    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), BrokerError>;

    /// Next inbound message, or `Ok(None)` once the connection has closed.
    ///
    /// Must be cancel safe: dropping the future before it completes must
    /// not lose a message.
    async fn recv(&mut self) -> Result<Option<InboundMessage>, BrokerError>;

    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

/// Errors raised by broker transports.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Could not open a connection to the broker.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// The broker refused or failed a subscription.
    #[error("Subscribe to {filter} failed: {reason}")]
    Subscribe { filter: String, reason: String },

    /// The broker refused or failed a publish.
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The connection is no longer usable.
    #[error("Broker connection closed")]
    Closed,

    /// A management command could not be encoded.
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_options_get_unique_client_ids() {
        let a = ConnectionOptions::new("broker", 1883, "wise");
        let b = ConnectionOptions::new("broker", 1883, "wise");
        assert_ne!(a.client_id, b.client_id);
        assert!(a.username.is_none());
    }

    #[test]
    fn builder_methods_override_fields() {
        let options = ConnectionOptions::default()
            .with_client_id("client7")
            .with_credentials("user", "secret");
        assert_eq!(options.client_id, "client7");
        assert_eq!(options.username.as_deref(), Some("user"));
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(options.base_topic, "wise");
        assert_eq!(options.port, 1883);
    }
}
