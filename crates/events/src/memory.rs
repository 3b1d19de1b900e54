//! In-process loopback broker.
//!
//! [`MemoryBroker`] routes every publish to the connections whose
//! subscriptions match the topic, in publish order. It keeps a log of
//! published messages and subscriptions so tests can inspect what a
//! dispatcher did.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::{
    BrokerConnection, BrokerConnector, BrokerError, ConnectionOptions, InboundMessage, QoS,
};
use crate::topic::filter_matches;

/// A subscription as recorded by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub client_id: String,
    pub filter: String,
    pub qos: QoS,
}

/// Loopback broker shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    next_connection: u64,
    connects: usize,
    connections: Vec<ConnectionEntry>,
    published: Vec<InboundMessage>,
    subscriptions: Vec<Subscription>,
}

struct ConnectionEntry {
    id: u64,
    client_id: String,
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish from outside any connection, as another client would.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let message = InboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        let mut state = self.lock();
        for conn in &state.connections {
            if conn.filters.iter().any(|f| filter_matches(f, topic)) {
                // A closed receiver just means that client went away.
                let _ = conn.tx.send(message.clone());
            }
        }
        state.published.push(message);
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.lock().published.clone()
    }

    /// Every subscription ever made, in order.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    /// Number of connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.lock().connections.len()
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.next_connection += 1;
        state.connects += 1;
        let id = state.next_connection;
        state.connections.push(ConnectionEntry {
            id,
            client_id: options.client_id.clone(),
            filters: Vec::new(),
            tx,
        });
        tracing::debug!(client_id = %options.client_id, connection = id, "Memory broker connection opened");

        Ok(Box::new(MemoryConnection {
            id,
            broker: self.clone(),
            rx,
            open: true,
        }))
    }
}

/// A connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    id: u64,
    broker: MemoryBroker,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    open: bool,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), BrokerError> {
        if !self.open {
            return Err(BrokerError::Closed);
        }
        let mut state = self.broker.lock();
        let BrokerState {
            connections,
            subscriptions,
            ..
        } = &mut *state;
        let entry = connections
            .iter_mut()
            .find(|c| c.id == self.id)
            .ok_or(BrokerError::Closed)?;
        entry.filters.push(filter.to_string());
        subscriptions.push(Subscription {
            client_id: entry.client_id.clone(),
            filter: filter.to_string(),
            qos,
        });
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), BrokerError> {
        if !self.open {
            return Err(BrokerError::Closed);
        }
        self.broker.publish(topic, payload);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<InboundMessage>, BrokerError> {
        if !self.open {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        if self.open {
            self.open = false;
            self.broker.lock().connections.retain(|c| c.id != self.id);
            self.rx.close();
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.open {
            self.broker.lock().connections.retain(|c| c.id != self.id);
        }
    }
}
