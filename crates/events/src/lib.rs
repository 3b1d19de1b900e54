//! Job status messages and lifecycle events from the WISE broker.
//!
//! [`decode`] turns raw broker traffic into typed [`BrokerMessage`]s, and
//! [`JobEventDispatcher`] follows one job, emitting [`JobEvent`]s to
//! registered listeners. The broker transport itself sits behind
//! [`BrokerConnector`]; [`MemoryBroker`] is the in-process implementation.

pub mod broker;
pub mod dispatcher;
pub mod event;
pub mod manage;
pub mod memory;
pub mod message;
pub mod statistics;
pub mod status;
pub mod topic;

pub use broker::{BrokerConnection, BrokerConnector, BrokerError, ConnectionOptions, InboundMessage, QoS};
pub use dispatcher::JobEventDispatcher;
pub use event::{DispatcherId, JobEvent, JobEventKind};
pub use manage::ManageCommand;
pub use memory::{MemoryBroker, MemoryConnection, Subscription};
pub use message::{decode, decode_at, BrokerMessage, MessageBody, StatusMessage, ValidationReport};
pub use statistics::{StatisticValue, Statistics};
pub use status::StatusCode;
