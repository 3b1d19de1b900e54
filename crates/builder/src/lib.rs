//! Client for the WISE Builder control socket.
//!
//! Provides the single-flight [`ProtocolSession`], the line-oriented wire
//! format, marker-terminated response accumulation, and the
//! [`BuilderClient`] facade for calculation calls.

pub mod accumulator;
pub mod calculation;
pub mod client;
pub mod protocol;
pub mod session;

pub use calculation::{CalculationCodec, JobDefaults, JobDefaultsQuery, RawCalculation};
pub use client::BuilderClient;
pub use protocol::{CompletionPolicy, SessionRequest};
pub use session::{PendingResponse, ProtocolSession, SessionError, SessionResponse, SessionState};
