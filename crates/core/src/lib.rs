//! Shared types, configuration helpers and the Builder endpoint registry
//! used by the WISE client crates.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod types;

pub use endpoint::{Endpoint, EndpointRegistry};
pub use error::CoreError;
