//! Control socket wire format.
//!
//! Every exchange with the Builder is line-oriented UTF-8:
//!
//! ```text
//! STARTUP
//! <operation key>
//! <param>|<param>|...        (zero or more parameter lines)
//! ... response bytes ...
//! SHUTDOWN
//! ```
//!
//! This module holds the fixed tokens, the operation keys, and the
//! [`SessionRequest`] that describes one exchange.

/// First line written on every connection.
pub const STARTUP_TOKEN: &str = "STARTUP";

/// Last line written on every connection, after the response.
pub const SHUTDOWN_TOKEN: &str = "SHUTDOWN";

/// Literal that ends a marker-terminated response stream.
pub const COMPLETE_MARKER: &str = "COMPLETE";

/// Separator between parameters on a line, and between fields in a response record.
pub const FIELD_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Operation keys
// ---------------------------------------------------------------------------

/// Fire behaviour prediction for a single fuel type and weather state.
pub const OP_FIRE_BEHAVIOUR: &str = "FBP_CALCULATE";

/// Fire weather index codes from daily or hourly observations.
pub const OP_FIRE_WEATHER_INDEX: &str = "FWI_CALCULATE";

/// Sunrise, sunset and solar noon for a location and date.
pub const OP_SOLAR: &str = "SOLAR_CALCULATE";

/// Hourly weather stream derived from a daily forecast.
pub const OP_FORECAST: &str = "FORECAST_CALCULATE";

/// Default job settings the Builder would apply to a new job.
pub const OP_JOB_DEFAULTS: &str = "GET_DEFAULTS";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// How the session decides that the Builder has finished responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The first chunk of data read from the socket is the whole response.
    SinglePacket,
    /// Chunks are accumulated until [`COMPLETE_MARKER`] appears.
    MarkerTerminated,
}

/// Everything needed to run one exchange against the Builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Operation key sent on the second line.
    pub operation: String,
    /// Parameter lines, each pipe-joined on the wire.
    pub parameter_lines: Vec<Vec<String>>,
    pub completion: CompletionPolicy,
}

impl SessionRequest {
    /// Create a request with no parameter lines.
    pub fn new(operation: impl Into<String>, completion: CompletionPolicy) -> Self {
        Self {
            operation: operation.into(),
            parameter_lines: Vec::new(),
            completion,
        }
    }

    /// Append one parameter line.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.parameter_lines
            .push(parameters.into_iter().map(|p| p.to_string()).collect());
        self
    }

    /// The lines written before the response is read, without terminators.
    pub fn request_lines(&self) -> Vec<String> {
        let separator = FIELD_SEPARATOR.to_string();
        let mut lines = Vec::with_capacity(self.parameter_lines.len() + 2);
        lines.push(STARTUP_TOKEN.to_string());
        lines.push(self.operation.clone());
        lines.extend(self.parameter_lines.iter().map(|line| line.join(&separator)));
        lines
    }
}
