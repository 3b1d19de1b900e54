//! Calculation collaborators.
//!
//! The session only moves raw lines. Turning domain inputs into parameter
//! lines and raw responses back into domain values is the job of a
//! [`CalculationCodec`]. A codec that sees an unexpected response shape
//! returns `None`, which callers treat as "not calculated".

use crate::accumulator::Record;
use crate::session::SessionResponse;

/// Encodes one calculation's inputs and decodes its response.
pub trait CalculationCodec {
    type Output;

    /// Parameter lines in the positional order the Builder expects.
    fn parameter_lines(&self) -> Vec<Vec<String>>;

    /// Decode a raw response, or `None` when its shape is unexpected.
    fn decode(&self, response: &SessionResponse) -> Option<Self::Output>;
}

/// Pass-through codec for callers that decode responses themselves.
#[derive(Debug, Clone, Default)]
pub struct RawCalculation {
    lines: Vec<Vec<String>>,
}

impl RawCalculation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one parameter line.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.lines
            .push(parameters.into_iter().map(|p| p.to_string()).collect());
        self
    }
}

impl CalculationCodec for RawCalculation {
    type Output = SessionResponse;

    fn parameter_lines(&self) -> Vec<Vec<String>> {
        self.lines.clone()
    }

    fn decode(&self, response: &SessionResponse) -> Option<SessionResponse> {
        Some(response.clone())
    }
}

// ---------------------------------------------------------------------------
// Job defaults
// ---------------------------------------------------------------------------

/// Default job settings reported by the Builder, in the order received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDefaults {
    pub entries: Vec<(String, String)>,
}

impl JobDefaults {
    /// Value for `key`, if the Builder reported one.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Codec for the job-defaults lookup: no parameters, `key|value` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobDefaultsQuery;

impl CalculationCodec for JobDefaultsQuery {
    type Output = JobDefaults;

    fn parameter_lines(&self) -> Vec<Vec<String>> {
        Vec::new()
    }

    fn decode(&self, response: &SessionResponse) -> Option<JobDefaults> {
        let SessionResponse::Records(records) = response else {
            return None;
        };
        records
            .iter()
            .map(key_value)
            .collect::<Option<Vec<_>>>()
            .map(|entries| JobDefaults { entries })
    }
}

fn key_value(record: &Record) -> Option<(String, String)> {
    match record.as_slice() {
        [key, value] => Some((key.clone(), value.clone())),
        _ => None,
    }
}
