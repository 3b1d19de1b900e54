//! Job lifecycle events and the rules that derive them from broker messages.

use serde::Serialize;
use wise_core::types::Timestamp;

use crate::message::{BrokerMessage, MessageBody, StatusMessage, ValidationReport};
use crate::statistics::Statistics;
use crate::status::StatusCode;

/// Message text the Builder sends with `Complete` when the whole run has ended.
pub const SIMULATION_COMPLETE_MESSAGE: &str = "WISE.EXE operations";

/// Marker preceding the useful part of a scenario failure message.
const ERROR_MARKER: &str = "Error:";

/// Error text used when a scenario fails without any message.
const UNKNOWN_ERROR: &str = "Unknown Error";

/// Identity of the dispatcher an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DispatcherId {
    pub client_id: String,
    pub job_id: String,
}

/// Category of a [`JobEvent`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobEventKind {
    SimulationComplete,
    ScenarioComplete,
    StatisticsReceived,
    ValidationReceived,
}

/// A job lifecycle event emitted by a [`JobEventDispatcher`](crate::JobEventDispatcher).
#[derive(Debug, Clone, Serialize)]
pub enum JobEvent {
    /// Every scenario of the job has finished.
    SimulationComplete {
        source: DispatcherId,
        timestamp: Timestamp,
    },

    /// One scenario finished, successfully or not.
    ScenarioComplete {
        source: DispatcherId,
        timestamp: Timestamp,
        success: bool,
        /// Why the scenario failed; `None` on success.
        error_message: Option<String>,
    },

    /// The Builder reported run statistics.
    StatisticsReceived {
        source: DispatcherId,
        timestamp: Timestamp,
        statistics: Statistics,
    },

    /// The Builder finished validating the job.
    ValidationReceived {
        source: DispatcherId,
        timestamp: Timestamp,
        validation: ValidationReport,
    },
}

impl JobEvent {
    pub fn kind(&self) -> JobEventKind {
        match self {
            Self::SimulationComplete { .. } => JobEventKind::SimulationComplete,
            Self::ScenarioComplete { .. } => JobEventKind::ScenarioComplete,
            Self::StatisticsReceived { .. } => JobEventKind::StatisticsReceived,
            Self::ValidationReceived { .. } => JobEventKind::ValidationReceived,
        }
    }

    pub fn source(&self) -> &DispatcherId {
        match self {
            Self::SimulationComplete { source, .. }
            | Self::ScenarioComplete { source, .. }
            | Self::StatisticsReceived { source, .. }
            | Self::ValidationReceived { source, .. } => source,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::SimulationComplete { timestamp, .. }
            | Self::ScenarioComplete { timestamp, .. }
            | Self::StatisticsReceived { timestamp, .. }
            | Self::ValidationReceived { timestamp, .. } => *timestamp,
        }
    }
}

/// Apply the dispatch rules to a decoded message.
///
/// Returns at most one event. Unknown messages and check-ins never
/// produce one. The timestamp is the sender's time when it sent one,
/// otherwise the time the message was received.
pub fn resolve_event(message: &BrokerMessage, source: &DispatcherId) -> Option<JobEvent> {
    let source = source.clone();
    let timestamp = message.sent_time().unwrap_or(message.received_at);

    match &message.body {
        MessageBody::Status(status) => resolve_status(status, source, timestamp),
        MessageBody::Validation(report) => Some(JobEvent::ValidationReceived {
            source,
            timestamp,
            validation: report.clone(),
        }),
        MessageBody::Checkin | MessageBody::Unknown => None,
    }
}

fn resolve_status(
    status: &StatusMessage,
    source: DispatcherId,
    timestamp: Timestamp,
) -> Option<JobEvent> {
    match status.code {
        StatusCode::Complete if status.text() == SIMULATION_COMPLETE_MESSAGE => {
            Some(JobEvent::SimulationComplete { source, timestamp })
        }
        StatusCode::Complete => Some(JobEvent::ScenarioComplete {
            source,
            timestamp,
            success: true,
            error_message: None,
        }),
        StatusCode::ScenarioFailed => Some(JobEvent::ScenarioComplete {
            source,
            timestamp,
            success: false,
            error_message: Some(derive_error_message(status.text())),
        }),
        _ => match &status.statistics {
            Some(statistics) if !status.text().is_empty() && !statistics.is_empty() => {
                Some(JobEvent::StatisticsReceived {
                    source,
                    timestamp,
                    statistics: statistics.clone(),
                })
            }
            _ => None,
        },
    }
}

/// Extract a readable error from a scenario failure message.
///
/// Text after `Error:` is returned trimmed; otherwise a non-empty message
/// is returned as is, and an empty one becomes `"Unknown Error"`.
pub fn derive_error_message(text: &str) -> String {
    if let Some((_, detail)) = text.split_once(ERROR_MARKER) {
        detail.trim().to_string()
    } else if !text.is_empty() {
        text.to_string()
    } else {
        UNKNOWN_ERROR.to_string()
    }
}
