//! Job status codes reported by the Builder.
//!
//! Every integer maps to a [`StatusCode`]: 0-9 are the known statuses and
//! anything else is [`StatusCode::Unrecognized`], whose name is empty.

use serde::Serialize;

/// Status of a job or scenario as reported on the `status` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusCode {
    Submitted,
    Started,
    ScenarioStarted,
    ScenarioCompleted,
    ScenarioFailed,
    Complete,
    Failed,
    Error,
    Information,
    ShutdownRequested,
    /// A code outside the known table. Message and statistics are never
    /// extracted for these.
    Unrecognized(i64),
}

impl StatusCode {
    /// Map a wire code to a status. Total over all integers.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Submitted,
            1 => Self::Started,
            2 => Self::ScenarioStarted,
            3 => Self::ScenarioCompleted,
            4 => Self::ScenarioFailed,
            5 => Self::Complete,
            6 => Self::Failed,
            7 => Self::Error,
            8 => Self::Information,
            9 => Self::ShutdownRequested,
            other => Self::Unrecognized(other),
        }
    }

    /// The wire code this status was decoded from.
    pub fn code(self) -> i64 {
        match self {
            Self::Submitted => 0,
            Self::Started => 1,
            Self::ScenarioStarted => 2,
            Self::ScenarioCompleted => 3,
            Self::ScenarioFailed => 4,
            Self::Complete => 5,
            Self::Failed => 6,
            Self::Error => 7,
            Self::Information => 8,
            Self::ShutdownRequested => 9,
            Self::Unrecognized(code) => code,
        }
    }

    /// Display name; empty for unrecognized codes.
    pub fn name(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Started => "Started",
            Self::ScenarioStarted => "Scenario Started",
            Self::ScenarioCompleted => "Scenario Completed",
            Self::ScenarioFailed => "Scenario Failed",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::Information => "Information",
            Self::ShutdownRequested => "Shutdown Requested",
            Self::Unrecognized(_) => "",
        }
    }

    pub fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}
