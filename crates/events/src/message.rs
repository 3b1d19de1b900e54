//! Broker message types and decoder.
//!
//! [`decode`] turns a raw `(topic, payload)` pair into a [`BrokerMessage`].
//! Decoding never fails: a topic that is too short, an unknown kind, or a
//! payload that is not valid JSON all produce [`MessageBody::Unknown`],
//! which the dispatcher ignores.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use wise_core::types::Timestamp;

use crate::statistics::Statistics;
use crate::status::StatusCode;
use crate::topic::{TopicParts, KIND_REPORT_IN, KIND_STATUS, KIND_VALIDATE};

/// A decoded broker message.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    /// Sender segment of the topic, when the topic had all four segments.
    pub sender_id: Option<String>,
    /// Job segment of the topic, when the topic had all four segments.
    pub job_id: Option<String>,
    pub payload: Vec<u8>,
    pub received_at: Timestamp,
    pub body: MessageBody,
}

impl BrokerMessage {
    /// When the sender says the message was sent, if it said so.
    pub fn sent_time(&self) -> Option<Timestamp> {
        match &self.body {
            MessageBody::Status(status) => status.sent_time,
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.body, MessageBody::Unknown)
    }
}

/// The decoded content of a broker message.
#[derive(Debug, Clone)]
pub enum MessageBody {
    Status(StatusMessage),
    Validation(ValidationReport),
    Checkin,
    Unknown,
}

/// Content of a `status` message.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub code: StatusCode,
    /// Message text; only populated for recognized status codes.
    pub message: Option<String>,
    pub sent_time: Option<Timestamp>,
    /// Statistics; only populated for recognized status codes.
    pub statistics: Option<Statistics>,
}

impl StatusMessage {
    pub fn name(&self) -> &'static str {
        self.code.name()
    }

    /// Message text, empty when absent.
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Result of validating a job, as sent on the `validate` topic.
///
/// Any JSON payload is accepted. Known fields are read leniently: a value
/// of an unexpected type falls back to the field's default. The payload
/// itself is kept in `raw`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub valid: bool,
    pub load_warnings: String,
    pub error_list: Vec<serde_json::Value>,
    pub raw: serde_json::Value,
}

impl ValidationReport {
    pub fn from_value(raw: serde_json::Value) -> Self {
        Self {
            success: lenient_bool(raw.get("success")),
            valid: lenient_bool(raw.get("valid")),
            load_warnings: lenient_text(raw.get("load_warnings")),
            error_list: lenient_list(raw.get("error_list")),
            raw,
        }
    }
}

fn lenient_bool(value: Option<&serde_json::Value>) -> bool {
    use serde_json::Value;
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn lenient_text(value: Option<&serde_json::Value>) -> String {
    use serde_json::Value;
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn lenient_list(value: Option<&serde_json::Value>) -> Vec<serde_json::Value> {
    use serde_json::Value;
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// Wire shape of a `status` payload.
#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    stats: Option<Statistics>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a message received now.
pub fn decode(topic: &str, payload: &[u8]) -> BrokerMessage {
    decode_at(topic, payload, Utc::now())
}

/// Decode a message with an explicit receipt time.
pub fn decode_at(topic: &str, payload: &[u8], received_at: Timestamp) -> BrokerMessage {
    let parts = TopicParts::parse(topic);

    let body = match &parts {
        Some(parts) => decode_body(parts.kind, topic, payload),
        None => {
            tracing::debug!(topic, "Topic has too few segments, ignoring message");
            MessageBody::Unknown
        }
    };

    BrokerMessage {
        topic: topic.to_string(),
        sender_id: parts.as_ref().map(|p| p.sender_id.to_string()),
        job_id: parts.as_ref().map(|p| p.job_id.to_string()),
        payload: payload.to_vec(),
        received_at,
        body,
    }
}

fn decode_body(kind: &str, topic: &str, payload: &[u8]) -> MessageBody {
    let result = if kind.eq_ignore_ascii_case(KIND_STATUS) {
        serde_json::from_slice::<StatusPayload>(payload)
            .map(|p| MessageBody::Status(status_from_payload(p)))
    } else if kind.eq_ignore_ascii_case(KIND_VALIDATE) {
        serde_json::from_slice::<serde_json::Value>(payload)
            .map(|raw| MessageBody::Validation(ValidationReport::from_value(raw)))
    } else if kind.eq_ignore_ascii_case(KIND_REPORT_IN) {
        Ok(MessageBody::Checkin)
    } else {
        tracing::debug!(topic, kind, "Unknown message kind");
        return MessageBody::Unknown;
    };

    result.unwrap_or_else(|e| {
        tracing::debug!(topic, error = %e, "Undecodable broker payload");
        MessageBody::Unknown
    })
}

fn status_from_payload(payload: StatusPayload) -> StatusMessage {
    let code = StatusCode::from_code(payload.status);
    let sent_time = payload.time.as_deref().and_then(parse_sent_time);

    if code.is_recognized() {
        StatusMessage {
            code,
            message: payload.message,
            sent_time,
            statistics: payload.stats,
        }
    } else {
        StatusMessage {
            code,
            message: None,
            sent_time,
            statistics: None,
        }
    }
}

/// Parse a sender timestamp. RFC 3339 is preferred; an ISO date-time
/// without offset is taken as UTC, and a bare date as UTC midnight.
/// Anything else is ignored.
pub fn parse_sent_time(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc())
}
