//! Broker topic layout.
//!
//! Job topics look like `{base}/{senderId}/{jobId}/{kind}`. Subscriptions
//! use MQTT-style filters where `+` matches exactly one level and `#`
//! matches all remaining levels.

/// Topic kind carrying job status updates.
pub const KIND_STATUS: &str = "status";

/// Topic kind carrying periodic check-ins.
pub const KIND_REPORT_IN: &str = "reportin";

/// Topic kind carrying job validation results.
pub const KIND_VALIDATE: &str = "validate";

/// Segments of a job topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicParts<'a> {
    pub base: &'a str,
    pub sender_id: &'a str,
    pub job_id: &'a str,
    pub kind: &'a str,
}

impl<'a> TopicParts<'a> {
    /// Split a topic into its segments, or `None` when there are fewer than four.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut segments = topic.split('/');
        Some(Self {
            base: segments.next()?,
            sender_id: segments.next()?,
            job_id: segments.next()?,
            kind: segments.next()?,
        })
    }
}

/// Filter matching the status topic of `job_id` from any sender.
pub fn status_filter(base: &str, job_id: &str) -> String {
    format!("{base}/+/{job_id}/{KIND_STATUS}")
}

/// Filter matching the validation topic of `job_id` from any sender.
pub fn validate_filter(base: &str, job_id: &str) -> String {
    format!("{base}/+/{job_id}/{KIND_VALIDATE}")
}

/// Topic on which management commands from `client_id` are published.
pub fn manage_topic(base: &str, client_id: &str) -> String {
    format!("{base}/{client_id}/manager/manage")
}

/// Whether `topic` matches the subscription `filter`.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
