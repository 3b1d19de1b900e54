//! Ordered key/value statistics attached to status messages.
//!
//! The Builder sends statistics as a JSON object. Entries are kept in the
//! order they appear in the payload, which a plain map would lose, so
//! [`Statistics`] has its own `Deserialize` implementation.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single statistic value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatisticValue {
    Number(f64),
    Text(String),
}

impl StatisticValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for StatisticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Statistics in order of arrival.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    entries: Vec<(String, StatisticValue)>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: StatisticValue) {
        self.entries.push((key.into(), value));
    }

    /// First value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&StatisticValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatisticValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for Statistics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StatisticsVisitor)
    }
}

struct StatisticsVisitor;

impl<'de> Visitor<'de> for StatisticsVisitor {
    type Value = Statistics;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of statistic names to numbers or strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Statistics, A::Error> {
        let mut stats = Statistics::new();
        while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
            match value {
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(n) => stats.push(key, StatisticValue::Number(n)),
                    None => tracing::debug!(key = %key, "Skipping non-finite statistic"),
                },
                serde_json::Value::String(s) => stats.push(key, StatisticValue::Text(s)),
                other => {
                    tracing::debug!(key = %key, value = %other, "Skipping statistic of unsupported type");
                }
            }
        }
        Ok(stats)
    }
}
