use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde_json::{Map, Value};

use crate::constants::TIMESTAMP_FORMAT;

/// One monitored series: the provider-side identifier plus the column label
/// used in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    pub id: String,
    pub label: String,
}

impl Quantity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// A complete set of values observed in one aggregation cycle, kept in the
/// configured quantity order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: NaiveDateTime,
    values: Vec<(String, f64)>,
}

impl Sample {
    /// Timestamps are kept at whole seconds, the precision the ledger stores.
    pub fn new(timestamp: NaiveDateTime, values: Vec<(String, f64)>) -> Self {
        Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            values,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn values(&self) -> &[(String, f64)] {
        &self.values
    }

    pub fn value(&self, label: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| *value)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(label, _)| label.as_str())
    }

    /// Log-friendly view of the sample.
    pub fn to_metadata(&self) -> Value {
        let mut values = Map::with_capacity(self.values.len());
        for (label, value) in &self.values {
            values.insert(label.clone(), Value::from(*value));
        }
        let mut obj = Map::with_capacity(2);
        obj.insert("timestamp".to_string(), Value::from(self.timestamp_text()));
        obj.insert("values".to_string(), Value::Object(values));
        Value::Object(obj)
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> NaiveDateTime {
        parse_timestamp(text).expect("valid timestamp")
    }

    #[test]
    fn sample_keeps_configured_order() {
        let sample = Sample::new(
            at("2024-09-30 10:15:00"),
            vec![("DAX 40".into(), 18000.5), ("S&P 500".into(), 5700.2)],
        );

        let labels: Vec<_> = sample.labels().collect();
        assert_eq!(labels, vec!["DAX 40", "S&P 500"]);
        assert_eq!(sample.value("S&P 500"), Some(5700.2));
        assert_eq!(sample.value("FTSE"), None);
        assert_eq!(sample.timestamp_text(), "2024-09-30 10:15:00");
    }

    #[test]
    fn sample_drops_subsecond_precision() {
        let precise = at("2024-09-30 10:15:00")
            .with_nanosecond(750_000_000)
            .expect("valid nanos");
        let sample = Sample::new(precise, vec![("DAX 40".into(), 18000.5)]);
        assert_eq!(sample.timestamp(), at("2024-09-30 10:15:00"));
    }

    #[test]
    fn timestamp_parsing_rejects_other_formats() {
        assert!(parse_timestamp("2024-09-30T10:15:00").is_none());
        assert!(parse_timestamp(" 2024-09-30 10:15:00 ").is_some());
    }
}
