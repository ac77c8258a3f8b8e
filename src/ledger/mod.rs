//! The append-only ledger: its CSV text form, the remote versioned stores it
//! lives in, and the writer that appends to it under concurrent modification.

mod github;
mod memory;
mod store;
mod writer;

use chrono::NaiveDateTime;

use crate::constants::{TIMESTAMP_COLUMN, TIMESTAMP_FORMAT};
use crate::error::LedgerError;
use crate::model::{parse_timestamp, Sample};

pub use github::GithubStore;
pub use memory::MemoryStore;
pub use store::{Revision, Snapshot, VersionedStore};
pub use writer::{AppendOutcome, LedgerWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    Appended,
    /// Same timestamp and values as the last row; nothing was added.
    Duplicate,
}

/// In-memory view of the ledger text. The stored text is kept byte for byte
/// (BOM, line endings, blank lines); new rows only go to the end, using the
/// file's own line terminator.
#[derive(Debug, Clone)]
pub struct Ledger {
    columns: Vec<String>,
    text: String,
    newline: &'static str,
    rows: usize,
    last: Option<(NaiveDateTime, Vec<f64>)>,
}

impl Ledger {
    pub fn empty(columns: &[String]) -> Self {
        let mut ledger = Self {
            columns: columns.to_vec(),
            text: String::new(),
            newline: "\n",
            rows: 0,
            last: None,
        };
        ledger.text = ledger.header();
        ledger.text.push_str(ledger.newline);
        ledger
    }

    /// Parses stored text. The header must match `columns` exactly; a ledger
    /// with a different schema is never adopted.
    pub fn parse(text: &str, columns: &[String]) -> Result<Self, LedgerError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Ok(Self::empty(columns));
        };

        let mut ledger = Self::empty(columns);
        let expected = ledger.header();
        if header.trim_start_matches('\u{feff}').trim_end() != expected {
            return Err(LedgerError::HeaderMismatch {
                expected,
                found: header.to_string(),
            });
        }

        for (index, line) in lines {
            let parsed = parse_row(line, columns.len()).map_err(|reason| LedgerError::BadRow {
                line: index + 1,
                reason,
            })?;
            ledger.rows += 1;
            ledger.last = Some(parsed);
        }

        ledger.newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        ledger.text = text.to_string();
        if !ledger.text.ends_with('\n') {
            ledger.text.push_str(ledger.newline);
        }
        Ok(ledger)
    }

    pub fn append(&mut self, sample: &Sample) -> Result<AppendStatus, LedgerError> {
        let labels: Vec<String> = sample.labels().map(str::to_string).collect();
        if labels != self.columns {
            return Err(LedgerError::ColumnMismatch {
                expected: self.columns.clone(),
                found: labels,
            });
        }

        let values: Vec<f64> = sample.values().iter().map(|(_, value)| *value).collect();
        if let Some((last_timestamp, last_values)) = &self.last {
            if sample.timestamp() < *last_timestamp {
                return Err(LedgerError::OutOfOrder {
                    last: last_timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    sample: sample.timestamp_text(),
                });
            }
            if sample.timestamp() == *last_timestamp && *last_values == values {
                return Ok(AppendStatus::Duplicate);
            }
        }

        self.text.push_str(&sample.timestamp_text());
        for value in &values {
            self.text.push(',');
            self.text.push_str(&value.to_string());
        }
        self.text.push_str(self.newline);
        self.rows += 1;
        self.last = Some((sample.timestamp(), values));
        Ok(AppendStatus::Appended)
    }

    pub fn render(&self) -> String {
        self.text.clone()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn header(&self) -> String {
        std::iter::once(TIMESTAMP_COLUMN.to_string())
            .chain(self.columns.iter().map(|column| quote_field(column)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_row(line: &str, width: usize) -> Result<(NaiveDateTime, Vec<f64>), String> {
    let mut fields = line.trim_end().split(',');
    let timestamp = fields
        .next()
        .and_then(parse_timestamp)
        .ok_or_else(|| "unreadable timestamp".to_string())?;
    let values = fields
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("bad value {field:?}: {err}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != width {
        return Err(format!("expected {width} values, found {}", values.len()));
    }
    Ok((timestamp, values))
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn columns() -> Vec<String> {
        vec!["USD/PLN".to_string(), "CHF/PLN".to_string()]
    }

    fn sample(at: &str, usd: f64, chf: f64) -> Sample {
        Sample::new(
            parse_timestamp(at).expect("timestamp"),
            vec![("USD/PLN".into(), usd), ("CHF/PLN".into(), chf)],
        )
    }

    #[test]
    fn empty_ledger_renders_header_only() {
        let ledger = Ledger::parse("", &columns()).expect("empty text");
        assert!(ledger.is_empty());
        assert_eq!(ledger.render(), "timestamp,USD/PLN,CHF/PLN\n");
    }

    #[test]
    fn append_keeps_existing_rows_verbatim() {
        let text = "\u{feff}timestamp,USD/PLN,CHF/PLN\r\n2024-09-30 10:00:00,3.8193,4.5310\r\n\r\n";
        let mut ledger = Ledger::parse(text, &columns()).expect("parse");

        let status = ledger
            .append(&sample("2024-09-30 10:05:00", 3.82, 4.531))
            .expect("append");
        assert_eq!(status, AppendStatus::Appended);
        assert_eq!(
            ledger.render(),
            "\u{feff}timestamp,USD/PLN,CHF/PLN\r\n\
             2024-09-30 10:00:00,3.8193,4.5310\r\n\
             \r\n\
             2024-09-30 10:05:00,3.82,4.531\r\n"
        );
        assert!(ledger.render().starts_with(text));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn missing_final_newline_is_completed_before_append() {
        let text = "timestamp,USD/PLN,CHF/PLN\n2024-09-30 10:00:00,3.8193,4.531";
        let mut ledger = Ledger::parse(text, &columns()).expect("parse");
        ledger
            .append(&sample("2024-09-30 10:05:00", 3.82, 4.531))
            .expect("append");
        assert_eq!(
            ledger.render(),
            "timestamp,USD/PLN,CHF/PLN\n\
             2024-09-30 10:00:00,3.8193,4.531\n\
             2024-09-30 10:05:00,3.82,4.531\n"
        );
    }

    #[test]
    fn foreign_header_fails_closed() {
        let err = Ledger::parse("timestamp,EUR/PLN\n", &columns()).unwrap_err();
        assert!(matches!(err, LedgerError::HeaderMismatch { .. }));
    }

    #[test]
    fn malformed_row_is_reported_with_line_number() {
        let text = "timestamp,USD/PLN,CHF/PLN\n2024-09-30 10:00:00,3.81\n";
        let err = Ledger::parse(text, &columns()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::BadRow {
                line: 2,
                reason: "expected 2 values, found 1".to_string()
            }
        );
    }

    #[test]
    fn older_sample_is_rejected() {
        let mut ledger = Ledger::empty(&columns());
        ledger
            .append(&sample("2024-09-30 10:05:00", 3.82, 4.53))
            .expect("first append");
        let err = ledger
            .append(&sample("2024-09-30 10:00:00", 3.83, 4.54))
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrder { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn repeated_sample_is_a_duplicate() {
        let text = "timestamp,USD/PLN,CHF/PLN\n2024-09-30 10:00:00,3.8193,4.531\n";
        let mut ledger = Ledger::parse(text, &columns()).expect("parse");
        let status = ledger
            .append(&sample("2024-09-30 10:00:00", 3.8193, 4.531))
            .expect("append");
        assert_eq!(status, AppendStatus::Duplicate);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn column_order_must_match() {
        let mut ledger = Ledger::empty(&columns());
        let swapped = Sample::new(
            parse_timestamp("2024-09-30 10:00:00").expect("timestamp"),
            vec![("CHF/PLN".into(), 4.5), ("USD/PLN".into(), 3.8)],
        );
        assert!(matches!(
            ledger.append(&swapped),
            Err(LedgerError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn labels_with_commas_are_quoted() {
        let ledger = Ledger::empty(&["Index, close".to_string()]);
        assert_eq!(ledger.render(), "timestamp,\"Index, close\"\n");
    }
}
