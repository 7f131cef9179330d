//! Core data structures for telemetry extraction.
//!
//! Defines raw chat messages, extracted field values, tracker outputs,
//! assembled output records and run statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One row of the chat log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub source_id: String,
    pub body: String,
    pub date: String,
    pub time: String,
}

impl RawMessage {
    pub fn new(
        source_id: impl Into<String>,
        body: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            body: body.into(),
            date: date.into(),
            time: time.into(),
        }
    }

    /// Opaque timestamp token recorded on changeover
    pub fn timestamp(&self) -> String {
        format!("{} {}", self.date, self.time)
    }
}

/// A successfully extracted field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Number(_) => None,
            FieldValue::Text(value) => Some(value),
        }
    }
}

/// Outcome of applying one field pattern to a message
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// Pattern did not match
    Absent,
    /// Numeric field matched but the capture is not a number
    Malformed(String),
    Present(FieldValue),
}

impl Capture {
    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            Capture::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Capture::Present(_))
    }
}

/// Reading of a numeric field as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Missing,
    Malformed,
    Value(f64),
}

impl Reading {
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Per-message field mapping, in dialect field order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    fields: Vec<(String, Capture)>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, capture: Capture) {
        self.fields.push((name.into(), capture));
    }

    pub fn capture(&self, name: &str) -> Option<&Capture> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, capture)| capture)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.capture(name).and_then(Capture::value)
    }

    /// Numeric reading of a field; text values count as malformed
    pub fn reading(&self, name: &str) -> Reading {
        match self.capture(name) {
            None | Some(Capture::Absent) => Reading::Missing,
            Some(Capture::Malformed(_)) => Reading::Malformed,
            Some(Capture::Present(FieldValue::Number(value))) => Reading::Value(*value),
            Some(Capture::Present(FieldValue::Text(_))) => Reading::Malformed,
        }
    }

    /// Number of fields holding a usable value
    pub fn present_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|(_, capture)| capture.is_present())
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capture)> {
        self.fields
            .iter()
            .map(|(name, capture)| (name.as_str(), capture))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Tracker outputs attached to every record
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedFields {
    pub is_changeover: bool,
    pub baseline_flow: Option<f64>,
    pub volume: Option<f64>,
}

/// Accepted telemetry report ready for the table store
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub date: String,
    pub time: String,
    pub derived: DerivedFields,
    /// Every dialect field, `None` where nothing usable was extracted
    pub fields: Vec<(String, Option<FieldValue>)>,
}

impl OutputRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }
}

/// Per-source processing counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub messages: usize,
    pub accepted: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub insert_failures: usize,
    pub changeovers: usize,
    pub rows_written: usize,
}

impl SourceStats {
    pub fn merge(&mut self, other: &SourceStats) {
        self.messages += other.messages;
        self.accepted += other.accepted;
        self.discarded += other.discarded;
        self.duplicates += other.duplicates;
        self.insert_failures += other.insert_failures;
        self.changeovers += other.changeovers;
        self.rows_written += other.rows_written;
    }
}

/// Processing statistics for one run
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub input_files: usize,
    pub total_messages: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub unknown_sources: BTreeSet<String>,
    pub skipped_messages: usize,
    pub totals: SourceStats,
    pub output_path: PathBuf,
    pub state_path: PathBuf,
    pub processing_time_ms: u128,
}
