//! Per-source output tables.
//!
//! Each source gets one append-only table named by [`table_name`]. Rows are
//! handed over sparsely: a column whose value is null is simply left out of
//! the row, and the table fills it in when it materializes. Before a row is
//! accepted its `(date, time)` key is checked against everything already in
//! the table, so reruns over overlapping input do not duplicate rows.

pub mod memory;
pub mod parquet;

pub use memory::MemoryStore;
pub use parquet::ParquetStore;

use crate::constants::columns;
use crate::dialect::{Dialect, FieldKind};
use crate::error::{Result, TelemetryError};
use crate::models::{FieldValue, OutputRecord};

/// A bound value in a sparse row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Bool(_) => ColumnType::Bool,
            CellValue::Number(_) => ColumnType::Number,
            CellValue::Text(_) => ColumnType::Text,
        }
    }
}

/// Non-null `(column, value)` pairs of one record
pub type SparseRow = Vec<(String, CellValue)>;

/// Value of a column in a sparse row
pub fn cell<'a>(row: &'a SparseRow, column: &str) -> Option<&'a CellValue> {
    row.iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| value)
}

/// Convert a record into the values that will actually be bound
pub fn sparse_row(record: &OutputRecord) -> SparseRow {
    let mut row = vec![
        (columns::DATE.to_string(), CellValue::Text(record.date.clone())),
        (columns::TIME.to_string(), CellValue::Text(record.time.clone())),
        (
            columns::IS_CHANGEOVER.to_string(),
            CellValue::Bool(record.derived.is_changeover),
        ),
    ];

    if let Some(baseline) = record.derived.baseline_flow {
        row.push((columns::BASELINE_FLOW.to_string(), CellValue::Number(baseline)));
    }
    if let Some(volume) = record.derived.volume {
        row.push((columns::VOLUME.to_string(), CellValue::Number(volume)));
    }

    for (name, value) in &record.fields {
        let cell = match value {
            Some(FieldValue::Number(number)) => CellValue::Number(*number),
            Some(FieldValue::Text(text)) => CellValue::Text(text.clone()),
            None => continue,
        };
        row.push((name.clone(), cell));
    }

    row
}

/// Storage type of a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Number,
    Text,
}

/// Column layout of one source table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<(String, ColumnType)>,
}

impl TableSchema {
    /// Standard columns followed by the dialect's fields
    pub fn for_dialect(source_id: &str, dialect: &Dialect) -> Self {
        let mut columns = vec![
            (columns::DATE.to_string(), ColumnType::Text),
            (columns::TIME.to_string(), ColumnType::Text),
            (columns::IS_CHANGEOVER.to_string(), ColumnType::Bool),
            (columns::BASELINE_FLOW.to_string(), ColumnType::Number),
            (columns::VOLUME.to_string(), ColumnType::Number),
        ];

        for field in dialect.fields() {
            let column_type = match field.kind {
                FieldKind::Numeric => ColumnType::Number,
                FieldKind::Text => ColumnType::Text,
            };
            columns.push((field.name.clone(), column_type));
        }

        Self {
            name: table_name(source_id),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[(String, ColumnType)] {
        &self.columns
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, column_type)| *column_type)
    }

    /// Validate a row and return its `(date, time)` key
    pub fn row_key(&self, row: &SparseRow) -> Result<(String, String)> {
        let key_part = |column: &str| {
            cell(row, column)
                .and_then(CellValue::as_text)
                .map(str::to_string)
        };
        let date = key_part(columns::DATE);
        let time = key_part(columns::TIME);

        let insertion_error = |reason: String| TelemetryError::Insertion {
            table: self.name.clone(),
            date: date.clone().unwrap_or_default(),
            time: time.clone().unwrap_or_default(),
            reason,
        };

        for (column, value) in row {
            match self.column_type(column) {
                None => {
                    return Err(insertion_error(format!("unknown column '{}'", column)));
                }
                Some(expected) if expected != value.column_type() => {
                    return Err(insertion_error(format!(
                        "column '{}' expects {:?}, got {:?}",
                        column,
                        expected,
                        value.column_type()
                    )));
                }
                Some(_) => {}
            }
        }

        match (date.clone(), time.clone()) {
            (Some(date), Some(time)) => Ok((date, time)),
            _ => Err(insertion_error("row has no date/time key".to_string())),
        }
    }
}

/// Result of inserting one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// An open table for one source within a run
pub trait SourceTable: Send {
    fn name(&self) -> &str;

    /// Whether a row with this key is already stored or pending
    fn contains(&self, date: &str, time: &str) -> bool;

    /// Stage a row unless its key already exists
    fn insert(&mut self, row: SparseRow) -> Result<InsertOutcome>;

    /// Persist staged rows, returning how many were written
    fn commit(self: Box<Self>) -> Result<usize>;
}

/// Provisioner of per-source tables
pub trait TableStore: Send + Sync {
    /// Open (creating if needed) the table for a source
    fn open(&self, source_id: &str, dialect: &Dialect) -> Result<Box<dyn SourceTable>>;
}

/// Stable storage identifier for a source.
///
/// ASCII alphanumerics are lowercased and kept, everything else becomes `_`
/// and a leading digit is prefixed with `_`. If that changed the identifier,
/// a hash of the original is appended so distinct sources never share a
/// table.
pub fn table_name(source_id: &str) -> String {
    let mut name: String = source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    if name != source_id {
        name.push_str(&format!("_{:08x}", fnv1a(source_id.as_bytes())));
    }

    name
}

// FNV-1a, 32 bit
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}
