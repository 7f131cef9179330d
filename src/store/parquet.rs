//! Parquet-backed table store
//!
//! Every source table is a single `<table>.parquet` file under the output
//! directory. Opening a table reads the existing file to collect its
//! `(date, time)` keys; committing appends the staged rows with a diagonal
//! concatenation and replaces the file through a temporary sibling. A
//! read-only store does everything up to the write, so dry runs see the
//! same duplicates a real run would.

use super::{
    CellValue, ColumnType, InsertOutcome, SourceTable, SparseRow, TableSchema, TableStore, cell,
};
use crate::constants::{self, columns};
use crate::dialect::Dialect;
use crate::error::{Result, TelemetryError};

use polars::prelude::{
    Column, DataFrame, DataType, IntoLazy, ParquetReader, ParquetWriter, SerReader, TimeUnit,
    UnionArgs, concat_lf_diagonal,
};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Table store writing one Parquet file per source
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
    read_only: bool,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Read existing tables but never create or write files
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a table
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", table, constants::TABLE_FILE_EXTENSION))
    }
}

impl TableStore for ParquetStore {
    fn open(&self, source_id: &str, dialect: &Dialect) -> Result<Box<dyn SourceTable>> {
        let schema = TableSchema::for_dialect(source_id, dialect);
        let path = self.table_path(schema.name());

        let provisioning_error = |reason: String| TelemetryError::TableProvisioning {
            source_id: source_id.to_string(),
            table: schema.name().to_string(),
            reason,
        };

        if !self.read_only {
            fs::create_dir_all(&self.root).map_err(|e| {
                provisioning_error(format!(
                    "cannot create output directory {}: {}",
                    self.root.display(),
                    e
                ))
            })?;
        }

        let (existing, keys) = if path.exists() {
            let df = read_table(&path).map_err(|e| {
                provisioning_error(format!("cannot read {}: {}", path.display(), e))
            })?;
            check_existing_schema(&schema, &df).map_err(&provisioning_error)?;
            let keys = existing_keys(&df).map_err(|e| {
                provisioning_error(format!("cannot read keys of {}: {}", path.display(), e))
            })?;
            (Some(df), keys)
        } else {
            (None, HashSet::new())
        };

        debug!(
            "Opened table {} ({} existing rows)",
            path.display(),
            keys.len()
        );

        Ok(Box::new(ParquetTable {
            schema,
            path,
            existing,
            keys,
            pending: Vec::new(),
            read_only: self.read_only,
        }))
    }
}

struct ParquetTable {
    schema: TableSchema,
    path: PathBuf,
    existing: Option<DataFrame>,
    keys: HashSet<(String, String)>,
    pending: Vec<SparseRow>,
    read_only: bool,
}

impl SourceTable for ParquetTable {
    fn name(&self) -> &str {
        self.schema.name()
    }

    fn contains(&self, date: &str, time: &str) -> bool {
        self.keys.contains(&(date.to_string(), time.to_string()))
    }

    fn insert(&mut self, row: SparseRow) -> Result<InsertOutcome> {
        let key = self.schema.row_key(&row)?;
        if !self.keys.insert(key) {
            return Ok(InsertOutcome::Duplicate);
        }
        self.pending.push(row);
        Ok(InsertOutcome::Inserted)
    }

    fn commit(self: Box<Self>) -> Result<usize> {
        let ParquetTable {
            schema,
            path,
            existing,
            pending,
            read_only,
            ..
        } = *self;

        if pending.is_empty() {
            debug!("No new rows for {}", path.display());
            return Ok(0);
        }
        if read_only {
            debug!(
                "Read-only: {} new rows for {} not written",
                pending.len(),
                path.display()
            );
            return Ok(pending.len());
        }

        let written_at = chrono::Utc::now().timestamp_millis();
        let staged = build_frame(&schema, &pending, written_at)?;

        let mut combined = match existing {
            Some(existing) => {
                concat_lf_diagonal([existing.lazy(), staged.lazy()], UnionArgs::default())?
                    .collect()?
            }
            None => staged,
        };

        let tmp_path = path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path)?;
        ParquetWriter::new(file).finish(&mut combined)?;
        fs::rename(&tmp_path, &path)?;

        info!(
            "Appended {} rows to {} ({} total)",
            pending.len(),
            path.display(),
            combined.height()
        );
        Ok(pending.len())
    }
}

fn read_table(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

fn expected_dtype(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Number => DataType::Float64,
        ColumnType::Text => DataType::String,
    }
}

/// Existing columns must keep the type the dialect expects; new columns are fine
fn check_existing_schema(schema: &TableSchema, df: &DataFrame) -> std::result::Result<(), String> {
    for key in [columns::DATE, columns::TIME] {
        if df.column(key).is_err() {
            return Err(format!("existing table has no '{}' column", key));
        }
    }

    for (name, column_type) in schema.columns() {
        if let Ok(column) = df.column(name) {
            let expected = expected_dtype(*column_type);
            // All-null columns written before a field ever matched may carry Null type
            if column.dtype() != &expected && column.dtype() != &DataType::Null {
                return Err(format!(
                    "column '{}' is {} but {} is expected",
                    name,
                    column.dtype(),
                    expected
                ));
            }
        }
    }
    Ok(())
}

fn existing_keys(df: &DataFrame) -> Result<HashSet<(String, String)>> {
    let dates = df.column(columns::DATE)?.as_materialized_series().str()?;
    let times = df.column(columns::TIME)?.as_materialized_series().str()?;

    let keys = dates
        .into_iter()
        .zip(times)
        .filter_map(|(date, time)| Some((date?.to_string(), time?.to_string())))
        .collect();
    Ok(keys)
}

/// Materialize sparse rows into a frame with every schema column
fn build_frame(schema: &TableSchema, rows: &[SparseRow], written_at: i64) -> Result<DataFrame> {
    let mut frame_columns = Vec::with_capacity(schema.columns().len() + 1);

    for (name, column_type) in schema.columns() {
        let values = rows.iter().map(|row| cell(row, name));
        let column = match column_type {
            ColumnType::Bool => Column::new(
                name.as_str().into(),
                values
                    .map(|value| value.and_then(CellValue::as_bool))
                    .collect::<Vec<Option<bool>>>(),
            ),
            ColumnType::Number => Column::new(
                name.as_str().into(),
                values
                    .map(|value| value.and_then(CellValue::as_number))
                    .collect::<Vec<Option<f64>>>(),
            ),
            ColumnType::Text => Column::new(
                name.as_str().into(),
                values
                    .map(|value| value.and_then(CellValue::as_text).map(str::to_string))
                    .collect::<Vec<Option<String>>>(),
            ),
        };
        frame_columns.push(column);
    }

    let written = Column::new(columns::WRITTEN_AT.into(), vec![written_at; rows.len()])
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    frame_columns.push(written);

    Ok(DataFrame::new(frame_columns)?)
}
