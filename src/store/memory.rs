//! In-memory table store, for embedding the pipeline without a filesystem.

use super::{InsertOutcome, SourceTable, SparseRow, TableSchema, TableStore, table_name};
use crate::dialect::Dialect;
use crate::error::{Result, TelemetryError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

type Tables = Arc<Mutex<HashMap<String, Vec<SparseRow>>>>;

/// Table store keeping committed rows in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of a source's table
    pub fn rows(&self, source_id: &str) -> Vec<SparseRow> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .get(&table_name(source_id))
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Number of tables that have been opened
    pub fn table_count(&self) -> usize {
        self.tables.lock().map(|tables| tables.len()).unwrap_or(0)
    }
}

impl TableStore for MemoryStore {
    fn open(&self, source_id: &str, dialect: &Dialect) -> Result<Box<dyn SourceTable>> {
        let schema = TableSchema::for_dialect(source_id, dialect);

        let mut tables = self
            .tables
            .lock()
            .map_err(|e| TelemetryError::TableProvisioning {
                source_id: source_id.to_string(),
                table: schema.name().to_string(),
                reason: format!("store lock poisoned: {}", e),
            })?;

        let existing = tables.entry(schema.name().to_string()).or_default();
        let mut keys = HashSet::with_capacity(existing.len());
        for row in existing.iter() {
            keys.insert(schema.row_key(row)?);
        }

        debug!(
            "Opened in-memory table {} with {} rows",
            schema.name(),
            keys.len()
        );

        Ok(Box::new(MemoryTable {
            schema,
            keys,
            pending: Vec::new(),
            tables: self.tables.clone(),
        }))
    }
}

struct MemoryTable {
    schema: TableSchema,
    keys: HashSet<(String, String)>,
    pending: Vec<SparseRow>,
    tables: Tables,
}

impl SourceTable for MemoryTable {
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
        let MemoryTable {
            schema,
            pending,
            tables,
            ..
        } = *self;
        let count = pending.len();

        let mut tables = tables
            .lock()
            .map_err(|e| TelemetryError::ProcessingFailed {
                source_id: schema.name().to_string(),
                reason: format!("store lock poisoned: {}", e),
            })?;
        tables
            .entry(schema.name().to_string())
            .or_default()
            .extend(pending);
        Ok(count)
    }
}
