//! Processing of one source's messages
//!
//! A job owns a copy of its source's state. The copy is only handed back when
//! the job completes, so a source whose table cannot be opened or committed
//! leaves the snapshot exactly as it was.

use crate::assembler::assemble;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::{RawMessage, SourceStats};
use crate::parser::extract;
use crate::state::SourceState;
use crate::store::{InsertOutcome, TableStore, sparse_row};
use crate::tracker::ChangeoverTracker;

use std::sync::Arc;
use tracing::{debug, warn};

/// All messages of one known source, in posting order
#[derive(Debug, Clone)]
pub struct SourceJob {
    pub source_id: String,
    pub dialect: Arc<Dialect>,
    pub messages: Vec<RawMessage>,
    pub state: SourceState,
}

/// Result of a completed source job
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source_id: String,
    pub state: SourceState,
    pub stats: SourceStats,
}

/// Run a job to completion against a table store
pub fn run_source_job(
    job: SourceJob,
    store: &dyn TableStore,
    tracker: &ChangeoverTracker,
) -> Result<SourceOutcome> {
    let SourceJob {
        source_id,
        dialect,
        messages,
        mut state,
    } = job;

    let mut table = store.open(&source_id, &dialect)?;
    let mut stats = SourceStats {
        messages: messages.len(),
        ..Default::default()
    };

    for message in &messages {
        let extracted = extract(&message.body, &dialect);
        let derived = tracker.update(&extracted, &dialect, &message.timestamp(), &mut state);
        if derived.is_changeover {
            stats.changeovers += 1;
        }

        let Some(record) = assemble(&extracted, derived, &message.date, &message.time) else {
            stats.discarded += 1;
            continue;
        };
        stats.accepted += 1;

        if table.contains(&record.date, &record.time) {
            stats.duplicates += 1;
            continue;
        }

        match table.insert(sparse_row(&record)) {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Duplicate) => stats.duplicates += 1,
            Err(e) => {
                warn!("Skipping record for '{}': {}", source_id, e);
                stats.insert_failures += 1;
            }
        }
    }

    let table_name = table.name().to_string();
    stats.rows_written = table.commit()?;

    debug!(
        "Source '{}' -> {}: {} messages, {} accepted, {} duplicates, {} written",
        source_id,
        table_name,
        stats.messages,
        stats.accepted,
        stats.duplicates,
        stats.rows_written
    );

    Ok(SourceOutcome {
        source_id,
        state,
        stats,
    })
}
