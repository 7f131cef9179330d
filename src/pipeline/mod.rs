//! Batch pipeline over a chat log export.
//!
//! Loads the input, groups messages by source, runs every known source
//! through extraction, changeover tracking and record assembly, appends the
//! accepted records to the source's table and finally persists the state
//! snapshot. Sources are independent and run side by side; messages within a
//! source are always processed in input order.

pub mod source_job;

#[cfg(test)]
pub mod tests;

use self::source_job::{SourceJob, SourceOutcome, run_source_job};

use crate::config::PipelineConfig;
use crate::dialect::DialectRegistry;
use crate::error::{Result, TelemetryError};
use crate::input::load_input;
use crate::models::{ProcessingStats, RawMessage};
use crate::state::StateStore;
use crate::store::{ParquetStore, TableStore};
use crate::tracker::ChangeoverTracker;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Main processor for chat log telemetry
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<DialectRegistry>,
    store: Arc<dyn TableStore>,
    tracker: ChangeoverTracker,
    show_progress: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline writing Parquet tables.
    ///
    /// In dry-run mode existing tables are still read for deduplication but
    /// nothing is written.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let registry = DialectRegistry::builtin()?.with_aliases(&config.source_aliases);
        let store = ParquetStore::new(config.output_dir.clone());
        let store: Arc<dyn TableStore> = if config.dry_run {
            Arc::new(store.read_only())
        } else {
            Arc::new(store)
        };
        let tracker = ChangeoverTracker::new(config.reading_coupling, config.negative_volume);

        Ok(Self {
            config,
            registry: Arc::new(registry),
            store,
            tracker,
            show_progress: false,
        })
    }

    /// Replace the table store
    pub fn with_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = store;
        self
    }

    /// Show a progress bar over sources
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Main processing entry point.
    ///
    /// The state snapshot is written only after every source has been
    /// processed, and never in dry-run mode.
    pub async fn run(&self, input_path: &Path) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        info!("Loading chat log from {}", input_path.display());

        let batch = task::spawn_blocking({
            let input_path = input_path.to_path_buf();
            let layout = self.config.input_layout;
            move || load_input(&input_path, &layout)
        })
        .await
        .map_err(|e| TelemetryError::InvalidInput {
            path: input_path.to_path_buf(),
            reason: format!("input loading task failed: {}", e),
        })??;

        info!(
            "Loaded {} messages from {} files ({} incomplete rows skipped)",
            batch.messages.len(),
            batch.files.len(),
            batch.skipped_rows
        );

        let mut state = StateStore::load(&self.config.state_path);
        let mut stats = self.process_messages(batch.messages, &mut state).await;

        stats.input_files = batch.files.len();
        stats.skipped_messages += batch.skipped_rows;

        if self.config.dry_run {
            info!("Dry run: state snapshot not written");
        } else {
            state.save(&self.config.state_path)?;
            info!(
                "Saved state for {} sources to {}",
                state.len(),
                self.config.state_path.display()
            );
        }

        stats.output_path = self.config.output_dir.clone();
        stats.state_path = self.config.state_path.clone();
        stats.processing_time_ms = start_time.elapsed().as_millis();
        Ok(stats)
    }

    /// Process loaded messages against `state`, merging each completed
    /// source's state back into it
    pub async fn process_messages(
        &self,
        messages: Vec<RawMessage>,
        state: &mut StateStore,
    ) -> ProcessingStats {
        let mut stats = ProcessingStats {
            total_messages: messages.len(),
            ..Default::default()
        };

        let jobs = self.plan_jobs(messages, state, &mut stats);
        if jobs.is_empty() {
            debug!("No known sources in input");
            return stats;
        }

        let progress_bar = self.progress_bar(jobs.len());
        let concurrency = self.config.max_concurrent_sources.min(jobs.len()).max(1);
        debug!(
            "Processing {} sources with concurrency {}",
            jobs.len(),
            concurrency
        );

        let results: Vec<(String, Result<SourceOutcome>)> = stream::iter(jobs)
            .map(|job| {
                let store = self.store.clone();
                let tracker = self.tracker;
                let pb = progress_bar.clone();
                async move {
                    let source_id = job.source_id.clone();
                    pb.set_message(source_id.clone());

                    let result = task::spawn_blocking(move || {
                        run_source_job(job, store.as_ref(), &tracker)
                    })
                    .await
                    .map_err(|e| TelemetryError::ProcessingFailed {
                        source_id: source_id.clone(),
                        reason: format!("source task failed: {}", e),
                    })
                    .and_then(|result| result);

                    pb.inc(1);
                    (source_id, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        progress_bar.finish_with_message("All sources processed");

        for (source_id, result) in results {
            match result {
                Ok(outcome) => {
                    stats.sources_processed += 1;
                    stats.totals.merge(&outcome.stats);
                    state.insert(outcome.source_id, outcome.state);
                }
                Err(e) => {
                    error!("Source '{}' failed: {}", source_id, e);
                    stats.sources_failed += 1;
                }
            }
        }

        stats
    }

    /// Group messages by source and drop sources without a dialect
    fn plan_jobs(
        &self,
        messages: Vec<RawMessage>,
        state: &StateStore,
        stats: &mut ProcessingStats,
    ) -> Vec<SourceJob> {
        let mut by_source: BTreeMap<String, Vec<RawMessage>> = BTreeMap::new();
        for message in messages {
            by_source
                .entry(message.source_id.clone())
                .or_default()
                .push(message);
        }

        let mut jobs = Vec::with_capacity(by_source.len());
        for (source_id, messages) in by_source {
            let Some(dialect) = self.registry.lookup(&source_id) else {
                warn!(
                    "Skipping {} messages from unknown source '{}'",
                    messages.len(),
                    source_id
                );
                stats.skipped_messages += messages.len();
                stats.unknown_sources.insert(source_id);
                continue;
            };

            if let Some(kind) = self.registry.kind_of(&source_id) {
                debug!(
                    "Source '{}': {} messages, {} dialect",
                    source_id,
                    messages.len(),
                    kind
                );
            }
            jobs.push(SourceJob {
                state: state.get(&source_id).cloned().unwrap_or_default(),
                dialect: dialect.clone(),
                source_id,
                messages,
            });
        }
        jobs
    }

    fn progress_bar(&self, sources: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(sources as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
