//! CNG Telemetry Library
//!
//! Extracts compressed natural gas telemetry from operator chat logs and
//! appends it to one Parquet table per reporting source.
//!
//! This library provides tools for:
//! - Loading chat log CSV exports (single files or directory trees)
//! - Extracting telemetry fields with per-source regex dialects
//! - Detecting trailer changeovers and computing dispensed volume
//! - Persisting per-source tracker state between runs
//! - Appending deduplicated records to per-source Parquet tables

pub mod assembler;
pub mod cli;
pub mod config;
pub mod constants;
pub mod dialect;
pub mod error;
pub mod input;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod tracker;

// Re-export commonly used types
pub use config::{NegativeVolumePolicy, PipelineConfig, ReadingCoupling};
pub use dialect::{Dialect, DialectKind, DialectRegistry};
pub use error::{Result, TelemetryError};
pub use models::{OutputRecord, ProcessingStats, RawMessage};
pub use pipeline::Pipeline;
pub use state::{SourceState, StateStore};
pub use store::{MemoryStore, ParquetStore, TableStore, table_name};
pub use tracker::ChangeoverTracker;
