//! Error handling for telemetry extraction and persistence.
//!
//! Provides error types with context for input loading, dialect validation,
//! state snapshots and per-source table writes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input not found at path: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Invalid input file: {path} - {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    #[error("Invalid dialect {dialect}: {reason}")]
    InvalidDialect { dialect: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to provision table {table} for source '{source_id}': {reason}")]
    TableProvisioning {
        source_id: String,
        table: String,
        reason: String,
    },

    #[error("Failed to insert record {date} {time} into {table}: {reason}")]
    Insertion {
        table: String,
        date: String,
        time: String,
        reason: String,
    },

    #[error("Processing failed for source '{source_id}': {reason}")]
    ProcessingFailed { source_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
