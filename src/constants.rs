//! Application constants for the telemetry pipeline
//!
//! Thresholds, default column positions and output column names shared by
//! the tracker, assembler and table store.

// =============================================================================
// Changeover and Completeness Thresholds
// =============================================================================

/// Minimum inlet-pressure jump (bar) that marks a new trailer coming online
pub const CHANGEOVER_PRESSURE_JUMP: f64 = 5.0;

/// Minimum number of extracted dialect fields for a message to count as a report.
///
/// Derived columns are not counted. Anything below this is treated as chatter.
pub const MIN_PRESENT_FIELDS: usize = 3;

// =============================================================================
// Input Layout
// =============================================================================

/// Column positions of the chat logger CSV:
/// `Group Name,Sender Name,Message,Phone Number,Date,Time`
pub mod input_columns {
    pub const SOURCE: usize = 0;
    pub const MESSAGE: usize = 2;
    pub const DATE: usize = 4;
    pub const TIME: usize = 5;

    /// Highest column position a layout may address
    pub const MAX_POSITION: usize = 1024;
}

/// Extension of chat log exports picked up when the input is a directory
pub const INPUT_FILE_EXTENSION: &str = "csv";

// =============================================================================
// Output Tables
// =============================================================================

/// Standard columns present in every source table, ahead of the dialect fields
pub mod columns {
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const IS_CHANGEOVER: &str = "is_changeover";
    pub const BASELINE_FLOW: &str = "baseline_flow";
    pub const VOLUME: &str = "volume";
    pub const WRITTEN_AT: &str = "written_at";

    /// Derived and key columns, in table order
    pub const STANDARD: &[&str] = &[DATE, TIME, IS_CHANGEOVER, BASELINE_FLOW, VOLUME];
}

/// File extension of persisted source tables
pub const TABLE_FILE_EXTENSION: &str = "parquet";

// =============================================================================
// Default Locations
// =============================================================================

/// Application directory name under the platform data directory
pub const APP_DIR_NAME: &str = "cng-telemetry";

/// Default state snapshot file name
pub const STATE_FILE_NAME: &str = "source_state.json";

/// Default output directory name for source tables
pub const TABLES_DIR_NAME: &str = "tables";
