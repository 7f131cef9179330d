//! Integration tests for the pipeline module
//!
//! Runs complete chat log exports through the pipeline against temporary
//! output directories.


use crate::config::PipelineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HEADER: &str = "Group Name,Sender Name,Message,Phone Number,Date,Time\n";

/// One chat log row for the given group
pub fn csv_row(group: &str, message: &str, date: &str, time: &str) -> String {
    format!("{},Operator,\"{}\",2348000000000,{},{}\n", group, message, date, time)
}

/// A dispatch-format report with pressure and flow
pub fn dispatch_report(pressure: &str, flow: &str) -> String {
    format!(
        "Skid No: 4 Standby: 2 Inlet pressure: {}bar Total flow: {}scm",
        pressure, flow
    )
}

/// Write a chat log and return its path
pub fn write_chat_log(temp_dir: &TempDir, name: &str, rows: &[String]) -> PathBuf {
    let path = temp_dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut contents = String::from(HEADER);
    for row in rows {
        contents.push_str(row);
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Configuration rooted in a temporary directory
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_output_dir(root.join("tables"))
        .with_state_path(root.join("state").join("source_state.json"))
        .with_max_concurrent_sources(2)
}

/// Read back a source's Parquet table
pub fn read_source_table(config: &PipelineConfig, source_id: &str) -> polars::prelude::DataFrame {
    use polars::prelude::{ParquetReader, SerReader};

    let path = config
        .output_dir
        .join(format!("{}.parquet", crate::store::table_name(source_id)));
    let file = fs::File::open(&path).unwrap();
    ParquetReader::new(file).finish().unwrap()
}

/// Float column as a vector of options
pub fn f64_values(df: &polars::prelude::DataFrame, column: &str) -> Vec<Option<f64>> {
    df.column(column)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}
