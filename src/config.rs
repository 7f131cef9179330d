//! Configuration management and validation.
//!
//! Provides the pipeline configuration: input column layout, output and
//! state locations, tracker policies and source aliases. A configuration can
//! be loaded from a JSON file; anything it leaves out falls back to defaults.

use crate::constants::{self, input_columns};
use crate::dialect::DialectKind;
use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a malformed pressure or flow capture affects its sibling reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingCoupling {
    /// A malformed pressure or flow capture discards both readings
    #[default]
    Coupled,
    /// Each reading is discarded on its own
    Independent,
}

/// Treatment of negative cumulative volume after a changeover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeVolumePolicy {
    /// Store the literal difference
    #[default]
    Keep,
    /// Store zero instead of a negative value
    Clamp,
}

/// Positions of the columns in the chat log export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLayout {
    pub source: usize,
    pub message: usize,
    pub date: usize,
    pub time: usize,
    /// Whether the first row holds column names
    pub has_header: bool,
}

impl Default for InputLayout {
    fn default() -> Self {
        Self {
            source: input_columns::SOURCE,
            message: input_columns::MESSAGE,
            date: input_columns::DATE,
            time: input_columns::TIME,
            has_header: true,
        }
    }
}

impl InputLayout {
    /// Number of columns a row must have to be addressable
    pub fn min_columns(&self) -> usize {
        [self.source, self.message, self.date, self.time]
            .into_iter()
            .max()
            .unwrap_or(0)
            .saturating_add(1)
    }
}

/// Global configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding one Parquet table per source
    pub output_dir: PathBuf,

    /// State snapshot location
    pub state_path: PathBuf,

    /// Column layout of the input CSV
    pub input_layout: InputLayout,

    /// Maximum number of sources processed at the same time
    pub max_concurrent_sources: usize,

    /// Pressure/flow failure coupling
    pub reading_coupling: ReadingCoupling,

    /// Negative volume handling
    pub negative_volume: NegativeVolumePolicy,

    /// Extra source identifiers mapped onto built-in dialects
    pub source_aliases: HashMap<String, DialectKind>,

    /// Process and report without writing tables or state
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base_dir = default_data_dir();
        Self {
            output_dir: base_dir.join(constants::TABLES_DIR_NAME),
            state_path: base_dir.join(constants::STATE_FILE_NAME),
            input_layout: InputLayout::default(),
            max_concurrent_sources: num_cpus::get().clamp(1, 8),
            reading_coupling: ReadingCoupling::default(),
            negative_volume: NegativeVolumePolicy::default(),
            source_aliases: HashMap::new(),
            dry_run: false,
        }
    }
}

/// Platform data directory for tables and state, falling back to the working directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::APP_DIR_NAME)
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TelemetryError::Configuration {
            message: format!("Cannot read config file {}: {}", path.display(), e),
        })?;

        let config: PipelineConfig =
            serde_json::from_str(&contents).map_err(|e| TelemetryError::Configuration {
                message: format!("Invalid config file {}: {}", path.display(), e),
            })?;

        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sources == 0 {
            return Err(TelemetryError::Configuration {
                message: "max_concurrent_sources must be at least 1".to_string(),
            });
        }

        let layout = &self.input_layout;
        let positions = [layout.source, layout.message, layout.date, layout.time];
        for (i, position) in positions.iter().enumerate() {
            if *position > input_columns::MAX_POSITION {
                return Err(TelemetryError::Configuration {
                    message: format!(
                        "input column {} is beyond the last supported column {}",
                        position,
                        input_columns::MAX_POSITION
                    ),
                });
            }
            if positions[..i].contains(position) {
                return Err(TelemetryError::Configuration {
                    message: format!("input column {} is assigned twice", position),
                });
            }
        }

        Ok(())
    }

    /// Set the output directory
    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Set the state snapshot path
    pub fn with_state_path(mut self, state_path: PathBuf) -> Self {
        self.state_path = state_path;
        self
    }

    /// Set the maximum number of concurrently processed sources
    pub fn with_max_concurrent_sources(mut self, max_sources: usize) -> Self {
        self.max_concurrent_sources = max_sources;
        self
    }

    /// Decouple pressure and flow parse failures
    pub fn with_independent_readings(mut self) -> Self {
        self.reading_coupling = ReadingCoupling::Independent;
        self
    }

    /// Clamp negative volumes to zero
    pub fn with_clamped_volume(mut self) -> Self {
        self.negative_volume = NegativeVolumePolicy::Clamp;
        self
    }

    /// Map an additional source identifier onto a dialect
    pub fn with_alias(mut self, source_id: impl Into<String>, kind: DialectKind) -> Self {
        self.source_aliases.insert(source_id.into(), kind);
        self
    }

    /// Set the input column layout
    pub fn with_input_layout(mut self, layout: InputLayout) -> Self {
        self.input_layout = layout;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.input_layout.source, 0);
        assert_eq!(config.input_layout.message, 2);
        assert_eq!(config.input_layout.date, 4);
        assert_eq!(config.input_layout.time, 5);
        assert_eq!(config.input_layout.min_columns(), 6);
        assert_eq!(config.reading_coupling, ReadingCoupling::Coupled);
        assert_eq!(config.negative_volume, NegativeVolumePolicy::Keep);
        assert!(config.max_concurrent_sources >= 1);
        assert!(config.state_path.ends_with("source_state.json"));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_partial_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "reading_coupling": "independent",
                "negative_volume": "clamp",
                "source_aliases": { "Wasil Ikeja": "wasil" },
                "input_layout": { "message": 1, "date": 3, "time": 4 }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.reading_coupling, ReadingCoupling::Independent);
        assert_eq!(config.negative_volume, NegativeVolumePolicy::Clamp);
        assert_eq!(
            config.source_aliases.get("Wasil Ikeja"),
            Some(&DialectKind::Wasil)
        );
        assert_eq!(config.input_layout.source, 0);
        assert_eq!(config.input_layout.message, 1);
        assert!(config.input_layout.has_header);
    }

    #[test]
    fn test_unknown_dialect_alias_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "source_aliases": { "X": "shell" } }"#).unwrap();

        match PipelineConfig::from_file(&path).unwrap_err() {
            TelemetryError::Configuration { message } => {
                assert!(message.contains("Invalid config file"));
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_columns_rejected() {
        let config = PipelineConfig::default().with_input_layout(InputLayout {
            date: 2,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_column_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            format!(r#"{{"input_layout": {{"time": {}}}}}"#, usize::MAX),
        )
        .unwrap();

        match PipelineConfig::from_file(&path).unwrap_err() {
            TelemetryError::Configuration { message } => {
                assert!(message.contains("beyond the last supported column"));
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }

        let layout = InputLayout {
            time: input_columns::MAX_POSITION,
            ..Default::default()
        };
        assert!(PipelineConfig::default().with_input_layout(layout).validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = PipelineConfig::default().with_max_concurrent_sources(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = PipelineConfig::default()
            .with_output_dir(PathBuf::from("/tmp/tables"))
            .with_state_path(PathBuf::from("/tmp/state.json"))
            .with_independent_readings()
            .with_clamped_volume()
            .with_alias("Tempo Lekki", DialectKind::Tempo)
            .with_dry_run();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/tables"));
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
        assert_eq!(config.reading_coupling, ReadingCoupling::Independent);
        assert_eq!(config.negative_volume, NegativeVolumePolicy::Clamp);
        assert_eq!(config.source_aliases.len(), 1);
        assert!(config.dry_run);
    }
}
