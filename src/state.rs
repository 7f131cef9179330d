//! Per-source tracker state and its on-disk snapshot.
//!
//! The snapshot is a JSON object keyed by source identifier. It is loaded once
//! at the start of a run and written back wholesale at the end, so a run that
//! dies halfway leaves the previous snapshot untouched.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Running state of one reporting source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Last observed inlet pressure
    #[serde(default)]
    pub last_pressure: Option<f64>,
    /// Last observed cumulative flow
    #[serde(default)]
    pub last_flow: Option<f64>,
    /// Cumulative flow at the start of the current trailer cycle
    #[serde(default)]
    pub baseline_flow: Option<f64>,
    /// `"<date> <time>"` of the most recent changeover
    #[serde(default)]
    pub last_changeover_at: Option<String>,
}

/// Keyed collection of source states
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    sources: BTreeMap<String, SourceState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// logged and also yields an empty store; it never aborts the run.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No state snapshot at {}, starting empty", path.display());
            return Self::new();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(
                    "Could not read state snapshot {}: {}. Starting from empty state",
                    path.display(),
                    e
                );
                return Self::new();
            }
        };

        match serde_json::from_str::<StateStore>(&contents) {
            Ok(store) => {
                info!(
                    "Loaded state for {} sources from {}",
                    store.len(),
                    path.display()
                );
                store
            }
            Err(e) => {
                warn!(
                    "Corrupt state snapshot {}: {}. Starting from empty state",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Overwrite the snapshot at `path`, replacing it atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;

        debug!(
            "Saved state for {} sources to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceState> {
        self.sources.get(source_id)
    }

    /// State for a source, created empty on first encounter
    pub fn entry(&mut self, source_id: &str) -> &mut SourceState {
        self.sources.entry(source_id.to_string()).or_default()
    }

    /// Replace a source's state after a successful run of that source
    pub fn insert(&mut self, source_id: impl Into<String>, state: SourceState) {
        self.sources.insert(source_id.into(), state);
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceState)> {
        self.sources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> SourceState {
        SourceState {
            last_pressure: Some(182.5),
            last_flow: Some(15230.0),
            baseline_flow: Some(14000.0),
            last_changeover_at: Some("3/14/2025 10:42:11 AM".to_string()),
        }
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::load(&temp_dir.path().join("state.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = StateStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        let mut store = StateStore::new();
        store.insert("Wasil CNG Group", sample_state());
        store.entry("Tempo CNG Group").last_flow = Some(10.0);
        store.save(&path).unwrap();

        let reloaded = StateStore::load(&path);
        assert_eq!(reloaded, store);
        assert_eq!(reloaded.get("Wasil CNG Group"), Some(&sample_state()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_snapshot_format_is_keyed_by_source() {
        let mut store = StateStore::new();
        store.insert("Tempo CNG Group", SourceState::default());

        let json: serde_json::Value = serde_json::to_value(&store).unwrap();
        let entry = &json["Tempo CNG Group"];
        assert!(entry["last_pressure"].is_null());
        assert!(entry["last_flow"].is_null());
        assert!(entry["baseline_flow"].is_null());
        assert!(entry["last_changeover_at"].is_null());
    }

    #[test]
    fn test_partial_entries_default_to_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, r#"{"Tempo CNG Group": {"last_flow": 42.0}}"#).unwrap();

        let store = StateStore::load(&path);
        let state = store.get("Tempo CNG Group").unwrap();
        assert_eq!(state.last_flow, Some(42.0));
        assert_eq!(state.baseline_flow, None);
    }

    #[test]
    fn test_entry_creates_once() {
        let mut store = StateStore::new();
        store.entry("A").last_pressure = Some(1.0);
        store.entry("A").last_flow = Some(2.0);

        assert_eq!(store.len(), 1);
        let state = store.get("A").unwrap();
        assert_eq!(state.last_pressure, Some(1.0));
        assert_eq!(state.last_flow, Some(2.0));
    }
}
