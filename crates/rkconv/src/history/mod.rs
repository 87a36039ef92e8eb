//! Records of jobs that finished in an earlier run of the service.
//!
//! History comes from two places: the job journal, when one is configured,
//! and the converted artifacts left in the output directory. Artifacts
//! already described by the journal are not duplicated.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{json, Map};
use walkdir::WalkDir;

use crate::db::{job_repo, Database};
use crate::job::{JobInfo, JobState, OUTPUT_EXTENSION};

#[derive(Debug, Default, Clone)]
pub struct HistoryStore {
    records: HashMap<String, JobState>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads journal entries first, then fills in artifacts from
    /// `output_root` that the journal does not know about.
    pub fn load(output_root: &Path, journal: Option<&Database>) -> Self {
        let mut store = Self::new();

        if let Some(db) = journal {
            match job_repo::list_terminal(db) {
                Ok(rows) => {
                    for row in rows {
                        match row.to_state() {
                            Ok(state) => store.insert(state),
                            Err(e) => warn!("Skipping journal entry {}: {}", row.id, e),
                        }
                    }
                }
                Err(e) => warn!("Failed to read job journal: {}", e),
            }
        }
        let from_journal = store.len();

        for state in scan_output_directory(output_root) {
            if !store.contains(state.id()) {
                store.insert(state);
            }
        }

        info!(
            "Loaded {} historical job(s), {} from the journal",
            store.len(),
            from_journal
        );
        store
    }

    /// Adds a record. Stored records are always marked historical.
    pub fn insert(&mut self, mut state: JobState) {
        state.is_historical = true;
        self.records.insert(state.id().to_string(), state);
    }

    pub fn get(&self, id: &str) -> Option<&JobState> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobState> {
        self.records.values()
    }

    /// Drops every record whose id fails `keep`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.records.retain(|id, _| keep(id));
    }
}

/// Splits `<model_name>_<job_id>.rknn` at the last underscore. A name
/// without an underscore uses its whole stem as both parts.
pub fn parse_artifact_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name
        .strip_suffix(OUTPUT_EXTENSION)
        .and_then(|rest| rest.strip_suffix('.'))?;
    if stem.is_empty() {
        return None;
    }

    match stem.rsplit_once('_') {
        Some((model, id)) if !model.is_empty() && !id.is_empty() => {
            Some((model.to_string(), id.to_string()))
        }
        _ => Some((stem.to_string(), stem.to_string())),
    }
}

/// Builds historical records for the artifacts directly under `root`.
pub fn scan_output_directory(root: &Path) -> Vec<JobState> {
    if !root.is_dir() {
        debug!("Output directory {} does not exist yet", root.display());
        return Vec::new();
    }

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to read output directory entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let file_name = entry.file_name().to_str()?;
            let (model_name, id) = parse_artifact_name(file_name)?;
            let metadata = entry.metadata().ok();

            let completed_at = metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

            let mut extra = Map::new();
            extra.insert("file_size".to_string(), json!(size));
            extra.insert("recovered_from".to_string(), json!("output_directory"));

            let info = JobInfo {
                id,
                model_name,
                model_kind: None,
                primary_file: None,
                priority: 0,
                callback_url: None,
                metadata: extra,
                output_path: Some(entry.path().to_path_buf()),
            };
            Some(JobState::historical(
                info,
                completed_at,
                entry.path().to_path_buf(),
            ))
        })
        .collect()
}
