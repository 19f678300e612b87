// ============================================================
// Layer 6 — Job Stores
// ============================================================
// Two implementations of the JobStore trait:
//
//   InMemoryJobStore  — RwLock<HashMap>, lives as long as the process
//   JsonJobStore      — one pretty-printed <id>.json per job
//
// JsonJobStore writes to <id>.json.tmp first and renames it
// over the real file, so a status reader never sees half a
// record even while the worker is saving.
//
// Reference: Rust Book §16 (Shared-State Concurrency)
//            Rust Book §12 (I/O and File Handling)

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::domain::error::StoreError;
use crate::domain::job::JobRecord;
use crate::domain::traits::JobStore;

// ─── InMemoryJobStore ─────────────────────────────────────────────────────────
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, id: &str) -> Result<JobRecord, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

// ─── JsonJobStore ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct JsonJobStore {
    dir: PathBuf,
}

impl JsonJobStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir.clone(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        // ids become file names; anything that could escape the directory is refused
        let valid = !id.is_empty()
            && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl JobStore for JsonJobStore {
    fn get(&self, id: &str) -> Result<JobRecord, StoreError> {
        let path = self.path_for(id)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&json).map_err(|source| StoreError::Malformed { path, source })
    }

    fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.id)?;
        let tmp  = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(record)
            .map_err(|source| StoreError::Malformed { path: path.clone(), source })?;

        fs::write(&tmp, json).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path: path.clone(), source })?;

        tracing::debug!(
            "Saved job '{}' ({:?}, {}%) to '{}'",
            record.id,
            record.status,
            record.progress,
            path.display()
        );
        Ok(())
    }
}
