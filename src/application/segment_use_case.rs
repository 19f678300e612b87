// ============================================================
// Layer 2 — SegmentUseCase
// ============================================================
// What the CLI talks to. Wires the layers together once:
//
//   Step 1: Open the JSON job store       (Layer 6 - infra)
//   Step 2: Save the config next to it    (Layer 6 - infra)
//   Step 3: Build the inference engine    (Layer 5 - ml)
//   Step 4: Start the pipeline worker     (Layer 2 - scheduler)
//
// then submits cases and follows their records until every one
// is complete or failed. Following is a read-only poll of the
// store, the same view any other status reader gets.
//
// Reference: Rust Book §9.2 (Propagating Errors with ?)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};
use uuid::Uuid;

use crate::application::{pipeline::CasePipeline, scheduler::PipelineScheduler};
use crate::domain::job::JobRecord;
use crate::domain::modality::Modality;
use crate::domain::traits::{JobStore, Segmenter};
use crate::infra::{config::PipelineConfig, job_store::JsonJobStore};
use crate::ml::inferencer::{InferBackend, InferenceEngine};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ─── Batch Manifest ──────────────────────────────────────────────────────────
// One case per entry:
//   [{ "id": "case-01", "t1": "...", "t1c": "...", "t2": "...", "flair": "..." }]
// Relative paths are resolved against the manifest's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseManifestEntry {
    #[serde(default)]
    pub id:    Option<String>,
    pub t1:    PathBuf,
    pub t1c:   PathBuf,
    pub t2:    PathBuf,
    pub flair: PathBuf,
}

impl CaseManifestEntry {
    pub fn files(&self) -> Vec<(Modality, PathBuf)> {
        vec![
            (Modality::T1,    self.t1.clone()),
            (Modality::T1c,   self.t1c.clone()),
            (Modality::T2,    self.t2.clone()),
            (Modality::Flair, self.flair.clone()),
        ]
    }

    fn resolve_against(mut self, base: &Path) -> Self {
        for path in [&mut self.t1, &mut self.t1c, &mut self.t2, &mut self.flair] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<CaseManifestEntry>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read manifest '{}'", path.display()))?;
    let entries: Vec<CaseManifestEntry> = serde_json::from_str(&json)
        .with_context(|| format!("Invalid manifest '{}'", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(entries.into_iter().map(|e| e.resolve_against(base)).collect())
}

// ─── Use Case ────────────────────────────────────────────────────────────────
pub struct SegmentUseCase {
    config:    PipelineConfig,
    scheduler: PipelineScheduler,
}

impl SegmentUseCase {
    /// Build the real engine from `config` and start the worker.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let engine = InferenceEngine::<InferBackend>::new(&config.model_dir, config.unet());
        Self::with_segmenter(config, engine)
    }

    pub fn with_segmenter<S>(config: PipelineConfig, segmenter: S) -> Result<Self>
    where
        S: Segmenter + Send + 'static,
    {
        // ── Step 1: Job store ───────────────────────────────────────────────
        let store = JsonJobStore::open(&config.store_dir)
            .with_context(|| format!("Cannot open job store '{}'", config.store_dir.display()))?;

        // ── Step 2: Config snapshot ─────────────────────────────────────────
        config.save_to(&config.store_dir)?;

        // ── Step 3 + 4: Pipeline and worker ─────────────────────────────────
        let pipeline  = CasePipeline::new(segmenter, Arc::new(store), config.clone());
        let scheduler = PipelineScheduler::start(pipeline)
            .context("Cannot start the pipeline worker thread")?;

        tracing::info!(
            "Pipeline ready: models in '{}', results in '{}'",
            config.model_dir.display(),
            config.output_root.display()
        );
        Ok(Self { config, scheduler })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queue one case. A missing id gets a fresh UUID.
    pub fn submit(&self, id: Option<String>, files: Vec<(Modality, PathBuf)>) -> Result<String> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.scheduler
            .submit_files(id.clone(), files)
            .with_context(|| format!("Job '{}' was rejected", id))
    }

    /// Block until every job in `ids` is complete or failed.
    pub fn wait(&self, ids: &[String]) -> Result<Vec<JobRecord>> {
        let store = self.scheduler.store();
        let mut last_seen: HashMap<&str, (u8, String)> = HashMap::new();

        loop {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                let record = store
                    .get(id)
                    .with_context(|| format!("Cannot read status of job '{}'", id))?;

                let seen = (record.progress, record.status_message.clone());
                if last_seen.get(id.as_str()) != Some(&seen) {
                    tracing::info!("[{}] {:>3}% {}", id, record.progress, record.status_message);
                    last_seen.insert(id.as_str(), seen);
                }
                records.push(record);
            }

            if records.iter().all(|r| r.status.is_terminal()) {
                return Ok(records);
            }
            if !self.scheduler.is_running() {
                bail!("Pipeline worker stopped while jobs were still pending");
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Let the worker drain its queue and stop.
    pub fn finish(self) {
        self.scheduler.shutdown();
    }
}

/// Read one stored record without starting a pipeline.
pub fn job_status(store_dir: &Path, id: &str) -> Result<JobRecord> {
    let store = JsonJobStore::open(store_dir)
        .with_context(|| format!("Cannot open job store '{}'", store_dir.display()))?;
    store
        .get(id)
        .with_context(|| format!("No status for job '{}' in '{}'", id, store_dir.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::*;
    use crate::domain::job::JobStatus;
    use crate::infra::config::CONFIG_FILE;

    #[test]
    fn test_segment_and_wait_until_complete() {
        let dir    = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let case   = write_case(dir.path(), "unused", (6, 6, 4));
        let files  = Modality::ALL.iter().map(|m| (*m, case.path(*m).to_path_buf())).collect();

        let use_case = SegmentUseCase::with_segmenter(config.clone(), FakeSegmenter::labelling(3)).unwrap();
        let id = use_case.submit(None, files).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let records = use_case.wait(&[id.clone()]).unwrap();
        use_case.finish();

        assert_eq!(records[0].status, JobStatus::Complete);
        assert_eq!(records[0].results.as_ref().unwrap().metrics["enhancing_tumor"], 1.0);
        assert!(config.store_dir.join(format!("{id}.json")).is_file());
        assert!(config.store_dir.join(CONFIG_FILE).is_file());

        let stored = job_status(&config.store_dir, &id).unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
    }

    #[test]
    fn test_rejected_submission_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let use_case = SegmentUseCase::with_segmenter(test_config(dir.path()), FakeSegmenter::labelling(0)).unwrap();
        let files = vec![(Modality::T1, dir.path().join("t1.nii")), (Modality::T1, dir.path().join("t1b.nii"))];
        let err = use_case.submit(Some("dup".into()), files).unwrap_err();
        assert!(format!("{err:#}").contains("exactly 4"));
    }

    #[test]
    fn test_manifest_paths_resolve_against_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("cases.json");
        fs::write(
            &manifest,
            r#"[{"id": "c1", "t1": "a/t1.nii", "t1c": "a/t1c.nii", "t2": "/abs/t2.nii", "flair": "a/flair.nii"}]"#,
        )
        .unwrap();

        let entries = load_manifest(&manifest).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_deref(), Some("c1"));
        assert_eq!(entries[0].t1, dir.path().join("a/t1.nii"));
        assert_eq!(entries[0].t2, PathBuf::from("/abs/t2.nii"));
        assert_eq!(entries[0].files()[3].0, Modality::Flair);
    }

    #[test]
    fn test_status_of_unknown_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = job_status(dir.path(), "nope").unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}
