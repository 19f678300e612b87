// ============================================================
// Layer 3 — Jobs
// ============================================================
// A job is one submitted case: four volumes in, one label
// volume and two rendered artifacts out.
//
//   JobDescriptor  what the worker needs to run the case
//                  (immutable, consumed once)
//   JobRecord      what the outside world sees about the case
//                  (persisted through a JobStore)
//
// Record lifecycle:
//
//   uploaded ──► processing ──► complete
//                     │
//                     └──────► failed
//
// `complete` and `failed` are terminal. The transition methods
// on JobRecord refuse to leave them, so no caller can revive a
// finished job by accident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::error::{JobStateError, SubmissionError};
use crate::domain::modality::Modality;

// ─── JobDescriptor ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    id:    String,
    /// Indexed by `Modality::channel()`
    paths: [PathBuf; Modality::COUNT],
}

impl JobDescriptor {
    /// Build a descriptor from modality-tagged paths in any order.
    ///
    /// Rejects anything other than exactly one path per modality.
    pub fn new(
        id:    impl Into<String>,
        files: Vec<(Modality, PathBuf)>,
    ) -> Result<Self, SubmissionError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SubmissionError::EmptyId);
        }
        if files.len() != Modality::COUNT {
            return Err(SubmissionError::WrongCount(files.len()));
        }

        let mut slots: [Option<PathBuf>; Modality::COUNT] = Default::default();
        for (modality, path) in files {
            let slot = &mut slots[modality.channel()];
            if slot.is_some() {
                return Err(SubmissionError::DuplicateModality(modality));
            }
            *slot = Some(path);
        }

        // Four entries, no duplicates: every slot is filled
        let [t1, t1c, t2, flair] = slots;
        match (t1, t1c, t2, flair) {
            (Some(t1), Some(t1c), Some(t2), Some(flair)) => {
                Ok(Self { id, paths: [t1, t1c, t2, flair] })
            }
            _ => Err(SubmissionError::WrongCount(Modality::COUNT - 1)),
        }
    }

    /// Build a descriptor from paths already in [T1, T1c, T2, FLAIR] order.
    pub fn from_ordered(
        id:    impl Into<String>,
        paths: Vec<PathBuf>,
    ) -> Result<Self, SubmissionError> {
        if paths.len() != Modality::COUNT {
            return Err(SubmissionError::WrongCount(paths.len()));
        }
        let files = Modality::ALL.into_iter().zip(paths).collect();
        Self::new(id, files)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self, modality: Modality) -> &Path {
        &self.paths[modality.channel()]
    }

    /// (modality, path) pairs in canonical channel order
    pub fn files(&self) -> impl Iterator<Item = (Modality, &Path)> {
        Modality::ALL
            .into_iter()
            .map(move |m| (m, self.paths[m.channel()].as_path()))
    }
}

// ─── JobStatus ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

// ─── Stage ────────────────────────────────────────────────────────────────────
/// Progress checkpoints written while a job is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    LoadingModel,
    LoadingData,
    Processing,
    RunningInference,
    CreatingVisualizations,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::LoadingModel,
        Stage::LoadingData,
        Stage::Processing,
        Stage::RunningInference,
        Stage::CreatingVisualizations,
        Stage::Complete,
    ];

    pub fn progress(self) -> u8 {
        match self {
            Stage::LoadingModel           => 20,
            Stage::LoadingData            => 40,
            Stage::Processing             => 60,
            Stage::RunningInference       => 80,
            Stage::CreatingVisualizations => 90,
            Stage::Complete               => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::LoadingModel           => "Loading model",
            Stage::LoadingData            => "Loading data",
            Stage::Processing             => "Processing",
            Stage::RunningInference       => "Running inference",
            Stage::CreatingVisualizations => "Creating visualizations",
            Stage::Complete               => "Complete",
        }
    }
}

// ─── JobResults ───────────────────────────────────────────────────────────────
/// Open-ended metric payload, keyed by metric name
pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    /// URL of the multi-panel preview image
    pub static_image: String,
    /// URL of the animated slice sweep
    pub gif:          String,
    pub metrics:      Metrics,
    pub timestamp:    DateTime<Utc>,
    pub progress:     u8,
    pub status:       String,
}

impl JobResults {
    pub fn new(static_image: String, gif: String, metrics: Metrics) -> Self {
        Self {
            static_image,
            gif,
            metrics,
            timestamp: Utc::now(),
            progress:  Stage::Complete.progress(),
            status:    Stage::Complete.label().to_string(),
        }
    }
}

// ─── JobRecord ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id:             String,
    pub status:         JobStatus,
    /// 0 to 100
    pub progress:       u8,
    pub status_message: String,
    pub results:        Option<JobResults>,
    pub error_message:  Option<String>,
    pub created_at:     DateTime<Utc>,
    pub updated_at:     DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted case, waiting in the queue
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id:             id.into(),
            status:         JobStatus::Uploaded,
            progress:       0,
            status_message: "Uploaded".to_string(),
            results:        None,
            error_message:  None,
            created_at:     now,
            updated_at:     now,
        }
    }

    /// uploaded → processing
    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.require(JobStatus::Uploaded, JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.touch();
        Ok(())
    }

    /// Record a progress checkpoint. Progress never moves backwards.
    pub fn advance(&mut self, stage: Stage) -> Result<(), JobStateError> {
        self.require(JobStatus::Processing, JobStatus::Processing)?;
        self.progress       = self.progress.max(stage.progress());
        self.status_message = stage.label().to_string();
        self.touch();
        Ok(())
    }

    /// processing → complete
    pub fn complete(&mut self, results: JobResults) -> Result<(), JobStateError> {
        self.require(JobStatus::Processing, JobStatus::Complete)?;
        self.status         = JobStatus::Complete;
        self.progress       = Stage::Complete.progress();
        self.status_message = Stage::Complete.label().to_string();
        self.results        = Some(results);
        self.touch();
        Ok(())
    }

    /// uploaded | processing → failed. Progress stays where it was.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            return Err(self.illegal(JobStatus::Failed));
        }
        let message = message.into();
        self.status         = JobStatus::Failed;
        self.status_message = format!("Failed: {message}");
        self.error_message  = Some(message);
        self.touch();
        Ok(())
    }

    fn require(&self, expected: JobStatus, to: JobStatus) -> Result<(), JobStateError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.illegal(to))
        }
    }

    fn illegal(&self, to: JobStatus) -> JobStateError {
        JobStateError { id: self.id.clone(), from: self.status, to }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn four() -> Vec<(Modality, PathBuf)> {
        vec![
            (Modality::Flair, "f.nii".into()),
            (Modality::T1,    "a.nii".into()),
            (Modality::T2,    "c.nii".into()),
            (Modality::T1c,   "b.nii".into()),
        ]
    }

    #[test]
    fn test_descriptor_orders_paths_canonically() {
        let d = JobDescriptor::new("j1", four()).unwrap();
        let order: Vec<_> = d.files().map(|(_, p)| p.to_path_buf()).collect();
        assert_eq!(order, vec![
            PathBuf::from("a.nii"),
            PathBuf::from("b.nii"),
            PathBuf::from("c.nii"),
            PathBuf::from("f.nii"),
        ]);
    }

    #[test]
    fn test_descriptor_rejects_three_paths() {
        let mut files = four();
        files.pop();
        assert!(matches!(
            JobDescriptor::new("j1", files),
            Err(SubmissionError::WrongCount(3))
        ));
        assert!(matches!(
            JobDescriptor::from_ordered("j1", vec!["a".into(), "b".into(), "c".into()]),
            Err(SubmissionError::WrongCount(3))
        ));
    }

    #[test]
    fn test_descriptor_rejects_duplicate_modality() {
        let mut files = four();
        files[0].0 = Modality::T1;
        assert!(matches!(
            JobDescriptor::new("j1", files),
            Err(SubmissionError::DuplicateModality(Modality::T1))
        ));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut r = JobRecord::new("j1");
        r.start().unwrap();
        for stage in Stage::ALL.iter().take(5) {
            r.advance(*stage).unwrap();
            assert_eq!(r.progress, stage.progress());
            assert_eq!(r.status_message, stage.label());
        }
        let res = JobResults::new("/p.png".into(), "/a.gif".into(), Metrics::new());
        r.complete(res).unwrap();
        assert_eq!(r.status, JobStatus::Complete);
        assert_eq!(r.progress, 100);
        assert_eq!(r.results.as_ref().unwrap().status, "Complete");
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut r = JobRecord::new("j1");
        r.start().unwrap();
        r.advance(Stage::LoadingData).unwrap();
        r.fail("boom").unwrap();
        assert_eq!(r.progress, 40);
        assert_eq!(r.error_message.as_deref(), Some("boom"));

        assert!(r.advance(Stage::Processing).is_err());
        assert!(r.fail("again").is_err());
        let err = r.start().unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
    }

    #[test]
    fn test_cannot_complete_without_processing() {
        let mut r = JobRecord::new("j1");
        let res = JobResults::new(String::new(), String::new(), Metrics::new());
        assert!(r.complete(res).is_err());
        assert_eq!(r.status, JobStatus::Uploaded);
    }

    #[test]
    fn test_status_serialises_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
