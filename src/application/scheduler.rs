// ============================================================
// Layer 2 — Pipeline Scheduler
// ============================================================
// A single-worker FIFO queue in front of CasePipeline.
//
//   submit() ──► mpsc channel ──► worker thread ──► CasePipeline::run
//     │                              (one job at a time)
//     └─ saves the `uploaded` record, returns immediately
//
// One worker:
//   Only the worker owns the pipeline (and with it the model),
//   and it runs one job per loop turn. At most one job is ever
//   in `processing`.
//
// Shutdown:
//   Dropping the scheduler (or calling shutdown) closes the
//   channel. The worker finishes every job still queued, the
//   receiver iterator ends, and the thread is joined.
//
// Status reads do not go through the scheduler at all: callers
// read the JobStore directly.
//
// Reference: Rust Book §16 (Using Message Passing to Transfer Data)

use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use crate::application::pipeline::{CasePipeline, JobOutcome};
use crate::domain::error::{panic_message, PipelineError, SubmissionError};
use crate::domain::job::{JobDescriptor, JobRecord};
use crate::domain::modality::Modality;
use crate::domain::traits::{JobStore, Segmenter};

pub struct PipelineScheduler {
    sender: Option<mpsc::Sender<JobDescriptor>>,
    worker: Option<JoinHandle<()>>,
    store:  Arc<dyn JobStore>,
}

impl PipelineScheduler {
    /// Spawn the worker thread that owns `pipeline`.
    pub fn start<S>(pipeline: CasePipeline<S>) -> std::io::Result<Self>
    where
        S: Segmenter + Send + 'static,
    {
        let store = pipeline.store().clone();
        let (sender, receiver) = mpsc::channel::<JobDescriptor>();

        let worker = thread::Builder::new()
            .name("pipeline-worker".into())
            .spawn(move || worker_loop(pipeline, receiver))?;

        Ok(Self { sender: Some(sender), worker: Some(worker), store })
    }

    /// Save an `uploaded` record for `job` and queue it.
    pub fn submit(&self, job: JobDescriptor) -> Result<(), SubmissionError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SubmissionError::QueueClosed(job.id().to_string()))?;

        let record = JobRecord::new(job.id());
        self.store.save(&record)?;

        let id = job.id().to_string();
        if sender.send(job).is_err() {
            let mut record = record;
            if record.fail("scheduler stopped before the job ran").is_ok() {
                if let Err(e) = self.store.save(&record) {
                    tracing::warn!("Could not persist rejection of job {}: {}", id, e);
                }
            }
            return Err(SubmissionError::QueueClosed(id));
        }
        tracing::info!("Queued job {}", id);
        Ok(())
    }

    /// Validate modality-tagged paths and queue them as one job.
    /// Invalid submissions never reach the store or the queue.
    pub fn submit_files(
        &self,
        id:    impl Into<String>,
        files: Vec<(Modality, PathBuf)>,
    ) -> Result<String, SubmissionError> {
        let job = JobDescriptor::new(id, files)?;
        let id  = job.id().to_string();
        self.submit(job)?;
        Ok(id)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// False once the worker thread has exited
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map_or(false, |w| !w.is_finished())
    }

    /// Close the queue, let the worker drain it, and join.
    pub fn shutdown(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        // dropping the only sender ends the worker's receive loop
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Pipeline worker thread panicked");
            }
        }
    }
}

impl Drop for PipelineScheduler {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

fn worker_loop<S: Segmenter>(mut pipeline: CasePipeline<S>, receiver: mpsc::Receiver<JobDescriptor>) {
    tracing::info!("Pipeline worker started");

    for job in receiver {
        tracing::info!("Processing job {}", job.id());

        // a panicking stage must not take the worker down with it
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&job)));

        match outcome {
            Ok(JobOutcome::Completed(_)) => {}
            Ok(JobOutcome::Failed(e)) => {
                tracing::debug!("Job {} ended with {} error", job.id(), e.kind());
            }
            Err(payload) => {
                let error = PipelineError::Panicked(panic_message(payload));
                match pipeline.store().get(job.id()) {
                    Ok(mut record) => pipeline.record_failure(&mut record, &error),
                    Err(e) => tracing::warn!("Job {} panicked and its record is unreadable: {}", job.id(), e),
                }
            }
        }
    }

    tracing::info!("Pipeline worker stopped: queue closed and drained");
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::*;
    use crate::domain::error::StoreError;
    use crate::domain::job::{JobStatus, Stage};
    use crate::domain::volume::{LabelVolume, ModalityTensor};
    use crate::domain::error::{InferenceError, ModelLoadError};
    use crate::ml::inferencer::InferenceEngine;
    use crate::ml::model::UNet3dConfig;
    use burn::backend::NdArray;
    use ndarray::Array3;
    use std::time::Duration;

    fn start<S: Segmenter + Send + 'static>(
        segmenter: S,
        root:      &std::path::Path,
    ) -> (PipelineScheduler, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::new());
        let pipeline = CasePipeline::new(segmenter, store.clone(), test_config(root));
        (PipelineScheduler::start(pipeline).unwrap(), store)
    }

    #[test]
    fn test_progress_is_monotonic_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let job = write_case(dir.path(), "mono", (6, 6, 4));
        let (scheduler, store) = start(FakeSegmenter::labelling(1), dir.path());

        scheduler.submit(job).unwrap();
        scheduler.shutdown();

        let history = store.history("mono");
        assert_eq!(history.first().unwrap().status, JobStatus::Uploaded);
        assert_eq!(history.last().unwrap().status, JobStatus::Complete);

        let allowed: Vec<u8> = Stage::ALL.iter().map(|s| s.progress()).collect();
        let observed: Vec<u8> = history
            .iter()
            .filter(|r| r.status != JobStatus::Uploaded)
            .map(|r| r.progress)
            .collect();
        assert_eq!(observed, allowed);
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_burst_runs_one_job_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store) = start(FakeSegmenter::slow(3, Duration::from_millis(20)), dir.path());

        let ids: Vec<String> = (0..6).map(|i| format!("burst{i}")).collect();
        for id in &ids {
            scheduler.submit(write_case(dir.path(), id, (4, 4, 2))).unwrap();
        }
        scheduler.shutdown();

        assert_eq!(store.max_processing(), 1);
        for id in &ids {
            assert_eq!(store.get(id).unwrap().status, JobStatus::Complete);
        }
    }

    #[test]
    fn test_worker_survives_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_case(dir.path(), "bad", (4, 4, 4));
        std::fs::remove_file(bad.path(Modality::T1c)).unwrap();
        let good = write_case(dir.path(), "good", (4, 4, 4));

        let (scheduler, store) = start(FakeSegmenter::labelling(0), dir.path());
        scheduler.submit(bad).unwrap();
        scheduler.submit(good).unwrap();
        scheduler.shutdown();

        let bad = store.get("bad").unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.progress, Stage::LoadingData.progress());
        assert_eq!(store.get("good").unwrap().status, JobStatus::Complete);
    }

    #[test]
    fn test_three_paths_never_reach_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, store) = start(FakeSegmenter::labelling(0), dir.path());

        let files = vec![
            (Modality::T1,  dir.path().join("a.nii")),
            (Modality::T1c, dir.path().join("b.nii")),
            (Modality::T2,  dir.path().join("c.nii")),
        ];
        let err = scheduler.submit_files("short", files).unwrap_err();
        assert!(matches!(err, SubmissionError::WrongCount(3)));
        scheduler.shutdown();

        assert!(matches!(store.get("short"), Err(StoreError::NotFound(_))));
        assert!(store.history("short").is_empty());
    }

    #[test]
    fn test_all_zero_volumes_complete() {
        let dir = tempfile::tempdir().unwrap();
        let files = Modality::ALL
            .iter()
            .map(|m| {
                let path = dir.path().join(format!("zero_{}.nii.gz", m.label()));
                crate::data::nifti::testing::write_volume(&path, &Array3::zeros((64, 64, 64)), true);
                (*m, path)
            })
            .collect();

        let (scheduler, store) = start(FakeSegmenter::labelling(0), dir.path());
        scheduler.submit_files("zeros", files).unwrap();
        scheduler.shutdown();

        let record = store.get("zeros").unwrap();
        assert_eq!(record.status, JobStatus::Complete, "{:?}", record.error_message);
        assert_eq!(record.results.unwrap().metrics["whole_tumor"], 0.0);
    }

    #[test]
    fn test_all_zero_volumes_complete_through_real_engine() {
        use crate::infra::checkpoint::{testing, PytorchLayout, CHECKPOINT_FILE};

        let dir    = tempfile::tempdir().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir_all(&models).unwrap();
        let tiny = UNet3dConfig::new().with_base_width(2);
        // zero convs + identity norms: every voxel takes the head bias argmax (edema)
        let dict = testing::constant_state_dict(&tiny, [0.0, 0.0, 5.0, 0.0]);
        testing::write_torch_checkpoint(&models.join(CHECKPOINT_FILE), PytorchLayout::Raw, &dict);

        let files = Modality::ALL
            .iter()
            .map(|m| {
                let path = dir.path().join(format!("blank_{}.nii.gz", m.label()));
                crate::data::nifti::testing::write_volume(&path, &Array3::zeros((64, 64, 64)), true);
                (*m, path)
            })
            .collect();

        let engine = InferenceEngine::<NdArray>::new(&models, tiny);
        let (scheduler, store) = start(engine, dir.path());
        scheduler.submit_files("blank", files).unwrap();
        scheduler.shutdown();

        let record = store.get("blank").unwrap();
        assert_eq!(record.status, JobStatus::Complete, "{:?}", record.error_message);
        assert_eq!(record.progress, 100);

        let metrics = record.results.unwrap().metrics;
        assert_eq!(metrics["whole_tumor"], 1.0);
        assert_eq!(metrics["tumor_core"], 0.0);
        assert_eq!(metrics["enhancing_tumor"], 0.0);
        assert!(dir.path().join("out/blank/animation.gif").is_file());
    }

    #[test]
    fn test_missing_checkpoint_fails_at_loading_model() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir_all(&models).unwrap();
        let job = write_case(dir.path(), "nockpt", (4, 4, 4));

        let engine = InferenceEngine::<NdArray>::new(&models, UNet3dConfig::new().with_base_width(2));
        let (scheduler, store) = start(engine, dir.path());
        scheduler.submit(job).unwrap();
        scheduler.shutdown();

        let record = store.get("nockpt").unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, Stage::LoadingModel.progress());
        assert!(record.error_message.unwrap().contains("not found"));
    }

    /// Panics inside segment(), as a broken backend kernel would
    struct PanickingSegmenter;

    impl Segmenter for PanickingSegmenter {
        fn ensure_loaded(&mut self) -> Result<(), ModelLoadError> {
            Ok(())
        }

        fn segment(&self, _: &ModalityTensor) -> Result<LabelVolume, InferenceError> {
            panic!("kernel exploded")
        }
    }

    #[test]
    fn test_panicking_stage_fails_only_that_job() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_case(dir.path(), "p1", (4, 4, 4));
        let b = write_case(dir.path(), "p2", (4, 4, 4));

        let (scheduler, store) = start(PanickingSegmenter, dir.path());
        scheduler.submit(a).unwrap();
        scheduler.submit(b).unwrap();
        scheduler.shutdown();

        for id in ["p1", "p2"] {
            let record = store.get(id).unwrap();
            assert_eq!(record.status, JobStatus::Failed);
            assert_eq!(record.progress, Stage::RunningInference.progress());
            assert!(record.error_message.unwrap().contains("kernel exploded"));
        }
    }

    #[test]
    fn test_submit_after_worker_gone_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, _) = start(FakeSegmenter::labelling(0), dir.path());
        scheduler.close_and_join();
        let err = scheduler.submit(write_case(dir.path(), "late", (2, 2, 2))).unwrap_err();
        assert!(matches!(err, SubmissionError::QueueClosed(_)));
    }

    /// Accepts the first `budget` saves, then refuses every write
    struct WriteBudgetStore {
        inner:  RecordingStore,
        budget: std::sync::atomic::AtomicUsize,
    }

    impl JobStore for WriteBudgetStore {
        fn get(&self, id: &str) -> Result<crate::domain::job::JobRecord, StoreError> {
            self.inner.get(id)
        }

        fn save(&self, record: &crate::domain::job::JobRecord) -> Result<(), StoreError> {
            use std::sync::atomic::Ordering;
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(StoreError::Poisoned);
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.save(record)
        }
    }

    #[test]
    fn test_dead_worker_still_reports_queue_closed_when_store_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(WriteBudgetStore {
            inner:  RecordingStore::new(),
            budget: std::sync::atomic::AtomicUsize::new(1),
        });

        // a queue whose worker is already gone
        let (sender, receiver) = mpsc::channel();
        drop(receiver);
        let scheduler = PipelineScheduler { sender: Some(sender), worker: None, store: store.clone() };

        let err = scheduler.submit(write_case(dir.path(), "orphan", (2, 2, 2))).unwrap_err();
        assert!(matches!(err, SubmissionError::QueueClosed(ref id) if id == "orphan"));

        // the failure write was refused, so the uploaded record is what remains
        assert_eq!(store.get("orphan").unwrap().status, JobStatus::Uploaded);
        assert!(!scheduler.is_running());
    }
}
