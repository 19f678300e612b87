// ============================================================
// Layer 2 — Case Pipeline
// ============================================================
// Runs ONE job from start to finish:
//
//   progress  stage                      work
//   ───────── ────────────────────────── ───────────────────────────────
//      20     Loading model              segmenter.ensure_loaded()
//      40     Loading data               VolumeLoader × 4
//      60     Processing                 ChannelNormalizer::prepare
//      80     Running inference          segmenter.segment()
//      90     Creating visualizations    preview.png + animation.gif
//     100     Complete                   results written to the record
//
// Each checkpoint is saved before the work it announces, so a
// failed job's progress tells you which stage broke. The
// failure itself is recorded on the job and returned as
// JobOutcome::Failed; it never escapes as a panic or an Err.

use std::sync::Arc;

use crate::data::{loader::VolumeLoader, normalizer::ChannelNormalizer};
use crate::domain::error::{PipelineError, StoreError};
use crate::domain::job::{JobDescriptor, JobRecord, JobResults, Stage};
use crate::domain::traits::{JobStore, MetricsProvider, Segmenter};
use crate::domain::volume::ImageVolume;
use crate::infra::config::PipelineConfig;
use crate::infra::metrics::RegionFractions;
use crate::render::{SegmentationVisualizer, ANIMATION_FILE, PREVIEW_FILE};

/// What happened to one job
#[derive(Debug)]
pub enum JobOutcome {
    Completed(JobResults),
    Failed(PipelineError),
}

pub struct CasePipeline<S: Segmenter> {
    segmenter:  S,
    store:      Arc<dyn JobStore>,
    config:     PipelineConfig,
    loader:     VolumeLoader,
    normalizer: ChannelNormalizer,
    visualizer: SegmentationVisualizer,
    metrics:    Box<dyn MetricsProvider>,
}

impl<S: Segmenter> CasePipeline<S> {
    pub fn new(segmenter: S, store: Arc<dyn JobStore>, config: PipelineConfig) -> Self {
        let visualizer = SegmentationVisualizer::new(config.preview_panel_px);
        Self {
            segmenter,
            store,
            config,
            loader: VolumeLoader::new(),
            normalizer: ChannelNormalizer::new(),
            visualizer,
            metrics: Box::new(RegionFractions),
        }
    }

    /// Replace the shipped region-fraction metrics.
    pub fn with_metrics(mut self, metrics: Box<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Drive `job` through every stage and record the result.
    pub fn run(&mut self, job: &JobDescriptor) -> JobOutcome {
        let mut record = match self.store.get(job.id()) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!("Job {} has no stored record, creating one", job.id());
                JobRecord::new(job.id())
            }
            Err(e) => return JobOutcome::Failed(e.into()),
        };

        match self.execute(job, &mut record) {
            Ok(results) => {
                tracing::info!("Job {} complete", job.id());
                JobOutcome::Completed(results)
            }
            Err(e) => {
                self.record_failure(&mut record, &e);
                JobOutcome::Failed(e)
            }
        }
    }

    /// Mark `record` failed with `error` and persist it, best effort.
    pub fn record_failure(&self, record: &mut JobRecord, error: &PipelineError) {
        tracing::error!(
            "Job {} failed at {}% ({}): {}",
            record.id, record.progress, error.kind(), error
        );
        if let Err(e) = record.fail(error.to_string()) {
            tracing::warn!("Could not mark job {} failed: {}", record.id, e);
            return;
        }
        if let Err(e) = self.store.save(record) {
            tracing::warn!("Could not persist failure of job {}: {}", record.id, e);
        }
    }

    fn execute(
        &mut self,
        job:    &JobDescriptor,
        record: &mut JobRecord,
    ) -> Result<JobResults, PipelineError> {
        record.start()?;

        // ── Step 1: model ────────────────────────────────────────────────────
        self.checkpoint(record, Stage::LoadingModel)?;
        self.segmenter.ensure_loaded()?;

        // ── Step 2: volumes ──────────────────────────────────────────────────
        self.checkpoint(record, Stage::LoadingData)?;
        let volumes = job
            .files()
            .map(|(_, path)| self.loader.load(path))
            .collect::<Result<Vec<ImageVolume>, _>>()?;

        // ── Step 3: tensor ───────────────────────────────────────────────────
        self.checkpoint(record, Stage::Processing)?;
        let tensor = self.normalizer.prepare(&volumes)?;
        drop(volumes);

        // ── Step 4: inference ────────────────────────────────────────────────
        self.checkpoint(record, Stage::RunningInference)?;
        let labels = self.segmenter.segment(&tensor)?;

        // ── Step 5: artifacts ────────────────────────────────────────────────
        self.checkpoint(record, Stage::CreatingVisualizations)?;
        let out_dir = self.config.job_output_dir(job.id());
        self.visualizer.render(&tensor, &labels, &out_dir)?;

        let results = JobResults::new(
            self.config.result_url(job.id(), PREVIEW_FILE),
            self.config.result_url(job.id(), ANIMATION_FILE),
            self.metrics.compute(&labels),
        );

        // only adopt the completed state once it is safely stored
        let mut done = record.clone();
        done.complete(results.clone())?;
        self.store.save(&done)?;
        *record = done;

        Ok(results)
    }

    fn checkpoint(&self, record: &mut JobRecord, stage: Stage) -> Result<(), PipelineError> {
        record.advance(stage)?;
        self.store.save(record)?;
        tracing::info!("Job {}: {} ({}%)", record.id, stage.label(), stage.progress());
        Ok(())
    }
}
