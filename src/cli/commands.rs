// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `segment`, `batch` and `status`
// and all their configurable flags.
//
// Pipeline settings come from, in increasing priority:
//   1. PipelineConfig::default()
//   2. a JSON file given with --config
//   3. individual flags such as --model-dir
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::domain::modality::Modality;
use crate::infra::config::PipelineConfig;

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment one case from its four MRI volumes
    Segment(SegmentArgs),

    /// Segment every case listed in a JSON manifest
    Batch(BatchArgs),

    /// Print the stored record of a job
    Status(StatusArgs),
}

/// Flags shared by every command that touches the pipeline.
/// Each one left unset keeps the value from --config (or the default).
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// JSON file with pipeline settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding best_model.pth (its parent is searched too)
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Artifacts are written to <output-root>/<job id>/
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Directory of <job id>.json status records
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// URL prefix written into job results
    #[arg(long)]
    pub results_url_prefix: Option<String>,

    /// Width of the first U-Net block; must match the checkpoint
    #[arg(long)]
    pub base_width: Option<usize>,

    /// Edge length in pixels of one preview panel
    #[arg(long)]
    pub preview_panel_px: Option<u32>,
}

/// Convert CLI flags into the application-layer PipelineConfig.
/// The application layer never sees clap types.
impl TryFrom<PipelineArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(a: PipelineArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => PipelineConfig::load(path)?,
            None       => PipelineConfig::default(),
        };

        if let Some(v) = a.model_dir          { cfg.model_dir = v; }
        if let Some(v) = a.output_root        { cfg.output_root = v; }
        if let Some(v) = a.store_dir          { cfg.store_dir = v; }
        if let Some(v) = a.results_url_prefix { cfg.results_url_prefix = v; }
        if let Some(v) = a.base_width         { cfg.base_width = v; }
        if let Some(v) = a.preview_panel_px   { cfg.preview_panel_px = v; }

        Ok(cfg)
    }
}

/// All arguments for the `segment` command
#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// T1-weighted volume (.nii or .nii.gz)
    #[arg(long)]
    pub t1: PathBuf,

    /// Contrast-enhanced T1 volume
    #[arg(long)]
    pub t1c: PathBuf,

    /// T2-weighted volume
    #[arg(long)]
    pub t2: PathBuf,

    /// FLAIR volume
    #[arg(long)]
    pub flair: PathBuf,

    /// Job id; a random UUID when omitted
    #[arg(long)]
    pub job_id: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl SegmentArgs {
    pub fn files(&self) -> Vec<(Modality, PathBuf)> {
        vec![
            (Modality::T1,    self.t1.clone()),
            (Modality::T1c,   self.t1c.clone()),
            (Modality::T2,    self.t2.clone()),
            (Modality::Flair, self.flair.clone()),
        ]
    }
}

/// All arguments for the `batch` command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON list of {id?, t1, t1c, t2, flair} entries
    #[arg(long)]
    pub manifest: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// All arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Id of the job to look up
    #[arg(long)]
    pub job_id: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"model_dir": "/from/file", "base_width": 16}"#).unwrap();

        let args = PipelineArgs {
            config:     Some(path),
            base_width: Some(8),
            ..PipelineArgs::default()
        };
        let cfg = PipelineConfig::try_from(args).unwrap();
        assert_eq!(cfg.model_dir, PathBuf::from("/from/file"));
        assert_eq!(cfg.base_width, 8);
        assert_eq!(cfg.results_url_prefix, "/media/results");
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let cfg = PipelineConfig::try_from(PipelineArgs::default()).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn test_segment_command_parses() {
        use clap::Parser;
        let cli = crate::cli::Cli::try_parse_from([
            "brainseg", "segment",
            "--t1", "a.nii", "--t1c", "b.nii", "--t2", "c.nii", "--flair", "d.nii",
            "--model-dir", "/m",
        ])
        .unwrap();
        match cli.command {
            Commands::Segment(args) => {
                assert_eq!(args.files()[1], (Modality::T1c, PathBuf::from("b.nii")));
                assert_eq!(args.pipeline.model_dir, Some(PathBuf::from("/m")));
                assert!(args.job_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
