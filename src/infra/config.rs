// ============================================================
// Layer 6 — Pipeline Configuration
// ============================================================
// Everything the pipeline needs to know about its environment,
// in one serde struct so it can be read from JSON with
// `--config` or built from CLI flags.
//
// A copy is written next to the job records on every run,
// so a stored result can always be traced back to the model
// directory and settings that produced it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::model::UNet3dConfig;

pub const CONFIG_FILE: &str = "pipeline_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding best_model.pth (its parent is searched too)
    pub model_dir:          PathBuf,
    /// Artifacts land in <output_root>/<job id>/
    pub output_root:        PathBuf,
    /// Directory of <id>.json job records
    pub store_dir:          PathBuf,
    /// Public URL prefix written into job results
    pub results_url_prefix: String,
    /// Width of the first U-Net block; must match the checkpoint
    pub base_width:         usize,
    /// Edge length in pixels of one preview panel
    pub preview_panel_px:   u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir:          PathBuf::from("models"),
            output_root:        PathBuf::from("media/results"),
            store_dir:          PathBuf::from("media/jobs"),
            results_url_prefix: "/media/results".to_string(),
            base_width:         32,
            preview_panel_px:   240,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config in '{}'", path.display()))
    }

    /// Write this config as pretty JSON into `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved pipeline config to '{}'", path.display());
        Ok(path)
    }

    pub fn unet(&self) -> UNet3dConfig {
        UNet3dConfig::new().with_base_width(self.base_width)
    }

    /// Directory receiving one job's artifacts
    pub fn job_output_dir(&self, job_id: &str) -> PathBuf {
        self.output_root.join(job_id)
    }

    /// Public URL of one job artifact
    pub fn result_url(&self, job_id: &str, file: &str) -> String {
        format!("{}/{}/{}", self.results_url_prefix.trim_end_matches('/'), job_id, file)
    }
}
