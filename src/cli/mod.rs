// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `segment` — segment one case and follow it to the end
//   2. `batch`   — queue every case in a manifest, follow them all
//   3. `status`  — print a stored job record
//
// Job records are printed as pretty JSON, the same shape that
// is stored in <store_dir>/<job id>.json.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{bail, Result};
use clap::Parser;
use commands::{BatchArgs, Commands, SegmentArgs, StatusArgs};

use crate::domain::job::{JobRecord, JobStatus};
use crate::infra::config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "brainseg",
    version = "0.1.0",
    about = "Segment brain tumours in multi-modal MRI with a 3D U-Net and render the results."
)]
pub struct Cli {
    /// The subcommand to run (segment, batch or status)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Segment(args) => run_segment(args),
            Commands::Batch(args)   => run_batch(args),
            Commands::Status(args)  => run_status(args),
        }
    }
}

fn run_segment(args: SegmentArgs) -> Result<()> {
    use crate::application::segment_use_case::SegmentUseCase;

    let files  = args.files();
    let config = PipelineConfig::try_from(args.pipeline)?;
    let use_case = SegmentUseCase::new(config)?;

    let id = use_case.submit(args.job_id, files)?;
    tracing::info!("Submitted job {}", id);

    let records = use_case.wait(&[id])?;
    use_case.finish();

    print_records(&records)?;
    exit_status(&records)
}

fn run_batch(args: BatchArgs) -> Result<()> {
    use crate::application::segment_use_case::{load_manifest, SegmentUseCase};

    let cases  = load_manifest(&args.manifest)?;
    let config = PipelineConfig::try_from(args.pipeline)?;
    let use_case = SegmentUseCase::new(config)?;

    // everything is queued before anything is awaited
    let mut ids = Vec::with_capacity(cases.len());
    for case in cases {
        let files = case.files();
        ids.push(use_case.submit(case.id, files)?);
    }
    tracing::info!("Submitted {} jobs from '{}'", ids.len(), args.manifest.display());

    let records = use_case.wait(&ids)?;
    use_case.finish();

    print_records(&records)?;
    exit_status(&records)
}

fn run_status(args: StatusArgs) -> Result<()> {
    use crate::application::segment_use_case::job_status;

    let config = PipelineConfig::try_from(args.pipeline)?;
    let record = job_status(&config.store_dir, &args.job_id)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_records(records: &[JobRecord]) -> Result<()> {
    for record in records {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}

/// A non-zero exit when any job failed
fn exit_status(records: &[JobRecord]) -> Result<()> {
    let failed: Vec<&str> = records
        .iter()
        .filter(|r| r.status == JobStatus::Failed)
        .map(|r| r.id.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("{} of {} jobs failed: {}", failed.len(), records.len(), failed.join(", "));
    }
    Ok(())
}
