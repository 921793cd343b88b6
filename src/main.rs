mod config;
mod core;
mod decoder;
mod error;
mod segmentation;
mod shared;
mod utils;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::{ConfigFile, PipelineConfig};
use crate::core::{run_with_summary, stages, CheckpointStore, TimingRecorder};
use crate::shared::constants;
use crate::utils::{file_utils, logger};

#[derive(Parser)]
#[command(author, version, about = "Resumable video to background-removed frames pipeline", long_about = None)]
struct Cli {
    /// Path to input video file
    #[arg(long = "input_video", required_unless_present = "status")]
    input_video: Option<PathBuf>,
    /// Directory to save outputs
    #[arg(long = "output_dir")]
    output_dir: PathBuf,
    /// Number of frames to extract from one second of video
    #[arg(long = "frames_from_one_sec", default_value_t = 1, allow_negative_numbers = true)]
    frames_from_one_sec: i64,
    /// Mask R-CNN frozen graph (overrides vid2fg.config)
    #[arg(long = "model_weights")]
    model_weights: Option<PathBuf>,
    /// Mask R-CNN graph description (overrides vid2fg.config)
    #[arg(long = "model_config")]
    model_config: Option<PathBuf>,
    /// Minimum person confidence, exclusive
    #[arg(long)]
    confidence: Option<f32>,
    /// Encoding of sampled frames
    #[arg(long = "image_ext", default_value = constants::DEFAULT_FRAME_EXTENSION)]
    image_ext: String,
    /// Append timing records to a CSV file (defaults to <output_dir>/timing_log.csv)
    #[arg(long = "timing_log", num_args = 0..=1)]
    timing_log: Option<Option<PathBuf>>,
    /// Forget all checkpointed progress before running
    #[arg(long)]
    reset: bool,
    /// Print the checkpoint document and exit
    #[arg(long)]
    status: bool,
}

impl Cli {
    fn into_config(self, file: &ConfigFile) -> Result<PipelineConfig> {
        let input_video = self.input_video.context("--input_video is required")?;
        let mut config =
            PipelineConfig::new(input_video, self.output_dir, self.frames_from_one_sec).with_file(file);

        if let Some(weights) = self.model_weights {
            config.model_weights = weights;
        }
        if let Some(graph) = self.model_config {
            config.model_config = graph;
        }
        if let Some(confidence) = self.confidence {
            config.confidence = confidence;
        }
        config.image_ext = self.image_ext;
        config.timing_log = match self.timing_log {
            Some(Some(path)) => Some(path),
            Some(None) => Some(config.default_timing_log()),
            None => None,
        };
        Ok(config)
    }
}

fn print_status(output_dir: &Path) -> Result<()> {
    let store = CheckpointStore::open(output_dir)?;
    if store.state().is_empty() {
        println!("No progress recorded in {}", store.path().display());
        return Ok(());
    }
    for (step, record) in store.state().iter() {
        let status = if record.completed { "completed" } else { "started" };
        println!("{:25} {:10} started {}", step, status, record.started_at);
        if let (Some(at), Some(secs)) = (&record.completed_at, record.elapsed_time_sec) {
            println!("{:25} {:10} finished {} ({:.2}s)", "", "", at, secs);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.status {
        return print_status(&cli.output_dir);
    }

    let reset = cli.reset;
    let file = ConfigFile::load(Path::new(constants::PIPELINE_CONFIG_FILE))?;
    let config = cli.into_config(&file)?;

    // Fail fast on bad input before touching the output directory
    let rate = config.validate()?;

    file_utils::ensure_dir(&config.output_dir)?;
    logger::init(&config.output_dir);
    logger::info(&format!("Configuration: {:?}", config));

    let mut checkpoints = CheckpointStore::open(&config.output_dir)?;
    if reset {
        checkpoints.reset()?;
    }

    let mut timing = match &config.timing_log {
        Some(path) => TimingRecorder::with_log(path),
        None => TimingRecorder::new(),
    };

    let mut pipeline = stages::pipeline_stages(&config, rate);
    let report = run_with_summary(&mut pipeline, &mut checkpoints, &mut timing)?;

    logger::info(&format!(
        "Pipeline finished: {} executed, {} already completed",
        report.executed.len(),
        report.skipped.len()
    ));
    Ok(())
}
