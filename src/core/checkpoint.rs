use anyhow::{Context, Result};
use chrono::Local;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::PipelineError;
use crate::shared::constants;
use crate::utils::file_utils;
use crate::utils::logger;
use crate::utils::time_utils::format_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub started_at: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time_sec: Option<f64>,
}

/// Stage name to record, in the order stages were first started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState(IndexMap<String, StepRecord>);

impl PipelineState {
    pub fn get(&self, step: &str) -> Option<&StepRecord> {
        self.0.get(step)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StepRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Persists stage progress as `progress.json` in the output directory.
///
/// Every mutation rewrites the whole document through a temp file and a
/// rename. Only one process may use a given output directory at a time.
pub struct CheckpointStore {
    path: PathBuf,
    state: PipelineState,
    start_times: HashMap<String, Instant>,
}

impl CheckpointStore {
    pub fn open(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(constants::PROGRESS_FILE);
        let state = Self::load(&path)?;
        logger::debug(&format!(
            "Loaded checkpoint {} with {} stage(s)",
            path.display(),
            state.len()
        ));
        Ok(Self { path, state, start_times: HashMap::new() })
    }

    fn load(path: &Path) -> Result<PipelineState> {
        if !path.exists() {
            return Ok(PipelineState::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
        let state = serde_json::from_str(&content).map_err(|source| PipelineError::MalformedCheckpoint {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(state)
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        file_utils::write_atomic(&self.path, json.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.state.get(step).is_some_and(|record| record.completed)
    }

    /// Records a fresh start for `step`, discarding any earlier attempt.
    pub fn mark_started(&mut self, step: &str) -> Result<()> {
        self.start_times.insert(step.to_string(), Instant::now());
        self.state.0.insert(
            step.to_string(),
            StepRecord {
                started_at: format_timestamp(Local::now()),
                completed: false,
                completed_at: None,
                elapsed_time_sec: None,
            },
        );
        self.save()?;
        logger::info(&format!("Checkpoint: '{}' started", step));
        Ok(())
    }

    /// Marks `step` completed, measuring elapsed time from the
    /// [`mark_started`](Self::mark_started) call made by this process.
    pub fn mark_completed(&mut self, step: &str) -> Result<()> {
        let Some(started) = self.start_times.remove(step) else {
            return Err(PipelineError::CompletedWithoutStart(step.to_string()).into());
        };
        let elapsed = started.elapsed().as_secs_f64();

        let record = self
            .state
            .0
            .get_mut(step)
            .ok_or_else(|| PipelineError::CompletedWithoutStart(step.to_string()))?;
        record.completed = true;
        record.completed_at = Some(format_timestamp(Local::now()));
        record.elapsed_time_sec = Some(elapsed);

        self.save()?;
        logger::info(&format!("Checkpoint: '{}' completed in {:.3}s", step, elapsed));
        Ok(())
    }

    /// Forgets all progress, removing the document from disk.
    pub fn reset(&mut self) -> Result<()> {
        self.state = PipelineState::default();
        self.start_times.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        logger::info("Checkpoint reset");
        Ok(())
    }
}
