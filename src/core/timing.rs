use anyhow::Result;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::shared::constants;
use crate::utils::logger;
use crate::utils::time_utils::{format_duration, format_timestamp};

#[derive(Debug, Clone)]
pub struct TimingRecord {
    pub step: String,
    pub duration: Duration,
    pub success: bool,
    /// Reconstructed as "now - duration" at the moment the record is added.
    pub started_at: DateTime<Local>,
}

/// Per-run timing context: created once at startup and passed to whoever
/// needs to measure something.
pub struct TimingRecorder {
    created: Instant,
    records: Vec<TimingRecord>,
    log_path: Option<PathBuf>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self { created: Instant::now(), records: Vec::new(), log_path: None }
    }

    /// Also appends every record to a CSV file at `path`.
    ///
    /// Appends are not synchronized; one writer per file.
    pub fn with_log(path: impl Into<PathBuf>) -> Self {
        Self { log_path: Some(path.into()), ..Self::new() }
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    pub fn total_elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Runs `op`, recording how long it took. A failure is recorded as
    /// `"<name> (failed)"` and returned unchanged.
    pub fn measure<T>(&mut self, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        println!("\n{}", "=".repeat(50));
        println!("Starting {} at {}", name, format_timestamp(Local::now()));

        let result = op();
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                println!("\nCompleted {} in {}", name, format_duration(duration));
                self.add_step(name, duration, true);
            }
            Err(e) => {
                println!("\nError in {} after {}", name, format_duration(duration));
                logger::error(&format!("{} failed after {:?}: {:#}", name, duration, e));
                self.add_step(&format!("{} (failed)", name), duration, false);
            }
        }
        result
    }

    pub fn add_step(&mut self, step: &str, duration: Duration, success: bool) {
        let started_at = Local::now() - chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let record = TimingRecord { step: step.to_string(), duration, success, started_at };

        if let Some(path) = &self.log_path {
            if let Err(e) = append_record(path, &record) {
                logger::warn(&format!("Could not append to timing log {}: {:#}", path.display(), e));
            }
        }
        self.records.push(record);
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec!["=== Timing Summary ===".to_string(), String::new(), "Detailed steps:".to_string()];
        for record in &self.records {
            let marker = if record.success { "✓" } else { "✗" };
            lines.push(format!(
                "{} {:25} - Started: {} - Duration: {}",
                marker,
                record.step,
                format_timestamp(record.started_at),
                format_duration(record.duration)
            ));
        }
        lines.push(String::new());
        lines.push(format!("Total execution time: {}", format_duration(self.total_elapsed())));
        lines
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out)?;
        for line in self.summary_lines() {
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }
}

impl Default for TimingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn append_record(path: &Path, record: &TimingRecord) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{}", constants::TIMING_LOG_HEADER)?;
    }
    writeln!(
        file,
        "{},{},{},{}",
        record.started_at.format("%Y-%m-%d %H:%M:%S%.6f"),
        csv_field(&record.step),
        record.duration.as_secs_f64(),
        record.success
    )?;
    Ok(())
}
