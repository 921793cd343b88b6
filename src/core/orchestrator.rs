use anyhow::{Context, Result};
use std::io::{stdout, Write};

use super::checkpoint::CheckpointStore;
use super::timing::TimingRecorder;
use crate::utils::logger;

/// One checkpoint-tracked unit of pipeline work.
///
/// `run` must be safe to execute again from scratch: a stage that failed or
/// was interrupted is rerun in full on the next invocation.
pub trait Stage {
    /// Key used in the checkpoint document.
    fn name(&self) -> &str;

    /// Human-readable label for console output.
    fn title(&self) -> &str;

    fn run(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Runs `stages` in order, skipping those the checkpoint already marks
/// completed. The first failing stage aborts the run; its checkpoint is
/// left started-but-incomplete.
pub fn run_stages(
    stages: &mut [Box<dyn Stage + '_>],
    checkpoints: &mut CheckpointStore,
    timing: &mut TimingRecorder,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    for (i, stage) in stages.iter_mut().enumerate() {
        let number = i + 1;
        let name = stage.name().to_string();

        if checkpoints.is_completed(&name) {
            println!("Step {}: {}... [Completed]", number, stage.title());
            logger::info(&format!("Skipping completed stage '{}'", name));
            report.skipped.push(name);
            continue;
        }

        println!("Step {}: {}...", number, stage.title());
        logger::info(&format!("Running stage '{}'", name));

        checkpoints.mark_started(&name)?;
        timing
            .measure(&name, || stage.run())
            .with_context(|| format!("stage '{}' failed", name))?;
        checkpoints.mark_completed(&name)?;

        report.executed.push(name);
    }

    Ok(report)
}

/// [`run_stages`], followed by the timing summary on stdout whether or not
/// the run succeeded.
pub fn run_with_summary(
    stages: &mut [Box<dyn Stage + '_>],
    checkpoints: &mut CheckpointStore,
    timing: &mut TimingRecorder,
) -> Result<RunReport> {
    run_with_summary_to(stages, checkpoints, timing, &mut stdout())
}

pub fn run_with_summary_to<W: Write>(
    stages: &mut [Box<dyn Stage + '_>],
    checkpoints: &mut CheckpointStore,
    timing: &mut TimingRecorder,
    out: &mut W,
) -> Result<RunReport> {
    let result = run_stages(stages, checkpoints, timing);
    if let Err(e) = &result {
        logger::error(&format!("Pipeline aborted: {:#}", e));
    }
    if let Err(e) = timing.write_summary(out) {
        logger::warn(&format!("Could not write timing summary: {}", e));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::{extract_frames, SamplingRate};
    use crate::core::foreground::preprocess_images;
    use crate::segmentation::{BoundingBox, Detection, InstanceMask};
    use crate::shared::constants;
    use crate::test_support::{FixedModel, SyntheticVideo};
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::thread::sleep;
    use std::time::Duration;

    /// Counts its runs and fails the first `failures` of them.
    struct CountingStage {
        name: &'static str,
        runs: Rc<Cell<u32>>,
        failures: Rc<Cell<u32>>,
        sleep: Duration,
    }

    impl Stage for CountingStage {
        fn name(&self) -> &str {
            self.name
        }

        fn title(&self) -> &str {
            self.name
        }

        fn run(&mut self) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            sleep(self.sleep);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(anyhow!("{} failed", self.name));
            }
            Ok(())
        }
    }

    struct Harness {
        runs: Vec<Rc<Cell<u32>>>,
        failures: Vec<Rc<Cell<u32>>>,
    }

    const NAMES: [&str; 3] = ["first", "second", "third"];

    impl Harness {
        fn new() -> Self {
            Self {
                runs: (0..3).map(|_| Rc::new(Cell::new(0))).collect(),
                failures: (0..3).map(|_| Rc::new(Cell::new(0))).collect(),
            }
        }

        fn stages(&self, sleep: Duration) -> Vec<Box<dyn Stage>> {
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    Box::new(CountingStage {
                        name: *name,
                        runs: self.runs[i].clone(),
                        failures: self.failures[i].clone(),
                        sleep,
                    }) as Box<dyn Stage>
                })
                .collect()
        }

        fn runs(&self) -> Vec<u32> {
            self.runs.iter().map(|r| r.get()).collect()
        }
    }

    /// Simulates one process invocation against `dir`.
    fn invoke(dir: &Path, stages: &mut [Box<dyn Stage + '_>], timing: &mut TimingRecorder) -> Result<RunReport> {
        let mut checkpoints = CheckpointStore::open(dir)?;
        run_with_summary(stages, &mut checkpoints, timing)
    }

    #[test]
    fn runs_all_stages_in_order_then_skips_them() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new();

        let report = invoke(dir.path(), &mut harness.stages(Duration::ZERO), &mut TimingRecorder::new()).unwrap();
        assert_eq!(report.executed, NAMES);
        assert!(report.skipped.is_empty());

        let mut timing = TimingRecorder::new();
        let report = invoke(dir.path(), &mut harness.stages(Duration::ZERO), &mut timing).unwrap();
        assert!(report.executed.is_empty());
        assert_eq!(report.skipped, NAMES);
        assert_eq!(harness.runs(), vec![1, 1, 1]);
        assert!(timing.records().is_empty());
    }

    #[test]
    fn failure_aborts_and_resume_starts_at_failed_stage() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new();
        harness.failures[1].set(1);

        let mut timing = TimingRecorder::new();
        let err = invoke(dir.path(), &mut harness.stages(Duration::ZERO), &mut timing).unwrap_err();
        assert!(format!("{:#}", err).contains("second failed"));
        assert_eq!(harness.runs(), vec![1, 1, 0]);

        let steps: Vec<&str> = timing.records().iter().map(|r| r.step.as_str()).collect();
        assert_eq!(steps, vec!["first", "second (failed)"]);

        let store = CheckpointStore::open(dir.path()).unwrap();
        assert!(store.is_completed("first"));
        assert!(!store.is_completed("second"));
        assert!(store.state().get("second").is_some());
        assert!(store.state().get("third").is_none());

        let report = invoke(dir.path(), &mut harness.stages(Duration::ZERO), &mut TimingRecorder::new()).unwrap();
        assert_eq!(report.skipped, vec!["first"]);
        assert_eq!(report.executed, vec!["second", "third"]);
        assert_eq!(harness.runs(), vec![1, 2, 1]);
    }

    #[test]
    fn summary_is_written_after_a_failed_stage() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new();
        harness.failures[1].set(1);

        let mut out = Vec::new();
        let mut checkpoints = CheckpointStore::open(dir.path()).unwrap();
        let result = run_with_summary_to(
            &mut harness.stages(Duration::ZERO),
            &mut checkpoints,
            &mut TimingRecorder::new(),
            &mut out,
        );
        assert!(result.is_err());

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert!(lines.contains(&"=== Timing Summary ==="));
        assert!(lines.iter().any(|l| l.starts_with("✓ first")));
        assert!(lines.iter().any(|l| l.starts_with("✗ second (failed)")));
        assert!(!printed.contains("third"));
        assert!(lines.last().unwrap().starts_with("Total execution time: "));
    }

    #[test]
    fn total_time_covers_stage_durations_and_log_has_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join(constants::TIMING_LOG_FILE);
        let harness = Harness::new();
        harness.failures[2].set(1);

        let mut timing = TimingRecorder::with_log(&log);
        let stage_sleep = Duration::from_millis(20);
        assert!(invoke(dir.path(), &mut harness.stages(stage_sleep), &mut timing).is_err());

        assert_eq!(timing.records().len(), 3);
        assert!(timing.total_elapsed() >= stage_sleep * 3);
        let rows = fs::read_to_string(&log).unwrap().lines().count();
        assert_eq!(rows, 1 + 3);
    }

    /// Sampler and foreground extractor wired as stages over synthetic inputs.
    struct SampleStage {
        images: PathBuf,
    }

    impl Stage for SampleStage {
        fn name(&self) -> &str {
            constants::STAGE_EXTRACT_FRAMES
        }

        fn title(&self) -> &str {
            "Extracting frames from video"
        }

        fn run(&mut self) -> Result<()> {
            fs::create_dir_all(&self.images)?;
            let mut video = SyntheticVideo::new(30.0, 100);
            extract_frames(&mut video, &self.images, SamplingRate::new(3)?, "png")?;
            Ok(())
        }
    }

    struct ForegroundStage {
        images: PathBuf,
        processed: PathBuf,
    }

    impl Stage for ForegroundStage {
        fn name(&self) -> &str {
            constants::STAGE_PREPROCESS_IMAGES
        }

        fn title(&self) -> &str {
            "Preprocessing images"
        }

        fn run(&mut self) -> Result<()> {
            fs::create_dir_all(&self.processed)?;
            let mut model = FixedModel(vec![Detection {
                class_id: constants::PERSON_CLASS_ID,
                confidence: 0.9,
                bbox: BoundingBox { x1: 0.25, y1: 0.25, x2: 0.75, y2: 0.75 },
                mask: InstanceMask::filled(15, 15, 1.0),
            }]);
            preprocess_images(&mut model, &self.images, &self.processed, 0.5)?;
            Ok(())
        }
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        for sub in [constants::IMAGES_DIR, constants::PROCESSED_IMAGES_DIR] {
            for entry in fs::read_dir(root.join(sub)).unwrap() {
                let path = entry.unwrap().path();
                files.insert(path.clone(), fs::read(&path).unwrap());
            }
        }
        let progress = root.join(constants::PROGRESS_FILE);
        files.insert(progress.clone(), fs::read(&progress).unwrap());
        files
    }

    #[test]
    fn completed_pipeline_rerun_does_no_work_and_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join(constants::IMAGES_DIR);
        let processed = dir.path().join(constants::PROCESSED_IMAGES_DIR);
        let build = || -> Vec<Box<dyn Stage>> {
            vec![
                Box::new(SampleStage { images: images.clone() }),
                Box::new(ForegroundStage { images: images.clone(), processed: processed.clone() }),
            ]
        };

        let first = invoke(dir.path(), &mut build(), &mut TimingRecorder::new()).unwrap();
        assert_eq!(first.executed.len(), 2);
        let before = snapshot(dir.path());
        assert_eq!(fs::read_dir(&processed).unwrap().count(), 10);

        let second = invoke(dir.path(), &mut build(), &mut TimingRecorder::new()).unwrap();
        assert!(second.executed.is_empty());
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn resume_does_not_redo_completed_stage_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join(constants::IMAGES_DIR);
        let processed = dir.path().join(constants::PROCESSED_IMAGES_DIR);

        // first process dies right after sampling is checkpointed
        let mut only_sampling: Vec<Box<dyn Stage>> = vec![Box::new(SampleStage { images: images.clone() })];
        invoke(dir.path(), &mut only_sampling, &mut TimingRecorder::new()).unwrap();

        // a marker the sampler would have overwritten had it run again
        let marker = images.join("frame_00000.png");
        fs::write(&marker, b"untouched").unwrap();
        let invalid_frame = fs::read(&marker).unwrap();

        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(SampleStage { images: images.clone() }),
            Box::new(ForegroundStage { images: images.clone(), processed: processed.clone() }),
        ];
        let report = invoke(dir.path(), &mut stages, &mut TimingRecorder::new()).unwrap();

        assert_eq!(report.skipped, vec![constants::STAGE_EXTRACT_FRAMES]);
        assert_eq!(report.executed, vec![constants::STAGE_PREPROCESS_IMAGES]);
        assert_eq!(fs::read(&marker).unwrap(), invalid_frame);
        // the unreadable marker frame is skipped, the other nine are written
        assert_eq!(fs::read_dir(&processed).unwrap().count(), 9);
    }
}
