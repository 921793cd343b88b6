use anyhow::{Context, Result};
use std::io::{stdout, Write};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use crate::decoder::VideoSource;
use crate::error::PipelineError;
use crate::shared::constants;
use crate::utils::{file_utils, logger};
use crate::utils::time_utils::{estimate_remaining, format_eta, Timer};

/// Frames to keep per second of source video. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingRate(NonZeroU32);

impl SamplingRate {
    pub fn new(per_second: i64) -> Result<Self, PipelineError> {
        u32::try_from(per_second)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(PipelineError::InvalidSamplingRate(per_second))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Source frames between two kept frames: `floor(fps / rate)`, at least 1.
    pub fn interval(self, source_fps: f64) -> Result<u64, PipelineError> {
        if !source_fps.is_finite() || source_fps <= 0.0 {
            return Err(PipelineError::InvalidSourceFps(source_fps));
        }
        let interval = (source_fps / f64::from(self.get())).floor() as u64;
        Ok(interval.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingReport {
    pub interval: u64,
    pub frames_read: u64,
    pub frames_written: u64,
}

pub fn frame_file_name(output_id: u64, extension: &str) -> String {
    format!("{}{:05}.{}", constants::FRAME_FILE_PREFIX, output_id, extension)
}

/// Decodes `source` front to back and writes every `interval`-th frame to
/// `output_dir` as `frame_NNNNN.<extension>`, ids counting up from 0.
///
/// Frames left in `output_dir` by an earlier attempt are deleted first, so
/// the directory only ever holds this run's samples. There is no
/// mid-extraction resume.
pub fn extract_frames<S: VideoSource>(
    source: &mut S,
    output_dir: &Path,
    rate: SamplingRate,
    extension: &str,
) -> Result<SamplingReport> {
    let fps = source.fps();
    let total_frames = source.frame_count();
    let interval = rate.interval(fps)?;

    let stale = file_utils::remove_files_with_prefix(
        output_dir,
        constants::FRAME_FILE_PREFIX,
        constants::FRAME_EXTENSIONS,
    )?;
    if stale > 0 {
        logger::info(&format!("Removed {} stale frames from {}", stale, output_dir.display()));
    }

    println!("Total frames in video: {}", total_frames);
    println!("FPS: {}", fps);
    println!("Extracting every {}th frame", interval);
    logger::info(&format!(
        "Sampling {} frames at {} fps with interval {} into {}",
        total_frames,
        fps,
        interval,
        output_dir.display()
    ));

    let timer = Timer::new();
    let mut count: u64 = 0;
    let mut written: u64 = 0;

    while let Some(frame) = source.read_frame()? {
        if count % interval == 0 {
            let output_id = count / interval;
            let path: PathBuf = output_dir.join(frame_file_name(output_id, extension));
            frame
                .into_rgb_image()?
                .save(&path)
                .with_context(|| format!("Failed to write frame {}", path.display()))?;
            written += 1;

            report_progress(count, total_frames, &timer);
        }
        count += 1;
    }

    println!("\nFrame extraction completed!");
    logger::info(&format!("Read {} frames, wrote {}", count, written));

    Ok(SamplingReport { interval, frames_read: count, frames_written: written })
}

fn report_progress(count: u64, total_frames: u64, timer: &Timer) {
    let eta = format_eta(estimate_remaining(count, total_frames, timer.elapsed()));
    let mut out = stdout();
    if total_frames > 0 {
        let progress = count as f64 / total_frames as f64 * 100.0;
        let _ = write!(out, "\rProgress: {:.1}% | Frame {}/{} | ETA: {}", progress, count, total_frames, eta);
    } else {
        let _ = write!(out, "\rFrame {} | ETA: {}", count, eta);
    }
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SyntheticVideo;
    use std::fs;

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn rate_must_be_positive() {
        assert!(matches!(SamplingRate::new(0), Err(PipelineError::InvalidSamplingRate(0))));
        assert!(matches!(SamplingRate::new(-3), Err(PipelineError::InvalidSamplingRate(-3))));
        assert_eq!(SamplingRate::new(3).unwrap().get(), 3);
    }

    #[test]
    fn interval_floors_and_clamps() {
        let rate = SamplingRate::new(3).unwrap();
        assert_eq!(rate.interval(30.0).unwrap(), 10);
        assert_eq!(rate.interval(29.97).unwrap(), 9);
        // rate above fps would floor to zero
        assert_eq!(SamplingRate::new(60).unwrap().interval(24.0).unwrap(), 1);
        assert!(matches!(rate.interval(0.0), Err(PipelineError::InvalidSourceFps(_))));
        assert!(rate.interval(f64::NAN).is_err());
    }

    #[test]
    fn samples_every_tenth_frame_of_thirty_fps_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = SyntheticVideo::new(30.0, 100);

        let report = extract_frames(&mut video, dir.path(), SamplingRate::new(3).unwrap(), "png").unwrap();

        assert_eq!(report, SamplingReport { interval: 10, frames_read: 100, frames_written: 10 });
        let expected: Vec<String> = (0..10).map(|id| frame_file_name(id, "png")).collect();
        assert_eq!(names_in(dir.path()), expected);

        for id in 0..10u64 {
            let img = image::open(dir.path().join(frame_file_name(id, "png"))).unwrap().to_rgb8();
            assert_eq!(img.get_pixel(0, 0).0, [(id * 10) as u8; 3], "frame {}", id);
        }
    }

    #[test]
    fn rerun_overwrites_same_files() {
        let dir = tempfile::tempdir().unwrap();
        let rate = SamplingRate::new(1).unwrap();

        extract_frames(&mut SyntheticVideo::new(5.0, 12), dir.path(), rate, "png").unwrap();
        let first = fs::read(dir.path().join("frame_00002.png")).unwrap();
        let report = extract_frames(&mut SyntheticVideo::new(5.0, 12), dir.path(), rate, "png").unwrap();

        assert_eq!(report.frames_written, 3);
        assert_eq!(names_in(dir.path()).len(), 3);
        assert_eq!(fs::read(dir.path().join("frame_00002.png")).unwrap(), first);
    }

    #[test]
    fn lower_rate_rerun_leaves_only_new_frames() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        extract_frames(&mut SyntheticVideo::new(30.0, 100), dir.path(), SamplingRate::new(3).unwrap(), "png").unwrap();
        // a jpg from yet another attempt
        fs::write(dir.path().join("frame_00007.jpg"), b"old").unwrap();

        let report =
            extract_frames(&mut SyntheticVideo::new(30.0, 100), dir.path(), SamplingRate::new(1).unwrap(), "png").unwrap();

        assert_eq!(report.frames_written, 4);
        let mut expected: Vec<String> = (0..4).map(|id| frame_file_name(id, "png")).collect();
        expected.push("notes.txt".to_string());
        assert_eq!(names_in(dir.path()), expected);
        // frame 1 at rate 1 is source frame 30
        let img = image::open(dir.path().join("frame_00001.png")).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [30; 3]);
    }

    #[test]
    fn file_names_sort_numerically() {
        let mut names: Vec<String> = [2u64, 10, 1, 100].iter().map(|&i| frame_file_name(i, "jpg")).collect();
        names.sort();
        assert_eq!(names, vec!["frame_00001.jpg", "frame_00002.jpg", "frame_00010.jpg", "frame_00100.jpg"]);
    }
}
