use anyhow::{Context, Result};
use image::RgbImage;
use std::fs;
use std::io::{stdout, Write};
use std::path::Path;

use crate::segmentation::mask::resize_mask;
use crate::segmentation::{Detection, FrameMask, PixelBox, SegmentationModel};
use crate::shared::constants;
use crate::utils::file_utils;
use crate::utils::logger;
use crate::utils::time_utils::{estimate_remaining, format_eta, Timer};

/// What happened to a single frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// At least one subject was kept; everything outside the mask is black.
    Processed(FrameMask),
    /// No subject detected; the source was written unchanged.
    PassedThrough,
    /// The frame could not be decoded or inferred; nothing was written.
    Skipped(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionReport {
    pub processed: usize,
    pub passed_through: usize,
    pub skipped: usize,
}

impl ExtractionReport {
    fn record(&mut self, outcome: &FrameOutcome) {
        match outcome {
            FrameOutcome::Processed(_) => self.processed += 1,
            FrameOutcome::PassedThrough => self.passed_through += 1,
            FrameOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

fn is_retained(detection: &Detection, confidence: f32) -> bool {
    detection.class_id == constants::PERSON_CLASS_ID && detection.confidence > confidence
}

/// Unions the masks of every retained person detection into one frame-sized
/// raster. Returns `None` when no detection survives filtering and clamping.
pub fn composite_mask(
    detections: &[Detection],
    width: u32,
    height: u32,
    confidence: f32,
) -> Result<Option<FrameMask>> {
    let mut combined = FrameMask::new(width, height);
    let mut retained = 0usize;

    for (i, detection) in detections.iter().enumerate() {
        if !is_retained(detection, confidence) {
            continue;
        }
        let Some(pbox) = PixelBox::from_normalized(&detection.bbox, width, height) else {
            logger::warn(&format!(
                "Invalid bounding box for detection {} ({:?}). Skipping.",
                i, detection.bbox
            ));
            continue;
        };

        let soft = resize_mask(&detection.mask, pbox.width(), pbox.height())
            .with_context(|| format!("resizing mask of detection {}", i))?;
        let mut placed = FrameMask::new(width, height);
        placed.place(&pbox, &soft);
        combined.union(&placed);
        retained += 1;

        logger::debug(&format!(
            "Detection {}: confidence {:.2}, box [{}, {}, {}, {}]",
            i, detection.confidence, pbox.x1, pbox.y1, pbox.x2, pbox.y2
        ));
    }

    Ok((retained > 0).then_some(combined))
}

fn segment<M: SegmentationModel>(model: &mut M, image: &RgbImage, confidence: f32) -> Result<Option<FrameMask>> {
    let detections = model.detect(image)?;
    let (width, height) = image.dimensions();
    composite_mask(&detections, width, height, confidence)
}

/// Runs one frame through the model and writes the result to `dst`.
///
/// Decode and inference failures come back as [`FrameOutcome::Skipped`];
/// only a failure to write the output is an error.
pub fn process_frame<M: SegmentationModel>(
    model: &mut M,
    src: &Path,
    dst: &Path,
    confidence: f32,
) -> Result<FrameOutcome> {
    let image = match image::open(src) {
        Ok(img) => img.to_rgb8(),
        Err(e) => return Ok(FrameOutcome::Skipped(format!("could not read {}: {}", src.display(), e))),
    };

    let mask = match segment(model, &image, confidence) {
        Ok(mask) => mask,
        Err(e) => return Ok(FrameOutcome::Skipped(format!("inference failed on {}: {:#}", src.display(), e))),
    };

    match mask {
        Some(mask) => {
            mask.apply(&image)
                .save(dst)
                .with_context(|| format!("Failed to write {}", dst.display()))?;
            Ok(FrameOutcome::Processed(mask))
        }
        None => {
            fs::copy(src, dst).with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
            Ok(FrameOutcome::PassedThrough)
        }
    }
}

/// Removes the background from every frame in `input_dir` (ascending name
/// order), writing same-named files into `output_dir`. Frame files already
/// in `output_dir` are deleted first.
pub fn preprocess_images<M: SegmentationModel>(
    model: &mut M,
    input_dir: &Path,
    output_dir: &Path,
    confidence: f32,
) -> Result<ExtractionReport> {
    let stale = file_utils::remove_files_with_prefix(
        output_dir,
        constants::FRAME_FILE_PREFIX,
        constants::FRAME_EXTENSIONS,
    )?;
    if stale > 0 {
        logger::info(&format!("Removed {} stale outputs from {}", stale, output_dir.display()));
    }

    let image_files = file_utils::list_files(input_dir, constants::FRAME_EXTENSIONS)?;
    let total_images = image_files.len() as u64;
    let timer = Timer::new();
    let mut report = ExtractionReport::default();

    println!("\nStarting preprocessing of {} images...", total_images);
    logger::info(&format!("Preprocessing {} images from {}", total_images, input_dir.display()));

    for (idx, src) in image_files.iter().enumerate() {
        let Some(file_name) = src.file_name() else {
            continue;
        };
        let done = idx as u64 + 1;
        let eta = format_eta(estimate_remaining(done, total_images, timer.elapsed()));
        let progress = done as f64 / total_images as f64 * 100.0;
        let mut out = stdout();
        let _ = write!(
            out,
            "\rProgress: {:.1}% | Image {}/{} | ETA: {} | Processing: {}",
            progress,
            done,
            total_images,
            eta,
            file_name.to_string_lossy()
        );
        let _ = out.flush();

        let dst = output_dir.join(file_name);
        let outcome = process_frame(model, src, &dst, confidence)?;
        match &outcome {
            FrameOutcome::Processed(mask) => {
                logger::debug(&format!("{}: kept {} foreground pixels", src.display(), mask.coverage()))
            }
            FrameOutcome::PassedThrough => logger::debug(&format!("{}: no person detected", src.display())),
            FrameOutcome::Skipped(reason) => {
                eprintln!("\nWarning: {}", reason);
                logger::error(reason);
            }
        }
        report.record(&outcome);
    }

    println!(
        "\nPreprocessing completed! Total time: {:.2} seconds",
        timer.elapsed().as_secs_f64()
    );
    logger::info(&format!("Preprocessing finished: {:?}", report));
    Ok(report)
}
