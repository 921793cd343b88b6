use anyhow::Result;
use std::path::PathBuf;

use super::extractor::{extract_frames, SamplingRate};
use super::foreground::preprocess_images;
use super::orchestrator::Stage;
use crate::config::PipelineConfig;
use crate::decoder::VideoDecoder;
use crate::segmentation::MaskRcnn;
use crate::shared::constants;
use crate::utils::{file_utils, logger};

/// Samples the input video into `images/`.
pub struct ExtractFramesStage {
    input_video: PathBuf,
    images_dir: PathBuf,
    rate: SamplingRate,
    extension: String,
}

impl Stage for ExtractFramesStage {
    fn name(&self) -> &str {
        constants::STAGE_EXTRACT_FRAMES
    }

    fn title(&self) -> &str {
        "Extracting frames from video"
    }

    fn run(&mut self) -> Result<()> {
        file_utils::ensure_dir(&self.images_dir)?;
        let mut decoder = VideoDecoder::open(&self.input_video)?;
        let report = extract_frames(&mut decoder, &self.images_dir, self.rate, &self.extension)?;
        println!(
            "Sampled {} of {} frames (interval {})",
            report.frames_written, report.frames_read, report.interval
        );
        Ok(())
    }
}

/// Removes backgrounds from `images/` into `processed_images/`.
pub struct PreprocessImagesStage {
    images_dir: PathBuf,
    processed_dir: PathBuf,
    model_weights: PathBuf,
    model_config: PathBuf,
    confidence: f32,
}

impl Stage for PreprocessImagesStage {
    fn name(&self) -> &str {
        constants::STAGE_PREPROCESS_IMAGES
    }

    fn title(&self) -> &str {
        "Preprocessing images"
    }

    fn run(&mut self) -> Result<()> {
        file_utils::ensure_dir(&self.processed_dir)?;
        let mut model = MaskRcnn::load(&self.model_weights, &self.model_config)?;
        let report = preprocess_images(&mut model, &self.images_dir, &self.processed_dir, self.confidence)?;
        println!(
            "Processed {} | No subject {} | Skipped {}",
            report.processed, report.passed_through, report.skipped
        );
        Ok(())
    }
}

/// Downstream reconstruction step that only takes part in checkpointing.
pub struct PlaceholderStage {
    name: &'static str,
    title: &'static str,
}

impl Stage for PlaceholderStage {
    fn name(&self) -> &str {
        self.name
    }

    fn title(&self) -> &str {
        self.title
    }

    fn run(&mut self) -> Result<()> {
        println!("{} placeholder executed.", self.title);
        logger::info(&format!("{}: no-op", self.name));
        Ok(())
    }
}

/// The fixed stage sequence of a full run.
pub fn pipeline_stages(config: &PipelineConfig, rate: SamplingRate) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ExtractFramesStage {
            input_video: config.input_video.clone(),
            images_dir: config.images_dir(),
            rate,
            extension: config.image_ext.to_ascii_lowercase(),
        }),
        Box::new(PreprocessImagesStage {
            images_dir: config.images_dir(),
            processed_dir: config.processed_images_dir(),
            model_weights: config.model_weights.clone(),
            model_config: config.model_config.clone(),
            confidence: config.confidence,
        }),
        Box::new(PlaceholderStage {
            name: constants::STAGE_FEATURE_EXTRACTION,
            title: "Feature extraction",
        }),
        Box::new(PlaceholderStage {
            name: constants::STAGE_FEATURE_MATCHING,
            title: "Feature matching",
        }),
        Box::new(PlaceholderStage {
            name: constants::STAGE_RECONSTRUCTION,
            title: "3D Reconstruction",
        }),
    ]
}
