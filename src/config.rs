use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::extractor::SamplingRate;
use crate::decoder::{VideoDecoder, VideoSource};
use crate::error::PipelineError;
use crate::shared::constants;
use crate::utils::logger;

/// Optional `key = value` overrides read from `vid2fg.config`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFile {
    pub model_weights: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub confidence: Option<f32>,
}

impl ConfigFile {
    /// A missing file yields no overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut file = Self::default();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "model-weights" => file.model_weights = Some(PathBuf::from(value)),
                "model-config" => file.model_config = Some(PathBuf::from(value)),
                "confidence" => {
                    let parsed = value
                        .parse::<f32>()
                        .with_context(|| format!("confidence is not a number: {}", value))?;
                    file.confidence = Some(parsed);
                }
                _ => {}
            }
        }
        Ok(file)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_video: PathBuf,
    pub output_dir: PathBuf,
    pub frames_from_one_sec: i64,
    pub model_weights: PathBuf,
    pub model_config: PathBuf,
    pub confidence: f32,
    pub image_ext: String,
    pub timing_log: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(input_video: PathBuf, output_dir: PathBuf, frames_from_one_sec: i64) -> Self {
        Self {
            input_video,
            output_dir,
            frames_from_one_sec,
            model_weights: PathBuf::from(constants::DEFAULT_MODEL_WEIGHTS),
            model_config: PathBuf::from(constants::DEFAULT_MODEL_CONFIG),
            confidence: constants::DEFAULT_CONFIDENCE_THRESHOLD,
            image_ext: constants::DEFAULT_FRAME_EXTENSION.to_string(),
            timing_log: None,
        }
    }

    /// Applies file overrides; values set explicitly afterwards still win.
    pub fn with_file(mut self, file: &ConfigFile) -> Self {
        if let Some(weights) = &file.model_weights {
            self.model_weights = weights.clone();
        }
        if let Some(config) = &file.model_config {
            self.model_config = config.clone();
        }
        if let Some(confidence) = file.confidence {
            self.confidence = confidence;
        }
        self
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(constants::IMAGES_DIR)
    }

    pub fn processed_images_dir(&self) -> PathBuf {
        self.output_dir.join(constants::PROCESSED_IMAGES_DIR)
    }

    pub fn default_timing_log(&self) -> PathBuf {
        self.output_dir.join(constants::TIMING_LOG_FILE)
    }

    /// Checks everything that can be checked without running a stage,
    /// including that the video opens and reports a usable frame rate.
    pub fn validate(&self) -> Result<SamplingRate, PipelineError> {
        self.validate_with(read_video_fps)
    }

    /// [`validate`](Self::validate) with the frame-rate lookup supplied by
    /// the caller. The lookup runs last, after the cheap checks pass.
    pub fn validate_with(
        &self,
        read_fps: impl FnOnce(&Path) -> Result<f64, PipelineError>,
    ) -> Result<SamplingRate, PipelineError> {
        let rate = SamplingRate::new(self.frames_from_one_sec)?;

        let ext = self.image_ext.to_ascii_lowercase();
        if !constants::FRAME_EXTENSIONS.contains(&ext.as_str()) {
            return Err(PipelineError::UnsupportedImageFormat(self.image_ext.clone()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(PipelineError::InvalidConfidence(self.confidence));
        }
        if !self.input_video.is_file() {
            return Err(PipelineError::UnreadableVideo(self.input_video.clone()));
        }
        for artifact in [&self.model_weights, &self.model_config] {
            if !artifact.is_file() {
                return Err(PipelineError::MissingModelArtifact(artifact.clone()));
            }
        }

        let fps = read_fps(&self.input_video)?;
        rate.interval(fps)?;
        Ok(rate)
    }
}

/// Opens the video just long enough to read its frame rate.
fn read_video_fps(path: &Path) -> Result<f64, PipelineError> {
    match VideoDecoder::open(path) {
        Ok(decoder) => Ok(decoder.fps()),
        Err(e) => {
            logger::debug(&format!("Could not open {}: {:#}", path.display(), e));
            Err(PipelineError::UnreadableVideo(path.to_path_buf()))
        }
    }
}
