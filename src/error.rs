use std::path::PathBuf;
use thiserror::Error;

/// Typed failures raised before or between stages.
///
/// Per-image problems inside the foreground stage never surface here; they
/// are reported through [`crate::core::foreground::FrameOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frames per second must be a positive integer, got {0}")]
    InvalidSamplingRate(i64),

    #[error("video source reports a non-positive frame rate ({0})")]
    InvalidSourceFps(f64),

    #[error("unsupported frame image format '{0}', expected one of png, jpg, jpeg")]
    UnsupportedImageFormat(String),

    #[error("cannot open video source: {0}")]
    UnreadableVideo(PathBuf),

    #[error("model artifact not found: {0}")]
    MissingModelArtifact(PathBuf),

    #[error("confidence threshold must be within (0, 1), got {0}")]
    InvalidConfidence(f32),

    #[error("segmentation model failed to load from {0}")]
    ModelLoad(PathBuf),

    #[error("checkpoint document {path} is malformed: {source}")]
    MalformedCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stage '{0}' was marked completed without being started in this run")]
    CompletedWithoutStart(String),
}
