pub const APP_NAME: &str = "vid2fg";

pub const PIPELINE_CONFIG_FILE: &str = "vid2fg.config";
pub const ERROR_LOG_FILE: &str = "error.log";
pub const DEBUG_LOG_FILE: &str = "pipeline.log";

pub const PROGRESS_FILE: &str = "progress.json";
pub const TIMING_LOG_FILE: &str = "timing_log.csv";
pub const TIMING_LOG_HEADER: &str = "timestamp,step,duration,success";

pub const IMAGES_DIR: &str = "images";
pub const PROCESSED_IMAGES_DIR: &str = "processed_images";

pub const FRAME_FILE_PREFIX: &str = "frame_";
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const DEFAULT_FRAME_EXTENSION: &str = "jpg";

pub const DEFAULT_MODEL_WEIGHTS: &str = "/app/models/frozen_inference_graph.pb";
pub const DEFAULT_MODEL_CONFIG: &str =
    "/app/models/mask_rcnn_inception_v2_coco_2018_01_28.pbtxt";
pub const MODEL_OUTPUT_LAYERS: &[&str] = &["detection_out", "detection_masks"];

/// COCO label id of "person" in the Mask R-CNN graph.
pub const PERSON_CLASS_ID: u32 = 1;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const MASK_BINARIZE_THRESHOLD: f32 = 0.5;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const ETA_UNKNOWN: &str = "unknown";

pub const STAGE_EXTRACT_FRAMES: &str = "extract_frames";
pub const STAGE_PREPROCESS_IMAGES: &str = "preprocess_images";
pub const STAGE_FEATURE_EXTRACTION: &str = "feature_extraction";
pub const STAGE_FEATURE_MATCHING: &str = "feature_matching";
pub const STAGE_RECONSTRUCTION: &str = "3d_reconstruction";
