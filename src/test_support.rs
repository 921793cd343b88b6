//! Deterministic stand-ins for the video decoder and the segmentation model.

use anyhow::Result;
use image::RgbImage;

use crate::decoder::{FrameData, VideoSource};
use crate::segmentation::{Detection, SegmentationModel};

/// Frames whose pixels all carry the low byte of their source index.
pub struct SyntheticVideo {
    fps: f64,
    total: u64,
    next: u64,
}

impl SyntheticVideo {
    pub fn new(fps: f64, total: u64) -> Self {
        Self { fps, total, next: 0 }
    }
}

impl VideoSource for SyntheticVideo {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.total
    }

    fn read_frame(&mut self) -> Result<Option<FrameData>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(FrameData::new(index, vec![index as u8; 8 * 6 * 3], 8, 6)))
    }
}

/// Returns the same detections for every image.
pub struct FixedModel(pub Vec<Detection>);

impl SegmentationModel for FixedModel {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.0.clone())
    }
}
