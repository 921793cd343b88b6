pub mod mask;
pub mod mask_rcnn;

use anyhow::Result;
use image::RgbImage;

pub use mask::{FrameMask, PixelBox};
pub use mask_rcnn::MaskRcnn;

/// Box corners in normalized `[0, 1]` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Low-resolution soft mask covering a detection's box, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl InstanceMask {
    #[cfg(test)]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self { width, height, data: vec![value; (width * height) as usize] }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub mask: InstanceMask,
}

/// Instance segmentation capability: one image in, detections out.
pub trait SegmentationModel {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}
