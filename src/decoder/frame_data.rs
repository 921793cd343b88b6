use anyhow::{anyhow, Result};
use image::RgbImage;

/// One decoded video frame, tightly packed RGB24.
#[derive(Clone)]
pub struct FrameData {
    pub index: u64,
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FrameData {
    pub fn new(index: u64, buffer: Vec<u8>, width: u32, height: u32) -> Self {
        Self { index, buffer, width, height }
    }

    pub fn into_rgb_image(self) -> Result<RgbImage> {
        let (width, height) = (self.width, self.height);
        RgbImage::from_raw(width, height, self.buffer)
            .ok_or_else(|| anyhow!("frame {} buffer does not match {}x{} RGB", self.index, width, height))
    }
}
