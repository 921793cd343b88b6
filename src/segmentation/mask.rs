use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use fr::images::Image;
use image::RgbImage;

use super::{BoundingBox, InstanceMask};
use crate::shared::constants;

/// Detection box in pixel coordinates, `x1..x2` by `y1..y2` (end-exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    /// Denormalizes `bbox` against the image size and clamps every corner
    /// into `[0, width-1] x [0, height-1]`. Returns `None` when the clamped
    /// box has no area.
    pub fn from_normalized(bbox: &BoundingBox, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let to_pixel = |v: f32, extent: u32| -> i64 {
            let px = (v * extent as f32) as i64;
            px.clamp(0, extent as i64 - 1)
        };

        let x1 = to_pixel(bbox.x1, width);
        let y1 = to_pixel(bbox.y1, height);
        let x2 = to_pixel(bbox.x2, width);
        let y2 = to_pixel(bbox.y2, height);

        if x2 - x1 <= 0 || y2 - y1 <= 0 {
            return None;
        }

        Some(Self { x1: x1 as u32, y1: y1 as u32, x2: x2 as u32, y2: y2 as u32 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Bilinear resize of a soft instance mask to `width` x `height`.
pub fn resize_mask(mask: &InstanceMask, width: u32, height: u32) -> Result<Vec<f32>> {
    if mask.width == 0 || mask.height == 0 || mask.data.len() != (mask.width * mask.height) as usize {
        return Err(anyhow!(
            "instance mask {}x{} has {} values",
            mask.width,
            mask.height,
            mask.data.len()
        ));
    }
    if mask.width == width && mask.height == height {
        return Ok(mask.data.clone());
    }

    let bytes: Vec<u8> = mask.data.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let src_image = Image::from_vec_u8(mask.width, mask.height, bytes, fr::PixelType::F32)?;
    let mut dst_image = Image::new(width, height, fr::PixelType::F32);

    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    let mut resizer = fr::Resizer::new();
    resizer.resize(&src_image, &mut dst_image, &options)?;

    Ok(dst_image
        .buffer()
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Full-frame binary raster; a pixel is set when any retained subject
/// covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0; (width * height) as usize] }
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize] != 0
    }

    pub fn coverage(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Binarizes `soft` (sized to `pbox`) and ORs it into the raster at the
    /// box offset.
    pub fn place(&mut self, pbox: &PixelBox, soft: &[f32]) {
        let box_w = pbox.width() as usize;
        for (row, values) in soft.chunks_exact(box_w).take(pbox.height() as usize).enumerate() {
            let y = pbox.y1 as usize + row;
            let offset = y * self.width as usize + pbox.x1 as usize;
            for (cell, &v) in self.data[offset..offset + box_w].iter_mut().zip(values) {
                let bit = u8::from(v > constants::MASK_BINARIZE_THRESHOLD);
                *cell = (*cell).max(bit);
            }
        }
    }

    /// Per-pixel maximum with another mask of the same size.
    pub fn union(&mut self, other: &FrameMask) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = (*a).max(b);
        }
    }

    /// Zeroes every pixel of `image` outside the mask.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        for (x, y, px) in out.enumerate_pixels_mut() {
            if x >= self.width || y >= self.height || !self.is_set(x, y) {
                px.0 = [0, 0, 0];
            }
        }
        out
    }
}
