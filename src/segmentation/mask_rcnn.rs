use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use opencv::{
    core::{Mat, Scalar, Size, Vector, CV_32F},
    dnn,
    prelude::*,
};
use std::path::Path;

use super::{BoundingBox, Detection, InstanceMask, SegmentationModel};
use crate::error::PipelineError;
use crate::shared::constants;
use crate::utils::logger;

/// Values per row of the `detection_out` blob:
/// `[batch, class, confidence, x1, y1, x2, y2]`.
const DETECTION_ROW_LEN: usize = 7;

/// Mask R-CNN (TensorFlow frozen graph) run through OpenCV's dnn module.
pub struct MaskRcnn {
    net: dnn::Net,
    output_names: Vector<String>,
}

impl MaskRcnn {
    pub fn load(weights: &Path, config: &Path) -> Result<Self> {
        for artifact in [weights, config] {
            if !artifact.is_file() {
                return Err(PipelineError::MissingModelArtifact(artifact.to_path_buf()).into());
            }
        }

        let weights_str = weights
            .to_str()
            .ok_or_else(|| anyhow!("model path is not valid UTF-8: {}", weights.display()))?;
        let config_str = config
            .to_str()
            .ok_or_else(|| anyhow!("model path is not valid UTF-8: {}", config.display()))?;

        let net = dnn::read_net_from_tensorflow(weights_str, config_str)
            .with_context(|| format!("reading Mask R-CNN graph {}", weights.display()))?;
        if net.empty()? {
            return Err(PipelineError::ModelLoad(weights.to_path_buf()).into());
        }

        let output_names: Vector<String> =
            constants::MODEL_OUTPUT_LAYERS.iter().map(|name| name.to_string()).collect();
        logger::info(&format!(
            "Loaded segmentation model {} (outputs: {:?})",
            weights.display(),
            constants::MODEL_OUTPUT_LAYERS
        ));

        Ok(Self { net, output_names })
    }

    fn forward(&mut self, image: &RgbImage) -> Result<(Mat, Mat)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot run inference on an empty image"));
        }

        // Wrap the RGB buffer as a height x width 3-channel Mat
        let input = Mat::from_slice(image.as_raw().as_slice())?
            .reshape(3, height as i32)?
            .try_clone()?;

        // Input is already RGB, so no channel swap
        let blob = dnn::blob_from_image(&input, 1.0, Size::new(0, 0), Scalar::default(), false, false, CV_32F)?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let mut outputs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outputs, &self.output_names)?;
        if outputs.len() != 2 {
            return Err(anyhow!("expected 2 output blobs, got {}", outputs.len()));
        }
        Ok((outputs.get(0)?, outputs.get(1)?))
    }
}

impl SegmentationModel for MaskRcnn {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (boxes, masks) = self.forward(image)?;

        let rows = boxes.data_typed::<f32>()?;
        let mask_values = masks.data_typed::<f32>()?;

        // detection_masks is [N, classes, mask_h, mask_w]
        let dims = masks.mat_size();
        if dims.len() != 4 {
            return Err(anyhow!("unexpected mask blob rank {}", dims.len()));
        }
        let (classes, mask_h, mask_w) = (dims[1] as usize, dims[2] as usize, dims[3] as usize);
        let mask_len = mask_h * mask_w;

        let mut detections = Vec::new();
        for (i, row) in rows.chunks_exact(DETECTION_ROW_LEN).enumerate() {
            let class_id = row[1] as u32;
            if class_id == 0 || class_id as usize > classes {
                continue;
            }

            let start = (i * classes + (class_id as usize - 1)) * mask_len;
            let Some(values) = mask_values.get(start..start + mask_len) else {
                logger::warn(&format!("Detection {} has no mask slice; ignoring", i));
                continue;
            };

            detections.push(Detection {
                class_id,
                confidence: row[2],
                bbox: BoundingBox { x1: row[3], y1: row[4], x2: row[5], y2: row[6] },
                mask: InstanceMask {
                    width: mask_w as u32,
                    height: mask_h as u32,
                    data: values.to_vec(),
                },
            });
        }

        Ok(detections)
    }
}
