use anyhow::{anyhow, Result};
use opencv::{prelude::*, videoio};
use std::path::Path;

use super::{FrameData, VideoSource};
use crate::error::PipelineError;
use crate::utils::logger;

/// OpenCV-backed decoder. The capture handle is released when the decoder
/// is dropped.
pub struct VideoDecoder {
    capture: videoio::VideoCapture,
    fps: f64,
    frame_count: u64,
    next_index: u64,
}

impl VideoDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("video path is not valid UTF-8: {}", path.display()))?;

        logger::debug(&format!("Opening video with OpenCV: {}", path.display()));

        // CAP_ANY allows OpenCV to choose the best backend
        let capture = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            logger::error(&format!("Failed to open video file: {}", path.display()));
            return Err(PipelineError::UnreadableVideo(path.to_path_buf()).into());
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let reported = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let frame_count = if reported.is_finite() && reported > 0.0 { reported as u64 } else { 0 };
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        logger::info(&format!(
            "VideoCapture opened: {}x{} @ {} fps, {} frames",
            width, height, fps, frame_count
        ));

        Ok(Self {
            capture,
            fps,
            frame_count,
            next_index: 0,
        })
    }

    fn read_frame_into(&mut self, buffer: &mut Vec<u8>) -> Result<Option<(u32, u32)>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? {
            return Ok(None); // EOF
        }
        if frame.empty() {
            return Ok(None);
        }
        if frame.channels() != 3 {
            return Err(anyhow!("expected a 3-channel frame, got {} channels", frame.channels()));
        }
        if !frame.is_continuous() {
            return Err(anyhow!("Frame is not continuous"));
        }

        let width = frame.cols() as u32;
        let height = frame.rows() as u32;

        // OpenCV hands out BGR; swap to RGB in place
        buffer.clear();
        buffer.extend_from_slice(frame.data_bytes()?);
        for px in buffer.chunks_exact_mut(3) {
            px.swap(0, 2);
        }

        Ok(Some((width, height)))
    }
}

impl VideoSource for VideoDecoder {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_frame(&mut self) -> Result<Option<FrameData>> {
        let mut buffer = Vec::new();
        let Some((width, height)) = self.read_frame_into(&mut buffer)? else {
            logger::debug("Decoder EOF");
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(FrameData::new(index, buffer, width, height)))
    }
}
