pub mod frame_data;
pub mod video;

use anyhow::Result;

pub use frame_data::FrameData;
pub use video::VideoDecoder;

/// Sequential access to decoded frames plus the container metadata the
/// sampler needs up front.
pub trait VideoSource {
    fn fps(&self) -> f64;

    /// Total frames as reported by the container; 0 when unknown.
    fn frame_count(&self) -> u64;

    /// Next frame in decode order, or `None` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<FrameData>>;
}
