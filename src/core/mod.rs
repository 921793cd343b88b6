pub mod checkpoint;
pub mod extractor;
pub mod foreground;
pub mod orchestrator;
pub mod stages;
pub mod timing;

pub use checkpoint::CheckpointStore;
pub use orchestrator::run_with_summary;
pub use timing::TimingRecorder;
