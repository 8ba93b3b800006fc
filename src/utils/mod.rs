pub mod config;
pub mod logger;

pub use config::PipelineConfig;
pub use logger::TranscriptLogger;
