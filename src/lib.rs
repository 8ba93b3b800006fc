pub mod core;
pub mod tools;
pub mod utils;

pub use crate::core::{
    ArgumentPrecedence, PipelineError, ResultEvent, SessionUpdate, ToolCallRecord,
    ToolCallSession, ToolCallStatus,
};
pub use crate::tools::{
    InvocationParser, NormalizedResult, ResultNormalizer, StreamTagDetector, TagVocabulary,
    ToolResult,
};
pub use crate::utils::PipelineConfig;
