pub mod record;
pub mod session;

pub use record::{ArgumentPrecedence, ToolCallRecord, ToolCallStatus};
pub use session::{ResultEvent, SessionUpdate, ToolCallSession};

/// Caller-side logic errors. Parsing and normalization never fail; these only
/// surface when a result is merged into the wrong record or merged twice.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("tool call {id} already has a result attached")]
    ResultAlreadyAttached { id: String },

    #[error("no tool call with id {id}")]
    UnknownToolCall { id: String },
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "plain-log")]
            {
                println!($($arg)*);
            }
            #[cfg(not(feature = "plain-log"))]
            {
                tracing::info!($($arg)*);
            }
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "plain-log")]
            {
                println!($($arg)*);
            }
            #[cfg(not(feature = "plain-log"))]
            {
                tracing::debug!($($arg)*);
            }
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "plain-log")]
            {
                eprintln!($($arg)*);
            }
            #[cfg(not(feature = "plain-log"))]
            {
                tracing::warn!($($arg)*);
            }
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        {
            #[cfg(feature = "plain-log")]
            {
                eprintln!($($arg)*);
            }
            #[cfg(not(feature = "plain-log"))]
            {
                tracing::error!($($arg)*);
            }
        }
    };
}
