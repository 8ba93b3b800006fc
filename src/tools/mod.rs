// src/tools/mod.rs
//! Tool call extraction and result normalization.
//!
//! The pieces here are pure functions over text and JSON; the streaming
//! bookkeeping that ties them together lives in [`crate::core::session`].

pub mod detector;
pub mod helpers;
pub mod legacy;
pub mod naming;
pub mod parser;
pub mod result;
pub mod scanner;
pub mod vocabulary;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use detector::{DetectedTag, StreamTagDetector, TagKind};
pub use legacy::{LegacyInvocation, LegacyInvocationParser};
pub use naming::{canonicalize_slug, display_name, slug_to_display};
pub use parser::{coerce_parameter_value, InvocationParser};
pub use result::{NormalizedResult, ResultNormalizer, ResultShape};
pub use vocabulary::{TagSpec, TagVocabulary};

/// Outcome of a tool execution as attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The result content (JSON value or text)
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create an error tool result
    pub fn error(output: impl Into<Value>, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error_message.into()),
        }
    }
}

/// Random record id prefix, `call_` plus 16 hex digits.
pub fn generate_tool_call_prefix() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("call_{}", &raw[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_serializes_without_empty_error() {
        let ok = serde_json::to_value(ToolResult::success(json!({"rows": 2}))).unwrap();
        assert_eq!(ok, json!({"success": true, "output": {"rows": 2}}));

        let failed = serde_json::to_value(ToolResult::error("oops", "boom")).unwrap();
        assert_eq!(
            failed,
            json!({"success": false, "output": "oops", "error": "boom"})
        );
    }

    #[test]
    fn generated_prefix_shape() {
        let prefix = generate_tool_call_prefix();
        assert_eq!(prefix.len(), 21);
        assert!(prefix.starts_with("call_"));
        assert!(prefix[5..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(prefix, generate_tool_call_prefix());
    }
}
