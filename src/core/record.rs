// src/core/record.rs
//! The canonical tool call record handed to renderers.

use super::PipelineError;
use crate::tools::naming::canonicalize_slug;
use crate::tools::result::NormalizedResult;
use crate::tools::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a record. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// Start marker seen, no parameter content yet
    Detected,
    /// Parameter content arriving, or the call is closed and awaits its result
    Streaming,
    Complete,
    Failed,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolCallStatus::Complete | ToolCallStatus::Failed)
    }
}

/// Which side wins when the invocation and the result payload both carry a
/// value for the same argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentPrecedence {
    /// Result arguments only fill keys the invocation did not set
    #[default]
    Invocation,
    /// Result arguments overwrite invocation values
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    id: String,
    function_name: String,
    parameters: Map<String, Value>,
    raw_source: String,
    status: ToolCallStatus,
    closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ToolResult>,
}

impl ToolCallRecord {
    /// A freshly detected, still open call.
    pub(crate) fn new(id: String, function_name: String, raw_source: String) -> Self {
        Self {
            id,
            function_name: canonicalize_slug(&function_name),
            parameters: Map::new(),
            raw_source,
            status: ToolCallStatus::Detected,
            closed: false,
            result: None,
        }
    }

    /// A call whose markup is complete.
    pub(crate) fn closed(
        id: String,
        function_name: String,
        parameters: Map<String, Value>,
        raw_source: String,
    ) -> Self {
        Self {
            id,
            function_name: canonicalize_slug(&function_name),
            parameters,
            raw_source,
            status: ToolCallStatus::Streaming,
            closed: true,
            result: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }

    pub fn status(&self) -> ToolCallStatus {
        self.status
    }

    /// Whether the call's markup has been fully received
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn result(&self) -> Option<&ToolResult> {
        self.result.as_ref()
    }

    pub(crate) fn mark_streaming(&mut self) {
        if self.status == ToolCallStatus::Detected {
            self.status = ToolCallStatus::Streaming;
        }
    }

    /// Insert or extend a parameter. Returns true when the value changed.
    pub(crate) fn upsert_parameter(&mut self, key: String, value: Value) -> bool {
        if self.parameters.get(&key) == Some(&value) {
            return false;
        }
        self.parameters.insert(key, value);
        true
    }

    pub(crate) fn set_raw_source(&mut self, raw_source: &str) -> bool {
        if self.raw_source == raw_source {
            return false;
        }
        self.raw_source = raw_source.to_string();
        true
    }

    pub(crate) fn close(&mut self, raw_source: &str) {
        self.set_raw_source(raw_source);
        self.mark_streaming();
        self.closed = true;
    }

    /// Merge a normalized result into this record. At most one result can be
    /// attached; the function name never changes.
    pub fn attach_result(
        &mut self,
        normalized: NormalizedResult,
        precedence: ArgumentPrecedence,
    ) -> Result<(), PipelineError> {
        if self.result.is_some() {
            return Err(PipelineError::ResultAlreadyAttached {
                id: self.id.clone(),
            });
        }

        if let Some(name) = &normalized.tool_name {
            let recovered = canonicalize_slug(name);
            if recovered != self.function_name {
                crate::log_debug!(
                    "Tool call {}: result names '{}', keeping '{}'",
                    self.id,
                    recovered,
                    self.function_name
                );
            }
        }

        if let Some(arguments) = normalized.parameters {
            for (key, value) in arguments {
                match precedence {
                    ArgumentPrecedence::Invocation => {
                        if !self.parameters.contains_key(&key) {
                            self.parameters.insert(key, value);
                        } else if self.parameters.get(&key) != Some(&value) {
                            crate::log_debug!(
                                "Tool call {}: argument '{}' differs in result, keeping invocation value",
                                self.id,
                                key
                            );
                        }
                    }
                    ArgumentPrecedence::Result => {
                        self.parameters.insert(key, value);
                    }
                }
            }
        }

        self.status = if normalized.success {
            ToolCallStatus::Complete
        } else {
            ToolCallStatus::Failed
        };
        self.result = Some(ToolResult {
            success: normalized.success,
            output: normalized.output,
            error: normalized.error,
        });
        Ok(())
    }
}
