// src/tools/result.rs
//! Tool result normalization.
//!
//! Backends have wrapped tool results in several different envelopes over
//! time. Every payload is decoded (JSON strings, doubly encoded strings,
//! message wrappers), classified into one [`Envelope`] variant and then mapped
//! to a single [`NormalizedResult`]. Classification order is fixed; the first
//! matching shape wins.

use super::naming::canonicalize_slug;
use serde::Serialize;
use serde_json::{Map, Value};

pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse tool response";

const DEFAULT_MAX_DECODE_DEPTH: usize = 4;

/// Which envelope a payload was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// `{tool_execution: {result: {...}, arguments, ...}}`
    ToolExecution,
    /// `{tool, parameters, output}`
    FlatLegacy,
    /// `{result: {...}}` or `{result: "<json>"}`
    ResultWrapped,
    /// `{output, success?, error?}`
    OutputWrapped,
    /// `{content?, message?, ...}` already in final form
    Final,
    /// Nothing recognizable
    Opaque,
}

/// Canonical outcome of a tool result payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    /// Tool name recovered from the payload, canonicalized
    pub tool_name: Option<String>,
    /// Arguments recovered from the payload
    pub parameters: Option<Map<String, Value>>,
    pub tool_call_id: Option<String>,
    pub timestamp: Option<String>,
    pub shape: ResultShape,
}

impl NormalizedResult {
    fn new(shape: ResultShape, success: bool, output: Value, error: Option<String>) -> Self {
        Self {
            success,
            output,
            error,
            tool_name: None,
            parameters: None,
            tool_call_id: None,
            timestamp: None,
            shape,
        }
    }
}

/// Borrowed view of a classified payload.
#[derive(Debug)]
enum Envelope<'a> {
    ToolExecution {
        execution: &'a Map<String, Value>,
        result: &'a Value,
    },
    FlatLegacy {
        root: &'a Map<String, Value>,
        tool: &'a Value,
        parameters: &'a Value,
        output: &'a Value,
    },
    ResultWrapped {
        root: &'a Map<String, Value>,
        result: &'a Value,
    },
    OutputWrapped {
        root: &'a Map<String, Value>,
        output: &'a Value,
    },
    Final(&'a Map<String, Value>),
    Opaque(&'a Value),
}

/// Non-null field lookup.
fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

impl<'a> Envelope<'a> {
    fn classify(value: &'a Value) -> Self {
        let Value::Object(root) = value else {
            return Envelope::Opaque(value);
        };
        if let Some(execution) = field(root, "tool_execution").and_then(Value::as_object) {
            if let Some(result) = field(execution, "result") {
                return Envelope::ToolExecution { execution, result };
            }
        }
        if let (Some(tool), Some(parameters), Some(output)) = (
            field(root, "tool"),
            field(root, "parameters"),
            field(root, "output"),
        ) {
            return Envelope::FlatLegacy {
                root,
                tool,
                parameters,
                output,
            };
        }
        if let Some(result) = field(root, "result") {
            return Envelope::ResultWrapped { root, result };
        }
        if let Some(output) = field(root, "output") {
            return Envelope::OutputWrapped { root, output };
        }
        if root.contains_key("content") || root.contains_key("message") {
            return Envelope::Final(root);
        }
        Envelope::Opaque(value)
    }

    fn shape(&self) -> ResultShape {
        match self {
            Envelope::ToolExecution { .. } => ResultShape::ToolExecution,
            Envelope::FlatLegacy { .. } => ResultShape::FlatLegacy,
            Envelope::ResultWrapped { .. } => ResultShape::ResultWrapped,
            Envelope::OutputWrapped { .. } => ResultShape::OutputWrapped,
            Envelope::Final(_) => ResultShape::Final,
            Envelope::Opaque(_) => ResultShape::Opaque,
        }
    }
}

/// Parse `text` as JSON, keeping only objects and arrays.
fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Output values that are JSON text are replaced by the parsed structure.
fn decode_output(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_structured(s).unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Error text, if the value carries one.
fn error_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Explicit success flag, else success unless an error is present.
fn resolve_success(flag: Option<&Value>, error: &Option<String>) -> bool {
    match flag.and_then(Value::as_bool) {
        Some(success) => success,
        None => error.is_none(),
    }
}

fn as_arguments(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match parse_structured(s) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn recovered_name(root: &Map<String, Value>) -> Option<String> {
    non_empty_str(root.get("tool_name"))
        .or_else(|| non_empty_str(root.get("function_name")))
        .map(canonicalize_slug)
}

/// True for objects that carry one of the recognized envelopes.
fn is_envelope(map: &Map<String, Value>) -> bool {
    ["tool_execution", "tool", "result", "output"]
        .iter()
        .any(|key| field(map, key).is_some())
}

/// Maps arbitrary tool result payloads to [`NormalizedResult`].
#[derive(Debug, Clone)]
pub struct ResultNormalizer {
    max_decode_depth: usize,
}

impl Default for ResultNormalizer {
    fn default() -> Self {
        Self {
            max_decode_depth: DEFAULT_MAX_DECODE_DEPTH,
        }
    }
}

impl ResultNormalizer {
    /// `max_decode_depth` bounds how many string-encoding or `content`
    /// wrapper layers are peeled off before classification.
    pub fn new(max_decode_depth: usize) -> Self {
        Self { max_decode_depth }
    }

    /// Normalize a payload given as raw text.
    pub fn normalize_str(&self, payload: &str) -> NormalizedResult {
        self.normalize(&Value::String(payload.to_string()))
    }

    /// Normalize a payload. Never fails: unrecognized payloads come back as a
    /// failed result carrying the payload as output.
    pub fn normalize(&self, payload: &Value) -> NormalizedResult {
        let decoded = self.decode(payload);
        let envelope = Envelope::classify(&decoded);
        let shape = envelope.shape();
        match envelope {
            Envelope::ToolExecution { execution, result } => {
                Self::from_tool_execution(execution, result)
            }
            Envelope::FlatLegacy {
                root,
                tool,
                parameters,
                output,
            } => {
                let success = output.get("success").and_then(Value::as_bool) != Some(false);
                let error = error_text(output.get("error")).or_else(|| error_text(root.get("error")));
                let mut normalized =
                    NormalizedResult::new(shape, success, decode_output(output), error);
                normalized.tool_name = non_empty_str(Some(tool)).map(canonicalize_slug);
                normalized.parameters = as_arguments(Some(parameters));
                normalized
            }
            Envelope::ResultWrapped { root, result } => {
                let inner = decode_output(result);
                let mut normalized = match &inner {
                    Value::Object(map) => {
                        let error = error_text(map.get("error"))
                            .or_else(|| error_text(root.get("error")));
                        let flag = map.get("success").or_else(|| root.get("success"));
                        let output = match field(map, "output") {
                            Some(output) => decode_output(output),
                            None => inner.clone(),
                        };
                        NormalizedResult::new(shape, resolve_success(flag, &error), output, error)
                    }
                    _ => {
                        let error = error_text(root.get("error"));
                        let success = resolve_success(root.get("success"), &error);
                        NormalizedResult::new(shape, success, inner.clone(), error)
                    }
                };
                normalized.tool_name = recovered_name(root);
                normalized.parameters = as_arguments(root.get("arguments"));
                normalized
            }
            Envelope::OutputWrapped { root, output } => {
                let error = error_text(root.get("error"));
                let success = resolve_success(root.get("success"), &error);
                let mut normalized =
                    NormalizedResult::new(shape, success, decode_output(output), error);
                normalized.tool_name = recovered_name(root);
                normalized.parameters = as_arguments(root.get("arguments"));
                normalized
            }
            Envelope::Final(root) => {
                let error = error_text(root.get("error"));
                let success = resolve_success(root.get("success"), &error);
                let output = field(root, "content")
                    .or_else(|| field(root, "message"))
                    .map(decode_output)
                    .unwrap_or(Value::Null);
                let mut normalized = NormalizedResult::new(shape, success, output, error);
                normalized.tool_name = recovered_name(root);
                normalized
            }
            Envelope::Opaque(value) => NormalizedResult::new(
                shape,
                false,
                value.clone(),
                Some(PARSE_FAILURE_MESSAGE.to_string()),
            ),
        }
    }

    fn from_tool_execution(execution: &Map<String, Value>, result: &Value) -> NormalizedResult {
        let result = decode_output(result);
        let mut normalized = match &result {
            Value::Object(map) => {
                let error = error_text(map.get("error"));
                let success = resolve_success(map.get("success"), &error);
                let output = field(map, "output")
                    .map(decode_output)
                    .unwrap_or(Value::Null);
                NormalizedResult::new(ResultShape::ToolExecution, success, output, error)
            }
            other => NormalizedResult::new(ResultShape::ToolExecution, true, other.clone(), None),
        };
        normalized.tool_name = non_empty_str(execution.get("xml_tag_name"))
            .or_else(|| non_empty_str(execution.get("function_name")))
            .map(canonicalize_slug);
        normalized.parameters = as_arguments(execution.get("arguments"));
        normalized.tool_call_id = non_empty_str(execution.get("tool_call_id")).map(str::to_string);
        normalized.timestamp = execution
            .get("execution_details")
            .and_then(|d| non_empty_str(d.get("timestamp")))
            .or_else(|| result.get("timestamp").and_then(|t| non_empty_str(Some(t))))
            .map(str::to_string);
        normalized
    }

    /// Peel string encodings and message wrappers off `payload`.
    fn decode(&self, payload: &Value) -> Value {
        let mut current = payload.clone();
        for _ in 0..self.max_decode_depth {
            let next = match &current {
                Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
                    Ok(v @ Value::Object(_)) | Ok(v @ Value::String(_)) => Some(v),
                    _ => None,
                },
                Value::Object(map) => Self::unwrap_content(map),
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// `{role, content}` messages and `{content: "<json>"}` objects whose
    /// content carries a recognized envelope.
    fn unwrap_content(map: &Map<String, Value>) -> Option<Value> {
        if is_envelope(map) {
            return None;
        }
        let inner = match field(map, "content")? {
            Value::Object(inner) => inner.clone(),
            Value::String(s) => match parse_structured(s)? {
                Value::Object(inner) => inner,
                _ => return None,
            },
            _ => return None,
        };
        let nested_message = inner.contains_key("role") && inner.contains_key("content");
        if is_envelope(&inner) || nested_message {
            Some(Value::Object(inner))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(payload: Value) -> NormalizedResult {
        ResultNormalizer::default().normalize(&payload)
    }

    #[test]
    fn test_tool_execution_with_encoded_output() {
        let n = normalize(json!({
            "tool_execution": {"result": {"success": true, "output": "{\"total_results\":3}"}}
        }));
        assert_eq!(n.shape, ResultShape::ToolExecution);
        assert!(n.success);
        assert_eq!(n.output, json!({"total_results": 3}));
        assert_eq!(n.error, None);
    }

    #[test]
    fn test_tool_execution_metadata() {
        let n = normalize(json!({
            "tool_execution": {
                "function_name": "web_search",
                "xml_tag_name": "web-search",
                "tool_call_id": "toolu_1",
                "arguments": "{\"query\": \"cats\"}",
                "execution_details": {"timestamp": "2025-01-01T00:00:00Z"},
                "result": {"success": false, "output": "rate limited", "error": "429"}
            }
        }));
        assert!(!n.success);
        assert_eq!(n.output, json!("rate limited"));
        assert_eq!(n.error.as_deref(), Some("429"));
        assert_eq!(n.tool_name.as_deref(), Some("web-search"));
        assert_eq!(n.parameters, json!({"query": "cats"}).as_object().cloned());
        assert_eq!(n.tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(n.timestamp.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_tool_execution_without_result_falls_through() {
        let n = normalize(json!({"tool_execution": {"function_name": "x"}, "output": "hi"}));
        assert_eq!(n.shape, ResultShape::OutputWrapped);
        assert_eq!(n.output, json!("hi"));
    }

    #[test]
    fn test_flat_legacy_shape() {
        let n = normalize(json!({
            "tool": "execute_command",
            "parameters": {"command": "ls"},
            "output": {"success": false, "error": "exit 1", "stdout": ""}
        }));
        assert_eq!(n.shape, ResultShape::FlatLegacy);
        assert!(!n.success);
        assert_eq!(n.error.as_deref(), Some("exit 1"));
        assert_eq!(n.tool_name.as_deref(), Some("execute-command"));
        assert_eq!(n.parameters, json!({"command": "ls"}).as_object().cloned());

        let ok = normalize(json!({"tool": "ls", "parameters": {}, "output": "a\nb"}));
        assert!(ok.success);
        assert_eq!(ok.output, json!("a\nb"));
    }

    #[test]
    fn test_result_wrapped_object_and_string() {
        let n = normalize(json!({"result": {"output": [1, 2], "success": true}}));
        assert_eq!(n.shape, ResultShape::ResultWrapped);
        assert!(n.success);
        assert_eq!(n.output, json!([1, 2]));

        let n = normalize(json!({"result": "{\"output\": \"done\", \"error\": \"warn\"}"}));
        assert!(!n.success);
        assert_eq!(n.output, json!("done"));
        assert_eq!(n.error.as_deref(), Some("warn"));

        let n = normalize(json!({"result": "plain text"}));
        assert!(n.success);
        assert_eq!(n.output, json!("plain text"));
    }

    #[test]
    fn test_result_without_output_keeps_whole_result() {
        let n = normalize(json!({"result": {"files": ["a", "b"]}}));
        assert!(n.success);
        assert_eq!(n.output, json!({"files": ["a", "b"]}));
    }

    #[test]
    fn test_output_wrapped_success_rules() {
        let n = normalize(json!({"output": "fine"}));
        assert_eq!(n.shape, ResultShape::OutputWrapped);
        assert!(n.success);

        let n = normalize(json!({"output": "partial", "error": "timeout"}));
        assert!(!n.success);
        assert_eq!(n.error.as_deref(), Some("timeout"));

        let n = normalize(json!({"output": "ok anyway", "error": "noise", "success": true}));
        assert!(n.success);

        let n = normalize(json!({"output": {"code": 2}, "error": {"code": 2}}));
        assert_eq!(n.error.as_deref(), Some(r#"{"code":2}"#));
    }

    #[test]
    fn test_final_shape() {
        let n = normalize(json!({"content": "Here are the results", "message": "ok"}));
        assert_eq!(n.shape, ResultShape::Final);
        assert!(n.success);
        assert_eq!(n.output, json!("Here are the results"));

        let n = normalize(json!({"message": "Permission denied", "success": false}));
        assert!(!n.success);
        assert_eq!(n.output, json!("Permission denied"));
    }

    #[test]
    fn test_unparseable_string() {
        let n = normalize(json!("oops"));
        assert_eq!(n.shape, ResultShape::Opaque);
        assert!(!n.success);
        assert_eq!(n.error.as_deref(), Some(PARSE_FAILURE_MESSAGE));
        assert_eq!(n.output, json!("oops"));
    }

    #[test]
    fn test_unrecognized_object_is_opaque() {
        let n = normalize(json!({"foo": 1}));
        assert_eq!(n.shape, ResultShape::Opaque);
        assert_eq!(n.output, json!({"foo": 1}));
        assert!(!n.success);
    }

    #[test]
    fn test_doubly_encoded_string() {
        let inner = json!({"output": "done", "success": true}).to_string();
        let outer = Value::String(inner).to_string();
        let n = ResultNormalizer::default().normalize_str(&outer);
        assert_eq!(n.shape, ResultShape::OutputWrapped);
        assert!(n.success);
        assert_eq!(n.output, json!("done"));
    }

    #[test]
    fn test_json_string_inside_content() {
        let execution = json!({"tool_execution": {"result": {"success": true, "output": "ok"}}});
        let n = normalize(json!({"role": "tool", "content": execution.to_string()}));
        assert_eq!(n.shape, ResultShape::ToolExecution);
        assert_eq!(n.output, json!("ok"));

        let n = normalize(json!({"content": {"output": 7}}));
        assert_eq!(n.shape, ResultShape::OutputWrapped);
        assert_eq!(n.output, json!(7));
    }

    #[test]
    fn test_plain_content_is_not_unwrapped() {
        let n = normalize(json!({"role": "tool", "content": "{\"rows\": 3}"}));
        assert_eq!(n.shape, ResultShape::Final);
        assert_eq!(n.output, json!({"rows": 3}));
    }

    #[test]
    fn test_numeric_string_stays_text() {
        let n = normalize(json!("42"));
        assert_eq!(n.shape, ResultShape::Opaque);
        assert_eq!(n.output, json!("42"));
    }

    #[test]
    fn test_decode_depth_is_bounded() {
        let mut payload = json!({"output": "deep"});
        for _ in 0..6 {
            payload = Value::String(payload.to_string());
        }
        let n = ResultNormalizer::new(2).normalize(&payload);
        assert_eq!(n.shape, ResultShape::Opaque);
        let n = ResultNormalizer::new(8).normalize(&payload);
        assert_eq!(n.shape, ResultShape::OutputWrapped);
    }
}
