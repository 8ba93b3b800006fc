// src/tools/parser.rs
//! Tool invocation parsing from assistant output
//!
//! Supports the `<function_calls>` grammar (including invokes emitted without
//! their block wrapper) and, when that grammar is absent, the legacy
//! one-tag-per-call grammar.

use super::legacy::LegacyInvocationParser;
use super::naming::canonicalize_slug;
use super::scanner::{InvocationScanner, Token};
use super::vocabulary::TagVocabulary;
use crate::core::ToolCallRecord;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

/// Parser for extracting tool invocations from a (possibly partial) buffer.
/// Only fully closed invokes are returned, so calling it again on a longer
/// buffer never changes what an earlier call reported.
#[derive(Debug, Clone)]
pub struct InvocationParser {
    legacy: LegacyInvocationParser,
    id_prefix: String,
}

impl Default for InvocationParser {
    fn default() -> Self {
        Self::new(TagVocabulary::default())
    }
}

impl InvocationParser {
    pub fn new(vocabulary: TagVocabulary) -> Self {
        Self {
            legacy: LegacyInvocationParser::new(vocabulary),
            id_prefix: "call".to_string(),
        }
    }

    /// Prefix for record ids; ids are `{prefix}_{ordinal}` in stream order.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Parse every closed invocation in `text`.
    pub fn parse(&self, text: &str) -> Vec<ToolCallRecord> {
        if let Some(scanner) = InvocationScanner::for_buffer(text) {
            return self.scan_function_calls(scanner, text);
        }
        self.legacy
            .scan(text)
            .into_iter()
            .enumerate()
            .filter(|(_, inv)| inv.closed)
            .map(|(ordinal, inv)| inv.into_record(format!("{}_{}", self.id_prefix, ordinal)))
            .collect()
    }

    /// Every opened invoke takes the next ordinal, closed or not, so ids
    /// match those of a streaming session over the same text.
    fn scan_function_calls(
        &self,
        mut scanner: InvocationScanner,
        text: &str,
    ) -> Vec<ToolCallRecord> {
        let mut records = Vec::new();
        let mut current: Option<(String, String, Map<String, Value>)> = None;
        let mut ordinal = 0;

        for token in scanner.scan(text) {
            match token {
                Token::OpenInvoke { name, .. } => {
                    let id = format!("{}_{}", self.id_prefix, ordinal);
                    ordinal += 1;
                    current = Some((id, canonicalize_slug(&name), Map::new()));
                }
                Token::Parameter { name, value } => {
                    if let Some((_, _, params)) = current.as_mut() {
                        params.insert(name, coerce_parameter_value(&value));
                    }
                }
                Token::CloseInvoke { start, end } => {
                    if let Some((id, name, params)) = current.take() {
                        records.push(ToolCallRecord::closed(
                            id,
                            name,
                            params,
                            text[start..end].to_string(),
                        ));
                    }
                }
                Token::CloseBlock => current = None,
                Token::OpenBlock | Token::OpenParameter { .. } => {}
            }
        }
        records
    }

    /// Check if text contains at least one closed invocation
    pub fn has_tool_calls(&self, text: &str) -> bool {
        !self.parse(text).is_empty()
    }
}

fn numeric_regex() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| {
        Regex::new(r"^-?(?:\d+|\d*\.\d+)$").expect("numeric pattern is valid")
    })
}

/// Coerce trimmed parameter text into a typed value.
///
/// JSON object/array, then boolean, then number, else the text itself. A
/// failed JSON parse falls through, so this never fails.
pub fn coerce_parameter_value(raw: &str) -> Value {
    let text = raw.trim();
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return value;
        }
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if numeric_regex().is_match(text) {
        if !text.contains('.') {
            if let Ok(v) = text.parse::<i64>() {
                return Value::Number(v.into());
            }
            if let Ok(v) = text.parse::<u64>() {
                return Value::Number(v.into());
            }
        }
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}
