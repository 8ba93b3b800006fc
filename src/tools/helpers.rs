// src/tools/helpers.rs
//! Helper functions for logging tool call records.

use crate::core::ToolCallRecord;
use serde_json::Value;

const SUMMARY_ARGS_LIMIT: usize = 160;

/// Format records for logging - returns a summary string
pub fn format_records_summary(records: &[ToolCallRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    records
        .iter()
        .map(|record| {
            let args = Value::Object(record.parameters().clone())
                .to_string()
                .replace('\n', " ");
            let truncated = if args.chars().count() > SUMMARY_ARGS_LIMIT {
                let snippet: String = args.chars().take(SUMMARY_ARGS_LIMIT).collect();
                format!("{}...", snippet)
            } else {
                args
            };
            format!(
                "{}(args={}) [{}]",
                record.function_name(),
                truncated,
                serde_json::to_value(record.status())
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Log records with a label (uses crate logging)
pub fn log_records(label: &str, records: &[ToolCallRecord]) {
    if records.is_empty() {
        return;
    }
    let summary = format_records_summary(records);
    crate::log_info!("{} tool call(s): {}", label, summary);
}
