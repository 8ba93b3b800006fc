// src/utils/logger.rs
//! Tool call session transcript logger.
//! Enable by setting environment variable TOOLCALL_RS_TRANSCRIPT_LOGGER=true
//!
//! Each session writes the buffers it saw, the detected markers, the parsed
//! records and the normalized results to its own file.

use crate::core::ToolCallRecord;
use crate::tools::{DetectedTag, NormalizedResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TRANSCRIPT_LOGGER_ENV: &str = "TOOLCALL_RS_TRANSCRIPT_LOGGER";

/// Check if transcript logging is enabled via environment variable
pub fn is_logging_enabled() -> bool {
    std::env::var(TRANSCRIPT_LOGGER_ENV)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Writes one session's transcript to a file.
/// Files are named by timestamp in the "log" folder.
#[derive(Debug)]
pub struct TranscriptLogger {
    file_path: PathBuf,
}

impl TranscriptLogger {
    /// Create a new logger. Returns None if logging is disabled.
    pub fn new() -> Option<Arc<Self>> {
        if !is_logging_enabled() {
            return None;
        }

        let log_dir = Path::new("log");
        if !log_dir.exists() {
            let _ = fs::create_dir_all(log_dir);
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let file_path = log_dir.join(format!(
            "toolcalls_{}_{:03}.log",
            now.as_secs(),
            now.subsec_millis()
        ));

        crate::log_info!(
            "Transcript logging enabled, writing to: {}",
            file_path.display()
        );
        Some(Self::with_path(file_path))
    }

    /// Logger writing to an explicit file, regardless of the environment.
    pub fn with_path(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            file_path: path.into(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn write(&self, content: &str) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            let _ = file.write_all(content.as_bytes());
        }
    }

    /// Raw text appended to the buffer since the previous update
    pub fn log_stream_token(&self, token: &str) {
        self.write(token);
    }

    pub fn log_buffer(&self, buffer: &str) {
        let content = format!("\n=== BUFFER ({} bytes) ===\n{}\n", buffer.len(), buffer);
        self.write(&content);
    }

    pub fn log_detected(&self, detected: &DetectedTag) {
        let content = format!(
            "\n=== DETECTED <{}> AT {} ===\n",
            detected.tag_name(),
            detected.offset
        );
        self.write(&content);
    }

    /// Log records with a label (created/updated/final)
    pub fn log_records(&self, label: &str, records: &[&ToolCallRecord]) {
        if records.is_empty() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(records) {
            let content = format!(
                "\n=== {} RECORDS ({}) ===\n{}\n",
                label.to_uppercase(),
                records.len(),
                json
            );
            self.write(&content);
        }
    }

    pub fn log_result(&self, id: &str, normalized: &NormalizedResult) {
        if let Ok(json) = serde_json::to_string_pretty(normalized) {
            let content = format!("\n=== RESULT FOR {} ===\n{}\n", id, json);
            self.write(&content);
        }
    }

    /// Log an error
    pub fn log_error(&self, error: &str) {
        let content = format!("\n=== ERROR ===\n{}\n", error);
        self.write(&content);
    }
}
