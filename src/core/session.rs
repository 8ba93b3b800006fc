// src/core/session.rs
//! Streaming bookkeeping for one assistant turn.
//!
//! The caller hands over the cumulative buffer after every chunk. The session
//! resumes its scanner where the previous update stopped, creates records as
//! soon as an `<invoke name=...>` opens, streams parameter text into them and
//! finalizes them when the invoke closes. Results arrive out of band through
//! [`ToolCallSession::attach_result`].
//!
//! Until the turn shows `<function_calls>` or a bare `<invoke>`, legacy tags
//! are tracked instead. Once it does, the legacy records of that turn are
//! withdrawn so the session agrees with [`InvocationParser`] on the same text.
//!
//! [`InvocationParser`]: crate::tools::InvocationParser

use super::record::{ArgumentPrecedence, ToolCallRecord};
use super::PipelineError;
use crate::tools::detector::{DetectedTag, StreamTagDetector, TagKind};
use crate::tools::generate_tool_call_prefix;
use crate::tools::helpers::log_records;
use crate::tools::legacy::LegacyInvocationParser;
use crate::tools::naming::{canonicalize_slug, display_name};
use crate::tools::parser::coerce_parameter_value;
use crate::tools::result::{ResultNormalizer, ResultShape};
use crate::tools::scanner::{InvocationScanner, Token};
use crate::tools::vocabulary::TagVocabulary;
use crate::utils::config::PipelineConfig;
use crate::utils::logger::TranscriptLogger;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What changed during one [`ToolCallSession::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionUpdate {
    /// Earliest marker in the buffer, if any
    pub detected: Option<DetectedTag>,
    /// Ids of records created by this update, in stream order
    pub created: Vec<String>,
    /// Ids of previously existing records that changed
    pub updated: Vec<String>,
    /// Ids of legacy records withdrawn because the turn switched to the
    /// `<function_calls>` grammar. Their ids are handed out again.
    pub removed: Vec<String>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A tool result delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    /// Record id the result belongs to
    pub id: String,
    /// Tool name as reported alongside the result
    #[serde(default)]
    pub function_name: Option<String>,
    /// Raw payload: object, JSON string, or doubly encoded string
    pub payload: Value,
}

#[derive(Debug)]
pub struct ToolCallSession {
    detector: StreamTagDetector,
    legacy: LegacyInvocationParser,
    normalizer: ResultNormalizer,
    precedence: ArgumentPrecedence,
    id_prefix: String,
    next_ordinal: usize,
    /// Set once the turn uses the `<function_calls>` grammar
    scanner: Option<InvocationScanner>,
    records: Vec<ToolCallRecord>,
    index: HashMap<String, usize>,
    /// Record of the invoke the scanner is currently inside
    open_invoke: Option<usize>,
    /// Records created from legacy tags this turn, in scan order
    legacy_records: Vec<usize>,
    turn_first_record: usize,
    turn_first_ordinal: usize,
    detected: Option<DetectedTag>,
    consumed: usize,
    logger: Option<Arc<TranscriptLogger>>,
}

impl Default for ToolCallSession {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl ToolCallSession {
    pub fn new(config: &PipelineConfig) -> Self {
        let vocabulary = config.vocabulary();
        Self {
            detector: StreamTagDetector::new(vocabulary.clone()),
            legacy: LegacyInvocationParser::new(vocabulary),
            normalizer: ResultNormalizer::new(config.max_decode_depth),
            precedence: config.argument_precedence,
            id_prefix: config
                .id_prefix
                .clone()
                .unwrap_or_else(generate_tool_call_prefix),
            next_ordinal: 0,
            scanner: None,
            records: Vec::new(),
            index: HashMap::new(),
            open_invoke: None,
            legacy_records: Vec::new(),
            turn_first_record: 0,
            turn_first_ordinal: 0,
            detected: None,
            consumed: 0,
            logger: TranscriptLogger::new(),
        }
    }

    /// Session over a custom vocabulary with otherwise default settings.
    pub fn with_vocabulary(vocabulary: TagVocabulary) -> Self {
        let mut session = Self::default();
        session.detector = StreamTagDetector::new(vocabulary.clone());
        session.legacy = LegacyInvocationParser::new(vocabulary);
        session
    }

    pub fn with_logger(mut self, logger: Arc<TranscriptLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        self.detector.vocabulary()
    }

    /// All records seen so far, in stream order
    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&ToolCallRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    /// Marker reported by the last update
    pub fn detected(&self) -> Option<&DetectedTag> {
        self.detected.as_ref()
    }

    fn next_id(&mut self) -> String {
        let id = format!("{}_{}", self.id_prefix, self.next_ordinal);
        self.next_ordinal += 1;
        id
    }

    fn push_record(&mut self, record: ToolCallRecord) -> usize {
        let idx = self.records.len();
        self.index.insert(record.id().to_string(), idx);
        self.records.push(record);
        idx
    }

    /// A buffer shorter than the last one starts a new turn. Records from
    /// earlier turns are kept and ids keep counting.
    fn start_turn(&mut self) {
        self.scanner = None;
        self.open_invoke = None;
        self.legacy_records.clear();
        self.turn_first_record = self.records.len();
        self.turn_first_ordinal = self.next_ordinal;
        self.detected = None;
        self.consumed = 0;
    }

    /// Withdraw the records the legacy grammar created this turn and rewind
    /// the ordinal counter to where the turn began.
    fn withdraw_turn_records(&mut self) -> Vec<String> {
        let withdrawn: Vec<ToolCallRecord> =
            self.records.drain(self.turn_first_record..).collect();
        self.legacy_records.clear();
        self.next_ordinal = self.turn_first_ordinal;
        let mut ids = Vec::with_capacity(withdrawn.len());
        for record in withdrawn {
            crate::log_warn!(
                "Withdrawing legacy tool call {} ({}), the turn uses <function_calls>",
                record.id(),
                record.function_name()
            );
            self.index.remove(record.id());
            ids.push(record.id().to_string());
        }
        ids
    }

    /// Feed the cumulative buffer of the current turn.
    pub fn update(&mut self, buffer: &str) -> SessionUpdate {
        if buffer.len() < self.consumed {
            crate::log_debug!(
                "Buffer shrank from {} to {} bytes, starting a new turn",
                self.consumed,
                buffer.len()
            );
            self.start_turn();
            if let Some(logger) = &self.logger {
                logger.log_buffer(buffer);
            }
        } else if let Some(logger) = &self.logger {
            if let Some(delta) = buffer.get(self.consumed..) {
                logger.log_stream_token(delta);
            }
        }
        self.consumed = buffer.len();

        let detected = self.detector.detect(buffer);
        if detected != self.detected {
            if let Some(tag) = &detected {
                crate::log_info!("Detected <{}> at offset {}", tag.tag_name(), tag.offset);
                if let Some(logger) = &self.logger {
                    logger.log_detected(tag);
                }
            }
            self.detected = detected.clone();
        }

        let mut removed = Vec::new();
        if self.scanner.is_none() {
            self.scanner = InvocationScanner::for_buffer(buffer);
            if self.scanner.is_some() {
                removed = self.withdraw_turn_records();
            }
        }

        let mut changed = Vec::new();
        let mut closed = Vec::new();
        let first_new = self.records.len();
        if self.scanner.is_some() {
            self.update_function_calls(buffer, &mut changed, &mut closed);
        } else {
            self.update_legacy(buffer, &mut changed, &mut closed);
        }

        let created: Vec<String> = self.records[first_new..]
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        let mut updated: Vec<String> = Vec::new();
        for idx in changed {
            if idx < first_new {
                let id = self.records[idx].id().to_string();
                if !updated.contains(&id) {
                    updated.push(id);
                }
            }
        }

        if !closed.is_empty() {
            let finished: Vec<ToolCallRecord> =
                closed.iter().map(|&idx| self.records[idx].clone()).collect();
            log_records("Parsed", &finished);
            if let Some(logger) = &self.logger {
                logger.log_records("closed", &finished.iter().collect::<Vec<_>>());
            }
        }

        SessionUpdate {
            detected,
            created,
            updated,
            removed,
        }
    }

    fn update_function_calls(
        &mut self,
        buffer: &str,
        changed: &mut Vec<usize>,
        closed: &mut Vec<usize>,
    ) {
        let Some(scanner) = self.scanner.as_mut() else {
            return;
        };
        for token in scanner.scan(buffer) {
            match token {
                Token::OpenInvoke { name, offset } => {
                    if let Some(idx) = self.open_invoke.take() {
                        crate::log_warn!(
                            "Tool call {} was never closed before the next <invoke>",
                            self.records[idx].id()
                        );
                    }
                    let id = self.next_id();
                    let record = ToolCallRecord::new(id, name, buffer[offset..].to_string());
                    crate::log_debug!("Tool call {} opened: {}", record.id(), record.function_name());
                    self.open_invoke = Some(self.push_record(record));
                }
                Token::OpenParameter { .. } => {
                    if let Some(idx) = self.open_invoke {
                        self.records[idx].mark_streaming();
                        changed.push(idx);
                    }
                }
                Token::Parameter { name, value } => {
                    if let Some(idx) = self.open_invoke {
                        self.records[idx].upsert_parameter(name, coerce_parameter_value(&value));
                        changed.push(idx);
                    }
                }
                Token::CloseInvoke { start, end } => {
                    if let Some(idx) = self.open_invoke.take() {
                        self.records[idx].close(&buffer[start..end]);
                        changed.push(idx);
                        closed.push(idx);
                    }
                }
                Token::CloseBlock => {
                    if let Some(idx) = self.open_invoke.take() {
                        crate::log_warn!(
                            "Tool call {} was never closed before </function_calls>",
                            self.records[idx].id()
                        );
                    }
                }
                Token::OpenBlock => {}
            }
        }

        let (Some(idx), Some(scanner)) = (self.open_invoke, self.scanner.as_ref()) else {
            return;
        };
        let start = scanner.open_invoke_start();
        let partial = scanner
            .partial_parameter(buffer)
            .map(|(name, text)| (name.to_string(), text.to_string()));
        if let Some(start) = start {
            if self.records[idx].set_raw_source(&buffer[start..]) {
                changed.push(idx);
            }
        }
        if let Some((name, text)) = partial {
            if self.records[idx].upsert_parameter(name, Value::String(text)) {
                changed.push(idx);
            }
        }
    }

    fn update_legacy(&mut self, buffer: &str, changed: &mut Vec<usize>, closed: &mut Vec<usize>) {
        for (i, invocation) in self.legacy.scan(buffer).into_iter().enumerate() {
            let Some(&idx) = self.legacy_records.get(i) else {
                let is_closed = invocation.closed;
                let id = self.next_id();
                let idx = self.push_record(invocation.into_record(id));
                self.legacy_records.push(idx);
                if is_closed {
                    closed.push(idx);
                }
                continue;
            };

            let record = &mut self.records[idx];
            if record.is_closed() {
                continue;
            }
            let mut dirty = false;
            if !invocation.parameters.is_empty() {
                record.mark_streaming();
            }
            for (key, value) in invocation.parameters {
                dirty |= record.upsert_parameter(key, value);
            }
            if invocation.closed {
                record.close(&invocation.raw_source);
                closed.push(idx);
                dirty = true;
            } else {
                dirty |= record.set_raw_source(&invocation.raw_source);
            }
            if dirty {
                changed.push(idx);
            }
        }
    }

    /// Normalize a result payload and merge it into its record.
    pub fn attach_result(&mut self, event: ResultEvent) -> Result<&ToolCallRecord, PipelineError> {
        let Some(&idx) = self.index.get(&event.id) else {
            let err = PipelineError::UnknownToolCall { id: event.id };
            crate::log_error!("{}", err);
            if let Some(logger) = &self.logger {
                logger.log_error(&err.to_string());
            }
            return Err(err);
        };

        let record = &self.records[idx];
        if let Some(name) = &event.function_name {
            if canonicalize_slug(name) != record.function_name() {
                crate::log_warn!(
                    "Result for {} names '{}' but the call was '{}'",
                    record.id(),
                    name,
                    record.function_name()
                );
            }
        }

        let normalized = self.normalizer.normalize(&event.payload);
        if normalized.shape == ResultShape::Opaque {
            crate::log_warn!(
                "Unrecognized result payload for {}: {}",
                record.id(),
                event.payload
            );
        }
        if let Some(logger) = &self.logger {
            logger.log_result(record.id(), &normalized);
        }

        if let Err(err) = self.records[idx].attach_result(normalized, self.precedence) {
            crate::log_error!("{}", err);
            if let Some(logger) = &self.logger {
                logger.log_error(&err.to_string());
            }
            return Err(err);
        }
        Ok(&self.records[idx])
    }

    /// The part of `buffer` that can be shown as plain text. Stops at the
    /// first marker that is hidden while streaming and holds back a marker
    /// that is still arriving.
    pub fn visible_text<'a>(&self, buffer: &'a str) -> &'a str {
        let hidden = self
            .detector
            .detect(buffer)
            .filter(|tag| match &tag.kind {
                TagKind::FunctionCallsBlock | TagKind::BareInvoke => true,
                TagKind::Legacy(name) => self.vocabulary().is_hidden(name),
            })
            .map(|tag| tag.offset);
        let partial = self.detector.partial_tag_offset(buffer);
        let cut = match (hidden, partial) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => buffer.len(),
        };
        &buffer[..cut]
    }

    /// Live feedback label for the most recent call still waiting for its
    /// result, e.g. "Running Web Search".
    pub fn active_label(&self) -> Option<String> {
        self.records
            .iter()
            .rev()
            .find(|r| !r.status().is_terminal())
            .map(|r| format!("Running {}", display_name(self.vocabulary(), r.function_name())))
    }
}
