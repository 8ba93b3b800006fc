// src/tools/detector.rs
//! Detection of tool call markers in a streaming buffer.
//!
//! Only complete opening markers are reported: `<function_ca` is not a match
//! until its `>` arrives.

use super::legacy::{parse_legacy_open_tag, LegacyOpenTag};
use super::naming::canonicalize_slug;
use super::scanner::{
    is_valid_tool_name, parse_open_tag, OpenTag, FUNCTION_CALLS_OPEN, INVOKE_TAG,
};
use super::vocabulary::TagVocabulary;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "tag", rename_all = "snake_case")]
pub enum TagKind {
    /// `<function_calls>`
    FunctionCallsBlock,
    /// `<invoke name="...">` seen before its enclosing block marker
    BareInvoke,
    /// A vocabulary tag of the old grammar, canonical name
    Legacy(String),
}

/// The earliest marker found in a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedTag {
    pub kind: TagKind,
    /// Byte offset of the marker's `<`
    pub offset: usize,
}

impl DetectedTag {
    /// Tag name used for visibility and display lookups.
    pub fn tag_name(&self) -> &str {
        match &self.kind {
            TagKind::FunctionCallsBlock => "function_calls",
            TagKind::BareInvoke => INVOKE_TAG,
            TagKind::Legacy(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamTagDetector {
    vocabulary: TagVocabulary,
}

impl Default for StreamTagDetector {
    fn default() -> Self {
        Self::new(TagVocabulary::default())
    }
}

impl StreamTagDetector {
    pub fn new(vocabulary: TagVocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.vocabulary
    }

    /// Earliest complete marker in `buffer`. At one offset, a block marker
    /// beats a bare invoke, which beats a legacy tag.
    pub fn detect(&self, buffer: &str) -> Option<DetectedTag> {
        buffer.match_indices('<').find_map(|(at, _)| {
            self.marker_at(&buffer[at..])
                .map(|kind| DetectedTag { kind, offset: at })
        })
    }

    fn marker_at(&self, tail: &str) -> Option<TagKind> {
        if tail.starts_with(FUNCTION_CALLS_OPEN) {
            return Some(TagKind::FunctionCallsBlock);
        }
        if let OpenTag::Complete { name, .. } = parse_open_tag(tail, INVOKE_TAG) {
            if is_valid_tool_name(&name) {
                return Some(TagKind::BareInvoke);
            }
        }
        match parse_legacy_open_tag(tail, &self.vocabulary) {
            LegacyOpenTag::Complete { raw_name, .. } => {
                Some(TagKind::Legacy(canonicalize_slug(&raw_name)))
            }
            _ => None,
        }
    }

    /// Offset of a trailing marker that is still being received, if any.
    /// Text from there on should be held back instead of displayed.
    pub fn partial_tag_offset(&self, buffer: &str) -> Option<usize> {
        let at = buffer.rfind('<')?;
        let tail = &buffer[at..];
        if tail.contains('>') {
            return None;
        }
        let invoke_prefix = format!("<{}", INVOKE_TAG);
        let partial = FUNCTION_CALLS_OPEN.starts_with(tail)
            || invoke_prefix.starts_with(tail)
            || parse_open_tag(tail, INVOKE_TAG) == OpenTag::Incomplete
            || parse_legacy_open_tag(tail, &self.vocabulary) == LegacyOpenTag::Incomplete;
        partial.then_some(at)
    }
}
