// src/tools/legacy.rs
//! Compatibility shim for the old one-tag-per-call grammar:
//! `<tool-name attr="...">body</tool-name>`, tool-name taken from the vocabulary.
//!
//! Parameter extraction is best effort. Attributes always become parameters.
//! The body goes to the vocabulary's body parameter when the tag has one;
//! otherwise simple `<key>value</key>` children are read.

use super::naming::canonicalize_slug;
use super::parser::coerce_parameter_value;
use super::scanner::strip_partial_suffix;
use super::vocabulary::TagVocabulary;
use crate::core::ToolCallRecord;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Opening tag of a legacy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LegacyOpenTag {
    Complete {
        /// Name as written in the text
        raw_name: String,
        /// Byte length of the opening tag, including `>`
        len: usize,
        self_closing: bool,
    },
    Incomplete,
    NotATag,
}

/// One legacy invocation, closed or still streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyInvocation {
    /// Canonical tool name
    pub name: String,
    pub offset: usize,
    pub parameters: Map<String, Value>,
    /// Source text from the opening tag to the closing tag, or to the end of
    /// the buffer while the call is still open
    pub raw_source: String,
    pub closed: bool,
}

impl LegacyInvocation {
    pub fn into_record(self, id: String) -> ToolCallRecord {
        if self.closed {
            ToolCallRecord::closed(id, self.name, self.parameters, self.raw_source)
        } else {
            let mut record = ToolCallRecord::new(id, self.name, self.raw_source);
            if !self.parameters.is_empty() {
                record.mark_streaming();
            }
            for (key, value) in self.parameters {
                record.upsert_parameter(key, value);
            }
            record
        }
    }
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("attribute pattern is valid")
    })
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Read a vocabulary tag opening at the start of `tail`.
pub(crate) fn parse_legacy_open_tag(tail: &str, vocabulary: &TagVocabulary) -> LegacyOpenTag {
    let Some(rest) = tail.strip_prefix('<') else {
        return LegacyOpenTag::NotATag;
    };
    let name_len = rest
        .find(|c: char| !is_tag_name_char(c))
        .unwrap_or(rest.len());
    let raw_name = &rest[..name_len];
    if raw_name.is_empty() {
        return LegacyOpenTag::NotATag;
    }
    let after = &rest[name_len..];
    match after.chars().next() {
        None => {
            // `<web-se` may still become a known tag
            let canonical = canonicalize_slug(raw_name);
            if vocabulary.iter().any(|t| t.name.starts_with(&canonical)) {
                return LegacyOpenTag::Incomplete;
            }
            return LegacyOpenTag::NotATag;
        }
        Some(c) if c == '>' || c == '/' || c.is_whitespace() => {}
        Some(_) => return LegacyOpenTag::NotATag,
    }
    if !vocabulary.contains(&canonicalize_slug(raw_name)) {
        return LegacyOpenTag::NotATag;
    }

    // Attribute values may contain `>`, so only an unquoted one ends the tag.
    // A quote opens a value only after `=`; an apostrophe in prose does not.
    let mut quote: Option<char> = None;
    let mut after_eq = false;
    for (i, c) in after.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => continue,
            (None, '"' | '\'') if after_eq => quote = Some(c),
            (None, '>') => {
                let attrs = after[..i].trim_end();
                let self_closing = attrs.ends_with('/');
                let attrs = attrs.strip_suffix('/').unwrap_or(attrs);
                if !attribute_regex().replace_all(attrs, "").trim().is_empty() {
                    return LegacyOpenTag::NotATag;
                }
                return LegacyOpenTag::Complete {
                    raw_name: raw_name.to_string(),
                    len: 1 + name_len + i + 1,
                    self_closing,
                };
            }
            (None, '<') => return LegacyOpenTag::NotATag,
            _ => {}
        }
        if !c.is_whitespace() {
            after_eq = c == '=';
        }
    }
    LegacyOpenTag::Incomplete
}

/// Simple `<key>value</key>` children of a legacy body, in source order.
fn child_elements(body: &str) -> Vec<(String, String)> {
    let mut children = Vec::new();
    let mut pos = 0;
    while let Some(rel) = body[pos..].find('<') {
        let at = pos + rel;
        let rest = &body[at + 1..];
        let name_len = rest
            .find(|c: char| !is_tag_name_char(c))
            .unwrap_or(rest.len());
        if name_len == 0 || !rest[name_len..].starts_with('>') {
            pos = at + 1;
            continue;
        }
        let name = &rest[..name_len];
        let value_start = at + 1 + name_len + 1;
        let close = format!("</{}>", name);
        match body[value_start..].find(&close) {
            Some(end_rel) => {
                let value_end = value_start + end_rel;
                children.push((name.to_string(), body[value_start..value_end].to_string()));
                pos = value_end + close.len();
            }
            None => break,
        }
    }
    children
}

/// Parser for the legacy grammar.
#[derive(Debug, Clone)]
pub struct LegacyInvocationParser {
    vocabulary: TagVocabulary,
}

impl Default for LegacyInvocationParser {
    fn default() -> Self {
        Self::new(TagVocabulary::default())
    }
}

impl LegacyInvocationParser {
    pub fn new(vocabulary: TagVocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.vocabulary
    }

    /// Closed legacy invocations as records, ids `call_{ordinal}`.
    pub fn parse(&self, text: &str) -> Vec<ToolCallRecord> {
        self.scan(text)
            .into_iter()
            .enumerate()
            .filter(|(_, inv)| inv.closed)
            .map(|(ordinal, inv)| inv.into_record(format!("call_{}", ordinal)))
            .collect()
    }

    /// All legacy invocations in `text`. Only the last one can be open: the
    /// scan stops at an unclosed tag because everything after it is its body.
    pub fn scan(&self, text: &str) -> Vec<LegacyInvocation> {
        let mut invocations = Vec::new();
        let mut pos = 0;
        while let Some(rel) = text[pos..].find('<') {
            let at = pos + rel;
            let (raw_name, len, self_closing) =
                match parse_legacy_open_tag(&text[at..], &self.vocabulary) {
                    LegacyOpenTag::Complete {
                        raw_name,
                        len,
                        self_closing,
                    } => (raw_name, len, self_closing),
                    LegacyOpenTag::Incomplete => break,
                    LegacyOpenTag::NotATag => {
                        pos = at + 1;
                        continue;
                    }
                };
            let name = canonicalize_slug(&raw_name);
            let open_end = at + len;
            // Skip `<` plus the name; attributes run up to the closing `>`.
            let attrs = text[at + 1 + raw_name.len()..open_end - 1].trim_end_matches('/');

            if self_closing {
                invocations.push(LegacyInvocation {
                    parameters: self.extract_parameters(&name, attrs, "", true),
                    name,
                    offset: at,
                    raw_source: text[at..open_end].to_string(),
                    closed: true,
                });
                pos = open_end;
                continue;
            }

            let close = format!("</{}>", raw_name);
            match text[open_end..].find(&close) {
                Some(rel_close) => {
                    let body_end = open_end + rel_close;
                    let end = body_end + close.len();
                    invocations.push(LegacyInvocation {
                        parameters: self.extract_parameters(
                            &name,
                            attrs,
                            &text[open_end..body_end],
                            true,
                        ),
                        name,
                        offset: at,
                        raw_source: text[at..end].to_string(),
                        closed: true,
                    });
                    pos = end;
                }
                None => {
                    let body = strip_partial_suffix(&text[open_end..], &close);
                    invocations.push(LegacyInvocation {
                        parameters: self.extract_parameters(&name, attrs, body, false),
                        name,
                        offset: at,
                        raw_source: text[at..].to_string(),
                        closed: false,
                    });
                    break;
                }
            }
        }
        invocations
    }

    fn extract_parameters(
        &self,
        name: &str,
        attrs: &str,
        body: &str,
        closed: bool,
    ) -> Map<String, Value> {
        let mut params = Map::new();
        for caps in attribute_regex().captures_iter(attrs) {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            params.insert(key.to_string(), coerce_parameter_value(value));
        }

        match self
            .vocabulary
            .get(name)
            .and_then(|spec| spec.body_parameter.as_deref())
        {
            Some(key) => {
                let text = body.trim();
                if !text.is_empty() {
                    let value = if closed {
                        coerce_parameter_value(text)
                    } else {
                        Value::String(text.to_string())
                    };
                    params.insert(key.to_string(), value);
                }
            }
            None => {
                for (key, value) in child_elements(body) {
                    params.insert(key, coerce_parameter_value(&value));
                }
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_parameter() {
        let parser = LegacyInvocationParser::default();
        let calls = parser.parse("<execute-command>\nnpm install\n</execute-command>");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function_name(), "execute-command");
        assert_eq!(calls[0].parameters().get("command"), Some(&json!("npm install")));
    }

    #[test]
    fn test_attributes_and_body() {
        let parser = LegacyInvocationParser::default();
        let text = r#"<create-file file_path="src/a.rs">fn main() { if a > b {} }</create-file>"#;
        let calls = parser.parse(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].parameters(),
            json!({"file_path": "src/a.rs", "file_contents": "fn main() { if a > b {} }"})
                .as_object()
                .unwrap()
        );
        assert_eq!(calls[0].raw_source(), text);
    }

    #[test]
    fn test_child_elements() {
        let parser = LegacyInvocationParser::default();
        let text = "<str-replace file_path=\"a.txt\"><old_str>foo</old_str><new_str>bar</new_str></str-replace>";
        let calls = parser.parse(text);
        assert_eq!(calls.len(), 1);
        let keys: Vec<&String> = calls[0].parameters().keys().collect();
        assert_eq!(keys, ["file_path", "old_str", "new_str"]);
        assert_eq!(calls[0].parameters().get("new_str"), Some(&json!("bar")));
    }

    #[test]
    fn test_self_closing_and_coerced_attributes() {
        let parser = LegacyInvocationParser::default();
        let calls = parser.parse(r#"<web-search query="rust" num_results="20" />"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters().get("num_results"), Some(&json!(20)));
    }

    #[test]
    fn test_tool_without_parameters() {
        let parser = LegacyInvocationParser::default();
        let calls = parser.parse("All done. <complete></complete>");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].parameters().is_empty());
    }

    #[test]
    fn test_unknown_tags_ignored() {
        let parser = LegacyInvocationParser::default();
        assert!(parser.parse("<div>hello</div> <b>x</b>").is_empty());
    }

    #[test]
    fn test_open_call_streams_partial_body() {
        let parser = LegacyInvocationParser::default();
        let invocations = parser.scan("<ask>Which colour do you</a");
        assert_eq!(invocations.len(), 1);
        assert!(!invocations[0].closed);
        assert_eq!(
            invocations[0].parameters.get("text"),
            Some(&json!("Which colour do you"))
        );
        assert!(parser.parse("<ask>Which colour do you</a").is_empty());
    }

    #[test]
    fn test_apostrophe_in_prose_does_not_swallow_later_calls() {
        let parser = LegacyInvocationParser::default();
        let text = "I can <ask you're sure?> maybe. <execute-command>ls</execute-command> <complete></complete>";
        let calls = parser.parse(text);
        let names: Vec<&str> = calls.iter().map(|c| c.function_name()).collect();
        assert_eq!(names, ["execute-command", "complete"]);
        assert_eq!(calls[0].parameters().get("command"), Some(&json!("ls")));
    }

    #[test]
    fn test_quoted_attribute_may_hold_markup() {
        let parser = LegacyInvocationParser::default();
        let calls = parser.parse(r#"<web-search query='a <b> "c"'></web-search>"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters().get("query"), Some(&json!(r#"a <b> "c""#)));
    }

    #[test]
    fn test_open_tag_states() {
        let vocab = TagVocabulary::default();
        assert_eq!(parse_legacy_open_tag("<web-se", &vocab), LegacyOpenTag::Incomplete);
        assert_eq!(
            parse_legacy_open_tag(r#"<web-search query="a"#, &vocab),
            LegacyOpenTag::Incomplete
        );
        assert_eq!(parse_legacy_open_tag("<web-searching>", &vocab), LegacyOpenTag::NotATag);
        assert_eq!(parse_legacy_open_tag("<p>", &vocab), LegacyOpenTag::NotATag);
        assert_eq!(
            parse_legacy_open_tag("<ask you're sure?> ok", &vocab),
            LegacyOpenTag::NotATag
        );
        assert_eq!(
            parse_legacy_open_tag("<ask when <complete>", &vocab),
            LegacyOpenTag::NotATag
        );
        assert_eq!(
            parse_legacy_open_tag("<ask it's", &vocab),
            LegacyOpenTag::Incomplete
        );
        assert_eq!(
            parse_legacy_open_tag("<ask>", &vocab),
            LegacyOpenTag::Complete {
                raw_name: "ask".to_string(),
                len: 5,
                self_closing: false
            }
        );
    }
}
