// src/tools/scanner.rs
//! Forward scanner for the `<function_calls>` grammar.
//!
//! The scanner walks the cumulative buffer once, emitting tokens only for
//! markup that is complete. It keeps its byte offset and open-element state
//! between calls, so feeding it a longer version of the same buffer resumes
//! where the previous call stopped instead of starting over.

use regex::Regex;
use std::sync::OnceLock;

pub const FUNCTION_CALLS_OPEN: &str = "<function_calls>";
pub const FUNCTION_CALLS_CLOSE: &str = "</function_calls>";
pub const INVOKE_TAG: &str = "invoke";
pub const INVOKE_CLOSE: &str = "</invoke>";
pub const PARAMETER_TAG: &str = "parameter";
pub const PARAMETER_CLOSE: &str = "</parameter>";

/// A complete piece of markup recognized by [`InvocationScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    OpenBlock,
    /// Also emitted when a new invoke opens before the previous one closed;
    /// the unterminated one is abandoned.
    OpenInvoke { name: String, offset: usize },
    OpenParameter { name: String },
    /// A closed parameter with its trimmed inner text
    Parameter { name: String, value: String },
    /// Byte span of the whole `<invoke ...>...</invoke>` element
    CloseInvoke { start: usize, end: usize },
    CloseBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    /// Looking for `<function_calls>`
    Outside,
    /// Inside a block, looking for `<invoke` or `</function_calls>`
    Block,
    /// Inside an invoke, looking for `<parameter` or `</invoke>`
    Invoke { start: usize },
    /// Inside a parameter value; only `</parameter>` ends it
    Parameter {
        invoke_start: usize,
        name: String,
        value_start: usize,
    },
}

/// Outcome of reading an opening tag that carries a `name` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OpenTag {
    /// Tag and its `>` are present; `len` is the byte length of the tag
    Complete {
        name: String,
        len: usize,
        self_closing: bool,
    },
    /// Could still become a valid tag once more text arrives
    Incomplete,
    /// Not the tag we were looking for
    Invalid,
}

fn name_attr_regex() -> &'static Regex {
    static NAME_ATTR: OnceLock<Regex> = OnceLock::new();
    NAME_ATTR.get_or_init(|| {
        Regex::new(r#"(?:^|\s)name\s*=\s*(?:"([^"<>]*)"|'([^'<>]*)')"#)
            .expect("name attribute pattern is valid")
    })
}

/// Tool names in the current grammar: letters, digits, hyphen, underscore.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Read `<tag name="...">` at the start of `tail`.
pub(crate) fn parse_open_tag(tail: &str, tag: &str) -> OpenTag {
    let Some(after) = tail
        .strip_prefix('<')
        .and_then(|rest| rest.strip_prefix(tag))
    else {
        return OpenTag::Invalid;
    };
    match after.chars().next() {
        None => return OpenTag::Incomplete,
        Some(c) if c.is_whitespace() => {}
        Some(_) => return OpenTag::Invalid,
    }
    let Some(gt) = after.find('>') else {
        return OpenTag::Incomplete;
    };
    let attrs = &after[..gt];
    let name = name_attr_regex().captures(attrs).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
    });
    match name {
        Some(name) if !name.is_empty() => OpenTag::Complete {
            name,
            len: 1 + tag.len() + gt + 1,
            self_closing: attrs.trim_end().ends_with('/'),
        },
        _ => OpenTag::Invalid,
    }
}

/// Offset of the first complete `<invoke name="...">` with a valid tool name.
pub(crate) fn find_bare_invoke(buffer: &str) -> Option<usize> {
    buffer.match_indices('<').map(|(at, _)| at).find(|&at| {
        matches!(
            parse_open_tag(&buffer[at..], INVOKE_TAG),
            OpenTag::Complete { ref name, .. } if is_valid_tool_name(name)
        )
    })
}

/// True when `tail` is a strict prefix of one of `markers`, i.e. the marker may
/// still be completed by the next chunk.
fn is_partial_marker(tail: &str, markers: &[&str]) -> bool {
    markers
        .iter()
        .any(|m| tail.len() < m.len() && m.starts_with(tail))
}

/// Largest char boundary of `text` that is `<= index`.
fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Offset to resume a literal search from, keeping a possibly truncated
/// `marker` at the end of `buffer` in view.
fn resume_offset(buffer: &str, pos: usize, marker: &str) -> usize {
    let keep = buffer.len().saturating_sub(marker.len() - 1);
    floor_boundary(buffer, keep).max(pos)
}

/// Strip a trailing partial `marker` (e.g. `</param`) from streamed text.
pub(crate) fn strip_partial_suffix<'a>(text: &'a str, marker: &str) -> &'a str {
    for k in (1..marker.len()).rev() {
        if text.ends_with(&marker[..k]) {
            return &text[..text.len() - k];
        }
    }
    text
}

/// Resumable tokenizer over a cumulative buffer.
#[derive(Debug, Clone)]
pub struct InvocationScanner {
    pos: usize,
    state: ScanState,
}

impl Default for InvocationScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationScanner {
    pub fn new() -> Self {
        Self {
            pos: 0,
            state: ScanState::Outside,
        }
    }

    /// Scanner for a buffer written in the `<function_calls>` grammar, or
    /// `None` when the buffer has no marker of it yet. An `<invoke>` that
    /// appears before any `<function_calls>` starts an implicit block.
    pub fn for_buffer(buffer: &str) -> Option<Self> {
        let block = buffer.find(FUNCTION_CALLS_OPEN);
        let bare = find_bare_invoke(&buffer[..block.unwrap_or(buffer.len())]);
        match (block, bare) {
            (_, Some(at)) => Some(Self {
                pos: at,
                state: ScanState::Block,
            }),
            (Some(_), None) => Some(Self::new()),
            (None, None) => None,
        }
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.state = ScanState::Outside;
    }

    /// Byte offset the next scan resumes from.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Start offset of the invoke currently being read, if any.
    pub fn open_invoke_start(&self) -> Option<usize> {
        match &self.state {
            ScanState::Invoke { start } => Some(*start),
            ScanState::Parameter { invoke_start, .. } => Some(*invoke_start),
            _ => None,
        }
    }

    /// Name and partial text of the parameter currently being streamed.
    /// `buffer` must be the buffer passed to the last [`scan`](Self::scan).
    pub fn partial_parameter<'a>(&'a self, buffer: &'a str) -> Option<(&'a str, &'a str)> {
        match &self.state {
            ScanState::Parameter {
                name, value_start, ..
            } if *value_start <= buffer.len() => {
                let text = strip_partial_suffix(&buffer[*value_start..], PARAMETER_CLOSE);
                Some((name.as_str(), text.trim()))
            }
            _ => None,
        }
    }

    /// Scan `buffer`, which must extend the buffer of the previous call.
    /// A shorter buffer restarts the scan from the beginning.
    pub fn scan(&mut self, buffer: &str) -> Vec<Token> {
        if buffer.len() < self.pos || !buffer.is_char_boundary(self.pos) {
            self.reset();
        }
        let mut tokens = Vec::new();
        loop {
            match self.state.clone() {
                ScanState::Outside => {
                    let rest = &buffer[self.pos..];
                    match rest.find(FUNCTION_CALLS_OPEN) {
                        Some(i) => {
                            let offset = self.pos + i;
                            tokens.push(Token::OpenBlock);
                            self.pos = offset + FUNCTION_CALLS_OPEN.len();
                            self.state = ScanState::Block;
                        }
                        None => {
                            self.pos = resume_offset(buffer, self.pos, FUNCTION_CALLS_OPEN);
                            break;
                        }
                    }
                }
                ScanState::Block => {
                    let Some(i) = buffer[self.pos..].find('<') else {
                        self.pos = buffer.len();
                        break;
                    };
                    let at = self.pos + i;
                    let tail = &buffer[at..];
                    if tail.starts_with(FUNCTION_CALLS_CLOSE) {
                        tokens.push(Token::CloseBlock);
                        self.pos = at + FUNCTION_CALLS_CLOSE.len();
                        self.state = ScanState::Outside;
                        continue;
                    }
                    match parse_open_tag(tail, INVOKE_TAG) {
                        OpenTag::Complete {
                            name,
                            len,
                            self_closing,
                        } if is_valid_tool_name(&name) => {
                            tokens.push(Token::OpenInvoke { name, offset: at });
                            self.pos = at + len;
                            if self_closing {
                                tokens.push(Token::CloseInvoke {
                                    start: at,
                                    end: at + len,
                                });
                            } else {
                                self.state = ScanState::Invoke { start: at };
                            }
                        }
                        OpenTag::Incomplete => {
                            self.pos = at;
                            break;
                        }
                        _ => {
                            if is_partial_marker(tail, &[FUNCTION_CALLS_CLOSE, "<invoke"]) {
                                self.pos = at;
                                break;
                            }
                            self.pos = at + 1;
                        }
                    }
                }
                ScanState::Invoke { start } => {
                    let Some(i) = buffer[self.pos..].find('<') else {
                        self.pos = buffer.len();
                        break;
                    };
                    let at = self.pos + i;
                    let tail = &buffer[at..];
                    if tail.starts_with(INVOKE_CLOSE) {
                        let end = at + INVOKE_CLOSE.len();
                        tokens.push(Token::CloseInvoke { start, end });
                        self.pos = end;
                        self.state = ScanState::Block;
                        continue;
                    }
                    if tail.starts_with(FUNCTION_CALLS_CLOSE) {
                        // Block ended around an unterminated invoke; it is never emitted.
                        tokens.push(Token::CloseBlock);
                        self.pos = at + FUNCTION_CALLS_CLOSE.len();
                        self.state = ScanState::Outside;
                        continue;
                    }
                    match parse_open_tag(tail, PARAMETER_TAG) {
                        OpenTag::Complete {
                            name,
                            len,
                            self_closing: true,
                        } => {
                            tokens.push(Token::OpenParameter { name: name.clone() });
                            tokens.push(Token::Parameter {
                                name,
                                value: String::new(),
                            });
                            self.pos = at + len;
                            continue;
                        }
                        OpenTag::Complete { name, len, .. } => {
                            tokens.push(Token::OpenParameter { name: name.clone() });
                            self.pos = at + len;
                            self.state = ScanState::Parameter {
                                invoke_start: start,
                                name,
                                value_start: at + len,
                            };
                            continue;
                        }
                        OpenTag::Incomplete => {
                            self.pos = at;
                            break;
                        }
                        OpenTag::Invalid => {}
                    }
                    match parse_open_tag(tail, INVOKE_TAG) {
                        OpenTag::Complete { name, .. } if is_valid_tool_name(&name) => {
                            // A new invoke abandons the unterminated one; rescan it in block state.
                            self.pos = at;
                            self.state = ScanState::Block;
                        }
                        OpenTag::Incomplete => {
                            self.pos = at;
                            break;
                        }
                        _ => {
                            if is_partial_marker(
                                tail,
                                &[INVOKE_CLOSE, FUNCTION_CALLS_CLOSE, "<parameter", "<invoke"],
                            ) {
                                self.pos = at;
                                break;
                            }
                            self.pos = at + 1;
                        }
                    }
                }
                ScanState::Parameter {
                    invoke_start,
                    name,
                    value_start,
                } => match buffer[self.pos..].find(PARAMETER_CLOSE) {
                    Some(i) => {
                        let close = self.pos + i;
                        let value = buffer[value_start..close].trim().to_string();
                        tokens.push(Token::Parameter { name, value });
                        self.pos = close + PARAMETER_CLOSE.len();
                        self.state = ScanState::Invoke {
                            start: invoke_start,
                        };
                    }
                    None => {
                        self.pos = resume_offset(buffer, self.pos, PARAMETER_CLOSE);
                        break;
                    }
                },
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = r#"<function_calls><invoke name="web_search"><parameter name="query">cats</parameter></invoke></function_calls>"#;

    #[test]
    fn test_scan_complete_block() {
        let mut scanner = InvocationScanner::new();
        let tokens = scanner.scan(SCENARIO_A);
        assert_eq!(
            tokens,
            vec![
                Token::OpenBlock,
                Token::OpenInvoke {
                    name: "web_search".to_string(),
                    offset: 16
                },
                Token::OpenParameter {
                    name: "query".to_string()
                },
                Token::Parameter {
                    name: "query".to_string(),
                    value: "cats".to_string()
                },
                Token::CloseInvoke {
                    start: 16,
                    end: SCENARIO_A.len() - FUNCTION_CALLS_CLOSE.len()
                },
                Token::CloseBlock,
            ]
        );
        assert_eq!(scanner.offset(), SCENARIO_A.len());
    }

    #[test]
    fn test_scan_resumes_byte_by_byte() {
        let mut resumed = InvocationScanner::new();
        let mut tokens = Vec::new();
        for end in 0..=SCENARIO_A.len() {
            tokens.extend(resumed.scan(&SCENARIO_A[..end]));
        }
        let mut whole = InvocationScanner::new();
        assert_eq!(tokens, whole.scan(SCENARIO_A));
    }

    #[test]
    fn test_partial_parameter_hides_truncated_close() {
        let mut scanner = InvocationScanner::new();
        let buffer = r#"<function_calls><invoke name="x"><parameter name="cmd"> ls -la</param"#;
        scanner.scan(buffer);
        assert_eq!(scanner.partial_parameter(buffer), Some(("cmd", "ls -la")));
        assert_eq!(scanner.open_invoke_start(), Some(16));
    }

    #[test]
    fn test_parameter_value_may_contain_markup() {
        let mut scanner = InvocationScanner::new();
        let buffer = r#"<function_calls><invoke name="create_file"><parameter name="body"><div></invoke></div></parameter></invoke></function_calls>"#;
        let tokens = scanner.scan(buffer);
        assert!(tokens.contains(&Token::Parameter {
            name: "body".to_string(),
            value: "<div></invoke></div>".to_string()
        }));
        assert_eq!(
            tokens
                .iter()
                .filter(|t| matches!(t, Token::CloseInvoke { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_open_tag_variants() {
        assert_eq!(
            parse_open_tag(r#"<invoke name="a_b-1">"#, INVOKE_TAG),
            OpenTag::Complete {
                name: "a_b-1".to_string(),
                len: 21,
                self_closing: false
            }
        );
        assert_eq!(
            parse_open_tag(r#"<invoke name='x' id="2">"#, INVOKE_TAG),
            OpenTag::Complete {
                name: "x".to_string(),
                len: 24,
                self_closing: false
            }
        );
        assert_eq!(
            parse_open_tag(r#"<invoke name="done" />"#, INVOKE_TAG),
            OpenTag::Complete {
                name: "done".to_string(),
                len: 22,
                self_closing: true
            }
        );
        assert_eq!(parse_open_tag("<invoke", INVOKE_TAG), OpenTag::Incomplete);
        assert_eq!(
            parse_open_tag(r#"<invoke name="web"#, INVOKE_TAG),
            OpenTag::Incomplete
        );
        assert_eq!(parse_open_tag("<invoked>", INVOKE_TAG), OpenTag::Invalid);
        assert_eq!(parse_open_tag("<invoke >", INVOKE_TAG), OpenTag::Invalid);
    }

    #[test]
    fn test_unterminated_invoke_is_dropped_at_block_end() {
        let mut scanner = InvocationScanner::new();
        let tokens = scanner.scan(r#"<function_calls><invoke name="x"></function_calls>"#);
        assert!(!tokens
            .iter()
            .any(|t| matches!(t, Token::CloseInvoke { .. })));
        assert_eq!(tokens.last(), Some(&Token::CloseBlock));
    }

    #[test]
    fn test_shorter_buffer_restarts() {
        let mut scanner = InvocationScanner::new();
        scanner.scan(SCENARIO_A);
        let tokens = scanner.scan("<function_calls>");
        assert_eq!(tokens, vec![Token::OpenBlock]);
    }

    #[test]
    fn test_self_closing_invoke_closes_immediately() {
        let buffer = r#"<function_calls><invoke name="complete"/><invoke name="ask"><parameter name="text">hi</parameter><parameter name="files"/></invoke></function_calls>"#;
        let tokens = InvocationScanner::new().scan(buffer);
        let ask = buffer.find(r#"<invoke name="ask">"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::OpenBlock,
                Token::OpenInvoke {
                    name: "complete".to_string(),
                    offset: 16
                },
                Token::CloseInvoke { start: 16, end: ask },
                Token::OpenInvoke {
                    name: "ask".to_string(),
                    offset: ask
                },
                Token::OpenParameter {
                    name: "text".to_string()
                },
                Token::Parameter {
                    name: "text".to_string(),
                    value: "hi".to_string()
                },
                Token::OpenParameter {
                    name: "files".to_string()
                },
                Token::Parameter {
                    name: "files".to_string(),
                    value: String::new()
                },
                Token::CloseInvoke {
                    start: ask,
                    end: buffer.len() - FUNCTION_CALLS_CLOSE.len()
                },
                Token::CloseBlock,
            ]
        );
    }

    #[test]
    fn test_new_invoke_abandons_unterminated_one() {
        let buffer = r#"<function_calls><invoke name="x"><parameter name="a">1</parameter><invoke name="y"><parameter name="b">2</parameter></invoke></function_calls>"#;
        let mut resumed = InvocationScanner::new();
        let mut streamed = Vec::new();
        for end in 0..=buffer.len() {
            streamed.extend(resumed.scan(&buffer[..end]));
        }
        let tokens = InvocationScanner::new().scan(buffer);
        assert_eq!(streamed, tokens);
        let y = buffer.find(r#"<invoke name="y">"#).unwrap();
        assert!(tokens.contains(&Token::OpenInvoke {
            name: "y".to_string(),
            offset: y
        }));
        let closes: Vec<&Token> = tokens
            .iter()
            .filter(|t| matches!(t, Token::CloseInvoke { .. }))
            .collect();
        assert_eq!(
            closes,
            vec![&Token::CloseInvoke {
                start: y,
                end: buffer.len() - FUNCTION_CALLS_CLOSE.len()
            }]
        );
    }

    #[test]
    fn test_for_buffer_picks_grammar() {
        assert!(InvocationScanner::for_buffer("plain text <ask>hi</ask>").is_none());
        assert!(InvocationScanner::for_buffer(r#"<invoke name="web"#).is_none());

        let block = InvocationScanner::for_buffer("Run <function_calls>").unwrap();
        assert_eq!(block.offset(), 0);

        let bare = r#"Sure. <invoke name="web_search"><parameter name="query">cats</parameter></invoke>"#;
        let mut scanner = InvocationScanner::for_buffer(bare).unwrap();
        assert_eq!(scanner.offset(), 6);
        let tokens = scanner.scan(bare);
        assert_eq!(
            tokens[0],
            Token::OpenInvoke {
                name: "web_search".to_string(),
                offset: 6
            }
        );
        assert_eq!(
            tokens.last(),
            Some(&Token::CloseInvoke {
                start: 6,
                end: bare.len()
            })
        );
    }

    #[test]
    fn test_valid_tool_names() {
        assert!(is_valid_tool_name("web_search"));
        assert!(is_valid_tool_name("browser-go-back2"));
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name("a b"));
    }
}
