// src/tools/vocabulary.rs
//! Known tool tags and their streaming-display metadata.

use serde::{Deserialize, Serialize};

/// One recognized tool tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    /// Canonical (hyphenated) tag name
    pub name: String,
    /// Hide the raw markup from display while the call is streaming
    #[serde(default)]
    pub hide_while_streaming: bool,
    /// Label override for UI feedback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Legacy grammar: parameter name that receives an unstructured tag body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_parameter: Option<String>,
}

impl TagSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: super::naming::canonicalize_slug(&name.into()),
            hide_while_streaming: false,
            display: None,
            body_parameter: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hide_while_streaming = true;
        self
    }

    pub fn display(mut self, label: impl Into<String>) -> Self {
        self.display = Some(label.into());
        self
    }

    pub fn body_parameter(mut self, name: impl Into<String>) -> Self {
        self.body_parameter = Some(name.into());
        self
    }
}

/// Ordered, closed set of tool tags. Supplied to the detector and the legacy
/// parser at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVocabulary {
    tags: Vec<TagSpec>,
}

// (name, hidden while streaming, legacy body parameter)
const BUILTIN_TAGS: &[(&str, bool, Option<&str>)] = &[
    ("execute-command", true, Some("command")),
    ("check-command-output", true, None),
    ("terminate-command", true, None),
    ("create-file", true, Some("file_contents")),
    ("delete-file", true, None),
    ("full-file-rewrite", true, Some("file_contents")),
    ("str-replace", true, None),
    ("edit-file", true, Some("code_edit")),
    ("create-tasks", true, None),
    ("browser-navigate-to", true, Some("url")),
    ("browser-go-back", true, None),
    ("browser-click-element", true, Some("index")),
    ("browser-input-text", true, None),
    ("browser-send-keys", true, Some("keys")),
    ("browser-scroll-down", true, None),
    ("browser-scroll-up", true, None),
    ("browser-scroll-to-text", true, Some("text")),
    ("browser-switch-tab", true, None),
    ("browser-close-tab", true, None),
    ("browser-wait", true, None),
    ("web-search", true, Some("query")),
    ("crawl-webpage", true, Some("url")),
    ("scrape-webpage", true, Some("urls")),
    ("expose-port", true, Some("port")),
    ("deploy", true, None),
    ("call-data-provider", true, None),
    ("get-data-provider-endpoints", true, None),
    ("see-image", false, Some("file_path")),
    ("ask", false, Some("text")),
    ("complete", false, None),
];

impl Default for TagVocabulary {
    fn default() -> Self {
        let tags = BUILTIN_TAGS
            .iter()
            .map(|(name, hidden, body)| {
                let mut spec = TagSpec::new(*name);
                spec.hide_while_streaming = *hidden;
                spec.body_parameter = body.map(str::to_string);
                if *name == "see-image" {
                    spec = spec.display("View Image");
                }
                spec
            })
            .collect();
        Self { tags }
    }
}

impl TagVocabulary {
    /// Build from an explicit table. Later duplicates of a name are dropped.
    pub fn new(tags: Vec<TagSpec>) -> Self {
        let mut unique: Vec<TagSpec> = Vec::with_capacity(tags.len());
        for mut tag in tags {
            tag.name = super::naming::canonicalize_slug(&tag.name);
            if !unique.iter().any(|t| t.name == tag.name) {
                unique.push(tag);
            }
        }
        Self { tags: unique }
    }

    pub fn get(&self, name: &str) -> Option<&TagSpec> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.hide_while_streaming)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagSpec> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
