// src/utils/config.rs
use crate::core::record::ArgumentPrecedence;
use crate::tools::vocabulary::{TagSpec, TagVocabulary};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_decode_depth() -> usize {
    4
}

/// Pipeline settings, loadable from a JSON file. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Replaces the built-in tag table when present
    #[serde(default)]
    pub vocabulary: Option<Vec<TagSpec>>,
    #[serde(default)]
    pub argument_precedence: ArgumentPrecedence,
    /// Record id prefix; a random `call_<hex>` prefix is used when unset
    #[serde(default)]
    pub id_prefix: Option<String>,
    #[serde(default = "default_max_decode_depth")]
    pub max_decode_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vocabulary: None,
            argument_precedence: ArgumentPrecedence::default(),
            id_prefix: None,
            max_decode_depth: default_max_decode_depth(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing pipeline config {}", path.display()))
    }

    pub fn vocabulary(&self) -> TagVocabulary {
        match &self.vocabulary {
            Some(tags) => TagVocabulary::new(tags.clone()),
            None => TagVocabulary::default(),
        }
    }
}
