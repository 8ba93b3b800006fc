// src/tools/naming.rs
//! Tool name formatting.
//!
//! `canonicalize_slug` is one-directional: `web_search` and `web-search` map to
//! the same slug and cannot be told apart afterwards.

use super::vocabulary::TagVocabulary;

/// Canonical internal form of a tool name (underscore -> hyphen).
pub fn canonicalize_slug(name: &str) -> String {
    name.replace('_', "-")
}

/// Human readable label: separators become spaces and each word is capitalized.
/// Other characters are left as they are.
pub fn slug_to_display(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut word_start = true;
    for c in slug.chars() {
        match c {
            '-' | '_' | ' ' => {
                out.push(' ');
                word_start = true;
            }
            c if word_start => {
                out.extend(c.to_uppercase());
                word_start = false;
            }
            c => out.push(c),
        }
    }
    out
}

/// Display label for a tool, preferring the vocabulary override when present.
pub fn display_name(vocabulary: &TagVocabulary, name: &str) -> String {
    let slug = canonicalize_slug(name);
    vocabulary
        .get(&slug)
        .and_then(|spec| spec.display.clone())
        .unwrap_or_else(|| slug_to_display(&slug))
}
