//! Whitespace normalization.
//!
//! Two profiles exist and they are not interchangeable:
//!
//! - [`NormalizeProfile::Clean`] collapses every whitespace run, newlines
//!   included, to a single space. Used for ad-hoc text and prompt context.
//! - [`NormalizeProfile::Lines`] keeps line structure: blank-line runs
//!   collapse to a single newline, other whitespace runs collapse to a
//!   single space and each line is trimmed. The segmenter needs this one.
//!
//! Both are idempotent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeProfile {
    Clean,
    Lines,
}

pub fn normalize(text: &str, profile: NormalizeProfile) -> String {
    match profile {
        NormalizeProfile::Clean => clean(text),
        NormalizeProfile::Lines => normalize_lines(text),
    }
}

/// Collapse all whitespace to single spaces and trim the ends.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize line endings, collapse intra-line whitespace and drop empty
/// lines.
pub fn normalize_lines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(clean)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
