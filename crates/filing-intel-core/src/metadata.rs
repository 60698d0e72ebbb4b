//! Best-effort metadata extraction from filing text.
//!
//! Never fails: a missing company name becomes [`UNKNOWN_COMPANY`] and a
//! missing filing date becomes the current date.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_COMPANY: &str = "Unknown Company";

static COMPANY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)COMPANY\s+NAME:\s*(.*)").expect("company marker regex"));

static COMPANY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z][a-z]+(?: [A-Z][a-z]+)* (?:Corp|Corporation|Inc|Ltd|LLC)\b\.?")
        .expect("company suffix regex")
});

static DATE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FILING\s+DATE:\s*(\d{1,2}/\d{1,2}/\d{2,4})").expect("date marker regex")
});

static BARE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("bare date regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub company: String,
    pub filing_date: String,
    pub doc_type: String,
}

pub fn extract_metadata(text: &str, doc_type: &str) -> DocumentMetadata {
    extract_metadata_at(text, doc_type, Utc::now())
}

/// Like [`extract_metadata`] with an explicit "now" for the date fallback.
pub fn extract_metadata_at(text: &str, doc_type: &str, now: DateTime<Utc>) -> DocumentMetadata {
    DocumentMetadata {
        company: extract_company(text).unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
        filing_date: extract_filing_date(text)
            .unwrap_or_else(|| now.format("%m/%d/%Y").to_string()),
        doc_type: doc_type.to_string(),
    }
}

pub fn extract_company(text: &str) -> Option<String> {
    if let Some(name) = COMPANY_MARKER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
    {
        return Some(name.to_string());
    }
    COMPANY_SUFFIX.find(text).map(|m| m.as_str().to_string())
}

pub fn extract_filing_date(text: &str) -> Option<String> {
    if let Some(date) = DATE_MARKER.captures(text).and_then(|c| c.get(1)) {
        return Some(date.as_str().to_string());
    }
    BARE_DATE.find(text).map(|m| m.as_str().to_string())
}
