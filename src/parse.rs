//! Format-dependent text extraction for acquired filings.
//!
//! Acquisition supplies bytes plus a declared [`DocFormat`]; this module
//! returns plain UTF-8 text. PDF has two independent strategies:
//! `pdf-extract` first, then `lopdf` page-by-page extraction when the
//! first one errors, panics or finds no text. Each attempt returns a
//! `Result` and the caller picks the next strategy.

use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use filing_intel_core::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Column width for HTML rendering. Wide enough to keep table rows and
/// headings on one line for the segmenter.
const HTML_WIDTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Pdf,
    Html,
    Text,
    /// Anything acquisition could not classify. Always rejected.
    Binary,
}

impl DocFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DocFormat::Pdf => "pdf",
            DocFormat::Html => "html",
            DocFormat::Text => "text",
            DocFormat::Binary => "binary",
        }
    }

    /// Classify by file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => DocFormat::Pdf,
            "html" | "htm" | "xhtml" => DocFormat::Html,
            "txt" | "text" | "md" => DocFormat::Text,
            _ => DocFormat::Binary,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(DocFormat::from_extension)
            .unwrap_or(DocFormat::Binary)
    }

    /// Classify by `Content-Type` header value. `None` when the header is
    /// too generic to decide (e.g. `application/octet-stream`).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" | "application/x-pdf" => Some(DocFormat::Pdf),
            "text/html" | "application/xhtml+xml" => Some(DocFormat::Html),
            m if m.starts_with("text/") => Some(DocFormat::Text),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocFormat::Pdf),
            "html" | "htm" => Ok(DocFormat::Html),
            "text" | "txt" => Ok(DocFormat::Text),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Read `path` and extract its text.
pub fn parse_file(path: &Path, format: DocFormat) -> Result<String, PipelineError> {
    if format == DocFormat::Binary {
        return Err(PipelineError::UnsupportedFormat(format.to_string()));
    }
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::ParseFailure(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_bytes(&bytes, format)
}

pub fn parse_bytes(bytes: &[u8], format: DocFormat) -> Result<String, PipelineError> {
    match format {
        DocFormat::Pdf => parse_pdf(bytes),
        DocFormat::Html => parse_html(bytes),
        DocFormat::Text => parse_text(bytes),
        DocFormat::Binary => Err(PipelineError::UnsupportedFormat(format.to_string())),
    }
}

fn parse_pdf(bytes: &[u8]) -> Result<String, PipelineError> {
    let primary = match pdf_extract_text(bytes) {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => "no text found".to_string(),
        Err(e) => e,
    };
    debug!(reason = %primary, "pdf-extract failed, trying lopdf");

    match lopdf_text(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) => Err(PipelineError::ParseFailure(format!(
            "no text in PDF (pdf-extract: {})",
            primary
        ))),
        Err(secondary) => {
            warn!(primary = %primary, secondary = %secondary, "all PDF strategies failed");
            Err(PipelineError::ParseFailure(format!(
                "pdf-extract: {}; lopdf: {}",
                primary, secondary
            )))
        }
    }
}

fn pdf_extract_text(bytes: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("pdf-extract panicked".to_string()),
    }
}

fn lopdf_text(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err("document has no pages".to_string());
    }
    doc.extract_text(&pages).map_err(|e| e.to_string())
}

fn parse_html(bytes: &[u8]) -> Result<String, PipelineError> {
    html2text::config::plain()
        .string_from_read(Cursor::new(bytes), HTML_WIDTH)
        .map_err(|e| PipelineError::ParseFailure(format!("html: {}", e)))
}

fn parse_text(bytes: &[u8]) -> Result<String, PipelineError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| PipelineError::ParseFailure(format!("text is not valid UTF-8: {}", e)))
}
