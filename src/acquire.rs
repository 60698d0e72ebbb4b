//! Source acquisition: HTTP download or local file, plus directory scans.
//!
//! Remote sources are streamed into a [`NamedTempFile`] under the
//! configured temp directory. The file lives as long as the
//! [`AcquiredDocument`] and is removed when it drops, whether or not
//! parsing succeeded.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use filing_intel_core::error::PipelineError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::AcquisitionConfig;
use crate::parse::DocFormat;

#[derive(Debug)]
enum Handle {
    Local(PathBuf),
    Temp(NamedTempFile),
}

/// Bytes on disk ready for parsing.
#[derive(Debug)]
pub struct AcquiredDocument {
    /// The URL or path as given by the caller.
    pub source: String,
    pub format: DocFormat,
    /// Hex SHA-256 of the content.
    pub content_hash: String,
    pub size: u64,
    handle: Handle,
}

impl AcquiredDocument {
    pub fn path(&self) -> &Path {
        match &self.handle {
            Handle::Local(p) => p,
            Handle::Temp(f) => f.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.handle, Handle::Temp(_))
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch `source` (URL or local path). Fails with
/// [`PipelineError::AcquisitionFailure`] on network errors, HTTP error
/// statuses, missing files or content larger than `max_bytes`.
pub async fn acquire(
    source: &str,
    settings: &AcquisitionConfig,
) -> Result<AcquiredDocument, PipelineError> {
    if is_remote(source) {
        download(source, settings).await
    } else {
        acquire_local(source, settings).await
    }
}

async fn acquire_local(
    source: &str,
    settings: &AcquisitionConfig,
) -> Result<AcquiredDocument, PipelineError> {
    let path = PathBuf::from(source.strip_prefix("file://").unwrap_or(source));
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| PipelineError::acquisition(source, e))?;
    if !meta.is_file() {
        return Err(PipelineError::acquisition(source, "not a regular file"));
    }
    if meta.len() > settings.max_bytes {
        return Err(PipelineError::acquisition(
            source,
            format!("file is {} bytes, limit is {}", meta.len(), settings.max_bytes),
        ));
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| PipelineError::acquisition(source, e))?;

    Ok(AcquiredDocument {
        source: source.to_string(),
        format: DocFormat::from_path(&path),
        content_hash: sha256_hex(&bytes),
        size: bytes.len() as u64,
        handle: Handle::Local(path),
    })
}

async fn download(
    url: &str,
    settings: &AcquisitionConfig,
) -> Result<AcquiredDocument, PipelineError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| PipelineError::acquisition(url, e))?;

    let mut resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| PipelineError::acquisition(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::acquisition(url, format!("HTTP {}", status)));
    }
    if let Some(len) = resp.content_length() {
        if len > settings.max_bytes {
            return Err(PipelineError::acquisition(
                url,
                format!("content-length {} exceeds limit {}", len, settings.max_bytes),
            ));
        }
    }

    let format = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(DocFormat::from_content_type)
        .unwrap_or_else(|| format_from_url(url));

    let suffix = format!(".{}", format.as_str());
    let mut builder = tempfile::Builder::new();
    builder.prefix("fin-").suffix(&suffix);
    let tmp = match &settings.temp_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::acquisition(url, e))?;
            builder.tempfile_in(dir)
        }
        None => builder.tempfile(),
    };
    let mut tmp = tmp.map_err(|e| PipelineError::acquisition(url, e))?;

    let mut hasher = Sha256::new();
    let mut size: u64 = 0;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| PipelineError::acquisition(url, e))?
    {
        size += chunk.len() as u64;
        if size > settings.max_bytes {
            return Err(PipelineError::acquisition(
                url,
                format!("download exceeds limit of {} bytes", settings.max_bytes),
            ));
        }
        hasher.update(&chunk);
        tmp.write_all(&chunk)
            .map_err(|e| PipelineError::acquisition(url, e))?;
    }
    tmp.flush().map_err(|e| PipelineError::acquisition(url, e))?;
    debug!(url, size, format = %format, path = %tmp.path().display(), "downloaded");

    Ok(AcquiredDocument {
        source: url.to_string(),
        format,
        content_hash: format!("{:x}", hasher.finalize()),
        size,
        handle: Handle::Temp(tmp),
    })
}

/// Extension of the URL path, ignoring query string and fragment.
fn format_from_url(url: &str) -> DocFormat {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((_, ext)) => DocFormat::from_extension(ext),
        None => DocFormat::Binary,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// List files under `root` matching the include globs and none of the
/// exclude globs, sorted by path. Globs match the path relative to `root`.
pub fn scan_directory(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Batch directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
