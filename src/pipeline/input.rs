//! Input resolution: a user-supplied path or URL becomes a [`Document`].
//!
//! The document's bytes are held in memory; the rasterizer spools them to a
//! scoped temp file itself when pdfium needs a path.

use crate::document::Document;
use crate::error::TessflowError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a fresh document.
///
/// URLs are downloaded with a `timeout_secs` bound; local paths are read
/// after checking existence and read permission.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Document, TessflowError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

async fn resolve_local(path: &Path) -> Result<Document, TessflowError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => TessflowError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => TessflowError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => TessflowError::InvalidInput {
            input: format!("{}: {e}", path.display()),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TessflowError::InvalidInput {
            input: path.display().to_string(),
        })?;

    debug!("Read local input: {} ({} bytes)", path.display(), bytes.len());
    let mut doc = Document::new(filename, bytes);
    doc.put_attribute("path", parent_dir(path));
    Ok(doc)
}

fn parent_dir(path: &Path) -> String {
    path.parent()
        .map(PathBuf::from)
        .unwrap_or_default()
        .display()
        .to_string()
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, TessflowError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TessflowError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            TessflowError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TessflowError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(TessflowError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(map_send_err)?;

    info!("Downloaded {} ({} bytes)", filename, bytes.len());
    let mut doc = Document::new(filename, bytes.to_vec());
    doc.put_attribute("source.url", url);
    Ok(doc)
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.bin".to_string()
}
