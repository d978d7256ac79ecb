//! Document source resolution
//!
//! Turns a document identifier into the bytes (or local file) backing it.
//! Supported identifiers:
//!
//! - `data:<mime>;base64,<payload>` embedded payloads
//! - `http://` and `https://` remote documents
//! - `file://` URIs
//! - absolute local paths
//!
//! Anything else (including `content://` provider references, which only
//! exist inside an Android host) fails with `DocumentOpen`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{PageImageError, Result};

/// Source data for a document
#[derive(Clone)]
pub enum DocumentSource {
    /// Document held in memory (data payloads, remote downloads)
    Bytes(Arc<Vec<u8>>),
    /// Document read from a local file
    Path(PathBuf),
}

impl DocumentSource {
    /// Create source from bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(data))
    }

    /// Create source from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    /// Read the full byte content of the source
    pub fn read_bytes(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            DocumentSource::Bytes(data) => Ok(Arc::clone(data)),
            DocumentSource::Path(path) => std::fs::read(path).map(Arc::new).map_err(|e| {
                PageImageError::DocumentOpen(format!("Unable to read {}: {}", path.display(), e))
            }),
        }
    }
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSource::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            DocumentSource::Path(path) => write!(f, "Path({})", path.display()),
        }
    }
}

/// Resolves identifiers to document sources
#[derive(Clone)]
pub struct SourceResolver {
    http: reqwest::Client,
}

impl SourceResolver {
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| PageImageError::DocumentOpen(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { http })
    }

    /// Resolve an identifier to its backing bytes or local file
    pub async fn resolve(&self, identifier: &str) -> Result<DocumentSource> {
        if identifier.starts_with("data:") {
            return decode_data_uri(identifier).map(DocumentSource::from_bytes);
        }

        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            return self.fetch(identifier).await.map(DocumentSource::from_bytes);
        }

        if let Some(rest) = identifier.strip_prefix("file://") {
            let decoded = urlencoding::decode(rest).map_err(|e| {
                PageImageError::DocumentOpen(format!("Invalid file URI {}: {}", identifier, e))
            })?;
            return local_file(Path::new(decoded.as_ref())).await;
        }

        if identifier.starts_with('/') {
            return local_file(Path::new(identifier)).await;
        }

        Err(PageImageError::DocumentOpen(format!(
            "Unsupported document identifier: {}",
            identifier
        )))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Fetching remote document {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PageImageError::DocumentOpen(format!("Failed to fetch {}: {}", url, e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PageImageError::DocumentOpen(format!("Failed to read {}: {}", url, e)))?;

        Ok(body.to_vec())
    }
}

async fn local_file(path: &Path) -> Result<DocumentSource> {
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        PageImageError::DocumentOpen(format!("File Not Found: {}", path.display()))
    })?;

    if !metadata.is_file() {
        return Err(PageImageError::DocumentOpen(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    Ok(DocumentSource::from_path(path))
}

/// Decode the payload of a `data:` URI
fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| PageImageError::DocumentOpen("Header not found in data URI".to_string()))?;

    if header.ends_with(";base64") {
        // Line breaks are common in pasted payloads
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD.decode(compact).map_err(|e| {
            PageImageError::DocumentOpen(format!("Failed to decode base64 payload: {}", e))
        })
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// Human-meaningful name for the document behind an identifier
///
/// Used as the prefix of rendered file names; never used for identity.
pub fn source_name(identifier: &str) -> String {
    if identifier.starts_with("data:") {
        return "document".to_string();
    }

    let without_query = identifier
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or(identifier);
    let last_segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(last_segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last_segment.to_string());

    let stem = Path::new(&decoded)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if stem.is_empty() {
        "document".to_string()
    } else {
        stem.to_string()
    }
}
