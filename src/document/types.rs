//! Document and render result types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Scale quantization step (thousandths)
const SCALE_QUANTUM: f64 = 1000.0;

/// Cache key for a rendered page
///
/// Scale is stored in thousandths so that numerically equivalent scales
/// share one entry and the key stays hashable.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct RenderKey {
    pub page: usize,
    pub scale_millis: u32,
}

impl RenderKey {
    pub fn new(page: usize, scale: f64) -> Self {
        Self {
            page,
            scale_millis: (scale * SCALE_QUANTUM).round().clamp(0.0, u32::MAX as f64) as u32,
        }
    }

    /// Scale represented by this key
    pub fn scale(&self) -> f64 {
        self.scale_millis as f64 / SCALE_QUANTUM
    }
}

/// A rendered page on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl RenderResult {
    /// `file://` URI of the rendered file
    pub fn uri(&self) -> String {
        file_uri(&self.path)
    }
}

/// Basic information about an opened document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfInfo {
    pub uri: String,
    pub page_count: usize,
}

/// A rendered page as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

impl From<&RenderResult> for PageImage {
    fn from(result: &RenderResult) -> Self {
        Self {
            uri: result.uri(),
            width: result.width,
            height: result.height,
        }
    }
}

/// Build a `file://` URI for a local path
pub fn file_uri(path: &Path) -> String {
    let encoded: Vec<String> = path
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("file://{}", encoded.join("/"))
}
