//! Error types for page image rendering
//!
//! Every failure surfaced to a caller carries a stable kind tag
//! (see [`PageImageError::kind`]) alongside a human-readable message.

use thiserror::Error;

/// Result type alias for page image operations
pub type Result<T> = std::result::Result<T, PageImageError>;

/// Page image error type
#[derive(Debug, Error)]
pub enum PageImageError {
    /// Identifier could not be resolved to bytes, or the bytes are not a document
    #[error("Failed to open document: {0}")]
    DocumentOpen(String),

    /// Page index outside `[0, page_count)`
    #[error("Page number {index} is invalid, file has {page_count} pages")]
    InvalidPage { index: i64, page_count: usize },

    /// Scale is non-finite, out of range, or produces an empty image
    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    /// Rasterization or encoding failed
    #[error("Render error: {0}")]
    Render(String),

    /// Output file could not be written
    #[error("Failed to write output file: {0}")]
    FileWrite(#[from] std::io::Error),

    /// Handle was used after it was disposed
    #[error("Document {0} has been closed")]
    DocumentClosed(String),
}

impl PageImageError {
    /// Stable tag identifying the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PageImageError::DocumentOpen(_) => "DOCUMENT_OPEN_ERROR",
            PageImageError::InvalidPage { .. } => "INVALID_PAGE",
            PageImageError::InvalidScale(_) => "INVALID_SCALE",
            PageImageError::Render(_) => "RENDER_ERROR",
            PageImageError::FileWrite(_) => "FILE_WRITE_ERROR",
            PageImageError::DocumentClosed(_) => "DOCUMENT_CLOSED",
        }
    }

    /// Whether the error was caused by the request rather than the system
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PageImageError::InvalidPage { .. } | PageImageError::InvalidScale(_)
        )
    }
}

// Failures are handed to every caller waiting on the same open or render
impl Clone for PageImageError {
    fn clone(&self) -> Self {
        match self {
            PageImageError::DocumentOpen(msg) => PageImageError::DocumentOpen(msg.clone()),
            PageImageError::InvalidPage { index, page_count } => PageImageError::InvalidPage {
                index: *index,
                page_count: *page_count,
            },
            PageImageError::InvalidScale(msg) => PageImageError::InvalidScale(msg.clone()),
            PageImageError::Render(msg) => PageImageError::Render(msg.clone()),
            PageImageError::FileWrite(e) => {
                PageImageError::FileWrite(std::io::Error::new(e.kind(), e.to_string()))
            }
            PageImageError::DocumentClosed(id) => PageImageError::DocumentClosed(id.clone()),
        }
    }
}

impl From<mupdf::Error> for PageImageError {
    fn from(err: mupdf::Error) -> Self {
        PageImageError::Render(err.to_string())
    }
}

impl From<image::ImageError> for PageImageError {
    fn from(err: image::ImageError) -> Self {
        PageImageError::Render(format!("PNG encoding failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for PageImageError {
    fn from(err: tokio::task::JoinError) -> Self {
        PageImageError::Render(format!("Task join error: {}", err))
    }
}
