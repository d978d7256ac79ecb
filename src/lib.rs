//! PDF page image library
//!
//! Renders pages of PDF documents to PNG files on demand. Each open document
//! keeps a cache of what it has rendered, keyed by page and scale, and
//! closing the document deletes every file it produced.
//!
//! # Modules
//!
//! - `service`: the public surface (open, render, render all, close)
//! - `document`: registry, per-document handles and render caches
//! - `render`: rasterization and PNG output
//! - `engine`: the document engine seam, backed by MuPDF
//! - `source`: identifier resolution (paths, `file://`, `data:`, HTTP)
//! - `routes`: HTTP bridge used by the server binary

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod render;
pub mod routes;
pub mod service;
pub mod source;
pub mod state;

pub use config::Config;
pub use document::{PageImage, PdfInfo};
pub use error::{PageImageError, Result};
pub use service::PageImageService;
pub use state::AppState;
