//! Open documents and their rendered pages
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              DocumentRegistry                │
//! │   (one handle per identifier, shared opens)  │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │              DocumentHandle                  │
//! │   engine document + produced files           │
//! │   ┌──────────────┐                           │
//! │   │  PageCache   │  (page, scale) -> PNG     │
//! │   └──────────────┘                           │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//!        RasterRenderer -> OutputFileWriter
//! ```
//!
//! Closing a document through the registry disposes its handle, which
//! deletes every file the handle produced.

mod cache;
mod handle;
mod registry;
mod types;

pub use cache::PageCache;
pub use handle::DocumentHandle;
pub use registry::{DocumentOpener, DocumentRegistry, SourceOpener};
pub use types::{file_uri, PageImage, PdfInfo, RenderKey, RenderResult};
