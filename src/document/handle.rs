//! Shared per-document state
//!
//! A [`DocumentHandle`] owns one opened document, the render cache for it,
//! and every file its renders ever wrote. Renders hold a read lock on the
//! document for their whole duration (including the blocking worker), and
//! [`DocumentHandle::dispose`] takes the write lock, so disposal waits for
//! in-flight renders before deleting files and releasing the document.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::RwLock;

use super::cache::PageCache;
use super::types::{RenderKey, RenderResult};
use crate::config::ScaleRange;
use crate::engine::EngineDocument;
use crate::error::{PageImageError, Result};
use crate::render::{OutputFileWriter, RasterRenderer};
use crate::source::source_name;

/// One opened document and everything rendered from it
pub struct DocumentHandle {
    identifier: String,
    /// Prefix for output file names
    source_name: String,
    page_count: usize,
    /// `None` once disposed
    document: Arc<RwLock<Option<Arc<dyn EngineDocument>>>>,
    cache: PageCache,
    /// Every file written for this document
    files: Arc<Mutex<Vec<PathBuf>>>,
    renderer: RasterRenderer,
    writer: OutputFileWriter,
    scale_range: ScaleRange,
}

impl DocumentHandle {
    pub fn new(
        identifier: impl Into<String>,
        document: Arc<dyn EngineDocument>,
        writer: OutputFileWriter,
        scale_range: ScaleRange,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            source_name: source_name(&identifier),
            page_count: document.page_count(),
            identifier,
            document: Arc::new(RwLock::new(Some(document))),
            cache: PageCache::new(),
            files: Arc::new(Mutex::new(Vec::new())),
            renderer: RasterRenderer::new(),
            writer,
            scale_range,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Render a page, reusing the cached result for the same page and scale
    pub async fn render_page(&self, index: usize, scale: f64) -> Result<RenderResult> {
        if index >= self.page_count {
            return Err(PageImageError::InvalidPage {
                index: index as i64,
                page_count: self.page_count,
            });
        }

        if !self.scale_range.contains(scale) {
            return Err(PageImageError::InvalidScale(format!(
                "scale {} is outside [{}, {}]",
                scale, self.scale_range.min, self.scale_range.max
            )));
        }

        // Held until the render finishes, even if this future is dropped
        let guard = Arc::clone(&self.document).read_owned().await;
        if guard.is_none() {
            return Err(PageImageError::DocumentClosed(self.identifier.clone()));
        }

        let key = RenderKey::new(index, scale);
        self.cache
            .get_or_create(key, move || {
                let renderer = self.renderer;
                let writer = self.writer.clone();
                let source_name = self.source_name.clone();
                let files = Arc::clone(&self.files);
                let scale = key.scale();

                async move {
                    tokio::task::spawn_blocking(move || -> Result<RenderResult> {
                        let document = guard.as_ref().ok_or_else(|| {
                            PageImageError::Render("document released during render".to_string())
                        })?;

                        let image = renderer.render(&**document, index, scale)?;
                        let path = writer.write_png(&source_name, index, &image)?;
                        files.lock().push(path.clone());

                        Ok(RenderResult {
                            path,
                            width: image.width(),
                            height: image.height(),
                        })
                    })
                    .await?
                }
            })
            .await
    }

    /// Delete every produced file and release the document
    ///
    /// Waits for in-flight renders. File deletion is best-effort: failures
    /// are logged and the remaining files are still removed. Calling this
    /// more than once is harmless.
    pub async fn dispose(&self) {
        // Productions that were never polled still hold read guards
        self.cache.clear();

        let mut document = self.document.write().await;
        let Some(released) = document.take() else {
            return;
        };

        let files = std::mem::take(&mut *self.files.lock());
        let mut failed = 0;
        for path in &files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Failed to delete {}: {}", path.display(), e);
                }
            }
        }

        self.cache.clear();
        drop(released);

        tracing::info!(
            "Closed document {} ({} files removed, {} failed)",
            self.identifier,
            files.len() - failed,
            failed
        );
    }
}

#[cfg(test)]
impl DocumentHandle {
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files.lock().clone()
    }

    pub async fn is_disposed(&self) -> bool {
        self.document.read().await.is_none()
    }
}
