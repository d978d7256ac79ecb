//! Page image service
//!
//! The boundary the outside world talks to. Takes raw caller input
//! (identifier, page number, optional scale), clamps the scale into the
//! configured range and drives the registry and handles.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};

use crate::config::{Config, RenderConfig, ScaleRange};
use crate::document::{
    DocumentHandle, DocumentOpener, DocumentRegistry, PageImage, PdfInfo, SourceOpener,
};
use crate::engine::MupdfEngine;
use crate::error::{PageImageError, Result};
use crate::render::OutputFileWriter;
use crate::source::SourceResolver;

/// Attempts made when a document is closed underneath a render
const MAX_ATTEMPTS: usize = 3;

/// Renders document pages to PNG files on demand
#[derive(Clone)]
pub struct PageImageService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    registry: DocumentRegistry,
    scale_range: ScaleRange,
    render_concurrency: usize,
}

impl PageImageService {
    pub fn new(config: &RenderConfig, opener: Arc<dyn DocumentOpener>) -> Self {
        let writer = OutputFileWriter::new(&config.cache_dir);
        Self {
            inner: Arc::new(ServiceInner {
                registry: DocumentRegistry::new(opener, writer, config.scale),
                scale_range: config.scale,
                render_concurrency: config.render_concurrency.max(1),
            }),
        }
    }

    /// Service backed by MuPDF and the default source resolver
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver =
            SourceResolver::new(Duration::from_secs(config.source.fetch_timeout_secs))?;
        let opener = SourceOpener::new(resolver, Arc::new(MupdfEngine::new()));
        Ok(Self::new(&config.render, Arc::new(opener)))
    }

    /// Open a document and report its page count
    pub async fn open_pdf(&self, uri: &str) -> Result<PdfInfo> {
        let handle = self.inner.registry.resolve(uri).await?;
        Ok(PdfInfo {
            uri: uri.to_string(),
            page_count: handle.page_count(),
        })
    }

    /// Render one page, opening the document if needed
    pub async fn render_page(&self, uri: &str, page: i64, scale: Option<f64>) -> Result<PageImage> {
        let scale = self.inner.scale_range.clamp(scale);

        let mut attempt = 1;
        loop {
            let handle = self.inner.registry.resolve(uri).await?;
            let index = page_index(&handle, page)?;

            match handle.render_page(index, scale).await {
                Err(PageImageError::DocumentClosed(_)) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!("{} closed during render, reopening", uri);
                    attempt += 1;
                }
                result => return result.map(|rendered| PageImage::from(&rendered)),
            }
        }
    }

    /// Render every page, returned in page order
    ///
    /// At most `render_concurrency` pages render at once. The first failing
    /// page fails the whole call.
    pub async fn render_all_pages(&self, uri: &str, scale: Option<f64>) -> Result<Vec<PageImage>> {
        let scale = self.inner.scale_range.clamp(scale);

        let mut attempt = 1;
        loop {
            let handle = self.inner.registry.resolve(uri).await?;
            let pages = futures::stream::iter(0..handle.page_count())
                .map(|index| handle.render_page(index, scale))
                .buffered(self.inner.render_concurrency)
                .try_collect::<Vec<_>>()
                .await;

            match pages {
                Err(PageImageError::DocumentClosed(_)) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!("{} closed during render, reopening", uri);
                    attempt += 1;
                }
                Err(e) => return Err(e),
                Ok(pages) => {
                    tracing::info!("Rendered {} pages of {} at scale {}", pages.len(), uri, scale);
                    return Ok(pages.iter().map(PageImage::from).collect());
                }
            }
        }
    }

    /// Close a document and delete its rendered files
    ///
    /// Unknown identifiers are ignored.
    pub async fn close_document(&self, uri: &str) {
        if !self.inner.registry.release(uri).await {
            tracing::debug!("Close requested for {} which is not open", uri);
        }
    }

    /// Close every open document
    pub async fn shutdown(&self) {
        self.inner.registry.shutdown().await;
    }

    /// Number of documents currently open
    pub fn open_documents(&self) -> usize {
        self.inner.registry.len()
    }
}

fn page_index(handle: &DocumentHandle, page: i64) -> Result<usize> {
    usize::try_from(page)
        .ok()
        .filter(|index| *index < handle.page_count())
        .ok_or(PageImageError::InvalidPage {
            index: page,
            page_count: handle.page_count(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineDocument, PageGeometry};
    use async_trait::async_trait;
    use image::RgbaImage;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Letter-size pages; page 1 is rotated 90 degrees, page 2 is A5 landscape
    struct Sample {
        renders: Arc<AtomicUsize>,
        failing_page: Option<usize>,
    }

    impl EngineDocument for Sample {
        fn page_count(&self) -> usize {
            3
        }

        fn page_geometry(&self, index: usize) -> Result<PageGeometry> {
            Ok(match index {
                0 => PageGeometry::new(612.0, 792.0, 0),
                1 => PageGeometry::new(612.0, 792.0, 90),
                _ => PageGeometry::new(595.0, 420.0, 180),
            })
        }

        fn rasterize(&self, index: usize, _canvas: &mut RgbaImage) -> Result<()> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            if self.failing_page == Some(index) {
                return Err(PageImageError::Render("unsupported content".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubOpener {
        opens: AtomicUsize,
        renders: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentOpener for StubOpener {
        async fn open(&self, identifier: &str) -> Result<Arc<dyn EngineDocument>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if identifier.ends_with(".txt") {
                return Err(PageImageError::DocumentOpen("not a PDF".into()));
            }
            Ok(Arc::new(Sample {
                renders: Arc::clone(&self.renders),
                failing_page: identifier.contains("damaged").then_some(2),
            }))
        }
    }

    fn service(dir: &TempDir) -> (PageImageService, Arc<StubOpener>) {
        let opener = Arc::new(StubOpener::default());
        let config = RenderConfig {
            cache_dir: dir.path().to_path_buf(),
            scale: ScaleRange::default(),
            render_concurrency: 4,
        };
        (PageImageService::new(&config, opener.clone()), opener)
    }

    fn path_of(image: &PageImage) -> PathBuf {
        let path = image.uri.strip_prefix("file://").unwrap();
        PathBuf::from(urlencoding::decode(path).unwrap().into_owned())
    }

    #[tokio::test]
    async fn test_open_pdf_reports_page_count() {
        let dir = TempDir::new().unwrap();
        let (service, opener) = service(&dir);

        let info = service.open_pdf("/docs/sample.pdf").await.unwrap();
        assert_eq!(info.page_count, 3);
        assert_eq!(info.uri, "/docs/sample.pdf");

        service.open_pdf("/docs/sample.pdf").await.unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(service.open_documents(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let err = service.open_pdf("/docs/notes.txt").await.unwrap_err();
        assert_eq!(err.kind(), "DOCUMENT_OPEN_ERROR");
        assert_eq!(service.open_documents(), 0);
    }

    #[tokio::test]
    async fn test_repeat_render_is_cache_hit() {
        let dir = TempDir::new().unwrap();
        let (service, opener) = service(&dir);

        let first = service.render_page("/docs/sample.pdf", 0, Some(1.5)).await.unwrap();
        let second = service.render_page("/docs/sample.pdf", 0, Some(1.5)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!((first.width, first.height), (918, 1188));
        assert_eq!(opener.renders.load(Ordering::SeqCst), 1);
        assert!(path_of(&first).exists());
    }

    #[tokio::test]
    async fn test_render_all_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let pages = service
            .render_all_pages("/docs/sample.pdf", Some(2.0))
            .await
            .unwrap();

        let sizes: Vec<_> = pages.iter().map(|p| (p.width, p.height)).collect();
        assert_eq!(sizes, vec![(1224, 1584), (1584, 1224), (1190, 840)]);
        for (index, page) in pages.iter().enumerate() {
            let name = path_of(page).file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with(&format!("sample-thumbnail-{}-", index)));
        }
    }

    #[tokio::test]
    async fn test_render_all_pages_fails_on_first_error() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let err = service
            .render_all_pages("/docs/damaged.pdf", Some(1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RENDER_ERROR");
    }

    /// A long document that records how many pages rasterize at once
    struct Tracked {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EngineDocument for Tracked {
        fn page_count(&self) -> usize {
            64
        }

        fn page_geometry(&self, _index: usize) -> Result<PageGeometry> {
            Ok(PageGeometry::new(20.0, 20.0, 0))
        }

        fn rasterize(&self, _index: usize, _canvas: &mut RgbaImage) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TrackedOpener(Arc<Tracked>);

    #[async_trait]
    impl DocumentOpener for TrackedOpener {
        async fn open(&self, _identifier: &str) -> Result<Arc<dyn EngineDocument>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_render_all_pages_bounds_concurrency() {
        let dir = TempDir::new().unwrap();
        let doc = Arc::new(Tracked {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = RenderConfig {
            cache_dir: dir.path().to_path_buf(),
            scale: ScaleRange::default(),
            render_concurrency: 3,
        };
        let service = PageImageService::new(&config, Arc::new(TrackedOpener(doc.clone())));

        let pages = service.render_all_pages("/docs/long.pdf", None).await.unwrap();

        assert_eq!(pages.len(), 64);
        let peak = doc.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {}", peak);
        assert_eq!(doc.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_page_numbers() {
        let dir = TempDir::new().unwrap();
        let (service, opener) = service(&dir);

        for page in [-1, 3, 5] {
            let err = service
                .render_page("/docs/sample.pdf", page, None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                PageImageError::InvalidPage { index, page_count: 3 } if index == page
            ));
        }
        assert_eq!(
            service
                .render_page("/docs/sample.pdf", 5, None)
                .await
                .unwrap_err()
                .to_string(),
            "Page number 5 is invalid, file has 3 pages"
        );
        assert_eq!(opener.renders.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_scale_is_clamped() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let tiny = service.render_page("/docs/sample.pdf", 0, Some(0.001)).await.unwrap();
        assert_eq!((tiny.width, tiny.height), (61, 79));

        let default = service.render_page("/docs/sample.pdf", 0, None).await.unwrap();
        assert_eq!((default.width, default.height), (612, 792));
    }

    #[tokio::test]
    async fn test_close_deletes_files_and_reopens() {
        let dir = TempDir::new().unwrap();
        let (service, opener) = service(&dir);

        let before = service.render_all_pages("/docs/sample.pdf", None).await.unwrap();
        service.close_document("/docs/sample.pdf").await;

        for page in &before {
            assert!(!path_of(page).exists());
        }
        assert_eq!(service.open_documents(), 0);

        // A fresh handle with an empty cache
        let after = service.render_page("/docs/sample.pdf", 0, None).await.unwrap();
        assert_ne!(after.uri, before[0].uri);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        assert_eq!(opener.renders.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_close_unknown_is_silent() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);
        service.close_document("/docs/never-opened.pdf").await;
        service.close_document("/docs/never-opened.pdf").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_renders_execute_once() {
        let dir = TempDir::new().unwrap();
        let (service, opener) = service(&dir);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service.render_page("/docs/sample.pdf", 1, Some(2.0)).await
                })
            })
            .collect();

        let mut results = HashMap::new();
        for task in tasks {
            let image = task.await.unwrap().unwrap();
            results.insert(image.uri.clone(), image);
        }

        assert_eq!(results.len(), 1);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(opener.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir);

        let a = service.render_page("/docs/a.pdf", 0, None).await.unwrap();
        let b = service.render_page("/docs/b.pdf", 2, None).await.unwrap();
        assert_eq!(service.open_documents(), 2);

        service.shutdown().await;

        assert_eq!(service.open_documents(), 0);
        assert!(!path_of(&a).exists());
        assert!(!path_of(&b).exists());
    }
}
