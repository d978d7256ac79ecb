//! MuPDF-backed document engine
//!
//! # Thread Safety
//!
//! MuPDF's `fz_context` is NOT thread-safe, and `mupdf::Document` must not
//! cross threads. [`MupdfDocument`] therefore parses once at open to record
//! page geometry, then keeps only the source bytes and parses a fresh
//! document for each rasterization, serializing them per document with a
//! `parking_lot::Mutex`. Different documents render in parallel.

use std::sync::Arc;

use image::RgbaImage;
use mupdf::pdf::PdfDocument;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use crate::error::{PageImageError, Result};
use crate::source::DocumentSource;

use super::{DocumentEngine, EngineDocument, PageGeometry};

const PDF_MIME: &str = "application/pdf";

/// Maximum `/Parent` hops followed when looking up an inherited `/Rotate`
const MAX_INHERIT_DEPTH: usize = 32;

/// Engine that opens PDF documents with MuPDF
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEngine for MupdfEngine {
    fn open(&self, source: DocumentSource) -> Result<Arc<dyn EngineDocument>> {
        let doc = MupdfDocument::open(source)?;
        Ok(Arc::new(doc))
    }
}

/// An opened PDF document
pub struct MupdfDocument {
    /// Document bytes, kept for the lifetime of the handle
    data: Arc<Vec<u8>>,
    /// Page boxes and rotations, read once at open
    geometries: Vec<PageGeometry>,
    /// Serializes MuPDF access for this document
    lock: Mutex<()>,
}

impl MupdfDocument {
    /// Read and validate a document, recording every page's geometry
    pub fn open(source: DocumentSource) -> Result<Self> {
        let data = source.read_bytes()?;

        if !data.starts_with(b"%PDF") {
            return Err(PageImageError::DocumentOpen(
                "Data is not a valid PDF".to_string(),
            ));
        }

        let doc = PdfDocument::from_bytes(&data)
            .map_err(|e| PageImageError::DocumentOpen(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| PageImageError::DocumentOpen(e.to_string()))?;

        let geometries = (0..page_count.max(0))
            .map(|index| read_geometry(&doc, index))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| PageImageError::DocumentOpen(e.to_string()))?;

        Ok(Self {
            data,
            geometries,
            lock: Mutex::new(()),
        })
    }
}

/// Page box and declared rotation of one page
fn read_geometry(doc: &PdfDocument, index: i32) -> Result<PageGeometry> {
    let rotation = declared_rotation(doc, index)?;

    // MuPDF reports bounds with the rotation already applied
    let bounds = doc.load_page(index)?.bounds()?;
    let upright_width = bounds.x1 - bounds.x0;
    let upright_height = bounds.y1 - bounds.y0;

    let (width, height) = match rotation.rem_euclid(360) {
        90 | 270 => (upright_height, upright_width),
        _ => (upright_width, upright_height),
    };

    Ok(PageGeometry::new(width, height, rotation))
}

/// Declared `/Rotate` of a page, following `/Parent` inheritance
fn declared_rotation(doc: &PdfDocument, index: i32) -> Result<i32> {
    let mut node = Some(doc.find_page(index)?);
    let mut depth = 0;

    while let Some(obj) = node {
        if let Some(rotate) = obj.get_dict("Rotate")? {
            return Ok(rotate.as_int()?);
        }
        depth += 1;
        if depth > MAX_INHERIT_DEPTH {
            break;
        }
        node = obj.get_dict("Parent")?;
    }

    Ok(0)
}

impl EngineDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.geometries.len()
    }

    fn page_geometry(&self, index: usize) -> Result<PageGeometry> {
        self.geometries
            .get(index)
            .copied()
            .ok_or(PageImageError::InvalidPage {
                index: index as i64,
                page_count: self.geometries.len(),
            })
    }

    fn rasterize(&self, index: usize, canvas: &mut RgbaImage) -> Result<()> {
        let _guard = self.lock.lock();

        // One parse per render; MuPDF documents cannot be shared across threads
        let doc = Document::from_bytes(&self.data, PDF_MIME)?;
        let page = doc.load_page(index as i32)?;
        let bounds = page.bounds()?;
        let page_width = bounds.x1 - bounds.x0;
        let page_height = bounds.y1 - bounds.y0;

        if page_width <= 0.0 || page_height <= 0.0 {
            return Err(PageImageError::Render(format!(
                "Page {} has an empty media box",
                index
            )));
        }

        // Scale each axis so the upright page exactly covers the canvas
        let sx = canvas.width() as f32 / page_width;
        let sy = canvas.height() as f32 / page_height;
        let matrix = Matrix::new_scale(sx, sy);

        let colorspace = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&matrix, &colorspace, true, true)?;

        composite_over(
            pixmap.samples(),
            pixmap.width() as usize,
            pixmap.height() as usize,
            pixmap.n() as usize,
            canvas,
        );
        Ok(())
    }
}

/// Blend premultiplied samples onto the canvas, clipped to the canvas size
///
/// `n` is the number of components per pixel; without a fourth component
/// the source is treated as opaque.
fn composite_over(
    samples: &[u8],
    src_width: usize,
    src_height: usize,
    n: usize,
    canvas: &mut RgbaImage,
) {
    let width = (src_width as u32).min(canvas.width());
    let height = (src_height as u32).min(canvas.height());

    for y in 0..height {
        for x in 0..width {
            let offset = (y as usize * src_width + x as usize) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            let a = if n >= 4 {
                samples.get(offset + 3).copied().unwrap_or(255)
            } else {
                255
            };

            let dst = canvas.get_pixel_mut(x, y);
            let inv = 255 - a as u16;
            for (channel, src) in [r, g, b].into_iter().enumerate() {
                let blended = src as u16 + (dst.0[channel] as u16 * inv + 127) / 255;
                dst.0[channel] = blended.min(255) as u8;
            }
            dst.0[3] = 255;
        }
    }
}
