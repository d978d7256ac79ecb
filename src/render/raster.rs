//! Page rasterization
//!
//! Produces an upright, fully opaque image of a page at a given scale.
//! No caching and no I/O happen here.

use image::{Rgba, RgbaImage};

use crate::engine::{EngineDocument, PageGeometry};
use crate::error::{PageImageError, Result};

/// Largest width or height, in pixels, a render may produce
pub const MAX_DIMENSION: u32 = 16_384;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Pixel size of a page rendered at `scale`
///
/// The upright page size is multiplied by `scale` and rounded to the
/// nearest pixel. Sizes below 1×1 or above [`MAX_DIMENSION`] are rejected.
pub fn target_size(geometry: &PageGeometry, scale: f64) -> Result<(u32, u32)> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PageImageError::InvalidScale(format!(
            "scale must be a positive number, got {}",
            scale
        )));
    }

    let (width, height) = geometry.upright_size();
    let target_width = (width as f64 * scale).round();
    let target_height = (height as f64 * scale).round();

    if !(target_width >= 1.0 && target_height >= 1.0) {
        return Err(PageImageError::InvalidScale(format!(
            "scale {} gives an empty {}x{} image",
            scale, target_width, target_height
        )));
    }

    if target_width > MAX_DIMENSION as f64 || target_height > MAX_DIMENSION as f64 {
        return Err(PageImageError::InvalidScale(format!(
            "scale {} gives a {}x{} image, larger than {} pixels per side",
            scale, target_width, target_height, MAX_DIMENSION
        )));
    }

    Ok((target_width as u32, target_height as u32))
}

/// Renders pages of an engine document into pixel buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterRenderer;

impl RasterRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render one page at `scale` over an opaque white background
    pub fn render(&self, doc: &dyn EngineDocument, index: usize, scale: f64) -> Result<RgbaImage> {
        let page_count = doc.page_count();
        if index >= page_count {
            return Err(PageImageError::InvalidPage {
                index: index as i64,
                page_count,
            });
        }

        let geometry = doc.page_geometry(index)?;
        let (width, height) = target_size(&geometry, scale)?;

        // Pages may paint only part of their area
        let mut canvas = RgbaImage::from_pixel(width, height, WHITE);
        doc.rasterize(index, &mut canvas)?;

        tracing::debug!(
            "Rasterized page {} at scale {} ({}x{}, rotation {})",
            index,
            scale,
            width,
            height,
            geometry.normalized_rotation()
        );

        Ok(canvas)
    }
}
