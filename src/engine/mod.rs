//! Document engine abstraction
//!
//! The engine is the black box that parses documents and rasterizes pages.
//! Everything above it (caching, file output, lifecycle) only talks to these
//! traits, so tests can substitute a stub engine for MuPDF.

mod mupdf_engine;

pub use mupdf_engine::MupdfEngine;

use std::sync::Arc;

use image::RgbaImage;

use crate::error::Result;
use crate::source::DocumentSource;

/// Intrinsic page box plus its declared rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Box width in points, before rotation
    pub width: f32,
    /// Box height in points, before rotation
    pub height: f32,
    /// Declared page rotation in degrees
    pub rotation: i32,
}

impl PageGeometry {
    pub fn new(width: f32, height: f32, rotation: i32) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    /// Rotation normalized into `0..360`
    pub fn normalized_rotation(&self) -> i32 {
        self.rotation.rem_euclid(360)
    }

    /// Size as seen by the caller once the page is turned upright
    ///
    /// Quarter-turn rotations swap width and height.
    pub fn upright_size(&self) -> (f32, f32) {
        match self.normalized_rotation() {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// An opened document
///
/// Implementations must be safe to share across the blocking worker threads
/// that run renders.
pub trait EngineDocument: Send + Sync {
    /// Number of pages, fixed once the document is opened
    fn page_count(&self) -> usize;

    /// Geometry of a page
    fn page_geometry(&self, index: usize) -> Result<PageGeometry>;

    /// Draw the upright page scaled to fill `canvas`
    ///
    /// Page content is composited over whatever the canvas already holds.
    fn rasterize(&self, index: usize, canvas: &mut RgbaImage) -> Result<()>;
}

/// Opens documents from resolved sources
pub trait DocumentEngine: Send + Sync {
    fn open(&self, source: DocumentSource) -> Result<Arc<dyn EngineDocument>>;
}
