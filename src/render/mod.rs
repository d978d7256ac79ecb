//! Page rendering pipeline
//!
//! [`raster`] turns a page into white-backed pixels at a target scale and
//! [`output`] persists those pixels as uniquely named PNG files.

mod output;
mod raster;

pub use output::{sanitize_name, OutputFileWriter};
pub use raster::{target_size, RasterRenderer, MAX_DIMENSION};
