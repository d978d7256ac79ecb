//! Rendered page output
//!
//! Encodes page images as PNG and writes each one to a fresh file named
//! `<source>-thumbnail-<page>-<uuid>.png` inside the cache directory.

use std::fs::OpenOptions;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use image::RgbaImage;
use uuid::Uuid;

use crate::error::{PageImageError, Result};

/// Longest source-name prefix kept in output file names
const MAX_NAME_LEN: usize = 64;

/// Writes rendered pages into a cache directory
#[derive(Debug, Clone)]
pub struct OutputFileWriter {
    cache_dir: PathBuf,
}

impl OutputFileWriter {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Generate a new, never reused output path
    pub fn output_path(&self, source_name: &str, page: usize) -> PathBuf {
        let filename = format!(
            "{}-thumbnail-{}-{}.png",
            sanitize_name(source_name),
            page,
            Uuid::new_v4()
        );
        self.cache_dir.join(filename)
    }

    /// Encode `image` as PNG and write it to a new file
    ///
    /// Returns the path of the written file.
    pub fn write_png(&self, source_name: &str, page: usize, image: &RgbaImage) -> Result<PathBuf> {
        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)?;

        std::fs::create_dir_all(&self.cache_dir)?;

        let path = self.output_path(source_name, page);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        if let Err(e) = file.write_all(&encoded).and_then(|_| file.flush()) {
            let _ = std::fs::remove_file(&path);
            return Err(PageImageError::FileWrite(e));
        }

        tracing::debug!("Wrote {} ({} bytes)", path.display(), encoded.len());
        Ok(path)
    }
}

/// Reduce a source name to characters that are safe in a file name
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        "document".to_string()
    } else {
        sanitized
    }
}
