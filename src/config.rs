//! Configuration management for the page image server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Lowest scale accepted when nothing else is configured
pub const DEFAULT_MIN_SCALE: f64 = 0.1;
/// Highest scale accepted when nothing else is configured
pub const DEFAULT_MAX_SCALE: f64 = 10.0;
/// Scale used when a request does not name one
pub const DEFAULT_SCALE: f64 = 1.0;
/// Pages rendered at once by a render-all request
pub const DEFAULT_RENDER_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Directory holding rendered PNG files
    pub cache_dir: PathBuf,
    pub scale: ScaleRange,
    /// Upper bound on pages rendered at once for one render-all request
    pub render_concurrency: usize,
}

/// Accepted scale range plus the default applied to requests without one
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Timeout for fetching remote documents
    pub fetch_timeout_secs: u64,
}

impl Default for ScaleRange {
    fn default() -> Self {
        ScaleRange {
            min: DEFAULT_MIN_SCALE,
            max: DEFAULT_MAX_SCALE,
            default: DEFAULT_SCALE,
        }
    }
}

impl ScaleRange {
    /// Build a range, falling back to the defaults when the bounds are unusable
    pub fn new(min: f64, max: f64, default: f64) -> Self {
        let usable = min.is_finite() && max.is_finite() && min > 0.0 && min <= max;
        if !usable {
            tracing::warn!(
                "Ignoring invalid scale range [{}, {}], using [{}, {}]",
                min,
                max,
                DEFAULT_MIN_SCALE,
                DEFAULT_MAX_SCALE
            );
            return ScaleRange::default();
        }

        let default = if default.is_finite() {
            default.clamp(min, max)
        } else {
            DEFAULT_SCALE.clamp(min, max)
        };

        ScaleRange { min, max, default }
    }

    /// Clamp a caller-supplied scale into the range
    ///
    /// `None` and NaN map to the default scale.
    pub fn clamp(&self, scale: Option<f64>) -> f64 {
        match scale {
            Some(s) if !s.is_nan() => s.clamp(self.min, self.max),
            _ => self.default,
        }
    }

    pub fn contains(&self, scale: f64) -> bool {
        scale.is_finite() && scale >= self.min && scale <= self.max
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            cache_dir: default_cache_dir(),
            scale: ScaleRange::default(),
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            fetch_timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            render: RenderConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    env::temp_dir().join("pdf-page-image")
}

fn parse_var<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000),
            },
            render: RenderConfig {
                cache_dir: env::var("PDF_PAGE_IMAGE_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_cache_dir()),
                scale: ScaleRange::new(
                    parse_var("PDF_PAGE_IMAGE_MIN_SCALE", DEFAULT_MIN_SCALE),
                    parse_var("PDF_PAGE_IMAGE_MAX_SCALE", DEFAULT_MAX_SCALE),
                    parse_var("PDF_PAGE_IMAGE_DEFAULT_SCALE", DEFAULT_SCALE),
                ),
                render_concurrency: parse_var(
                    "PDF_PAGE_IMAGE_RENDER_CONCURRENCY",
                    DEFAULT_RENDER_CONCURRENCY,
                )
                .max(1),
            },
            source: SourceConfig {
                fetch_timeout_secs: parse_var("PDF_PAGE_IMAGE_FETCH_TIMEOUT_SECS", 30),
            },
        })
    }
}
