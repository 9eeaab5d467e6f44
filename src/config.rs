//! Composer configuration

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_MAX_FILE_SIZE: &str = "PDF_COMPOSER_MAX_FILE_SIZE";
pub const ENV_MAX_TOTAL_SIZE: &str = "PDF_COMPOSER_MAX_TOTAL_SIZE";
pub const ENV_PDFIUM_DIR: &str = "PDF_COMPOSER_PDFIUM_DIR";

/// Session configuration
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Maximum size of a single upload in bytes (default: 50MB)
    pub max_file_size: u64,
    /// Maximum combined size of one batch of uploads (default: 100MB)
    pub max_total_size: u64,
    /// Thumbnail width in pixels when the caller gives none (default: 200)
    pub thumbnail_width: u32,
    /// Upper bound on cached thumbnails; `None` keeps every entry until evicted
    pub max_thumbnails: Option<usize>,
    /// Pause between individual saves of several outputs (default: 100ms)
    pub stagger_delay: Duration,
    /// Directory holding the PDFium shared library
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,   // 50MB
            max_total_size: 100 * 1024 * 1024, // 100MB
            thumbnail_width: 200,
            max_thumbnails: None,
            stagger_delay: Duration::from_millis(100),
            pdfium_dir: None,
        }
    }
}

impl ComposerConfig {
    /// Defaults overlaid with `PDF_COMPOSER_*` environment variables.
    ///
    /// Unset or unparseable variables keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(size) = parse_size(lookup(ENV_MAX_FILE_SIZE), ENV_MAX_FILE_SIZE) {
            config.max_file_size = size;
        }
        if let Some(size) = parse_size(lookup(ENV_MAX_TOTAL_SIZE), ENV_MAX_TOTAL_SIZE) {
            config.max_total_size = size;
        }
        if let Some(dir) = lookup(ENV_PDFIUM_DIR).filter(|d| !d.trim().is_empty()) {
            config.pdfium_dir = Some(PathBuf::from(dir));
        }

        config
    }
}

fn parse_size(value: Option<String>, key: &str) -> Option<u64> {
    let value = value?;
    match value.trim().parse::<u64>() {
        Ok(size) if size > 0 => Some(size),
        _ => {
            tracing::warn!(key, value = %value, "ignoring invalid size setting");
            None
        }
    }
}
