//! Whole-document size reduction
//!
//! Two strategies:
//!
//! - structural: strip descriptive metadata and re-serialize with
//!   level-dependent encoder options; page content is untouched
//! - rasterized: render every page, re-encode it as JPEG and rebuild the
//!   document from the images; lossy, for image-heavy or already optimized inputs

use crate::error::{Error, Result};
use crate::pdf::{DocumentCodec, JpegPage, Rasterizer, WriteOptions};
use crate::source::SourceFile;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::Serialize;
use std::fmt;

/// Render scale applied on top of the level's scale, so images keep detail when drawn
const RENDER_BASE_SCALE: f32 = 1.5;

/// Average bytes per page above which a document probably embeds images
const IMAGE_HEAVY_BYTES_PER_PAGE: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 3] = [
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
    ];

    pub fn settings(self) -> CompressionSettings {
        match self {
            CompressionLevel::Low => CompressionSettings {
                image_quality: 85,
                scale: 1.0,
                estimated_reduction: 15,
            },
            CompressionLevel::Medium => CompressionSettings {
                image_quality: 65,
                scale: 0.85,
                estimated_reduction: 40,
            },
            CompressionLevel::High => CompressionSettings {
                image_quality: 45,
                scale: 0.7,
                estimated_reduction: 60,
            },
        }
    }

    /// Encoder options for the structural strategy
    pub fn write_options(self) -> WriteOptions {
        match self {
            CompressionLevel::Low => WriteOptions {
                object_streams: false,
                compress_streams: true,
                prune_unreferenced: false,
            },
            CompressionLevel::Medium => WriteOptions {
                object_streams: true,
                compress_streams: true,
                prune_unreferenced: false,
            },
            CompressionLevel::High => WriteOptions {
                object_streams: true,
                compress_streams: true,
                prune_unreferenced: true,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-level tuning of the rasterized strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionSettings {
    /// JPEG quality, 1-100
    pub image_quality: u8,
    /// Resolution scale relative to the base render scale
    pub scale: f32,
    /// Expected size reduction in percent
    pub estimated_reduction: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    Structural,
    Rasterized,
}

/// Result of one compression run
#[derive(Debug, Clone, Serialize)]
pub struct CompressionOutcome {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub level: CompressionLevel,
    pub strategy: CompressionStrategy,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Size reduction in percent, never negative
    pub ratio: u32,
}

impl CompressionOutcome {
    fn new(
        data: Vec<u8>,
        level: CompressionLevel,
        strategy: CompressionStrategy,
        original_size: u64,
    ) -> Self {
        let compressed_size = data.len() as u64;
        Self {
            data,
            level,
            strategy,
            original_size,
            compressed_size,
            ratio: compression_ratio(original_size, compressed_size),
        }
    }
}

/// Estimated output size of one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelEstimate {
    pub level: CompressionLevel,
    pub estimated_size: u64,
}

/// Pre-compression inspection of a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionAnalysis {
    pub page_count: u32,
    pub byte_size: u64,
    /// Heuristic: the average page is large enough to carry images
    pub has_images: bool,
    pub estimates: Vec<LevelEstimate>,
}

/// Size reduction in whole percent, floored at zero
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> u32 {
    if original_size == 0 {
        return 0;
    }
    let saved = original_size as f64 - compressed_size as f64;
    (saved / original_size as f64 * 100.0).round().max(0.0) as u32
}

pub fn estimate_compressed_size(original_size: u64, level: CompressionLevel) -> u64 {
    let keep = 1.0 - f64::from(level.settings().estimated_reduction) / 100.0;
    (original_size as f64 * keep).round() as u64
}

pub fn analyze_document<C: DocumentCodec>(
    codec: &C,
    file: &SourceFile,
) -> Result<CompressionAnalysis> {
    let document = codec.parse(file.bytes())?;
    let page_count = codec.page_count(&document)?;
    let byte_size = file.byte_size();

    let has_images =
        page_count > 0 && byte_size / u64::from(page_count) > IMAGE_HEAVY_BYTES_PER_PAGE;

    Ok(CompressionAnalysis {
        page_count,
        byte_size,
        has_images,
        estimates: CompressionLevel::ALL
            .iter()
            .map(|&level| LevelEstimate {
                level,
                estimated_size: estimate_compressed_size(byte_size, level),
            })
            .collect(),
    })
}

/// Structural compression: strip metadata and re-serialize
pub fn compress_document<C: DocumentCodec>(
    codec: &C,
    file: &SourceFile,
    level: CompressionLevel,
) -> Result<CompressionOutcome> {
    let document = codec.parse(file.bytes())?;
    codec.strip_metadata(&document)?;
    let data = codec.serialize(&document, &level.write_options())?;

    let outcome = CompressionOutcome::new(
        data,
        level,
        CompressionStrategy::Structural,
        file.byte_size(),
    );
    tracing::info!(
        document = file.name(),
        level = %level,
        original = outcome.original_size,
        compressed = outcome.compressed_size,
        ratio = outcome.ratio,
        "compressed document"
    );
    Ok(outcome)
}

/// Rasterized compression: rebuild the document from JPEG renders of its pages.
///
/// `progress` receives a percentage and a status line as pages are processed.
pub async fn compress_document_rasterized<C, R, F>(
    codec: &C,
    rasterizer: &R,
    file: &SourceFile,
    level: CompressionLevel,
    mut progress: F,
) -> Result<CompressionOutcome>
where
    C: DocumentCodec,
    R: Rasterizer,
    F: FnMut(u8, &str),
{
    let settings = level.settings();
    progress(0, "Loading document");

    let document = rasterizer.open(file.shared_bytes()).await?;
    let pages = render_jpeg_pages(rasterizer, &document, file, settings, &mut progress).await;
    rasterizer.destroy(&document);
    let pages = pages?;

    progress(95, "Finalizing document");
    let output = codec.create_document()?;
    for page in &pages {
        codec.add_image_page(&output, page)?;
    }
    let data = codec.serialize(
        &output,
        &WriteOptions {
            object_streams: true,
            compress_streams: true,
            prune_unreferenced: false,
        },
    )?;
    progress(100, "Done");

    let outcome = CompressionOutcome::new(
        data,
        level,
        CompressionStrategy::Rasterized,
        file.byte_size(),
    );
    tracing::info!(
        document = file.name(),
        level = %level,
        pages = pages.len(),
        original = outcome.original_size,
        compressed = outcome.compressed_size,
        ratio = outcome.ratio,
        "compressed document by rasterizing"
    );
    Ok(outcome)
}

async fn render_jpeg_pages<R, F>(
    rasterizer: &R,
    document: &R::Document,
    file: &SourceFile,
    settings: CompressionSettings,
    progress: &mut F,
) -> Result<Vec<JpegPage>>
where
    R: Rasterizer,
    F: FnMut(u8, &str),
{
    let page_count = rasterizer.page_count(document);
    let mut pages = Vec::with_capacity(page_count as usize);

    for page_number in 1..=page_count {
        let percent = ((page_number - 1) as f32 / page_count as f32 * 90.0).round() as u8;
        progress(
            percent,
            &format!("Compressing page {} of {}", page_number, page_count),
        );

        let page_size = rasterizer.page_size(document, page_number)?;
        let image = rasterizer
            .render(document, page_number, settings.scale * RENDER_BASE_SCALE)
            .await
            .map_err(|e| e.into_render(file.name(), page_number))?;

        pages.push(JpegPage {
            data: encode_jpeg(&image, settings.image_quality)?,
            pixel_width: image.width(),
            pixel_height: image.height(),
            page_size,
        });
    }

    Ok(pages)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, quality)
        .encode_image(&rgb)
        .map_err(|e| Error::Encode {
            reason: format!("Failed to encode JPEG: {}", e),
        })?;
    Ok(data)
}
