//! Codec and rasterizer seams
//!
//! The composer never parses or rasterizes PDFs itself. It orchestrates calls
//! into a [`DocumentCodec`] (parse, copy pages, serialize) and a [`Rasterizer`]
//! (page geometry, render to bitmap).

use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;

/// Page dimensions in points (1 point = 1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Scale factor that renders this page at `target_width` pixels wide
    pub fn scale_for_width(&self, target_width: u32) -> Option<f32> {
        if self.width <= 0.0 || target_width == 0 {
            return None;
        }
        Some(target_width as f32 / self.width)
    }
}

/// Encoder tuning applied when serializing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Pack objects into object streams
    pub object_streams: bool,
    /// Flate-compress uncompressed streams
    pub compress_streams: bool,
    /// Drop objects no longer reachable from the document root
    pub prune_unreferenced: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            object_streams: false,
            compress_streams: true,
            prune_unreferenced: false,
        }
    }
}

/// JPEG-encoded page image used to rebuild a rasterized document
#[derive(Debug, Clone)]
pub struct JpegPage {
    pub data: Vec<u8>,
    /// Pixel dimensions of the encoded image
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Page size the image is drawn at
    pub page_size: PageSize,
}

/// Parses, composes and serializes paginated documents.
///
/// Page numbers are 1-indexed throughout.
pub trait DocumentCodec {
    /// Parsed, page-addressable document
    type Document;

    /// Parse raw bytes; fails with `InvalidDocument` on malformed input.
    fn parse(&self, bytes: &[u8]) -> Result<Self::Document>;

    fn page_count(&self, document: &Self::Document) -> Result<u32>;

    /// Create an empty output document
    fn create_document(&self) -> Result<Self::Document>;

    /// Copy `page_numbers` of `source` and append them to `dest` in the given order.
    fn copy_pages(
        &self,
        dest: &Self::Document,
        source: &Self::Document,
        page_numbers: &[u32],
    ) -> Result<()>;

    /// Append a page showing a single JPEG image scaled to the page size
    fn add_image_page(&self, dest: &Self::Document, page: &JpegPage) -> Result<()>;

    /// Remove descriptive metadata (title, author, dates, keywords, XMP)
    fn strip_metadata(&self, document: &Self::Document) -> Result<()>;

    fn serialize(&self, document: &Self::Document, options: &WriteOptions) -> Result<Vec<u8>>;
}

/// Renders pages of a parsed document to bitmaps.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Opened document handle, kept alive between renders
    type Document: Send + Sync;

    async fn open(&self, bytes: Arc<[u8]>) -> Result<Self::Document>;

    fn page_count(&self, document: &Self::Document) -> u32;

    /// Native viewport of a page at scale 1.0
    fn page_size(&self, document: &Self::Document, page_number: u32) -> Result<PageSize>;

    async fn render(
        &self,
        document: &Self::Document,
        page_number: u32,
        scale: f32,
    ) -> Result<DynamicImage>;

    /// Release native resources held by the handle. Calling it twice is a no-op.
    fn destroy(&self, document: &Self::Document);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_for_width_preserves_aspect() {
        let letter = PageSize::new(612.0, 792.0);
        let scale = letter.scale_for_width(306).unwrap();
        assert!((scale - 0.5).abs() < f32::EPSILON);
        assert!((letter.height * scale - 396.0).abs() < 0.01);
    }

    #[test]
    fn test_scale_for_width_rejects_degenerate_input() {
        assert!(PageSize::new(0.0, 100.0).scale_for_width(200).is_none());
        assert!(PageSize::new(612.0, 792.0).scale_for_width(0).is_none());
    }
}
