//! In-memory codec and rasterizer for tests
//!
//! Documents use a line-based text format instead of real PDF syntax:
//!
//! ```text
//! %PDF-MEMORY
//! page a1 612x792
//! page a2
//! meta Title Quarterly report
//! ```
//!
//! Each `page` line carries a label (used to check output order) and an
//! optional size in points. A page labelled `broken` cannot be copied and a
//! page labelled `bad` cannot be rendered.

use crate::error::{Error, Result};
use crate::pdf::{DocumentCodec, JpegPage, PageSize, Rasterizer, WriteOptions};
use async_trait::async_trait;
use image::DynamicImage;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HEADER: &str = "%PDF-MEMORY";
const DEFAULT_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

#[derive(Debug, Clone)]
struct MemoryPage {
    label: String,
    size: PageSize,
}

#[derive(Debug, Default)]
struct ParsedMemoryPdf {
    pages: Vec<MemoryPage>,
    metadata: Vec<(String, String)>,
}

fn parse_memory_pdf(bytes: &[u8]) -> Result<ParsedMemoryPdf> {
    let text = std::str::from_utf8(bytes).map_err(|_| invalid("not UTF-8"))?;
    let mut lines = text.lines();
    if lines.next() != Some(HEADER) {
        return Err(invalid("missing header"));
    }

    let mut parsed = ParsedMemoryPdf::default();
    for line in lines {
        let mut parts = line.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("page"), Some(label), size) => {
                let size = match size {
                    Some(size) => parse_size(size)?,
                    None => DEFAULT_SIZE,
                };
                parsed.pages.push(MemoryPage {
                    label: label.to_string(),
                    size,
                });
            }
            (Some("meta"), Some(key), value) => parsed
                .metadata
                .push((key.to_string(), value.unwrap_or_default().to_string())),
            (Some("options"), _, _) | (Some(""), None, None) => {}
            _ => return Err(invalid(&format!("unexpected line {:?}", line))),
        }
    }
    Ok(parsed)
}

fn parse_size(size: &str) -> Result<PageSize> {
    let (w, h) = size.split_once('x').ok_or_else(|| invalid("bad page size"))?;
    let w: f32 = w.parse().map_err(|_| invalid("bad page width"))?;
    let h: f32 = h.parse().map_err(|_| invalid("bad page height"))?;
    Ok(PageSize::new(w, h))
}

fn invalid(reason: &str) -> Error {
    Error::InvalidDocument {
        reason: reason.to_string(),
    }
}

/// Build an in-memory document with one default-sized page per label
pub fn memory_pdf(labels: &[&str]) -> Vec<u8> {
    memory_pdf_with_metadata(labels, &[])
}

/// Build an in-memory document with pages and info-dictionary entries
pub fn memory_pdf_with_metadata(labels: &[&str], metadata: &[(&str, &str)]) -> Vec<u8> {
    let mut text = String::from(HEADER);
    for label in labels {
        text.push_str(&format!("\npage {}", label));
    }
    for (key, value) in metadata {
        text.push_str(&format!("\nmeta {} {}", key, value));
    }
    text.push('\n');
    text.into_bytes()
}

/// Build an in-memory document whose pages have explicit sizes
pub fn memory_pdf_with_sizes(pages: &[(&str, f32, f32)]) -> Vec<u8> {
    let mut text = String::from(HEADER);
    for (label, w, h) in pages {
        text.push_str(&format!("\npage {} {}x{}", label, w, h));
    }
    text.push('\n');
    text.into_bytes()
}

/// Page labels of an in-memory document, in page order
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    parse_memory_pdf(bytes)
        .map(|parsed| parsed.pages.into_iter().map(|p| p.label).collect())
        .unwrap_or_default()
}

/// Metadata keys of an in-memory document
pub fn metadata_keys(bytes: &[u8]) -> Vec<String> {
    parse_memory_pdf(bytes)
        .map(|parsed| parsed.metadata.into_iter().map(|(k, _)| k).collect())
        .unwrap_or_default()
}

/// Parsed in-memory document
#[derive(Debug, Default)]
pub struct MemoryDocument {
    pages: RefCell<Vec<MemoryPage>>,
    metadata: RefCell<Vec<(String, String)>>,
}

/// Codec over the in-memory format; counts parses
#[derive(Debug, Clone, Default)]
pub struct MemoryCodec {
    parses: Arc<AtomicUsize>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `parse` calls so far
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }
}

impl DocumentCodec for MemoryCodec {
    type Document = MemoryDocument;

    fn parse(&self, bytes: &[u8]) -> Result<MemoryDocument> {
        let parsed = parse_memory_pdf(bytes)?;
        self.parses.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryDocument {
            pages: RefCell::new(parsed.pages),
            metadata: RefCell::new(parsed.metadata),
        })
    }

    fn page_count(&self, document: &MemoryDocument) -> Result<u32> {
        Ok(document.pages.borrow().len() as u32)
    }

    fn create_document(&self) -> Result<MemoryDocument> {
        Ok(MemoryDocument::default())
    }

    fn copy_pages(
        &self,
        dest: &MemoryDocument,
        source: &MemoryDocument,
        page_numbers: &[u32],
    ) -> Result<()> {
        let source_pages = source.pages.borrow();
        let page_count = source_pages.len() as u32;

        for &page_number in page_numbers {
            let page = page_number
                .checked_sub(1)
                .and_then(|idx| source_pages.get(idx as usize))
                .ok_or(Error::InvalidRange {
                    start: page_number,
                    end: page_number,
                    page_count,
                })?;
            if page.label == "broken" {
                return Err(Error::Codec {
                    reason: "page object is damaged".to_string(),
                });
            }
            dest.pages.borrow_mut().push(page.clone());
        }
        Ok(())
    }

    fn add_image_page(&self, dest: &MemoryDocument, page: &JpegPage) -> Result<()> {
        dest.pages.borrow_mut().push(MemoryPage {
            label: format!("image:{}x{}", page.pixel_width, page.pixel_height),
            size: page.page_size,
        });
        Ok(())
    }

    fn strip_metadata(&self, document: &MemoryDocument) -> Result<()> {
        document.metadata.borrow_mut().clear();
        Ok(())
    }

    fn serialize(&self, document: &MemoryDocument, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut text = String::from(HEADER);
        for page in document.pages.borrow().iter() {
            text.push_str(&format!(
                "\npage {} {}x{}",
                page.label, page.size.width, page.size.height
            ));
        }
        for (key, value) in document.metadata.borrow().iter() {
            text.push_str(&format!("\nmeta {} {}", key, value));
        }
        if options.object_streams {
            text.push_str("\noptions object-streams");
        }
        text.push('\n');
        Ok(text.into_bytes())
    }
}

/// Counters shared between a [`MemoryRasterizer`] and the test holding it
#[derive(Debug, Default)]
pub struct RasterStats {
    opens: AtomicUsize,
    renders: AtomicUsize,
    destroys: AtomicUsize,
}

impl RasterStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

/// Opened in-memory document
#[derive(Debug)]
pub struct MemoryRasterDocument {
    pages: Vec<MemoryPage>,
    destroyed: AtomicBool,
}

impl MemoryRasterDocument {
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Rasterizer over the in-memory format; renders blank RGB bitmaps
#[derive(Debug, Clone, Default)]
pub struct MemoryRasterizer {
    stats: Arc<RasterStats>,
    render_delay: Option<Duration>,
}

impl MemoryRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend for `delay` inside every render
    pub fn with_render_delay(delay: Duration) -> Self {
        Self {
            stats: Arc::default(),
            render_delay: Some(delay),
        }
    }

    pub fn stats(&self) -> Arc<RasterStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Rasterizer for MemoryRasterizer {
    type Document = MemoryRasterDocument;

    async fn open(&self, bytes: Arc<[u8]>) -> Result<MemoryRasterDocument> {
        let parsed = parse_memory_pdf(&bytes)?;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryRasterDocument {
            pages: parsed.pages,
            destroyed: AtomicBool::new(false),
        })
    }

    fn page_count(&self, document: &MemoryRasterDocument) -> u32 {
        document.pages.len() as u32
    }

    fn page_size(&self, document: &MemoryRasterDocument, page_number: u32) -> Result<PageSize> {
        page_number
            .checked_sub(1)
            .and_then(|idx| document.pages.get(idx as usize))
            .map(|page| page.size)
            .ok_or(Error::InvalidRange {
                start: page_number,
                end: page_number,
                page_count: document.pages.len() as u32,
            })
    }

    async fn render(
        &self,
        document: &MemoryRasterDocument,
        page_number: u32,
        scale: f32,
    ) -> Result<DynamicImage> {
        let size = self.page_size(document, page_number)?;
        if let Some(delay) = self.render_delay {
            tokio::time::sleep(delay).await;
        }

        let label = &document.pages[(page_number - 1) as usize].label;
        if label == "bad" {
            return Err(Error::Codec {
                reason: format!("cannot rasterize page {}", page_number),
            });
        }

        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;
        Ok(DynamicImage::new_rgb8(width, height))
    }

    fn destroy(&self, document: &MemoryRasterDocument) {
        if !document.destroyed.swap(true, Ordering::SeqCst) {
            self.stats.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }
}
