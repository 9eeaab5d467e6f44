//! Thumbnail cache
//!
//! Two layers, both owned by one [`ThumbnailCache`] per editing session:
//!
//! - opened document handles keyed by document id, so rendering several pages
//!   of a document parses its bytes once
//! - rendered thumbnails keyed by `(document id, page, width)`
//!
//! Entries are only dropped by explicit eviction unless a bound is configured.
//! Concurrent requests for the same key are not coalesced: both render and the
//! last one to finish stays in the cache.

use crate::error::{Error, Result};
use crate::pdf::Rasterizer;
use crate::source::{ResourceHandle, ResourceRegistry};
use base64::Engine;
use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key of one rendered thumbnail
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub document_id: String,
    pub page: u32,
    pub width: u32,
}

impl ThumbnailKey {
    pub fn new(document_id: impl Into<String>, page: u32, width: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            width,
        }
    }
}

/// A page rendered to PNG
#[derive(Debug, Clone, Serialize)]
pub struct Thumbnail {
    /// Page number (1-indexed)
    pub page: u32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Base64-encoded PNG image data
    pub data_base64: String,
    /// MIME type (always "image/png")
    pub mime_type: String,
}

impl Thumbnail {
    /// Displayable `data:` URL for the image
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// Memoizes opened documents and rendered thumbnails
pub struct ThumbnailCache<R: Rasterizer> {
    rasterizer: R,
    registry: Arc<ResourceRegistry>,
    documents: Mutex<HashMap<String, Arc<R::Document>>>,
    thumbnails: Mutex<LruCache<ThumbnailKey, Arc<Thumbnail>>>,
}

impl<R: Rasterizer> ThumbnailCache<R> {
    /// Create an unbounded cache resolving handles through `registry`
    pub fn new(rasterizer: R, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            rasterizer,
            registry,
            documents: Mutex::new(HashMap::new()),
            thumbnails: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Create a cache keeping at most `max_entries` thumbnails, least recently used first out.
    ///
    /// A bound of `0` means unbounded, same as [`ThumbnailCache::new`].
    pub fn with_max_entries(
        rasterizer: R,
        registry: Arc<ResourceRegistry>,
        max_entries: usize,
    ) -> Self {
        let thumbnails = match NonZeroUsize::new(max_entries) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            rasterizer,
            registry,
            documents: Mutex::new(HashMap::new()),
            thumbnails: Mutex::new(thumbnails),
        }
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Return the open handle for `document_id`, opening it from `handle` on first use.
    pub async fn get_or_open_document(
        &self,
        handle: &ResourceHandle,
        document_id: &str,
    ) -> Result<Arc<R::Document>> {
        let cached = self.documents.lock().get(document_id).cloned();
        if let Some(document) = cached {
            tracing::debug!(document_id, "document handle cache hit");
            return Ok(document);
        }

        let bytes = self
            .registry
            .resolve(handle)
            .ok_or_else(|| Error::InvalidDocument {
                reason: format!("resource handle {} has been released", handle),
            })?;

        let opened = Arc::new(self.rasterizer.open(bytes).await?);

        let mut documents = self.documents.lock();
        if let Some(existing) = documents.get(document_id) {
            // Lost a race with another open of the same document
            self.rasterizer.destroy(&opened);
            return Ok(Arc::clone(existing));
        }
        documents.insert(document_id.to_string(), Arc::clone(&opened));
        tracing::debug!(
            document_id,
            pages = self.rasterizer.page_count(&opened),
            "opened document handle"
        );
        Ok(opened)
    }

    /// Render page `page_number` of a document `width` pixels wide, or return the cached render.
    ///
    /// Failures are reported as [`Error::Render`] and leave nothing cached.
    pub async fn render_thumbnail(
        &self,
        handle: &ResourceHandle,
        document_id: &str,
        page_number: u32,
        width: u32,
    ) -> Result<Arc<Thumbnail>> {
        let key = ThumbnailKey::new(document_id, page_number, width);
        if let Some(thumbnail) = self.cached_thumbnail(&key) {
            tracing::debug!(document_id, page = page_number, width, "thumbnail cache hit");
            return Ok(thumbnail);
        }

        let thumbnail = self
            .render_uncached(handle, document_id, page_number, width)
            .await
            .map_err(|e| {
                tracing::warn!(document_id, page = page_number, error = %e, "thumbnail render failed");
                e.into_render(document_id, page_number)
            })?;

        let thumbnail = Arc::new(thumbnail);
        self.thumbnails.lock().put(key, Arc::clone(&thumbnail));
        Ok(thumbnail)
    }

    async fn render_uncached(
        &self,
        handle: &ResourceHandle,
        document_id: &str,
        page_number: u32,
        width: u32,
    ) -> Result<Thumbnail> {
        let document = self.get_or_open_document(handle, document_id).await?;
        let size = self.rasterizer.page_size(&document, page_number)?;
        let scale = size.scale_for_width(width).ok_or_else(|| Error::Codec {
            reason: format!(
                "cannot scale a page {} points wide to {} pixels",
                size.width, width
            ),
        })?;

        let image = self.rasterizer.render(&document, page_number, scale).await?;
        encode_png(page_number, &image)
    }

    /// Cached thumbnail for `key`, if any
    pub fn cached_thumbnail(&self, key: &ThumbnailKey) -> Option<Arc<Thumbnail>> {
        self.thumbnails.lock().get(key).cloned()
    }

    pub fn has_thumbnail(&self, key: &ThumbnailKey) -> bool {
        self.thumbnails.lock().contains(key)
    }

    /// Drop every thumbnail of `document_id` and destroy its open handle.
    ///
    /// Returns the number of thumbnails removed.
    pub fn evict_document(&self, document_id: &str) -> usize {
        let removed = {
            let mut thumbnails = self.thumbnails.lock();
            let keys: Vec<ThumbnailKey> = thumbnails
                .iter()
                .filter(|(key, _)| key.document_id == document_id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                thumbnails.pop(key);
            }
            keys.len()
        };

        let document = self.documents.lock().remove(document_id);
        if let Some(document) = document {
            self.rasterizer.destroy(&document);
        }

        tracing::debug!(document_id, removed, "evicted document from thumbnail cache");
        removed
    }

    /// Clear both layers and destroy every open handle
    pub fn evict_all(&self) {
        self.thumbnails.lock().clear();
        let documents: Vec<Arc<R::Document>> =
            self.documents.lock().drain().map(|(_, doc)| doc).collect();
        for document in &documents {
            self.rasterizer.destroy(document);
        }
    }

    /// Number of cached thumbnails
    pub fn len(&self) -> usize {
        self.thumbnails.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.lock().is_empty()
    }

    /// Number of open document handles
    pub fn open_document_count(&self) -> usize {
        self.documents.lock().len()
    }
}

impl<R: Rasterizer> Drop for ThumbnailCache<R> {
    fn drop(&mut self) {
        self.evict_all();
    }
}

fn encode_png(page_number: u32, image: &DynamicImage) -> Result<Thumbnail> {
    let mut png_bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .map_err(|e| Error::Encode {
            reason: format!("Failed to encode PNG: {}", e),
        })?;

    Ok(Thumbnail {
        page: page_number,
        width: image.width(),
        height: image.height(),
        data_base64: base64::engine::general_purpose::STANDARD.encode(&png_bytes),
        mime_type: "image/png".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;
    use crate::testing::{memory_pdf, memory_pdf_with_sizes, MemoryRasterizer};
    use futures_util::future::join_all;
    use std::time::Duration;

    fn setup(labels: &[&str]) -> (ThumbnailCache<MemoryRasterizer>, ResourceHandle) {
        let registry = Arc::new(ResourceRegistry::new());
        let handle = registry.create(&SourceFile::new("doc.pdf", memory_pdf(labels)));
        let cache = ThumbnailCache::new(MemoryRasterizer::new(), registry);
        (cache, handle)
    }

    #[tokio::test]
    async fn test_same_key_is_served_from_cache() {
        let (cache, handle) = setup(&["p1", "p2"]);
        let stats = cache.rasterizer().stats();

        let first = cache.render_thumbnail(&handle, "doc", 1, 200).await.unwrap();
        let second = cache.render_thumbnail(&handle, "doc", 1, 200).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stats.renders(), 1);
        assert_eq!(stats.opens(), 1);
        assert_eq!(first.mime_type, "image/png");
        assert!(first.data_url().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_widths_are_independent_entries() {
        let (cache, handle) = setup(&["p1"]);
        let stats = cache.rasterizer().stats();

        let small = cache.render_thumbnail(&handle, "doc", 1, 100).await.unwrap();
        let large = cache.render_thumbnail(&handle, "doc", 1, 200).await.unwrap();

        assert_eq!(small.width, 100);
        assert_eq!(large.width, 200);
        assert_eq!(cache.len(), 2);
        assert_eq!(stats.renders(), 2);
        // One parse serves both widths
        assert_eq!(stats.opens(), 1);
        assert_eq!(cache.open_document_count(), 1);
    }

    #[tokio::test]
    async fn test_aspect_ratio_follows_viewport() {
        let registry = Arc::new(ResourceRegistry::new());
        let bytes = memory_pdf_with_sizes(&[("letter", 612.0, 792.0), ("wide", 800.0, 400.0)]);
        let handle = registry.create(&SourceFile::new("doc.pdf", bytes));
        let cache = ThumbnailCache::new(MemoryRasterizer::new(), registry);

        let letter = cache.render_thumbnail(&handle, "doc", 1, 306).await.unwrap();
        assert_eq!((letter.width, letter.height), (306, 396));

        let wide = cache.render_thumbnail(&handle, "doc", 2, 200).await.unwrap();
        assert_eq!((wide.width, wide.height), (200, 100));
    }

    #[tokio::test]
    async fn test_evict_document_destroys_handle_and_reopens() {
        let registry = Arc::new(ResourceRegistry::new());
        let a = registry.create(&SourceFile::new("a.pdf", memory_pdf(&["a1", "a2"])));
        let b = registry.create(&SourceFile::new("b.pdf", memory_pdf(&["b1"])));
        let cache = ThumbnailCache::new(MemoryRasterizer::new(), registry);
        let stats = cache.rasterizer().stats();

        cache.render_thumbnail(&a, "a", 1, 200).await.unwrap();
        cache.render_thumbnail(&a, "a", 2, 200).await.unwrap();
        cache.render_thumbnail(&b, "b", 1, 200).await.unwrap();
        let handle_a = cache.get_or_open_document(&a, "a").await.unwrap();

        assert_eq!(cache.evict_document("a"), 2);
        assert!(handle_a.is_destroyed());
        assert_eq!(cache.len(), 1);
        assert!(cache.has_thumbnail(&ThumbnailKey::new("b", 1, 200)));
        assert!(!cache.has_thumbnail(&ThumbnailKey::new("a", 1, 200)));

        cache.render_thumbnail(&a, "a", 1, 200).await.unwrap();
        assert_eq!(stats.opens(), 3);
        assert_eq!(stats.destroys(), 1);
        let reopened = cache.get_or_open_document(&a, "a").await.unwrap();
        assert!(!reopened.is_destroyed());
    }

    #[tokio::test]
    async fn test_evict_unknown_document_is_noop() {
        let (cache, _handle) = setup(&["p1"]);
        assert_eq!(cache.evict_document("missing"), 0);
        assert_eq!(cache.rasterizer().stats().destroys(), 0);
    }

    #[tokio::test]
    async fn test_render_failure_is_not_cached() {
        let (cache, handle) = setup(&["ok", "bad"]);

        let err = cache
            .render_thumbnail(&handle, "doc", 2, 200)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render { page: 2, .. }));
        assert!(!cache.has_thumbnail(&ThumbnailKey::new("doc", 2, 200)));

        // Sibling pages are unaffected
        assert!(cache.render_thumbnail(&handle, "doc", 1, 200).await.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_render_error() {
        let (cache, handle) = setup(&["p1"]);
        let err = cache
            .render_thumbnail(&handle, "doc", 5, 200)
            .await
            .unwrap_err();
        match err {
            Error::Render {
                document_id,
                page,
                reason,
            } => {
                assert_eq!(document_id, "doc");
                assert_eq!(page, 5);
                assert!(reason.contains("1 pages"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_released_handle_cannot_be_opened() {
        let registry = Arc::new(ResourceRegistry::new());
        let handle = registry.create(&SourceFile::new("doc.pdf", memory_pdf(&["p1"])));
        registry.release(&handle);
        let cache = ThumbnailCache::new(MemoryRasterizer::new(), registry);

        let err = cache
            .render_thumbnail(&handle, "doc", 1, 200)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert_eq!(cache.open_document_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_keep_one_entry() {
        let registry = Arc::new(ResourceRegistry::new());
        let handle = registry.create(&SourceFile::new("doc.pdf", memory_pdf(&["p1"])));
        let cache = ThumbnailCache::new(
            MemoryRasterizer::with_render_delay(Duration::from_millis(10)),
            registry,
        );

        let (first, second) = tokio::join!(
            cache.render_thumbnail(&handle, "doc", 1, 200),
            cache.render_thumbnail(&handle, "doc", 1, 200),
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.open_document_count(), 1);
        assert_eq!(cache.rasterizer().stats().renders(), 2);
    }

    #[test]
    fn test_distinct_keys_render_independently() {
        tokio_test::block_on(async {
            let (cache, handle) = setup(&["p1", "bad", "p3"]);
            let requests: Vec<(u32, u32)> = (1..=3)
                .flat_map(|page| [100, 200].map(move |width| (page, width)))
                .collect();

            let results = join_all(
                requests
                    .iter()
                    .map(|&(page, width)| cache.render_thumbnail(&handle, "doc", page, width)),
            )
            .await;

            let failed: Vec<(u32, u32)> = requests
                .iter()
                .zip(&results)
                .filter(|(_, result)| result.is_err())
                .map(|(&key, _)| key)
                .collect();
            assert_eq!(failed, vec![(2, 100), (2, 200)]);
            assert_eq!(cache.len(), 4);
            assert_eq!(cache.rasterizer().stats().opens(), 1);
        });
    }

    #[tokio::test]
    async fn test_bounded_cache_drops_least_recent() {
        let registry = Arc::new(ResourceRegistry::new());
        let handle = registry.create(&SourceFile::new("doc.pdf", memory_pdf(&["a", "b", "c"])));
        let cache = ThumbnailCache::with_max_entries(MemoryRasterizer::new(), registry, 2);

        for page in 1..=3 {
            cache.render_thumbnail(&handle, "doc", page, 100).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.has_thumbnail(&ThumbnailKey::new("doc", 1, 100)));
        assert!(cache.has_thumbnail(&ThumbnailKey::new("doc", 3, 100)));
    }

    #[tokio::test]
    async fn test_zero_bound_is_unbounded() {
        let registry = Arc::new(ResourceRegistry::new());
        let handle = registry.create(&SourceFile::new("doc.pdf", memory_pdf(&["a", "b", "c"])));
        let cache = ThumbnailCache::with_max_entries(MemoryRasterizer::new(), registry, 0);

        for page in 1..=3 {
            cache.render_thumbnail(&handle, "doc", page, 100).await.unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.has_thumbnail(&ThumbnailKey::new("doc", 1, 100)));
    }

    #[tokio::test]
    async fn test_evict_all_and_drop_destroy_handles() {
        let registry = Arc::new(ResourceRegistry::new());
        let a = registry.create(&SourceFile::new("a.pdf", memory_pdf(&["a1"])));
        let b = registry.create(&SourceFile::new("b.pdf", memory_pdf(&["b1"])));
        let cache = ThumbnailCache::new(MemoryRasterizer::new(), Arc::clone(&registry));

        let doc_a = cache.get_or_open_document(&a, "a").await.unwrap();
        cache.render_thumbnail(&b, "b", 1, 200).await.unwrap();
        cache.evict_all();
        assert!(doc_a.is_destroyed());
        assert!(cache.is_empty());
        assert_eq!(cache.open_document_count(), 0);

        let doc_b = cache.get_or_open_document(&b, "b").await.unwrap();
        drop(cache);
        assert!(doc_b.is_destroyed());
        // Resource handles belong to the registry, not the cache
        assert_eq!(registry.live_count(), 2);
    }
}
