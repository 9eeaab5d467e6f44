//! Document staging store
//!
//! Holds the uploaded documents of one editing session and a single ordered
//! list of page references spanning all of them. The list order is the
//! composition being built.
//!
//! Every successful [`StagingStore::add_document`] owns one resource handle,
//! released by [`StagingStore::remove_document`] or [`StagingStore::clear`].
//! Dropping the store clears it.

use crate::compose::PageSelection;
use crate::config::ComposerConfig;
use crate::error::{Error, Result};
use crate::pdf::DocumentCodec;
use crate::source::{
    validate_file_size, validate_pdf_file, validate_total_size, ResourceHandle, ResourceRegistry,
    SourceFile,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// One registered upload
#[derive(Debug)]
pub struct CachedDocument {
    pub id: String,
    pub name: String,
    pub byte_size: u64,
    pub resource_handle: ResourceHandle,
    pub page_count: u32,
    /// Original upload, kept for composition
    pub source: SourceFile,
    pub created_at: Instant,
}

/// One page of one registered document, placed in the composition order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReference {
    pub id: String,
    pub document_id: String,
    /// Page number within the source document (1-indexed)
    pub page_number: u32,
}

pub struct StagingStore<C: DocumentCodec> {
    codec: C,
    registry: Arc<ResourceRegistry>,
    documents: HashMap<String, CachedDocument>,
    /// Document ids in registration order
    document_order: Vec<String>,
    pages: Vec<PageReference>,
    busy: bool,
}

impl<C: DocumentCodec> StagingStore<C> {
    pub fn new(codec: C, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            codec,
            registry,
            documents: HashMap::new(),
            document_order: Vec::new(),
            pages: Vec::new(),
            busy: false,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Register `file` and append one page reference per page.
    ///
    /// Fails with `InvalidDocument` when the codec rejects the bytes; the
    /// store is then left unchanged and the handle already released.
    pub fn add_document(&mut self, file: SourceFile) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = self.registry.create(&file);

        let page_count = match self.read_page_count(&file) {
            Ok(count) => count,
            Err(e) => {
                self.registry.release(&handle);
                tracing::warn!(name = file.name(), error = %e, "rejected document");
                return Err(match e {
                    Error::InvalidDocument { .. } => e,
                    other => Error::InvalidDocument {
                        reason: format!("{}: {}", file.name(), other),
                    },
                });
            }
        };

        self.pages.extend((1..=page_count).map(|page_number| PageReference {
            id: format!("{}-page-{}", id, page_number),
            document_id: id.clone(),
            page_number,
        }));

        tracing::info!(
            document_id = %id,
            name = file.name(),
            pages = page_count,
            bytes = file.byte_size(),
            "registered document"
        );

        self.document_order.push(id.clone());
        self.documents.insert(
            id.clone(),
            CachedDocument {
                id: id.clone(),
                name: file.name().to_string(),
                byte_size: file.byte_size(),
                resource_handle: handle,
                page_count,
                source: file,
                created_at: Instant::now(),
            },
        );

        Ok(id)
    }

    fn read_page_count(&self, file: &SourceFile) -> Result<u32> {
        let document = self.codec.parse(file.bytes())?;
        self.codec.page_count(&document)
    }

    /// Validate a batch of uploads against the configured limits, then register them all.
    ///
    /// The total size limit covers the documents already staged plus the batch.
    /// Nothing is registered if any file is rejected.
    pub fn add_files(
        &mut self,
        files: Vec<SourceFile>,
        config: &ComposerConfig,
    ) -> Result<Vec<String>> {
        validate_total_size(self.staged_bytes(), &files, config.max_total_size)?;
        for file in &files {
            if !validate_pdf_file(file) {
                return Err(Error::InvalidDocument {
                    reason: format!("{} is not a PDF file", file.name()),
                });
            }
            validate_file_size(file, config.max_file_size)?;
        }

        let mut added = Vec::with_capacity(files.len());
        for file in files {
            match self.add_document(file) {
                Ok(id) => added.push(id),
                Err(e) => {
                    for id in &added {
                        self.remove_document(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(added)
    }

    /// Release a document's handle and drop all of its page references.
    ///
    /// Other references keep their relative order. Returns `false` for an unknown id.
    pub fn remove_document(&mut self, document_id: &str) -> bool {
        let Some(document) = self.documents.remove(document_id) else {
            return false;
        };

        self.registry.release(&document.resource_handle);
        self.document_order.retain(|id| id != document_id);
        self.pages.retain(|page| page.document_id != document_id);

        tracing::info!(document_id, name = %document.name, "removed document");
        true
    }

    /// Move the reference at `from` to position `to`.
    ///
    /// Returns `false` without changing anything if either index is out of bounds.
    pub fn reorder_page(&mut self, from: usize, to: usize) -> bool {
        if from >= self.pages.len() || to >= self.pages.len() {
            return false;
        }
        let page = self.pages.remove(from);
        self.pages.insert(to, page);
        true
    }

    /// Remove one page reference; its document stays registered.
    pub fn remove_page(&mut self, page_id: &str) -> bool {
        match self.pages.iter().position(|page| page.id == page_id) {
            Some(index) => {
                self.pages.remove(index);
                true
            }
            None => false,
        }
    }

    /// Release every handle and empty the store
    pub fn clear(&mut self) {
        for document in self.documents.values() {
            self.registry.release(&document.resource_handle);
        }
        if !self.documents.is_empty() {
            tracing::debug!(documents = self.documents.len(), "cleared staging store");
        }
        self.documents.clear();
        self.document_order.clear();
        self.pages.clear();
        self.busy = false;
    }

    pub fn document(&self, document_id: &str) -> Option<&CachedDocument> {
        self.documents.get(document_id)
    }

    pub fn resource_handle(&self, document_id: &str) -> Option<&ResourceHandle> {
        self.documents
            .get(document_id)
            .map(|document| &document.resource_handle)
    }

    /// Registered documents, oldest first
    pub fn documents(&self) -> Vec<&CachedDocument> {
        self.document_order
            .iter()
            .filter_map(|id| self.documents.get(id))
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Combined size of every registered upload
    pub fn staged_bytes(&self) -> u64 {
        self.documents.values().map(|document| document.byte_size).sum()
    }

    /// The composition order
    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    /// The composition order as merge input
    pub fn page_selections(&self) -> Vec<PageSelection> {
        self.pages
            .iter()
            .filter_map(|page| {
                self.documents
                    .get(&page.document_id)
                    .map(|document| PageSelection::new(document.source.clone(), page.page_number))
            })
            .collect()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Mark an export as running; fails with `Busy` if one already is.
    pub fn begin_export(&mut self) -> Result<()> {
        if self.busy {
            return Err(Error::Busy);
        }
        self.busy = true;
        Ok(())
    }

    pub fn finish_export(&mut self) {
        self.busy = false;
    }
}

impl<C: DocumentCodec> Drop for StagingStore<C> {
    fn drop(&mut self) {
        self.clear();
    }
}
