//! Page-level and whole-document merging

use crate::error::{Error, Result};
use crate::pdf::{DocumentCodec, WriteOptions};
use crate::source::SourceFile;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// One page of one source file, in the position it takes in the output
#[derive(Debug, Clone)]
pub struct PageSelection {
    pub file: SourceFile,
    /// Page number (1-indexed)
    pub page_number: u32,
}

impl PageSelection {
    pub fn new(file: SourceFile, page_number: u32) -> Self {
        Self { file, page_number }
    }
}

/// Copy the selected pages, in order, into a new document.
///
/// Each distinct source buffer is parsed once per call. The whole merge fails
/// on the first page that cannot be copied.
pub fn merge_pages<C: DocumentCodec>(codec: &C, selections: &[PageSelection]) -> Result<Vec<u8>> {
    if selections.is_empty() {
        return Err(Error::NothingToMerge);
    }

    let output = codec.create_document()?;
    let mut sources: HashMap<usize, C::Document> = HashMap::new();

    for selection in selections {
        let source = match sources.entry(selection.file.buffer_id()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let parsed = codec
                    .parse(selection.file.bytes())
                    .map_err(|e| page_copy_error(&selection.file, selection.page_number, e))?;
                entry.insert(parsed)
            }
        };

        codec
            .copy_pages(&output, source, &[selection.page_number])
            .map_err(|e| page_copy_error(&selection.file, selection.page_number, e))?;
    }

    let data = codec.serialize(&output, &WriteOptions::default())?;
    tracing::info!(
        pages = selections.len(),
        sources = sources.len(),
        bytes = data.len(),
        "merged pages"
    );
    Ok(data)
}

/// Concatenate every page of every file, in order
pub fn merge_documents<C: DocumentCodec>(codec: &C, files: &[SourceFile]) -> Result<Vec<u8>> {
    if files.is_empty() {
        return Err(Error::NothingToMerge);
    }

    let output = codec.create_document()?;
    let mut total_pages = 0u32;

    for file in files {
        let source = codec.parse(file.bytes()).map_err(|e| Error::InvalidDocument {
            reason: format!("{}: {}", file.name(), e),
        })?;
        let page_count = codec.page_count(&source)?;

        for page in 1..=page_count {
            codec
                .copy_pages(&output, &source, &[page])
                .map_err(|e| page_copy_error(file, page, e))?;
        }
        total_pages += page_count;
    }

    let data = codec.serialize(&output, &WriteOptions::default())?;
    tracing::info!(
        files = files.len(),
        pages = total_pages,
        bytes = data.len(),
        "merged documents"
    );
    Ok(data)
}

fn page_copy_error(file: &SourceFile, page: u32, err: Error) -> Error {
    tracing::warn!(document = file.name(), page, error = %err, "page copy failed");
    Error::PageCopy {
        document: file.name().to_string(),
        page,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_pdf, page_labels, MemoryCodec};
    use pretty_assertions::assert_eq;

    fn file(name: &str, labels: &[&str]) -> SourceFile {
        SourceFile::new(name, memory_pdf(labels))
    }

    #[test]
    fn test_merge_pages_keeps_selection_order() {
        let codec = MemoryCodec::new();
        let a = file("a.pdf", &["a1", "a2", "a3", "a4"]);
        let b = file("b.pdf", &["b1", "b2"]);

        let selections = vec![
            PageSelection::new(a.clone(), 1),
            PageSelection::new(a.clone(), 2),
            PageSelection::new(b.clone(), 1),
        ];
        let merged = merge_pages(&codec, &selections).unwrap();

        assert_eq!(page_labels(&merged), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_merge_pages_interleaves_and_parses_each_source_once() {
        let codec = MemoryCodec::new();
        let a = file("a.pdf", &["a1", "a2"]);
        let b = file("b.pdf", &["b1", "b2"]);

        let selections = vec![
            PageSelection::new(b.clone(), 2),
            PageSelection::new(a.clone(), 1),
            PageSelection::new(b.clone(), 1),
            PageSelection::new(a.clone(), 2),
            PageSelection::new(a.clone(), 2),
        ];
        let merged = merge_pages(&codec, &selections).unwrap();

        assert_eq!(page_labels(&merged), vec!["b2", "a1", "b1", "a2", "a2"]);
        assert_eq!(codec.parse_count(), 2);
    }

    #[test]
    fn test_same_named_uploads_are_distinct_sources() {
        let codec = MemoryCodec::new();
        let first = file("scan.pdf", &["x1"]);
        let second = file("scan.pdf", &["y1"]);

        let merged = merge_pages(
            &codec,
            &[PageSelection::new(first, 1), PageSelection::new(second, 1)],
        )
        .unwrap();
        assert_eq!(page_labels(&merged), vec!["x1", "y1"]);
    }

    #[test]
    fn test_merge_pages_empty_selection() {
        let result = merge_pages(&MemoryCodec::new(), &[]);
        assert!(matches!(result, Err(Error::NothingToMerge)));
    }

    #[test]
    fn test_merge_pages_out_of_range_names_document_and_page() {
        let codec = MemoryCodec::new();
        let a = file("a.pdf", &["a1", "a2"]);

        let err = merge_pages(
            &codec,
            &[PageSelection::new(a.clone(), 1), PageSelection::new(a, 7)],
        )
        .unwrap_err();

        match err {
            Error::PageCopy { document, page, .. } => {
                assert_eq!(document, "a.pdf");
                assert_eq!(page, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_pages_unparsable_source() {
        let bad = SourceFile::new("broken.pdf", b"%PDF-oops".to_vec());
        let err = merge_pages(&MemoryCodec::new(), &[PageSelection::new(bad, 1)]).unwrap_err();
        assert!(matches!(err, Error::PageCopy { page: 1, .. }));
    }

    #[test]
    fn test_merge_documents_concatenates_in_order() {
        let codec = MemoryCodec::new();
        let merged = merge_documents(
            &codec,
            &[file("a.pdf", &["a1", "a2"]), file("b.pdf", &["b1"])],
        )
        .unwrap();
        assert_eq!(page_labels(&merged), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_merge_documents_failures() {
        let codec = MemoryCodec::new();
        assert!(matches!(
            merge_documents(&codec, &[]),
            Err(Error::NothingToMerge)
        ));

        let err = merge_documents(
            &codec,
            &[file("a.pdf", &["a1"]), file("c.pdf", &["c1", "broken"])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::PageCopy { ref document, page: 2, .. } if document == "c.pdf"));

        let err = merge_documents(
            &codec,
            &[SourceFile::new("notes.txt", b"hello".to_vec())],
        )
        .unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }
}
