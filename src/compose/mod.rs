//! Composition operations
//!
//! Merge, split and compress take explicit inputs and return new serialized
//! documents. None of them touch the staging store.

pub mod compress;
pub mod merge;
pub mod split;

pub use compress::{
    analyze_document, compress_document, compress_document_rasterized, compression_ratio,
    estimate_compressed_size, CompressionAnalysis, CompressionLevel, CompressionOutcome,
    CompressionSettings, CompressionStrategy, LevelEstimate,
};
pub use merge::{merge_documents, merge_pages, PageSelection};
pub use split::split_document;

use crate::error::Result;
use crate::pdf::DocumentCodec;
use crate::source::SourceFile;
use serde::Serialize;

/// Basic facts about a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub page_count: u32,
    pub byte_size: u64,
}

/// Parse `file` and report its page count and size
pub fn document_info<C: DocumentCodec>(codec: &C, file: &SourceFile) -> Result<DocumentInfo> {
    let document = codec.parse(file.bytes())?;
    Ok(DocumentInfo {
        page_count: codec.page_count(&document)?,
        byte_size: file.byte_size(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{memory_pdf, MemoryCodec};

    #[test]
    fn test_document_info() {
        let bytes = memory_pdf(&["a", "b", "c"]);
        let size = bytes.len() as u64;
        let info = document_info(&MemoryCodec::new(), &SourceFile::new("a.pdf", bytes)).unwrap();
        assert_eq!(
            info,
            DocumentInfo {
                page_count: 3,
                byte_size: size
            }
        );
    }

    #[test]
    fn test_document_info_rejects_garbage() {
        let file = SourceFile::new("notes.pdf", b"not a pdf".to_vec());
        let result = document_info(&MemoryCodec::new(), &file);
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
    }
}
