//! Error types for the PDF composer

use thiserror::Error;

/// Result type alias for the PDF composer
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the PDF composer
#[derive(Error, Debug)]
pub enum Error {
    /// Bytes could not be parsed as a document, or its structure is corrupt
    #[error("Invalid PDF document: {reason}")]
    InvalidDocument { reason: String },

    /// Page range falls outside the document
    #[error("Invalid page range {start}-{end}: document has {page_count} pages")]
    InvalidRange {
        start: u32,
        end: u32,
        page_count: u32,
    },

    /// Split requested without any page range
    #[error("No page ranges provided")]
    NoRanges,

    /// Page range expression could not be parsed
    #[error("Malformed page range \"{input}\": {reason}")]
    MalformedRange { input: String, reason: String },

    /// A page could not be copied while composing an output document
    #[error("Failed to copy page {page} from \"{document}\": {reason}")]
    PageCopy {
        document: String,
        page: u32,
        reason: String,
    },

    /// Thumbnail rendering failed for one cache key
    #[error("Failed to render page {page} of document {document_id}: {reason}")]
    Render {
        document_id: String,
        page: u32,
        reason: String,
    },

    /// Merge requested with an empty selection
    #[error("No pages selected for merging")]
    NothingToMerge,

    /// Another export is already running on the staging store
    #[error("An export is already in progress")]
    Busy,

    /// A single upload exceeds the per-file limit
    #[error("File \"{name}\" is too large: {size} bytes (max: {max_size} bytes)")]
    FileTooLarge {
        name: String,
        size: u64,
        max_size: u64,
    },

    /// A batch of uploads exceeds the combined limit
    #[error("Total upload size {size} bytes exceeds {max_size} bytes")]
    TotalSizeExceeded { size: u64, max_size: u64 },

    /// Codec failure outside parsing and page copying (e.g. serialization)
    #[error("PDF codec error: {reason}")]
    Codec { reason: String },

    /// Bitmap encoding failure
    #[error("Image encoding error: {reason}")]
    Encode { reason: String },

    /// Blocking task failed to complete
    #[error("Task join error: {reason}")]
    Join { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive bundling error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    /// Whether the error was raised by input validation, before any output was produced.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange { .. }
                | Error::NoRanges
                | Error::MalformedRange { .. }
                | Error::NothingToMerge
                | Error::FileTooLarge { .. }
                | Error::TotalSizeExceeded { .. }
        )
    }

    /// Wrap any failure as a render error scoped to one thumbnail key.
    pub(crate) fn into_render(self, document_id: &str, page: u32) -> Error {
        match self {
            Error::Render { .. } => self,
            other => Error::Render {
                document_id: document_id.to_string(),
                page,
                reason: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Join {
            reason: err.to_string(),
        }
    }
}
