//! PDF Composer Library
//!
//! Staging, page composition and thumbnail caching for multi-file PDF work:
//! - `staging`: uploaded documents and the cross-document page order
//! - `thumbnail`: cached page renders and opened document handles
//! - `compose`: merge, split and compress operations
//! - `ranges`: page range expressions
//! - `export`: output naming, saving and zip bundling

pub mod cli;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod pdf;
pub mod ranges;
pub mod source;
pub mod staging;
pub mod thumbnail;

#[cfg(any(test, feature = "test_utils"))]
pub mod testing;

pub use config::ComposerConfig;
pub use error::{Error, Result};
pub use ranges::{format_ranges, parse_ranges, PageRange};
pub use staging::{CachedDocument, PageReference, StagingStore};
pub use thumbnail::{Thumbnail, ThumbnailCache, ThumbnailKey};
