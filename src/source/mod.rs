//! Source files and their resource handles

pub mod file;
pub mod resources;

pub use file::{validate_file_size, validate_pdf_file, validate_total_size, SourceFile};
pub use resources::{ResourceHandle, ResourceRegistry};
