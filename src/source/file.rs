//! Uploaded source files and upload validation

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// An uploaded file: a display name plus its raw bytes.
///
/// Cloning is cheap; clones share the same byte buffer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, named after its file name component
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn has_pdf_header(&self) -> bool {
        self.bytes.len() >= 4 && &self.bytes[0..4] == b"%PDF"
    }

    /// Identity of the underlying buffer; clones of one upload share it
    pub(crate) fn buffer_id(&self) -> usize {
        self.bytes.as_ptr() as usize
    }
}

/// Whether a file looks like a PDF, by extension or by header
pub fn validate_pdf_file(file: &SourceFile) -> bool {
    file.name.to_lowercase().ends_with(".pdf") || file.has_pdf_header()
}

/// Reject a single file larger than `max_size` bytes
pub fn validate_file_size(file: &SourceFile, max_size: u64) -> Result<()> {
    if file.byte_size() > max_size {
        return Err(Error::FileTooLarge {
            name: file.name.clone(),
            size: file.byte_size(),
            max_size,
        });
    }
    Ok(())
}

/// Reject a batch that would bring the session past `max_size` bytes.
///
/// `staged` is the size of what the session already holds.
pub fn validate_total_size(staged: u64, files: &[SourceFile], max_size: u64) -> Result<()> {
    let total = staged + files.iter().map(SourceFile::byte_size).sum::<u64>();
    if total > max_size {
        return Err(Error::TotalSizeExceeded {
            size: total,
            max_size,
        });
    }
    Ok(())
}
