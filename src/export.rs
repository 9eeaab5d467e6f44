//! Saving composed outputs
//!
//! Single saves, staggered saves of several files and zip bundles, plus the
//! naming conventions for generated files.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A serialized output and the file name it is saved under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBuffer {
    pub name: String,
    pub data: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// `<prefix>-YYYY-MM-DDTHH-MM-SS.<extension>`
pub fn generate_filename(prefix: &str, extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        now.format("%Y-%m-%dT%H-%M-%S"),
        extension
    )
}

/// Human-readable size with binary units, e.g. "1.5 MB"
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{}", extension);
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

/// Write one PDF into `dir`, appending `.pdf` to the name if missing
pub fn save_buffer(dir: &Path, buffer: &NamedBuffer) -> Result<PathBuf> {
    let path = dir.join(with_extension(&buffer.name, "pdf"));
    std::fs::write(&path, &buffer.data)?;
    tracing::info!(path = %path.display(), bytes = buffer.data.len(), "saved file");
    Ok(path)
}

/// Write several PDFs into `dir` one after another, pausing `delay` between saves
pub async fn save_staggered(
    dir: &Path,
    buffers: &[NamedBuffer],
    delay: Duration,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(buffers.len());
    for (index, buffer) in buffers.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(delay).await;
        }
        let path = dir.join(with_extension(&buffer.name, "pdf"));
        tokio::fs::write(&path, &buffer.data).await?;
        tracing::debug!(path = %path.display(), "saved file");
        paths.push(path);
    }
    tracing::info!(files = paths.len(), dir = %dir.display(), "saved files");
    Ok(paths)
}

/// Bundle PDFs into one zip archive, appending `.pdf` to member names lacking it
pub fn bundle_zip(buffers: &[NamedBuffer]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for buffer in buffers {
        zip.start_file(with_extension(&buffer.name, "pdf"), options)?;
        zip.write_all(&buffer.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Bundle PDFs and write the archive into `dir` as `<zip_name>.zip`
pub fn save_zip(dir: &Path, buffers: &[NamedBuffer], zip_name: &str) -> Result<PathBuf> {
    let archive = bundle_zip(buffers)?;
    let path = dir.join(with_extension(zip_name, "zip"));
    std::fs::write(&path, &archive)?;
    tracing::info!(
        path = %path.display(),
        members = buffers.len(),
        bytes = archive.len(),
        "saved archive"
    );
    Ok(path)
}
