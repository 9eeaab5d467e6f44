//! Command-line surface
//!
//! Each subcommand stages its inputs, runs one composition operation and
//! prints a JSON summary to stdout. Generated files go to `--output-dir`.

use crate::compose::{
    analyze_document, compress_document, compress_document_rasterized, merge_pages,
    split_document, CompressionLevel, PageSelection,
};
use crate::config::ComposerConfig;
use crate::error::Error;
use crate::export::{
    format_bytes, generate_filename, save_buffer, save_staggered, save_zip, NamedBuffer,
};
use crate::pdf::{PdfiumRasterizer, QpdfCodec};
use crate::ranges::{format_ranges, parse_ranges};
use crate::source::{ResourceRegistry, SourceFile};
use crate::staging::StagingStore;
use crate::thumbnail::{Thumbnail, ThumbnailCache};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pdf-composer")]
#[command(about = "Merge, split, compress and preview PDF documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory generated files are written to
    #[arg(short, long, global = true, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show page count and size of documents
    Info {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Merge documents, or selected pages of them, into one
    Merge {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Pages to take, in order, as FILE:RANGES (e.g. --select 2:1 --select 1:1-3,5).
        /// FILE is the 1-based position in the file list. Defaults to every page.
        #[arg(short, long)]
        select: Vec<String>,
    },

    /// Split a document into one file per page range
    Split {
        file: PathBuf,

        /// Page ranges (e.g. "1-5, 8, 10-15")
        #[arg(short, long)]
        ranges: String,

        /// Bundle the outputs into one zip archive
        #[arg(long)]
        zip: bool,
    },

    /// Reduce the size of a document
    Compress {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = LevelArg::Medium)]
        level: LevelArg,

        /// Rebuild pages from JPEG renders instead of re-serializing
        #[arg(long)]
        rasterize: bool,

        /// Only report the estimated output sizes
        #[arg(long)]
        analyze: bool,
    },

    /// Render page thumbnails as base64 PNG
    Thumbnails {
        file: PathBuf,

        /// Thumbnail width in pixels
        #[arg(short, long)]
        width: Option<u32>,

        /// Page ranges to render (default: all pages)
        #[arg(short, long)]
        pages: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LevelArg {
    Low,
    Medium,
    High,
}

impl From<LevelArg> for CompressionLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Low => CompressionLevel::Low,
            LevelArg::Medium => CompressionLevel::Medium,
            LevelArg::High => CompressionLevel::High,
        }
    }
}

#[derive(Debug, Serialize)]
struct FileInfo {
    name: String,
    page_count: u32,
    byte_size: u64,
    size: String,
}

#[derive(Debug, Serialize)]
struct SavedOutput {
    path: PathBuf,
    byte_size: u64,
    size: String,
}

#[derive(Debug, Serialize)]
struct SplitSummary {
    ranges: String,
    outputs: Vec<SavedOutput>,
}

#[derive(Debug, Serialize)]
struct ThumbnailSummary {
    name: String,
    thumbnails: Vec<Thumbnail>,
}

/// Run one parsed command line
pub async fn run(cli: Cli, config: ComposerConfig) -> Result<()> {
    let registry = Arc::new(ResourceRegistry::new());
    let mut store = StagingStore::new(QpdfCodec::new(), Arc::clone(&registry));

    match cli.command {
        Commands::Info { files } => {
            let ids = store.add_files(load_files(&files)?, &config)?;
            let infos: Vec<FileInfo> = ids
                .iter()
                .filter_map(|id| store.document(id))
                .map(|document| FileInfo {
                    name: document.name.clone(),
                    page_count: document.page_count,
                    byte_size: document.byte_size,
                    size: format_bytes(document.byte_size),
                })
                .collect();
            print_json(&infos)
        }

        Commands::Merge { files, select } => {
            let ids = store.add_files(load_files(&files)?, &config)?;
            let selections = if select.is_empty() {
                store.page_selections()
            } else {
                let sources: Vec<SourceFile> = ids
                    .iter()
                    .filter_map(|id| store.document(id))
                    .map(|document| document.source.clone())
                    .collect();
                parse_selections(&select, &sources)?
            };

            store.begin_export()?;
            let merged = merge_pages(store.codec(), &selections);
            store.finish_export();

            ensure_dir(&cli.output_dir)?;
            let name = generate_filename("merged-pdf", "pdf", Utc::now());
            let path = save_buffer(&cli.output_dir, &NamedBuffer::new(name, merged?))?;
            print_json(&saved_output(path)?)
        }

        Commands::Split { file, ranges, zip } => {
            let ranges = parse_ranges(&ranges)?;
            let ids = store.add_files(load_files(std::slice::from_ref(&file))?, &config)?;
            let source = ids
                .first()
                .and_then(|id| store.document(id))
                .map(|document| document.source.clone())
                .context("document was not registered")?;

            store.begin_export()?;
            let outputs = split_document(store.codec(), &source, &ranges);
            store.finish_export();

            let now = Utc::now();
            let buffers: Vec<NamedBuffer> = outputs?
                .into_iter()
                .enumerate()
                .map(|(index, data)| {
                    let prefix = format!("split-{}", index + 1);
                    NamedBuffer::new(generate_filename(&prefix, "pdf", now), data)
                })
                .collect();

            ensure_dir(&cli.output_dir)?;
            let paths = if zip {
                let zip_name = generate_filename("split-pdfs", "zip", now);
                vec![save_zip(&cli.output_dir, &buffers, &zip_name)?]
            } else {
                save_staggered(&cli.output_dir, &buffers, config.stagger_delay).await?
            };

            let outputs = paths
                .into_iter()
                .map(saved_output)
                .collect::<Result<Vec<_>>>()?;
            print_json(&SplitSummary {
                ranges: format_ranges(&ranges),
                outputs,
            })
        }

        Commands::Compress {
            file,
            level,
            rasterize,
            analyze,
        } => {
            let level = CompressionLevel::from(level);
            let source = SourceFile::from_path(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            store.add_files(vec![source.clone()], &config)?;

            if analyze {
                return print_json(&analyze_document(store.codec(), &source)?);
            }

            let outcome = if rasterize {
                let pdfium = rasterizer(&config);
                compress_document_rasterized(
                    store.codec(),
                    &pdfium,
                    &source,
                    level,
                    |percent, status| tracing::info!(percent, "{}", status),
                )
                .await?
            } else {
                compress_document(store.codec(), &source, level)?
            };

            ensure_dir(&cli.output_dir)?;
            let name = generate_filename("compressed-pdf", "pdf", Utc::now());
            let path = save_buffer(&cli.output_dir, &NamedBuffer::new(name, outcome.data.clone()))?;
            tracing::info!(
                original = %format_bytes(outcome.original_size),
                compressed = %format_bytes(outcome.compressed_size),
                ratio = outcome.ratio,
                path = %path.display(),
                "compression finished"
            );
            print_json(&outcome)
        }

        Commands::Thumbnails { file, width, pages } => {
            let width = width.unwrap_or(config.thumbnail_width);
            let wanted = pages.as_deref().map(parse_ranges).transpose()?;
            let ids = store.add_files(load_files(std::slice::from_ref(&file))?, &config)?;

            let cache = match config.max_thumbnails {
                Some(max) => ThumbnailCache::with_max_entries(rasterizer(&config), registry, max),
                None => ThumbnailCache::new(rasterizer(&config), registry),
            };

            let mut summaries = Vec::new();
            for id in &ids {
                let Some(handle) = store.resource_handle(id).cloned() else {
                    continue;
                };
                let references: Vec<u32> = store
                    .pages()
                    .iter()
                    .filter(|page| &page.document_id == id)
                    .map(|page| page.page_number)
                    .filter(|&page| match &wanted {
                        Some(ranges) => ranges.iter().any(|range| range.contains(page)),
                        None => true,
                    })
                    .collect();

                let mut thumbnails = Vec::with_capacity(references.len());
                for page in references {
                    let thumbnail = cache.render_thumbnail(&handle, id, page, width).await?;
                    thumbnails.push(Thumbnail::clone(&thumbnail));
                }

                cache.evict_document(id);
                summaries.push(ThumbnailSummary {
                    name: store.document(id).map(|d| d.name.clone()).unwrap_or_default(),
                    thumbnails,
                });
                store.remove_document(id);
            }
            print_json(&summaries)
        }
    }
}

/// Process exit status for a failed run: 2 when the input was rejected, 1 otherwise
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(err) if err.is_validation() => 2,
        _ => 1,
    }
}

fn rasterizer(config: &ComposerConfig) -> PdfiumRasterizer {
    match &config.pdfium_dir {
        Some(dir) => PdfiumRasterizer::with_library_dir(dir),
        None => PdfiumRasterizer::new(),
    }
}

fn load_files(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            SourceFile::from_path(path).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

/// Expand `FILE:RANGES` entries into page selections over `sources`
fn parse_selections(entries: &[String], sources: &[SourceFile]) -> Result<Vec<PageSelection>> {
    let mut selections = Vec::new();
    for entry in entries {
        let Some((file, ranges)) = entry.split_once(':') else {
            bail!("Invalid selection \"{}\": expected FILE:RANGES", entry);
        };
        let index: usize = file
            .trim()
            .parse()
            .with_context(|| format!("Invalid file number in \"{}\"", entry))?;
        let source = index
            .checked_sub(1)
            .and_then(|i| sources.get(i))
            .with_context(|| format!("No file number {} (got {} files)", index, sources.len()))?;

        for range in parse_ranges(ranges)? {
            selections.extend(range.pages().map(|page| PageSelection::new(source.clone(), page)));
        }
    }
    Ok(selections)
}

fn saved_output(path: PathBuf) -> Result<SavedOutput> {
    let byte_size = std::fs::metadata(&path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    Ok(SavedOutput {
        path,
        byte_size,
        size: format_bytes(byte_size),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_split() {
        let cli = Cli::parse_from([
            "pdf-composer",
            "split",
            "report.pdf",
            "--ranges",
            "1-3, 5",
            "--zip",
            "-o",
            "out",
        ]);
        assert_eq!(cli.output_dir, PathBuf::from("out"));
        match cli.command {
            Commands::Split { file, ranges, zip } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(ranges, "1-3, 5");
                assert!(zip);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_compress_defaults_to_medium() {
        let cli = Cli::parse_from(["pdf-composer", "compress", "a.pdf"]);
        match cli.command {
            Commands::Compress {
                level, rasterize, ..
            } => {
                assert_eq!(CompressionLevel::from(level), CompressionLevel::Medium);
                assert!(!rasterize);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exit_code_separates_rejected_input() {
        assert_eq!(exit_code(&anyhow::Error::from(Error::NoRanges)), 2);

        let over_limit = anyhow::Error::from(Error::TotalSizeExceeded {
            size: 10,
            max_size: 5,
        })
        .context("Failed to stage uploads");
        assert_eq!(exit_code(&over_limit), 2);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(exit_code(&anyhow::Error::from(Error::Io(io))), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("Invalid selection")), 1);
    }

    #[test]
    fn test_parse_selections() {
        let a = SourceFile::new("a.pdf", b"%PDF-a".to_vec());
        let b = SourceFile::new("b.pdf", b"%PDF-b".to_vec());
        let sources = vec![a, b];

        let entries = vec!["2:1".to_string(), "1:1-2,4".to_string()];
        let selections = parse_selections(&entries, &sources).unwrap();
        let picked: Vec<(&str, u32)> = selections
            .iter()
            .map(|s| (s.file.name(), s.page_number))
            .collect();
        assert_eq!(
            picked,
            vec![("b.pdf", 1), ("a.pdf", 1), ("a.pdf", 2), ("a.pdf", 4)]
        );

        assert!(parse_selections(&["3:1".to_string()], &sources).is_err());
        assert!(parse_selections(&["1".to_string()], &sources).is_err());
        assert!(parse_selections(&["1:0".to_string()], &sources).is_err());
    }
}
