//! PDFium-backed rasterizer
//!
//! PDFium is not thread-safe and its documents cannot leave the thread that
//! loaded them. One render thread per rasterizer owns the bound library and
//! every loaded document; async callers talk to it over a job channel. A
//! document is parsed once at `open` and stays loaded until `destroy`.

use crate::error::{Error, Result};
use crate::pdf::codec::{PageSize, Rasterizer};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use tokio::sync::oneshot;

/// Bind a PDFium instance, trying `library_dir` before the default locations
fn create_pdfium(library_dir: Option<&Path>) -> Result<Pdfium> {
    let mut search_dirs: Vec<PathBuf> = Vec::new();
    if let Some(dir) = library_dir {
        search_dirs.push(dir.to_path_buf());
    }
    search_dirs.push(PathBuf::from("./"));
    search_dirs.push(PathBuf::from("/opt/pdfium/lib"));

    let found = search_dirs.iter().find_map(|dir| {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)).ok()
    });

    let bindings = match found {
        Some(bindings) => bindings,
        None => Pdfium::bind_to_system_library().map_err(|e| Error::Codec {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?,
    };

    Ok(Pdfium::new(bindings))
}

/// Map PDFium load errors to our error type
fn map_load_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::InvalidDocument {
                reason: "PDF is password protected".to_string(),
            }
        }
        _ => Error::InvalidDocument {
            reason: format!("{}", err),
        },
    }
}

fn render_page(document: &PdfDocument<'_>, page_number: u32, scale: f32) -> Result<DynamicImage> {
    let pages = document.pages();
    let page = pages
        .get((page_number - 1) as u16)
        .map_err(|e| Error::Codec {
            reason: format!("Failed to get page {}: {}", page_number, e),
        })?;

    let config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .render_form_data(true)
        .render_annotations(true);

    let bitmap = page.render_with_config(&config).map_err(|e| Error::Codec {
        reason: format!("Failed to render page {}: {}", page_number, e),
    })?;

    Ok(bitmap.as_image())
}

/// Work sent to the render thread
enum Job {
    Open {
        id: u64,
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<PageSize>>>,
    },
    Render {
        id: u64,
        page_number: u32,
        scale: f32,
        reply: oneshot::Sender<Result<DynamicImage>>,
    },
    Close {
        id: u64,
    },
}

impl Job {
    fn reject(self, reason: &str) {
        let err = || Error::Codec {
            reason: reason.to_string(),
        };
        match self {
            Job::Open { reply, .. } => {
                let _ = reply.send(Err(err()));
            }
            Job::Render { reply, .. } => {
                let _ = reply.send(Err(err()));
            }
            Job::Close { .. } => {}
        }
    }
}

/// Serve jobs until every sender is gone.
///
/// `load` parses bytes into a backend document; `render` draws one page of it.
/// Loaded documents live in this frame, keyed by handle id, until closed.
fn serve_jobs<D>(
    jobs: mpsc::Receiver<Job>,
    mut load: impl FnMut(Vec<u8>) -> Result<(D, Vec<PageSize>)>,
    mut render: impl FnMut(&D, u32, f32) -> Result<DynamicImage>,
) {
    let mut documents: HashMap<u64, D> = HashMap::new();

    for job in jobs {
        match job {
            Job::Open { id, bytes, reply } => {
                let result = load(bytes).map(|(document, sizes)| {
                    documents.insert(id, document);
                    sizes
                });
                let _ = reply.send(result);
            }
            Job::Render {
                id,
                page_number,
                scale,
                reply,
            } => {
                let result = match documents.get(&id) {
                    Some(document) => render(document, page_number, scale),
                    None => Err(Error::Codec {
                        reason: "document handle has been destroyed".to_string(),
                    }),
                };
                let _ = reply.send(result);
            }
            Job::Close { id } => {
                documents.remove(&id);
            }
        }
    }

    tracing::debug!(open = documents.len(), "render thread stopped");
}

fn run_pdfium(library_dir: Option<PathBuf>, jobs: mpsc::Receiver<Job>) {
    let pdfium = match create_pdfium(library_dir.as_deref()) {
        Ok(pdfium) => pdfium,
        Err(e) => {
            let reason = e.to_string();
            tracing::error!(error = %reason, "render thread has no PDFium library");
            for job in jobs {
                job.reject(&reason);
            }
            return;
        }
    };

    serve_jobs(
        jobs,
        |bytes| {
            let document = pdfium
                .load_pdf_from_byte_vec(bytes, None)
                .map_err(map_load_error)?;
            let sizes: Vec<PageSize> = document
                .pages()
                .iter()
                .map(|page| PageSize::new(page.width().value, page.height().value))
                .collect();
            Ok((document, sizes))
        },
        render_page,
    );
}

/// Client side of one render thread
#[derive(Debug)]
struct RenderWorker {
    jobs: mpsc::Sender<Job>,
    next_id: AtomicU64,
}

impl RenderWorker {
    fn spawn_with<F>(serve: F) -> Arc<Self>
    where
        F: FnOnce(mpsc::Receiver<Job>) + Send + 'static,
    {
        let (jobs, receiver) = mpsc::channel();
        if let Err(e) = std::thread::Builder::new()
            .name("pdfium-render".to_string())
            .spawn(move || serve(receiver))
        {
            tracing::error!(error = %e, "failed to start render thread");
        }

        Arc::new(Self {
            jobs,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T>(&self, job: impl FnOnce(oneshot::Sender<Result<T>>) -> Job) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.jobs.send(job(reply)).map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }

    fn close(&self, id: u64) {
        let _ = self.jobs.send(Job::Close { id });
    }
}

fn worker_gone() -> Error {
    Error::Codec {
        reason: "render thread is not running".to_string(),
    }
}

/// Rasterizer that renders pages with PDFium on a dedicated thread.
///
/// Clones share the thread and its loaded documents.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    worker: Arc<RenderWorker>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::spawn(None)
    }

    /// Look for the PDFium shared library in `dir` before the default locations
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self::spawn(Some(dir.into()))
    }

    fn spawn(library_dir: Option<PathBuf>) -> Self {
        Self {
            worker: RenderWorker::spawn_with(move |jobs| run_pdfium(library_dir, jobs)),
        }
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a document loaded on the render thread
#[derive(Debug)]
pub struct PdfiumDocument {
    id: u64,
    page_sizes: Vec<PageSize>,
    destroyed: AtomicBool,
    worker: Arc<RenderWorker>,
}

impl PdfiumDocument {
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.worker.close(self.id);
        }
    }
}

impl Drop for PdfiumDocument {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    type Document = PdfiumDocument;

    async fn open(&self, bytes: Arc<[u8]>) -> Result<PdfiumDocument> {
        if bytes.len() < 4 || &bytes[0..4] != b"%PDF" {
            return Err(Error::InvalidDocument {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let id = self.worker.next_id.fetch_add(1, Ordering::Relaxed);
        let page_sizes = self
            .worker
            .request(|reply| Job::Open {
                id,
                bytes: bytes.to_vec(),
                reply,
            })
            .await?;

        tracing::debug!(id, pages = page_sizes.len(), "opened document with PDFium");

        Ok(PdfiumDocument {
            id,
            page_sizes,
            destroyed: AtomicBool::new(false),
            worker: Arc::clone(&self.worker),
        })
    }

    fn page_count(&self, document: &PdfiumDocument) -> u32 {
        document.page_sizes.len() as u32
    }

    fn page_size(&self, document: &PdfiumDocument, page_number: u32) -> Result<PageSize> {
        page_number
            .checked_sub(1)
            .and_then(|idx| document.page_sizes.get(idx as usize))
            .copied()
            .ok_or(Error::InvalidRange {
                start: page_number,
                end: page_number,
                page_count: document.page_sizes.len() as u32,
            })
    }

    async fn render(
        &self,
        document: &PdfiumDocument,
        page_number: u32,
        scale: f32,
    ) -> Result<DynamicImage> {
        self.page_size(document, page_number)?;
        if document.is_destroyed() {
            return Err(Error::Codec {
                reason: "document handle has been destroyed".to_string(),
            });
        }

        let id = document.id;
        document
            .worker
            .request(|reply| Job::Render {
                id,
                page_number,
                scale,
                reply,
            })
            .await
    }

    fn destroy(&self, document: &PdfiumDocument) {
        document.close();
    }
}
