//! PDF processing layer
//!
//! This module defines the codec and rasterizer seams and their qpdf and
//! PDFium implementations.

mod codec;
mod qpdf;
mod render;

pub use codec::{DocumentCodec, JpegPage, PageSize, Rasterizer, WriteOptions};
pub use qpdf::QpdfCodec;
pub use render::{PdfiumDocument, PdfiumRasterizer};
