//! qpdf-backed document codec
//!
//! Parsing, page copying and serialization go through the qpdf crate (vendored
//! FFI). A `QPdf` handle is not thread-safe, so callers keep each handle on the
//! thread that created it.

use crate::error::{Error, Result};
use crate::pdf::codec::{DocumentCodec, JpegPage, WriteOptions};
use qpdf::{ObjectStreamMode, QPdf, QPdfDictionary, QPdfObject};

/// Document information dictionary keys removed by [`DocumentCodec::strip_metadata`]
const INFO_KEYS: [&str; 8] = [
    "/Title",
    "/Author",
    "/Subject",
    "/Keywords",
    "/Creator",
    "/Producer",
    "/CreationDate",
    "/ModDate",
];

/// Document codec using qpdf
#[derive(Debug, Clone, Copy, Default)]
pub struct QpdfCodec;

/// Map qpdf crate errors to our error types
fn codec_error(e: qpdf::QPdfError) -> Error {
    Error::Codec {
        reason: e.to_string(),
    }
}

impl QpdfCodec {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentCodec for QpdfCodec {
    type Document = QPdf;

    fn parse(&self, bytes: &[u8]) -> Result<QPdf> {
        if bytes.len() < 4 || &bytes[0..4] != b"%PDF" {
            return Err(Error::InvalidDocument {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let document = QPdf::read_from_memory(bytes).map_err(|e| Error::InvalidDocument {
            reason: e.to_string(),
        })?;

        // Walk the page tree once so structural damage surfaces here, not mid-copy
        document
            .get_num_pages()
            .map_err(|e| Error::InvalidDocument {
                reason: e.to_string(),
            })?;

        Ok(document)
    }

    fn page_count(&self, document: &QPdf) -> Result<u32> {
        document.get_num_pages().map_err(codec_error)
    }

    fn create_document(&self) -> Result<QPdf> {
        Ok(QPdf::empty())
    }

    fn copy_pages(&self, dest: &QPdf, source: &QPdf, page_numbers: &[u32]) -> Result<()> {
        let page_count = source.get_num_pages().map_err(codec_error)?;

        for &page_number in page_numbers {
            let page = page_number
                .checked_sub(1)
                .filter(|_| page_number <= page_count)
                .and_then(|idx| source.get_page(idx))
                .ok_or(Error::InvalidRange {
                    start: page_number,
                    end: page_number,
                    page_count,
                })?;

            let copied = dest.copy_from_foreign(&page);
            dest.add_page(&copied, false).map_err(codec_error)?;
        }

        Ok(())
    }

    fn add_image_page(&self, dest: &QPdf, page: &JpegPage) -> Result<()> {
        let image = dest.new_stream(&page.data);
        let image_dict = image.get_dictionary();
        image_dict.set("/Type", dest.new_name("/XObject"));
        image_dict.set("/Subtype", dest.new_name("/Image"));
        image_dict.set("/Width", dest.new_integer(i64::from(page.pixel_width)));
        image_dict.set("/Height", dest.new_integer(i64::from(page.pixel_height)));
        image_dict.set("/ColorSpace", dest.new_name("/DeviceRGB"));
        image_dict.set("/BitsPerComponent", dest.new_integer(8));
        image_dict.set("/Filter", dest.new_name("/DCTDecode"));

        let width = page.page_size.width;
        let height = page.page_size.height;

        let contents =
            dest.new_stream(format!("q {:.2} 0 0 {:.2} 0 0 cm /Im0 Do Q", width, height).as_bytes());
        let media_box = dest
            .parse_object(&format!("[0 0 {:.2} {:.2}]", width, height))
            .map_err(codec_error)?;

        let xobjects = dest.new_dictionary_from([("/Im0", QPdfObject::from(image).into_indirect())]);
        let resources = dest.new_dictionary_from([("/XObject", QPdfObject::from(xobjects))]);

        let page_dict = dest.new_dictionary_from([
            ("/Type", dest.new_name("/Page")),
            ("/MediaBox", media_box),
            ("/Resources", QPdfObject::from(resources)),
            ("/Contents", QPdfObject::from(contents).into_indirect()),
        ]);

        dest.add_page(&QPdfObject::from(page_dict).into_indirect(), false)
            .map_err(codec_error)
    }

    fn strip_metadata(&self, document: &QPdf) -> Result<()> {
        if let Some(trailer) = document.get_trailer() {
            if let Some(info) = trailer.get("/Info") {
                let info = QPdfDictionary::from(info);
                for key in INFO_KEYS {
                    info.remove(key);
                }
            }
        }

        // XMP packet duplicates the info dictionary
        if let Some(root) = document.get_root() {
            root.remove("/Metadata");
        }

        Ok(())
    }

    fn serialize(&self, document: &QPdf, options: &WriteOptions) -> Result<Vec<u8>> {
        let os_mode = if options.object_streams {
            ObjectStreamMode::Generate
        } else {
            ObjectStreamMode::Preserve
        };

        let mut writer = document.writer();
        writer
            .object_stream_mode(os_mode)
            .compress_streams(options.compress_streams)
            .preserve_unreferenced_objects(!options.prune_unreferenced)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(codec_error)
    }
}
