//! Splitting a document by page ranges

use crate::error::{Error, Result};
use crate::pdf::{DocumentCodec, WriteOptions};
use crate::ranges::PageRange;
use crate::source::SourceFile;

/// Produce one document per range, in range order.
///
/// Every range is checked against the real page count before any output is
/// built. Overlapping ranges are allowed and each yields its own output.
pub fn split_document<C: DocumentCodec>(
    codec: &C,
    file: &SourceFile,
    ranges: &[PageRange],
) -> Result<Vec<Vec<u8>>> {
    if ranges.is_empty() {
        return Err(Error::NoRanges);
    }

    let source = codec.parse(file.bytes())?;
    let page_count = codec.page_count(&source)?;

    if let Some(bad) = ranges.iter().find(|range| !range.fits(page_count)) {
        return Err(Error::InvalidRange {
            start: bad.start,
            end: bad.end,
            page_count,
        });
    }

    let mut outputs = Vec::with_capacity(ranges.len());
    for range in ranges {
        let output = codec.create_document()?;
        let pages: Vec<u32> = range.pages().collect();

        codec
            .copy_pages(&output, &source, &pages)
            .map_err(|e| Error::PageCopy {
                document: file.name().to_string(),
                page: range.start,
                reason: format!("range {}: {}", range, e),
            })?;

        outputs.push(codec.serialize(&output, &WriteOptions::default())?);
    }

    tracing::info!(
        document = file.name(),
        ranges = ranges.len(),
        page_count,
        "split document"
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::parse_ranges;
    use crate::testing::{memory_pdf, page_labels, MemoryCodec};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ten_pages() -> SourceFile {
        let labels: Vec<String> = (1..=10).map(|n| format!("p{}", n)).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        SourceFile::new("ten.pdf", memory_pdf(&labels))
    }

    #[test]
    fn test_identity_split() {
        let file = ten_pages();
        let outputs =
            split_document(&MemoryCodec::new(), &file, &[PageRange::new(1, 10)]).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(page_labels(&outputs[0]).len(), 10);
    }

    #[test]
    fn test_one_output_per_range_in_range_order() {
        let file = ten_pages();
        let ranges = parse_ranges("8-9, 1-2, 5").unwrap();
        let outputs = split_document(&MemoryCodec::new(), &file, &ranges).unwrap();

        let labels: Vec<Vec<String>> = outputs.iter().map(|o| page_labels(o)).collect();
        assert_eq!(
            labels,
            vec![
                vec!["p8".to_string(), "p9".to_string()],
                vec!["p1".to_string(), "p2".to_string()],
                vec!["p5".to_string()],
            ]
        );
    }

    #[test]
    fn test_overlapping_ranges_are_independent() {
        let file = ten_pages();
        let ranges = parse_ranges("1-3, 2-4").unwrap();
        let outputs = split_document(&MemoryCodec::new(), &file, &ranges).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(page_labels(&outputs[1]), vec!["p2", "p3", "p4"]);
    }

    #[rstest]
    #[case(PageRange::new(2, 12))]
    #[case(PageRange::new(11, 11))]
    #[case(PageRange::new(0, 3))]
    #[case(PageRange::new(5, 4))]
    fn test_invalid_range_fails_before_output(#[case] bad: PageRange) {
        let codec = MemoryCodec::new();
        let err = split_document(&codec, &ten_pages(), &[PageRange::new(1, 2), bad]).unwrap_err();

        match err {
            Error::InvalidRange {
                start,
                end,
                page_count,
            } => {
                assert_eq!((start, end), (bad.start, bad.end));
                assert_eq!(page_count, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_ranges() {
        let result = split_document(&MemoryCodec::new(), &ten_pages(), &[]);
        assert!(matches!(result, Err(Error::NoRanges)));
    }

    #[test]
    fn test_unparsable_document() {
        let file = SourceFile::new("bad.pdf", b"garbage".to_vec());
        let result = split_document(&MemoryCodec::new(), &file, &[PageRange::single(1)]);
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
    }
}
