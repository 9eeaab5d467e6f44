//! Page range expressions
//!
//! Ranges are 1-indexed and inclusive. Parsing only checks the syntax and that
//! every bound is at least 1; checking against a document's real page count is
//! left to the operation consuming the ranges.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Inclusive, 1-indexed page range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }

    /// Number of pages covered
    pub fn page_count(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    /// Whether the range addresses real pages of a `page_count`-page document
    pub fn fits(&self, page_count: u32) -> bool {
        self.start >= 1 && self.start <= self.end && self.end <= page_count
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parse a comma-separated range expression (e.g., "1-5, 8, 10-15").
///
/// Tokens keep their input order; overlapping tokens are neither merged nor
/// deduplicated.
pub fn parse_ranges(input: &str) -> Result<Vec<PageRange>> {
    if input.trim().is_empty() {
        return Err(malformed(input, "page ranges cannot be empty"));
    }

    let mut ranges = Vec::new();

    for part in input.split(',') {
        let part = part.trim();

        let range = if let Some((start, end)) = part.split_once('-') {
            let start = parse_bound(start, part)?;
            let end = parse_bound(end, part)?;

            if end < start {
                return Err(malformed(part, "end is before start"));
            }

            PageRange::new(start, end)
        } else {
            PageRange::single(parse_bound(part, part)?)
        };

        ranges.push(range);
    }

    Ok(ranges)
}

fn parse_bound(bound: &str, token: &str) -> Result<u32> {
    let bound = bound.trim();
    let value: i64 = bound
        .parse()
        .map_err(|_| malformed(token, &format!("\"{}\" is not a page number", bound)))?;

    if value < 1 {
        return Err(malformed(token, "page numbers must be greater than 0"));
    }

    u32::try_from(value).map_err(|_| malformed(token, "page number is too large"))
}

fn malformed(input: &str, reason: &str) -> Error {
    Error::MalformedRange {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Collapse an unordered page selection into sorted runs of consecutive pages.
pub fn selection_to_ranges(pages: &[u32]) -> Vec<PageRange> {
    let mut sorted: Vec<u32> = pages.iter().copied().filter(|&p| p >= 1).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<PageRange> = Vec::new();
    for page in sorted {
        match ranges.last_mut() {
            Some(last) if last.end + 1 == page => last.end = page,
            _ => ranges.push(PageRange::single(page)),
        }
    }
    ranges
}

/// Render ranges for display, e.g. "1-5, 8, 10-15"
pub fn format_ranges(ranges: &[PageRange]) -> String {
    ranges
        .iter()
        .map(PageRange::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a page selection, collapsing consecutive pages into `a-b`
pub fn format_pages(pages: &[u32]) -> String {
    format_ranges(&selection_to_ranges(pages))
}
