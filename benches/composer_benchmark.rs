//! Performance benchmarks for PDF Composer
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdf_composer::compose::{merge_pages, split_document, PageSelection};
use pdf_composer::pdf::QpdfCodec;
use pdf_composer::ranges::{format_ranges, parse_ranges, selection_to_ranges};
use pdf_composer::source::{ResourceRegistry, SourceFile};
use pdf_composer::StagingStore;
use qpdf::{QPdf, QPdfObject};
use std::sync::Arc;

/// Build a document with `pages` empty letter-size pages
fn build_pdf(pages: u32) -> Vec<u8> {
    let doc = QPdf::empty();
    for _ in 0..pages {
        let media_box = doc.parse_object("[0 0 612 792]").unwrap();
        let page = doc.new_dictionary_from([
            ("/Type", doc.new_name("/Page")),
            ("/MediaBox", media_box),
        ]);
        doc.add_page(&QPdfObject::from(page).into_indirect(), false)
            .unwrap();
    }
    doc.writer().write_to_memory().unwrap()
}

/// Benchmark range expression parsing and formatting
fn bench_ranges(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranges");

    let expression = (1..=200)
        .map(|n| format!("{}-{}", n * 10, n * 10 + 5))
        .collect::<Vec<_>>()
        .join(", ");
    group.bench_function("parse_200_tokens", |b| {
        b.iter(|| parse_ranges(black_box(&expression)).unwrap());
    });

    let selection: Vec<u32> = (1..=2000).filter(|n| n % 7 != 0).rev().collect();
    group.bench_function("selection_to_ranges_2000", |b| {
        b.iter(|| format_ranges(&selection_to_ranges(black_box(&selection))));
    });

    group.finish();
}

/// Benchmark merging pages of two sources in interleaved order
fn bench_merge(c: &mut Criterion) {
    let codec = QpdfCodec::new();
    let mut group = c.benchmark_group("merge_pages");

    for pages in [10u32, 100] {
        let a = SourceFile::new("a.pdf", build_pdf(pages));
        let b = SourceFile::new("b.pdf", build_pdf(pages));
        let selections: Vec<PageSelection> = (1..=pages)
            .flat_map(|n| {
                [
                    PageSelection::new(a.clone(), n),
                    PageSelection::new(b.clone(), pages + 1 - n),
                ]
            })
            .collect();

        group.throughput(Throughput::Elements(selections.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages * 2), &selections, |bench, s| {
            bench.iter(|| merge_pages(&codec, black_box(s)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark splitting into single-page outputs
fn bench_split(c: &mut Criterion) {
    let codec = QpdfCodec::new();
    let file = SourceFile::new("doc.pdf", build_pdf(50));
    let ranges = parse_ranges(
        &(1..=50)
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
    .unwrap();

    let mut group = c.benchmark_group("split_document");
    group.throughput(Throughput::Bytes(file.byte_size()));
    group.bench_function("50_single_pages", |b| {
        b.iter(|| split_document(&codec, black_box(&file), &ranges).unwrap());
    });
    group.finish();
}

/// Benchmark staging: register documents then shuffle the page order
fn bench_staging(c: &mut Criterion) {
    let files: Vec<SourceFile> = (0..5)
        .map(|i| SourceFile::new(format!("doc-{}.pdf", i), build_pdf(40)))
        .collect();

    c.bench_function("staging_add_and_reorder_200_pages", |b| {
        b.iter(|| {
            let mut store = StagingStore::new(QpdfCodec::new(), Arc::new(ResourceRegistry::new()));
            for file in &files {
                store.add_document(file.clone()).unwrap();
            }
            for i in 0..200 {
                store.reorder_page(i, 199 - i);
            }
            black_box(store.pages().len())
        });
    });
}

criterion_group!(benches, bench_ranges, bench_merge, bench_split, bench_staging);

criterion_main!(benches);
