//! Criterion benchmarks for pg-hexedit core operations.
//!
//! Benchmarks cover:
//! - Page header parsing (PageHeader::parse)
//! - Data checksum computation (pg_checksum_page)
//! - Page classification (classify)
//! - Full segment decode into an in-memory tag collector

use byteorder::{ByteOrder, LittleEndian};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use pghex::pg::checksum::{pg_checksum_page, validate_checksum};
use pghex::pg::constants::*;
use pghex::pg::driver::Driver;
use pghex::pg::page::PageHeader;
use pghex::pg::page_types::classify;
use pghex::pg::segment::SegmentFile;
use pghex::pg::session::{ChecksumMode, DecodeOptions};
use pghex::pg::tag::TagCollector;

const BLOCK_SIZE: u32 = 8192;
const BS: usize = BLOCK_SIZE as usize;

// ---------------------------------------------------------------------------
// Synthetic page builders (mirrors integration test helpers)
// ---------------------------------------------------------------------------

/// Build a heap page filled with 40-byte tuples, checksummed for `blkno`.
fn build_heap_page(blkno: u32) -> Vec<u8> {
    let mut page = vec![0u8; BS];
    let tuple_len = 40;
    let ntuples = (BS - PD_LINP) / (tuple_len + SIZE_ITEM_ID);

    let mut upper = BS;
    for i in 0..ntuples {
        upper -= tuple_len;
        let lp = (upper as u32) | (1 << 15) | ((tuple_len as u32) << 17);
        LittleEndian::write_u32(&mut page[PD_LINP + i * SIZE_ITEM_ID..], lp);
        LittleEndian::write_u32(&mut page[upper + HT_XMIN..], 1000 + i as u32);
        LittleEndian::write_u32(&mut page[upper + HT_CTID..], blkno);
        LittleEndian::write_u16(&mut page[upper + HT_CTID + 4..], i as u16 + 1);
        LittleEndian::write_u16(&mut page[upper + HT_INFOMASK2..], 2);
        LittleEndian::write_u16(
            &mut page[upper + HT_INFOMASK..],
            HEAP_XMIN_COMMITTED | HEAP_XMAX_INVALID,
        );
        page[upper + HT_HOFF] = 24;
    }

    LittleEndian::write_u32(&mut page[PD_LSN..], 1);
    LittleEndian::write_u32(&mut page[PD_LSN + 4..], 0x5000);
    LittleEndian::write_u16(&mut page[PD_LOWER..], (PD_LINP + ntuples * SIZE_ITEM_ID) as u16);
    LittleEndian::write_u16(&mut page[PD_UPPER..], upper as u16);
    LittleEndian::write_u16(&mut page[PD_SPECIAL..], BS as u16);
    LittleEndian::write_u16(&mut page[PD_PAGESIZE_VERSION..], BS as u16 | 4);

    let csum = pg_checksum_page(&page, blkno);
    LittleEndian::write_u16(&mut page[PD_CHECKSUM..], csum);
    page
}

fn build_segment(num_blocks: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(num_blocks as usize * BS);
    for blkno in 0..num_blocks {
        data.extend_from_slice(&build_heap_page(blkno));
    }
    data
}

// ---------------------------------------------------------------------------
// Benchmark: Page header parsing
// ---------------------------------------------------------------------------

fn bench_page_header_parse(c: &mut Criterion) {
    let page = build_heap_page(0);
    c.bench_function("page_header_parse", |b| {
        b.iter(|| {
            black_box(PageHeader::parse(black_box(&page)));
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: Checksum computation and classification
// ---------------------------------------------------------------------------

fn bench_checksum_single_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum_single_page");
    let page = build_heap_page(3);

    group.bench_function("pg_checksum_page", |b| {
        b.iter(|| {
            black_box(pg_checksum_page(black_box(&page), 3));
        });
    });
    group.bench_function("validate_checksum", |b| {
        b.iter(|| {
            black_box(validate_checksum(black_box(&page), 3));
        });
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let page = build_heap_page(0);
    c.bench_function("classify", |b| {
        b.iter(|| {
            black_box(classify(black_box(&page), BLOCK_SIZE));
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: Full segment decode
// ---------------------------------------------------------------------------

fn bench_segment_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_decode");

    for num_blocks in [8u32, 64] {
        let data = build_segment(num_blocks);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("tags", num_blocks), &data, |b, data| {
            b.iter(|| {
                let segment = SegmentFile::from_bytes(data.clone()).expect("segment");
                let mut driver = Driver::new(segment, DecodeOptions::default()).expect("driver");
                let mut sink = TagCollector::new();
                black_box(driver.run(&mut sink, |_| {}).expect("run"));
            });
        });

        group.bench_with_input(
            BenchmarkId::new("tags_with_checksum", num_blocks),
            &data,
            |b, data| {
                let options = DecodeOptions {
                    checksum: ChecksumMode::Always,
                    ..Default::default()
                };
                b.iter(|| {
                    let segment = SegmentFile::from_bytes(data.clone()).expect("segment");
                    let mut driver = Driver::new(segment, options.clone()).expect("driver");
                    let mut sink = TagCollector::new();
                    black_box(driver.run(&mut sink, |_| {}).expect("run"));
                });
            },
        );
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Group and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_page_header_parse,
    bench_checksum_single_page,
    bench_classify,
    bench_segment_decode,
);
criterion_main!(benches);
