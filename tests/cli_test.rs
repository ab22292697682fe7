#![cfg(feature = "cli")]
//! Integration tests for the `pg_hexedit` subcommands, run through their
//! `execute` entry points with output captured in memory.

use byteorder::{ByteOrder, LittleEndian};
use std::io::Write;
use tempfile::NamedTempFile;

use pghex::cli::app::ChecksumArg;
use pghex::cli::checksum::{self, ChecksumOptions};
use pghex::cli::classify::{self, ClassifyOptions};
use pghex::cli::dump::{self, DumpOptions};
use pghex::cli::tags::{self, TagsOptions};
use pghex::pg::checksum::pg_checksum_page;
use pghex::pg::constants::*;
use pghex::HexeditError;

const BS: usize = 8192;

fn build_heap_page(blkno: u32, with_checksum: bool) -> Vec<u8> {
    let mut page = vec![0u8; BS];
    let off = BS - 32;
    LittleEndian::write_u32(&mut page[PD_LSN..], 1);
    LittleEndian::write_u32(&mut page[PD_LSN + 4..], 0x100);
    LittleEndian::write_u16(&mut page[PD_LOWER..], (PD_LINP + 4) as u16);
    LittleEndian::write_u16(&mut page[PD_UPPER..], off as u16);
    LittleEndian::write_u16(&mut page[PD_SPECIAL..], BS as u16);
    LittleEndian::write_u16(&mut page[PD_PAGESIZE_VERSION..], BS as u16 | 4);
    LittleEndian::write_u32(&mut page[PD_LINP..], (off as u32) | (1 << 15) | (32 << 17));
    LittleEndian::write_u32(&mut page[off + HT_XMIN..], 100);
    LittleEndian::write_u16(&mut page[off + HT_CTID + 4..], 1);
    LittleEndian::write_u16(&mut page[off + HT_INFOMASK2..], 1);
    LittleEndian::write_u16(&mut page[off + HT_INFOMASK..], HEAP_XMAX_INVALID);
    page[off + HT_HOFF] = 24;
    page[off + 24..off + 32].copy_from_slice(b"a<b&c>d!");
    if with_checksum {
        let csum = pg_checksum_page(&page, blkno);
        LittleEndian::write_u16(&mut page[PD_CHECKSUM..], csum);
    }
    page
}

fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create temp file");
    tmp.write_all(data).expect("write temp file");
    tmp.flush().expect("flush temp file");
    tmp
}

fn path_of(tmp: &NamedTempFile) -> String {
    tmp.path().to_str().expect("utf-8 temp path").to_string()
}

fn tags_opts(file: String) -> TagsOptions {
    TagsOptions {
        file,
        range: Vec::new(),
        checksum: None,
        skip_leaf: false,
        after_lsn: None,
        segment_size: None,
        segment_number: None,
        block_size: None,
        attrs: None,
        json: false,
        mmap: false,
    }
}

#[test]
fn test_tags_writes_wxhexeditor_xml() {
    let tmp = write_temp(&build_heap_page(0, false));
    let mut out = Vec::new();
    tags::execute(&tags_opts(path_of(&tmp)), &mut out).unwrap();

    let xml = String::from_utf8(out).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- Dump created on: "));
    assert!(xml.contains("<!-- Options used: None -->"));
    assert!(xml.contains("<wxHexEditor_XML_TAG>"));
    assert!(xml.contains(&format!("<filename path=\"{}\">", path_of(&tmp))));
    assert_eq!(xml.matches("<TAG id=").count(), 20);
    assert!(xml.contains("<start_offset>0</start_offset>"));
    assert!(xml.trim_end().ends_with("</wxHexEditor_XML_TAG>"));
}

#[test]
fn test_tags_writes_json() {
    let tmp = write_temp(&build_heap_page(0, false));
    let mut opts = tags_opts(path_of(&tmp));
    opts.json = true;
    opts.range = vec![0];
    let mut out = Vec::new();
    tags::execute(&opts, &mut out).unwrap();

    let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(doc["path"], path_of(&tmp));
    assert_eq!(doc["options"], "-R 0");
    let tags = doc["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 20);
    assert_eq!(tags[0]["start"], 0);
    assert_eq!(tags[0]["end"], 7);
}

#[test]
fn test_tags_fails_after_output_on_structural_errors() {
    let tmp = write_temp(&build_heap_page(0, false));
    let mut opts = tags_opts(path_of(&tmp));
    opts.checksum = Some(ChecksumArg::Always);
    let mut out = Vec::new();
    let err = tags::execute(&opts, &mut out).unwrap_err();
    assert!(matches!(err, HexeditError::Parse(_)));
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("</wxHexEditor_XML_TAG>"));
}

#[test]
fn test_tags_argument_errors_before_output() {
    let tmp = write_temp(&build_heap_page(0, false));

    let mut opts = tags_opts(path_of(&tmp));
    opts.range = vec![5, 2];
    let mut out = Vec::new();
    assert!(matches!(tags::execute(&opts, &mut out), Err(HexeditError::Argument(_))));
    assert!(out.is_empty());

    let mut opts = tags_opts(path_of(&tmp));
    opts.after_lsn = Some("not-an-lsn".to_string());
    assert!(matches!(tags::execute(&opts, &mut out), Err(HexeditError::Argument(_))));

    let mut opts = tags_opts(path_of(&tmp));
    opts.attrs = Some("4,id".to_string());
    assert!(matches!(tags::execute(&opts, &mut out), Err(HexeditError::Argument(_))));
    assert!(out.is_empty());
}

#[test]
fn test_tags_missing_file() {
    let mut out = Vec::new();
    let err = tags::execute(&tags_opts("/nonexistent/16384".to_string()), &mut out).unwrap_err();
    assert!(err.to_string().contains("could not open file"));
    assert!(out.is_empty());
}

#[test]
fn test_classify_text_and_json() {
    let mut data = build_heap_page(0, true);
    data.extend_from_slice(&vec![0u8; BS]);
    let tmp = write_temp(&data);

    let mut opts = ClassifyOptions {
        file: path_of(&tmp),
        range: Vec::new(),
        segment_number: None,
        block_size: None,
        json: false,
        mmap: false,
    };
    let mut out = Vec::new();
    classify::execute(&opts, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Block 0: SPEC_SECT_NONE"));
    assert!(text.contains("LSN 1/00000100"));
    assert!(text.contains("Block 1: "));

    opts.json = true;
    let mut out = Vec::new();
    classify::execute(&opts, &mut out).unwrap();
    let blocks: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let blocks = blocks.as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["variant"], "None");
    assert_eq!(blocks[0]["checksum"], "valid");
    assert_eq!(blocks[1]["new"], true);
}

fn checksum_opts(file: String) -> ChecksumOptions {
    ChecksumOptions {
        file,
        verbose: false,
        nonzero: false,
        segment_number: None,
        segment_size: None,
        block_size: None,
        json: true,
        mmap: false,
    }
}

#[test]
fn test_checksum_all_valid() {
    let mut data = build_heap_page(0, true);
    data.extend_from_slice(&build_heap_page(1, true));
    data.extend_from_slice(&vec![0u8; BS]);
    let tmp = write_temp(&data);

    let mut out = Vec::new();
    checksum::execute(&checksum_opts(path_of(&tmp)), &mut out).unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["total_blocks"], 3);
    assert_eq!(summary["valid_blocks"], 2);
    assert_eq!(summary["invalid_blocks"], 0);
    assert_eq!(summary["new_blocks"], 1);
}

#[test]
fn test_checksum_invalid_block_fails() {
    let mut data = build_heap_page(0, true);
    // Checksummed for the wrong block number.
    data.extend_from_slice(&build_heap_page(7, true));
    let tmp = write_temp(&data);

    let mut out = Vec::new();
    let err = checksum::execute(&checksum_opts(path_of(&tmp)), &mut out).unwrap_err();
    assert!(err.to_string().contains("invalid checksums"));
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["invalid_blocks"], 1);
    assert_eq!(summary["blocks"][0]["block"], 1);
}

#[test]
fn test_checksum_nonzero_skips_unset() {
    let tmp = write_temp(&build_heap_page(0, false));
    let mut opts = checksum_opts(path_of(&tmp));
    opts.nonzero = true;
    let mut out = Vec::new();
    checksum::execute(&opts, &mut out).unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["skipped_zero"], 1);
    assert_eq!(summary["valid_blocks"], 0);
}

#[test]
fn test_dump_block_with_tags() {
    let tmp = write_temp(&build_heap_page(0, false));
    let opts = DumpOptions {
        file: path_of(&tmp),
        block: Some(0),
        offset: None,
        length: Some(64),
        raw: false,
        tags: true,
        block_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    dump::execute(&opts, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("block 0 (64 bytes)"));
    assert!(text.contains("LSN: 1/00000100"));
}

#[test]
fn test_dump_raw_and_offset() {
    let page = build_heap_page(0, false);
    let tmp = write_temp(&page);

    let mut opts = DumpOptions {
        file: path_of(&tmp),
        block: None,
        offset: None,
        length: Some(16),
        raw: true,
        tags: false,
        block_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    dump::execute(&opts, &mut out).unwrap();
    assert_eq!(out, &page[..16]);

    opts.offset = Some((BS - 8) as u64);
    opts.length = None;
    let mut out = Vec::new();
    dump::execute(&opts, &mut out).unwrap();
    assert_eq!(out, b"a<b&c>d!");

    opts.offset = Some(BS as u64 * 4);
    let mut out = Vec::new();
    assert!(matches!(dump::execute(&opts, &mut out), Err(HexeditError::Argument(_))));
}
