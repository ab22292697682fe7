use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{open_segment, parse_range, wprintln};
use crate::pg::checksum::validate_checksum;
use crate::pg::page::{Lsn, PageHeader};
use crate::pg::page_types::{classify, PageVariant};
use crate::pg::segment::segment_number_from_path;
use crate::pg::session::{DecodeOptions, Session};
use crate::HexeditError;

/// Options for the classify subcommand.
pub struct ClassifyOptions {
    pub file: String,
    pub range: Vec<u32>,
    pub segment_number: Option<u32>,
    pub block_size: Option<u32>,
    pub json: bool,
    pub mmap: bool,
}

/// Checksum state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumStatus {
    Valid,
    Invalid,
    /// Stored checksum is zero (checksums probably disabled).
    NotSet,
    /// Partial block, nothing to verify.
    Unverifiable,
}

/// Summary of one block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub block: u32,
    pub bytes_read: usize,
    pub new: bool,
    pub variant: PageVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lsn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumStatus>,
}

/// Summarize a block from the bytes read for it.
pub fn summarize_block(page: &[u8], block_size: u32, relation_block: u32, block: u32) -> BlockSummary {
    let header = PageHeader::parse(page);
    let new = header.is_some_and(|h| h.is_new());
    let classification = classify(page, block_size);

    let checksum = header.filter(|_| !new).map(|h| {
        if page.len() < block_size as usize {
            ChecksumStatus::Unverifiable
        } else if h.checksum == 0 {
            ChecksumStatus::NotSet
        } else if validate_checksum(page, relation_block).valid {
            ChecksumStatus::Valid
        } else {
            ChecksumStatus::Invalid
        }
    });

    BlockSummary {
        block,
        bytes_read: page.len(),
        new,
        variant: classification.variant,
        note: classification.note,
        lsn: header.map(|h| h.lsn.to_string()),
        flags: header.map(|h| h.flags_string()),
        items: header.map_or(0, |h| h.max_offset()),
        checksum,
    }
}

/// Print the page variant and header summary of each block.
///
/// Each line shows the variant classified from the special section, the
/// page LSN, the `pd_flags` names, the line pointer count and the checksum
/// status. Uninitialized blocks are listed as `new`. With `--json` an array
/// of block summaries is written instead.
pub fn execute(opts: &ClassifyOptions, writer: &mut dyn Write) -> Result<(), HexeditError> {
    let range = parse_range(&opts.range)?;
    let mut segment = open_segment(&opts.file, opts.block_size, opts.mmap)?;
    let block_size = segment.block_size();
    let segment_number = opts
        .segment_number
        .unwrap_or_else(|| segment_number_from_path(&opts.file));
    let session = Session::new(DecodeOptions::default(), block_size, segment_number);

    let (start, end) = range.unwrap_or((0, None));
    segment.seek_block(start)?;

    let mut summaries = Vec::new();
    let mut buf = Vec::new();
    let mut block = start;
    loop {
        let n = segment.read_next(&mut buf)?;
        if n == 0 {
            break;
        }
        summaries.push(summarize_block(&buf[..n], block_size, session.relation_block(block), block));
        if n < block_size as usize || end.is_some_and(|e| block >= e) {
            break;
        }
        block += 1;
    }

    if opts.json {
        let json = serde_json::to_string_pretty(&summaries).map_err(|e| HexeditError::Parse(e.to_string()))?;
        wprintln!(writer, "{}", json)?;
        return Ok(());
    }

    wprintln!(
        writer,
        "Blocks in {} ({} blocks, block size {}, segment {}):",
        opts.file,
        segment.block_count(),
        block_size,
        segment_number
    )?;
    wprintln!(writer, "{}", "-".repeat(50))?;
    for s in &summaries {
        print_summary(writer, s)?;
    }
    Ok(())
}

fn print_summary(writer: &mut dyn Write, s: &BlockSummary) -> Result<(), HexeditError> {
    if s.new {
        return wprintln!(writer, "Block {}: {}", s.block, "new".dimmed());
    }
    let variant = if s.variant.is_error() {
        s.variant.name().red().to_string()
    } else {
        s.variant.name().to_string()
    };
    let checksum = match s.checksum {
        Some(ChecksumStatus::Valid) => "valid".green().to_string(),
        Some(ChecksumStatus::Invalid) => "INVALID".red().to_string(),
        Some(ChecksumStatus::NotSet) => "not set".to_string(),
        Some(ChecksumStatus::Unverifiable) | None => "partial block".yellow().to_string(),
    };
    wprintln!(
        writer,
        "Block {}: {}  LSN {}  {}  items {}  checksum {}",
        s.block,
        variant,
        s.lsn.as_deref().unwrap_or("-"),
        s.flags.as_deref().unwrap_or("-"),
        s.items,
        checksum
    )?;
    if let Some(note) = s.note {
        wprintln!(writer, "  note: {}", note)?;
    }
    Ok(())
}

/// LSN of the newest block among `summaries`, if any block had a header.
pub fn newest_lsn(summaries: &[BlockSummary]) -> Option<Lsn> {
    summaries
        .iter()
        .filter_map(|s| s.lsn.as_deref())
        .filter_map(|l| l.parse::<Lsn>().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    fn page(block_size: usize, special_size: usize) -> Vec<u8> {
        let mut page = vec![0u8; block_size];
        LittleEndian::write_u32(&mut page[0..], 2);
        LittleEndian::write_u32(&mut page[4..], 0x20);
        LittleEndian::write_u16(&mut page[12..], 24);
        LittleEndian::write_u16(&mut page[14..], (block_size - special_size) as u16);
        LittleEndian::write_u16(&mut page[16..], (block_size - special_size) as u16);
        LittleEndian::write_u16(&mut page[18..], block_size as u16 | 4);
        page
    }

    #[test]
    fn test_summarize_heap_block() {
        let s = summarize_block(&page(8192, 0), 8192, 0, 0);
        assert!(!s.new);
        assert_eq!(s.variant, PageVariant::None);
        assert_eq!(s.lsn.as_deref(), Some("2/00000020"));
        assert_eq!(s.items, 0);
        assert_eq!(s.checksum, Some(ChecksumStatus::NotSet));
    }

    #[test]
    fn test_summarize_new_and_partial_blocks() {
        let s = summarize_block(&vec![0u8; 8192], 8192, 0, 3);
        assert!(s.new);
        assert_eq!(s.checksum, None);

        let mut short = page(8192, 0);
        LittleEndian::write_u16(&mut short[8..], 0x1234);
        short.truncate(100);
        let s = summarize_block(&short, 8192, 0, 4);
        assert_eq!(s.checksum, Some(ChecksumStatus::Unverifiable));
    }

    #[test]
    fn test_newest_lsn() {
        let a = summarize_block(&page(8192, 0), 8192, 0, 0);
        let mut p = page(8192, 0);
        LittleEndian::write_u32(&mut p[0..], 3);
        let b = summarize_block(&p, 8192, 1, 1);
        assert_eq!(newest_lsn(&[a, b]), Some(Lsn::from_halves(3, 0x20)));
        assert_eq!(newest_lsn(&[]), None);
    }
}
