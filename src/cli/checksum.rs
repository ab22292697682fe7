use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{create_progress_bar, open_segment, wprintln};
use crate::pg::checksum::validate_checksum;
use crate::pg::page::PageHeader;
use crate::pg::segment::segment_number_from_path;
use crate::pg::session::{DecodeOptions, Session};
use crate::HexeditError;

/// Options for the checksum subcommand.
pub struct ChecksumOptions {
    pub file: String,
    pub verbose: bool,
    pub nonzero: bool,
    pub segment_number: Option<u32>,
    pub segment_size: Option<u32>,
    pub block_size: Option<u32>,
    pub json: bool,
    pub mmap: bool,
}

#[derive(Serialize)]
struct ChecksumSummaryJson {
    file: String,
    block_size: u32,
    segment_number: u32,
    total_blocks: u64,
    new_blocks: u64,
    skipped_zero: u64,
    partial_blocks: u64,
    valid_blocks: u64,
    invalid_blocks: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<BlockChecksumJson>,
}

#[derive(Serialize)]
struct BlockChecksumJson {
    block: u32,
    relation_block: u32,
    status: String,
    stored: u16,
    calculated: u16,
}

/// Verify the data checksum of every block in a segment.
///
/// The checksum of a block depends on its block number relative to the whole
/// relation, so the segment number (from `-n` or the `.N` file name suffix)
/// matters for every segment after the first. Uninitialized blocks are
/// counted separately and never verified; with `--nonzero` blocks whose
/// stored checksum is zero are skipped too.
///
/// Returns an error after printing the summary when any block fails.
pub fn execute(opts: &ChecksumOptions, writer: &mut dyn Write) -> Result<(), HexeditError> {
    let mut segment = open_segment(&opts.file, opts.block_size, opts.mmap)?;
    let block_size = segment.block_size();
    let block_count = segment.block_count();
    let segment_number = opts
        .segment_number
        .unwrap_or_else(|| segment_number_from_path(&opts.file));

    let options = DecodeOptions {
        segment_size: opts.segment_size,
        ..DecodeOptions::default()
    };
    options.validate()?;
    let session = Session::new(options, block_size, segment_number);

    if !opts.json {
        wprintln!(
            writer,
            "Validating checksums for {} ({} blocks, block size {}, segment {})...",
            opts.file,
            block_count,
            block_size,
            segment_number
        )?;
        wprintln!(writer)?;
    }

    let mut new_count = 0u64;
    let mut skipped_count = 0u64;
    let mut partial_count = 0u64;
    let mut valid_count = 0u64;
    let mut invalid_count = 0u64;
    let mut details = Vec::new();

    let pb = if opts.json {
        None
    } else {
        Some(create_progress_bar(block_count, "blocks"))
    };

    segment.seek_block(0)?;
    let mut buf = Vec::new();
    for block in 0..block_count as u32 {
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
        let n = segment.read_next(&mut buf)?;
        if n < block_size as usize {
            if n > 0 {
                partial_count += 1;
            }
            break;
        }
        let page = &buf[..n];
        let header = match PageHeader::parse(page) {
            Some(h) => h,
            None => break,
        };
        if header.is_new() {
            new_count += 1;
            continue;
        }
        if opts.nonzero && header.checksum == 0 {
            skipped_count += 1;
            continue;
        }

        let relation_block = session.relation_block(block);
        let result = validate_checksum(page, relation_block);
        if result.valid {
            valid_count += 1;
        } else {
            invalid_count += 1;
        }

        if opts.json {
            if opts.verbose || !result.valid {
                details.push(BlockChecksumJson {
                    block,
                    relation_block,
                    status: if result.valid { "valid" } else { "invalid" }.to_string(),
                    stored: result.stored,
                    calculated: result.calculated,
                });
            }
        } else if !result.valid {
            wprintln!(
                writer,
                "Block {}: {} checksum (stored=0x{:04X}, calculated=0x{:04X}, relation block {})",
                block,
                "INVALID".red(),
                result.stored,
                result.calculated,
                relation_block
            )?;
        } else if opts.verbose {
            wprintln!(writer, "Block {}: {} (0x{:04X})", block, "OK".green(), result.stored)?;
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if opts.json {
        let summary = ChecksumSummaryJson {
            file: opts.file.clone(),
            block_size,
            segment_number,
            total_blocks: block_count,
            new_blocks: new_count,
            skipped_zero: skipped_count,
            partial_blocks: partial_count,
            valid_blocks: valid_count,
            invalid_blocks: invalid_count,
            blocks: details,
        };
        let json = serde_json::to_string_pretty(&summary).map_err(|e| HexeditError::Parse(e.to_string()))?;
        wprintln!(writer, "{}", json)?;
    } else {
        wprintln!(writer)?;
        wprintln!(writer, "Summary:")?;
        wprintln!(writer, "  Total blocks: {}", block_count)?;
        wprintln!(writer, "  New blocks: {}", new_count)?;
        if opts.nonzero {
            wprintln!(writer, "  Skipped (zero checksum): {}", skipped_count)?;
        }
        if partial_count > 0 {
            wprintln!(writer, "  Partial blocks: {}", format!("{}", partial_count).yellow())?;
        }
        wprintln!(writer, "  Valid checksums: {}", valid_count)?;
        if invalid_count > 0 {
            wprintln!(writer, "  Invalid checksums: {}", format!("{}", invalid_count).red())?;
        } else {
            wprintln!(writer, "  Invalid checksums: {}", format!("{}", invalid_count).green())?;
        }
    }

    if invalid_count > 0 {
        return Err(HexeditError::Parse(format!(
            "{} block(s) with invalid checksums",
            invalid_count
        )));
    }
    Ok(())
}
