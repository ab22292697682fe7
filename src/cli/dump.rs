use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::cli::{open_segment, wprintln};
use crate::pg::driver::decode_page;
use crate::pg::segment::segment_number_from_path;
use crate::pg::session::{DecodeOptions, Session};
use crate::pg::tag::TagCollector;
use crate::util::hex::{format_offset, hex_dump, hex_dump_tagged};
use crate::HexeditError;

/// Options for the dump subcommand.
pub struct DumpOptions {
    pub file: String,
    pub block: Option<u32>,
    pub offset: Option<u64>,
    pub length: Option<usize>,
    pub raw: bool,
    pub tags: bool,
    pub block_size: Option<u32>,
    pub mmap: bool,
}

/// Hex dump of one block, or of an arbitrary byte range with `--offset`.
///
/// With `--tags` the block is decoded first and each dump line is followed
/// by the labels of the tags starting on it. Decoding problems are ignored
/// here; `pg_hexedit tags` reports them.
pub fn execute(opts: &DumpOptions, writer: &mut dyn Write) -> Result<(), HexeditError> {
    if let Some(abs_offset) = opts.offset {
        return dump_at_offset(&opts.file, abs_offset, opts.length.unwrap_or(256), opts.raw, writer);
    }

    let mut segment = open_segment(&opts.file, opts.block_size, opts.mmap)?;
    let block_size = segment.block_size();
    let block = opts.block.unwrap_or(0);
    let page = segment.read_block(block)?;

    let length = opts.length.unwrap_or(block_size as usize);
    let dump_len = length.min(page.len());
    let base_offset = block as u64 * block_size as u64;

    if opts.raw {
        writer
            .write_all(&page[..dump_len])
            .map_err(|e| HexeditError::Io(format!("Cannot write to stdout: {}", e)))?;
        return Ok(());
    }

    wprintln!(
        writer,
        "Hex dump of {} block {} ({} bytes):",
        opts.file,
        block,
        dump_len
    )?;
    wprintln!(writer)?;

    if opts.tags {
        let segment_number = segment_number_from_path(&opts.file);
        let mut session = Session::new(DecodeOptions::default(), block_size, segment_number);
        let mut collector = TagCollector::new();
        decode_page(&mut session, &mut collector, &page, block)?;
        wprintln!(
            writer,
            "{}",
            hex_dump_tagged(&page[..dump_len], base_offset, collector.tags())
        )?;
    } else {
        wprintln!(writer, "{}", hex_dump(&page[..dump_len], base_offset))?;
    }

    Ok(())
}

fn dump_at_offset(
    file: &str,
    offset: u64,
    length: usize,
    raw: bool,
    writer: &mut dyn Write,
) -> Result<(), HexeditError> {
    let mut f = File::open(file).map_err(|e| HexeditError::Io(format!("Cannot open {}: {}", file, e)))?;

    let file_size = f
        .metadata()
        .map_err(|e| HexeditError::Io(format!("Cannot stat {}: {}", file, e)))?
        .len();

    if offset >= file_size {
        return Err(HexeditError::Argument(format!(
            "Offset {} is beyond file size {}",
            offset, file_size
        )));
    }

    let read_len = length.min((file_size - offset) as usize);

    f.seek(SeekFrom::Start(offset))
        .map_err(|e| HexeditError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;

    let mut buf = vec![0u8; read_len];
    f.read_exact(&mut buf).map_err(|e| {
        HexeditError::Io(format!("Cannot read {} bytes at offset {}: {}", read_len, offset, e))
    })?;

    if raw {
        writer
            .write_all(&buf)
            .map_err(|e| HexeditError::Io(format!("Cannot write to stdout: {}", e)))?;
    } else {
        wprintln!(
            writer,
            "Hex dump of {} at offset {} ({} bytes):",
            file,
            format_offset(offset),
            read_len
        )?;
        wprintln!(writer)?;
        wprintln!(writer, "{}", hex_dump(&buf, offset))?;
    }

    Ok(())
}
