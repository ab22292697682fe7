//! GIN posting lists and posting tree (data) pages.
//!
//! Since PostgreSQL 9.4 heap TIDs in GIN are stored as compressed posting
//! list segments: the first TID in full, a 2-byte length, then the
//! differences between successive TIDs encoded as variable-byte integers.
//! Segments appear both inside leaf entry tuples and on posting tree leaf
//! pages. Data pages have no line pointers; their contents are a right bound
//! item pointer followed by either `PostingItem`s (internal pages) or
//! posting list segments (leaf pages).

use byteorder::{ByteOrder, LittleEndian};

use crate::pg::constants::*;
use crate::pg::index::emit_tid_run;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Start of the right bound item pointer on a data page.
pub const GIN_DATA_RIGHT_BOUND: usize = PAGE_CONTENTS;
/// Start of the posting items or segments on a data page.
pub const GIN_DATA_CONTENTS: usize = PAGE_CONTENTS + maxalign(SIZE_ITEM_POINTER);

/// Bits of a packed item pointer that hold the offset number.
const TID_OFFSET_BITS: u32 = 11;

/// Decode a varbyte-encoded buffer into its integers.
///
/// Each integer takes up to seven bytes: six carrying 7 bits with a
/// continuation flag in the high bit, and a seventh carrying a full 8 bits.
/// Returns `None` if the buffer ends in the middle of an integer.
pub fn decode_varbyte(data: &[u8]) -> Option<Vec<u64>> {
    let mut values = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = *data.get(i)?;
            i += 1;
            if shift == 42 {
                value |= (byte as u64) << shift;
                break;
            }
            value |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        values.push(value);
    }
    Some(values)
}

/// Item pointer reached by adding the varbyte deltas in `deltas` to `first`,
/// which is given as (block, offset). Returns `None` on overflow.
pub fn last_tid(first: (u32, u16), deltas: &[u64]) -> Option<(u32, u16)> {
    let mut packed = ((first.0 as u64) << TID_OFFSET_BITS) | first.1 as u64;
    for delta in deltas {
        packed = packed.checked_add(*delta)?;
    }
    let block = u32::try_from(packed >> TID_OFFSET_BITS).ok()?;
    Some((block, (packed & ((1 << TID_OFFSET_BITS) - 1)) as u16))
}

/// Tag the compressed posting list segments in `start..end` (page offsets).
///
/// Inside an entry tuple `slot` is the tuple's offset number; on a data
/// page (`None`) each segment is labelled by its ordinal.
pub fn emit_posting_segments(
    dec: &mut PageDecoder<'_>,
    slot: Option<u16>,
    start: usize,
    end: usize,
) -> Result<(), HexeditError> {
    let page = dec.page;
    let end = end.min(page.len());
    let mut pos = start;
    let mut segment: u16 = 1;

    while pos < end {
        let tag_slot = slot.unwrap_or(segment);
        if pos + SIZE_GIN_POSTING_LIST_HEADER > end {
            dec.fail(
                Some(tag_slot),
                format!(
                    "posting list segment header at offset {} runs past end of posting data {}",
                    pos, end
                ),
            );
            return Ok(());
        }

        let nbytes = LittleEndian::read_u16(&page[pos + SIZE_ITEM_POINTER..]) as usize;
        let data_start = pos + SIZE_GIN_POSTING_LIST_HEADER;
        if data_start + nbytes > end {
            dec.fail(
                Some(tag_slot),
                format!(
                    "posting list segment of {} bytes at offset {} runs past end of posting data {}",
                    nbytes, pos, end
                ),
            );
            return Ok(());
        }

        let prefix = format!("segment {}", segment);
        emit_tid_run(dec, tag_slot, pos, 1, &format!("{} first", prefix))?;
        dec.tuple_tag(
            tag_slot,
            &format!("{} nbytes: {}", prefix, nbytes),
            Color::YellowDark,
            pos + SIZE_ITEM_POINTER,
            2,
        )?;
        let first = (
            ((LittleEndian::read_u16(&page[pos..]) as u32) << 16) | LittleEndian::read_u16(&page[pos + 2..]) as u32,
            LittleEndian::read_u16(&page[pos + 4..]),
        );
        let deltas = decode_varbyte(&page[data_start..data_start + nbytes]);
        let label = match deltas.as_deref().map(|d| (d.len(), last_tid(first, d))) {
            Some((n, Some((block, offset)))) => {
                format!("{} varbyte encoded TIDs: {}, last ({},{})", prefix, n, block, offset)
            }
            _ => format!("{} varbyte encoded TIDs", prefix),
        };
        dec.tuple_tag(tag_slot, &label, Color::GreenLight, data_start, nbytes)?;
        if deltas.is_none() {
            dec.fail(
                Some(tag_slot),
                format!("{} ends inside a varbyte encoded integer", prefix),
            );
        }

        pos = data_start + shortalign(nbytes);
        segment = segment.wrapping_add(1);
    }
    Ok(())
}

/// Decode a GIN posting tree page (GIN_DATA set in the special section).
pub fn emit_gin_data_page(
    dec: &mut PageDecoder<'_>,
    lower: usize,
    special: usize,
) -> Result<(), HexeditError> {
    let flags = dec.u16_at(special + GIN_FLAGS).unwrap_or(0);
    let maxoff = dec.u16_at(special + GIN_MAXOFF).unwrap_or(0) as usize;

    let rb = GIN_DATA_RIGHT_BOUND;
    let rb_block = ((dec.u16_at(rb).unwrap_or(0) as u32) << 16) | dec.u16_at(rb + 2).unwrap_or(0) as u32;
    let rb_offset = dec.u16_at(rb + 4).unwrap_or(0);
    dec.tag(&format!("right bound->bi_hi: {}", rb_block >> 16), Color::BlueLight, rb, 2)?;
    dec.tag(&format!("right bound->bi_lo: {}", rb_block & 0xFFFF), Color::BlueLight, rb + 2, 2)?;
    dec.tag(&format!("right bound->offsetNumber: {}", rb_offset), Color::BlueDark, rb + 4, 2)?;

    if flags & GIN_LEAF == 0 {
        return emit_posting_items(dec, maxoff, special);
    }

    if flags & GIN_COMPRESSED != 0 {
        if lower < GIN_DATA_CONTENTS || lower > special {
            dec.fail(
                None,
                format!("pd_lower {} is outside the posting list area of a GIN data page", lower),
            );
            return Ok(());
        }
        emit_posting_segments(dec, None, GIN_DATA_CONTENTS, lower)
    } else {
        // Pre-9.4 leaf: a plain array of maxoff item pointers.
        if GIN_DATA_CONTENTS + maxoff * SIZE_ITEM_POINTER > special {
            dec.fail(
                None,
                format!("{} uncompressed item pointers do not fit before the special section", maxoff),
            );
            return Ok(());
        }
        emit_tid_run(dec, 0, GIN_DATA_CONTENTS, maxoff, "item pointer")
    }
}

fn emit_posting_items(dec: &mut PageDecoder<'_>, maxoff: usize, special: usize) -> Result<(), HexeditError> {
    for i in 1..=maxoff {
        let off = GIN_DATA_CONTENTS + (i - 1) * SIZE_POSTING_ITEM;
        if off + SIZE_POSTING_ITEM > special {
            dec.fail(
                Some(i as u16),
                format!("PostingItem at offset {} overlaps the special section", off),
            );
            return Ok(());
        }
        let slot = i as u16;
        let child_hi = dec.u16_at(off).unwrap_or(0);
        let child_lo = dec.u16_at(off + 2).unwrap_or(0);
        let child = ((child_hi as u32) << 16) | child_lo as u32;
        dec.tuple_tag(slot, &format!("child_blkno->bi_hi: {} (block {})", child_hi, child), Color::BlueLight, off, 2)?;
        dec.tuple_tag(slot, &format!("child_blkno->bi_lo: {}", child_lo), Color::BlueLight, off + 2, 2)?;
        let key = off + 4;
        let key_hi = dec.u16_at(key).unwrap_or(0);
        let key_lo = dec.u16_at(key + 2).unwrap_or(0);
        let key_off = dec.u16_at(key + 4).unwrap_or(0);
        dec.tuple_tag(slot, &format!("key->bi_hi: {}", key_hi), Color::BlueDark, key, 2)?;
        dec.tuple_tag(slot, &format!("key->bi_lo: {}", key_lo), Color::BlueDark, key + 2, 2)?;
        dec.tuple_tag(slot, &format!("key->offsetNumber: {}", key_off), Color::BlueDark, key + 4, 2)?;
    }
    Ok(())
}
