//! BRIN tuple and revmap page decoding.
//!
//! Regular BRIN pages hold one summary tuple per block range: a 4-byte heap
//! block number, a 1-byte `bt_info` (data offset and flags), an optional null
//! bitmap and the opclass-specific summary values. The number of stored
//! values per column depends on the opclass, so the values are tagged as a
//! single region. Revmap pages hold a plain array of item pointers, one per
//! block range, locating each range's summary tuple.

use byteorder::{ByteOrder, LittleEndian};

use crate::pg::constants::*;
use crate::pg::index::emit_tid_run;
use crate::pg::item::LinePointer;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Label for a `bt_info` byte.
pub fn bt_info_label(info: u8) -> String {
    let mut flags = Vec::new();
    if info & BRIN_EMPTY_RANGE_MASK != 0 {
        flags.push("BRIN_EMPTY_RANGE_MASK");
    }
    if info & BRIN_PLACEHOLDER_MASK != 0 {
        flags.push("BRIN_PLACEHOLDER_MASK");
    }
    if info & BRIN_NULLS_MASK != 0 {
        flags.push("BRIN_NULLS_MASK");
    }
    let base = format!("bt_info BrinTupleDataOffset(): {}", info & BRIN_OFFSET_MASK);
    if flags.is_empty() {
        base
    } else {
        format!("{}, ({})", base, flags.join("|"))
    }
}

/// Decode one BRIN summary tuple.
pub fn emit_brin_tuple(dec: &mut PageDecoder<'_>, item: &LinePointer) -> Result<(), HexeditError> {
    let slot = item.slot;
    let start = item.offset as usize;
    let len = item.len as usize;
    let page = dec.page;

    if len < SIZEOF_BRIN_TUPLE || start + len > page.len() {
        dec.fail(Some(slot), format!("lp_len {} is too small for a BRIN tuple", len));
        return Ok(());
    }

    let blkno = LittleEndian::read_u32(&page[start..]);
    let info = page[start + 4];
    dec.tuple_tag(slot, &format!("bt_blkno: {}", blkno), Color::BlueLight, start, 4)?;
    dec.tuple_tag(slot, &bt_info_label(info), Color::YellowDark, start + 4, 1)?;

    let hoff = (info & BRIN_OFFSET_MASK) as usize;
    if hoff < SIZEOF_BRIN_TUPLE || hoff > len {
        dec.fail(
            Some(slot),
            format!("BRIN data offset {} is inconsistent with lp_len {}", hoff, len),
        );
        return Ok(());
    }
    if info & BRIN_NULLS_MASK != 0 && hoff > SIZEOF_BRIN_TUPLE {
        dec.tuple_tag(slot, "nulls bitmap", Color::YellowDark, start + SIZEOF_BRIN_TUPLE, hoff - SIZEOF_BRIN_TUPLE)?;
    }
    if len > hoff {
        dec.tuple_tag(slot, "summary values", Color::White, start + hoff, len - hoff)?;
    }
    Ok(())
}

/// Number of revmap entries that fit on a page of `block_size` bytes.
pub fn revmap_capacity(block_size: u32) -> usize {
    (block_size as usize - PAGE_CONTENTS - SIZE_BRIN_SPECIAL) / SIZE_ITEM_POINTER
}

/// Decode a revmap page. Trailing unused (all-zero) entries are not tagged.
pub fn emit_revmap_page(dec: &mut PageDecoder<'_>) -> Result<(), HexeditError> {
    let page = dec.page;
    let capacity = revmap_capacity(dec.block_size());
    let used = (0..capacity)
        .rev()
        .find(|&i| {
            let off = PAGE_CONTENTS + i * SIZE_ITEM_POINTER;
            page.get(off..off + SIZE_ITEM_POINTER)
                .is_some_and(|tid| tid.iter().any(|&b| b != 0))
        })
        .map_or(0, |i| i + 1);
    emit_tid_run(dec, 0, PAGE_CONTENTS, used, "rm_tids")
}
