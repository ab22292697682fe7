//! Index tuple decoding for B-tree, GIN, GiST and hash pages.
//!
//! These access methods share `IndexTupleData`: a 6-byte item pointer and a
//! 2-byte `t_info` word (13-bit size and three flag bits), an optional 4-byte
//! null bitmap, then the key data at a MAXALIGNed offset.
//!
//! The item pointer does not always point at a heap tuple. B-tree internal
//! pages store the child block there, B-tree v4 repurposes it for truncated
//! pivot keys and deduplicated posting lists, and GIN leaf entry tuples store
//! a posting list offset and item count in it. [`interpret_tid`] decides
//! once, from the page and the tuple, which of these readings applies.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::attribute::emit_attributes;
use crate::pg::constants::*;
use crate::pg::gin::emit_posting_segments;
use crate::pg::item::LinePointer;
use crate::pg::page_types::PageVariant;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Parsed `IndexTupleData` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexTupleHeader {
    /// Block number of `t_tid`.
    pub block: u32,
    /// Offset number of `t_tid`.
    pub offset: u16,
    pub info: u16,
}

impl IndexTupleHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZEOF_INDEX_TUPLE {
            return None;
        }
        let hi = LittleEndian::read_u16(&data[0..]) as u32;
        let lo = LittleEndian::read_u16(&data[2..]) as u32;
        Some(IndexTupleHeader {
            block: (hi << 16) | lo,
            offset: LittleEndian::read_u16(&data[4..]),
            info: LittleEndian::read_u16(&data[IT_INFO..]),
        })
    }

    /// `IndexTupleSize()`.
    pub fn size(&self) -> usize {
        (self.info & INDEX_SIZE_MASK) as usize
    }

    pub fn has_nulls(&self) -> bool {
        self.info & INDEX_NULL_MASK != 0
    }

    pub fn has_var(&self) -> bool {
        self.info & INDEX_VAR_MASK != 0
    }

    /// `INDEX_ALT_TID_MASK` for B-tree, unused elsewhere.
    pub fn reserved_bit(&self) -> bool {
        self.info & INDEX_AM_RESERVED_BIT != 0
    }

    /// Offset of the key data from the start of the tuple.
    pub fn data_offset(&self) -> usize {
        if self.has_nulls() {
            maxalign(SIZEOF_INDEX_TUPLE + SIZEOF_INDEX_ATTR_BITMAP)
        } else {
            maxalign(SIZEOF_INDEX_TUPLE)
        }
    }

    /// Label for the `t_info` tag.
    pub fn info_label(&self) -> String {
        let mut flags = Vec::new();
        if self.has_var() {
            flags.push("INDEX_VAR_MASK");
        }
        if self.has_nulls() {
            flags.push("INDEX_NULL_MASK");
        }
        if self.reserved_bit() {
            flags.push("INDEX_AM_RESERVED_BIT");
        }
        if flags.is_empty() {
            format!("t_info IndexTupleSize(): {}", self.size())
        } else {
            format!("t_info IndexTupleSize(): {}, ({})", self.size(), flags.join("|"))
        }
    }
}

/// How to read an index tuple's item pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TidInterpretation {
    /// A heap tuple location.
    HeapPointer,
    /// A child page block number (internal pages).
    Downlink,
    /// B-tree pivot tuple with a truncated key: the offset number holds the
    /// number of key attributes, optionally followed by a heap TID at the
    /// end of the tuple.
    PivotKey { natts: usize, heap_tid: bool },
    /// B-tree deduplicated posting list tuple.
    BtreePosting { nposting: usize, offset: usize },
    /// GIN entry tuple with an inline posting list.
    GinPostingList {
        nposting: usize,
        offset: usize,
        compressed: bool,
    },
    /// GIN entry tuple pointing at a posting tree root.
    GinPostingTree { root: u32 },
}

/// Page facts that decide the item pointer interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexContext {
    pub variant: PageVariant,
    pub is_leaf: bool,
    pub btree_version: u32,
    /// GIN pending list page (tuples there carry heap TIDs).
    pub gin_list: bool,
}

impl IndexContext {
    /// Derive the context from a page's special section.
    pub fn for_page(dec: &PageDecoder<'_>, special: usize) -> Self {
        let flags_at = |off: usize| dec.u16_at(special + off).unwrap_or(0);
        let (is_leaf, gin_list) = match dec.variant {
            PageVariant::Btree => (flags_at(BTPO_FLAGS) & BTP_LEAF != 0, false),
            PageVariant::Gist => (flags_at(GIST_FLAGS) & F_LEAF != 0, false),
            PageVariant::Gin => {
                let flags = flags_at(GIN_FLAGS);
                (flags & GIN_LEAF != 0, flags & GIN_LIST != 0)
            }
            _ => (true, false),
        };
        IndexContext {
            variant: dec.variant,
            is_leaf,
            btree_version: dec.session.btree_version(),
            gin_list,
        }
    }
}

/// Decide how a tuple's item pointer is to be read.
///
/// Pivot-key detection comes first on B-tree pages and is exclusive with
/// posting lists. A posting list reading requires a leaf page, a format
/// version that has posting lists, and a non-zero item count.
pub fn interpret_tid(hdr: &IndexTupleHeader, ctx: &IndexContext) -> TidInterpretation {
    match ctx.variant {
        PageVariant::Btree => {
            if !hdr.reserved_bit() {
                return if ctx.is_leaf {
                    TidInterpretation::HeapPointer
                } else {
                    TidInterpretation::Downlink
                };
            }
            let pivot = TidInterpretation::PivotKey {
                natts: (hdr.offset & BT_OFFSET_MASK) as usize,
                heap_tid: hdr.offset & BT_PIVOT_HEAP_TID_ATTR != 0,
            };
            if !ctx.is_leaf || hdr.offset & BT_IS_POSTING == 0 {
                return pivot;
            }
            let nposting = (hdr.offset & BT_OFFSET_MASK) as usize;
            if ctx.btree_version >= BTREE_VERSION && nposting > 0 {
                TidInterpretation::BtreePosting {
                    nposting,
                    offset: hdr.block as usize,
                }
            } else {
                TidInterpretation::HeapPointer
            }
        }
        PageVariant::Gin => {
            if ctx.gin_list {
                return TidInterpretation::HeapPointer;
            }
            if !ctx.is_leaf {
                return TidInterpretation::Downlink;
            }
            if hdr.offset == GIN_TREE_POSTING {
                TidInterpretation::GinPostingTree { root: hdr.block }
            } else if hdr.offset > 0 {
                TidInterpretation::GinPostingList {
                    nposting: hdr.offset as usize,
                    offset: (hdr.block & !GIN_ITUP_COMPRESSED) as usize,
                    compressed: hdr.block & GIN_ITUP_COMPRESSED != 0,
                }
            } else {
                TidInterpretation::HeapPointer
            }
        }
        PageVariant::Gist if !ctx.is_leaf => TidInterpretation::Downlink,
        _ => TidInterpretation::HeapPointer,
    }
}

fn tid_labels(hdr: &IndexTupleHeader, meaning: &TidInterpretation, is_leaf: bool) -> [String; 3] {
    let hi = hdr.block >> 16;
    let lo = hdr.block & 0xFFFF;
    match *meaning {
        TidInterpretation::HeapPointer => [
            format!("t_tid->bi_hi: {}", hi),
            format!("t_tid->bi_lo: {}", lo),
            format!("t_tid->offsetNumber: {}", hdr.offset),
        ],
        TidInterpretation::Downlink => [
            format!("t_tid->bi_hi (downlink): {}", hi),
            format!("t_tid->bi_lo (downlink): {}", lo),
            format!("t_tid->offsetNumber: {}", hdr.offset),
        ],
        TidInterpretation::PivotKey { natts, heap_tid } => {
            let what = if is_leaf { "" } else { " (downlink)" };
            let suffix = if heap_tid { ", BT_PIVOT_HEAP_TID_ATTR" } else { "" };
            [
                format!("t_tid->bi_hi{}: {}", what, hi),
                format!("t_tid->bi_lo{}: {}", what, lo),
                format!("t_tid->offsetNumber BTreeTupleGetNAtts(): {}{}", natts, suffix),
            ]
        }
        TidInterpretation::BtreePosting { nposting, offset } => [
            format!("t_tid->bi_hi BTreeTupleGetPostingOffset(): {}", offset),
            format!("t_tid->bi_lo BTreeTupleGetPostingOffset(): {}", offset),
            format!("t_tid->offsetNumber BTreeTupleGetNPosting(): {}", nposting),
        ],
        TidInterpretation::GinPostingList {
            nposting,
            offset,
            compressed,
        } => {
            let c = if compressed { " (compressed)" } else { "" };
            [
                format!("t_tid->bi_hi GinGetPostingOffset(): {}{}", offset, c),
                format!("t_tid->bi_lo GinGetPostingOffset(): {}{}", offset, c),
                format!("t_tid->offsetNumber GinGetNPosting(): {}", nposting),
            ]
        }
        TidInterpretation::GinPostingTree { root } => [
            format!("t_tid->bi_hi GinGetPostingTree(): {}", root),
            format!("t_tid->bi_lo GinGetPostingTree(): {}", root),
            "t_tid->offsetNumber GIN_TREE_POSTING".to_string(),
        ],
    }
}

/// Tag a run of `count` 6-byte item pointers at `start`, alternating colours.
pub fn emit_tid_run(
    dec: &mut PageDecoder<'_>,
    slot: u16,
    start: usize,
    count: usize,
    what: &str,
) -> Result<(), HexeditError> {
    let page = dec.page;
    for i in 0..count {
        let off = start + i * SIZE_ITEM_POINTER;
        let label = match page.get(off..off + SIZE_ITEM_POINTER) {
            Some(tid) => {
                let block = ((LittleEndian::read_u16(tid) as u32) << 16)
                    | LittleEndian::read_u16(&tid[2..]) as u32;
                format!("{} TID {}: ({},{})", what, i, block, LittleEndian::read_u16(&tid[4..]))
            }
            None => format!("{} TID {}", what, i),
        };
        let color = if i % 2 == 0 {
            Color::BlueLight
        } else {
            Color::BlueDark
        };
        dec.tuple_tag(slot, &label, color, off, SIZE_ITEM_POINTER)?;
    }
    Ok(())
}

/// Emit key data as attributes (with a schema) or one opaque region.
#[allow(clippy::too_many_arguments)]
fn emit_key(
    dec: &mut PageDecoder<'_>,
    slot: u16,
    start: usize,
    key_end: usize,
    data_off: usize,
    natts: Option<usize>,
    nulls: Option<&[u8]>,
) -> Result<(), HexeditError> {
    if key_end <= data_off {
        return Ok(());
    }
    let schema = dec.session.options().schema.clone();
    match schema {
        Some(schema) => {
            let natts = natts.unwrap_or(schema.len());
            emit_attributes(dec, slot, start, key_end, data_off, natts, nulls, &schema)
        }
        None => dec.tuple_tag(slot, "contents", Color::White, start + data_off, key_end - data_off),
    }
}

/// Decode one B-tree, GIN, GiST or hash index tuple.
pub fn emit_index_tuple(
    dec: &mut PageDecoder<'_>,
    item: &LinePointer,
    ctx: &IndexContext,
) -> Result<(), HexeditError> {
    let slot = item.slot;
    let start = item.offset as usize;
    let lp_len = item.len as usize;
    let page = dec.page;

    let hdr = match page.get(start..start + lp_len).and_then(IndexTupleHeader::parse) {
        Some(h) => h,
        None => {
            dec.fail(
                Some(slot),
                format!("lp_len {} is too small for an index tuple header", lp_len),
            );
            return Ok(());
        }
    };

    let meaning = interpret_tid(&hdr, ctx);
    let [hi_label, lo_label, off_label] = tid_labels(&hdr, &meaning, ctx.is_leaf);
    let shape_color = match meaning {
        TidInterpretation::HeapPointer | TidInterpretation::Downlink => Color::BlueLight,
        _ => Color::YellowDark,
    };
    dec.tuple_tag(slot, &hi_label, Color::BlueLight, start, 2)?;
    dec.tuple_tag(slot, &lo_label, Color::BlueLight, start + 2, 2)?;
    dec.tuple_tag(slot, &off_label, shape_color, start + 4, 2)?;
    dec.tuple_tag(slot, &hdr.info_label(), Color::YellowDark, start + IT_INFO, 2)?;

    let data_off = hdr.data_offset();
    let size = hdr.size();
    if size < data_off {
        dec.fail(
            Some(slot),
            format!("IndexTupleSize() {} is smaller than the tuple header", size),
        );
        return Ok(());
    }
    if size > lp_len {
        dec.fail(
            Some(slot),
            format!("IndexTupleSize() {} exceeds lp_len {}", size, lp_len),
        );
        return Ok(());
    }

    let nulls = if hdr.has_nulls() {
        dec.tuple_tag(
            slot,
            "IndexAttributeBitMapData array",
            Color::YellowDark,
            start + SIZEOF_INDEX_TUPLE,
            SIZEOF_INDEX_ATTR_BITMAP,
        )?;
        Some(&page[start + SIZEOF_INDEX_TUPLE..start + SIZEOF_INDEX_TUPLE + SIZEOF_INDEX_ATTR_BITMAP])
    } else {
        None
    };

    match meaning {
        TidInterpretation::PivotKey { natts, heap_tid } => {
            let key_end = if heap_tid {
                if size < data_off + SIZE_ITEM_POINTER {
                    dec.fail(
                        Some(slot),
                        format!("pivot tuple of size {} has no room for a heap TID", size),
                    );
                    return Ok(());
                }
                size - SIZE_ITEM_POINTER
            } else {
                size
            };
            emit_key(dec, slot, start, key_end, data_off, Some(natts), nulls)?;
            if heap_tid {
                emit_tid_run(dec, slot, start + key_end, 1, "pivot heap")?;
            }
            Ok(())
        }
        TidInterpretation::BtreePosting { nposting, offset } => {
            if offset < data_off || offset + nposting * SIZE_ITEM_POINTER > size {
                dec.fail(
                    Some(slot),
                    format!(
                        "posting list of {} items at offset {} does not fit in tuple of size {}",
                        nposting, offset, size
                    ),
                );
                return Ok(());
            }
            emit_key(dec, slot, start, offset, data_off, None, nulls)?;
            emit_tid_run(dec, slot, start + offset, nposting, "posting list")
        }
        TidInterpretation::GinPostingList {
            nposting,
            offset,
            compressed,
        } => {
            if offset < data_off || offset > size {
                dec.fail(
                    Some(slot),
                    format!(
                        "posting list offset {} is outside tuple of size {}",
                        offset, size
                    ),
                );
                return Ok(());
            }
            if offset > data_off {
                dec.tuple_tag(slot, "contents", Color::White, start + data_off, offset - data_off)?;
            }
            if compressed {
                emit_posting_segments(dec, Some(slot), start + offset, start + size)
            } else if offset + nposting * SIZE_ITEM_POINTER > size {
                dec.fail(
                    Some(slot),
                    format!(
                        "posting list of {} items at offset {} does not fit in tuple of size {}",
                        nposting, offset, size
                    ),
                );
                Ok(())
            } else {
                emit_tid_run(dec, slot, start + offset, nposting, "posting list")
            }
        }
        TidInterpretation::GinPostingTree { .. } => {
            if size > data_off {
                dec.tuple_tag(slot, "contents", Color::White, start + data_off, size - data_off)?;
            }
            Ok(())
        }
        TidInterpretation::HeapPointer | TidInterpretation::Downlink => {
            emit_key(dec, slot, start, size, data_off, None, nulls)
        }
    }
}
