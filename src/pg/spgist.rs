//! SP-GiST inner and leaf tuple decoding.
//!
//! Both kinds begin with a 32-bit bitfield whose low two bits are the tuple
//! state (live, redirect, dead, placeholder). Live inner tuples carry an
//! optional prefix datum followed by `nNodes` node tuples, each an
//! `IndexTupleData` whose size gives the stride to the next. Live leaf
//! tuples carry the next-in-chain offset, the heap pointer and the leaf
//! datum. Non-live tuples of either kind have the `SpGistDeadTupleData`
//! layout: a redirect pointer and the xid that created it.

use byteorder::{ByteOrder, LittleEndian};

use crate::pg::constants::*;
use crate::pg::index::IndexTupleHeader;
use crate::pg::item::LinePointer;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Tuple state name.
pub fn tupstate_name(state: u8) -> &'static str {
    match state {
        SPGIST_LIVE => "SPGIST_LIVE",
        SPGIST_REDIRECT => "SPGIST_REDIRECT",
        SPGIST_DEAD => "SPGIST_DEAD",
        _ => "SPGIST_PLACEHOLDER",
    }
}

/// Inner tuple bitfield: tupstate:2, allTheSame:1, nNodes:13, prefixSize:16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerTupleHeader {
    pub tupstate: u8,
    pub all_the_same: bool,
    pub n_nodes: usize,
    pub prefix_size: usize,
    pub size: usize,
}

impl InnerTupleHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SGITHDRSZ {
            return None;
        }
        let word = LittleEndian::read_u32(data);
        Some(InnerTupleHeader {
            tupstate: (word & 0x3) as u8,
            all_the_same: (word >> 2) & 0x1 != 0,
            n_nodes: ((word >> 3) & 0x1FFF) as usize,
            prefix_size: (word >> 16) as usize,
            size: LittleEndian::read_u16(&data[4..]) as usize,
        })
    }
}

/// Leaf tuple bitfield: tupstate:2, size:30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafTupleHeader {
    pub tupstate: u8,
    pub size: usize,
    pub next_offset: u16,
}

impl LeafTupleHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        let word = LittleEndian::read_u32(data);
        Some(LeafTupleHeader {
            tupstate: (word & 0x3) as u8,
            size: (word >> 2) as usize,
            next_offset: LittleEndian::read_u16(&data[4..]),
        })
    }
}

/// Decode one SP-GiST tuple on a leaf (`is_leaf`) or inner page.
pub fn emit_spgist_tuple(
    dec: &mut PageDecoder<'_>,
    item: &LinePointer,
    is_leaf: bool,
) -> Result<(), HexeditError> {
    let slot = item.slot;
    let start = item.offset as usize;
    let len = item.len as usize;
    let page = dec.page;
    let tuple = match page.get(start..start + len) {
        Some(t) if t.len() >= 4 => t,
        _ => {
            dec.fail(Some(slot), format!("lp_len {} is too small for an SP-GiST tuple", len));
            return Ok(());
        }
    };

    let tupstate = tuple[0] & 0x3;
    if tupstate != SPGIST_LIVE {
        return emit_dead_tuple(dec, slot, start, len, tupstate);
    }
    if is_leaf {
        emit_leaf_tuple(dec, slot, start, tuple)
    } else {
        emit_inner_tuple(dec, slot, start, tuple)
    }
}

fn emit_dead_tuple(
    dec: &mut PageDecoder<'_>,
    slot: u16,
    start: usize,
    len: usize,
    tupstate: u8,
) -> Result<(), HexeditError> {
    if len < SGDTSIZE {
        dec.fail(
            Some(slot),
            format!("{} tuple of length {} is smaller than {}", tupstate_name(tupstate), len, SGDTSIZE),
        );
        return Ok(());
    }
    let page = dec.page;
    let word = LittleEndian::read_u32(&page[start..]);
    dec.tuple_tag(
        slot,
        &format!("tupstate: {}, size: {}", tupstate_name(tupstate), word >> 2),
        Color::YellowDark,
        start,
        4,
    )?;
    let next = LittleEndian::read_u16(&page[start + 4..]);
    dec.tuple_tag(slot, &format!("nextOffset: {}", next), Color::BlueDark, start + 4, 2)?;
    let hi = LittleEndian::read_u16(&page[start + 6..]);
    let lo = LittleEndian::read_u16(&page[start + 8..]);
    let offset = LittleEndian::read_u16(&page[start + 10..]);
    dec.tuple_tag(slot, &format!("pointer->bi_hi: {}", hi), Color::BlueLight, start + 6, 2)?;
    dec.tuple_tag(slot, &format!("pointer->bi_lo: {}", lo), Color::BlueLight, start + 8, 2)?;
    dec.tuple_tag(slot, &format!("pointer->offsetNumber: {}", offset), Color::BlueDark, start + 10, 2)?;
    let xid = LittleEndian::read_u32(&page[start + 12..]);
    dec.tuple_tag(slot, &format!("xid: {}", xid), Color::RedLight, start + 12, 4)
}

fn emit_leaf_tuple(dec: &mut PageDecoder<'_>, slot: u16, start: usize, tuple: &[u8]) -> Result<(), HexeditError> {
    let hdr = match LeafTupleHeader::parse(tuple) {
        Some(h) if tuple.len() >= SGLTHDRSZ => h,
        _ => {
            dec.fail(
                Some(slot),
                format!("lp_len {} is too small for an SP-GiST leaf tuple", tuple.len()),
            );
            return Ok(());
        }
    };

    dec.tuple_tag(
        slot,
        &format!("tupstate: {}, size: {}", tupstate_name(hdr.tupstate), hdr.size),
        Color::YellowDark,
        start,
        4,
    )?;
    dec.tuple_tag(slot, &format!("nextOffset: {}", hdr.next_offset), Color::BlueDark, start + 4, 2)?;
    let hi = LittleEndian::read_u16(&tuple[6..]);
    let lo = LittleEndian::read_u16(&tuple[8..]);
    let posid = LittleEndian::read_u16(&tuple[10..]);
    dec.tuple_tag(slot, &format!("heapPtr->bi_hi: {}", hi), Color::BlueLight, start + 6, 2)?;
    dec.tuple_tag(slot, &format!("heapPtr->bi_lo: {}", lo), Color::BlueLight, start + 8, 2)?;
    dec.tuple_tag(slot, &format!("heapPtr->offsetNumber: {}", posid), Color::BlueDark, start + 10, 2)?;

    if hdr.size < SGLTHDRSZ || hdr.size > tuple.len() {
        dec.fail(
            Some(slot),
            format!("leaf tuple size {} is inconsistent with lp_len {}", hdr.size, tuple.len()),
        );
        return Ok(());
    }
    if hdr.size > SGLTHDRSZ {
        dec.tuple_tag(slot, "leaf datum", Color::White, start + SGLTHDRSZ, hdr.size - SGLTHDRSZ)?;
    }
    Ok(())
}

fn emit_inner_tuple(dec: &mut PageDecoder<'_>, slot: u16, start: usize, tuple: &[u8]) -> Result<(), HexeditError> {
    let hdr = match InnerTupleHeader::parse(tuple) {
        Some(h) => h,
        None => {
            dec.fail(
                Some(slot),
                format!("lp_len {} is too small for an SP-GiST inner tuple", tuple.len()),
            );
            return Ok(());
        }
    };

    let mut label = format!(
        "tupstate: {}, nNodes: {}, prefixSize: {}",
        tupstate_name(hdr.tupstate),
        hdr.n_nodes,
        hdr.prefix_size
    );
    if hdr.all_the_same {
        label.push_str(", allTheSame");
    }
    dec.tuple_tag(slot, &label, Color::YellowDark, start, 4)?;
    dec.tuple_tag(slot, &format!("size: {}", hdr.size), Color::YellowDark, start + 4, 2)?;

    if hdr.size < SGITHDRSZ + hdr.prefix_size || hdr.size > tuple.len() {
        dec.fail(
            Some(slot),
            format!(
                "inner tuple size {} is inconsistent with prefix size {} and lp_len {}",
                hdr.size,
                hdr.prefix_size,
                tuple.len()
            ),
        );
        return Ok(());
    }
    if hdr.prefix_size > 0 {
        dec.tuple_tag(slot, "prefix datum", Color::White, start + SGITHDRSZ, hdr.prefix_size)?;
    }

    let mut pos = SGITHDRSZ + hdr.prefix_size;
    for node in 0..hdr.n_nodes {
        let node_hdr = match tuple.get(pos..hdr.size).and_then(IndexTupleHeader::parse) {
            Some(h) => h,
            None => {
                dec.fail(
                    Some(slot),
                    format!("node {} header at offset {} runs past inner tuple size {}", node, pos, hdr.size),
                );
                return Ok(());
            }
        };
        let node_size = node_hdr.size();
        let min_size = if node_hdr.has_nulls() {
            SIZEOF_INDEX_TUPLE + SIZEOF_INDEX_ATTR_BITMAP
        } else {
            SIZEOF_INDEX_TUPLE
        };
        if node_size < min_size || pos + node_size > hdr.size {
            dec.fail(
                Some(slot),
                format!("node {} of size {} at offset {} is too small or overruns inner tuple", node, node_size, pos),
            );
            return Ok(());
        }

        let base = start + pos;
        dec.tuple_tag(
            slot,
            &format!("node {} t_tid->bi_hi: {}", node, node_hdr.block >> 16),
            Color::BlueLight,
            base,
            2,
        )?;
        dec.tuple_tag(
            slot,
            &format!("node {} t_tid->bi_lo: {}", node, node_hdr.block & 0xFFFF),
            Color::BlueLight,
            base + 2,
            2,
        )?;
        dec.tuple_tag(
            slot,
            &format!("node {} t_tid->offsetNumber: {}", node, node_hdr.offset),
            Color::BlueDark,
            base + 4,
            2,
        )?;
        dec.tuple_tag(
            slot,
            &format!("node {} {}", node, node_hdr.info_label()),
            Color::YellowDark,
            base + IT_INFO,
            2,
        )?;
        let data_off = node_hdr.data_offset();
        if node_hdr.has_nulls() {
            dec.tuple_tag(
                slot,
                &format!("node {} IndexAttributeBitMapData array", node),
                Color::YellowDark,
                base + SIZEOF_INDEX_TUPLE,
                SIZEOF_INDEX_ATTR_BITMAP,
            )?;
        }
        if node_size > data_off {
            dec.tuple_tag(slot, &format!("node {} label", node), Color::White, base + data_off, node_size - data_off)?;
        }
        pos += node_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_bitfield() {
        let mut buf = [0u8; 8];
        let word: u32 = SPGIST_LIVE as u32 | (1 << 2) | (5 << 3) | (12 << 16);
        LittleEndian::write_u32(&mut buf, word);
        LittleEndian::write_u16(&mut buf[4..], 64);
        let hdr = InnerTupleHeader::parse(&buf).unwrap();
        assert_eq!(hdr.tupstate, SPGIST_LIVE);
        assert!(hdr.all_the_same);
        assert_eq!(hdr.n_nodes, 5);
        assert_eq!(hdr.prefix_size, 12);
        assert_eq!(hdr.size, 64);
    }

    #[test]
    fn test_leaf_bitfield() {
        let mut buf = [0u8; 16];
        LittleEndian::write_u32(&mut buf, (24 << 2) | SPGIST_DEAD as u32);
        LittleEndian::write_u16(&mut buf[4..], 3);
        let hdr = LeafTupleHeader::parse(&buf).unwrap();
        assert_eq!(hdr.tupstate, SPGIST_DEAD);
        assert_eq!(hdr.size, 24);
        assert_eq!(hdr.next_offset, 3);
        assert_eq!(tupstate_name(hdr.tupstate), "SPGIST_DEAD");
    }
}
