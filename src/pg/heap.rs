//! Heap tuple decoding.
//!
//! A heap tuple starts with the 23-byte `HeapTupleHeaderData`: xmin, xmax,
//! cid (or xvac for tuples moved by old-style VACUUM FULL), the ctid, two
//! infomask words and `t_hoff`. An optional null bitmap and, for tables
//! created WITH OIDS before PostgreSQL 12, a 4-byte OID follow, padded to
//! `t_hoff`. The attribute data starts at `t_hoff`.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::attribute::emit_attributes;
use crate::pg::constants::*;
use crate::pg::item::LinePointer;
use crate::pg::session::PageDecoder;
use crate::pg::tag::{Color, FontColor};
use crate::HexeditError;

/// Parsed heap tuple header.
#[derive(Debug, Clone, Serialize)]
pub struct HeapTupleHeader {
    pub xmin: u32,
    pub xmax: u32,
    /// t_cid, or t_xvac when HEAP_MOVED is set.
    pub cid: u32,
    pub ctid_block: u32,
    pub ctid_offset: u16,
    pub infomask2: u16,
    pub infomask: u16,
    pub hoff: u8,
}

impl HeapTupleHeader {
    /// Parse a heap tuple header. `data` must hold at least 23 bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZEOF_HEAP_TUPLE_HEADER {
            return None;
        }
        let bi_hi = LittleEndian::read_u16(&data[HT_CTID..]) as u32;
        let bi_lo = LittleEndian::read_u16(&data[HT_CTID + 2..]) as u32;
        Some(HeapTupleHeader {
            xmin: LittleEndian::read_u32(&data[HT_XMIN..]),
            xmax: LittleEndian::read_u32(&data[HT_XMAX..]),
            cid: LittleEndian::read_u32(&data[HT_CID..]),
            ctid_block: (bi_hi << 16) | bi_lo,
            ctid_offset: LittleEndian::read_u16(&data[HT_CTID + 4..]),
            infomask2: LittleEndian::read_u16(&data[HT_INFOMASK2..]),
            infomask: LittleEndian::read_u16(&data[HT_INFOMASK..]),
            hoff: data[HT_HOFF],
        })
    }

    /// Number of attributes stored in the tuple.
    pub fn natts(&self) -> usize {
        (self.infomask2 & HEAP_NATTS_MASK) as usize
    }

    pub fn has_nulls(&self) -> bool {
        self.infomask & HEAP_HASNULL != 0
    }

    pub fn has_oid(&self) -> bool {
        self.infomask & HEAP_HASOID_OLD != 0
    }

    pub fn is_moved(&self) -> bool {
        self.infomask & HEAP_MOVED != 0
    }

    /// Size of the null bitmap in bytes (zero without HEAP_HASNULL).
    pub fn bitmap_len(&self) -> usize {
        if self.has_nulls() {
            self.natts().div_ceil(8)
        } else {
            0
        }
    }

    /// `t_hoff` implied by the flags: header, bitmap and OID, MAXALIGNed.
    pub fn computed_hoff(&self) -> usize {
        let oid = if self.has_oid() { 4 } else { 0 };
        maxalign(SIZEOF_HEAP_TUPLE_HEADER + self.bitmap_len() + oid)
    }
}

/// Label and font for xmin, from the special XIDs and the hint bits.
pub fn xmin_status(xmin: u32, infomask: u16) -> (String, FontColor) {
    if xmin == FROZEN_TRANSACTION_ID {
        return (format!("xmin: {} (FrozenTransactionId)", xmin), FontColor::Committed);
    }
    if xmin == BOOTSTRAP_TRANSACTION_ID {
        return (format!("xmin: {} (BootstrapTransactionId)", xmin), FontColor::Committed);
    }
    if infomask & HEAP_XMIN_FROZEN == HEAP_XMIN_FROZEN {
        (format!("xmin: {} (frozen)", xmin), FontColor::Committed)
    } else if infomask & HEAP_XMIN_COMMITTED != 0 {
        (format!("xmin: {} (committed)", xmin), FontColor::Committed)
    } else if infomask & HEAP_XMIN_INVALID != 0 {
        (format!("xmin: {} (aborted)", xmin), FontColor::Aborted)
    } else {
        (format!("xmin: {}", xmin), FontColor::InProgress)
    }
}

/// Label and font for xmax.
pub fn xmax_status(xmax: u32, infomask: u16) -> (String, FontColor) {
    let mut notes = Vec::new();
    if infomask & HEAP_XMAX_IS_MULTI != 0 {
        notes.push("multixact");
    }
    if infomask & HEAP_XMAX_LOCK_ONLY != 0 {
        notes.push("lock only");
    }

    let font = if xmax == INVALID_TRANSACTION_ID {
        FontColor::Muted
    } else if infomask & HEAP_XMAX_INVALID != 0 {
        notes.push("invalid");
        FontColor::Aborted
    } else if infomask & HEAP_XMAX_COMMITTED != 0 {
        notes.push("committed");
        FontColor::Committed
    } else {
        FontColor::InProgress
    };

    if notes.is_empty() {
        (format!("xmax: {}", xmax), font)
    } else {
        (format!("xmax: {} ({})", xmax, notes.join(", ")), font)
    }
}

/// Flag names set in `t_infomask`.
pub fn infomask_names(infomask: u16) -> Vec<&'static str> {
    const FLAGS: &[(u16, &str)] = &[
        (HEAP_HASNULL, "HEAP_HASNULL"),
        (HEAP_HASVARWIDTH, "HEAP_HASVARWIDTH"),
        (HEAP_HASEXTERNAL, "HEAP_HASEXTERNAL"),
        (HEAP_HASOID_OLD, "HEAP_HASOID_OLD"),
        (HEAP_XMAX_KEYSHR_LOCK, "HEAP_XMAX_KEYSHR_LOCK"),
        (HEAP_COMBOCID, "HEAP_COMBOCID"),
        (HEAP_XMAX_EXCL_LOCK, "HEAP_XMAX_EXCL_LOCK"),
        (HEAP_XMAX_LOCK_ONLY, "HEAP_XMAX_LOCK_ONLY"),
        (HEAP_XMIN_COMMITTED, "HEAP_XMIN_COMMITTED"),
        (HEAP_XMIN_INVALID, "HEAP_XMIN_INVALID"),
        (HEAP_XMAX_COMMITTED, "HEAP_XMAX_COMMITTED"),
        (HEAP_XMAX_INVALID, "HEAP_XMAX_INVALID"),
        (HEAP_XMAX_IS_MULTI, "HEAP_XMAX_IS_MULTI"),
        (HEAP_UPDATED, "HEAP_UPDATED"),
        (HEAP_MOVED_OFF, "HEAP_MOVED_OFF"),
        (HEAP_MOVED_IN, "HEAP_MOVED_IN"),
    ];
    FLAGS
        .iter()
        .filter(|(bit, _)| infomask & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

/// Flag names set in `t_infomask2`.
pub fn infomask2_names(infomask2: u16) -> Vec<&'static str> {
    let mut names = Vec::new();
    if infomask2 & HEAP_KEYS_UPDATED != 0 {
        names.push("HEAP_KEYS_UPDATED");
    }
    if infomask2 & HEAP_HOT_UPDATED != 0 {
        names.push("HEAP_HOT_UPDATED");
    }
    if infomask2 & HEAP_ONLY_TUPLE != 0 {
        names.push("HEAP_ONLY_TUPLE");
    }
    names
}

fn with_flags(prefix: String, names: &[&str]) -> String {
    if names.is_empty() {
        prefix
    } else {
        format!("{} ({})", prefix, names.join("|"))
    }
}

/// Decode one heap tuple.
pub fn emit_heap_tuple(dec: &mut PageDecoder<'_>, item: &LinePointer) -> Result<(), HexeditError> {
    let slot = item.slot;
    let start = item.offset as usize;
    let len = item.len as usize;
    let page = dec.page;

    let hdr = match page.get(start..start + len).and_then(HeapTupleHeader::parse) {
        Some(h) => h,
        None => {
            dec.fail(
                Some(slot),
                format!("lp_len {} is too small for a heap tuple header", len),
            );
            return Ok(());
        }
    };

    let (xmin_text, xmin_font) = xmin_status(hdr.xmin, hdr.infomask);
    dec.tuple_tag_font(slot, &xmin_text, Color::RedDark, xmin_font, start + HT_XMIN, 4)?;
    let (xmax_text, xmax_font) = xmax_status(hdr.xmax, hdr.infomask);
    dec.tuple_tag_font(slot, &xmax_text, Color::RedLight, xmax_font, start + HT_XMAX, 4)?;

    if hdr.is_moved() {
        dec.tuple_tag(slot, &format!("t_xvac: {}", hdr.cid), Color::Pink, start + HT_CID, 4)?;
    } else {
        dec.tuple_tag(slot, &format!("t_cid: {}", hdr.cid), Color::BlueDark, start + HT_CID, 4)?;
    }

    let points_to_self = hdr.ctid_block == dec.blkno && hdr.ctid_offset == slot;
    let ctid_font = if points_to_self {
        FontColor::Muted
    } else {
        FontColor::Standard
    };
    dec.tuple_tag_font(
        slot,
        &format!("t_ctid->ip_blkid->bi_hi: {}", hdr.ctid_block >> 16),
        Color::BlueLight,
        ctid_font,
        start + HT_CTID,
        2,
    )?;
    dec.tuple_tag_font(
        slot,
        &format!("t_ctid->ip_blkid->bi_lo: {}", hdr.ctid_block & 0xFFFF),
        Color::BlueLight,
        ctid_font,
        start + HT_CTID + 2,
        2,
    )?;
    dec.tuple_tag_font(
        slot,
        &format!("t_ctid->ip_posid: {}", hdr.ctid_offset),
        Color::BlueDark,
        ctid_font,
        start + HT_CTID + 4,
        2,
    )?;

    dec.tuple_tag(
        slot,
        &with_flags(
            format!("t_infomask2 HeapTupleHeaderGetNatts(): {}", hdr.natts()),
            &infomask2_names(hdr.infomask2),
        ),
        Color::GreenLight,
        start + HT_INFOMASK2,
        2,
    )?;
    dec.tuple_tag(
        slot,
        &with_flags("t_infomask".to_string(), &infomask_names(hdr.infomask)),
        Color::GreenDark,
        start + HT_INFOMASK,
        2,
    )?;
    dec.tuple_tag(slot, &format!("t_hoff: {}", hdr.hoff), Color::YellowDark, start + HT_HOFF, 1)?;

    let hoff = hdr.hoff as usize;
    let computed = hdr.computed_hoff();
    if hoff != computed {
        dec.fail(
            Some(slot),
            format!("computed header length {} does not match t_hoff {}", computed, hoff),
        );
    }
    if hoff < SIZEOF_HEAP_TUPLE_HEADER {
        dec.fail(Some(slot), format!("t_hoff {} is inside the fixed tuple header", hoff));
        return Ok(());
    }
    if hoff > len {
        dec.fail(Some(slot), format!("t_hoff {} exceeds lp_len {}", hoff, len));
        return Ok(());
    }

    let bitmap_len = hdr.bitmap_len();
    let oid_len = if hdr.has_oid() { 4 } else { 0 };
    if HT_BITS + bitmap_len + oid_len > hoff {
        dec.fail(
            Some(slot),
            format!(
                "null bitmap of {} bytes does not fit before t_hoff {}",
                bitmap_len, hoff
            ),
        );
        return Ok(());
    }
    if bitmap_len > 0 {
        dec.tuple_tag(slot, "t_bits", Color::YellowDark, start + HT_BITS, bitmap_len)?;
    }
    if hdr.has_oid() {
        let oid = LittleEndian::read_u32(&page[start + hoff - 4..]);
        dec.tuple_tag(slot, &format!("t_oid: {}", oid), Color::Orange, start + hoff - 4, 4)?;
    }

    if len == hoff {
        return Ok(());
    }

    let schema = dec.session.options().schema.clone();
    match schema {
        Some(schema) => {
            let nulls = if bitmap_len > 0 {
                Some(&page[start + HT_BITS..start + HT_BITS + bitmap_len])
            } else {
                None
            };
            emit_attributes(dec, slot, start, len, hoff, hdr.natts(), nulls, &schema)
        }
        None => dec.tuple_tag(slot, "contents", Color::White, start + hoff, len - hoff),
    }
}
