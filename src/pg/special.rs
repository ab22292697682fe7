//! Special section decoding.
//!
//! Each index access method keeps its per-page "opaque" data at the end of
//! the page, starting at `pd_special`. Sequences keep a magic number there.
//! Heap pages have no special section.

use byteorder::{ByteOrder, LittleEndian};

use crate::pg::constants::*;
use crate::pg::page::Lsn;
use crate::pg::page_types::{brin_flags_offset, brin_type_offset, PageVariant};
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

fn flag_names(flags: u16, table: &[(u16, &'static str)]) -> Vec<&'static str> {
    table
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

fn flags_label(field: &str, names: &[&str]) -> String {
    if names.is_empty() {
        field.to_string()
    } else {
        format!("{} - {}", field, names.join("|"))
    }
}

/// `btpo_flags` names.
pub fn btree_flag_names(flags: u16) -> Vec<&'static str> {
    flag_names(
        flags,
        &[
            (BTP_LEAF, "BTP_LEAF"),
            (BTP_ROOT, "BTP_ROOT"),
            (BTP_DELETED, "BTP_DELETED"),
            (BTP_META, "BTP_META"),
            (BTP_HALF_DEAD, "BTP_HALF_DEAD"),
            (BTP_SPLIT_END, "BTP_SPLIT_END"),
            (BTP_HAS_GARBAGE, "BTP_HAS_GARBAGE"),
            (BTP_INCOMPLETE_SPLIT, "BTP_INCOMPLETE_SPLIT"),
            (BTP_HAS_FULLXID, "BTP_HAS_FULLXID"),
        ],
    )
}

/// `hasho_flag` names.
pub fn hash_flag_names(flags: u16) -> Vec<&'static str> {
    flag_names(
        flags,
        &[
            (LH_OVERFLOW_PAGE, "LH_OVERFLOW_PAGE"),
            (LH_BUCKET_PAGE, "LH_BUCKET_PAGE"),
            (LH_BITMAP_PAGE, "LH_BITMAP_PAGE"),
            (LH_META_PAGE, "LH_META_PAGE"),
            (LH_BUCKET_BEING_POPULATED, "LH_BUCKET_BEING_POPULATED"),
            (LH_BUCKET_BEING_SPLIT, "LH_BUCKET_BEING_SPLIT"),
            (LH_BUCKET_NEEDS_SPLIT_CLEANUP, "LH_BUCKET_NEEDS_SPLIT_CLEANUP"),
            (LH_PAGE_HAS_DEAD_TUPLES, "LH_PAGE_HAS_DEAD_TUPLES"),
        ],
    )
}

/// GiST page flag names.
pub fn gist_flag_names(flags: u16) -> Vec<&'static str> {
    flag_names(
        flags,
        &[
            (F_LEAF, "F_LEAF"),
            (F_DELETED, "F_DELETED"),
            (F_TUPLES_DELETED, "F_TUPLES_DELETED"),
            (F_FOLLOW_RIGHT, "F_FOLLOW_RIGHT"),
            (F_HAS_GARBAGE, "F_HAS_GARBAGE"),
        ],
    )
}

/// GIN page flag names.
pub fn gin_flag_names(flags: u16) -> Vec<&'static str> {
    flag_names(
        flags,
        &[
            (GIN_DATA, "GIN_DATA"),
            (GIN_LEAF, "GIN_LEAF"),
            (GIN_DELETED, "GIN_DELETED"),
            (GIN_META, "GIN_META"),
            (GIN_LIST, "GIN_LIST"),
            (GIN_LIST_FULLROW, "GIN_LIST_FULLROW"),
            (GIN_INCOMPLETE_SPLIT, "GIN_INCOMPLETE_SPLIT"),
            (GIN_COMPRESSED, "GIN_COMPRESSED"),
        ],
    )
}

/// SP-GiST page flag names.
pub fn spgist_flag_names(flags: u16) -> Vec<&'static str> {
    flag_names(
        flags,
        &[
            (SPGIST_META, "SPGIST_META"),
            (SPGIST_DELETED, "SPGIST_DELETED"),
            (SPGIST_LEAF, "SPGIST_LEAF"),
            (SPGIST_NULLS, "SPGIST_NULLS"),
        ],
    )
}

pub fn brin_page_type_name(ptype: u16) -> &'static str {
    match ptype {
        BRIN_PAGETYPE_META => "BRIN_PAGETYPE_META",
        BRIN_PAGETYPE_REVMAP => "BRIN_PAGETYPE_REVMAP",
        BRIN_PAGETYPE_REGULAR => "BRIN_PAGETYPE_REGULAR",
        _ => "unknown",
    }
}

/// B-tree level of a page, read from its special section.
pub fn btree_level(page: &[u8], special: usize) -> Option<u32> {
    page.get(special + BTPO_LEVEL..special + BTPO_LEVEL + 4)
        .map(LittleEndian::read_u32)
}

/// Returns true if the page is a non-root leaf that leaf elision applies to.
pub fn is_elidable_leaf(variant: PageVariant, page: &[u8], special: usize, blkno: u32) -> bool {
    let flags = |off: usize| {
        page.get(special + off..special + off + 2)
            .map_or(0, LittleEndian::read_u16)
    };
    match variant {
        PageVariant::Btree => {
            let f = flags(BTPO_FLAGS);
            f & BTP_LEAF != 0 && f & BTP_ROOT == 0
        }
        PageVariant::Gist => flags(GIST_FLAGS) & F_LEAF != 0 && blkno != GIST_ROOT_BLKNO,
        PageVariant::Gin => flags(GIN_FLAGS) & GIN_LEAF != 0 && blkno != GIN_ROOT_BLKNO,
        PageVariant::SpGist => {
            flags(SPGIST_FLAGS) & SPGIST_LEAF != 0
                && blkno != SPGIST_ROOT_BLKNO
                && blkno != SPGIST_NULL_BLKNO
        }
        _ => false,
    }
}

fn rd16(dec: &PageDecoder<'_>, off: usize) -> u16 {
    dec.u16_at(off).unwrap_or(0)
}

fn rd32(dec: &PageDecoder<'_>, off: usize) -> u32 {
    dec.u32_at(off).unwrap_or(0)
}

/// Tag the special section of a non-meta page.
pub fn emit_special(dec: &mut PageDecoder<'_>, special: usize) -> Result<(), HexeditError> {
    match dec.variant {
        PageVariant::None => Ok(()),
        PageVariant::Sequence => {
            let magic = rd32(dec, special);
            dec.tag(&format!("sequence magic: 0x{:04X}", magic), Color::Black, special, SIZE_SEQUENCE_SPECIAL)
        }
        PageVariant::Btree => {
            let prev = rd32(dec, special + BTPO_PREV);
            let next = rd32(dec, special + BTPO_NEXT);
            let level = rd32(dec, special + BTPO_LEVEL);
            let flags = rd16(dec, special + BTPO_FLAGS);
            let cycle = rd16(dec, special + BTPO_CYCLEID);
            dec.tag(&format!("btpo_prev: {}", prev), Color::Black, special + BTPO_PREV, 4)?;
            dec.tag(&format!("btpo_next: {}", next), Color::Black, special + BTPO_NEXT, 4)?;
            dec.tag(&format!("btpo.level: {}", level), Color::Black, special + BTPO_LEVEL, 4)?;
            dec.tag(&flags_label("btpo_flags", &btree_flag_names(flags)), Color::Black, special + BTPO_FLAGS, 2)?;
            dec.tag(&format!("btpo_cycleid: {}", cycle), Color::Black, special + BTPO_CYCLEID, 2)
        }
        PageVariant::Hash => {
            let prev = rd32(dec, special + HASHO_PREVBLKNO);
            let next = rd32(dec, special + HASHO_NEXTBLKNO);
            let bucket = rd32(dec, special + HASHO_BUCKET);
            let flags = rd16(dec, special + HASHO_FLAG);
            let id = rd16(dec, special + HASHO_PAGE_ID_OFF);
            dec.tag(&format!("hasho_prevblkno: {}", prev), Color::Black, special + HASHO_PREVBLKNO, 4)?;
            dec.tag(&format!("hasho_nextblkno: {}", next), Color::Black, special + HASHO_NEXTBLKNO, 4)?;
            dec.tag(&format!("hasho_bucket: {}", bucket), Color::Black, special + HASHO_BUCKET, 4)?;
            dec.tag(&flags_label("hasho_flag", &hash_flag_names(flags)), Color::Black, special + HASHO_FLAG, 2)?;
            dec.tag(&format!("hasho_page_id: 0x{:04X}", id), Color::Black, special + HASHO_PAGE_ID_OFF, 2)
        }
        PageVariant::Gist => {
            let nsn = dec
                .page
                .get(special + GIST_NSN..special + GIST_NSN + 8)
                .map(Lsn::read)
                .unwrap_or_default();
            let right = rd32(dec, special + GIST_RIGHTLINK);
            let flags = rd16(dec, special + GIST_FLAGS);
            let id = rd16(dec, special + GIST_PAGE_ID_OFF);
            dec.tag(&format!("nsn: {}", nsn), Color::Black, special + GIST_NSN, 8)?;
            dec.tag(&format!("rightlink: {}", right), Color::Black, special + GIST_RIGHTLINK, 4)?;
            dec.tag(&flags_label("flags", &gist_flag_names(flags)), Color::Black, special + GIST_FLAGS, 2)?;
            dec.tag(&format!("gist_page_id: 0x{:04X}", id), Color::Black, special + GIST_PAGE_ID_OFF, 2)
        }
        PageVariant::Gin => {
            let right = rd32(dec, special + GIN_RIGHTLINK);
            let maxoff = rd16(dec, special + GIN_MAXOFF);
            let flags = rd16(dec, special + GIN_FLAGS);
            dec.tag(&format!("rightlink: {}", right), Color::Black, special + GIN_RIGHTLINK, 4)?;
            dec.tag(&format!("maxoff: {}", maxoff), Color::Black, special + GIN_MAXOFF, 2)?;
            dec.tag(&flags_label("flags", &gin_flag_names(flags)), Color::Black, special + GIN_FLAGS, 2)
        }
        PageVariant::SpGist => {
            let flags = rd16(dec, special + SPGIST_FLAGS);
            let nredirect = rd16(dec, special + SPGIST_NREDIRECTION);
            let nplaceholder = rd16(dec, special + SPGIST_NPLACEHOLDER);
            let id = rd16(dec, special + SPGIST_PAGE_ID_OFF);
            dec.tag(&flags_label("flags", &spgist_flag_names(flags)), Color::Black, special + SPGIST_FLAGS, 2)?;
            dec.tag(&format!("nRedirection: {}", nredirect), Color::Black, special + SPGIST_NREDIRECTION, 2)?;
            dec.tag(&format!("nPlaceholder: {}", nplaceholder), Color::Black, special + SPGIST_NPLACEHOLDER, 2)?;
            dec.tag(&format!("spgist_page_id: 0x{:04X}", id), Color::Black, special + SPGIST_PAGE_ID_OFF, 2)
        }
        PageVariant::Brin => {
            let flags = rd16(dec, special + brin_flags_offset());
            let ptype = rd16(dec, special + brin_type_offset());
            let names = if flags & BRIN_EVACUATE_PAGE != 0 {
                vec!["BRIN_EVACUATE_PAGE"]
            } else {
                Vec::new()
            };
            dec.tag(&flags_label("flags", &names), Color::Black, special + brin_flags_offset(), 2)?;
            dec.tag(
                &format!("type: {}", brin_page_type_name(ptype)),
                Color::Black,
                special + brin_type_offset(),
                2,
            )
        }
        PageVariant::ErrorUnknown | PageVariant::ErrorBoundary => {
            dec.fail(
                None,
                format!("invalid special section type {}", dec.variant.name()),
            );
            Ok(())
        }
    }
}
