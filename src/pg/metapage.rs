//! Index metapage decoding.
//!
//! Block 0 of B-tree, GIN, hash, SP-GiST and BRIN indexes holds a metapage
//! instead of tuples: a fixed struct at the start of the page contents
//! describing the index as a whole. Field sets differ by access method and,
//! for B-tree and hash, by on-disk format version, so each layout is built
//! from small field tables selected by the version read from the page.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::constants::*;
use crate::pg::page_types::PageVariant;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// How a metapage field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    I64,
    F64,
    /// Array of `n` u32 values, tagged as one region.
    U32Array(usize),
}

impl FieldKind {
    pub fn size(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::I64 | FieldKind::F64 => 8,
            FieldKind::U32Array(n) => n * 4,
        }
    }
}

/// One metapage field, at an offset relative to the page contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetaField {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

const fn field(name: &'static str, offset: usize, kind: FieldKind) -> MetaField {
    MetaField { name, offset, kind }
}

const BTREE_META_V2: &[MetaField] = &[
    field("btm_magic", 0, FieldKind::U32),
    field("btm_version", 4, FieldKind::U32),
    field("btm_root", 8, FieldKind::U32),
    field("btm_level", 12, FieldKind::U32),
    field("btm_fastroot", 16, FieldKind::U32),
    field("btm_fastlevel", 20, FieldKind::U32),
];

const BTREE_META_V3: &[MetaField] = &[
    field("btm_oldest_btpo_xact", 24, FieldKind::U32),
    field("btm_last_cleanup_num_heap_tuples", 32, FieldKind::F64),
];

const BTREE_META_V4: &[MetaField] = &[field("btm_allequalimage", 40, FieldKind::U8)];

/// B-tree metapage fields present in `version`.
pub fn btree_meta_layout(version: u32) -> Vec<MetaField> {
    let mut fields = BTREE_META_V2.to_vec();
    if version >= BTREE_NOVAC_VERSION {
        fields.extend_from_slice(BTREE_META_V3);
    }
    if version >= BTREE_VERSION {
        fields.extend_from_slice(BTREE_META_V4);
    }
    fields
}

const GIN_META: &[MetaField] = &[
    field("head", 0, FieldKind::U32),
    field("tail", 4, FieldKind::U32),
    field("tailFreeSize", 8, FieldKind::U32),
    field("nPendingPages", 12, FieldKind::U32),
    field("nPendingHeapTuples", 16, FieldKind::I64),
    field("nTotalPages", 24, FieldKind::U32),
    field("nEntryPages", 28, FieldKind::U32),
    field("nDataPages", 32, FieldKind::U32),
    field("nEntries", 40, FieldKind::I64),
    field("ginVersion", 48, FieldKind::U32),
];

const HASH_META_FIXED: &[MetaField] = &[
    field("hashm_magic", 0, FieldKind::U32),
    field("hashm_version", 4, FieldKind::U32),
    field("hashm_ntuples", 8, FieldKind::F64),
    field("hashm_ffactor", 16, FieldKind::U16),
    field("hashm_bsize", 18, FieldKind::U16),
    field("hashm_bmsize", 20, FieldKind::U16),
    field("hashm_bmshift", 22, FieldKind::U16),
    field("hashm_maxbucket", 24, FieldKind::U32),
    field("hashm_highmask", 28, FieldKind::U32),
    field("hashm_lowmask", 32, FieldKind::U32),
    field("hashm_ovflpoint", 36, FieldKind::U32),
    field("hashm_firstfree", 40, FieldKind::U32),
    field("hashm_nmaps", 44, FieldKind::U32),
    field("hashm_procid", 48, FieldKind::U32),
];

/// Hash metapage fields for `version` on a page of `block_size` bytes.
///
/// Version 3 and later use 98 split points; the bitmap page array is sized
/// `min(block_size / 8, 1024)`. Older versions use 32 and 128.
pub fn hash_meta_layout(version: u32, block_size: u32) -> Vec<MetaField> {
    let (nspares, nmaps) = if version >= 3 {
        (HASH_MAX_SPLITPOINTS, (block_size as usize / 8).min(HASH_MAX_BITMAPS))
    } else {
        (HASH_MAX_SPLITPOINTS_V2, HASH_MAX_BITMAPS_V2)
    };
    let spares_off = 52;
    let mapp_off = spares_off + nspares * 4;
    let mut fields = HASH_META_FIXED.to_vec();
    fields.push(field("hashm_spares", spares_off, FieldKind::U32Array(nspares)));
    fields.push(field("hashm_mapp", mapp_off, FieldKind::U32Array(nmaps)));
    fields
}

const SPGIST_CACHED_PAGE_NAMES: [(&str, &str); SPGIST_CACHED_PAGES] = [
    ("cachedPage[0].blkno", "cachedPage[0].freeSpace"),
    ("cachedPage[1].blkno", "cachedPage[1].freeSpace"),
    ("cachedPage[2].blkno", "cachedPage[2].freeSpace"),
    ("cachedPage[3].blkno", "cachedPage[3].freeSpace"),
    ("cachedPage[4].blkno", "cachedPage[4].freeSpace"),
    ("cachedPage[5].blkno", "cachedPage[5].freeSpace"),
    ("cachedPage[6].blkno", "cachedPage[6].freeSpace"),
    ("cachedPage[7].blkno", "cachedPage[7].freeSpace"),
];

/// SP-GiST metapage: magic number plus the last-used-page cache.
pub fn spgist_meta_layout() -> Vec<MetaField> {
    let mut fields = vec![field("magicNumber", 0, FieldKind::U32)];
    for (i, (blkno, free)) in SPGIST_CACHED_PAGE_NAMES.iter().enumerate() {
        fields.push(field(blkno, 4 + i * 8, FieldKind::U32));
        fields.push(field(free, 8 + i * 8, FieldKind::U32));
    }
    fields
}

const BRIN_META: &[MetaField] = &[
    field("brinMagic", 0, FieldKind::U32),
    field("brinVersion", 4, FieldKind::U32),
    field("pagesPerRange", 8, FieldKind::U32),
    field("lastRevmapPage", 12, FieldKind::U32),
];

fn render(page: &[u8], at: usize, kind: FieldKind) -> Option<String> {
    let data = page.get(at..at + kind.size())?;
    Some(match kind {
        FieldKind::U8 => data[0].to_string(),
        FieldKind::U16 => LittleEndian::read_u16(data).to_string(),
        FieldKind::U32 => LittleEndian::read_u32(data).to_string(),
        FieldKind::I64 => LittleEndian::read_i64(data).to_string(),
        FieldKind::F64 => LittleEndian::read_f64(data).to_string(),
        FieldKind::U32Array(n) => format!("{} entries", n),
    })
}

fn emit_fields(dec: &mut PageDecoder<'_>, fields: &[MetaField]) -> Result<(), HexeditError> {
    let page = dec.page;
    for f in fields {
        let at = PAGE_CONTENTS + f.offset;
        let label = match render(page, at, f.kind) {
            Some(value) => format!("{}: {}", f.name, value),
            None => f.name.to_string(),
        };
        dec.tag(&label, Color::Pink, at, f.kind.size())?;
    }
    Ok(())
}

fn check_magic(dec: &mut PageDecoder<'_>, what: &str, expected: u32) -> bool {
    match dec.u32_at(PAGE_CONTENTS) {
        Some(magic) if magic == expected => true,
        Some(magic) => {
            dec.fail(
                None,
                format!("{} metapage magic 0x{:08X} does not match 0x{:08X}", what, magic, expected),
            );
            false
        }
        None => false,
    }
}

/// Returns true if `variant` has a metapage at relation block 0.
pub fn has_metapage(variant: PageVariant) -> bool {
    matches!(
        variant,
        PageVariant::Btree | PageVariant::Gin | PageVariant::Hash | PageVariant::SpGist | PageVariant::Brin
    )
}

/// Tag the metapage of the index the page belongs to.
pub fn emit_metapage(dec: &mut PageDecoder<'_>) -> Result<(), HexeditError> {
    match dec.variant {
        PageVariant::Btree => {
            let magic_ok = check_magic(dec, "B-tree", BTREE_MAGIC);
            let version = dec.u32_at(PAGE_CONTENTS + 4).unwrap_or(BTREE_VERSION);
            if magic_ok {
                if (BTREE_MIN_VERSION..=BTREE_VERSION).contains(&version) {
                    dec.session.set_btree_version(version);
                } else {
                    dec.fail(None, format!("unsupported B-tree version {}", version));
                }
            }
            let layout = btree_meta_layout(version.clamp(BTREE_MIN_VERSION, BTREE_VERSION));
            emit_fields(dec, &layout)
        }
        PageVariant::Gin => emit_fields(dec, GIN_META),
        PageVariant::Hash => {
            check_magic(dec, "hash", HASH_MAGIC);
            let version = dec.u32_at(PAGE_CONTENTS + 4).unwrap_or(0);
            let layout = hash_meta_layout(version, dec.block_size());
            emit_fields(dec, &layout)
        }
        PageVariant::SpGist => {
            check_magic(dec, "SP-GiST", SPGIST_MAGIC_NUMBER);
            emit_fields(dec, &spgist_meta_layout())
        }
        PageVariant::Brin => {
            check_magic(dec, "BRIN", BRIN_META_MAGIC);
            emit_fields(dec, BRIN_META)
        }
        other => {
            dec.fail(
                None,
                format!("unsupported metapage special section type {}", other.name()),
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btree_layout_by_version() {
        assert_eq!(btree_meta_layout(2).len(), 6);
        assert_eq!(btree_meta_layout(3).len(), 8);
        let v4 = btree_meta_layout(4);
        assert_eq!(v4.len(), 9);
        assert_eq!(v4.last().unwrap().name, "btm_allequalimage");
        assert_eq!(v4.last().unwrap().offset, 40);
    }

    #[test]
    fn test_hash_layout_by_version() {
        let v4 = hash_meta_layout(4, 8192);
        let spares = v4.iter().find(|f| f.name == "hashm_spares").unwrap();
        let mapp = v4.iter().find(|f| f.name == "hashm_mapp").unwrap();
        assert_eq!(spares.kind, FieldKind::U32Array(98));
        assert_eq!(mapp.offset, 52 + 98 * 4);
        assert_eq!(mapp.kind, FieldKind::U32Array(1024));

        let v2 = hash_meta_layout(2, 8192);
        let mapp = v2.iter().find(|f| f.name == "hashm_mapp").unwrap();
        assert_eq!(mapp.offset, 52 + 32 * 4);
        assert_eq!(mapp.kind, FieldKind::U32Array(128));

        let small = hash_meta_layout(4, 1024);
        assert_eq!(small.last().unwrap().kind, FieldKind::U32Array(128));
    }

    #[test]
    fn test_spgist_layout() {
        let fields = spgist_meta_layout();
        assert_eq!(fields.len(), 17);
        assert_eq!(fields[16].offset, 8 + 7 * 8);
    }

    #[test]
    fn test_layouts_do_not_overlap() {
        for layout in [btree_meta_layout(4), hash_meta_layout(4, 8192), spgist_meta_layout(), GIN_META.to_vec()] {
            for w in layout.windows(2) {
                assert!(w[0].offset + w[0].kind.size() <= w[1].offset, "{} overlaps {}", w[0].name, w[1].name);
            }
        }
    }

    #[test]
    fn test_render_values() {
        let mut page = vec![0u8; 64];
        LittleEndian::write_f64(&mut page[8..], 2.5);
        assert_eq!(render(&page, 8, FieldKind::F64).unwrap(), "2.5");
        assert!(render(&page, 60, FieldKind::I64).is_none());
    }
}
