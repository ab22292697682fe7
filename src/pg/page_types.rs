//! Page variant classification.
//!
//! PostgreSQL pages carry no explicit page-type field. The kind of relation a
//! page belongs to is inferred from its special section: the trailer size
//! (`block size - pd_special`), the 16-bit page id stored in the last two
//! bytes of the page, and for the 8-byte trailers a magic value at the start
//! of the special section. [`classify`] applies these checks in a fixed
//! priority order, since several variants share a trailer size and are only
//! told apart by that order.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::constants::*;

/// Page variant, determined from the special section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageVariant {
    /// No special section: heap pages (and other tables).
    None,
    /// Sequence relation page.
    Sequence,
    /// B-tree index page.
    Btree,
    /// Hash index page.
    Hash,
    /// GiST index page.
    Gist,
    /// GIN index page.
    Gin,
    /// SP-GiST index page.
    SpGist,
    /// BRIN index page.
    Brin,
    /// Special section has an unrecognized shape.
    ErrorUnknown,
    /// Special section offset is out of bounds (or the header is incomplete).
    ErrorBoundary,
}

impl PageVariant {
    /// Returns the classic `SPEC_SECT_*` name of this variant.
    pub fn name(self) -> &'static str {
        match self {
            PageVariant::None => "SPEC_SECT_NONE",
            PageVariant::Sequence => "SPEC_SECT_SEQUENCE",
            PageVariant::Btree => "SPEC_SECT_INDEX_BTREE",
            PageVariant::Hash => "SPEC_SECT_INDEX_HASH",
            PageVariant::Gist => "SPEC_SECT_INDEX_GIST",
            PageVariant::Gin => "SPEC_SECT_INDEX_GIN",
            PageVariant::SpGist => "SPEC_SECT_INDEX_SPGIST",
            PageVariant::Brin => "SPEC_SECT_INDEX_BRIN",
            PageVariant::ErrorUnknown => "SPEC_SECT_ERROR_UNKNOWN",
            PageVariant::ErrorBoundary => "SPEC_SECT_ERROR_BOUNDARY",
        }
    }

    /// Short description for summaries.
    pub fn description(self) -> &'static str {
        match self {
            PageVariant::None => "heap (no special section)",
            PageVariant::Sequence => "sequence",
            PageVariant::Btree => "B-tree index",
            PageVariant::Hash => "hash index",
            PageVariant::Gist => "GiST index",
            PageVariant::Gin => "GIN index",
            PageVariant::SpGist => "SP-GiST index",
            PageVariant::Brin => "BRIN index",
            PageVariant::ErrorUnknown => "unknown special section",
            PageVariant::ErrorBoundary => "special section out of bounds",
        }
    }

    /// Returns true for the two error variants.
    pub fn is_error(self) -> bool {
        matches!(self, PageVariant::ErrorUnknown | PageVariant::ErrorBoundary)
    }

    /// Returns true for index access method variants.
    pub fn is_index(self) -> bool {
        matches!(
            self,
            PageVariant::Btree
                | PageVariant::Hash
                | PageVariant::Gist
                | PageVariant::Gin
                | PageVariant::SpGist
                | PageVariant::Brin
        )
    }
}

impl fmt::Display for PageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of [`classify`]: the variant plus a note when the decision
/// depended on evaluation order or was made on incomplete data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub variant: PageVariant,
    pub note: Option<&'static str>,
}

impl Classification {
    fn certain(variant: PageVariant) -> Self {
        Classification { variant, note: None }
    }

    fn noted(variant: PageVariant, note: &'static str) -> Self {
        Classification {
            variant,
            note: Some(note),
        }
    }
}

/// Classify a page by its special section.
///
/// `page` holds the bytes actually read, which may be fewer than
/// `block_size` for the last block of a torn file. Checks that need the
/// page's trailing page id are only attempted on complete pages.
///
/// # Examples
///
/// ```
/// use pghex::pg::page_types::{classify, PageVariant};
///
/// let mut page = vec![0u8; 8192];
/// page[16..18].copy_from_slice(&8192u16.to_le_bytes()); // pd_special
/// assert_eq!(classify(&page, 8192).variant, PageVariant::None);
/// ```
pub fn classify(page: &[u8], block_size: u32) -> Classification {
    let bytes_read = page.len();
    let block_size = block_size as usize;

    if bytes_read < SIZE_PAGE_HEADER {
        return Classification::noted(PageVariant::ErrorBoundary, "incomplete page header");
    }

    let special = LittleEndian::read_u16(&page[PD_SPECIAL..]) as usize;
    if special == 0 || special > block_size || special > bytes_read {
        return Classification::certain(PageVariant::ErrorBoundary);
    }

    let full = bytes_read >= block_size;
    let special_size = block_size - special;
    let page_id = || LittleEndian::read_u16(&page[block_size - 2..]);

    if special_size == 0 {
        return Classification::certain(PageVariant::None);
    }

    // Sequence, SP-GiST, GIN and BRIN trailers all MAXALIGN to 8 bytes.
    if special_size == maxalign(SIZE_SEQUENCE_SPECIAL) {
        if !full {
            return Classification::noted(PageVariant::ErrorUnknown, "8-byte trailer on partial page");
        }
        if LittleEndian::read_u32(&page[special..]) == SEQUENCE_MAGIC {
            return Classification::certain(PageVariant::Sequence);
        }
        if special_size == maxalign(SIZE_SPGIST_OPAQUE) && page_id() == SPGIST_PAGE_ID {
            return Classification::certain(PageVariant::SpGist);
        }
        if special_size == maxalign(SIZE_BRIN_SPECIAL) && is_brin_page(page, special) {
            return Classification::noted(PageVariant::Brin, "BRIN page type in special section");
        }
        if special_size == maxalign(SIZE_GIN_OPAQUE) {
            return Classification::noted(PageVariant::Gin, "8-byte trailer assumed GIN");
        }
        return Classification::certain(PageVariant::ErrorUnknown);
    }

    if special_size > 2 && full {
        let id = page_id();
        if id <= MAX_BT_CYCLE_ID && special_size == maxalign(SIZE_BTREE_OPAQUE) {
            return Classification::certain(PageVariant::Btree);
        }
        if id == HASHO_PAGE_ID && special_size == maxalign(SIZE_HASH_OPAQUE) {
            return Classification::certain(PageVariant::Hash);
        }
        if id == GIST_PAGE_ID && special_size == maxalign(SIZE_GIST_OPAQUE) {
            return Classification::certain(PageVariant::Gist);
        }
    }

    Classification::certain(PageVariant::ErrorUnknown)
}

/// BRIN pages keep their page type in the last two bytes of the special
/// section. The metapage is additionally checked for its magic number.
fn is_brin_page(page: &[u8], special: usize) -> bool {
    let ptype = brin_page_type(page, special);
    match ptype {
        BRIN_PAGETYPE_META => {
            page.len() >= PAGE_CONTENTS + 4
                && LittleEndian::read_u32(&page[PAGE_CONTENTS..]) == BRIN_META_MAGIC
        }
        BRIN_PAGETYPE_REVMAP | BRIN_PAGETYPE_REGULAR => true,
        _ => false,
    }
}

/// Offset of the BRIN flags word within the special section.
///
/// `BrinSpecialSpace` is a `uint16 vector[MAXALIGN(1) / sizeof(uint16)]`
/// whose last element is the page type and second to last the flags.
pub const fn brin_flags_offset() -> usize {
    let n = maxalign(1) / 2;
    (n - 2) * 2
}

/// Offset of the BRIN page type within the special section.
pub const fn brin_type_offset() -> usize {
    let n = maxalign(1) / 2;
    (n - 1) * 2
}

/// Read the BRIN page type from a page's special section.
pub fn brin_page_type(page: &[u8], special: usize) -> u16 {
    let off = special + brin_type_offset();
    if off + 2 > page.len() {
        return 0;
    }
    LittleEndian::read_u16(&page[off..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_special(block_size: usize, special_size: usize) -> Vec<u8> {
        let mut page = vec![0u8; block_size];
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], (block_size - special_size) as u16);
        page
    }

    #[test]
    fn test_no_special_section() {
        let page = page_with_special(8192, 0);
        assert_eq!(classify(&page, 8192).variant, PageVariant::None);
    }

    #[test]
    fn test_sequence_magic() {
        let mut page = page_with_special(8192, 8);
        LittleEndian::write_u32(&mut page[8184..], SEQUENCE_MAGIC);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Sequence);
    }

    #[test]
    fn test_spgist_page_id() {
        let mut page = page_with_special(8192, 8);
        LittleEndian::write_u16(&mut page[8190..], SPGIST_PAGE_ID);
        assert_eq!(classify(&page, 8192).variant, PageVariant::SpGist);
    }

    #[test]
    fn test_brin_regular_and_meta() {
        let mut page = page_with_special(8192, 8);
        LittleEndian::write_u16(&mut page[8190..], BRIN_PAGETYPE_REGULAR);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Brin);

        // Meta page type without the magic falls through to GIN.
        LittleEndian::write_u16(&mut page[8190..], BRIN_PAGETYPE_META);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Gin);
        LittleEndian::write_u32(&mut page[PAGE_CONTENTS..], BRIN_META_MAGIC);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Brin);
    }

    #[test]
    fn test_gin_fallback_carries_note() {
        let mut page = page_with_special(8192, 8);
        LittleEndian::write_u16(&mut page[8190..], GIN_LEAF);
        let c = classify(&page, 8192);
        assert_eq!(c.variant, PageVariant::Gin);
        assert!(c.note.is_some());
    }

    #[test]
    fn test_sixteen_byte_trailers() {
        let mut page = page_with_special(8192, 16);
        LittleEndian::write_u16(&mut page[8190..], 0);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Btree);
        LittleEndian::write_u16(&mut page[8190..], HASHO_PAGE_ID);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Hash);
        LittleEndian::write_u16(&mut page[8190..], GIST_PAGE_ID);
        assert_eq!(classify(&page, 8192).variant, PageVariant::Gist);
        LittleEndian::write_u16(&mut page[8190..], SPGIST_PAGE_ID);
        assert_eq!(classify(&page, 8192).variant, PageVariant::ErrorUnknown);
    }

    #[test]
    fn test_boundary_errors() {
        let page = page_with_special(8192, 0);
        assert_eq!(classify(&page[..20], 8192).variant, PageVariant::ErrorBoundary);

        let mut page = vec![0u8; 8192];
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], 0);
        assert_eq!(classify(&page, 8192).variant, PageVariant::ErrorBoundary);

        LittleEndian::write_u16(&mut page[PD_SPECIAL..], 8176);
        assert_eq!(classify(&page[..4096], 8192).variant, PageVariant::ErrorBoundary);
    }

    #[test]
    fn test_partial_page_cannot_resolve_trailer() {
        let mut page = page_with_special(8192, 16);
        LittleEndian::write_u16(&mut page[PD_SPECIAL..], 4000);
        let c = classify(&page[..4096], 8192);
        assert_eq!(c.variant, PageVariant::ErrorUnknown);
    }

    #[test]
    fn test_unusual_trailer_size() {
        let page = page_with_special(8192, 24);
        assert_eq!(classify(&page, 8192).variant, PageVariant::ErrorUnknown);
    }

    #[test]
    fn test_brin_offsets() {
        assert_eq!(brin_flags_offset(), 4);
        assert_eq!(brin_type_offset(), 6);
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(PageVariant::Btree.name(), "SPEC_SECT_INDEX_BTREE");
        assert_eq!(format!("{}", PageVariant::None), "SPEC_SECT_NONE");
        assert!(PageVariant::ErrorUnknown.is_error());
        assert!(PageVariant::Brin.is_index());
        assert!(!PageVariant::Sequence.is_index());
    }
}
