/// PostgreSQL page and tuple layout constants.
///
/// These values are derived from the PostgreSQL source code headers:
/// - storage/bufpage.h, storage/itemid.h (page header, line pointers)
/// - access/htup_details.h, access/itup.h (heap and index tuples)
/// - access/nbtree.h, access/gin_private.h, access/gist.h, access/hash.h,
///   access/spgist_private.h, access/brin_page.h, access/brin_tuple.h
// Block sizes
pub const BLCKSZ_DEFAULT: u32 = 8192;
pub const BLCKSZ_MIN: u32 = 1024;
pub const BLCKSZ_MAX: u32 = 32768;

/// Default number of blocks per segment file (1 GiB of 8 KiB blocks).
pub const RELSEG_SIZE: u32 = 131072;

/// Platform maximum alignment.
pub const MAXIMUM_ALIGNOF: usize = 8;

// Page header (24 bytes)
pub const SIZE_PAGE_HEADER: usize = 24;
pub const PD_LSN: usize = 0; // 8 bytes - xlogid u32 + xrecoff u32
pub const PD_CHECKSUM: usize = 8; // 2 bytes
pub const PD_FLAGS: usize = 10; // 2 bytes
pub const PD_LOWER: usize = 12; // 2 bytes - end of line pointer array
pub const PD_UPPER: usize = 14; // 2 bytes - start of tuple space
pub const PD_SPECIAL: usize = 16; // 2 bytes - start of special section
pub const PD_PAGESIZE_VERSION: usize = 18; // 2 bytes - layout version (low byte) + size
pub const PD_PRUNE_XID: usize = 20; // 4 bytes - oldest prunable XID
pub const PD_LINP: usize = 24; // start of line pointer array

pub const PG_PAGE_LAYOUT_VERSION: u8 = 4;

// pd_flags bits
pub const PD_HAS_FREE_LINES: u16 = 0x0001;
pub const PD_PAGE_FULL: u16 = 0x0002;
pub const PD_ALL_VISIBLE: u16 = 0x0004;

// Line pointers
pub const SIZE_ITEM_ID: usize = 4;
pub const LP_UNUSED: u8 = 0;
pub const LP_NORMAL: u8 = 1;
pub const LP_REDIRECT: u8 = 2;
pub const LP_DEAD: u8 = 3;

/// Size of an ItemPointerData (block hi, block lo, offset number).
pub const SIZE_ITEM_POINTER: usize = 6;

// Heap tuple header
pub const HT_XMIN: usize = 0;
pub const HT_XMAX: usize = 4;
pub const HT_CID: usize = 8;
pub const HT_CTID: usize = 12;
pub const HT_INFOMASK2: usize = 18;
pub const HT_INFOMASK: usize = 20;
pub const HT_HOFF: usize = 22;
pub const HT_BITS: usize = 23;
pub const SIZEOF_HEAP_TUPLE_HEADER: usize = 23;

// t_infomask bits
pub const HEAP_HASNULL: u16 = 0x0001;
pub const HEAP_HASVARWIDTH: u16 = 0x0002;
pub const HEAP_HASEXTERNAL: u16 = 0x0004;
pub const HEAP_HASOID_OLD: u16 = 0x0008;
pub const HEAP_XMAX_KEYSHR_LOCK: u16 = 0x0010;
pub const HEAP_COMBOCID: u16 = 0x0020;
pub const HEAP_XMAX_EXCL_LOCK: u16 = 0x0040;
pub const HEAP_XMAX_LOCK_ONLY: u16 = 0x0080;
pub const HEAP_XMIN_COMMITTED: u16 = 0x0100;
pub const HEAP_XMIN_INVALID: u16 = 0x0200;
pub const HEAP_XMIN_FROZEN: u16 = HEAP_XMIN_COMMITTED | HEAP_XMIN_INVALID;
pub const HEAP_XMAX_COMMITTED: u16 = 0x0400;
pub const HEAP_XMAX_INVALID: u16 = 0x0800;
pub const HEAP_XMAX_IS_MULTI: u16 = 0x1000;
pub const HEAP_UPDATED: u16 = 0x2000;
pub const HEAP_MOVED_OFF: u16 = 0x4000;
pub const HEAP_MOVED_IN: u16 = 0x8000;
pub const HEAP_MOVED: u16 = HEAP_MOVED_OFF | HEAP_MOVED_IN;

// t_infomask2 bits
pub const HEAP_NATTS_MASK: u16 = 0x07FF;
pub const HEAP_KEYS_UPDATED: u16 = 0x2000;
pub const HEAP_HOT_UPDATED: u16 = 0x4000;
pub const HEAP_ONLY_TUPLE: u16 = 0x8000;

// Special transaction IDs
pub const INVALID_TRANSACTION_ID: u32 = 0;
pub const BOOTSTRAP_TRANSACTION_ID: u32 = 1;
pub const FROZEN_TRANSACTION_ID: u32 = 2;

// Index tuple header
pub const IT_INFO: usize = 6;
pub const SIZEOF_INDEX_TUPLE: usize = 8;
pub const SIZEOF_INDEX_ATTR_BITMAP: usize = 4;
pub const INDEX_SIZE_MASK: u16 = 0x1FFF;
pub const INDEX_AM_RESERVED_BIT: u16 = 0x2000;
pub const INDEX_VAR_MASK: u16 = 0x4000;
pub const INDEX_NULL_MASK: u16 = 0x8000;

// Special section page IDs (last 2 bytes of the page)
pub const MAX_BT_CYCLE_ID: u16 = 0xFF7F;
pub const HASHO_PAGE_ID: u16 = 0xFF80;
pub const GIST_PAGE_ID: u16 = 0xFF81;
pub const SPGIST_PAGE_ID: u16 = 0xFF82;
pub const SEQUENCE_MAGIC: u32 = 0x1717;

// Special section (opaque) struct sizes, before MAXALIGN
pub const SIZE_SEQUENCE_SPECIAL: usize = 4;
pub const SIZE_BTREE_OPAQUE: usize = 16;
pub const SIZE_HASH_OPAQUE: usize = 16;
pub const SIZE_GIST_OPAQUE: usize = 16;
pub const SIZE_GIN_OPAQUE: usize = 8;
pub const SIZE_SPGIST_OPAQUE: usize = 8;
pub const SIZE_BRIN_SPECIAL: usize = 8;

// B-tree opaque
pub const BTPO_PREV: usize = 0;
pub const BTPO_NEXT: usize = 4;
pub const BTPO_LEVEL: usize = 8;
pub const BTPO_FLAGS: usize = 12;
pub const BTPO_CYCLEID: usize = 14;

pub const BTP_LEAF: u16 = 1 << 0;
pub const BTP_ROOT: u16 = 1 << 1;
pub const BTP_DELETED: u16 = 1 << 2;
pub const BTP_META: u16 = 1 << 3;
pub const BTP_HALF_DEAD: u16 = 1 << 4;
pub const BTP_SPLIT_END: u16 = 1 << 5;
pub const BTP_HAS_GARBAGE: u16 = 1 << 6;
pub const BTP_INCOMPLETE_SPLIT: u16 = 1 << 7;
pub const BTP_HAS_FULLXID: u16 = 1 << 8;

pub const BTREE_METAPAGE: u32 = 0;
pub const BTREE_MAGIC: u32 = 0x053162;
pub const BTREE_VERSION: u32 = 4;
pub const BTREE_MIN_VERSION: u32 = 2;
pub const BTREE_NOVAC_VERSION: u32 = 3;

// B-tree repurposed t_tid offset number (version 4)
pub const BT_OFFSET_MASK: u16 = 0x0FFF;
pub const BT_PIVOT_HEAP_TID_ATTR: u16 = 0x1000;
pub const BT_IS_POSTING: u16 = 0x2000;

// GIN opaque
pub const GIN_RIGHTLINK: usize = 0;
pub const GIN_MAXOFF: usize = 4;
pub const GIN_FLAGS: usize = 6;

pub const GIN_DATA: u16 = 1 << 0;
pub const GIN_LEAF: u16 = 1 << 1;
pub const GIN_DELETED: u16 = 1 << 2;
pub const GIN_META: u16 = 1 << 3;
pub const GIN_LIST: u16 = 1 << 4;
pub const GIN_LIST_FULLROW: u16 = 1 << 5;
pub const GIN_INCOMPLETE_SPLIT: u16 = 1 << 6;
pub const GIN_COMPRESSED: u16 = 1 << 7;

pub const GIN_METAPAGE_BLKNO: u32 = 0;
pub const GIN_ROOT_BLKNO: u32 = 1;
pub const GIN_TREE_POSTING: u16 = 0xFFFF;
pub const GIN_ITUP_COMPRESSED: u32 = 1 << 31;
/// Size of a PostingItem (child block id + key item pointer).
pub const SIZE_POSTING_ITEM: usize = 10;
/// Fixed part of a GinPostingList segment (first item pointer + nbytes).
pub const SIZE_GIN_POSTING_LIST_HEADER: usize = 8;
/// Bits used by the offset number when packing an item pointer into a u64.
pub const MAX_HEAP_TUPLES_PER_PAGE_BITS: u32 = 11;

// GiST opaque
pub const GIST_NSN: usize = 0;
pub const GIST_RIGHTLINK: usize = 8;
pub const GIST_FLAGS: usize = 12;
pub const GIST_PAGE_ID_OFF: usize = 14;

pub const F_LEAF: u16 = 1 << 0;
pub const F_DELETED: u16 = 1 << 1;
pub const F_TUPLES_DELETED: u16 = 1 << 2;
pub const F_FOLLOW_RIGHT: u16 = 1 << 3;
pub const F_HAS_GARBAGE: u16 = 1 << 4;

pub const GIST_ROOT_BLKNO: u32 = 0;

// Hash opaque
pub const HASHO_PREVBLKNO: usize = 0;
pub const HASHO_NEXTBLKNO: usize = 4;
pub const HASHO_BUCKET: usize = 8;
pub const HASHO_FLAG: usize = 12;
pub const HASHO_PAGE_ID_OFF: usize = 14;

pub const LH_OVERFLOW_PAGE: u16 = 1 << 0;
pub const LH_BUCKET_PAGE: u16 = 1 << 1;
pub const LH_BITMAP_PAGE: u16 = 1 << 2;
pub const LH_META_PAGE: u16 = 1 << 3;
pub const LH_BUCKET_BEING_POPULATED: u16 = 1 << 4;
pub const LH_BUCKET_BEING_SPLIT: u16 = 1 << 5;
pub const LH_BUCKET_NEEDS_SPLIT_CLEANUP: u16 = 1 << 6;
pub const LH_PAGE_HAS_DEAD_TUPLES: u16 = 1 << 7;

pub const HASH_METAPAGE: u32 = 0;
pub const HASH_MAGIC: u32 = 0x0644_0640;
pub const HASH_MAX_SPLITPOINTS: usize = 98;
pub const HASH_MAX_SPLITPOINTS_V2: usize = 32;
pub const HASH_MAX_BITMAPS: usize = 1024;
pub const HASH_MAX_BITMAPS_V2: usize = 128;

// SP-GiST opaque
pub const SPGIST_FLAGS: usize = 0;
pub const SPGIST_NREDIRECTION: usize = 2;
pub const SPGIST_NPLACEHOLDER: usize = 4;
pub const SPGIST_PAGE_ID_OFF: usize = 6;

pub const SPGIST_META: u16 = 1 << 0;
pub const SPGIST_DELETED: u16 = 1 << 1;
pub const SPGIST_LEAF: u16 = 1 << 2;
pub const SPGIST_NULLS: u16 = 1 << 3;

pub const SPGIST_METAPAGE_BLKNO: u32 = 0;
pub const SPGIST_ROOT_BLKNO: u32 = 1;
pub const SPGIST_NULL_BLKNO: u32 = 2;
pub const SPGIST_MAGIC_NUMBER: u32 = 0xBA0B_ABEE;
pub const SPGIST_CACHED_PAGES: usize = 8;

// SP-GiST tuple states
pub const SPGIST_LIVE: u8 = 0;
pub const SPGIST_REDIRECT: u8 = 1;
pub const SPGIST_DEAD: u8 = 2;
pub const SPGIST_PLACEHOLDER: u8 = 3;

pub const SGITHDRSZ: usize = 8;
pub const SGLTHDRSZ: usize = 16;
pub const SGDTSIZE: usize = 16;

// BRIN special space and pages
pub const BRIN_PAGETYPE_META: u16 = 0xF091;
pub const BRIN_PAGETYPE_REVMAP: u16 = 0xF092;
pub const BRIN_PAGETYPE_REGULAR: u16 = 0xF093;
pub const BRIN_EVACUATE_PAGE: u16 = 1 << 0;
pub const BRIN_META_MAGIC: u32 = 0xA810_9CFA;
pub const BRIN_METAPAGE_BLKNO: u32 = 0;

// BRIN tuple
pub const SIZEOF_BRIN_TUPLE: usize = 5;
pub const BRIN_OFFSET_MASK: u8 = 0x1F;
pub const BRIN_EMPTY_RANGE_MASK: u8 = 0x20;
pub const BRIN_PLACEHOLDER_MASK: u8 = 0x40;
pub const BRIN_NULLS_MASK: u8 = 0x80;

// Varlena headers
pub const VARTAG_INDIRECT: u8 = 1;
pub const VARTAG_EXPANDED_RO: u8 = 2;
pub const VARTAG_EXPANDED_RW: u8 = 3;
pub const VARTAG_ONDISK: u8 = 18;
pub const SIZE_VARATT_EXTERNAL: usize = 16;
pub const SIZE_VARATT_POINTER: usize = 8;

/// Round `len` up to a multiple of `align` (a power of two).
pub const fn type_align(align: usize, len: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Round `len` up to MAXIMUM_ALIGNOF.
pub const fn maxalign(len: usize) -> usize {
    type_align(MAXIMUM_ALIGNOF, len)
}

/// Round `len` up to a multiple of 2.
pub const fn shortalign(len: usize) -> usize {
    type_align(2, len)
}

/// Start of page contents for pages without line pointers (metapages etc).
pub const PAGE_CONTENTS: usize = maxalign(SIZE_PAGE_HEADER);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(maxalign(0), 0);
        assert_eq!(maxalign(1), 8);
        assert_eq!(maxalign(23), 24);
        assert_eq!(maxalign(24), 24);
        assert_eq!(shortalign(5), 6);
        assert_eq!(type_align(4, 13), 16);
        assert_eq!(PAGE_CONTENTS, 24);
    }

    #[test]
    fn test_special_sizes_collapse_under_maxalign() {
        assert_eq!(maxalign(SIZE_SEQUENCE_SPECIAL), 8);
        assert_eq!(maxalign(SIZE_SPGIST_OPAQUE), 8);
        assert_eq!(maxalign(SIZE_GIN_OPAQUE), 8);
        assert_eq!(maxalign(SIZE_BRIN_SPECIAL), 8);
        assert_eq!(maxalign(SIZE_BTREE_OPAQUE), 16);
        assert_eq!(maxalign(SIZE_HASH_OPAQUE), 16);
        assert_eq!(maxalign(SIZE_GIST_OPAQUE), 16);
    }
}
