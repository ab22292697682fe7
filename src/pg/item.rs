//! Line pointer (ItemId) array decoding.
//!
//! The array starts right after the page header and holds one 4-byte entry
//! per item: a 15-bit byte offset, a 2-bit status and a 15-bit length.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::constants::*;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Line pointer status (`lp_flags`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinePointerStatus {
    Unused,
    Normal,
    Redirect,
    Dead,
}

impl LinePointerStatus {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            LP_NORMAL => LinePointerStatus::Normal,
            LP_REDIRECT => LinePointerStatus::Redirect,
            LP_DEAD => LinePointerStatus::Dead,
            _ => LinePointerStatus::Unused,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LinePointerStatus::Unused => "LP_UNUSED",
            LinePointerStatus::Normal => "LP_NORMAL",
            LinePointerStatus::Redirect => "LP_REDIRECT",
            LinePointerStatus::Dead => "LP_DEAD",
        }
    }
}

/// One decoded line pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinePointer {
    /// 1-based offset number of this entry.
    pub slot: u16,
    /// Byte offset of the item on the page (redirect target for LP_REDIRECT).
    pub offset: u16,
    pub len: u16,
    pub status: LinePointerStatus,
}

impl LinePointer {
    /// Decode a packed line pointer word.
    pub fn from_word(slot: u16, word: u32) -> Self {
        LinePointer {
            slot,
            offset: (word & 0x7FFF) as u16,
            status: LinePointerStatus::from_bits(((word >> 15) & 0x03) as u8),
            len: (word >> 17) as u16,
        }
    }

    /// Returns true if the entry points at storage (normal or dead with storage).
    pub fn has_storage(&self) -> bool {
        self.len > 0
    }
}

/// Decode the line pointer array of a page with `max_offset` entries.
pub fn parse_line_pointers(page: &[u8], max_offset: usize) -> Vec<LinePointer> {
    (0..max_offset)
        .map_while(|i| {
            let off = PD_LINP + i * SIZE_ITEM_ID;
            page.get(off..off + SIZE_ITEM_ID)
                .map(|b| LinePointer::from_word((i + 1) as u16, LittleEndian::read_u32(b)))
        })
        .collect()
}

/// Tag every line pointer and return the decoded entries.
pub fn emit_line_pointers(
    dec: &mut PageDecoder<'_>,
    max_offset: usize,
) -> Result<Vec<LinePointer>, HexeditError> {
    let items = parse_line_pointers(dec.page, max_offset);
    for item in &items {
        let off = PD_LINP + (item.slot as usize - 1) * SIZE_ITEM_ID;
        let text = format!(
            "lp_len: {}, lp_off: {}, lp_flags: {}",
            item.len,
            item.offset,
            item.status.name()
        );
        dec.tuple_tag(item.slot, &text, Color::BlueDark, off, SIZE_ITEM_ID)?;
    }
    Ok(items)
}

/// What to do with an item after checking its line pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemCheck {
    /// The item has storage within the bytes read.
    Decode,
    /// No storage to decode (unused, redirect or dead without storage).
    Skip,
    /// The line pointer is inconsistent; the item is not decoded.
    Invalid(String),
}

/// Check a line pointer against the page before its item is decoded.
pub fn check_line_pointer(item: &LinePointer, block_size: u32, bytes_read: usize) -> ItemCheck {
    match item.status {
        LinePointerStatus::Unused | LinePointerStatus::Redirect => {
            if item.len != 0 {
                return ItemCheck::Invalid(format!(
                    "{} line pointer has non-zero length {}",
                    item.status.name(),
                    item.len
                ));
            }
            return ItemCheck::Skip;
        }
        LinePointerStatus::Normal if item.len == 0 => {
            return ItemCheck::Invalid("LP_NORMAL line pointer has zero length".to_string());
        }
        LinePointerStatus::Dead if item.len == 0 => return ItemCheck::Skip,
        _ => {}
    }

    let end = item.offset as usize + item.len as usize;
    if (item.offset as usize) < SIZE_PAGE_HEADER {
        return ItemCheck::Invalid(format!("item offset {} is inside the page header", item.offset));
    }
    if end > block_size as usize {
        return ItemCheck::Invalid(format!(
            "item at offset {} with length {} extends past the block",
            item.offset, item.len
        ));
    }
    if end > bytes_read {
        return ItemCheck::Invalid(format!(
            "item at offset {} with length {} extends past the {} bytes read",
            item.offset, item.len, bytes_read
        ));
    }
    ItemCheck::Decode
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(offset: u16, flags: u8, len: u16) -> u32 {
        (offset as u32 & 0x7FFF) | ((flags as u32 & 0x3) << 15) | ((len as u32) << 17)
    }

    #[test]
    fn test_from_word() {
        let lp = LinePointer::from_word(1, word(8152, LP_NORMAL, 40));
        assert_eq!(lp.offset, 8152);
        assert_eq!(lp.len, 40);
        assert_eq!(lp.status, LinePointerStatus::Normal);

        let lp = LinePointer::from_word(2, word(3, LP_REDIRECT, 0));
        assert_eq!(lp.status, LinePointerStatus::Redirect);
        assert_eq!(lp.offset, 3);
        assert!(!lp.has_storage());
    }

    #[test]
    fn test_parse_stops_at_end_of_data() {
        let mut page = vec![0u8; 30];
        LittleEndian::write_u32(&mut page[24..], word(100, LP_NORMAL, 8));
        let items = parse_line_pointers(&page, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slot, 1);
    }

    #[test]
    fn test_check_line_pointer() {
        let invalid = |c: ItemCheck, needle: &str| match c {
            ItemCheck::Invalid(msg) => msg.contains(needle),
            _ => false,
        };

        let ok = LinePointer::from_word(1, word(8000, LP_NORMAL, 32));
        assert_eq!(check_line_pointer(&ok, 8192, 8192), ItemCheck::Decode);

        let past = LinePointer::from_word(1, word(8180, LP_NORMAL, 32));
        assert!(invalid(check_line_pointer(&past, 8192, 8192), "past the block"));

        let short_read = LinePointer::from_word(1, word(4000, LP_NORMAL, 32));
        assert!(invalid(check_line_pointer(&short_read, 8192, 4010), "bytes read"));

        let zero = LinePointer::from_word(1, word(0, LP_NORMAL, 0));
        assert!(invalid(check_line_pointer(&zero, 8192, 8192), "zero length"));

        let unused = LinePointer::from_word(1, word(0, LP_UNUSED, 0));
        assert_eq!(check_line_pointer(&unused, 8192, 8192), ItemCheck::Skip);

        let bad_redirect = LinePointer::from_word(1, word(2, LP_REDIRECT, 4));
        assert!(invalid(check_line_pointer(&bad_redirect, 8192, 8192), "LP_REDIRECT"));

        let dead_with_storage = LinePointer::from_word(1, word(8000, LP_DEAD, 32));
        assert_eq!(check_line_pointer(&dead_with_storage, 8192, 8192), ItemCheck::Decode);
    }
}
