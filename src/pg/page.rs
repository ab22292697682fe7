//! PostgreSQL page header parsing.
//!
//! Every page of a heap or index relation begins with the 24-byte
//! [`PageHeader`]: the LSN of the last WAL record that touched the page, the
//! data checksum, flag bits, the free-space bounds (`pd_lower`/`pd_upper`),
//! the offset of the special section, the page size and layout version, and
//! the oldest prunable XID. The line pointer array follows immediately.
//!
//! [`emit_page_header`] tags the header fields and checks the bounds
//! invariants, returning [`HeaderOutcome::PartialRead`] when the read was too
//! short to hold the header and its line pointer array.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::checksum::validate_checksum;
use crate::pg::constants::*;
use crate::pg::session::{ChecksumMode, PageDecoder};
use crate::pg::tag::Color;
use crate::HexeditError;

/// A WAL location.
///
/// On disk the page LSN is two independently written 32-bit halves
/// (`xlogid`, `xrecoff`), so it must be reassembled high-then-low rather than
/// read as one little-endian 64-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Build an LSN from its high and low halves.
    ///
    /// # Examples
    ///
    /// ```
    /// use pghex::pg::page::Lsn;
    ///
    /// let lsn = Lsn::from_halves(0x1, 0x10);
    /// assert_eq!(lsn.0, (1u64 << 32) | 0x10);
    /// assert_eq!(lsn.to_string(), "1/00000010");
    /// ```
    pub fn from_halves(hi: u32, lo: u32) -> Self {
        Lsn(((hi as u64) << 32) | lo as u64)
    }

    /// Read an LSN stored as two little-endian u32 halves.
    pub fn read(data: &[u8]) -> Self {
        Lsn::from_halves(LittleEndian::read_u32(data), LittleEndian::read_u32(&data[4..]))
    }

    pub fn hi(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn lo(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:08X}", self.hi(), self.lo())
    }
}

impl FromStr for Lsn {
    type Err = HexeditError;

    /// Parse the `XXXXXXXX/XXXXXXXX` notation. The invalid LSN `0/0` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HexeditError::Argument(format!("invalid lsn identifier \"{}\"", s));
        let (hi, lo) = s.split_once('/').ok_or_else(invalid)?;
        if hi.is_empty() || lo.is_empty() {
            return Err(invalid());
        }
        let hi = u32::from_str_radix(hi, 16).map_err(|_| invalid())?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| invalid())?;
        let lsn = Lsn::from_halves(hi, lo);
        if lsn.0 == 0 {
            return Err(invalid());
        }
        Ok(lsn)
    }
}

/// Parsed page header (24 bytes at the start of every page).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageHeader {
    /// LSN of the last change. Bytes 0-7.
    pub lsn: Lsn,
    /// Data checksum, if checksums are enabled. Bytes 8-9.
    pub checksum: u16,
    /// PD_* flag bits. Bytes 10-11.
    pub flags: u16,
    /// Offset to start of free space. Bytes 12-13.
    pub lower: u16,
    /// Offset to end of free space. Bytes 14-15.
    pub upper: u16,
    /// Offset to start of special space. Bytes 16-17.
    pub special: u16,
    /// Page size and layout version. Bytes 18-19.
    pub pagesize_version: u16,
    /// Oldest prunable XID, or zero. Bytes 20-23.
    pub prune_xid: u32,
}

impl PageHeader {
    /// Parse a page header from a byte slice.
    ///
    /// The slice must be at least SIZE_PAGE_HEADER (24) bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_PAGE_HEADER {
            return None;
        }

        Some(PageHeader {
            lsn: Lsn::read(&data[PD_LSN..]),
            checksum: LittleEndian::read_u16(&data[PD_CHECKSUM..]),
            flags: LittleEndian::read_u16(&data[PD_FLAGS..]),
            lower: LittleEndian::read_u16(&data[PD_LOWER..]),
            upper: LittleEndian::read_u16(&data[PD_UPPER..]),
            special: LittleEndian::read_u16(&data[PD_SPECIAL..]),
            pagesize_version: LittleEndian::read_u16(&data[PD_PAGESIZE_VERSION..]),
            prune_xid: LittleEndian::read_u32(&data[PD_PRUNE_XID..]),
        })
    }

    /// A page is new (never initialized) when `pd_upper` is zero.
    pub fn is_new(&self) -> bool {
        self.upper == 0
    }

    /// Page size recorded in the header.
    pub fn page_size(&self) -> u32 {
        (self.pagesize_version & 0xFF00) as u32
    }

    /// Page layout version recorded in the header.
    pub fn layout_version(&self) -> u8 {
        (self.pagesize_version & 0x00FF) as u8
    }

    /// Number of line pointers (the highest offset number in use).
    pub fn max_offset(&self) -> usize {
        let lower = self.lower as usize;
        if lower <= SIZE_PAGE_HEADER {
            0
        } else {
            (lower - SIZE_PAGE_HEADER) / SIZE_ITEM_ID
        }
    }

    /// Human-readable `pd_flags` label.
    pub fn flags_string(&self) -> String {
        let mut names = Vec::new();
        if self.flags & PD_HAS_FREE_LINES != 0 {
            names.push("PD_HAS_FREE_LINES");
        }
        if self.flags & PD_PAGE_FULL != 0 {
            names.push("PD_PAGE_FULL");
        }
        if self.flags & PD_ALL_VISIBLE != 0 {
            names.push("PD_ALL_VISIBLE");
        }
        if names.is_empty() {
            "pd_flags".to_string()
        } else {
            format!("pd_flags - {}", names.join("|"))
        }
    }

    /// Check the header's internal bounds against the file's block size.
    ///
    /// Returns one message per violated invariant; an empty vector means the
    /// header is sane.
    pub fn validate(&self, block_size: u32) -> Vec<String> {
        let bs = block_size as usize;
        let lower = self.lower as usize;
        let upper = self.upper as usize;
        let special = self.special as usize;
        let mut problems = Vec::new();

        if self.max_offset() > bs {
            problems.push(format!("line pointer count {} exceeds block size", self.max_offset()));
        }
        if self.layout_version() != PG_PAGE_LAYOUT_VERSION {
            problems.push(format!(
                "unsupported page layout version {}",
                self.layout_version()
            ));
        }
        if self.page_size() != block_size {
            problems.push(format!(
                "page size {} does not match block size {}",
                self.page_size(),
                block_size
            ));
        }
        if upper > bs {
            problems.push(format!("pd_upper {} exceeds block size", upper));
        }
        if upper > special {
            problems.push(format!("pd_upper {} exceeds pd_special {}", upper, special));
        }
        if lower < SIZE_PAGE_HEADER {
            problems.push(format!("pd_lower {} is inside the page header", lower));
        }
        if lower > bs {
            problems.push(format!("pd_lower {} exceeds block size", lower));
        }
        if upper < lower {
            problems.push(format!("pd_upper {} is below pd_lower {}", upper, lower));
        }
        if special > bs {
            problems.push(format!("pd_special {} exceeds block size", special));
        }
        problems
    }
}

/// Result of decoding a page header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderOutcome {
    /// Header and line pointer array are fully available.
    Complete {
        lower: u16,
        upper: u16,
        special: u16,
        max_offset: usize,
        layout_version: u8,
    },
    /// The read ended inside the header or its line pointer array. The rest
    /// of the page is abandoned.
    PartialRead,
}

/// Tag the page header, validate it and optionally verify its checksum.
pub fn emit_page_header(dec: &mut PageDecoder<'_>) -> Result<HeaderOutcome, HexeditError> {
    let page = dec.page;
    let header = match PageHeader::parse(page) {
        Some(h) => h,
        None => {
            dec.fail(
                None,
                format!(
                    "end of block encountered within the header. bytes read: {}",
                    page.len()
                ),
            );
            return Ok(HeaderOutcome::PartialRead);
        }
    };

    let max_offset = header.max_offset();
    let partial = page.len() < PD_LINP + max_offset * SIZE_ITEM_ID;

    dec.tag(&format!("LSN: {}", header.lsn), Color::YellowLight, PD_LSN, 8)?;
    dec.tag(&format!("checksum: 0x{:04x}", header.checksum), Color::GreenBright, PD_CHECKSUM, 2)?;
    dec.tag(&header.flags_string(), Color::YellowDark, PD_FLAGS, 2)?;
    dec.tag(&format!("pd_lower: {}", header.lower), Color::Maroon, PD_LOWER, 2)?;
    dec.tag(&format!("pd_upper: {}", header.upper), Color::Maroon, PD_UPPER, 2)?;
    dec.tag(&format!("pd_special: {}", header.special), Color::GreenBright, PD_SPECIAL, 2)?;
    dec.tag(
        &format!("pd_pagesize_version - layout version: {}", header.layout_version()),
        Color::Brown,
        PD_PAGESIZE_VERSION,
        1,
    )?;
    dec.tag(
        &format!("pd_pagesize_version - page size: {}", header.page_size()),
        Color::Brown,
        PD_PAGESIZE_VERSION + 1,
        1,
    )?;
    dec.tag(&format!("pd_prune_xid: {}", header.prune_xid), Color::RedLight, PD_PRUNE_XID, 4)?;

    let problems = header.validate(dec.block_size());
    if !problems.is_empty() {
        dec.fail(None, format!("invalid header information: {}", problems.join(", ")));
    }

    verify_page_checksum(dec, &header);

    if partial {
        dec.fail(
            None,
            format!(
                "end of block encountered within the line pointer array. bytes read: {}",
                page.len()
            ),
        );
        return Ok(HeaderOutcome::PartialRead);
    }

    Ok(HeaderOutcome::Complete {
        lower: header.lower,
        upper: header.upper,
        special: header.special,
        max_offset,
        layout_version: header.layout_version(),
    })
}

fn verify_page_checksum(dec: &mut PageDecoder<'_>, header: &PageHeader) {
    let mode = dec.session.options().checksum;
    let wanted = match mode {
        ChecksumMode::Off => false,
        ChecksumMode::Always => true,
        ChecksumMode::IfNonZero => header.checksum != 0,
    };
    if !wanted {
        return;
    }
    if dec.page.len() < dec.block_size() as usize {
        dec.fail(None, "checksum not verified on partial block".to_string());
        return;
    }

    let result = validate_checksum(dec.page, dec.blkno);
    if !result.valid {
        dec.fail(
            None,
            format!(
                "checksum failure: stored 0x{:04x}, calculated 0x{:04x}",
                result.stored, result.calculated
            ),
        );
    }
}
