//! Decode options and per-file session state.
//!
//! A [`Session`] owns everything that persists across pages of one file: the
//! block size and segment geometry, the sticky error flag, the first page
//! variant seen, the B-tree version from the metapage, the tag id counter,
//! and the diagnostics recorded so far. It is passed by exclusive reference
//! through the decoders and never shared.
//!
//! [`PageDecoder`] bundles the session with the sink and the bytes of the
//! page being decoded, and provides the tag emission helpers every decoder
//! uses.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::attribute::AttributeSchema;
use crate::pg::constants::*;
use crate::pg::page::Lsn;
use crate::pg::page_types::PageVariant;
use crate::pg::tag::{Color, FontColor, Tag, TagSink};
use crate::HexeditError;

/// When to verify page checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChecksumMode {
    #[default]
    Off,
    Always,
    /// Verify only pages whose stored checksum is non-zero.
    IfNonZero,
}

/// Options consumed by the decoder.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// First block to decode and optional last block (inclusive), relative
    /// to the start of the file.
    pub range: Option<(u32, Option<u32>)>,
    pub checksum: ChecksumMode,
    /// Emit a single tag for non-root leaf pages of supported indexes.
    pub skip_leaf: bool,
    /// Skip pages whose LSN is below this value.
    pub skip_before_lsn: Option<Lsn>,
    /// Segment size in bytes (default: 131072 blocks).
    pub segment_size: Option<u32>,
    /// Segment number (default: derived from the file name).
    pub segment_number: Option<u32>,
    /// Forced block size, bypassing detection from block 0.
    pub block_size: Option<u32>,
    pub schema: Option<AttributeSchema>,
}

impl DecodeOptions {
    /// Check option values that do not depend on the input file.
    pub fn validate(&self) -> Result<(), HexeditError> {
        if let Some((start, Some(end))) = self.range {
            if end < start {
                return Err(HexeditError::Argument(format!(
                    "block range end {} is before start {}",
                    end, start
                )));
            }
        }
        if let Some(bs) = self.block_size {
            if !is_valid_block_size(bs) {
                return Err(HexeditError::Argument(format!(
                    "invalid block size {}: must be a power of two between {} and {}",
                    bs, BLCKSZ_MIN, BLCKSZ_MAX
                )));
            }
        }
        if self.segment_size == Some(0) {
            return Err(HexeditError::Argument("segment size must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for DecodeOptions {
    /// Renders the options the way they would be given on the command line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(schema) = &self.schema {
            parts.push(format!("-D {}", schema));
        }
        match self.checksum {
            ChecksumMode::Off => {}
            ChecksumMode::Always => parts.push("-k".to_string()),
            ChecksumMode::IfNonZero => parts.push("-k nonzero".to_string()),
        }
        if self.skip_leaf {
            parts.push("-l".to_string());
        }
        if let Some(n) = self.segment_number {
            parts.push(format!("-n {}", n));
        }
        if let Some((start, end)) = self.range {
            match end {
                Some(end) => parts.push(format!("-R {} {}", start, end)),
                None => parts.push(format!("-R {}", start)),
            }
        }
        if let Some(size) = self.segment_size {
            parts.push(format!("-s {}", size));
        }
        if let Some(lsn) = self.skip_before_lsn {
            parts.push(format!("-x {}", lsn));
        }
        if let Some(bs) = self.block_size {
            parts.push(format!("--block-size {}", bs));
        }
        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Returns true if `size` is a block size PostgreSQL can be built with.
pub fn is_valid_block_size(size: u32) -> bool {
    size.is_power_of_two() && (BLCKSZ_MIN..=BLCKSZ_MAX).contains(&size)
}

/// A structural problem found while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Relation-relative block number, when the problem is tied to a page.
    pub block: Option<u32>,
    /// Line pointer offset number, when tied to a tuple.
    pub slot: Option<u16>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.block, self.slot) {
            (Some(b), Some(s)) => write!(f, "block {}, item {}: {}", b, s, self.message),
            (Some(b), None) => write!(f, "block {}: {}", b, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Per-file decode state.
#[derive(Debug)]
pub struct Session {
    options: DecodeOptions,
    block_size: u32,
    segment_number: u32,
    blocks_per_segment: u32,
    first_variant: Option<PageVariant>,
    btree_version: u32,
    next_tag_id: u32,
    had_errors: bool,
    error_count: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    /// Create a session for a file with the given block size and segment
    /// number. The segment size comes from `options` or defaults to
    /// RELSEG_SIZE blocks.
    pub fn new(options: DecodeOptions, block_size: u32, segment_number: u32) -> Self {
        let blocks_per_segment = match options.segment_size {
            Some(bytes) => (bytes / block_size.max(1)).max(1),
            None => RELSEG_SIZE,
        };
        Session {
            options,
            block_size,
            segment_number,
            blocks_per_segment,
            first_variant: None,
            btree_version: BTREE_VERSION,
            next_tag_id: 0,
            had_errors: false,
            error_count: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn segment_number(&self) -> u32 {
        self.segment_number
    }

    pub fn blocks_per_segment(&self) -> u32 {
        self.blocks_per_segment
    }

    /// Convert a block number within this segment file into a block number
    /// within the relation.
    pub fn relation_block(&self, file_block: u32) -> u32 {
        self.segment_number
            .wrapping_mul(self.blocks_per_segment)
            .wrapping_add(file_block)
    }

    /// Variant of the first classified page, if any.
    pub fn first_variant(&self) -> Option<PageVariant> {
        self.first_variant
    }

    /// B-tree version from the metapage, or the current version if no
    /// metapage has been seen.
    pub fn btree_version(&self) -> u32 {
        self.btree_version
    }

    pub fn set_btree_version(&mut self, version: u32) {
        self.btree_version = version;
    }

    /// Record the variant of a page and compare it with the first one seen.
    ///
    /// A mismatch is recorded as an error; decoding continues.
    pub fn check_variant(&mut self, variant: PageVariant, block: u32) {
        match self.first_variant {
            None => self.first_variant = Some(variant),
            Some(first) if first != variant => {
                self.record(
                    Some(block),
                    None,
                    format!(
                        "special section indicates type {} but first block had type {}",
                        variant.name(),
                        first.name()
                    ),
                );
            }
            Some(_) => {}
        }
    }

    /// Record a structural problem and set the sticky error flag.
    pub fn record(&mut self, block: Option<u32>, slot: Option<u16>, message: String) {
        self.had_errors = true;
        self.error_count += 1;
        self.diagnostics.push(Diagnostic {
            block,
            slot,
            message,
        });
    }

    /// Returns true once any problem has been recorded.
    pub fn had_errors(&self) -> bool {
        self.had_errors
    }

    /// Total number of problems recorded, including drained ones.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Remove and return the diagnostics recorded since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Number of tags emitted so far.
    pub fn tags_emitted(&self) -> u32 {
        self.next_tag_id
    }

    fn next_tag_id(&mut self) -> u32 {
        let id = self.next_tag_id;
        self.next_tag_id += 1;
        id
    }
}

/// Emission context for one page.
///
/// Offsets passed to the helpers are relative to the start of the page; the
/// decoder converts them to absolute file offsets. Tags that would extend
/// past the bytes actually read are not emitted and are reported instead.
pub struct PageDecoder<'a> {
    pub session: &'a mut Session,
    sink: &'a mut dyn TagSink,
    /// Bytes actually read for this page (may be short at end of file).
    pub page: &'a [u8],
    /// Block number within the file.
    pub file_block: u32,
    /// Block number within the relation, used in labels.
    pub blkno: u32,
    /// B-tree level, shown in page-level labels of B-tree pages.
    pub level: Option<u32>,
    pub variant: PageVariant,
}

impl<'a> PageDecoder<'a> {
    pub fn new(
        session: &'a mut Session,
        sink: &'a mut dyn TagSink,
        page: &'a [u8],
        file_block: u32,
    ) -> Self {
        let blkno = session.relation_block(file_block);
        PageDecoder {
            session,
            sink,
            page,
            file_block,
            blkno,
            level: None,
            variant: PageVariant::None,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.session.block_size()
    }

    /// Returns true if the whole block was read.
    pub fn is_full(&self) -> bool {
        self.page.len() >= self.block_size() as usize
    }

    /// Absolute file offset of the first byte of this page.
    pub fn page_offset(&self) -> u64 {
        self.file_block as u64 * self.block_size() as u64
    }

    pub fn u8_at(&self, off: usize) -> Option<u8> {
        self.page.get(off).copied()
    }

    pub fn u16_at(&self, off: usize) -> Option<u16> {
        self.page.get(off..off + 2).map(LittleEndian::read_u16)
    }

    pub fn u32_at(&self, off: usize) -> Option<u32> {
        self.page.get(off..off + 4).map(LittleEndian::read_u32)
    }

    /// Emit a page-level tag labelled `block N name` (or
    /// `block N (level L) name` on B-tree pages).
    pub fn tag(&mut self, text: &str, color: Color, start: usize, len: usize) -> Result<(), HexeditError> {
        self.tag_font(text, color, FontColor::Standard, start, len)
    }

    pub fn tag_font(
        &mut self,
        text: &str,
        color: Color,
        font: FontColor,
        start: usize,
        len: usize,
    ) -> Result<(), HexeditError> {
        let label = match self.level {
            Some(level) => format!("block {} (level {}) {}", self.blkno, level, text),
            None => format!("block {} {}", self.blkno, text),
        };
        self.emit(label, color, font, start, len)
    }

    /// Emit a tuple-level tag labelled `(blkno,slot) name`.
    pub fn tuple_tag(
        &mut self,
        slot: u16,
        text: &str,
        color: Color,
        start: usize,
        len: usize,
    ) -> Result<(), HexeditError> {
        self.tuple_tag_font(slot, text, color, FontColor::Standard, start, len)
    }

    pub fn tuple_tag_font(
        &mut self,
        slot: u16,
        text: &str,
        color: Color,
        font: FontColor,
        start: usize,
        len: usize,
    ) -> Result<(), HexeditError> {
        let label = format!("({},{}) {}", self.blkno, slot, text);
        self.emit(label, color, font, start, len)
    }

    /// Record a structural problem on this page.
    pub fn fail(&mut self, slot: Option<u16>, message: String) {
        let block = self.blkno;
        self.session.record(Some(block), slot, message);
    }

    fn emit(
        &mut self,
        text: String,
        color: Color,
        font: FontColor,
        start: usize,
        len: usize,
    ) -> Result<(), HexeditError> {
        if len == 0 {
            return Ok(());
        }
        if start + len > self.page.len() {
            self.fail(
                None,
                format!(
                    "\"{}\" at page offset {} (length {}) extends past the {} bytes read",
                    text,
                    start,
                    len,
                    self.page.len()
                ),
            );
            return Ok(());
        }
        let base = self.page_offset();
        let tag = Tag {
            id: self.session.next_tag_id(),
            start: base + start as u64,
            end: base + (start + len) as u64 - 1,
            text,
            color,
            font,
        };
        self.sink.tag(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::tag::TagCollector;

    #[test]
    fn test_relation_block() {
        let session = Session::new(DecodeOptions::default(), 8192, 2);
        assert_eq!(session.relation_block(5), 2 * 131072 + 5);

        let opts = DecodeOptions {
            segment_size: Some(8192 * 10),
            ..Default::default()
        };
        let session = Session::new(opts, 8192, 3);
        assert_eq!(session.blocks_per_segment(), 10);
        assert_eq!(session.relation_block(1), 31);
    }

    #[test]
    fn test_variant_mismatch_is_sticky() {
        let mut session = Session::new(DecodeOptions::default(), 8192, 0);
        session.check_variant(PageVariant::Btree, 0);
        session.check_variant(PageVariant::Btree, 1);
        assert!(!session.had_errors());
        session.check_variant(PageVariant::Hash, 2);
        assert!(session.had_errors());
        let diags = session.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].block, Some(2));
        assert!(session.take_diagnostics().is_empty());
        assert!(session.had_errors());
        assert_eq!(session.first_variant(), Some(PageVariant::Btree));
    }

    #[test]
    fn test_page_decoder_labels_and_offsets() {
        let mut session = Session::new(DecodeOptions::default(), 1024, 0);
        let mut sink = TagCollector::new();
        let page = vec![0u8; 1024];
        {
            let mut dec = PageDecoder::new(&mut session, &mut sink, &page, 2);
            dec.tag("pd_lower", Color::Maroon, 12, 2).unwrap();
            dec.level = Some(1);
            dec.tag("btpo_next", Color::Black, 1012, 4).unwrap();
            dec.tuple_tag(3, "xmin", Color::RedDark, 100, 4).unwrap();
            dec.tag("nothing", Color::White, 10, 0).unwrap();
        }
        let tags = sink.tags();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].text, "block 2 pd_lower");
        assert_eq!(tags[0].start, 2048 + 12);
        assert_eq!(tags[0].end, 2048 + 13);
        assert_eq!(tags[1].text, "block 2 (level 1) btpo_next");
        assert_eq!(tags[2].text, "(2,3) xmin");
        assert_eq!(tags[2].id, 2);
        assert!(!session.had_errors());
    }

    #[test]
    fn test_tag_past_bytes_read_is_reported() {
        let mut session = Session::new(DecodeOptions::default(), 8192, 0);
        let mut sink = TagCollector::new();
        let page = vec![0u8; 100];
        {
            let mut dec = PageDecoder::new(&mut session, &mut sink, &page, 0);
            dec.tag("contents", Color::White, 96, 8).unwrap();
        }
        assert!(sink.tags().is_empty());
        assert!(session.had_errors());
    }

    #[test]
    fn test_options_validate_and_display() {
        let opts = DecodeOptions {
            range: Some((5, Some(2))),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = DecodeOptions {
            block_size: Some(3000),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = DecodeOptions {
            range: Some((1, Some(4))),
            checksum: ChecksumMode::Always,
            skip_leaf: true,
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
        assert_eq!(opts.to_string(), "-k -l -R 1 4");
        assert_eq!(DecodeOptions::default().to_string(), "None");
    }

    #[test]
    fn test_block_size_validity() {
        assert!(is_valid_block_size(8192));
        assert!(is_valid_block_size(1024));
        assert!(is_valid_block_size(32768));
        assert!(!is_valid_block_size(512));
        assert!(!is_valid_block_size(65536));
        assert!(!is_valid_block_size(8000));
    }
}
