//! Page-stream driver.
//!
//! [`Driver`] walks a segment file block by block (optionally restricted to
//! a block range), decodes each page into tags and hands them to a
//! [`TagSink`]. Page and tuple level problems are recorded on the session
//! and surfaced to a diagnostic callback after each page; only I/O failures
//! and sink failures stop the run.
//!
//! Per page the flow is: skip uninitialized pages, apply the LSN filter,
//! classify the special section and compare it with the first page, apply
//! leaf elision, tag the header, then either the metapage, a pseudo-tuple
//! layout (GIN posting tree, hash bitmap, BRIN revmap) or the line pointer
//! array and its tuples, and finally the special section.

use std::path::Path;

use serde::Serialize;

use crate::pg::brin::{emit_brin_tuple, emit_revmap_page};
use crate::pg::constants::*;
use crate::pg::gin::emit_gin_data_page;
use crate::pg::heap::emit_heap_tuple;
use crate::pg::index::{emit_index_tuple, IndexContext};
use crate::pg::item::{check_line_pointer, emit_line_pointers, ItemCheck, LinePointer};
use crate::pg::metapage::{emit_metapage, has_metapage};
use crate::pg::page::{emit_page_header, HeaderOutcome, PageHeader};
use crate::pg::page_types::{brin_page_type, classify, PageVariant};
use crate::pg::segment::{segment_number_from_path, BlockSizeSource, SegmentFile};
use crate::pg::session::{DecodeOptions, Diagnostic, PageDecoder, Session};
use crate::pg::special::{btree_level, emit_special, is_elidable_leaf};
use crate::pg::spgist::emit_spgist_tuple;
use crate::pg::tag::{Color, DocumentInfo, TagSink};
use crate::HexeditError;

/// Lifecycle of a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    ReadingPage,
    Done,
    Aborted,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct DecodeOutcome {
    pub blocks_read: u32,
    pub tags_emitted: u32,
    pub had_errors: bool,
    pub error_count: usize,
    pub first_variant: Option<PageVariant>,
    pub block_size: u32,
    pub segment_number: u32,
}

/// Decodes one segment file into tags.
pub struct Driver {
    segment: SegmentFile,
    session: Session,
    state: DriverState,
}

impl Driver {
    /// Prepare a run over `segment`.
    ///
    /// The segment number is taken from the options, or else from the file
    /// name suffix.
    pub fn new(segment: SegmentFile, options: DecodeOptions) -> Result<Self, HexeditError> {
        options.validate()?;
        let block_size = segment.block_size();
        if let Some(size) = options.segment_size {
            if size < block_size {
                return Err(HexeditError::Argument(format!(
                    "segment size {} is smaller than the block size {}",
                    size, block_size
                )));
            }
        }
        let segment_number = options
            .segment_number
            .unwrap_or_else(|| segment_number_from_path(segment.path()));
        let mut session = Session::new(options, block_size, segment_number);
        if let BlockSizeSource::Fallback(found) = segment.block_size_source() {
            session.record(
                None,
                None,
                format!(
                    "block 0 reports page size {}, which is not a valid block size; assuming {}",
                    found, block_size
                ),
            );
        }
        Ok(Driver {
            segment,
            session,
            state: DriverState::Init,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Decode every requested block into `sink`.
    ///
    /// `on_diag` receives each recorded problem as soon as the page it was
    /// found on is finished. The sink is finished even when the run aborts.
    pub fn run<F>(&mut self, sink: &mut dyn TagSink, mut on_diag: F) -> Result<DecodeOutcome, HexeditError>
    where
        F: FnMut(&Diagnostic),
    {
        if self.state != DriverState::Init {
            return Err(HexeditError::Argument("driver has already run".to_string()));
        }

        let info = DocumentInfo {
            path: self.segment.path().to_string(),
            options: self.session.options().to_string(),
        };
        sink.begin(&info)?;
        self.state = DriverState::ReadingPage;

        let result = self.read_pages(sink, &mut on_diag);
        let finished = sink.finish();
        for diag in self.session.take_diagnostics() {
            on_diag(&diag);
        }

        let blocks_read = match result.and_then(|n| finished.map(|_| n)) {
            Ok(n) => n,
            Err(e) => {
                self.state = DriverState::Aborted;
                return Err(e);
            }
        };
        self.state = DriverState::Done;

        Ok(DecodeOutcome {
            blocks_read,
            tags_emitted: self.session.tags_emitted(),
            had_errors: self.session.had_errors(),
            error_count: self.session.error_count(),
            first_variant: self.session.first_variant(),
            block_size: self.session.block_size(),
            segment_number: self.session.segment_number(),
        })
    }

    fn read_pages(
        &mut self,
        sink: &mut dyn TagSink,
        on_diag: &mut dyn FnMut(&Diagnostic),
    ) -> Result<u32, HexeditError> {
        let (start, end) = self.session.options().range.unwrap_or((0, None));
        if start > 0 {
            self.segment.seek_block(start)?;
        }

        let block_size = self.session.block_size() as usize;
        let mut buf = Vec::with_capacity(block_size);
        let mut block = start;
        let mut blocks_read = 0u32;

        loop {
            let n = self.segment.read_next(&mut buf)?;
            if n == 0 {
                if blocks_read == 0 {
                    return Err(HexeditError::Io(format!(
                        "premature end of file encountered before block {}",
                        block
                    )));
                }
                break;
            }

            decode_page(&mut self.session, sink, &buf[..n], block)?;
            blocks_read += 1;
            for diag in self.session.take_diagnostics() {
                on_diag(&diag);
            }

            if n < block_size || end.is_some_and(|e| block >= e) {
                break;
            }
            block += 1;
        }
        Ok(blocks_read)
    }
}

/// Open `path` and decode it into `sink`, ignoring diagnostics as they
/// arrive. The outcome reports whether any were recorded.
pub fn decode_file<P: AsRef<Path>>(
    path: P,
    options: &DecodeOptions,
    sink: &mut dyn TagSink,
) -> Result<DecodeOutcome, HexeditError> {
    let segment = match options.block_size {
        Some(bs) => SegmentFile::open_with_block_size(path, bs)?,
        None => SegmentFile::open(path)?,
    };
    Driver::new(segment, options.clone())?.run(sink, |_| {})
}

/// Decode one page. `page` holds the bytes read for block `file_block`,
/// which may be fewer than the block size.
pub fn decode_page(
    session: &mut Session,
    sink: &mut dyn TagSink,
    page: &[u8],
    file_block: u32,
) -> Result<(), HexeditError> {
    let block_size = session.block_size();
    let header = PageHeader::parse(page);
    if header.is_some_and(|h| h.is_new()) {
        return Ok(());
    }

    let mut dec = PageDecoder::new(session, sink, page, file_block);
    dec.variant = classify(page, block_size).variant;
    if header.is_some() {
        let (variant, blkno) = (dec.variant, dec.blkno);
        dec.session.check_variant(variant, blkno);
    }

    if let (Some(h), Some(threshold)) = (header, dec.session.options().skip_before_lsn) {
        if h.lsn < threshold {
            return Ok(());
        }
    }

    let special = header.map_or(block_size as usize, |h| h.special as usize);
    if dec.variant == PageVariant::Btree {
        dec.level = btree_level(page, special);
    }

    if dec.session.options().skip_leaf
        && dec.is_full()
        && is_elidable_leaf(dec.variant, page, special, dec.blkno)
    {
        return dec.tag("leaf page", Color::GreenDark, 0, block_size as usize);
    }

    let (lower, max_offset) = match emit_page_header(&mut dec)? {
        HeaderOutcome::Complete {
            lower, max_offset, ..
        } => (lower as usize, max_offset),
        HeaderOutcome::PartialRead => return Ok(()),
    };

    emit_contents(&mut dec, lower, max_offset, special)?;

    if dec.variant != PageVariant::None {
        emit_special(&mut dec, special)?;
    }
    Ok(())
}

/// Everything between the header and the special section.
fn emit_contents(
    dec: &mut PageDecoder<'_>,
    lower: usize,
    max_offset: usize,
    special: usize,
) -> Result<(), HexeditError> {
    let variant = dec.variant;
    let flags = |dec: &PageDecoder<'_>, off: usize| dec.u16_at(special + off).unwrap_or(0);

    if dec.blkno == 0 && has_metapage(variant) {
        return emit_metapage(dec);
    }
    match variant {
        PageVariant::Gin if flags(dec, GIN_FLAGS) & GIN_DATA != 0 => {
            return emit_gin_data_page(dec, lower, special);
        }
        PageVariant::Hash if flags(dec, HASHO_FLAG) & LH_BITMAP_PAGE != 0 => {
            if lower > PAGE_CONTENTS {
                dec.tag("bitmap words", Color::GreenLight, PAGE_CONTENTS, lower - PAGE_CONTENTS)?;
            }
            return Ok(());
        }
        PageVariant::Brin => match brin_page_type(dec.page, special) {
            BRIN_PAGETYPE_REVMAP => return emit_revmap_page(dec),
            BRIN_PAGETYPE_META => return emit_metapage(dec),
            _ => {}
        },
        _ => {}
    }

    if max_offset == 0 {
        // A GIN page whose tuples all moved to the pending list has none.
        if variant != PageVariant::Gin {
            dec.fail(None, "empty block - no items listed".to_string());
        }
        return Ok(());
    }
    let items = emit_line_pointers(dec, max_offset)?;
    if items.is_empty() {
        return Ok(());
    }
    if variant.is_error() {
        dec.fail(
            None,
            format!("unsupported special section type \"{}\"", variant.name()),
        );
        return Ok(());
    }

    let ctx = IndexContext::for_page(dec, special);
    let spgist_leaf = flags(dec, SPGIST_FLAGS) & SPGIST_LEAF != 0;
    for item in &items {
        match check_line_pointer(item, dec.block_size(), dec.page.len()) {
            ItemCheck::Decode => emit_tuple(dec, item, &ctx, spgist_leaf)?,
            ItemCheck::Skip => {}
            ItemCheck::Invalid(message) => dec.fail(Some(item.slot), message),
        }
    }
    Ok(())
}

fn emit_tuple(
    dec: &mut PageDecoder<'_>,
    item: &LinePointer,
    ctx: &IndexContext,
    spgist_leaf: bool,
) -> Result<(), HexeditError> {
    match dec.variant {
        PageVariant::None | PageVariant::Sequence => emit_heap_tuple(dec, item),
        PageVariant::Btree | PageVariant::Hash | PageVariant::Gist | PageVariant::Gin => {
            emit_index_tuple(dec, item, ctx)
        }
        PageVariant::SpGist => emit_spgist_tuple(dec, item, spgist_leaf),
        PageVariant::Brin => emit_brin_tuple(dec, item),
        PageVariant::ErrorUnknown | PageVariant::ErrorBoundary => Ok(()),
    }
}
