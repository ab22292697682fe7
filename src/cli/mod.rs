//! CLI subcommand implementations for the `pg_hexedit` binary.
//!
//! CLI argument parsing uses clap derive macros, with the top-level
//! [`app::Cli`] struct and [`app::Commands`] enum defined in [`app`] and
//! shared between `main.rs` and `build.rs` (for man page generation) via
//! `include!()`.
//!
//! Each subcommand module follows the same pattern: an `Options` struct
//! holding the parsed arguments and a
//! `pub fn execute(opts, writer) -> Result<(), HexeditError>` entry point.
//! The `writer: &mut dyn Write` parameter allows output to be captured in
//! tests or redirected to a file via the global `--output` flag.
//!
//! # Subcommands
//!
//! | Command | Module | Purpose |
//! |---------|--------|---------|
//! | `pg_hexedit tags` | [`tags`] | Annotated tags for every block, as wxHexEditor XML or JSON |
//! | `pg_hexedit classify` | [`classify`] | Page variant, header fields and checksum status per block |
//! | `pg_hexedit checksum` | [`checksum`] | Verify data checksums and summarize |
//! | `pg_hexedit dump` | [`dump`] | Hex dump of a block or byte range, optionally annotated |
//!
//! Structural problems found while decoding are printed to stderr as
//! `pg_hexedit error: ...`; the subcommand then fails so the process exits
//! non-zero. The `wprintln!` macro wraps `writeln!` to convert `io::Error`
//! into `HexeditError`.

pub mod app;
pub mod checksum;
pub mod classify;
pub mod dump;
pub mod tags;

/// Write a line to the given writer, converting io::Error to HexeditError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::HexeditError::Io(e.to_string()))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::HexeditError::Io(e.to_string()))
    };
}

pub(crate) use wprintln;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::pg::page::Lsn;
use crate::pg::segment::SegmentFile;
use crate::pg::session::Diagnostic;
use crate::HexeditError;

/// Open a segment file, selecting mmap or buffered I/O based on the flag.
///
/// When `block_size` is `Some`, detection from block 0 is bypassed.
pub(crate) fn open_segment(
    path: &str,
    block_size: Option<u32>,
    use_mmap: bool,
) -> Result<SegmentFile, HexeditError> {
    match (use_mmap, block_size) {
        (true, bs) => SegmentFile::open_mmap(path, bs),
        (false, Some(bs)) => SegmentFile::open_with_block_size(path, bs),
        (false, None) => SegmentFile::open(path),
    }
}

/// Convert a `-R START [END]` argument list into a block range.
pub(crate) fn parse_range(values: &[u32]) -> Result<Option<(u32, Option<u32>)>, HexeditError> {
    match values {
        [] => Ok(None),
        [start] => Ok(Some((*start, None))),
        [start, end] if end >= start => Ok(Some((*start, Some(*end)))),
        [start, end] => Err(HexeditError::Argument(format!(
            "block range end {} is before start {}",
            end, start
        ))),
        _ => Err(HexeditError::Argument("block range takes at most two values".to_string())),
    }
}

/// Parse an `XXXXXXXX/XXXXXXXX` LSN argument.
pub(crate) fn parse_lsn(text: &str) -> Result<Lsn, HexeditError> {
    text.parse::<Lsn>()
}

/// Print a decoding problem to stderr.
pub(crate) fn report_diagnostic(diag: &Diagnostic) {
    eprintln!("{} {}", "pg_hexedit error:".red().bold(), diag);
}

/// Create a styled progress bar for iterating over blocks.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    if let Ok(style) = ProgressStyle::default_bar().template(&format!(
        "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
        unit
    )) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
