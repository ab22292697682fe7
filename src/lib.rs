//! PostgreSQL relation file page decoder.
//!
//! The `pg-hexedit` crate (library name `pghex`) decodes the on-disk page
//! format of PostgreSQL heap and index relation files and annotates every
//! byte range with a label and a display colour. The resulting tags are meant
//! for an external hex editor (wxHexEditor's XML tag format is provided), so
//! that a possibly corrupt or torn relation file can be inspected byte by byte.
//!
//! # CLI Reference
//!
//! | Command | Purpose |
//! |---------|---------|
//! | [`pg_hexedit tags`](cli::app::Commands::Tags) | Emit annotated tags for every block (wxHexEditor XML or JSON) |
//! | [`pg_hexedit classify`](cli::app::Commands::Classify) | One-line summary of each block's page variant and header |
//! | [`pg_hexedit checksum`](cli::app::Commands::Checksum) | Verify data checksums of every block |
//! | [`pg_hexedit dump`](cli::app::Commands::Dump) | Hex dump of raw block bytes |
//! | [`pg_hexedit completions`](cli::app::Commands::Completions) | Shell completion scripts |
//!
//! All subcommands accept `--color <auto|always|never>`, `--output <file>` and
//! `--mmap`.
//!
//! # Library API
//!
//! ```no_run
//! use pghex::pg::driver::decode_file;
//! use pghex::pg::session::DecodeOptions;
//! use pghex::pg::tag::TagCollector;
//!
//! let mut sink = TagCollector::new();
//! let outcome = decode_file("16384", &DecodeOptions::default(), &mut sink).unwrap();
//! println!("{} tags, clean: {}", sink.tags().len(), !outcome.had_errors);
//! ```
//!
//! ## Key entry points
//!
//! | Type / Function | Purpose |
//! |-----------------|---------|
//! | [`SegmentFile`](pg::segment::SegmentFile) | Open a relation segment, detect block size, read blocks |
//! | [`PageHeader`](pg::page::PageHeader) | Parse the 24-byte header on every page |
//! | [`classify`](pg::page_types::classify) | Identify the page variant from its special section |
//! | [`pg_checksum_page`](pg::checksum::pg_checksum_page) | PostgreSQL data checksum algorithm |
//! | [`Driver`](pg::driver::Driver) | Page-stream driver producing tags for a whole segment |
//! | [`TagSink`](pg::tag::TagSink) | Destination for emitted tags |
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pg::segment`] | File I/O, block size detection, segment numbering |
//! | [`pg::page`] | Page header parsing and bounds validation |
//! | [`pg::page_types`] | Page variant enum and special-section classifier |
//! | [`pg::checksum`] | Data checksum computation and verification |
//! | [`pg::item`] | Line pointer (ItemId) array decoding |
//! | [`pg::heap`] | Heap tuple decoding |
//! | [`pg::index`] | Index tuple decoding (B-tree, GIN, GiST, hash) |
//! | [`pg::attribute`] | Attribute schema and attribute walker |
//! | [`pg::gin`] | GIN posting lists and posting tree pages |
//! | [`pg::spgist`] | SP-GiST inner and leaf tuples |
//! | [`pg::brin`] | BRIN tuples and revmap pages |
//! | [`pg::special`] | Special section (trailer) decoding |
//! | [`pg::metapage`] | Index metapage decoding |
//! | [`pg::session`] | Decode options and per-file session state |
//! | [`pg::driver`] | Page-stream driver |
//! | [`pg::tag`] | Tag model and tag sinks |
//! | [`util::sink`] | wxHexEditor XML and JSON tag writers |
//! | [`util::hex`] | Hex dump formatting |

#[cfg(feature = "cli")]
pub mod cli;
pub mod pg;
pub mod util;

use thiserror::Error;

/// Errors returned by `pghex` operations.
///
/// Only unrecoverable conditions are reported this way. Structural problems
/// found while decoding a page are recorded on the
/// [`Session`](pg::session::Session) and decoding continues.
#[derive(Error, Debug)]
pub enum HexeditError {
    /// An I/O error occurred (file open, read, seek, or output write failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// A parse error occurred (input too damaged to start decoding).
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid argument was supplied (bad range, LSN, schema string, etc.).
    #[error("Invalid argument: {0}")]
    Argument(String),
}
