//! PostgreSQL relation page format decoders.
//!
//! Modules here read raw segment bytes and emit [`Tag`](tag::Tag)s through a
//! [`TagSink`](tag::TagSink). They depend only on `byteorder`, `serde` and
//! `thiserror`, so they are usable without the `cli` feature.

pub mod attribute;
pub mod brin;
pub mod checksum;
pub mod constants;
pub mod driver;
pub mod gin;
pub mod heap;
pub mod index;
pub mod item;
pub mod metapage;
pub mod page;
pub mod page_types;
pub mod segment;
pub mod session;
pub mod special;
pub mod spgist;
pub mod tag;
