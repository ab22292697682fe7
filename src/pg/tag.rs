//! Byte-region tags and tag sinks.
//!
//! A [`Tag`] annotates an inclusive byte range of the input file with a label,
//! a region colour and a font colour. Decoders hand tags to a [`TagSink`],
//! which is responsible for serializing them (see
//! [`util::sink`](crate::util::sink) for the wxHexEditor XML and JSON
//! writers). The in-memory [`TagCollector`] backs annotated hex dumps and tests.

use serde::Serialize;

use crate::HexeditError;

/// Region colour of a tag.
///
/// Colours are chosen by analogy: transaction ids are red, physical pointers
/// blue, tuple shape metadata dark yellow, payload off-white, special
/// section fields black and metapage fields pink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Color {
    Black,
    BlueDark,
    BlueLight,
    Brown,
    GreenBright,
    GreenDark,
    GreenLight,
    Maroon,
    Orange,
    Pink,
    RedDark,
    RedLight,
    White,
    YellowDark,
    YellowLight,
}

impl Color {
    /// Returns the `#RRGGBB` value for this colour.
    pub fn hex(&self) -> &'static str {
        match self {
            Color::Black => "#515A5A",
            Color::BlueDark => "#2980B9",
            Color::BlueLight => "#3498DB",
            Color::Brown => "#97333D",
            Color::GreenBright => "#50E964",
            Color::GreenDark => "#16A085",
            Color::GreenLight => "#1ABC9C",
            Color::Maroon => "#E96950",
            Color::Orange => "#FF8C00",
            Color::Pink => "#E949D1",
            Color::RedDark => "#912C21",
            Color::RedLight => "#E74C3C",
            Color::White => "#CCD1D1",
            Color::YellowDark => "#F1C40F",
            Color::YellowLight => "#E9E850",
        }
    }
}

/// Font colour of a tag.
///
/// Most tags use [`FontColor::Standard`]. Transaction-id fields switch font
/// to convey hint-bit status, and self-referencing pointers are de-emphasized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FontColor {
    Standard,
    /// Transaction known committed, or frozen.
    Committed,
    /// Transaction known aborted (or xmax invalid).
    Aborted,
    /// No hint bits set yet.
    InProgress,
    /// Cosmetic de-emphasis (e.g. a ctid pointing to its own tuple).
    Muted,
}

impl FontColor {
    /// Returns the `#RRGGBB` value for this font colour.
    pub fn hex(&self) -> &'static str {
        match self {
            FontColor::Standard => "#313739",
            FontColor::Committed => "#196F3D",
            FontColor::Aborted => "#C0392B",
            FontColor::InProgress => "#7D3C98",
            FontColor::Muted => "#979A9A",
        }
    }
}

/// One annotated byte range. `start` and `end` are absolute file offsets and
/// `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub text: String,
    pub color: Color,
    pub font: FontColor,
}

impl Tag {
    /// Number of bytes covered by this tag.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Tags always cover at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Information written once at the top of a tag document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    /// Path of the decoded file, as given by the caller.
    pub path: String,
    /// Options used, in display form.
    pub options: String,
}

/// Destination for emitted tags.
///
/// `begin` is called once before any tag, `finish` once after the last one.
pub trait TagSink {
    fn begin(&mut self, info: &DocumentInfo) -> Result<(), HexeditError>;
    fn tag(&mut self, tag: &Tag) -> Result<(), HexeditError>;
    fn finish(&mut self) -> Result<(), HexeditError>;
}

/// A [`TagSink`] that keeps every tag in memory.
#[derive(Debug, Default)]
pub struct TagCollector {
    info: Option<DocumentInfo>,
    tags: Vec<Tag>,
    finished: bool,
}

impl TagCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tags received so far, in emission order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Consume the collector, returning its tags.
    pub fn into_tags(self) -> Vec<Tag> {
        self.tags
    }

    /// Document information passed to `begin`, if it was called.
    pub fn info(&self) -> Option<&DocumentInfo> {
        self.info.as_ref()
    }

    /// Returns true once `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tags whose text contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<&Tag> {
        self.tags.iter().filter(|t| t.text.contains(needle)).collect()
    }
}

impl TagSink for TagCollector {
    fn begin(&mut self, info: &DocumentInfo) -> Result<(), HexeditError> {
        self.info = Some(info.clone());
        Ok(())
    }

    fn tag(&mut self, tag: &Tag) -> Result<(), HexeditError> {
        self.tags.push(tag.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HexeditError> {
        self.finished = true;
        Ok(())
    }
}

/// Returns the first pair of overlapping tags, if any.
///
/// Tags are compared by their byte ranges only.
pub fn find_overlap(tags: &[Tag]) -> Option<(&Tag, &Tag)> {
    let mut sorted: Vec<&Tag> = tags.iter().collect();
    sorted.sort_by_key(|t| (t.start, t.end));
    sorted
        .windows(2)
        .find(|w| w[1].start <= w[0].end)
        .map(|w| (w[0], w[1]))
}
