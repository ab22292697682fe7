//! Concrete tag sinks.
//!
//! [`WxHexEditorSink`] writes the XML tag file format read by wxHexEditor
//! (`File > Tags > Import`); [`JsonSink`] writes one JSON document holding
//! the document information and every tag.

use std::io::Write;

use crate::pg::tag::{DocumentInfo, Tag, TagSink};
use crate::HexeditError;

fn io_err(e: std::io::Error) -> HexeditError {
    HexeditError::Io(e.to_string())
}

/// Escape text for use in XML character data and attribute values.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Writes tags in wxHexEditor's XML tag format.
pub struct WxHexEditorSink<W: Write> {
    writer: W,
    created: String,
}

impl<W: Write> WxHexEditorSink<W> {
    /// `created` is shown in the preamble comment as the dump time.
    pub fn new(writer: W, created: impl Into<String>) -> Self {
        WxHexEditorSink {
            writer,
            created: created.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TagSink for WxHexEditorSink<W> {
    fn begin(&mut self, info: &DocumentInfo) -> Result<(), HexeditError> {
        let w = &mut self.writer;
        writeln!(w, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").map_err(io_err)?;
        // "--" is not allowed inside XML comments.
        writeln!(w, "<!-- Dump created on: {} -->", self.created.replace("--", "- -")).map_err(io_err)?;
        writeln!(w, "<!-- Options used: {} -->", info.options.replace("--", "- -")).map_err(io_err)?;
        writeln!(w, "<wxHexEditor_XML_TAG>").map_err(io_err)?;
        writeln!(w, "  <filename path=\"{}\">", xml_escape(&info.path)).map_err(io_err)
    }

    fn tag(&mut self, tag: &Tag) -> Result<(), HexeditError> {
        let w = &mut self.writer;
        writeln!(w, "    <TAG id=\"{}\">", tag.id).map_err(io_err)?;
        writeln!(w, "      <start_offset>{}</start_offset>", tag.start).map_err(io_err)?;
        writeln!(w, "      <end_offset>{}</end_offset>", tag.end).map_err(io_err)?;
        writeln!(w, "      <tag_text>{}</tag_text>", xml_escape(&tag.text)).map_err(io_err)?;
        writeln!(w, "      <font_colour>{}</font_colour>", tag.font.hex()).map_err(io_err)?;
        writeln!(w, "      <note_colour>{}</note_colour>", tag.color.hex()).map_err(io_err)?;
        writeln!(w, "    </TAG>").map_err(io_err)
    }

    fn finish(&mut self) -> Result<(), HexeditError> {
        writeln!(self.writer, "  </filename>").map_err(io_err)?;
        writeln!(self.writer, "</wxHexEditor_XML_TAG>").map_err(io_err)?;
        self.writer.flush().map_err(io_err)
    }
}

/// Streams `{"path": ..., "options": ..., "tags": [...]}`.
pub struct JsonSink<W: Write> {
    writer: W,
    count: usize,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink { writer, count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TagSink for JsonSink<W> {
    fn begin(&mut self, info: &DocumentInfo) -> Result<(), HexeditError> {
        let path = serde_json::to_string(&info.path).map_err(|e| HexeditError::Parse(e.to_string()))?;
        let options = serde_json::to_string(&info.options).map_err(|e| HexeditError::Parse(e.to_string()))?;
        write!(self.writer, "{{\"path\":{},\"options\":{},\"tags\":[", path, options).map_err(io_err)
    }

    fn tag(&mut self, tag: &Tag) -> Result<(), HexeditError> {
        if self.count > 0 {
            write!(self.writer, ",").map_err(io_err)?;
        }
        serde_json::to_writer(&mut self.writer, tag).map_err(|e| HexeditError::Io(e.to_string()))?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HexeditError> {
        writeln!(self.writer, "]}}").map_err(io_err)?;
        self.writer.flush().map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::tag::{Color, FontColor};

    fn sample_tag(id: u32, text: &str) -> Tag {
        Tag {
            id,
            start: 8192,
            end: 8199,
            text: text.to_string(),
            color: Color::YellowLight,
            font: FontColor::Standard,
        }
    }

    fn info() -> DocumentInfo {
        DocumentInfo {
            path: "base/5/16384".to_string(),
            options: "-k -R 1 2".to_string(),
        }
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn test_wxhexeditor_document() {
        let mut sink = WxHexEditorSink::new(Vec::new(), "12:00:00 Monday, January 01 2024");
        sink.begin(&info()).unwrap();
        sink.tag(&sample_tag(0, "block 1 LSN: 0/016B6E28")).unwrap();
        sink.tag(&sample_tag(1, "(1,1) t_infomask (HEAP_HASNULL|HEAP_XMIN_COMMITTED) <x>")).unwrap();
        sink.finish().unwrap();
        let xml = String::from_utf8(sink.into_inner()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(xml.contains("<!-- Dump created on: 12:00:00 Monday, January 01 2024 -->"));
        assert!(xml.contains("<!-- Options used: -k -R 1 2 -->"));
        assert!(xml.contains("  <filename path=\"base/5/16384\">"));
        assert!(xml.contains("    <TAG id=\"0\">\n      <start_offset>8192</start_offset>\n      <end_offset>8199</end_offset>\n"));
        assert!(xml.contains("<tag_text>block 1 LSN: 0/016B6E28</tag_text>"));
        assert!(xml.contains("&lt;x&gt;</tag_text>"));
        assert!(xml.contains("<note_colour>#E9E850</note_colour>"));
        assert!(xml.ends_with("  </filename>\n</wxHexEditor_XML_TAG>\n"));
        assert_eq!(xml.matches("<TAG ").count(), 2);
    }

    #[test]
    fn test_comment_safe_options() {
        let mut sink = WxHexEditorSink::new(Vec::new(), "now");
        let info = DocumentInfo {
            path: "f".to_string(),
            options: "--block-size 8192".to_string(),
        };
        sink.begin(&info).unwrap();
        let xml = String::from_utf8(sink.into_inner()).unwrap();
        assert!(xml.contains("<!-- Options used: - -block-size 8192 -->"));
    }

    #[test]
    fn test_json_document() {
        let mut sink = JsonSink::new(Vec::new());
        sink.begin(&info()).unwrap();
        sink.tag(&sample_tag(0, "block 1 LSN: 0/1")).unwrap();
        sink.tag(&sample_tag(1, "block 1 checksum: 0x0000")).unwrap();
        sink.finish().unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["path"], "base/5/16384");
        assert_eq!(doc["tags"].as_array().unwrap().len(), 2);
        assert_eq!(doc["tags"][1]["text"], "block 1 checksum: 0x0000");
        assert_eq!(doc["tags"][0]["color"], "YellowLight");
    }

    #[test]
    fn test_json_empty_document() {
        let mut sink = JsonSink::new(Vec::new());
        sink.begin(&info()).unwrap();
        sink.finish().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert!(doc["tags"].as_array().unwrap().is_empty());
    }
}
