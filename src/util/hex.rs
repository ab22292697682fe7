//! Hex dump formatting utilities.
//!
//! Helpers for formatting byte offsets and producing traditional hex dump
//! output with offset columns and ASCII sidebars, optionally marking the
//! lines where tags begin.

use crate::pg::tag::Tag;

/// Format a byte offset as "decimal (0xhex)".
pub fn format_offset(offset: u64) -> String {
    format!("{} (0x{:x})", offset, offset)
}

/// Produce a standard hex dump of `data` with the given `base_offset`.
///
/// Output format (16 bytes per line):
/// ```text
/// 00000000  xx xx xx xx xx xx xx xx  xx xx xx xx xx xx xx xx  |................|
/// ```
pub fn hex_dump(data: &[u8], base_offset: u64) -> String {
    hex_dump_lines(data, base_offset).join("\n")
}

fn hex_dump_lines(data: &[u8], base_offset: u64) -> Vec<String> {
    let mut lines = Vec::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        let offset = base_offset + (i * 16) as u64;
        let mut line = format!("{:08x}  ", offset);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                line.push(' ');
            }
            line.push_str(&format!("{:02x} ", byte));
        }

        // Pad short last line
        for j in chunk.len()..16 {
            if j == 8 {
                line.push(' ');
            }
            line.push_str("   ");
        }

        line.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                line.push(*byte as char);
            } else {
                line.push('.');
            }
        }
        for _ in chunk.len()..16 {
            line.push(' ');
        }
        line.push('|');

        lines.push(line);
    }

    lines
}

/// Hex dump with the text of every tag starting on a line appended to it.
///
/// Tags are matched by absolute file offset, so `tags` may cover more than
/// the dumped range.
pub fn hex_dump_tagged(data: &[u8], base_offset: u64, tags: &[Tag]) -> String {
    let mut out = Vec::new();
    for (i, line) in hex_dump_lines(data, base_offset).into_iter().enumerate() {
        let start = base_offset + (i * 16) as u64;
        let end = start + 16;
        let texts: Vec<&str> = tags
            .iter()
            .filter(|t| t.start >= start && t.start < end)
            .map(|t| t.text.as_str())
            .collect();
        if texts.is_empty() {
            out.push(line);
        } else {
            out.push(format!("{}  {}", line, texts.join("; ")));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::tag::{Color, FontColor};

    #[test]
    fn test_format_offsets() {
        assert_eq!(format_offset(8204), "8204 (0x200c)");
    }

    #[test]
    fn test_hex_dump_full_line() {
        let data: Vec<u8> = (0..16).collect();
        let output = hex_dump(&data, 0);
        assert!(output.starts_with("00000000  "));
        assert!(output.contains("00 01 02 03 04 05 06 07  08 09 0a 0b 0c 0d 0e 0f"));
        assert!(output.contains('|'));
    }

    #[test]
    fn test_hex_dump_partial_line() {
        let data = vec![0x48, 0x65, 0x6c, 0x6c, 0x6f]; // "Hello"
        let output = hex_dump(&data, 0x100);
        assert!(output.starts_with("00000100  "));
        assert!(output.contains("48 65 6c 6c 6f"));
        assert!(output.contains("|Hello     "));
        let full: Vec<u8> = (0..16).collect();
        assert_eq!(output.len(), hex_dump(&full, 0x100).len());
    }

    #[test]
    fn test_hex_dump_tagged() {
        let data = vec![0u8; 48];
        let tags = vec![
            Tag {
                id: 0,
                start: 8192 + 12,
                end: 8192 + 13,
                text: "block 1 pd_lower: 28".to_string(),
                color: Color::Maroon,
                font: FontColor::Standard,
            },
            Tag {
                id: 1,
                start: 8192 + 40,
                end: 8192 + 43,
                text: "(1,1) xmin: 100".to_string(),
                color: Color::RedDark,
                font: FontColor::Standard,
            },
        ];
        let output = hex_dump_tagged(&data, 8192, &tags);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("  block 1 pd_lower: 28"));
        assert!(lines[1].ends_with('|'));
        assert!(lines[2].ends_with("(1,1) xmin: 100"));
    }
}
