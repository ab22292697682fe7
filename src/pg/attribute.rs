//! Attribute schema and per-attribute payload decoding.
//!
//! Tuples do not describe their own columns, so splitting a tuple's payload
//! into attributes needs the relation's catalog metadata: for each column in
//! physical order (dropped columns included), its length, name and alignment.
//! [`AttributeSchema`] holds that list, parsed from a comma-separated string
//! of `len,name,align` triples (the same shape `pg_attribute` queries
//! produce), e.g. `4,id,i,-1,payload,i,8,created,d`.
//!
//! The walker mirrors `heap_deform_tuple`: fixed-length attributes are
//! aligned to their alignment class, variable-length (varlena) attributes are
//! aligned only when the next byte is a pad byte (a 1-byte header is never
//! aligned), and NULL attributes consume no space.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::pg::constants::*;
use crate::pg::session::PageDecoder;
use crate::pg::tag::Color;
use crate::HexeditError;

/// Alignment class (`pg_attribute.attalign`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Alignment {
    Char,
    Short,
    Int,
    Double,
}

impl Alignment {
    /// Parse the single-letter catalog code (`c`, `s`, `i`, `d`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Alignment::Char),
            "s" => Some(Alignment::Short),
            "i" => Some(Alignment::Int),
            "d" => Some(Alignment::Double),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Alignment::Char => 'c',
            Alignment::Short => 's',
            Alignment::Int => 'i',
            Alignment::Double => 'd',
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Alignment::Char => 1,
            Alignment::Short => 2,
            Alignment::Int => 4,
            Alignment::Double => 8,
        }
    }
}

/// Attribute length (`pg_attribute.attlen`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttrLength {
    Fixed(u16),
    /// attlen -1
    Varlena,
    /// attlen -2, null-terminated
    CString,
}

impl AttrLength {
    fn raw(self) -> i32 {
        match self {
            AttrLength::Fixed(n) => n as i32,
            AttrLength::Varlena => -1,
            AttrLength::CString => -2,
        }
    }
}

/// One column of the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub len: AttrLength,
    pub align: Alignment,
}

/// Ordered list of a relation's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSchema {
    attrs: Vec<Attribute>,
}

impl AttributeSchema {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        AttributeSchema { attrs }
    }

    /// Parse a `len,name,align,len,name,align,...` string.
    ///
    /// # Examples
    ///
    /// ```
    /// use pghex::pg::attribute::{AttrLength, AttributeSchema};
    ///
    /// let schema = AttributeSchema::parse("4,id,i,-1,payload,i").unwrap();
    /// assert_eq!(schema.len(), 2);
    /// assert_eq!(schema.attrs()[1].len, AttrLength::Varlena);
    /// assert!(AttributeSchema::parse("4,id").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, HexeditError> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if s.trim().is_empty() || fields.len() % 3 != 0 {
            return Err(HexeditError::Argument(format!(
                "attribute list \"{}\" must consist of len,name,align triples",
                s
            )));
        }

        let mut attrs = Vec::with_capacity(fields.len() / 3);
        for triple in fields.chunks(3) {
            let len = match triple[0].parse::<i32>() {
                Ok(-1) => AttrLength::Varlena,
                Ok(-2) => AttrLength::CString,
                Ok(n) if n > 0 && n <= u16::MAX as i32 => AttrLength::Fixed(n as u16),
                _ => {
                    return Err(HexeditError::Argument(format!(
                        "invalid attribute length \"{}\"",
                        triple[0]
                    )))
                }
            };
            if triple[1].is_empty() {
                return Err(HexeditError::Argument(
                    "attribute name must not be empty".to_string(),
                ));
            }
            let align = Alignment::from_code(triple[2]).ok_or_else(|| {
                HexeditError::Argument(format!(
                    "invalid alignment \"{}\" for attribute \"{}\" (expected c, s, i or d)",
                    triple[2], triple[1]
                ))
            })?;
            attrs.push(Attribute {
                name: triple[1].to_string(),
                len,
                align,
            });
        }
        Ok(AttributeSchema { attrs })
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl FromStr for AttributeSchema {
    type Err = HexeditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeSchema::parse(s)
    }
}

impl fmt::Display for AttributeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attrs
            .iter()
            .map(|a| format!("{},{},{}", a.len.raw(), a.name, a.align.code()))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Varlena header forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Varlena {
    /// 1-byte header, unaligned, up to 126 bytes of data.
    Short { total: usize },
    /// TOAST pointer (1-byte header plus vartag).
    External { vartag: u8, total: usize },
    /// 4-byte header, uncompressed.
    Inline { total: usize },
    /// 4-byte header, compressed inline.
    Compressed { total: usize },
}

impl Varlena {
    /// Total size including the header.
    pub fn total(&self) -> usize {
        match *self {
            Varlena::Short { total }
            | Varlena::External { total, .. }
            | Varlena::Inline { total }
            | Varlena::Compressed { total } => total,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Varlena::Short { .. } => "varlena 1B",
            Varlena::External { .. } => "TOAST pointer",
            Varlena::Inline { .. } => "varlena 4B",
            Varlena::Compressed { .. } => "varlena 4B compressed",
        }
    }
}

/// Decode the varlena header at the start of `data`.
pub fn decode_varlena(data: &[u8]) -> Result<Varlena, String> {
    let first = *data.first().ok_or("varlena header past end of tuple")?;

    if first == 0x01 {
        let vartag = *data.get(1).ok_or("TOAST pointer tag past end of tuple")?;
        let size = match vartag {
            VARTAG_INDIRECT | VARTAG_EXPANDED_RO | VARTAG_EXPANDED_RW => SIZE_VARATT_POINTER,
            VARTAG_ONDISK => SIZE_VARATT_EXTERNAL,
            other => return Err(format!("unrecognized TOAST vartag {}", other)),
        };
        return Ok(Varlena::External {
            vartag,
            total: 2 + size,
        });
    }

    if first & 0x01 == 0x01 {
        return Ok(Varlena::Short {
            total: ((first >> 1) & 0x7F) as usize,
        });
    }

    if data.len() < 4 {
        return Err("4-byte varlena header past end of tuple".to_string());
    }
    let total = ((LittleEndian::read_u32(data) >> 2) & 0x3FFF_FFFF) as usize;
    if total < 4 {
        return Err(format!("4-byte varlena header declares length {}", total));
    }
    if first & 0x03 == 0x02 {
        Ok(Varlena::Compressed { total })
    } else {
        Ok(Varlena::Inline { total })
    }
}

/// Returns true if attribute `i` is NULL according to a tuple null bitmap.
///
/// The on-disk bitmap has a set bit for every attribute that is present, so
/// a NULL column is a clear bit: with `0b1111_0111` attribute 3 is NULL.
pub fn att_isnull(i: usize, bits: &[u8]) -> bool {
    match bits.get(i >> 3) {
        Some(byte) => byte & (1 << (i & 7)) == 0,
        None => false,
    }
}

/// One attribute located within a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSpan {
    /// 0-based attribute number.
    pub index: usize,
    pub label: String,
    /// Offset from the start of the tuple.
    pub offset: usize,
    pub len: usize,
}

/// Result of walking a tuple's attributes: the attributes located before
/// any problem, and the problem if one stopped the walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeWalk {
    pub spans: Vec<AttributeSpan>,
    pub error: Option<String>,
}

/// Locate each non-null attribute of `tuple`, starting at `data_off`.
///
/// `tuple` covers exactly the item's bytes, so nothing past the item is read.
pub fn walk_attributes(
    tuple: &[u8],
    data_off: usize,
    natts: usize,
    nulls: Option<&[u8]>,
    schema: &AttributeSchema,
) -> AttributeWalk {
    let mut walk = AttributeWalk::default();

    if natts > schema.len() {
        walk.error = Some(format!(
            "tuple has {} attributes but only {} were supplied",
            natts,
            schema.len()
        ));
        return walk;
    }

    let mut off = data_off;
    for (i, attr) in schema.attrs().iter().enumerate().take(natts) {
        if let Some(bits) = nulls {
            if att_isnull(i, bits) {
                continue;
            }
        }

        let (start, len, label) = match attr.len {
            AttrLength::Fixed(n) => (type_align(attr.align.bytes(), off), n as usize, attr.name.clone()),
            AttrLength::Varlena => {
                let start = match tuple.get(off) {
                    Some(0) => type_align(attr.align.bytes(), off),
                    Some(_) => off,
                    None => {
                        walk.error = Some(format!(
                            "attribute \"{}\" starts at offset {} past tuple length {}",
                            attr.name,
                            off,
                            tuple.len()
                        ));
                        return walk;
                    }
                };
                match decode_varlena(tuple.get(start..).unwrap_or(&[])) {
                    Ok(v) => (start, v.total(), format!("{} ({})", attr.name, v.label())),
                    Err(e) => {
                        walk.error = Some(format!("attribute \"{}\": {}", attr.name, e));
                        return walk;
                    }
                }
            }
            AttrLength::CString => {
                let start = type_align(attr.align.bytes(), off);
                let nul = tuple
                    .get(start..)
                    .and_then(|rest| rest.iter().position(|&b| b == 0));
                match nul {
                    Some(pos) => (start, pos + 1, attr.name.clone()),
                    None => {
                        walk.error = Some(format!(
                            "cstring attribute \"{}\" is not terminated within the tuple",
                            attr.name
                        ));
                        return walk;
                    }
                }
            }
        };

        if start + len > tuple.len() {
            walk.error = Some(format!(
                "attribute \"{}\" at offset {} with length {} extends past tuple length {}",
                attr.name,
                start,
                len,
                tuple.len()
            ));
            return walk;
        }

        walk.spans.push(AttributeSpan {
            index: i,
            label,
            offset: start,
            len,
        });
        off = start + len;
    }

    walk
}

/// Tag the attributes of the tuple at `tuple_start..tuple_start + tuple_len`.
///
/// Attributes found before a problem are still tagged; the problem is
/// recorded against the tuple.
#[allow(clippy::too_many_arguments)]
pub fn emit_attributes(
    dec: &mut PageDecoder<'_>,
    slot: u16,
    tuple_start: usize,
    tuple_len: usize,
    data_off: usize,
    natts: usize,
    nulls: Option<&[u8]>,
    schema: &AttributeSchema,
) -> Result<(), HexeditError> {
    let page = dec.page;
    let end = (tuple_start + tuple_len).min(page.len());
    let tuple = page.get(tuple_start..end).unwrap_or(&[]);

    let walk = walk_attributes(tuple, data_off, natts, nulls, schema);
    for span in &walk.spans {
        dec.tuple_tag(slot, &span.label, Color::White, tuple_start + span.offset, span.len)?;
    }
    if let Some(error) = walk.error {
        dec.fail(Some(slot), error);
    }
    Ok(())
}
