//! Writing font dictionaries into a document
//!
//! Both built-in and remote fonts are simple fonts with WinAnsiEncoding, so
//! annotation text is written as single-byte strings either way.

use super::builtin::BuiltinFont;
use crate::error::{FontFetchError, PdfEditError, Result};
use crate::images::deflate;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use ttf_parser::Face;

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// Windows-1252 byte to Unicode. 0x80..=0x9F differ from Latin-1.
pub fn winansi_to_char(byte: u8) -> char {
    match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        _ => byte as char,
    }
}

/// Encode text as WinAnsi bytes. Characters outside the code page become `?`.
pub fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| match c as u32 {
            0x0020..=0x007E => c as u8,
            0x00A0..=0x00FF => c as u8,
            0x20AC => 0x80,
            0x201A => 0x82,
            0x0192 => 0x83,
            0x201E => 0x84,
            0x2026 => 0x85,
            0x2020 => 0x86,
            0x2021 => 0x87,
            0x02C6 => 0x88,
            0x2030 => 0x89,
            0x0160 => 0x8A,
            0x2039 => 0x8B,
            0x0152 => 0x8C,
            0x017D => 0x8E,
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201C => 0x93,
            0x201D => 0x94,
            0x2022 => 0x95,
            0x2013 => 0x96,
            0x2014 => 0x97,
            0x02DC => 0x98,
            0x2122 => 0x99,
            0x0161 => 0x9A,
            0x203A => 0x9B,
            0x0153 => 0x9C,
            0x017E => 0x9E,
            0x0178 => 0x9F,
            0x0009 => b' ',
            _ => b'?',
        })
        .collect()
}

/// Add a standard 14 Type1 font dictionary
pub fn add_builtin_font(doc: &mut Document, font: BuiltinFont) -> ObjectId {
    doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(font.base_font().as_bytes().to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ]))
}

/// Check that font bytes parse as TrueType/OpenType
pub fn validate_font(family: &str, data: &[u8]) -> std::result::Result<(), FontFetchError> {
    Face::parse(data, 0)
        .map(|_| ())
        .map_err(|e| FontFetchError::new(family, format!("invalid font data: {}", e)))
}

/// Embed a TrueType font as a simple font with WinAnsi widths
pub fn add_truetype_font(doc: &mut Document, family: &str, data: &[u8]) -> Result<ObjectId> {
    let face = Face::parse(data, 0).map_err(|e| {
        PdfEditError::FontFetch(FontFetchError::new(family, format!("invalid font data: {}", e)))
    })?;

    let units = face.units_per_em() as f64;
    let scale = |v: f64| (v / units * 1000.0).round() as i64;

    let widths: Vec<Object> = (FIRST_CHAR..=LAST_CHAR)
        .map(|byte| {
            let width = face
                .glyph_index(winansi_to_char(byte))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| scale(adv as f64))
                .unwrap_or(0);
            Object::Integer(width)
        })
        .collect();

    let bbox = face.global_bounding_box();
    let ps_name: String = family.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    // Nonsymbolic, plus Italic when slanted
    let (flags, italic_angle) = if face.is_italic() { (32 | 64, -12.0) } else { (32, 0.0) };

    let mut file_dict = Dictionary::new();
    file_dict.set("Length1", Object::Integer(data.len() as i64));
    file_dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    let mut file_stream = Stream::new(file_dict, deflate(data)?);
    file_stream.allows_compression = false;
    let file_id = doc.add_object(file_stream);

    let descriptor_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"FontDescriptor".to_vec())),
        ("FontName", Object::Name(ps_name.as_bytes().to_vec())),
        ("Flags", Object::Integer(flags)),
        (
            "FontBBox",
            Object::Array(vec![
                Object::Integer(scale(bbox.x_min as f64)),
                Object::Integer(scale(bbox.y_min as f64)),
                Object::Integer(scale(bbox.x_max as f64)),
                Object::Integer(scale(bbox.y_max as f64)),
            ]),
        ),
        ("ItalicAngle", Object::Real(italic_angle)),
        ("Ascent", Object::Integer(scale(face.ascender() as f64))),
        ("Descent", Object::Integer(scale(face.descender() as f64))),
        (
            "CapHeight",
            Object::Integer(face.capital_height().map_or(700, |h| scale(h as f64))),
        ),
        ("StemV", Object::Integer(80)),
        ("FontFile2", Object::Reference(file_id)),
    ]));

    Ok(doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"TrueType".to_vec())),
        ("BaseFont", Object::Name(ps_name.into_bytes())),
        ("FirstChar", Object::Integer(FIRST_CHAR as i64)),
        ("LastChar", Object::Integer(LAST_CHAR as i64)),
        ("Widths", Object::Array(widths)),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ("FontDescriptor", Object::Reference(descriptor_id)),
    ])))
}
