//! Byte cleanup and encoding repair ahead of parsing.
//!
//! SDI only accepts UTF-8, but documents that travelled through other
//! channels regularly arrive as Windows-1252 or Latin-1, with a BOM, stray
//! NUL bytes, or junk around the XML.

use tracing::warn;

use super::tree::{ParseMode, XmlElement, parse_tree};
use crate::core::ImportError;

/// Character encoding a document was finally read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Utf16,
    Cp1252,
    Latin1,
}

/// Whether undecodable bytes were an error or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Strict,
    Replace,
}

/// Fallback order when the bytes are not valid UTF-8.
const FALLBACK_CHAIN: [(SourceEncoding, DecodeMode); 4] = [
    (SourceEncoding::Cp1252, DecodeMode::Strict),
    (SourceEncoding::Latin1, DecodeMode::Strict),
    (SourceEncoding::Cp1252, DecodeMode::Replace),
    (SourceEncoding::Latin1, DecodeMode::Replace),
];

/// Windows-1252 code points for bytes 0x80..=0x9F; 0 marks undefined bytes.
const CP1252_HIGH: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, //
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

/// A document decoded to UTF-8 with its parsed tree.
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    /// Cleaned UTF-8 text.
    pub xml: String,
    pub root: XmlElement,
    pub encoding: SourceEncoding,
    pub mode: DecodeMode,
}

/// Strip byte-order marks, C0 control bytes other than TAB/LF/CR, anything
/// before the first `<` and anything after the last `>`.
pub fn clean_bytes(raw: &[u8]) -> Vec<u8> {
    let mut bytes = raw;
    while let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        bytes = rest;
    }
    let filtered: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|&b| b >= 0x20 || b == b'\t' || b == b'\n' || b == b'\r')
        .collect();
    let start = filtered.iter().position(|&b| b == b'<').unwrap_or(0);
    let end = filtered
        .iter()
        .rposition(|&b| b == b'>')
        .map(|p| p + 1)
        .unwrap_or(filtered.len());
    if start < end {
        filtered[start..end].to_vec()
    } else {
        filtered
    }
}

fn clean_text(text: &str) -> String {
    // Cleaning only removes ASCII bytes, so the result stays valid UTF-8.
    String::from_utf8_lossy(&clean_bytes(text.as_bytes())).into_owned()
}

/// Decode Windows-1252. In strict mode undefined bytes fail the decode; in
/// replace mode they become U+FFFD.
pub fn decode_cp1252(bytes: &[u8], mode: DecodeMode) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        let ch = match b {
            0x80..=0x9F => {
                let cp = CP1252_HIGH[usize::from(b - 0x80)];
                match char::from_u32(u32::from(cp)).filter(|_| cp != 0) {
                    Some(c) => c,
                    None if mode == DecodeMode::Strict => return None,
                    None => char::REPLACEMENT_CHARACTER,
                }
            }
            _ => char::from(b),
        };
        out.push(ch);
    }
    Some(out)
}

/// Decode ISO-8859-1. Every byte maps to a code point, so this never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn decode_utf16(raw: &[u8]) -> Option<String> {
    let little_endian = match raw {
        [0xFF, 0xFE, ..] => true,
        [0xFE, 0xFF, ..] => false,
        _ => return None,
    };
    let units = raw[2..].chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    Some(
        char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    )
}

/// Clean, decode and parse raw document bytes.
///
/// Valid UTF-8 goes straight to a recovering parse. Otherwise the fixed
/// fallback chain is tried: cp1252 strict, Latin-1 strict, cp1252 replace,
/// Latin-1 replace. Strict decodes get a strict parse, replacing decodes a
/// recovering one.
pub fn decode_document(raw: &[u8]) -> Result<DecodedDocument, ImportError> {
    if let Some(text) = decode_utf16(raw) {
        let xml = clean_text(&text);
        let root = parse_tree(&xml, ParseMode::Recover)?;
        return Ok(DecodedDocument {
            xml,
            root,
            encoding: SourceEncoding::Utf16,
            mode: DecodeMode::Strict,
        });
    }

    let bytes = match String::from_utf8(clean_bytes(raw)) {
        Ok(xml) => {
            let root = parse_tree(&xml, ParseMode::Recover)?;
            return Ok(DecodedDocument {
                xml,
                root,
                encoding: SourceEncoding::Utf8,
                mode: DecodeMode::Strict,
            });
        }
        Err(err) => err.into_bytes(),
    };

    let mut last_error = String::from("document is not valid UTF-8");
    for (encoding, mode) in FALLBACK_CHAIN {
        let decoded = match encoding {
            SourceEncoding::Cp1252 => decode_cp1252(&bytes, mode),
            _ => Some(decode_latin1(&bytes)),
        };
        let Some(text) = decoded else {
            last_error = format!("{encoding:?} {mode:?}: undefined byte");
            continue;
        };
        let xml = clean_text(&text);
        let parse_mode = match mode {
            DecodeMode::Strict => ParseMode::Strict,
            DecodeMode::Replace => ParseMode::Recover,
        };
        match parse_tree(&xml, parse_mode) {
            Ok(root) => {
                warn!(encoding = ?encoding, mode = ?mode, "decoded with fallback encoding");
                return Ok(DecodedDocument {
                    xml,
                    root,
                    encoding,
                    mode,
                });
            }
            Err(e) => last_error = format!("{encoding:?} {mode:?}: {e}"),
        }
    }

    Err(ImportError::Parse(format!(
        "no encoding produced a parseable document ({last_error})"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp1252_maps_euro_and_accents() {
        let text = decode_cp1252(&[0x80, b' ', 0xE8, 0x92], DecodeMode::Strict).unwrap();
        assert_eq!(text, "\u{20AC} \u{E8}\u{2019}");
    }

    #[test]
    fn cp1252_strict_rejects_undefined_bytes() {
        assert_eq!(decode_cp1252(&[b'a', 0x81], DecodeMode::Strict), None);
        assert_eq!(
            decode_cp1252(&[b'a', 0x81], DecodeMode::Replace).as_deref(),
            Some("a\u{FFFD}")
        );
    }

    #[test]
    fn clean_strips_bom_controls_and_junk() {
        let raw = b"\xEF\xBB\xBFgarbage\x00<a>\x01x\x02</a>\x00tail";
        assert_eq!(clean_bytes(raw), b"<a>x</a>".to_vec());
    }

    #[test]
    fn utf8_passes_through() {
        let doc = decode_document("<a>Caff\u{e8}</a>".as_bytes()).unwrap();
        assert_eq!(doc.encoding, SourceEncoding::Utf8);
        assert_eq!(doc.root.text(), Some("Caff\u{e8}"));
    }

    #[test]
    fn cp1252_document_is_repaired() {
        let mut raw = b"<a>Caff".to_vec();
        raw.extend_from_slice(&[0xE8, b' ', 0x80]);
        raw.extend_from_slice(b"5</a>");
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.encoding, SourceEncoding::Cp1252);
        assert_eq!(doc.mode, DecodeMode::Strict);
        assert_eq!(doc.root.text(), Some("Caff\u{e8} \u{20AC}5"));
    }

    #[test]
    fn undefined_cp1252_byte_falls_to_latin1() {
        let raw = [b'<', b'a', b'>', 0x81, b'<', b'/', b'a', b'>'];
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.encoding, SourceEncoding::Latin1);
        assert_eq!(doc.root.text(), Some("\u{81}"));
    }

    #[test]
    fn utf16_with_bom() {
        let mut raw = vec![0xFF, 0xFE];
        for unit in "<a>\u{20AC}</a>".encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.encoding, SourceEncoding::Utf16);
        assert_eq!(doc.root.text(), Some("\u{20AC}"));
    }
}
