//! Text <-> wire byte conversion.
//!
//! Messages are typed as Unicode text but travel as bytes in a wire
//! encoding. Two encodings are provided: UTF-8 (identity) and Windows-1251,
//! the single-byte Cyrillic code page where every character is one byte.
//!
//! `to_wire` refuses text the encoding cannot represent, so a send fails
//! before any frame is built. `from_wire` never fails loudly: undecodable
//! input yields an empty string.

use crate::error::{Error, Result, TranscodeError};

/// Converts between message text and wire bytes.
pub trait Transcoder: Send + Sync {
    /// Encoding name, for logs and errors.
    fn name(&self) -> &'static str;

    /// Encode `text` for the wire.
    ///
    /// # Errors
    /// `TranscodeError::Unmappable` for the first character without a
    /// representation.
    fn to_wire(&self, text: &str) -> Result<Vec<u8>>;

    /// Decode wire bytes; empty string if they are not valid.
    fn from_wire(&self, bytes: &[u8]) -> String;
}

/// UTF-8 on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Transcoder;

impl Transcoder for Utf8Transcoder {
    fn name(&self) -> &'static str {
        "utf-8"
    }

    fn to_wire(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    fn from_wire(&self, bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap_or_default()
    }
}

/// Windows-1251 (Cyrillic) on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct Windows1251Transcoder;

/// Code points for bytes 0x80..=0xBF. 0x98 is unassigned and passes through
/// as U+0098.
const CP1251_HIGH: [char; 64] = [
    '\u{0402}', '\u{0403}', '\u{201A}', '\u{0453}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{20AC}', '\u{2030}', '\u{0409}', '\u{2039}', '\u{040A}', '\u{040C}', '\u{040B}', '\u{040F}',
    '\u{0452}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{0098}', '\u{2122}', '\u{0459}', '\u{203A}', '\u{045A}', '\u{045C}', '\u{045B}', '\u{045F}',
    '\u{00A0}', '\u{040E}', '\u{045E}', '\u{0408}', '\u{00A4}', '\u{0490}', '\u{00A6}', '\u{00A7}',
    '\u{0401}', '\u{00A9}', '\u{0404}', '\u{00AB}', '\u{00AC}', '\u{00AD}', '\u{00AE}', '\u{0407}',
    '\u{00B0}', '\u{00B1}', '\u{0406}', '\u{0456}', '\u{0491}', '\u{00B5}', '\u{00B6}', '\u{00B7}',
    '\u{0451}', '\u{2116}', '\u{0454}', '\u{00BB}', '\u{0458}', '\u{0405}', '\u{0455}', '\u{0457}',
];

/// 0xC0..=0xFF map to U+0410..=U+044F (А..я).
const CYRILLIC_BASE: u32 = 0x0410;

impl Windows1251Transcoder {
    fn encode_char(ch: char) -> Option<u8> {
        let cp = ch as u32;
        if cp < 0x80 {
            return Some(cp as u8);
        }
        if (CYRILLIC_BASE..CYRILLIC_BASE + 64).contains(&cp) {
            return Some((0xC0 + cp - CYRILLIC_BASE) as u8);
        }
        CP1251_HIGH
            .iter()
            .position(|&c| c == ch)
            .map(|i| 0x80 + i as u8)
    }

    fn decode_byte(byte: u8) -> char {
        match byte {
            0x00..=0x7F => byte as char,
            0x80..=0xBF => CP1251_HIGH[(byte - 0x80) as usize],
            // 0xC0..=0xFF
            _ => char::from_u32(CYRILLIC_BASE + u32::from(byte - 0xC0)).unwrap_or('\u{FFFD}'),
        }
    }
}

impl Transcoder for Windows1251Transcoder {
    fn name(&self) -> &'static str {
        "windows-1251"
    }

    fn to_wire(&self, text: &str) -> Result<Vec<u8>> {
        text.chars()
            .enumerate()
            .map(|(index, ch)| {
                Self::encode_char(ch).ok_or_else(|| {
                    Error::from(TranscodeError::Unmappable {
                        ch,
                        index,
                        encoding: self.name(),
                    })
                })
            })
            .collect()
    }

    fn from_wire(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| Self::decode_byte(b)).collect()
    }
}

/// Wire encodings selectable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireEncoding {
    #[default]
    Utf8,
    Windows1251,
}

impl WireEncoding {
    /// Boxed transcoder for this encoding.
    pub fn transcoder(self) -> Box<dyn Transcoder> {
        match self {
            WireEncoding::Utf8 => Box::new(Utf8Transcoder),
            WireEncoding::Windows1251 => Box::new(Windows1251Transcoder),
        }
    }
}
