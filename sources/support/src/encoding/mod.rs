pub mod latin1;
pub mod utf16;
use anyhow::{anyhow, Result};

use self::{latin1::Latin1, utf16::Utf16};

/// The `coder` byte stored alongside a compact string's `value` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactEncoding {
    Latin1,
    Utf16,
}

impl CompactEncoding {
    pub fn coder(&self) -> u8 {
        match self {
            CompactEncoding::Latin1 => 0,
            CompactEncoding::Utf16 => 1,
        }
    }

    pub fn from_coder(coder: u8) -> Result<Self> {
        match coder {
            0 => Ok(CompactEncoding::Latin1),
            1 => Ok(CompactEncoding::Utf16),
            p => Err(anyhow!("bogus coder {p}")),
        }
    }
}

pub type EncodedString = (CompactEncoding, Vec<u8>);

pub trait EncodingFormat {
    fn into_java(str: &str) -> Result<Vec<u8>>;
    fn from_java(data: &[u8]) -> Result<String>;
}

/// Encode a string for a byte-backed string layout, compact when every char fits in latin1
pub fn encode_string(str: &str) -> Result<EncodedString> {
    match Latin1::into_java(str) {
        Ok(encoded) => Ok((CompactEncoding::Latin1, encoded)),
        Err(_) => Ok((CompactEncoding::Utf16, Utf16::into_java(str)?)),
    }
}

pub fn decode_string(encoding: CompactEncoding, data: &[u8]) -> Result<String> {
    match encoding {
        CompactEncoding::Utf16 => Utf16::from_java(data),
        CompactEncoding::Latin1 => Latin1::from_java(data),
    }
}

/// Encode a string for a `char[]` backed string layout
pub fn encode_chars(str: &str) -> Vec<u16> {
    str.encode_utf16().collect()
}

pub fn decode_chars(chars: &[u16]) -> Result<String> {
    Ok(String::from_utf16(chars)?)
}
