use super::EncodingFormat;
use anyhow::{anyhow, Result};

pub struct Utf16;

impl EncodingFormat for Utf16 {
    fn into_java(str: &str) -> Result<Vec<u8>> {
        // java always uses big endian, high bytes come first
        Ok(str
            .encode_utf16()
            .flat_map(|unit| unit.to_be_bytes())
            .collect())
    }

    fn from_java(data: &[u8]) -> Result<String> {
        if data.len() % 2 != 0 {
            return Err(anyhow!("utf16 data had odd length {}", data.len()));
        }

        let units = data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();

        Ok(String::from_utf16(&units)?)
    }
}
