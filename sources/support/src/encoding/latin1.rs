use super::EncodingFormat;
use anyhow::{anyhow, Result};

pub struct Latin1;

impl EncodingFormat for Latin1 {
    fn into_java(str: &str) -> Result<Vec<u8>> {
        str.chars()
            .map(|c| u8::try_from(c).map_err(|_| anyhow!("{c:?} is not representable in latin1")))
            .collect()
    }

    fn from_java(data: &[u8]) -> Result<String> {
        Ok(data.iter().map(|b| *b as char).collect())
    }
}
