//! Little-endian primitive readers and writers shared by the chunk, layout and
//! code decoders.

use anyhow::{Context, Result};

use crate::error::BundleError;

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

/// Pads `out` with zero bytes up to the next word boundary.
pub(crate) fn pad_to_word(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

pub(crate) fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let Some(end) = cursor.checked_add(4).filter(|end| *end <= bytes.len()) else {
        return Err(BundleError::corrupt(format!("unexpected end of input while reading u32 at byte {}", cursor)).into());
    };
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..end]);
    *cursor = end;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u32(bytes, cursor)? as usize;
    let Some(end) = cursor.checked_add(len).filter(|end| *end <= bytes.len()) else {
        return Err(BundleError::corrupt(format!(
            "string of {} bytes at byte {} overruns payload of {} bytes",
            len,
            cursor,
            bytes.len()
        ))
        .into());
    };
    let slice = &bytes[*cursor..end];
    *cursor = end;
    String::from_utf8(slice.to_vec())
        .map_err(|_| BundleError::corrupt("invalid UTF-8 in string"))
        .context("while decoding a length-prefixed string")
}

/// Reinterprets a word-aligned byte payload as little-endian words.
pub(crate) fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn bytes_from_words(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}
