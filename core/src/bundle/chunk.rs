//! Chunk container: a flat stream of `[type:u32][payload words:u32][payload]`
//! sections.

use std::fmt;

use anyhow::{Result, ensure};

use crate::error::BundleError;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

use super::codec::{read_u32, write_u32};

pub const CHUNK_HEADER_LEN: usize = 8;

/// Chunk type identifier. Values are shared with the bundle producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkType(pub u32);

impl ChunkType {
    pub const CONSTANTS: ChunkType = ChunkType(0);
    pub const LAYOUT: ChunkType = ChunkType(1);
    pub const CODE: ChunkType = ChunkType(2);

    pub fn name(self) -> Option<&'static str> {
        match self {
            ChunkType::CONSTANTS => Some("CONSTANTS"),
            ChunkType::LAYOUT => Some("LAYOUT"),
            ChunkType::CODE => Some("CODE"),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "chunk#{}", self.0),
        }
    }
}

/// A single decoded chunk borrowing its payload from the input buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub ty: ChunkType,
    pub payload: &'a [u8],
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("ty", &self.ty)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Chunks of a bundle keyed by type, remembering file order for tooling.
///
/// Unknown chunk types are kept. When a type repeats, the later chunk replaces
/// the earlier one.
#[derive(Debug, Default)]
pub struct ChunkMap<'a> {
    by_type: FastHashMap<ChunkType, &'a [u8]>,
    order: Vec<ChunkType>,
}

impl<'a> ChunkMap<'a> {
    pub fn new() -> Self {
        Self {
            by_type: fast_hash_map_new(),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, ty: ChunkType, payload: &'a [u8]) {
        if self.by_type.insert(ty, payload).is_some() {
            tracing::debug!(target: "fxvm::bundle", chunk = %ty, "duplicate chunk replaces earlier one");
        } else {
            self.order.push(ty);
        }
    }

    pub fn get(&self, ty: ChunkType) -> Option<&'a [u8]> {
        self.by_type.get(&ty).copied()
    }

    pub fn contains(&self, ty: ChunkType) -> bool {
        self.by_type.contains_key(&ty)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Chunks in the order their type first appeared.
    pub fn iter(&self) -> impl Iterator<Item = Chunk<'a>> + '_ {
        self.order.iter().map(|ty| Chunk {
            ty: *ty,
            payload: self.by_type[ty],
        })
    }
}

/// Splits `bytes` into chunks. The whole buffer must be consumed exactly by
/// chunk headers and payloads.
pub fn decode_chunks(bytes: &[u8]) -> Result<ChunkMap<'_>> {
    let mut chunks = ChunkMap::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let remaining = bytes.len() - cursor;
        if remaining < CHUNK_HEADER_LEN {
            return Err(BundleError::corrupt(format!(
                "{} trailing bytes at offset {} are too short for a chunk header",
                remaining, cursor
            ))
            .into());
        }
        let header_at = cursor;
        let ty = ChunkType(read_u32(bytes, &mut cursor)?);
        let words = read_u32(bytes, &mut cursor)? as usize;
        let end = words
            .checked_mul(4)
            .and_then(|len| cursor.checked_add(len))
            .filter(|end| *end <= bytes.len());
        let Some(end) = end else {
            return Err(BundleError::corrupt(format!(
                "{} chunk at offset {} declares {} words but only {} bytes remain",
                ty,
                header_at,
                words,
                bytes.len() - cursor
            ))
            .into());
        };
        chunks.insert(ty, &bytes[cursor..end]);
        cursor = end;
    }
    tracing::trace!(target: "fxvm::bundle", chunks = chunks.len(), bytes = bytes.len(), "decoded chunks");
    Ok(chunks)
}

/// Appends one chunk. The payload must be a whole number of words.
pub fn write_chunk(out: &mut Vec<u8>, ty: ChunkType, payload: &[u8]) -> Result<()> {
    ensure!(
        payload.len() % 4 == 0,
        "{} chunk payload of {} bytes is not word aligned",
        ty,
        payload.len()
    );
    write_u32(out, ty.0);
    write_u32(out, (payload.len() / 4) as u32);
    out.extend_from_slice(payload);
    Ok(())
}
