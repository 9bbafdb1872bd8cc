//! Constant-buffer reflection table carried in the LAYOUT chunk.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

use crate::error::BundleError;

use super::codec::{pad_to_word, read_string, read_u32, write_str, write_u32};

/// Type tag of a constant-buffer entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantType {
    Float,
    Int,
    Uint,
    Float3,
    Float4,
    /// Any tag the VM does not know how to write.
    Other(String),
}

impl ConstantType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "float" => ConstantType::Float,
            "int" => ConstantType::Int,
            "uint" => ConstantType::Uint,
            "float3" => ConstantType::Float3,
            "float4" => ConstantType::Float4,
            other => ConstantType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConstantType::Float => "float",
            ConstantType::Int => "int",
            ConstantType::Uint => "uint",
            ConstantType::Float3 => "float3",
            ConstantType::Float4 => "float4",
            ConstantType::Other(tag) => tag,
        }
    }

    /// Number of bytes `set_constant` copies for this type, `None` when the
    /// type cannot be written.
    pub fn write_size(&self) -> Option<usize> {
        match self {
            ConstantType::Float | ConstantType::Int | ConstantType::Uint => Some(4),
            ConstantType::Float3 => Some(12),
            ConstantType::Float4 => Some(16),
            ConstantType::Other(_) => None,
        }
    }
}

impl fmt::Display for ConstantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConstantType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One named variable inside the constant buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ConstantType,
    /// Size in bytes as declared by the producer.
    pub size: u32,
    /// Byte offset from the start of the constant buffer.
    pub offset: u32,
    pub semantic: String,
}

impl LayoutEntry {
    pub fn new(name: &str, ty: ConstantType, offset: u32, size: u32) -> Self {
        Self {
            name: name.to_string(),
            ty,
            size,
            offset,
            semantic: String::new(),
        }
    }

    pub fn with_semantic(mut self, semantic: &str) -> Self {
        self.semantic = semantic.to_string();
        self
    }
}

/// First entry named `name`; later duplicates are shadowed.
pub fn find_entry<'a>(layout: &'a [LayoutEntry], name: &str) -> Option<&'a LayoutEntry> {
    layout.iter().find(|entry| entry.name == name)
}

pub fn decode_layout(payload: &[u8]) -> Result<Vec<LayoutEntry>> {
    let mut cursor = 0usize;
    let count = read_u32(payload, &mut cursor).context("while reading layout entry count")? as usize;
    // Each record needs at least 20 bytes; reject absurd counts before allocating.
    if count > payload.len() / 20 {
        return Err(BundleError::corrupt(format!(
            "layout declares {} entries but the chunk has only {} bytes",
            count,
            payload.len()
        ))
        .into());
    }
    let mut entries = Vec::with_capacity(count);
    for idx in 0..count {
        let name = read_string(payload, &mut cursor).with_context(|| format!("layout entry {} name", idx))?;
        let ty = read_string(payload, &mut cursor).with_context(|| format!("layout entry {} type", idx))?;
        let semantic = read_string(payload, &mut cursor).with_context(|| format!("layout entry {} semantic", idx))?;
        let offset = read_u32(payload, &mut cursor).with_context(|| format!("layout entry {} offset", idx))?;
        let size = read_u32(payload, &mut cursor).with_context(|| format!("layout entry {} size", idx))?;
        entries.push(LayoutEntry {
            name,
            ty: ConstantType::parse(&ty),
            size,
            offset,
            semantic,
        });
    }
    let trailing = payload.len() - cursor;
    if trailing >= 4 {
        return Err(BundleError::corrupt(format!("{} unexpected trailing bytes in layout chunk", trailing)).into());
    }
    Ok(entries)
}

/// Serialises `entries`; the result is padded to a whole number of words.
pub fn encode_layout(entries: &[LayoutEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, entries.len() as u32);
    for entry in entries {
        write_str(&mut out, &entry.name);
        write_str(&mut out, entry.ty.as_str());
        write_str(&mut out, &entry.semantic);
        write_u32(&mut out, entry.offset);
        write_u32(&mut out, entry.size);
    }
    pad_to_word(&mut out);
    out
}

/// Checks that every entry fits inside a constant buffer of `cbuffer_len` bytes.
pub fn check_bounds(entries: &[LayoutEntry], cbuffer_len: usize) -> Result<()> {
    for entry in entries {
        let end = entry.offset as u64 + entry.size as u64;
        if end > cbuffer_len as u64 {
            return Err(BundleError::corrupt(format!(
                "constant '{}' spans bytes {}..{} past the {}-byte constant buffer",
                entry.name, entry.offset, end, cbuffer_len
            ))
            .into());
        }
    }
    Ok(())
}
