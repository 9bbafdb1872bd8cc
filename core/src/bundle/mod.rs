//! Bundle loading and the input register file.
//!
//! A bundle is the unit the VM executes: decoded instructions, the constant
//! buffer with its reflection table, and a table of input slots that bind
//! buffers to the kernel. Serialized bundles are a stream of chunks (see
//! [`chunk`]); CODE, CONSTANTS and LAYOUT are required.

mod chunk;
mod codec;
mod layout;

use anyhow::{Context, Result, ensure};

use crate::error::BundleError;
use crate::resource::{BufferKind, MemoryView, ResourcePool, ResourceView, Uav, ViewRef};
use crate::vm::{Instruction, VmOptions, decode_code, encode_code};

pub use chunk::{CHUNK_HEADER_LEN, Chunk, ChunkMap, ChunkType, decode_chunks, write_chunk};
pub(crate) use codec::{bytes_from_words, words_from_bytes};
pub use layout::{ConstantType, LayoutEntry, check_bounds, decode_layout, encode_layout, find_entry};

// Input register file layout. Shared with the bundle producer; never renumber.
pub const CBUFFER0_REGISTER: u32 = 0;
pub const INPUT0_REGISTER: u32 = 1;
pub const UAV0_REGISTER: u32 = 17;
pub const SRV0_REGISTER: u32 = 33;
pub const INPUT_SLOT_COUNT: usize = SRV0_REGISTER as usize + 16;

/// Size of the UAV counter that precedes element data.
pub const UAV_COUNTER_BYTES: u32 = 4;

/// Plain-data form of a bundle: what the encoder writes and the loader reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleImage {
    pub code: Vec<Instruction>,
    /// Initial constant-buffer bytes; a whole number of words.
    pub constants: Vec<u8>,
    pub layout: Vec<LayoutEntry>,
    /// Chunks the VM does not interpret, carried through unchanged.
    pub extra: Vec<(ChunkType, Vec<u8>)>,
}

impl BundleImage {
    pub fn new(code: Vec<Instruction>) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }
}

/// Serialises `image` as CONSTANTS, LAYOUT, CODE followed by any extra chunks.
pub fn encode_bundle(image: &BundleImage) -> Result<Vec<u8>> {
    ensure!(
        image.constants.len() % 4 == 0,
        "constant buffer of {} bytes is not word aligned",
        image.constants.len()
    );
    check_bounds(&image.layout, image.constants.len())?;
    let mut out = Vec::new();
    write_chunk(&mut out, ChunkType::CONSTANTS, &image.constants)?;
    write_chunk(&mut out, ChunkType::LAYOUT, &encode_layout(&image.layout))?;
    write_chunk(&mut out, ChunkType::CODE, &bytes_from_words(&encode_code(&image.code)))?;
    for (ty, payload) in &image.extra {
        write_chunk(&mut out, *ty, payload)?;
    }
    Ok(out)
}

/// Decodes a serialized bundle into owned parts.
pub fn decode_bundle(bytes: &[u8]) -> Result<BundleImage> {
    let chunks = decode_chunks(bytes)?;
    let required = |ty: ChunkType| chunks.get(ty).ok_or(BundleError::MissingChunk(ty));
    let code_bytes = required(ChunkType::CODE)?;
    let constants = required(ChunkType::CONSTANTS)?.to_vec();
    let layout_bytes = required(ChunkType::LAYOUT)?;

    let layout = decode_layout(layout_bytes).context("while decoding LAYOUT chunk")?;
    check_bounds(&layout, constants.len())?;
    let code = decode_code(&codec::words_from_bytes(code_bytes)).context("while decoding CODE chunk")?;
    let extra = chunks
        .iter()
        .filter(|chunk| chunk.ty.name().is_none())
        .map(|chunk| (chunk.ty, chunk.payload.to_vec()))
        .collect();
    Ok(BundleImage {
        code,
        constants,
        layout,
        extra,
    })
}

/// A loaded, executable kernel together with its bindings.
///
/// Buffers created through the bundle (UAVs, host inputs) belong to its
/// resource pool. They are meant to be released with the matching destroy
/// call; whatever is still live is reclaimed when the bundle is dropped.
pub struct Bundle {
    pub(crate) name: String,
    pub(crate) code: Vec<Instruction>,
    layout: Vec<LayoutEntry>,
    pub(crate) resources: ResourcePool,
    constants: MemoryView,
    pub(crate) inputs: [Option<MemoryView>; INPUT_SLOT_COUNT],
    pub(crate) system_values: Option<MemoryView>,
    pub(crate) options: VmOptions,
}

impl Bundle {
    /// Decodes `bytes` and copies code and constants into bundle-owned storage.
    pub fn load(name: &str, bytes: &[u8]) -> Result<Bundle> {
        let image = decode_bundle(bytes).with_context(|| format!("failed to load bundle '{}'", name))?;
        Ok(Bundle::from_image(name, image))
    }

    pub fn from_image(name: &str, image: BundleImage) -> Bundle {
        let BundleImage {
            code,
            constants,
            layout,
            extra,
        } = image;
        let mut resources = ResourcePool::new();
        let constants = resources.alloc(BufferKind::Constants, "$constants", codec::words_from_bytes(&constants));
        let mut inputs = [None; INPUT_SLOT_COUNT];
        inputs[CBUFFER0_REGISTER as usize] = Some(constants);
        tracing::debug!(
            target: "fxvm::bundle",
            bundle = name,
            instructions = code.len(),
            constant_bytes = constants.byte_len(),
            layout_entries = layout.len(),
            extra_chunks = extra.len(),
            "bundle loaded"
        );
        Bundle {
            name: name.to_string(),
            code,
            layout,
            resources,
            constants,
            inputs,
            system_values: None,
            options: VmOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn layout(&self) -> &[LayoutEntry] {
        &self.layout
    }

    pub fn with_options(mut self, options: VmOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds `view` to input slot `slot`.
    pub fn set_input(&mut self, slot: u32, view: MemoryView) -> Result<()> {
        let entry = self
            .inputs
            .get_mut(slot as usize)
            .ok_or(BundleError::SlotOutOfRange(slot))?;
        *entry = Some(view);
        Ok(())
    }

    pub fn get_input(&self, slot: u32) -> Option<MemoryView> {
        self.inputs.get(slot as usize).copied().flatten()
    }

    pub fn clear_input(&mut self, slot: u32) -> Result<()> {
        let entry = self
            .inputs
            .get_mut(slot as usize)
            .ok_or(BundleError::SlotOutOfRange(slot))?;
        *entry = None;
        Ok(())
    }

    /// View of the constant buffer (bound at slot 0 by load and by `set_constant`).
    pub fn constants(&self) -> MemoryView {
        self.constants
    }

    pub fn constant_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.resources.read(self.constants)?.to_bytes())
    }

    /// Writes raw bytes for the first layout entry named `name`.
    ///
    /// `float`, `int` and `uint` copy 4 bytes, `float3` 12 and `float4` 16;
    /// bytes after that inside the entry are left alone. Other type tags are
    /// rejected without writing.
    ///
    /// A successful write binds the constant buffer back to slot 0.
    pub fn set_constant(&mut self, name: &str, value: &[u8]) -> Result<()> {
        let Some(entry) = find_entry(&self.layout, name) else {
            return Err(BundleError::InvalidConstantName(name.to_string()).into());
        };
        let Some(needed) = entry.ty.write_size() else {
            return Err(BundleError::UnsupportedConstantType {
                name: name.to_string(),
                ty: entry.ty.to_string(),
            }
            .into());
        };
        if value.len() < needed {
            return Err(BundleError::ValueTooShort {
                name: name.to_string(),
                needed,
                got: value.len(),
            }
            .into());
        }
        self.resources
            .write_bytes(self.constants, entry.offset as usize, &value[..needed])?;
        self.inputs[CBUFFER0_REGISTER as usize] = Some(self.constants);
        tracing::trace!(target: "fxvm::bundle", constant = name, ty = %entry.ty, offset = entry.offset, "constant written");
        Ok(())
    }

    /// Like [`Bundle::set_constant`] with the value taken from a bound view.
    pub fn set_constant_from_view(&mut self, name: &str, value: MemoryView) -> Result<()> {
        let bytes = self.resources.read(value)?.to_bytes();
        self.set_constant(name, &bytes)
    }

    /// Allocates a zeroed UAV of `length` elements of `element_size` bytes.
    ///
    /// The UAV is not bound; register it with
    /// `set_input(uav.index, uav.buffer)` (or `uav.data`).
    pub fn create_uav(&mut self, name: &str, element_size: u32, length: u32, register: u32) -> Result<Uav> {
        let bytes = UAV_COUNTER_BYTES as u64 + element_size as u64 * length as u64;
        let words = bytes.div_ceil(4);
        ensure!(words <= u32::MAX as u64, "UAV '{}' of {} bytes is too large", name, bytes);
        let buffer = self
            .resources
            .alloc(BufferKind::Uav, name, vec![0; words as usize]);
        let data = buffer
            .subview(1, buffer.len() - 1)
            .ok_or_else(|| anyhow::anyhow!("UAV '{}' has no room for its counter", name))?;
        tracing::debug!(target: "fxvm::resource", uav = name, element_size, length, register, words, "created UAV");
        Ok(Uav {
            name: name.to_string(),
            element_size,
            length,
            register,
            index: UAV0_REGISTER + register,
            buffer,
            data,
        })
    }

    /// Releases the UAV's storage. Views derived from it become stale.
    pub fn destroy_uav(&mut self, uav: Uav) -> Result<()> {
        self.resources
            .release(uav.buffer.handle())
            .with_context(|| format!("failed to destroy UAV '{}'", uav.name))
    }

    pub fn create_buffer_view(&self, name: &str, register: u32) -> ResourceView {
        ResourceView {
            name: name.to_string(),
            register,
            index: SRV0_REGISTER + register,
        }
    }

    /// Copies `words` into a new host-owned buffer that can be bound to any slot.
    pub fn create_buffer(&mut self, name: &str, words: &[u32]) -> MemoryView {
        self.resources.alloc(BufferKind::Host, name, words.to_vec())
    }

    /// Releases a buffer made by [`Bundle::create_buffer`]. Constant, UAV and
    /// system-value storage is refused.
    pub fn destroy_buffer(&mut self, view: MemoryView) -> Result<()> {
        let handle = view.handle();
        let kind = self.resources.kind(handle)?;
        ensure!(
            kind == BufferKind::Host,
            "buffer {} is {:?} storage owned by the bundle and cannot be destroyed as a host buffer",
            handle,
            kind
        );
        self.resources.release(handle)
    }

    pub fn read_view(&self, view: MemoryView) -> Result<ViewRef<'_>> {
        self.resources.read(view)
    }

    pub fn write_view(&mut self, view: MemoryView, words: &[u32]) -> Result<()> {
        self.resources.write(view, words)
    }

    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }
}

impl Drop for Bundle {
    fn drop(&mut self) {
        let leaked = self.resources.live_count(BufferKind::Uav);
        if leaked > 0 {
            tracing::debug!(target: "fxvm::resource", bundle = %self.name, leaked, "UAVs still live at drop; reclaiming");
        }
    }
}
