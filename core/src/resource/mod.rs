//! Buffer storage for input slots.
//!
//! Every buffer a bundle can bind (constant buffer, system values, host
//! inputs, UAVs) lives in a generational arena. Views name a buffer by handle,
//! so a view that outlives its buffer is detected instead of dangling.

use std::fmt;

use anyhow::Result;

use crate::error::BundleError;

/// Opaque reference to a buffer in a [`ResourcePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Non-owning window of `len` words starting `offset` words into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryView {
    handle: BufferHandle,
    offset: u32,
    len: u32,
}

impl MemoryView {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len as usize * 4
    }

    /// Narrower view over the same buffer, `None` if it would leave this view.
    pub fn subview(&self, start: usize, len: usize) -> Option<MemoryView> {
        let end = start.checked_add(len)?;
        if end > self.len as usize {
            return None;
        }
        Some(MemoryView {
            handle: self.handle,
            offset: self.offset + start as u32,
            len: len as u32,
        })
    }
}

/// Typed read access to the words behind a view.
#[derive(Debug, Clone, Copy)]
pub struct ViewRef<'a> {
    words: &'a [u32],
}

impl<'a> ViewRef<'a> {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    pub fn u32_at(&self, idx: usize) -> Option<u32> {
        self.words.get(idx).copied()
    }

    pub fn i32_at(&self, idx: usize) -> Option<i32> {
        self.u32_at(idx).map(|w| w as i32)
    }

    pub fn f32_at(&self, idx: usize) -> Option<f32> {
        self.u32_at(idx).map(f32::from_bits)
    }

    pub fn to_i32_vec(&self) -> Vec<i32> {
        self.words.iter().map(|w| *w as i32).collect()
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.words.iter().map(|w| f32::from_bits(*w)).collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        crate::bundle::bytes_from_words(self.words)
    }
}

/// What a pooled buffer is used for. Only `Host` buffers may be released by callers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Constants,
    SystemValues,
    Host,
    Uav,
}

#[derive(Debug)]
struct PoolEntry {
    generation: u32,
    live: bool,
    kind: BufferKind,
    name: String,
    words: Vec<u32>,
}

/// Location of a live view, resolved once before a thread runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedView {
    pub entry: usize,
    pub offset: usize,
    pub len: usize,
}

/// Generational arena of word buffers.
#[derive(Debug, Default)]
pub struct ResourcePool {
    entries: Vec<PoolEntry>,
    free: Vec<u32>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `words` and returns a view covering all of them.
    pub fn alloc(&mut self, kind: BufferKind, name: &str, words: Vec<u32>) -> MemoryView {
        let len = words.len() as u32;
        let handle = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.live = true;
                entry.kind = kind;
                entry.name = name.to_string();
                entry.words = words;
                BufferHandle {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(PoolEntry {
                    generation: 0,
                    live: true,
                    kind,
                    name: name.to_string(),
                    words,
                });
                BufferHandle { index, generation: 0 }
            }
        };
        tracing::trace!(target: "fxvm::resource", %handle, ?kind, name, words = len, "allocated buffer");
        MemoryView {
            handle,
            offset: 0,
            len,
        }
    }

    /// Releases the buffer; every view derived from `handle` becomes stale.
    pub fn release(&mut self, handle: BufferHandle) -> Result<()> {
        let index = self.live_index(handle)?;
        let entry = &mut self.entries[index];
        entry.live = false;
        entry.generation = entry.generation.wrapping_add(1);
        entry.words = Vec::new();
        tracing::trace!(target: "fxvm::resource", %handle, name = %entry.name, "released buffer");
        self.free.push(handle.index);
        Ok(())
    }

    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.live_index(handle).is_ok()
    }

    pub fn name(&self, handle: BufferHandle) -> Result<&str> {
        let index = self.live_index(handle)?;
        Ok(&self.entries[index].name)
    }

    pub fn kind(&self, handle: BufferHandle) -> Result<BufferKind> {
        let index = self.live_index(handle)?;
        Ok(self.entries[index].kind)
    }

    /// Number of live buffers of `kind`.
    pub fn live_count(&self, kind: BufferKind) -> usize {
        self.entries.iter().filter(|e| e.live && e.kind == kind).count()
    }

    pub fn read(&self, view: MemoryView) -> Result<ViewRef<'_>> {
        let resolved = self.resolve(view)?;
        let words = &self.entries[resolved.entry].words[resolved.offset..resolved.offset + resolved.len];
        Ok(ViewRef { words })
    }

    /// Copies `src` into the start of `view`; `src` may not be longer than the view.
    pub fn write(&mut self, view: MemoryView, src: &[u32]) -> Result<()> {
        let resolved = self.resolve(view)?;
        if src.len() > resolved.len {
            return Err(BundleError::ViewOutOfRange {
                handle: view.handle,
                end: view.offset() + src.len(),
                len: view.offset() + resolved.len,
            }
            .into());
        }
        let start = resolved.offset;
        self.entries[resolved.entry].words[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Patches raw bytes at `byte_offset` within `view`, touching only the
    /// bytes covered by `src`.
    pub fn write_bytes(&mut self, view: MemoryView, byte_offset: usize, src: &[u8]) -> Result<()> {
        let resolved = self.resolve(view)?;
        let end = byte_offset + src.len();
        if end > resolved.len * 4 {
            return Err(BundleError::ViewOutOfRange {
                handle: view.handle,
                end: view.offset() + end.div_ceil(4),
                len: view.offset() + resolved.len,
            }
            .into());
        }
        let words = &mut self.entries[resolved.entry].words[resolved.offset..resolved.offset + resolved.len];
        for (i, byte) in src.iter().enumerate() {
            let pos = byte_offset + i;
            let mut le = words[pos / 4].to_le_bytes();
            le[pos % 4] = *byte;
            words[pos / 4] = u32::from_le_bytes(le);
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, view: MemoryView) -> Result<ResolvedView> {
        let entry = self.live_index(view.handle)?;
        let buffer_len = self.entries[entry].words.len();
        let end = view.offset() + view.len();
        if end > buffer_len {
            return Err(BundleError::ViewOutOfRange {
                handle: view.handle,
                end,
                len: buffer_len,
            }
            .into());
        }
        Ok(ResolvedView {
            entry,
            offset: view.offset(),
            len: view.len(),
        })
    }

    #[inline]
    pub(crate) fn words(&self, entry: usize) -> &[u32] {
        &self.entries[entry].words
    }

    #[inline]
    pub(crate) fn words_mut(&mut self, entry: usize) -> &mut [u32] {
        &mut self.entries[entry].words
    }

    fn live_index(&self, handle: BufferHandle) -> Result<usize> {
        match self.entries.get(handle.index as usize) {
            Some(entry) if entry.live && entry.generation == handle.generation => Ok(handle.index as usize),
            _ => Err(BundleError::StaleHandle(handle).into()),
        }
    }
}

/// Unordered-access buffer: one counter word followed by element data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uav {
    pub name: String,
    pub element_size: u32,
    pub length: u32,
    /// Register number as declared in the kernel (`u0` -> 0).
    pub register: u32,
    /// Absolute input slot the UAV is expected to be bound at.
    pub index: u32,
    /// Counter word plus data.
    pub buffer: MemoryView,
    /// Data only, starting after the counter word.
    pub data: MemoryView,
}

impl Uav {
    pub fn counter(&self) -> MemoryView {
        MemoryView {
            handle: self.buffer.handle,
            offset: self.buffer.offset,
            len: 1,
        }
    }
}

/// Shader-resource binding descriptor; carries no storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceView {
    pub name: String,
    pub register: u32,
    pub index: u32,
}
