use std::fmt;

use crate::bundle::ChunkType;
use crate::resource::BufferHandle;

/// Errors reported by bundle loading, constant writes and resource management.
///
/// Public operations return `anyhow::Result`; the concrete kind can be
/// recovered with `err.downcast_ref::<BundleError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    /// Chunk or layout decoding found inconsistent lengths or malformed data.
    Corrupt(String),
    /// One of the required chunks (CODE, CONSTANTS, LAYOUT) is absent.
    MissingChunk(ChunkType),
    /// `set_constant` was given a name that is not in the layout table.
    InvalidConstantName(String),
    /// The layout entry has a type tag that cannot be written.
    UnsupportedConstantType { name: String, ty: String },
    /// The source value holds fewer bytes than the constant's type requires.
    ValueTooShort { name: String, needed: usize, got: usize },
    /// The handle refers to a buffer that has already been released.
    StaleHandle(BufferHandle),
    /// A view reaches past the end of its buffer.
    ViewOutOfRange { handle: BufferHandle, end: usize, len: usize },
    /// Input slot index is outside the input register file.
    SlotOutOfRange(u32),
}

impl BundleError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        BundleError::Corrupt(message.into())
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::Corrupt(msg) => write!(f, "corrupt bundle: {}", msg),
            BundleError::MissingChunk(ty) => write!(f, "bundle is missing the {} chunk", ty),
            BundleError::InvalidConstantName(name) => write!(f, "unknown constant '{}'", name),
            BundleError::UnsupportedConstantType { name, ty } => {
                write!(f, "constant '{}' has unsupported type '{}'", name, ty)
            }
            BundleError::ValueTooShort { name, needed, got } => {
                write!(f, "value for constant '{}' needs {} bytes, got {}", name, needed, got)
            }
            BundleError::StaleHandle(handle) => write!(f, "buffer {} has been released", handle),
            BundleError::ViewOutOfRange { handle, end, len } => {
                write!(f, "view into buffer {} ends at word {} but the buffer has {} words", handle, end, len)
            }
            BundleError::SlotOutOfRange(slot) => write!(f, "input slot {} is out of range", slot),
        }
    }
}

impl std::error::Error for BundleError {}

/// What went wrong while executing a thread in validated mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecFault {
    RegisterOutOfRange { index: u32 },
    SlotOutOfRange { slot: u32 },
    UnboundSlot { slot: u32 },
    InputOutOfRange { slot: u32, index: u32, len: usize },
    PcOutOfRange,
    StepLimit { limit: u64 },
    DivisionByZero,
}

/// Execution fault together with the program counter of the faulting instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecError {
    pub pc: usize,
    pub fault: ExecFault,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pc {}: ", self.pc)?;
        match self.fault {
            ExecFault::RegisterOutOfRange { index } => write!(f, "register r{} is out of range", index),
            ExecFault::SlotOutOfRange { slot } => write!(f, "input slot {} is out of range", slot),
            ExecFault::UnboundSlot { slot } => write!(f, "input slot {} is not bound", slot),
            ExecFault::InputOutOfRange { slot, index, len } => {
                write!(f, "index {} is outside input slot {} ({} words)", index, slot, len)
            }
            ExecFault::PcOutOfRange => write!(f, "program counter left the code"),
            ExecFault::StepLimit { limit } => write!(f, "step limit of {} instructions exhausted", limit),
            ExecFault::DivisionByZero => write!(f, "integer division by zero"),
        }
    }
}

impl std::error::Error for ExecError {}
