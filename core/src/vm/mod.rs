//! Register VM: instruction set, register bank, interpreter loop and the
//! compute-style dispatch driver.

mod dispatch;
mod engine;
mod opcode;
mod options;
mod registers;

pub use dispatch::{
    DispatchStats, Extent3, SV_DISPATCH_THREAD_ID_SLOT, SV_GROUP_ID_SLOT, SV_GROUP_INDEX_SLOT, SV_GROUP_THREAD_ID_SLOT,
    SystemValues, ThreadGrid,
};
pub use opcode::{INSTRUCTION_WORDS, Instruction, Opcode, decode_code, encode_code};
pub use options::{ExecMode, VmOptions};
pub use registers::{REGISTER_COUNT, RegisterBank};

#[cfg(test)]
mod vm_test;
