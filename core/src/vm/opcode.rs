//! Instruction set. Discriminants are the wire values emitted by the bundle
//! producer and must never be renumbered.

use std::fmt;

use anyhow::{Context, Result};

use crate::error::BundleError;

/// Number of `u32` words in one encoded instruction (`op, a, b, c, d`).
pub const INSTRUCTION_WORDS: usize = 5;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // registers and inputs
    I32LoadRegister = 0,
    I32LoadInput = 1,
    I32LoadInputPointer = 2,
    I32LoadRegistersPointer = 3,
    I32StoreRegisterPointer = 4,
    I32StoreInput = 5,
    I32StoreInputPointer = 6,
    I32SetConst = 7,
    // arithmetic
    I32Add = 8,
    I32Sub = 9,
    I32Mul = 10,
    I32Div = 11,
    I32Mod = 12,
    F32Add = 13,
    F32Sub = 14,
    F32Mul = 15,
    F32Div = 16,
    F32Mod = 17,
    // relational
    U32LessThan = 18,
    U32GreaterThanEqual = 19,
    I32LessThan = 20,
    I32GreaterThanEqual = 21,
    I32Equal = 22,
    I32NotEqual = 23,
    I32Not = 24,
    F32LessThan = 25,
    F32GreaterThanEqual = 26,
    // logical
    I32LogicalOr = 27,
    I32LogicalAnd = 28,
    // intrinsics
    F32Frac = 29,
    F32Floor = 30,
    F32Ceil = 31,
    F32Sin = 32,
    F32Cos = 33,
    F32Abs = 34,
    F32Sqrt = 35,
    F32Max = 36,
    F32Min = 37,
    I32Mad = 38,
    I32Min = 39,
    I32Max = 40,
    // casts
    F32ToU32 = 41,
    F32ToI32 = 42,
    U32ToF32 = 43,
    I32ToF32 = 44,
    // flow control
    JumpIf = 45,
    Jump = 46,
    Ret = 47,
}

impl Opcode {
    pub const COUNT: usize = 48;

    /// Every opcode, indexed by its wire value.
    pub const ALL: [Opcode; Opcode::COUNT] = [
        Opcode::I32LoadRegister,
        Opcode::I32LoadInput,
        Opcode::I32LoadInputPointer,
        Opcode::I32LoadRegistersPointer,
        Opcode::I32StoreRegisterPointer,
        Opcode::I32StoreInput,
        Opcode::I32StoreInputPointer,
        Opcode::I32SetConst,
        Opcode::I32Add,
        Opcode::I32Sub,
        Opcode::I32Mul,
        Opcode::I32Div,
        Opcode::I32Mod,
        Opcode::F32Add,
        Opcode::F32Sub,
        Opcode::F32Mul,
        Opcode::F32Div,
        Opcode::F32Mod,
        Opcode::U32LessThan,
        Opcode::U32GreaterThanEqual,
        Opcode::I32LessThan,
        Opcode::I32GreaterThanEqual,
        Opcode::I32Equal,
        Opcode::I32NotEqual,
        Opcode::I32Not,
        Opcode::F32LessThan,
        Opcode::F32GreaterThanEqual,
        Opcode::I32LogicalOr,
        Opcode::I32LogicalAnd,
        Opcode::F32Frac,
        Opcode::F32Floor,
        Opcode::F32Ceil,
        Opcode::F32Sin,
        Opcode::F32Cos,
        Opcode::F32Abs,
        Opcode::F32Sqrt,
        Opcode::F32Max,
        Opcode::F32Min,
        Opcode::I32Mad,
        Opcode::I32Min,
        Opcode::I32Max,
        Opcode::F32ToU32,
        Opcode::F32ToI32,
        Opcode::U32ToF32,
        Opcode::I32ToF32,
        Opcode::JumpIf,
        Opcode::Jump,
        Opcode::Ret,
    ];

    #[inline]
    pub fn from_u32(value: u32) -> Option<Opcode> {
        Opcode::ALL.get(value as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::I32LoadRegister => "I32LoadRegister",
            Opcode::I32LoadInput => "I32LoadInput",
            Opcode::I32LoadInputPointer => "I32LoadInputPointer",
            Opcode::I32LoadRegistersPointer => "I32LoadRegistersPointer",
            Opcode::I32StoreRegisterPointer => "I32StoreRegisterPointer",
            Opcode::I32StoreInput => "I32StoreInput",
            Opcode::I32StoreInputPointer => "I32StoreInputPointer",
            Opcode::I32SetConst => "I32SetConst",
            Opcode::I32Add => "I32Add",
            Opcode::I32Sub => "I32Sub",
            Opcode::I32Mul => "I32Mul",
            Opcode::I32Div => "I32Div",
            Opcode::I32Mod => "I32Mod",
            Opcode::F32Add => "F32Add",
            Opcode::F32Sub => "F32Sub",
            Opcode::F32Mul => "F32Mul",
            Opcode::F32Div => "F32Div",
            Opcode::F32Mod => "F32Mod",
            Opcode::U32LessThan => "U32LessThan",
            Opcode::U32GreaterThanEqual => "U32GreaterThanEqual",
            Opcode::I32LessThan => "I32LessThan",
            Opcode::I32GreaterThanEqual => "I32GreaterThanEqual",
            Opcode::I32Equal => "I32Equal",
            Opcode::I32NotEqual => "I32NotEqual",
            Opcode::I32Not => "I32Not",
            Opcode::F32LessThan => "F32LessThan",
            Opcode::F32GreaterThanEqual => "F32GreaterThanEqual",
            Opcode::I32LogicalOr => "I32LogicalOr",
            Opcode::I32LogicalAnd => "I32LogicalAnd",
            Opcode::F32Frac => "F32Frac",
            Opcode::F32Floor => "F32Floor",
            Opcode::F32Ceil => "F32Ceil",
            Opcode::F32Sin => "F32Sin",
            Opcode::F32Cos => "F32Cos",
            Opcode::F32Abs => "F32Abs",
            Opcode::F32Sqrt => "F32Sqrt",
            Opcode::F32Max => "F32Max",
            Opcode::F32Min => "F32Min",
            Opcode::I32Mad => "I32Mad",
            Opcode::I32Min => "I32Min",
            Opcode::I32Max => "I32Max",
            Opcode::F32ToU32 => "F32ToU32",
            Opcode::F32ToI32 => "F32ToI32",
            Opcode::U32ToF32 => "U32ToF32",
            Opcode::I32ToF32 => "I32ToF32",
            Opcode::JumpIf => "JumpIf",
            Opcode::Jump => "Jump",
            Opcode::Ret => "Ret",
        }
    }

    /// Number of operand words the opcode reads; the rest are ignored.
    pub fn arity(self) -> usize {
        use Opcode::*;
        match self {
            Ret => 0,
            JumpIf | Jump => 1,
            I32LoadRegister | I32SetConst | I32Not | F32Frac | F32Floor | F32Ceil | F32Sin | F32Cos | F32Abs
            | F32Sqrt | F32ToU32 | F32ToI32 | U32ToF32 | I32ToF32 => 2,
            I32LoadInputPointer | I32StoreInputPointer | I32Mad => 4,
            _ => 3,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One decoded instruction: opcode plus four raw operand words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Instruction {
    pub const fn new(op: Opcode, a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { op, a, b, c, d }
    }

    pub const fn op0(op: Opcode) -> Self {
        Self::new(op, 0, 0, 0, 0)
    }

    pub const fn op1(op: Opcode, a: u32) -> Self {
        Self::new(op, a, 0, 0, 0)
    }

    pub const fn op2(op: Opcode, a: u32, b: u32) -> Self {
        Self::new(op, a, b, 0, 0)
    }

    pub const fn op3(op: Opcode, a: u32, b: u32, c: u32) -> Self {
        Self::new(op, a, b, c, 0)
    }

    pub fn encode(&self) -> [u32; INSTRUCTION_WORDS] {
        [self.op as u32, self.a, self.b, self.c, self.d]
    }

    pub fn decode(words: [u32; INSTRUCTION_WORDS]) -> Result<Instruction> {
        let Some(op) = Opcode::from_u32(words[0]) else {
            return Err(BundleError::corrupt(format!("unknown opcode {}", words[0])).into());
        };
        Ok(Instruction::new(op, words[1], words[2], words[3], words[4]))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} {}", self.op, self.a, self.b, self.c, self.d)
    }
}

/// Decodes a CODE chunk payload into instructions.
pub fn decode_code(words: &[u32]) -> Result<Vec<Instruction>> {
    if words.len() % INSTRUCTION_WORDS != 0 {
        return Err(BundleError::corrupt(format!(
            "code chunk holds {} words, not a multiple of {}",
            words.len(),
            INSTRUCTION_WORDS
        ))
        .into());
    }
    let mut code = Vec::with_capacity(words.len() / INSTRUCTION_WORDS);
    for (pc, chunk) in words.chunks_exact(INSTRUCTION_WORDS).enumerate() {
        let raw = [chunk[0], chunk[1], chunk[2], chunk[3], chunk[4]];
        code.push(Instruction::decode(raw).with_context(|| format!("while decoding pc {}", pc))?);
    }
    Ok(code)
}

pub fn encode_code(code: &[Instruction]) -> Vec<u32> {
    let mut out = Vec::with_capacity(code.len() * INSTRUCTION_WORDS);
    for inst in code {
        out.extend_from_slice(&inst.encode());
    }
    out
}
