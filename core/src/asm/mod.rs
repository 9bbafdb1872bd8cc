//! Text form of bundles.
//!
//! One instruction per line: a mnemonic followed by up to four operands
//! separated by spaces or commas. Missing operands are zero. Operands are
//! decimal, `0x` hex, negative (two's complement), floats with an `f`
//! suffix (`1.5f`), registers written `r12`, or `@label` for the pc of a
//! label defined as `label:`. `;` and `#` start comments.
//!
//! Directives describe the constant buffer and carried chunks:
//!
//! ```text
//! .cbuffer 32                       ; size in bytes, zero filled
//! .constant gain float 0 4 GAIN     ; name type offset size [semantic]
//! .init 1 2.0f 0x10                 ; word offset, then words
//! .chunk 0x54455854 1 2             ; extra chunk: type, then words
//! ```

mod parser;
mod printer;

use std::fmt;

pub use parser::assemble;
pub use printer::{disassemble, disassemble_code};

/// Assembly error with the 1-based source line it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    pub line: usize,
    pub message: String,
}

impl AsmError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for AsmError {}
