use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Result, ensure};

use crate::bundle::{BundleImage, words_from_bytes};
use crate::vm::{Instruction, Opcode};

use super::parser::MAX_CBUFFER_WORDS;

const INIT_WORDS_PER_LINE: usize = 8;

/// Renders a bundle image as assembler source that reassembles to the same image.
///
/// Images the assembler could not read back are refused: constant buffers
/// over 64 KiB or not a whole number of words, and layout fields that are
/// empty or contain whitespace, `,`, `:`, `;` or `#`.
pub fn disassemble(image: &BundleImage) -> Result<String> {
    let bytes = image.constants.len();
    ensure!(
        bytes % 4 == 0 && bytes <= MAX_CBUFFER_WORDS * 4,
        "constant buffer of {} bytes has no assembler form",
        bytes
    );
    for entry in &image.layout {
        check_field(&entry.name, "name", &entry.name)?;
        check_field(&entry.name, "type", &entry.ty.to_string())?;
        if !entry.semantic.is_empty() {
            check_field(&entry.name, "semantic", &entry.semantic)?;
        }
    }
    Ok(Listing { image }.to_string())
}

fn check_field(constant: &str, what: &str, text: &str) -> Result<()> {
    let printable = !text.is_empty()
        && !text.contains(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | ';' | '#'));
    ensure!(
        printable,
        "constant {:?}: {} {:?} has no assembler form",
        constant,
        what,
        text
    );
    Ok(())
}

/// Renders only the instruction stream, with `L<pc>:` labels on jump targets.
pub fn disassemble_code(code: &[Instruction]) -> String {
    CodeListing { code }.to_string()
}

struct Listing<'a> {
    image: &'a BundleImage,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self.image;
        let mut header = false;
        if !image.constants.is_empty() {
            writeln!(f, ".cbuffer {}", image.constants.len())?;
            header = true;
        }
        for entry in &image.layout {
            write!(f, ".constant {} {} {} {}", entry.name, entry.ty, entry.offset, entry.size)?;
            if !entry.semantic.is_empty() {
                write!(f, " {}", entry.semantic)?;
            }
            writeln!(f)?;
            header = true;
        }

        // Only non-zero runs are written; `.cbuffer` already zero fills.
        let words = words_from_bytes(&image.constants);
        let mut idx = 0;
        while idx < words.len() {
            if words[idx] == 0 {
                idx += 1;
                continue;
            }
            write!(f, ".init {}", idx)?;
            let start = idx;
            while idx < words.len() && words[idx] != 0 && idx - start < INIT_WORDS_PER_LINE {
                write!(f, " 0x{:08x}", words[idx])?;
                idx += 1;
            }
            writeln!(f)?;
        }

        for (ty, payload) in &image.extra {
            write!(f, ".chunk 0x{:08x}", ty.0)?;
            for word in words_from_bytes(payload) {
                write!(f, " 0x{:08x}", word)?;
            }
            writeln!(f)?;
            header = true;
        }

        if header && !image.code.is_empty() {
            writeln!(f)?;
        }
        fmt::Display::fmt(&CodeListing { code: &image.code }, f)
    }
}

struct CodeListing<'a> {
    code: &'a [Instruction],
}

impl fmt::Display for CodeListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: BTreeSet<u32> = self
            .code
            .iter()
            .filter(|inst| inst.op == Opcode::Jump && (inst.a as usize) < self.code.len())
            .map(|inst| inst.a)
            .collect();

        for (pc, inst) in self.code.iter().enumerate() {
            if targets.contains(&(pc as u32)) {
                writeln!(f, "L{}:", pc)?;
            }
            write!(f, "    {}", inst.op)?;
            let operands = [inst.a, inst.b, inst.c, inst.d];
            // Keep operands past the arity when they are non-zero so nothing is lost.
            let used = operands.iter().rposition(|w| *w != 0).map_or(0, |p| p + 1);
            for (idx, word) in operands.iter().take(used.max(inst.op.arity())).enumerate() {
                if idx == 0 && targets.contains(word) && inst.op == Opcode::Jump {
                    write!(f, " @L{}", word)?;
                } else {
                    write!(f, " {}", word)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
