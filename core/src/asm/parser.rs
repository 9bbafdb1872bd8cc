use anyhow::Result;
use once_cell::sync::Lazy;

use crate::bundle::{BundleImage, ChunkType, ConstantType, LayoutEntry, bytes_from_words, check_bounds};
use crate::util::fast_map::{FastHashMap, fast_hash_map_new, fast_hash_map_with_capacity};
use crate::vm::{INSTRUCTION_WORDS, Instruction, Opcode};

use super::AsmError;

/// Lower-cased mnemonic -> opcode.
static MNEMONICS: Lazy<FastHashMap<String, Opcode>> = Lazy::new(|| {
    let mut table = fast_hash_map_with_capacity(Opcode::COUNT);
    for op in Opcode::ALL {
        table.insert(op.mnemonic().to_ascii_lowercase(), op);
    }
    table
});

/// Largest constant buffer the assembler will build (64 KiB).
pub(super) const MAX_CBUFFER_WORDS: usize = 16 * 1024;

struct Line<'s> {
    number: usize,
    label: Option<&'s str>,
    words: Vec<&'s str>,
}

impl Line<'_> {
    fn is_instruction(&self) -> bool {
        self.words.first().is_some_and(|w| !w.starts_with('.'))
    }
}

/// Assembles source text into a bundle image.
pub fn assemble(src: &str) -> Result<BundleImage> {
    let lines = split_lines(src)?;

    let mut labels = fast_hash_map_new();
    let mut pc = 0u32;
    for line in &lines {
        if let Some(label) = line.label
            && labels.insert(label, pc).is_some()
        {
            return Err(AsmError::new(line.number, format!("label '{}' is defined twice", label)).into());
        }
        if line.is_instruction() {
            pc += 1;
        }
    }

    let mut asm = Assembler {
        labels,
        image: BundleImage::default(),
        constants: Vec::new(),
    };
    for line in &lines {
        asm.line(line).map_err(|msg| AsmError::new(line.number, msg))?;
    }

    let Assembler {
        mut image, constants, ..
    } = asm;
    image.constants = bytes_from_words(&constants);
    check_bounds(&image.layout, image.constants.len())?;
    tracing::debug!(
        target: "fxvm::bundle",
        instructions = image.code.len(),
        constant_bytes = image.constants.len(),
        layout_entries = image.layout.len(),
        "assembled"
    );
    Ok(image)
}

fn split_lines(src: &str) -> Result<Vec<Line<'_>>> {
    let mut lines = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let number = idx + 1;
        let text = match raw.find([';', '#']) {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let mut text = text.trim();
        let mut label = None;
        if let Some((head, rest)) = text.split_once(':') {
            let head = head.trim();
            if !is_label_name(head) {
                return Err(AsmError::new(number, format!("invalid label '{}'", head)).into());
            }
            label = Some(head);
            text = rest.trim();
        }
        let words: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty())
            .collect();
        if label.is_some() || !words.is_empty() {
            lines.push(Line { number, label, words });
        }
    }
    Ok(lines)
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

struct Assembler<'s> {
    labels: FastHashMap<&'s str, u32>,
    image: BundleImage,
    constants: Vec<u32>,
}

impl Assembler<'_> {
    fn line(&mut self, line: &Line<'_>) -> Result<(), String> {
        let Some((head, args)) = line.words.split_first() else {
            return Ok(());
        };
        match *head {
            ".cbuffer" => self.cbuffer(args),
            ".constant" => self.constant(args),
            ".init" => self.init(args),
            ".chunk" => self.chunk(args),
            directive if directive.starts_with('.') => Err(format!("unknown directive '{}'", directive)),
            mnemonic => self.instruction(mnemonic, args),
        }
    }

    fn cbuffer(&mut self, args: &[&str]) -> Result<(), String> {
        let [size] = args else {
            return Err(".cbuffer takes one argument: the size in bytes".to_string());
        };
        let bytes = parse_word(size).ok_or_else(|| format!("invalid size '{}'", size))?;
        if bytes % 4 != 0 {
            return Err(format!("constant buffer size {} is not a multiple of 4", bytes));
        }
        let words = bytes as usize / 4;
        if words > MAX_CBUFFER_WORDS {
            return Err(format!("constant buffer size {} exceeds {} bytes", bytes, MAX_CBUFFER_WORDS * 4));
        }
        if words < self.constants.len() {
            return Err(format!(
                "constant buffer size {} is smaller than the {} bytes already initialised",
                bytes,
                self.constants.len() * 4
            ));
        }
        self.constants.resize(words, 0);
        Ok(())
    }

    fn constant(&mut self, args: &[&str]) -> Result<(), String> {
        let (name, ty, offset, size, semantic) = match args {
            [name, ty, offset, size] => (name, ty, offset, size, None),
            [name, ty, offset, size, semantic] => (name, ty, offset, size, Some(*semantic)),
            _ => return Err(".constant takes: name type offset size [semantic]".to_string()),
        };
        let offset = parse_word(offset).ok_or_else(|| format!("invalid offset '{}'", offset))?;
        let size = parse_word(size).ok_or_else(|| format!("invalid size '{}'", size))?;
        let mut entry = LayoutEntry::new(name, ConstantType::parse(ty), offset, size);
        if let Some(semantic) = semantic {
            entry = entry.with_semantic(semantic);
        }
        self.image.layout.push(entry);
        Ok(())
    }

    fn init(&mut self, args: &[&str]) -> Result<(), String> {
        let [offset, values @ ..] = args else {
            return Err(".init takes a word offset followed by values".to_string());
        };
        if values.is_empty() {
            return Err(".init needs at least one value".to_string());
        }
        let offset = parse_word(offset).ok_or_else(|| format!("invalid offset '{}'", offset))? as usize;
        let end = offset.saturating_add(values.len());
        if end > MAX_CBUFFER_WORDS {
            return Err(format!(".init writes past the {}-byte constant buffer limit", MAX_CBUFFER_WORDS * 4));
        }
        if self.constants.len() < end {
            self.constants.resize(end, 0);
        }
        for (slot, value) in self.constants[offset..end].iter_mut().zip(values) {
            *slot = parse_word(value).ok_or_else(|| format!("invalid value '{}'", value))?;
        }
        Ok(())
    }

    fn chunk(&mut self, args: &[&str]) -> Result<(), String> {
        let [ty, values @ ..] = args else {
            return Err(".chunk takes a chunk type followed by words".to_string());
        };
        let ty = ChunkType(parse_word(ty).ok_or_else(|| format!("invalid chunk type '{}'", ty))?);
        if ty.name().is_some() {
            return Err(format!("{} is produced by the assembler and cannot be given with .chunk", ty));
        }
        let words = values
            .iter()
            .map(|v| parse_word(v).ok_or_else(|| format!("invalid value '{}'", v)))
            .collect::<Result<Vec<_>, _>>()?;
        self.image.extra.push((ty, bytes_from_words(&words)));
        Ok(())
    }

    fn instruction(&mut self, mnemonic: &str, args: &[&str]) -> Result<(), String> {
        let op = MNEMONICS
            .get(&mnemonic.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown mnemonic '{}'", mnemonic))?;
        if args.len() > INSTRUCTION_WORDS - 1 {
            return Err(format!("{} takes at most {} operands, got {}", op, INSTRUCTION_WORDS - 1, args.len()));
        }
        let mut operands = [0u32; INSTRUCTION_WORDS - 1];
        for (slot, arg) in operands.iter_mut().zip(args) {
            *slot = self.operand(arg)?;
        }
        let [a, b, c, d] = operands;
        self.image.code.push(Instruction::new(op, a, b, c, d));
        Ok(())
    }

    fn operand(&self, arg: &str) -> Result<u32, String> {
        if let Some(label) = arg.strip_prefix('@') {
            return self
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| format!("undefined label '{}'", label));
        }
        if let Some(reg) = arg.strip_prefix('r')
            && let Ok(index) = reg.parse::<u32>()
        {
            return Ok(index);
        }
        parse_word(arg).ok_or_else(|| format!("invalid operand '{}'", arg))
    }
}

/// Parses an immediate: decimal, `0x` hex, negative, or `f`-suffixed float.
fn parse_word(tok: &str) -> Option<u32> {
    let (negative, body) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let value = u32::from_str_radix(hex, 16).ok()?;
        return Some(if negative { value.wrapping_neg() } else { value });
    }
    if let Some(float) = tok.strip_suffix('f') {
        return float.parse::<f32>().ok().map(f32::to_bits);
    }
    if negative {
        return tok.parse::<i32>().ok().map(|v| v as u32);
    }
    tok.parse::<u32>().ok()
}
