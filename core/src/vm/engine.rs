//! The interpreter loop.
//!
//! One call runs one logical thread from `pc = 0` until `Ret`. Opcodes are
//! decoded into [`Opcode`] at load time, so the loop is a single exhaustive
//! `match` with no range check on the tag. The `CHECKED` parameter selects
//! validated mode at compile time; in fast mode the checks fold away and
//! misuse falls through to ordinary slice indexing.

use anyhow::{Context, Result};

use crate::bundle::{Bundle, INPUT_SLOT_COUNT};
use crate::error::{ExecError, ExecFault};
use crate::resource::{MemoryView, ResolvedView, ResourcePool};

use super::opcode::{Instruction, Opcode};
use super::options::{ExecMode, VmOptions};
use super::registers::{REGISTER_COUNT, RegisterBank};

/// Input slots resolved against the resource pool for the duration of a run.
pub(crate) struct InputFile<'p> {
    pool: &'p mut ResourcePool,
    slots: [Option<ResolvedView>; INPUT_SLOT_COUNT],
}

impl<'p> InputFile<'p> {
    pub(crate) fn resolve(
        pool: &'p mut ResourcePool,
        bindings: &[Option<MemoryView>; INPUT_SLOT_COUNT],
    ) -> Result<InputFile<'p>> {
        let mut slots = [None; INPUT_SLOT_COUNT];
        for (slot, binding) in bindings.iter().enumerate() {
            if let Some(view) = binding {
                let resolved = pool
                    .resolve(*view)
                    .with_context(|| format!("input slot {} holds an invalid view", slot))?;
                slots[slot] = Some(resolved);
            }
        }
        Ok(InputFile { pool, slots })
    }

    pub(crate) fn words_mut(&mut self, at: ResolvedView) -> &mut [u32] {
        &mut self.pool.words_mut(at.entry)[at.offset..at.offset + at.len]
    }
}

/// Runs one thread with a caller-provided register bank.
///
/// The bank is used as is; callers reset it between threads.
pub(crate) fn run_thread(
    code: &[Instruction],
    regs: &mut RegisterBank,
    inputs: &mut InputFile<'_>,
    options: &VmOptions,
) -> Result<i32, ExecError> {
    match options.mode {
        ExecMode::Fast => Machine::<false> {
            code,
            regs,
            inputs,
            pc: 0,
        }
        .run(None),
        ExecMode::Validated => Machine::<true> {
            code,
            regs,
            inputs,
            pc: 0,
        }
        .run(options.step_limit),
    }
}

struct Machine<'a, 'p, const CHECKED: bool> {
    code: &'a [Instruction],
    regs: &'a mut RegisterBank,
    inputs: &'a mut InputFile<'p>,
    pc: usize,
}

impl<const CHECKED: bool> Machine<'_, '_, CHECKED> {
    fn run(&mut self, step_limit: Option<u64>) -> Result<i32, ExecError> {
        let mut steps = 0u64;
        loop {
            let Instruction { op, a, b, c, d } = self.fetch(&mut steps, step_limit)?;
            match op {
                Opcode::I32SetConst => self.w(a, b)?,
                Opcode::I32LoadRegister => {
                    let v = self.r(b)?;
                    self.w(a, v)?;
                }
                Opcode::I32LoadInput => {
                    let v = self.load_input(a, c)?;
                    self.w(b, v)?;
                }
                Opcode::I32StoreInput => {
                    let v = self.r(c)?;
                    self.store_input(a, b, v)?;
                }
                Opcode::I32LoadRegistersPointer => {
                    let src = self.r(b)?.wrapping_add(c);
                    let v = self.r(src)?;
                    self.w(a, v)?;
                }
                Opcode::I32StoreRegisterPointer => {
                    let dst = self.r(a)?.wrapping_add(c);
                    let v = self.r(b)?;
                    self.w(dst, v)?;
                }
                Opcode::I32LoadInputPointer => {
                    let index = self.r(c)?.wrapping_add(d);
                    let v = self.load_input(a, index)?;
                    self.w(b, v)?;
                }
                Opcode::I32StoreInputPointer => {
                    let index = self.r(b)?.wrapping_add(d);
                    let v = self.r(c)?;
                    self.store_input(a, index, v)?;
                }

                Opcode::I32Add => self.int_binop(a, b, c, i32::wrapping_add)?,
                Opcode::I32Sub => self.int_binop(a, b, c, i32::wrapping_sub)?,
                Opcode::I32Mul => self.int_binop(a, b, c, i32::wrapping_mul)?,
                Opcode::I32Div => {
                    if CHECKED && self.ri(c)? == 0 {
                        return Err(self.fault(ExecFault::DivisionByZero));
                    }
                    // Division by zero is the producer's responsibility and traps here.
                    self.int_binop(a, b, c, i32::wrapping_div)?
                }
                Opcode::I32Mod => self.int_binop(a, b, c, |x, y| if y == 0 { 0 } else { x.wrapping_rem(y) })?,
                Opcode::I32Mad => {
                    let v = self.ri(b)?.wrapping_add(self.ri(c)?.wrapping_mul(self.ri(d)?));
                    self.wi(a, v)?;
                }
                Opcode::I32Min => self.int_binop(a, b, c, |x, y| if x < y { x } else { y })?,
                Opcode::I32Max => self.int_binop(a, b, c, |x, y| if x < y { y } else { x })?,

                Opcode::F32Add => self.float_binop(a, b, c, |x, y| x + y)?,
                Opcode::F32Sub => self.float_binop(a, b, c, |x, y| x - y)?,
                Opcode::F32Mul => self.float_binop(a, b, c, |x, y| x * y)?,
                Opcode::F32Div => self.float_binop(a, b, c, |x, y| x / y)?,
                Opcode::F32Mod => self.float_binop(a, b, c, |x, y| x % y)?,
                Opcode::F32Min => self.float_binop(a, b, c, |x, y| if x < y { x } else { y })?,
                Opcode::F32Max => self.float_binop(a, b, c, |x, y| if x < y { y } else { x })?,

                Opcode::U32LessThan => {
                    let v = self.r(b)? < self.r(c)?;
                    self.wb(a, v)?;
                }
                Opcode::U32GreaterThanEqual => {
                    let v = self.r(b)? >= self.r(c)?;
                    self.wb(a, v)?;
                }
                Opcode::I32LessThan => {
                    let v = self.ri(b)? < self.ri(c)?;
                    self.wb(a, v)?;
                }
                Opcode::I32GreaterThanEqual => {
                    let v = self.ri(b)? >= self.ri(c)?;
                    self.wb(a, v)?;
                }
                Opcode::I32Equal => {
                    let v = self.r(b)? == self.r(c)?;
                    self.wb(a, v)?;
                }
                Opcode::I32NotEqual => {
                    let v = self.r(b)? != self.r(c)?;
                    self.wb(a, v)?;
                }
                Opcode::I32Not => {
                    let v = self.r(b)? == 0;
                    self.wb(a, v)?;
                }
                // Float comparisons produce 1.0 / 0.0 in float bits.
                Opcode::F32LessThan => {
                    let v = self.rf(b)? < self.rf(c)?;
                    self.wf(a, if v { 1.0 } else { 0.0 })?;
                }
                Opcode::F32GreaterThanEqual => {
                    let v = self.rf(b)? >= self.rf(c)?;
                    self.wf(a, if v { 1.0 } else { 0.0 })?;
                }
                Opcode::I32LogicalOr => {
                    let v = self.r(b)? != 0 || self.r(c)? != 0;
                    self.wb(a, v)?;
                }
                Opcode::I32LogicalAnd => {
                    let v = self.r(b)? != 0 && self.r(c)? != 0;
                    self.wb(a, v)?;
                }

                Opcode::F32Frac => self.float_unop(a, b, |x| x - x.floor())?,
                Opcode::F32Floor => self.float_unop(a, b, f32::floor)?,
                Opcode::F32Ceil => self.float_unop(a, b, f32::ceil)?,
                Opcode::F32Sin => self.float_unop(a, b, f32::sin)?,
                Opcode::F32Cos => self.float_unop(a, b, f32::cos)?,
                Opcode::F32Abs => self.float_unop(a, b, f32::abs)?,
                Opcode::F32Sqrt => self.float_unop(a, b, f32::sqrt)?,

                Opcode::F32ToU32 => {
                    let v = self.rf(b)? as u32;
                    self.w(a, v)?;
                }
                Opcode::F32ToI32 => {
                    let v = self.rf(b)? as i32;
                    self.wi(a, v)?;
                }
                Opcode::U32ToF32 => {
                    let v = self.r(b)? as f32;
                    self.wf(a, v)?;
                }
                Opcode::I32ToF32 => {
                    let v = self.ri(b)? as f32;
                    self.wf(a, v)?;
                }

                // The next instruction is always the paired Jump: a true
                // condition steps over it, a false one lands on it.
                Opcode::JumpIf => {
                    if self.r(a)? != 0 {
                        self.pc += 1;
                    }
                }
                Opcode::Jump => {
                    self.pc = a as usize;
                    continue;
                }
                Opcode::Ret => return self.ri(0),
            }
            self.pc += 1;
        }
    }

    #[inline(always)]
    fn fetch(&self, steps: &mut u64, step_limit: Option<u64>) -> Result<Instruction, ExecError> {
        if CHECKED {
            if let Some(limit) = step_limit {
                if *steps >= limit {
                    return Err(self.fault(ExecFault::StepLimit { limit }));
                }
                *steps += 1;
            }
            return match self.code.get(self.pc) {
                Some(inst) => Ok(*inst),
                None => Err(self.fault(ExecFault::PcOutOfRange)),
            };
        }
        Ok(self.code[self.pc])
    }

    #[inline(always)]
    fn fault(&self, fault: ExecFault) -> ExecError {
        ExecError { pc: self.pc, fault }
    }

    #[inline(always)]
    fn reg(&self, idx: u32) -> Result<usize, ExecError> {
        if CHECKED && idx as usize >= REGISTER_COUNT {
            return Err(self.fault(ExecFault::RegisterOutOfRange { index: idx }));
        }
        Ok(idx as usize)
    }

    #[inline(always)]
    fn r(&self, idx: u32) -> Result<u32, ExecError> {
        Ok(self.regs.u32(self.reg(idx)?))
    }

    #[inline(always)]
    fn ri(&self, idx: u32) -> Result<i32, ExecError> {
        Ok(self.regs.i32(self.reg(idx)?))
    }

    #[inline(always)]
    fn rf(&self, idx: u32) -> Result<f32, ExecError> {
        Ok(self.regs.f32(self.reg(idx)?))
    }

    #[inline(always)]
    fn w(&mut self, idx: u32, value: u32) -> Result<(), ExecError> {
        let idx = self.reg(idx)?;
        self.regs.set_u32(idx, value);
        Ok(())
    }

    #[inline(always)]
    fn wi(&mut self, idx: u32, value: i32) -> Result<(), ExecError> {
        let idx = self.reg(idx)?;
        self.regs.set_i32(idx, value);
        Ok(())
    }

    #[inline(always)]
    fn wf(&mut self, idx: u32, value: f32) -> Result<(), ExecError> {
        let idx = self.reg(idx)?;
        self.regs.set_f32(idx, value);
        Ok(())
    }

    #[inline(always)]
    fn wb(&mut self, idx: u32, value: bool) -> Result<(), ExecError> {
        self.w(idx, value as u32)
    }

    #[inline(always)]
    fn int_binop(&mut self, a: u32, b: u32, c: u32, f: impl Fn(i32, i32) -> i32) -> Result<(), ExecError> {
        let v = f(self.ri(b)?, self.ri(c)?);
        self.wi(a, v)
    }

    #[inline(always)]
    fn float_binop(&mut self, a: u32, b: u32, c: u32, f: impl Fn(f32, f32) -> f32) -> Result<(), ExecError> {
        let v = f(self.rf(b)?, self.rf(c)?);
        self.wf(a, v)
    }

    #[inline(always)]
    fn float_unop(&mut self, a: u32, b: u32, f: impl Fn(f32) -> f32) -> Result<(), ExecError> {
        let v = f(self.rf(b)?);
        self.wf(a, v)
    }

    /// Pool entry and absolute word position of `input[slot][index]`.
    #[inline(always)]
    fn input_word(&self, slot: u32, index: u32) -> Result<(usize, usize), ExecError> {
        let view = match self.inputs.slots.get(slot as usize) {
            Some(Some(view)) => *view,
            Some(None) => return Err(self.fault(ExecFault::UnboundSlot { slot })),
            None => return Err(self.fault(ExecFault::SlotOutOfRange { slot })),
        };
        if CHECKED && index as usize >= view.len {
            return Err(self.fault(ExecFault::InputOutOfRange {
                slot,
                index,
                len: view.len,
            }));
        }
        Ok((view.entry, view.offset + index as usize))
    }

    #[inline(always)]
    fn load_input(&self, slot: u32, index: u32) -> Result<u32, ExecError> {
        let (entry, pos) = self.input_word(slot, index)?;
        Ok(self.inputs.pool.words(entry)[pos])
    }

    #[inline(always)]
    fn store_input(&mut self, slot: u32, index: u32, value: u32) -> Result<(), ExecError> {
        let (entry, pos) = self.input_word(slot, index)?;
        self.inputs.pool.words_mut(entry)[pos] = value;
        Ok(())
    }
}

impl Bundle {
    /// Runs a single thread against the current bindings and returns the
    /// signed value of `r0` at `Ret`.
    ///
    /// System-value slots keep whatever the last dispatch left in them.
    pub fn play(&mut self) -> Result<i32> {
        let options = self.options;
        let mut regs = RegisterBank::new();
        let mut inputs = InputFile::resolve(&mut self.resources, &self.inputs)?;
        let ret = run_thread(&self.code, &mut regs, &mut inputs, &options)
            .map_err(|err| anyhow::Error::new(err).context(format!("bundle '{}' faulted", self.name)))?;
        tracing::debug!(target: "fxvm::vm", bundle = %self.name, ret, "play finished");
        Ok(ret)
    }
}
