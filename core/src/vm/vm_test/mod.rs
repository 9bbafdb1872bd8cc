pub(super) use crate::{
    bundle::{Bundle, BundleImage, ConstantType, LayoutEntry, UAV0_REGISTER},
    error::{BundleError, ExecError, ExecFault},
    vm::{Extent3, Instruction, Opcode, SystemValues, VmOptions},
};

pub(super) fn bundle_of(code: Vec<Instruction>) -> Bundle {
    Bundle::from_image("test", BundleImage::new(code))
}

pub(super) fn play(code: Vec<Instruction>) -> i32 {
    bundle_of(code).play().unwrap()
}

pub(super) fn play_validated(code: Vec<Instruction>) -> anyhow::Result<i32> {
    bundle_of(code).with_options(VmOptions::validated()).play()
}

pub(super) fn exec_fault(err: &anyhow::Error) -> ExecError {
    *err.downcast_ref::<ExecError>().expect("not an execution fault")
}

pub(super) fn set(reg: u32, value: u32) -> Instruction {
    Instruction::op2(Opcode::I32SetConst, reg, value)
}

pub(super) fn seti(reg: u32, value: i32) -> Instruction {
    set(reg, value as u32)
}

pub(super) fn setf(reg: u32, value: f32) -> Instruction {
    set(reg, value.to_bits())
}

pub(super) fn op3(op: Opcode, a: u32, b: u32, c: u32) -> Instruction {
    Instruction::op3(op, a, b, c)
}

pub(super) fn ret() -> Instruction {
    Instruction::op0(Opcode::Ret)
}

/// Evaluates `r0 = op(r1, r2)` and returns the raw bits of r0.
pub(super) fn binop(op: Opcode, lhs: u32, rhs: u32) -> u32 {
    play(vec![set(1, lhs), set(2, rhs), op3(op, 0, 1, 2), ret()]) as u32
}

pub(super) fn unop(op: Opcode, src: u32) -> u32 {
    play(vec![set(1, src), Instruction::op2(op, 0, 1), ret()]) as u32
}

mod arithmetic;
mod control_flow;
mod dispatch;
mod memory;
mod validated;
