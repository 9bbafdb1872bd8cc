use super::*;

fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

#[test]
fn integer_arithmetic_wraps() {
    assert_eq!(binop(Opcode::I32Add, i32::MAX as u32, 1) as i32, i32::MIN);
    assert_eq!(binop(Opcode::I32Sub, i32::MIN as u32, 1) as i32, i32::MAX);
    assert_eq!(binop(Opcode::I32Mul, 0x4000_0000, 4), 0);
    assert_eq!(binop(Opcode::I32Div, i32::MIN as u32, -1i32 as u32) as i32, i32::MIN);
}

#[test]
fn division_truncates_toward_zero() {
    assert_eq!(binop(Opcode::I32Div, -7i32 as u32, 2) as i32, -3);
    assert_eq!(binop(Opcode::I32Mod, -7i32 as u32, 2) as i32, -1);
    assert_eq!(binop(Opcode::I32Mod, 7, -2i32 as u32) as i32, 1);
}

#[test]
fn modulo_by_zero_is_zero() {
    for b in [0i32, 1, -1, 17, i32::MAX, i32::MIN] {
        assert_eq!(binop(Opcode::I32Mod, b as u32, 0), 0, "{} % 0", b);
    }
}

#[test]
fn mad_min_max() {
    let code = vec![
        seti(1, 5),
        seti(2, -3),
        seti(3, 4),
        Instruction::new(Opcode::I32Mad, 0, 1, 2, 3),
        ret(),
    ];
    assert_eq!(play(code), 5 + -3 * 4);
    assert_eq!(binop(Opcode::I32Min, -2i32 as u32, 1) as i32, -2);
    assert_eq!(binop(Opcode::I32Max, -2i32 as u32, 1) as i32, 1);
}

#[test]
fn float_arithmetic() {
    let b = |x: f32| x.to_bits();
    assert_eq!(f(binop(Opcode::F32Add, b(1.5), b(2.25))), 3.75);
    assert_eq!(f(binop(Opcode::F32Sub, b(1.5), b(2.25))), -0.75);
    assert_eq!(f(binop(Opcode::F32Mul, b(1.5), b(-2.0))), -3.0);
    assert_eq!(f(binop(Opcode::F32Div, b(1.0), b(4.0))), 0.25);
    assert_eq!(f(binop(Opcode::F32Mod, b(5.5), b(2.0))), 1.5);
    assert_eq!(f(binop(Opcode::F32Mod, b(-5.5), b(2.0))), -1.5);
    assert_eq!(f(binop(Opcode::F32Min, b(-1.0), b(2.0))), -1.0);
    assert_eq!(f(binop(Opcode::F32Max, b(-1.0), b(2.0))), 2.0);
    assert!(f(binop(Opcode::F32Div, b(0.0), b(0.0))).is_nan());
}

#[test]
fn float_intrinsics() {
    let b = |x: f32| x.to_bits();
    assert_eq!(f(unop(Opcode::F32Frac, b(2.75))), 0.75);
    assert_eq!(f(unop(Opcode::F32Frac, b(-1.25))), 0.75);
    assert_eq!(f(unop(Opcode::F32Floor, b(-1.5))), -2.0);
    assert_eq!(f(unop(Opcode::F32Ceil, b(-1.5))), -1.0);
    assert_eq!(f(unop(Opcode::F32Abs, b(-3.0))), 3.0);
    assert_eq!(f(unop(Opcode::F32Sqrt, b(16.0))), 4.0);
    assert_eq!(f(unop(Opcode::F32Sin, b(0.0))), 0.0);
    assert_eq!(f(unop(Opcode::F32Cos, b(0.0))), 1.0);
}

#[test]
fn comparisons_write_zero_or_one() {
    let minus_one = -1i32 as u32;
    assert_eq!(binop(Opcode::U32LessThan, minus_one, 1), 0);
    assert_eq!(binop(Opcode::I32LessThan, minus_one, 1), 1);
    assert_eq!(binop(Opcode::U32GreaterThanEqual, minus_one, 1), 1);
    assert_eq!(binop(Opcode::I32GreaterThanEqual, minus_one, 1), 0);
    assert_eq!(binop(Opcode::I32GreaterThanEqual, 4, 4), 1);
    assert_eq!(binop(Opcode::I32Equal, 4, 4), 1);
    assert_eq!(binop(Opcode::I32NotEqual, 4, 4), 0);
}

#[test]
fn float_comparisons_write_float_one() {
    let b = |x: f32| x.to_bits();
    assert_eq!(f(binop(Opcode::F32LessThan, b(1.0), b(2.0))), 1.0);
    assert_eq!(f(binop(Opcode::F32LessThan, b(2.0), b(1.0))), 0.0);
    assert_eq!(f(binop(Opcode::F32GreaterThanEqual, b(2.0), b(2.0))), 1.0);
    assert_eq!(f(binop(Opcode::F32GreaterThanEqual, b(f32::NAN), b(0.0))), 0.0);
}

#[test]
fn logical_ops() {
    assert_eq!(unop(Opcode::I32Not, 0), 1);
    assert_eq!(unop(Opcode::I32Not, 42), 0);
    assert_eq!(binop(Opcode::I32LogicalOr, 0, 9), 1);
    assert_eq!(binop(Opcode::I32LogicalOr, 0, 0), 0);
    assert_eq!(binop(Opcode::I32LogicalAnd, 3, 9), 1);
    assert_eq!(binop(Opcode::I32LogicalAnd, 3, 0), 0);
}

#[test]
fn casts_convert_values() {
    let b = |x: f32| x.to_bits();
    assert_eq!(unop(Opcode::F32ToI32, b(-3.7)) as i32, -3);
    assert_eq!(unop(Opcode::F32ToU32, b(3.7)), 3);
    assert_eq!(f(unop(Opcode::I32ToF32, -2i32 as u32)), -2.0);
    assert_eq!(f(unop(Opcode::U32ToF32, 0x8000_0000)), 2147483648.0);
}

#[test]
fn float_to_int_casts_saturate() {
    let b = |x: f32| x.to_bits();
    assert_eq!(unop(Opcode::F32ToU32, b(-1.0)), 0);
    assert_eq!(unop(Opcode::F32ToI32, b(1e20)) as i32, i32::MAX);
    assert_eq!(unop(Opcode::F32ToI32, b(f32::NAN)), 0);
}

#[test]
fn registers_reinterpret_bits() {
    let code = vec![setf(1, 1.0), Instruction::op2(Opcode::I32LoadRegister, 0, 1), ret()];
    assert_eq!(play(code) as u32, 0x3f80_0000);
}
