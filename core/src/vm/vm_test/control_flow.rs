use super::*;

fn branch(cond: u32) -> i32 {
    play(vec![
        set(1, cond),
        Instruction::op1(Opcode::JumpIf, 1),
        Instruction::op1(Opcode::Jump, 5),
        seti(0, 10),
        ret(),
        seti(0, 20),
        ret(),
    ])
}

#[test]
fn jump_if_true_steps_over_paired_jump() {
    assert_eq!(branch(1), 10);
    assert_eq!(branch(0xffff_ffff), 10);
}

#[test]
fn jump_if_false_takes_paired_jump() {
    assert_eq!(branch(0), 20);
}

#[test]
fn counted_loop_sums_range() {
    // sum = 0; for (i = 1; i < 11; i++) sum += i;
    let code = vec![
        seti(0, 0),
        seti(1, 1),
        seti(2, 11),
        seti(4, 1),
        op3(Opcode::I32LessThan, 3, 1, 2),
        Instruction::op1(Opcode::JumpIf, 3),
        Instruction::op1(Opcode::Jump, 10),
        op3(Opcode::I32Add, 0, 0, 1),
        op3(Opcode::I32Add, 1, 1, 4),
        Instruction::op1(Opcode::Jump, 4),
        ret(),
    ];
    assert_eq!(play(code), 55);
}

#[test]
fn ret_returns_signed_r0() {
    assert_eq!(play(vec![set(0, u32::MAX), ret()]), -1);
    assert_eq!(play(vec![ret()]), 0);
}

#[test]
fn ret_stops_before_trailing_code() {
    assert_eq!(play(vec![seti(0, 1), ret(), seti(0, 2), ret()]), 1);
}

#[test]
fn register_pointer_ops_index_the_bank() {
    let code = vec![
        seti(10, 5),
        seti(1, 8),
        // r0 = r[r1 + 2]
        op3(Opcode::I32LoadRegistersPointer, 0, 1, 2),
        seti(2, 20),
        seti(3, 99),
        // r[r2 + 1] = r3
        op3(Opcode::I32StoreRegisterPointer, 2, 3, 1),
        Instruction::op2(Opcode::I32LoadRegister, 4, 21),
        op3(Opcode::I32Add, 0, 0, 4),
        ret(),
    ];
    assert_eq!(play(code), 5 + 99);
}

#[test]
fn play_starts_from_zeroed_registers() {
    let mut bundle = bundle_of(vec![
        Instruction::op2(Opcode::I32LoadRegister, 0, 7),
        seti(7, 3),
        ret(),
    ]);
    assert_eq!(bundle.play().unwrap(), 0);
    assert_eq!(bundle.play().unwrap(), 0);
}
