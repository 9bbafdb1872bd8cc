use super::*;

#[test]
fn out_of_range_register_is_reported() {
    let err = play_validated(vec![seti(0, 1), set(9000, 1), ret()]).unwrap_err();
    let fault = exec_fault(&err);
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.fault, ExecFault::RegisterOutOfRange { index: 9000 });
}

#[test]
#[should_panic]
fn out_of_range_register_panics_in_fast_mode() {
    play(vec![set(9000, 1), ret()]);
}

#[test]
fn pointer_past_the_bank_is_reported() {
    let code = vec![
        seti(1, 8190),
        op3(Opcode::I32LoadRegistersPointer, 0, 1, 5),
        ret(),
    ];
    let err = play_validated(code).unwrap_err();
    assert_eq!(exec_fault(&err).fault, ExecFault::RegisterOutOfRange { index: 8195 });
}

#[test]
fn step_limit_stops_infinite_loop() {
    let mut bundle = bundle_of(vec![Instruction::op1(Opcode::Jump, 0)])
        .with_options(VmOptions::validated().with_step_limit(100));
    let err = bundle.play().unwrap_err();
    assert_eq!(exec_fault(&err).fault, ExecFault::StepLimit { limit: 100 });
}

#[test]
fn step_limit_counts_executed_instructions() {
    let code = vec![seti(0, 3), ret()];
    let mut exact = bundle_of(code.clone()).with_options(VmOptions::validated().with_step_limit(2));
    assert_eq!(exact.play().unwrap(), 3);
    let mut short = bundle_of(code).with_options(VmOptions::validated().with_step_limit(1));
    assert_eq!(exec_fault(&short.play().unwrap_err()).pc, 1);
}

#[test]
fn running_off_the_end_is_reported() {
    let err = play_validated(vec![seti(0, 1)]).unwrap_err();
    let fault = exec_fault(&err);
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.fault, ExecFault::PcOutOfRange);

    let err = play_validated(vec![Instruction::op1(Opcode::Jump, 40)]).unwrap_err();
    assert_eq!(exec_fault(&err).pc, 40);
}

#[test]
fn division_by_zero_is_reported() {
    let err = play_validated(vec![seti(1, 5), op3(Opcode::I32Div, 0, 1, 2), ret()]).unwrap_err();
    let fault = exec_fault(&err);
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.fault, ExecFault::DivisionByZero);
}

#[test]
#[should_panic]
fn division_by_zero_traps_in_fast_mode() {
    play(vec![seti(1, 5), op3(Opcode::I32Div, 0, 1, 2), ret()]);
}

#[test]
fn modulo_by_zero_is_not_a_fault() {
    assert_eq!(play_validated(vec![seti(1, 5), op3(Opcode::I32Mod, 0, 1, 2), ret()]).unwrap(), 0);
}

#[test]
fn input_index_is_checked_against_the_view() {
    let mut bundle = bundle_of(vec![Instruction::op3(Opcode::I32LoadInput, 5, 0, 2), ret()])
        .with_options(VmOptions::validated());
    let buf = bundle.create_buffer("src", &[1, 2, 3, 4]);
    bundle.set_input(5, buf.subview(0, 2).unwrap()).unwrap();
    let err = bundle.play().unwrap_err();
    assert_eq!(
        exec_fault(&err).fault,
        ExecFault::InputOutOfRange {
            slot: 5,
            index: 2,
            len: 2
        }
    );
}

#[test]
fn slot_beyond_the_file_is_reported() {
    let err = play_validated(vec![Instruction::op3(Opcode::I32StoreInput, 49, 0, 0), ret()]).unwrap_err();
    assert_eq!(exec_fault(&err).fault, ExecFault::SlotOutOfRange { slot: 49 });
}

#[test]
fn well_formed_programs_agree_across_modes() {
    let code = vec![
        setf(1, 2.0),
        setf(2, 0.5),
        op3(Opcode::F32Mul, 3, 1, 2),
        Instruction::op2(Opcode::F32ToI32, 4, 3),
        seti(5, 40),
        op3(Opcode::I32Add, 0, 4, 5),
        ret(),
    ];
    assert_eq!(play(code.clone()), 41);
    assert_eq!(play_validated(code).unwrap(), 41);
}
