use super::*;

use crate::vm::{SV_DISPATCH_THREAD_ID_SLOT, SV_GROUP_ID_SLOT, SV_GROUP_INDEX_SLOT, SV_GROUP_THREAD_ID_SLOT};

#[test]
fn two_by_two_dispatch_writes_ids() {
    let mut bundle = bundle_of(vec![
        Instruction::op3(Opcode::I32LoadInput, SV_DISPATCH_THREAD_ID_SLOT, 1, 0),
        Instruction::op3(Opcode::I32LoadInput, SV_GROUP_INDEX_SLOT, 2, 0),
        // dtid[r1] = r1; group_index[r1] = r2
        Instruction::new(Opcode::I32StoreInputPointer, UAV0_REGISTER, 1, 1, 0),
        Instruction::new(Opcode::I32StoreInputPointer, UAV0_REGISTER + 1, 1, 2, 0),
        ret(),
    ]);
    let dtid = bundle.create_uav("dtid", 4, 4, 0).unwrap();
    let group_index = bundle.create_uav("group_index", 4, 4, 1).unwrap();
    bundle.set_input(dtid.index, dtid.data).unwrap();
    bundle.set_input(group_index.index, group_index.data).unwrap();

    let stats = bundle.dispatch((2, 1, 1), (2, 1, 1)).unwrap();
    assert_eq!(stats.threads, 4);
    assert_eq!(bundle.read_view(dtid.data).unwrap().words(), &[0, 1, 2, 3]);
    assert_eq!(bundle.read_view(group_index.data).unwrap().words(), &[0, 1, 0, 1]);
}

#[test]
fn observer_sees_threads_in_order() {
    let mut bundle = bundle_of(vec![
        Instruction::op3(Opcode::I32LoadInput, SV_DISPATCH_THREAD_ID_SLOT, 0, 0),
        ret(),
    ]);
    let mut seen = Vec::new();
    let stats = bundle
        .dispatch_observed([2, 1, 1], [3, 1, 1], |sv, ret| seen.push((*sv, ret)))
        .unwrap();
    assert_eq!(stats.threads, 6);
    assert_eq!(stats.nonzero_returns, 5);
    let returns: Vec<i32> = seen.iter().map(|(_, ret)| *ret).collect();
    assert_eq!(returns, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(seen[4].0.group_id, [1, 0, 0]);
    assert_eq!(seen[4].0.group_thread_id, [1, 0, 0]);
}

#[test]
fn all_four_system_values_are_bound() {
    // r0 = GroupID.y * 1000 + GroupThreadID.z * 100 + GroupIndex * 10 + DispatchThreadID.y
    let code = vec![
        Instruction::op3(Opcode::I32LoadInput, SV_GROUP_ID_SLOT, 1, 1),
        Instruction::op3(Opcode::I32LoadInput, SV_GROUP_THREAD_ID_SLOT, 2, 2),
        Instruction::op3(Opcode::I32LoadInput, SV_GROUP_INDEX_SLOT, 3, 0),
        Instruction::op3(Opcode::I32LoadInput, SV_DISPATCH_THREAD_ID_SLOT, 4, 1),
        seti(10, 1000),
        seti(11, 100),
        seti(12, 10),
        Instruction::new(Opcode::I32Mad, 0, 4, 1, 10),
        Instruction::new(Opcode::I32Mad, 0, 0, 2, 11),
        Instruction::new(Opcode::I32Mad, 0, 0, 3, 12),
        ret(),
    ];
    let mut bundle = bundle_of(code);
    let mut seen = Vec::new();
    bundle
        .dispatch_observed(Extent3::new(1, 2, 1), Extent3::new(1, 1, 2), |sv, ret| seen.push((*sv, ret)))
        .unwrap();
    assert_eq!(seen.len(), 4);
    for (sv, ret) in seen {
        let expected = sv.group_id[1] * 1000 + sv.group_thread_id[2] * 100 + sv.group_index * 10 + sv.dispatch_thread_id[1];
        assert_eq!(ret as u32, expected, "{:?}", sv);
    }
}

#[test]
fn registers_reset_between_threads() {
    let mut bundle = bundle_of(vec![
        Instruction::op2(Opcode::I32LoadRegister, 0, 5),
        seti(5, 9),
        ret(),
    ]);
    let stats = bundle.dispatch((1, 1, 1), (4, 1, 1)).unwrap();
    assert_eq!(stats.threads, 4);
    assert_eq!(stats.nonzero_returns, 0);
}

#[test]
fn uav_contents_persist_across_dispatches() {
    // counter += 1
    let mut bundle = bundle_of(vec![
        Instruction::op3(Opcode::I32LoadInput, UAV0_REGISTER, 1, 0),
        seti(2, 1),
        op3(Opcode::I32Add, 1, 1, 2),
        Instruction::op3(Opcode::I32StoreInput, UAV0_REGISTER, 0, 1),
        ret(),
    ]);
    let uav = bundle.create_uav("hits", 4, 1, 0).unwrap();
    bundle.set_input(uav.index, uav.buffer).unwrap();
    bundle.dispatch((1, 1, 1), (4, 1, 1)).unwrap();
    bundle.dispatch((2, 1, 1), (2, 1, 1)).unwrap();
    assert_eq!(bundle.read_view(uav.counter()).unwrap().u32_at(0), Some(8));
}

#[test]
fn empty_grid_runs_nothing() {
    let mut bundle = bundle_of(vec![Instruction::op1(Opcode::Jump, 0)]);
    let stats = bundle.dispatch((0, 1, 1), (8, 8, 1)).unwrap();
    assert_eq!(stats.threads, 0);
}

#[test]
fn system_value_slots_stay_bound_after_dispatch() {
    let mut bundle = bundle_of(vec![ret()]);
    bundle.dispatch((1, 1, 1), (1, 1, 1)).unwrap();
    assert_eq!(bundle.get_input(SV_GROUP_ID_SLOT).map(|v| v.len()), Some(3));
    assert_eq!(bundle.get_input(SV_GROUP_INDEX_SLOT).map(|v| v.len()), Some(1));
    assert_eq!(SystemValues::WORDS, 10);
}

#[test]
fn dispatch_fault_names_the_thread() {
    let mut bundle = bundle_of(vec![
        Instruction::op3(Opcode::I32LoadInput, SV_DISPATCH_THREAD_ID_SLOT, 1, 0),
        seti(2, 2),
        op3(Opcode::I32Sub, 1, 1, 2),
        op3(Opcode::I32Div, 0, 2, 1),
        ret(),
    ])
    .with_options(VmOptions::validated());
    let err = bundle.dispatch((1, 1, 1), (4, 1, 1)).unwrap_err();
    assert_eq!(exec_fault(&err).fault, ExecFault::DivisionByZero);
    assert!(format!("{:#}", err).contains("[2, 0, 0]"));
}

#[test]
fn oversized_dispatch_fails_before_running() {
    let mut bundle = bundle_of(vec![ret()]);
    let huge = Extent3::new(65536, 65536, 1);
    let err = bundle.dispatch(huge, huge).unwrap_err();
    assert!(format!("{:#}", err).contains("65536x65536x1 groups"));
    assert!(bundle.get_input(SV_GROUP_ID_SLOT).is_none());
}
