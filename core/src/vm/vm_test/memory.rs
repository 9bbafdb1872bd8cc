use super::*;

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn load_input_reads_constant_buffer() {
    let image = BundleImage {
        constants: words_to_bytes(&[7, 42, 0, 0]),
        ..BundleImage::new(vec![Instruction::op3(Opcode::I32LoadInput, 0, 0, 1), ret()])
    };
    let mut bundle = Bundle::from_image("cb", image);
    assert_eq!(bundle.play().unwrap(), 42);
}

#[test]
fn set_constant_is_visible_to_the_kernel() {
    let image = BundleImage {
        constants: vec![0; 16],
        layout: vec![LayoutEntry::new("scale", ConstantType::Float, 8, 4)],
        ..BundleImage::new(vec![Instruction::op3(Opcode::I32LoadInput, 0, 0, 2), ret()])
    };
    let mut bundle = Bundle::from_image("cb", image);
    bundle.set_constant("scale", &2.5f32.to_le_bytes()).unwrap();
    assert_eq!(bundle.play().unwrap() as u32, 2.5f32.to_bits());
}

#[test]
fn store_input_writes_uav_data() {
    let mut bundle = bundle_of(vec![
        seti(1, 7),
        Instruction::op3(Opcode::I32StoreInput, UAV0_REGISTER, 2, 1),
        ret(),
    ]);
    let uav = bundle.create_uav("out", 4, 4, 0).unwrap();
    bundle.set_input(uav.index, uav.data).unwrap();
    bundle.play().unwrap();
    assert_eq!(bundle.read_view(uav.data).unwrap().words(), &[0, 0, 7, 0]);
    assert_eq!(bundle.read_view(uav.counter()).unwrap().u32_at(0), Some(0));
}

#[test]
fn pointer_access_adds_register_and_displacement() {
    let mut bundle = bundle_of(vec![
        seti(1, 1),
        // r0 = input[5][r1 + 2]
        Instruction::new(Opcode::I32LoadInputPointer, 5, 0, 1, 2),
        // input[5][r1 + 0] = r0
        Instruction::new(Opcode::I32StoreInputPointer, 5, 1, 0, 0),
        ret(),
    ]);
    let buf = bundle.create_buffer("src", &[10, 20, 30, 40]);
    bundle.set_input(5, buf).unwrap();
    assert_eq!(bundle.play().unwrap(), 40);
    assert_eq!(bundle.read_view(buf).unwrap().words(), &[10, 40, 30, 40]);
}

#[test]
fn subview_bindings_are_offset() {
    let mut bundle = bundle_of(vec![Instruction::op3(Opcode::I32LoadInput, 6, 0, 0), ret()]);
    let buf = bundle.create_buffer("src", &[1, 2, 3, 4]);
    bundle.set_input(6, buf.subview(2, 2).unwrap()).unwrap();
    assert_eq!(bundle.play().unwrap(), 3);
}

#[test]
fn unbound_slot_is_reported() {
    let mut bundle = bundle_of(vec![Instruction::op3(Opcode::I32LoadInput, 9, 0, 0), ret()]);
    let err = bundle.play().unwrap_err();
    assert_eq!(exec_fault(&err).fault, ExecFault::UnboundSlot { slot: 9 });
}

#[test]
fn destroyed_uav_binding_is_stale() {
    let mut bundle = bundle_of(vec![ret()]);
    let uav = bundle.create_uav("out", 4, 2, 1).unwrap();
    bundle.set_input(uav.index, uav.data).unwrap();
    bundle.destroy_uav(uav.clone()).unwrap();
    let err = bundle.play().unwrap_err();
    assert!(matches!(err.downcast_ref::<BundleError>(), Some(BundleError::StaleHandle(_))));

    bundle.clear_input(uav.index).unwrap();
    assert_eq!(bundle.play().unwrap(), 0);
}
