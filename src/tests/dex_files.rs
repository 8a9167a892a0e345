use crate::class_def::ClassDefinition;
use crate::classify::{JvmClassifier, NumericSlot};
use crate::code::{Instruction, MethodBody, Operand};
use crate::container::{ClassArena, DexId};
use crate::dex::error::ErrorKind;
use crate::dex::{DexOptions, DexReader, DexWriter};
use crate::members::{AccessFlags, MethodReference, Prototype};
use crate::opcodes::RCode;
use crate::select::{invoke_kind, invoke_opcode, ArithmeticOp, InstructionSelector, InvokeSite, InvokeTraits};
use crate::types::{ClassReference, PrimitiveType, TypeReference};

#[test]
fn descriptors_survive_parsing() {
    for descriptor in ["V", "Z", "J", "[I", "[[D", "Ljava/lang/String;", "[Lcom/example/Outer$Inner;"] {
        let parsed: TypeReference = descriptor.parse().unwrap();
        assert_eq!(parsed.descriptor(), descriptor);
    }
    assert_eq!(ClassReference::from_descriptor("La/b/C;").unwrap().fullname(), "a.b.C");
    assert!("Lunterminated".parse::<TypeReference>().is_err());
    assert!("Q".parse::<TypeReference>().is_err());
}

/// `long sum(int[] values)` with the loop body picked by the selector.
fn sum_body(selector: &InstructionSelector<JvmClassifier>) -> MethodBody {
    let int: TypeReference = PrimitiveType::Int.into();
    let long: TypeReference = PrimitiveType::Long.into();
    let values = TypeReference::array(int.clone());

    // v0-v1 total, v2 index, v3 element, v4 length, v6-v7 widened element, v8 values
    let mut body = MethodBody::new(9, 1, 0);
    body.push(Instruction::new(selector.const_for(&long).unwrap(), vec![0], Operand::Literal(0)));
    body.push(Instruction::simple(RCode::ArrayLength, &[4, 8]));
    body.push(Instruction::new(RCode::Const4, vec![2], Operand::Literal(0)));
    let loop_start = body.code_units() as i32;
    body.push(Instruction::new(RCode::IfGe, vec![2, 4], Operand::Offset(0)));
    let exit_branch = body.instructions.len() - 1;
    body.push(Instruction::simple(selector.aget(&values).unwrap(), &[3, 8, 2]));
    body.push(Instruction::simple(selector.convert(&int, NumericSlot::Long).unwrap(), &[6, 3]));
    body.push(Instruction::simple(selector.arithmetic_2addr(ArithmeticOp::Add, &long).unwrap(), &[0, 6]));
    body.push(Instruction::new(RCode::AddIntLit8, vec![2, 2], Operand::Literal(1)));
    let goto_at = body.code_units() as i32;
    body.push(Instruction::new(RCode::Goto, vec![], Operand::Offset(loop_start - goto_at)));
    let exit = body.code_units() as i32;
    body.instructions[exit_branch].operand = Operand::Offset(exit - loop_start);
    body.push(Instruction::simple(selector.return_op(&long).unwrap(), &[0]));
    body
}

fn calculator(arena: &mut ClassArena) -> DexId {
    let selector = InstructionSelector::new(JvmClassifier);
    let mut class = ClassDefinition::new("calc.Summer")
        .with_super("java.lang.Object")
        .with_flags(AccessFlags::PUBLIC | AccessFlags::FINAL);

    let flags = AccessFlags::PUBLIC | AccessFlags::STATIC;
    let mut sum = class.new_method("sum", Prototype::parse("([I)J").unwrap(), flags).unwrap();
    sum.body = Some(sum_body(&selector));
    let sum_ref = sum.reference().clone();

    let mut twice = class.new_method("twice", Prototype::parse("([I)J").unwrap(), flags).unwrap();
    let site = InvokeSite { name: "sum", has_this: false, is_special: true, resolved: Some(InvokeTraits::STATIC) };
    let invoke = invoke_opcode(invoke_kind(&site), 1).unwrap();
    let long: TypeReference = PrimitiveType::Long.into();
    let mut body = MethodBody::new(3, 1, 1);
    body.push(Instruction::new(invoke, vec![2], Operand::Method(sum_ref)));
    body.push(Instruction::simple(selector.move_result(&long).unwrap(), &[0]));
    body.push(Instruction::simple(selector.arithmetic_2addr(ArithmeticOp::Add, &long).unwrap(), &[0, 0]));
    body.push(Instruction::simple(selector.return_op(&long).unwrap(), &[0]));
    twice.body = Some(body);

    class.add_method(sum).unwrap();
    class.add_method(twice).unwrap();
    let id = arena.alloc(class);
    let dex = arena.create_dex();
    arena.add_class(dex, id).unwrap();
    dex
}

#[test]
fn selected_code_survives_a_round_trip() {
    let mut arena = ClassArena::new();
    let dex = calculator(&mut arena);
    let file = DexWriter::write(&arena, dex).unwrap();

    let mut target = ClassArena::new();
    let read = DexReader::read_with_options(&file, &mut target, &DexOptions::default().with_verify_signature(true)).unwrap();
    let original = &arena[arena.get_class(dex, "calc.Summer").unwrap()];
    let copy = &target[target.get_class(read, "calc.Summer").unwrap()];

    for name in ["sum", "twice"] {
        let before = original.get_method(name).unwrap().body.as_ref().unwrap();
        let after = copy.get_method(name).unwrap().body.as_ref().unwrap();
        assert_eq!(after.instructions, before.instructions, "{}", name);
        assert_eq!((after.registers_size, after.ins_size, after.outs_size), (before.registers_size, before.ins_size, before.outs_size));
    }

    let twice = copy.get_method("twice").unwrap().body.as_ref().unwrap();
    assert_eq!(twice.instructions[0].opcode, RCode::InvokeStatic);
    let Operand::Method(target_ref) = &twice.instructions[0].operand else {
        panic!("expected a method operand, got {:?}", twice.instructions[0].operand)
    };
    assert_eq!(*target_ref, MethodReference::new(ClassReference::new("calc.Summer"), "sum", Prototype::parse("([I)J").unwrap()));

    let sum = copy.get_method("sum").unwrap().body.as_ref().unwrap();
    let opcodes: Vec<RCode> = sum.instructions.iter().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        [
            RCode::ConstWide,
            RCode::ArrayLength,
            RCode::Const4,
            RCode::IfGe,
            RCode::Aget,
            RCode::IntToLong,
            RCode::AddLong2Addr,
            RCode::AddIntLit8,
            RCode::Goto,
            RCode::ReturnWide,
        ]
    );
}

#[test]
fn hashes_are_checked_independently() {
    let mut arena = ClassArena::new();
    let dex = calculator(&mut arena);
    let file = DexWriter::write(&arena, dex).unwrap();
    assert_eq!(DexWriter::write(&arena, dex).unwrap(), file);

    let mut forged = file.clone();
    forged[12] ^= 0x01;
    let mut target = ClassArena::new();

    let checksum_only = DexOptions::default();
    assert_eq!(DexReader::read_with_options(&forged, &mut target, &checksum_only).unwrap_err().kind(), ErrorKind::Format);

    let signature_only = DexOptions::default().with_verify_checksum(false).with_verify_signature(true);
    assert_eq!(DexReader::read_with_options(&forged, &mut target, &signature_only).unwrap_err().kind(), ErrorKind::Format);

    let neither = DexOptions::default().with_verify_checksum(false);
    let read = DexReader::read_with_options(&forged, &mut target, &neither).unwrap();
    assert!(target.get_class(read, "calc.Summer").is_some());
}
