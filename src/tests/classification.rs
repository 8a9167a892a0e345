use crate::classify::{
    ClrClassifier, ClrType, DexCategory, JvmClassifier, RegisterCategory, ScalarKind, TypeCategoryClassifier,
    XModelClassifier, XModule, XTypeDefinition, XTypeReference,
};
use crate::dex::error::ErrorKind;
use crate::opcodes::RCode;
use crate::select::{ArithmeticOp, BoxInfo, InstructionSelector};
use crate::types::{ClassReference, PrimitiveType, TypeReference};

fn clr_scalars() -> Vec<ClrType> {
    vec![
        ClrType::Boolean,
        ClrType::Char,
        ClrType::SByte,
        ClrType::Byte,
        ClrType::Int16,
        ClrType::UInt16,
        ClrType::Int32,
        ClrType::UInt32,
        ClrType::Int64,
        ClrType::UInt64,
        ClrType::Single,
        ClrType::Double,
        ClrType::IntPtr,
        ClrType::UIntPtr,
    ]
}

#[test]
fn int64_is_wide() {
    let c = ClrClassifier;
    assert!(c.is_dex_wide(&ClrType::Int64).unwrap());
    assert!(!c.is_dex_value(&ClrType::Int64).unwrap());
    assert!(!c.is_dex_object(&ClrType::Int64).unwrap());
}

#[test]
fn boolean_is_a_value_and_a_boolean() {
    let c = ClrClassifier;
    assert!(c.is_dex_value(&ClrType::Boolean).unwrap());
    assert!(c.is_dex_boolean(&ClrType::Boolean).unwrap());
    assert!(!c.is_dex_byte(&ClrType::Boolean).unwrap());
}

#[test]
fn byte_enum_classifies_as_its_underlying_type() {
    let c = ClrClassifier;
    let flags = ClrType::enumeration("Demo.Flags", ClrType::Byte);
    assert!(c.is_dex_value(&flags).unwrap());
    assert!(c.is_dex_byte(&flags).unwrap());

    let mut module = XModule::new();
    module.add(XTypeDefinition::enumeration("Demo.Flags", XTypeReference::Primitive(ScalarKind::Byte)));
    let x = XModelClassifier::new(&module);
    let named = XTypeReference::named("Demo.Flags");
    assert_eq!(x.category(&named).unwrap(), DexCategory::Byte);
}

#[test]
fn aput_on_int_array() {
    let s = InstructionSelector::new(ClrClassifier);
    assert_eq!(s.aput(&ClrType::array(ClrType::Int32)).unwrap(), RCode::Aput);
    assert_eq!(s.aget(&ClrType::array(ClrType::Int32)).unwrap(), RCode::Aget);

    let j = InstructionSelector::new(JvmClassifier);
    assert_eq!(j.aput(&TypeReference::array(TypeReference::INT)).unwrap(), RCode::Aput);
    assert_eq!(j.aput(&TypeReference::array(TypeReference::LONG)).unwrap(), RCode::AputWide);
    assert_eq!(j.aput(&TypeReference::array(TypeReference::string())).unwrap(), RCode::AputObject);
}

#[test]
fn register_categories_are_exclusive() {
    let c = ClrClassifier;
    let mut types = clr_scalars();
    types.extend([ClrType::String, ClrType::Object, ClrType::array(ClrType::Byte), ClrType::Class("Demo.A".into())]);
    for ty in &types {
        let flags = [
            c.is_dex_wide(ty).unwrap(),
            c.is_dex_value(ty).unwrap(),
            c.is_dex_object(ty).unwrap(),
        ];
        assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{}", ty);
        let narrow = [
            c.is_dex_boolean(ty).unwrap(),
            c.is_dex_byte(ty).unwrap(),
            c.is_dex_char(ty).unwrap(),
            c.is_dex_short(ty).unwrap(),
        ];
        if narrow.iter().any(|f| *f) {
            assert!(c.is_dex_value(ty).unwrap(), "{}", ty);
            assert_eq!(narrow.iter().filter(|f| **f).count(), 1, "{}", ty);
        }
    }
    assert_eq!(c.register_category(&ClrType::Void).unwrap_err().kind(), ErrorKind::UnsupportedType);
}

#[test]
fn adapters_agree_on_java_primitives() {
    let pairs = [
        (PrimitiveType::Boolean, ClrType::Boolean),
        (PrimitiveType::Char, ClrType::Char),
        (PrimitiveType::Byte, ClrType::SByte),
        (PrimitiveType::Short, ClrType::Int16),
        (PrimitiveType::Int, ClrType::Int32),
        (PrimitiveType::Long, ClrType::Int64),
        (PrimitiveType::Float, ClrType::Single),
        (PrimitiveType::Double, ClrType::Double),
    ];
    for (java, clr) in pairs {
        let jvm = JvmClassifier.category(&TypeReference::Primitive(java)).unwrap();
        assert_eq!(jvm, ClrClassifier.category(&clr).unwrap(), "{:?}", java);
    }
    assert_eq!(
        JvmClassifier.register_category(&TypeReference::class("java.lang.Object")).unwrap(),
        RegisterCategory::Object
    );
}

#[test]
fn every_scalar_has_arithmetic_or_an_error() {
    let s = InstructionSelector::new(ClrClassifier);
    for ty in clr_scalars() {
        let slot = s.classifier().numeric_slot(&ty).unwrap();
        for op in ArithmeticOp::ALL {
            match s.arithmetic(op, &ty) {
                Ok(code) => assert_ne!(code, RCode::Nop),
                Err(e) => {
                    assert!(slot.is_floating() && !op.supports_floating(), "{:?} {}", op, ty);
                    assert_eq!(e.kind(), ErrorKind::UnsupportedType);
                }
            }
        }
    }
}

#[test]
fn box_and_unbox_are_symmetric() {
    let s = InstructionSelector::new(ClrClassifier);
    let helper = ClassReference::new("dot42.Internal.Boxing");
    for ty in clr_scalars() {
        let kind = s.classifier().scalar_kind(&ty).unwrap();
        if kind.is_some_and(|k| BoxInfo::for_kind(k).is_err()) {
            assert!(s.box_value_of_method(&ty).is_err());
            continue;
        }
        let value_of = s.box_value_of_method(&ty).unwrap();
        let (unbox, _) = s.unbox_value_method(&ty, &helper).unwrap();
        let parameter = value_of.prototype.parameter_types().next().cloned().unwrap();
        assert_eq!(unbox.prototype.return_type(), &parameter, "{}", ty);
        assert_eq!(value_of.prototype.return_type(), &TypeReference::Class(s.boxed_type(&ty).unwrap()));
        assert_eq!(unbox.prototype.parameter_types().next(), Some(&TypeReference::object()));
    }
}
