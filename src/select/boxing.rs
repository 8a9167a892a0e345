use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::InstructionSelector;
use crate::classify::{ScalarKind, TypeCategoryClassifier};
use crate::dex::error::DexError;
use crate::members::{MethodReference, Parameter, Prototype};
use crate::opcodes::RCode;
use crate::types::{ClassReference, PrimitiveType, TypeReference};

/// How values of a scalar kind are boxed and unboxed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxInfo {
    pub kinds: &'static [ScalarKind],
    /// Wrapper class, slashed form.
    pub boxed_class: &'static str,
    pub primitive: PrimitiveType,
    /// Static helper in the runtime's boxing class.
    pub unbox_method: &'static str,
    pub convert_after: RCode,
}

static BOX_INFOS: [BoxInfo; 8] = [
    BoxInfo {
        kinds: &[ScalarKind::Byte, ScalarKind::SByte],
        boxed_class: "java/lang/Byte",
        primitive: PrimitiveType::Byte,
        unbox_method: "UnboxSByte",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Bool],
        boxed_class: "java/lang/Boolean",
        primitive: PrimitiveType::Boolean,
        unbox_method: "UnboxBoolean",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Char],
        boxed_class: "java/lang/Character",
        primitive: PrimitiveType::Char,
        unbox_method: "UnboxCharacter",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Short, ScalarKind::UShort],
        boxed_class: "java/lang/Short",
        primitive: PrimitiveType::Short,
        unbox_method: "UnboxShort",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Int, ScalarKind::UInt],
        boxed_class: "java/lang/Integer",
        primitive: PrimitiveType::Int,
        unbox_method: "UnboxInteger",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Long, ScalarKind::ULong],
        boxed_class: "java/lang/Long",
        primitive: PrimitiveType::Long,
        unbox_method: "UnboxLong",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Float],
        boxed_class: "java/lang/Float",
        primitive: PrimitiveType::Float,
        unbox_method: "UnboxFloat",
        convert_after: RCode::Nop,
    },
    BoxInfo {
        kinds: &[ScalarKind::Double],
        boxed_class: "java/lang/Double",
        primitive: PrimitiveType::Double,
        unbox_method: "UnboxDouble",
        convert_after: RCode::Nop,
    },
];

static BY_KIND: Lazy<HashMap<ScalarKind, &'static BoxInfo>> =
    Lazy::new(|| BOX_INFOS.iter().flat_map(|info| info.kinds.iter().map(move |k| (*k, info))).collect());

impl BoxInfo {
    pub fn all() -> &'static [BoxInfo] {
        &BOX_INFOS
    }

    pub fn for_kind(kind: ScalarKind) -> Result<&'static BoxInfo, DexError> {
        BY_KIND
            .get(&kind)
            .copied()
            .ok_or_else(|| DexError::unsupported_type(format!("no box information for {:?}", kind)))
    }

    pub fn boxed_type(&self) -> ClassReference {
        ClassReference::new(self.boxed_class)
    }

    /// `Boxed.valueOf(primitive value) -> Boxed`.
    pub fn value_of_method(&self) -> MethodReference {
        let boxed = self.boxed_type();
        let prototype = Prototype::new(
            TypeReference::Class(boxed.clone()),
            vec![Parameter::new(TypeReference::Primitive(self.primitive), "value")],
        );
        MethodReference::new(boxed, "valueOf", prototype)
    }

    /// `helper.<unbox>(java.lang.Object value) -> primitive`.
    pub fn unbox_method(&self, helper: &ClassReference) -> MethodReference {
        let prototype = Prototype::new(
            TypeReference::Primitive(self.primitive),
            vec![Parameter::new(TypeReference::object(), "value")],
        );
        MethodReference::new(helper.clone(), self.unbox_method, prototype)
    }
}

impl<C: TypeCategoryClassifier> InstructionSelector<C> {
    fn box_info(&self, ty: &C::Type) -> Result<&'static BoxInfo, DexError> {
        match self.classifier().scalar_kind(ty)? {
            Some(kind) => BoxInfo::for_kind(kind).map_err(|e| err!(e, "{}", ty)),
            None => Err(DexError::unsupported_type(format!("no box information for {}", ty))),
        }
    }

    pub fn box_value_of_method(&self, ty: &C::Type) -> Result<MethodReference, DexError> {
        Ok(self.box_info(ty)?.value_of_method())
    }

    /// Unbox helper on `helper` and the conversion to apply to its result.
    pub fn unbox_value_method(&self, ty: &C::Type, helper: &ClassReference) -> Result<(MethodReference, RCode), DexError> {
        let info = self.box_info(ty)?;
        Ok((info.unbox_method(helper), info.convert_after))
    }

    pub fn boxed_type(&self, ty: &C::Type) -> Result<ClassReference, DexError> {
        Ok(self.box_info(ty)?.boxed_type())
    }

    pub fn unboxed_conversion(&self, ty: &C::Type) -> Result<RCode, DexError> {
        Ok(self.box_info(ty)?.convert_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClrClassifier, ClrType};

    #[test]
    fn one_entry_per_kind() {
        for kind in ScalarKind::ALL {
            let hits = BoxInfo::all().iter().filter(|i| i.kinds.contains(&kind)).count();
            match kind {
                ScalarKind::IntPtr | ScalarKind::UIntPtr => assert_eq!(hits, 0),
                _ => assert_eq!(hits, 1, "{:?}", kind),
            }
        }
        assert!(BoxInfo::for_kind(ScalarKind::IntPtr).is_err());
        assert!(BoxInfo::all().iter().all(|i| i.convert_after == RCode::Nop));
    }

    #[test]
    fn value_of_and_unbox_agree() {
        let s = InstructionSelector::new(ClrClassifier);
        let helper = ClassReference::new("runtime.internal.Boxing");
        let ty = ClrType::UInt16;

        let value_of = s.box_value_of_method(&ty).unwrap();
        assert_eq!(value_of.to_string(), "Ljava/lang/Short;->valueOf(S)Ljava/lang/Short;");
        let (unbox, convert) = s.unbox_value_method(&ty, &helper).unwrap();
        assert_eq!(unbox.name, "UnboxShort");
        assert_eq!(unbox.prototype.signature(), "(Ljava/lang/Object;)S");
        assert_eq!(convert, RCode::Nop);
        assert_eq!(s.boxed_type(&ty).unwrap().fullname(), "java.lang.Short");

        assert!(s.boxed_type(&ClrType::String).is_err());
        assert!(s.boxed_type(&ClrType::Void).is_err());
        let e = ClrType::enumeration("E", ClrType::Byte);
        assert_eq!(s.boxed_type(&e).unwrap().fullname(), "java.lang.Byte");
    }
}
