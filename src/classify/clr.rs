use std::fmt;

use super::{ScalarKind, TypeCategoryClassifier, TypeShape};
use crate::dex::error::DexError;

/// Type as it appears in CLR metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClrType {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    IntPtr,
    UIntPtr,
    String,
    Object,
    Class(String),
    /// Enum with its underlying type, which may itself be an enum.
    Enum { name: String, underlying: Box<ClrType> },
    Array(Box<ClrType>),
    ByRef(Box<ClrType>),
    Pointer(Box<ClrType>),
    GenericParameter(String),
}

impl ClrType {
    pub fn enumeration(name: &str, underlying: ClrType) -> ClrType {
        ClrType::Enum { name: name.to_string(), underlying: Box::new(underlying) }
    }

    pub fn array(element: ClrType) -> ClrType {
        ClrType::Array(Box::new(element))
    }

    pub fn by_ref(element: ClrType) -> ClrType {
        ClrType::ByRef(Box::new(element))
    }
}

impl fmt::Display for ClrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClrType::Void => write!(f, "System.Void"),
            ClrType::Boolean => write!(f, "System.Boolean"),
            ClrType::Char => write!(f, "System.Char"),
            ClrType::SByte => write!(f, "System.SByte"),
            ClrType::Byte => write!(f, "System.Byte"),
            ClrType::Int16 => write!(f, "System.Int16"),
            ClrType::UInt16 => write!(f, "System.UInt16"),
            ClrType::Int32 => write!(f, "System.Int32"),
            ClrType::UInt32 => write!(f, "System.UInt32"),
            ClrType::Int64 => write!(f, "System.Int64"),
            ClrType::UInt64 => write!(f, "System.UInt64"),
            ClrType::Single => write!(f, "System.Single"),
            ClrType::Double => write!(f, "System.Double"),
            ClrType::IntPtr => write!(f, "System.IntPtr"),
            ClrType::UIntPtr => write!(f, "System.UIntPtr"),
            ClrType::String => write!(f, "System.String"),
            ClrType::Object => write!(f, "System.Object"),
            ClrType::Class(name) | ClrType::Enum { name, .. } | ClrType::GenericParameter(name) => write!(f, "{}", name),
            ClrType::Array(element) => write!(f, "{}[]", element),
            ClrType::ByRef(element) => write!(f, "{}&", element),
            ClrType::Pointer(element) => write!(f, "{}*", element),
        }
    }
}

/// Classifier over CLR metadata types.
///
/// Unmanaged pointers are pointer-sized values; generic parameters are
/// erased to references.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClrClassifier;

impl TypeCategoryClassifier for ClrClassifier {
    type Type = ClrType;

    fn shape(&self, ty: &ClrType) -> Result<TypeShape<ClrType>, DexError> {
        let shape = match ty {
            ClrType::Void => TypeShape::Void,
            ClrType::Boolean => TypeShape::Scalar(ScalarKind::Bool),
            ClrType::Char => TypeShape::Scalar(ScalarKind::Char),
            ClrType::SByte => TypeShape::Scalar(ScalarKind::SByte),
            ClrType::Byte => TypeShape::Scalar(ScalarKind::Byte),
            ClrType::Int16 => TypeShape::Scalar(ScalarKind::Short),
            ClrType::UInt16 => TypeShape::Scalar(ScalarKind::UShort),
            ClrType::Int32 => TypeShape::Scalar(ScalarKind::Int),
            ClrType::UInt32 => TypeShape::Scalar(ScalarKind::UInt),
            ClrType::Int64 => TypeShape::Scalar(ScalarKind::Long),
            ClrType::UInt64 => TypeShape::Scalar(ScalarKind::ULong),
            ClrType::Single => TypeShape::Scalar(ScalarKind::Float),
            ClrType::Double => TypeShape::Scalar(ScalarKind::Double),
            ClrType::IntPtr | ClrType::Pointer(_) => TypeShape::Scalar(ScalarKind::IntPtr),
            ClrType::UIntPtr => TypeShape::Scalar(ScalarKind::UIntPtr),
            ClrType::String | ClrType::Object | ClrType::Class(_) | ClrType::GenericParameter(_) => TypeShape::Reference,
            ClrType::Enum { name, underlying } => {
                return match self.shape(underlying)? {
                    shape @ TypeShape::Scalar(_) => Ok(shape),
                    _ => Err(DexError::unsupported_type(format!(
                        "enum {} has non-integral underlying type {}",
                        name, underlying
                    ))),
                };
            }
            ClrType::Array(element) => TypeShape::Array((**element).clone()),
            ClrType::ByRef(element) => TypeShape::ByReference((**element).clone()),
        };
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DexCategory, RegisterCategory};

    #[test]
    fn scalar_categories() {
        let c = ClrClassifier;
        assert!(c.is_dex_wide(&ClrType::Int64).unwrap());
        assert!(c.is_dex_wide(&ClrType::UInt64).unwrap());
        assert!(c.is_dex_value(&ClrType::Boolean).unwrap());
        assert!(c.is_dex_boolean(&ClrType::Boolean).unwrap());
        assert!(c.is_dex_object(&ClrType::String).unwrap());
        assert!(c.is_dex_value(&ClrType::IntPtr).unwrap());
        assert_eq!(c.category(&ClrType::UInt16).unwrap(), DexCategory::Short);
    }

    #[test]
    fn nested_enums_resolve() {
        let c = ClrClassifier;
        let inner = ClrType::enumeration("Flags", ClrType::Byte);
        let outer = ClrType::enumeration("Alias", inner);
        assert_eq!(c.register_category(&outer).unwrap(), RegisterCategory::Value);
        assert!(c.is_dex_byte(&outer).unwrap());

        let broken = ClrType::enumeration("Broken", ClrType::Void);
        assert!(c.category(&broken).is_err());
    }

    #[test]
    fn void_is_rejected() {
        let e = ClrClassifier.category(&ClrType::Void).unwrap_err();
        assert!(e.to_string().contains("System.Void"));
    }
}
