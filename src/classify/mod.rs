//! Register-category classification of source types.
//!
//! Every metadata source (CLR assemblies, JVM class files, the unified
//! XModel) plugs in through [`TypeCategoryClassifier`] by reporting only the
//! [`TypeShape`] of a type. The category predicates are provided methods and
//! are shared by all adapters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dex::error::DexError;
use crate::types::PrimitiveType;

pub mod clr;
pub mod jvm;
pub mod xmodel;

pub use clr::{ClrClassifier, ClrType};
pub use jvm::JvmClassifier;
pub use xmodel::{XModelClassifier, XModule, XTypeDefinition, XTypeReference};

/// Source-level scalar kinds, after enum resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Char,
    SByte,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    IntPtr,
    UIntPtr,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 14] = [
        ScalarKind::Bool,
        ScalarKind::Char,
        ScalarKind::SByte,
        ScalarKind::Byte,
        ScalarKind::Short,
        ScalarKind::UShort,
        ScalarKind::Int,
        ScalarKind::UInt,
        ScalarKind::Long,
        ScalarKind::ULong,
        ScalarKind::Float,
        ScalarKind::Double,
        ScalarKind::IntPtr,
        ScalarKind::UIntPtr,
    ];

    pub fn register_category(self) -> RegisterCategory {
        match self {
            ScalarKind::Long | ScalarKind::ULong | ScalarKind::Double => RegisterCategory::Wide,
            _ => RegisterCategory::Value,
        }
    }

    pub fn category(self) -> DexCategory {
        match self {
            ScalarKind::Bool => DexCategory::Boolean,
            ScalarKind::SByte | ScalarKind::Byte => DexCategory::Byte,
            ScalarKind::Char => DexCategory::Char,
            ScalarKind::Short | ScalarKind::UShort => DexCategory::Short,
            ScalarKind::Int | ScalarKind::UInt | ScalarKind::IntPtr | ScalarKind::UIntPtr => DexCategory::Int,
            ScalarKind::Float => DexCategory::Float,
            ScalarKind::Long | ScalarKind::ULong => DexCategory::Long,
            ScalarKind::Double => DexCategory::Double,
        }
    }

    /// Dalvik primitive a value of this kind is stored as.
    pub fn primitive(self) -> PrimitiveType {
        match self.category() {
            DexCategory::Boolean => PrimitiveType::Boolean,
            DexCategory::Byte => PrimitiveType::Byte,
            DexCategory::Char => PrimitiveType::Char,
            DexCategory::Short => PrimitiveType::Short,
            DexCategory::Int => PrimitiveType::Int,
            DexCategory::Float => PrimitiveType::Float,
            DexCategory::Long => PrimitiveType::Long,
            DexCategory::Double => PrimitiveType::Double,
            DexCategory::Object => PrimitiveType::Void,
        }
    }

    pub fn numeric_slot(self) -> NumericSlot {
        match self {
            ScalarKind::Float => NumericSlot::Float,
            ScalarKind::Double => NumericSlot::Double,
            ScalarKind::Long | ScalarKind::ULong => NumericSlot::Long,
            _ => NumericSlot::Int,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ScalarKind::Byte | ScalarKind::UShort | ScalarKind::UInt | ScalarKind::ULong | ScalarKind::UIntPtr
        )
    }
}

/// Register footprint of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterCategory {
    /// One non-reference register.
    Value,
    /// A register pair.
    Wide,
    /// One reference register.
    Object,
}

/// Category used to pick narrow load/store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexCategory {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    Object,
}

impl DexCategory {
    pub fn register_category(self) -> RegisterCategory {
        match self {
            DexCategory::Long | DexCategory::Double => RegisterCategory::Wide,
            DexCategory::Object => RegisterCategory::Object,
            _ => RegisterCategory::Value,
        }
    }
}

/// Column of the arithmetic opcode tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericSlot {
    Int,
    Long,
    Float,
    Double,
}

impl NumericSlot {
    pub const ALL: [NumericSlot; 4] = [NumericSlot::Int, NumericSlot::Long, NumericSlot::Float, NumericSlot::Double];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_floating(self) -> bool {
        matches!(self, NumericSlot::Float | NumericSlot::Double)
    }
}

/// What an adapter knows about a type once enums are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape<T> {
    Void,
    Scalar(ScalarKind),
    Reference,
    Array(T),
    ByReference(T),
}

/// Classifies types of one metadata source into Dalvik register categories.
pub trait TypeCategoryClassifier {
    type Type: Clone + fmt::Display;

    /// Shape of `ty`, enums resolved to their underlying type.
    ///
    /// Fails with an UnsupportedType error when `ty` cannot be resolved.
    fn shape(&self, ty: &Self::Type) -> Result<TypeShape<Self::Type>, DexError>;

    fn category(&self, ty: &Self::Type) -> Result<DexCategory, DexError> {
        match self.shape(ty)? {
            TypeShape::Void => Err(DexError::unsupported_type(format!("unexpected void type {}", ty))),
            TypeShape::Scalar(kind) => Ok(kind.category()),
            TypeShape::Reference | TypeShape::Array(_) | TypeShape::ByReference(_) => Ok(DexCategory::Object),
        }
    }

    fn register_category(&self, ty: &Self::Type) -> Result<RegisterCategory, DexError> {
        Ok(self.category(ty)?.register_category())
    }

    fn scalar_kind(&self, ty: &Self::Type) -> Result<Option<ScalarKind>, DexError> {
        match self.shape(ty)? {
            TypeShape::Scalar(kind) => Ok(Some(kind)),
            TypeShape::Void => Err(DexError::unsupported_type(format!("unexpected void type {}", ty))),
            _ => Ok(None),
        }
    }

    /// Arithmetic table column; references are not numeric.
    fn numeric_slot(&self, ty: &Self::Type) -> Result<NumericSlot, DexError> {
        match self.scalar_kind(ty)? {
            Some(kind) => Ok(kind.numeric_slot()),
            None => Err(DexError::unsupported_type(format!("type {} is not numeric", ty))),
        }
    }

    /// Element of an array or by-reference type.
    fn element_type(&self, ty: &Self::Type) -> Result<Self::Type, DexError> {
        match self.shape(ty)? {
            TypeShape::Array(element) | TypeShape::ByReference(element) => Ok(element),
            _ => Err(DexError::unsupported_type(format!("type {} is not an array", ty))),
        }
    }

    fn is_void(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(matches!(self.shape(ty)?, TypeShape::Void))
    }

    fn is_dex_wide(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.register_category(ty)? == RegisterCategory::Wide)
    }

    fn is_dex_value(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.register_category(ty)? == RegisterCategory::Value)
    }

    fn is_dex_object(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.register_category(ty)? == RegisterCategory::Object)
    }

    fn is_dex_boolean(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.category(ty)? == DexCategory::Boolean)
    }

    fn is_dex_byte(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.category(ty)? == DexCategory::Byte)
    }

    fn is_dex_char(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.category(ty)? == DexCategory::Char)
    }

    fn is_dex_short(&self, ty: &Self::Type) -> Result<bool, DexError> {
        Ok(self.category(ty)? == DexCategory::Short)
    }
}
