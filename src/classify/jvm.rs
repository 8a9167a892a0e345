use super::{ScalarKind, TypeCategoryClassifier, TypeShape};
use crate::dex::error::DexError;
use crate::types::{PrimitiveType, TypeReference};

/// Classifier over Dalvik/JVM type references.
///
/// JVM enums are classes, so everything that is not primitive is a reference.
#[derive(Debug, Default, Clone, Copy)]
pub struct JvmClassifier;

impl TypeCategoryClassifier for JvmClassifier {
    type Type = TypeReference;

    fn shape(&self, ty: &TypeReference) -> Result<TypeShape<TypeReference>, DexError> {
        Ok(match ty {
            TypeReference::Primitive(p) => match p {
                PrimitiveType::Void => TypeShape::Void,
                PrimitiveType::Boolean => TypeShape::Scalar(ScalarKind::Bool),
                PrimitiveType::Byte => TypeShape::Scalar(ScalarKind::SByte),
                PrimitiveType::Short => TypeShape::Scalar(ScalarKind::Short),
                PrimitiveType::Char => TypeShape::Scalar(ScalarKind::Char),
                PrimitiveType::Int => TypeShape::Scalar(ScalarKind::Int),
                PrimitiveType::Long => TypeShape::Scalar(ScalarKind::Long),
                PrimitiveType::Float => TypeShape::Scalar(ScalarKind::Float),
                PrimitiveType::Double => TypeShape::Scalar(ScalarKind::Double),
            },
            TypeReference::Array(element) => TypeShape::Array((**element).clone()),
            TypeReference::ByReference(element) => TypeShape::ByReference((**element).clone()),
            TypeReference::Class(_) => TypeShape::Reference,
        })
    }
}
