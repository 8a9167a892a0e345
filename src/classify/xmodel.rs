use std::collections::HashMap;
use std::fmt;

use super::{ScalarKind, TypeCategoryClassifier, TypeShape};
use crate::dex::error::DexError;

// Enum chains longer than this are treated as cyclic.
const MAX_ENUM_DEPTH: usize = 16;

/// Type reference in the unified model shared by the CLR and JVM front ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XTypeReference {
    Void,
    Primitive(ScalarKind),
    /// Resolved through the owning [`XModule`].
    Named(String),
    Array(Box<XTypeReference>),
    ByReference(Box<XTypeReference>),
    GenericParameter(String),
}

impl XTypeReference {
    pub fn named(full_name: &str) -> XTypeReference {
        XTypeReference::Named(full_name.to_string())
    }

    pub fn array(element: XTypeReference) -> XTypeReference {
        XTypeReference::Array(Box::new(element))
    }

    pub fn by_reference(element: XTypeReference) -> XTypeReference {
        XTypeReference::ByReference(Box::new(element))
    }
}

impl fmt::Display for XTypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XTypeReference::Void => write!(f, "void"),
            XTypeReference::Primitive(kind) => write!(f, "{:?}", kind),
            XTypeReference::Named(name) | XTypeReference::GenericParameter(name) => write!(f, "{}", name),
            XTypeReference::Array(element) => write!(f, "{}[]", element),
            XTypeReference::ByReference(element) => write!(f, "{}&", element),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XTypeDefinition {
    pub full_name: String,
    pub is_enum: bool,
    pub enum_underlying: Option<XTypeReference>,
}

impl XTypeDefinition {
    pub fn class(full_name: &str) -> Self {
        XTypeDefinition { full_name: full_name.to_string(), is_enum: false, enum_underlying: None }
    }

    pub fn enumeration(full_name: &str, underlying: XTypeReference) -> Self {
        XTypeDefinition { full_name: full_name.to_string(), is_enum: true, enum_underlying: Some(underlying) }
    }
}

/// Type definitions known to the model, by full name.
#[derive(Debug, Default)]
pub struct XModule {
    types: HashMap<String, XTypeDefinition>,
}

impl XModule {
    pub fn new() -> Self {
        XModule::default()
    }

    pub fn add(&mut self, definition: XTypeDefinition) {
        self.types.insert(definition.full_name.clone(), definition);
    }

    pub fn resolve(&self, full_name: &str) -> Option<&XTypeDefinition> {
        self.types.get(full_name)
    }
}

/// Classifier resolving named types through an [`XModule`].
///
/// Named types the module does not define are treated as external classes.
pub struct XModelClassifier<'m> {
    module: &'m XModule,
}

impl<'m> XModelClassifier<'m> {
    pub fn new(module: &'m XModule) -> Self {
        XModelClassifier { module }
    }

    fn shape_at(&self, ty: &XTypeReference, depth: usize) -> Result<TypeShape<XTypeReference>, DexError> {
        if depth > MAX_ENUM_DEPTH {
            return Err(DexError::unsupported_type(format!("cyclic enum definition at {}", ty)));
        }
        Ok(match ty {
            XTypeReference::Void => TypeShape::Void,
            XTypeReference::Primitive(kind) => TypeShape::Scalar(*kind),
            XTypeReference::Array(element) => TypeShape::Array((**element).clone()),
            XTypeReference::ByReference(element) => TypeShape::ByReference((**element).clone()),
            XTypeReference::GenericParameter(_) => TypeShape::Reference,
            XTypeReference::Named(name) => match self.module.resolve(name) {
                Some(def) if def.is_enum => {
                    let underlying = def
                        .enum_underlying
                        .as_ref()
                        .ok_or_else(|| DexError::unsupported_type(format!("enum {} has no underlying type", name)))?;
                    match self.shape_at(underlying, depth + 1)? {
                        shape @ TypeShape::Scalar(_) => shape,
                        _ => {
                            return Err(DexError::unsupported_type(format!(
                                "enum {} has non-integral underlying type {}",
                                name, underlying
                            )))
                        }
                    }
                }
                _ => TypeShape::Reference,
            },
        })
    }
}

impl TypeCategoryClassifier for XModelClassifier<'_> {
    type Type = XTypeReference;

    fn shape(&self, ty: &XTypeReference) -> Result<TypeShape<XTypeReference>, DexError> {
        self.shape_at(ty, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DexCategory;

    #[test]
    fn enums_resolve_through_the_module() {
        let mut module = XModule::new();
        module.add(XTypeDefinition::enumeration("Color", XTypeReference::Primitive(ScalarKind::Byte)));
        module.add(XTypeDefinition::enumeration("Shade", XTypeReference::named("Color")));
        module.add(XTypeDefinition::class("Widget"));
        let c = XModelClassifier::new(&module);

        assert_eq!(c.category(&XTypeReference::named("Shade")).unwrap(), DexCategory::Byte);
        assert!(c.is_dex_object(&XTypeReference::named("Widget")).unwrap());
        assert!(c.is_dex_object(&XTypeReference::named("external.Thing")).unwrap());
    }

    #[test]
    fn cyclic_enums_fail() {
        let mut module = XModule::new();
        module.add(XTypeDefinition::enumeration("A", XTypeReference::named("B")));
        module.add(XTypeDefinition::enumeration("B", XTypeReference::named("A")));
        let c = XModelClassifier::new(&module);
        assert!(c.category(&XTypeReference::named("A")).is_err());
    }
}
