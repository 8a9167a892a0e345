//! Fields, methods, prototypes and annotations.
//!
//! References compare by (owner, name, signature) so that the same external
//! member referenced from many call sites collapses to a single pool entry.
//! Definitions add flags and bodies on top of a reference.

use std::fmt;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::code::MethodBody;
use crate::dex::error::DexError;
use crate::freeze::{Freezable, FreezeState, Frozen};
use crate::types::{parse_method_signature, ClassReference, TypeReference};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationVisibility {
    Build,
    Runtime,
    System,
}

impl AnnotationVisibility {
    pub fn to_byte(self) -> u8 {
        match self {
            AnnotationVisibility::Build => 0,
            AnnotationVisibility::Runtime => 1,
            AnnotationVisibility::System => 2,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, DexError> {
        match b {
            0 => Ok(AnnotationVisibility::Build),
            1 => Ok(AnnotationVisibility::Runtime),
            2 => Ok(AnnotationVisibility::System),
            _ => fail!("invalid annotation visibility {}", b),
        }
    }
}

/// Constant attached to a static field, annotation argument or array element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Type(TypeReference),
    Field(FieldReference),
    Method(MethodReference),
    Enum(FieldReference),
    Array(Vec<Value>),
    Annotation(Box<Annotation>),
    Null,
    Boolean(bool),
}

impl Value {
    /// Whether this is the implicit default of a field of type `ty`.
    ///
    /// Trailing defaults are omitted from static value arrays.
    pub fn is_default_for(&self, ty: &TypeReference) -> bool {
        match self {
            Value::Null => !ty.is_primitive(),
            Value::Boolean(b) => !b,
            Value::Byte(v) => *v == 0,
            Value::Short(v) => *v == 0,
            Value::Char(v) => *v == 0,
            Value::Int(v) => *v == 0,
            Value::Long(v) => *v == 0,
            Value::Float(v) => v.to_bits() == 0,
            Value::Double(v) => v.to_bits() == 0,
            _ => false,
        }
    }

    /// Implicit value of a static field that has no explicit initializer.
    pub fn default_for(ty: &TypeReference) -> Value {
        use crate::types::PrimitiveType as P;
        match ty.as_primitive() {
            Some(P::Boolean) => Value::Boolean(false),
            Some(P::Byte) => Value::Byte(0),
            Some(P::Short) => Value::Short(0),
            Some(P::Char) => Value::Char(0),
            Some(P::Int) => Value::Int(0),
            Some(P::Long) => Value::Long(0),
            Some(P::Float) => Value::Float(0.0),
            Some(P::Double) => Value::Double(0.0),
            Some(P::Void) | None => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationArgument {
    pub name: String,
    pub value: Value,
}

impl AnnotationArgument {
    pub fn new(name: &str, value: Value) -> Self {
        AnnotationArgument { name: name.to_string(), value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub annotation_type: ClassReference,
    pub visibility: AnnotationVisibility,
    pub arguments: Vec<AnnotationArgument>,
}

impl Annotation {
    pub fn new(annotation_type: ClassReference, visibility: AnnotationVisibility) -> Self {
        Annotation { annotation_type, visibility, arguments: vec![] }
    }

    pub fn with_argument(mut self, name: &str, value: Value) -> Self {
        self.arguments.push(AnnotationArgument::new(name, value));
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Option<String>,
    pub param_type: TypeReference,
    pub annotations: Vec<Annotation>,
}

impl Parameter {
    pub fn new(param_type: TypeReference, name: &str) -> Self {
        Parameter { name: Some(name.to_string()), param_type, annotations: vec![] }
    }

    pub fn unnamed(param_type: TypeReference) -> Self {
        Parameter { name: None, param_type, annotations: vec![] }
    }
}

/// Parameters compare by type only; names and annotations are not part of a signature.
impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.param_type == other.param_type
    }
}

impl Eq for Parameter {}

/// Method prototype: return type plus ordered parameters.
#[derive(Debug, Clone)]
pub struct Prototype {
    return_type: TypeReference,
    parameters: Vec<Parameter>,
    freeze: FreezeState,
}

impl Prototype {
    /// Frozen prototype.
    pub fn new(return_type: TypeReference, parameters: Vec<Parameter>) -> Self {
        Prototype { return_type, parameters, freeze: FreezeState::frozen() }
    }

    /// Mutable prototype returning void with no parameters.
    pub fn builder() -> Self {
        Prototype { return_type: TypeReference::VOID, parameters: vec![], freeze: FreezeState::new() }
    }

    /// Frozen prototype from a `(params)ret` signature with unnamed parameters.
    pub fn parse(signature: &str) -> Result<Self, DexError> {
        let (params, ret) = parse_method_signature(signature)?;
        Ok(Prototype::new(ret, params.into_iter().map(Parameter::unnamed).collect()))
    }

    pub fn return_type(&self) -> &TypeReference {
        &self.return_type
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter_types(&self) -> impl Iterator<Item = &TypeReference> {
        self.parameters.iter().map(|p| &p.param_type)
    }

    pub fn set_return_type(&mut self, return_type: TypeReference) -> Result<(), DexError> {
        self.freeze.ensure_mutable(self.signature())?;
        self.return_type = return_type;
        Ok(())
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), DexError> {
        self.freeze.ensure_mutable(self.signature())?;
        if parameter.param_type.is_void() {
            return Err(DexError::unsupported_type("void is not a valid parameter type"));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn parameters_mut(&mut self) -> Result<&mut Vec<Parameter>, DexError> {
        self.freeze.ensure_mutable(self.signature())?;
        Ok(&mut self.parameters)
    }

    /// `(params)ret` descriptor.
    pub fn signature(&self) -> String {
        let mut s = String::from("(");
        for p in &self.parameters {
            s.push_str(&p.param_type.descriptor());
        }
        s.push(')');
        s.push_str(&self.return_type.descriptor());
        s
    }

    pub fn shorty(&self) -> String {
        std::iter::once(self.return_type.shorty_char())
            .chain(self.parameters.iter().map(|p| p.param_type.shorty_char()))
            .collect()
    }

    /// Registers taken by the parameters, wide types counting twice.
    pub fn parameter_registers(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| match p.param_type.as_primitive() {
                Some(prim) if prim.is_wide() => 2,
                _ => 1,
            })
            .sum()
    }

    pub fn seal(self) -> Frozen<Prototype> {
        Frozen::new(self)
    }
}

impl Default for Prototype {
    fn default() -> Self {
        Prototype::builder()
    }
}

impl Freezable for Prototype {
    fn freeze_state(&self) -> &FreezeState {
        &self.freeze
    }
}

impl PartialEq for Prototype {
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type && self.parameters == other.parameters
    }
}

impl Eq for Prototype {}

impl Hash for Prototype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature().hash(state);
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    pub owner: ClassReference,
    pub name: String,
    pub field_type: TypeReference,
}

impl FieldReference {
    pub fn new(owner: ClassReference, name: &str, field_type: TypeReference) -> Self {
        FieldReference { owner, name: name.to_string(), field_type }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.owner.descriptor(), self.name, self.field_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    reference: FieldReference,
    pub access_flags: AccessFlags,
    pub annotations: Vec<Annotation>,
    /// Initial value of a static field.
    pub value: Option<Value>,
}

impl FieldDefinition {
    pub fn new(owner: ClassReference, name: &str, field_type: TypeReference, access_flags: AccessFlags) -> Self {
        FieldDefinition {
            reference: FieldReference::new(owner, name, field_type),
            access_flags,
            annotations: vec![],
            value: None,
        }
    }

    pub fn reference(&self) -> &FieldReference {
        &self.reference
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn field_type(&self) -> &TypeReference {
        &self.reference.field_type
    }

    pub fn owner(&self) -> &ClassReference {
        &self.reference.owner
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub(crate) fn set_owner(&mut self, owner: ClassReference) {
        self.reference.owner = owner;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Declaring type; an array type for calls such as `[I->clone()`.
    pub owner: TypeReference,
    pub name: String,
    pub prototype: Prototype,
}

impl MethodReference {
    pub fn new(owner: impl Into<TypeReference>, name: &str, prototype: Prototype) -> Self {
        MethodReference { owner: owner.into(), name: name.to_string(), prototype }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.owner, self.name, self.prototype)
    }
}

/// A method with flags and an optional body.
///
/// A direct method (static, private or constructor) can never be virtual or
/// abstract; every setter checks this and refuses the change.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    reference: MethodReference,
    access_flags: AccessFlags,
    is_virtual: bool,
    pub annotations: Vec<Annotation>,
    pub parameter_annotations: Vec<Vec<Annotation>>,
    pub body: Option<MethodBody>,
}

impl MethodDefinition {
    pub fn new(owner: ClassReference, name: &str, prototype: Prototype) -> Self {
        MethodDefinition {
            reference: MethodReference::new(owner, name, prototype),
            access_flags: AccessFlags::empty(),
            is_virtual: false,
            annotations: vec![],
            parameter_annotations: vec![],
            body: None,
        }
    }

    pub fn with_flags(mut self, access_flags: AccessFlags) -> Result<Self, DexError> {
        self.set_access_flags(access_flags)?;
        Ok(self)
    }

    pub fn reference(&self) -> &MethodReference {
        &self.reference
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn prototype(&self) -> &Prototype {
        &self.reference.prototype
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_constructor(&self) -> bool {
        self.access_flags.contains(AccessFlags::CONSTRUCTOR)
    }

    /// Static, private and constructor methods are dispatched directly.
    pub fn is_direct(&self) -> bool {
        self.access_flags.intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
    }

    pub fn set_access_flags(&mut self, access_flags: AccessFlags) -> Result<(), DexError> {
        check_direct(&self.reference, access_flags, self.is_virtual)?;
        self.access_flags = access_flags;
        Ok(())
    }

    pub fn set_virtual(&mut self, is_virtual: bool) -> Result<(), DexError> {
        check_direct(&self.reference, self.access_flags, is_virtual)?;
        self.is_virtual = is_virtual;
        Ok(())
    }

    pub fn set_abstract(&mut self, value: bool) -> Result<(), DexError> {
        self.set_flag(AccessFlags::ABSTRACT, value)
    }

    pub fn set_static(&mut self, value: bool) -> Result<(), DexError> {
        self.set_flag(AccessFlags::STATIC, value)
    }

    pub fn set_private(&mut self, value: bool) -> Result<(), DexError> {
        self.set_flag(AccessFlags::PRIVATE, value)
    }

    pub fn set_constructor(&mut self, value: bool) -> Result<(), DexError> {
        self.set_flag(AccessFlags::CONSTRUCTOR, value)
    }

    fn set_flag(&mut self, flag: AccessFlags, value: bool) -> Result<(), DexError> {
        let mut flags = self.access_flags;
        flags.set(flag, value);
        self.set_access_flags(flags)
    }

    pub(crate) fn set_owner(&mut self, owner: ClassReference) {
        self.reference.owner = TypeReference::Class(owner);
    }
}

fn check_direct(method: &MethodReference, flags: AccessFlags, is_virtual: bool) -> Result<(), DexError> {
    let direct = flags.intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR);
    if direct && is_virtual {
        return Err(DexError::structure(format!("direct method {} cannot be virtual", method)));
    }
    if direct && flags.contains(AccessFlags::ABSTRACT) {
        return Err(DexError::structure(format!("direct method {} cannot be abstract", method)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::error::ErrorKind;

    fn owner() -> ClassReference {
        ClassReference::new("com.example.Foo")
    }

    #[test]
    fn prototype_signature_and_shorty() {
        let proto = Prototype::new(
            TypeReference::object(),
            vec![
                Parameter::new(TypeReference::INT, "a"),
                Parameter::new(TypeReference::array(TypeReference::LONG), "b"),
                Parameter::new(TypeReference::DOUBLE, "c"),
            ],
        );
        assert_eq!(proto.signature(), "(I[JD)Ljava/lang/Object;");
        assert_eq!(proto.shorty(), "LILD");
        assert_eq!(proto.parameter_registers(), 4);
        assert_eq!(proto, Prototype::parse("(I[JD)Ljava/lang/Object;").unwrap());
    }

    #[test]
    fn frozen_prototype_rejects_mutation() {
        let mut proto = Prototype::parse("()V").unwrap();
        let e = proto.add_parameter(Parameter::unnamed(TypeReference::INT)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Frozen);

        let mut open = Prototype::builder();
        open.add_parameter(Parameter::unnamed(TypeReference::INT)).unwrap();
        open.set_return_type(TypeReference::BOOLEAN).unwrap();
        assert_eq!(open.signature(), "(I)Z");
        assert!(open.add_parameter(Parameter::unnamed(TypeReference::VOID)).is_err());
        let sealed = open.seal();
        assert!(sealed.is_frozen());
    }

    #[test]
    fn references_compare_structurally() {
        let a = MethodReference::new(owner(), "run", Prototype::parse("(I)V").unwrap());
        let mut named = Prototype::builder();
        named.add_parameter(Parameter::new(TypeReference::INT, "count")).unwrap();
        let b = MethodReference::new(owner(), "run", named);
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&MethodReference::new(owner(), "run", Prototype::parse("(J)V").unwrap())));

        let f1 = FieldReference::new(owner(), "x", TypeReference::INT);
        let f2 = FieldReference::new(ClassReference::new("com/example/Foo"), "x", TypeReference::INT);
        assert_eq!(f1, f2);
        assert_eq!(f1.to_string(), "Lcom/example/Foo;->x:I");
    }

    #[test]
    fn direct_methods_cannot_be_virtual_or_abstract() {
        let mut m = MethodDefinition::new(owner(), "helper", Prototype::parse("()V").unwrap());
        m.set_static(true).unwrap();
        assert_eq!(m.set_virtual(true).unwrap_err().kind(), ErrorKind::Structure);
        assert_eq!(m.set_abstract(true).unwrap_err().kind(), ErrorKind::Structure);
        assert!(m.is_static());
        assert!(!m.is_abstract());

        let mut v = MethodDefinition::new(owner(), "run", Prototype::parse("()V").unwrap());
        v.set_virtual(true).unwrap();
        v.set_abstract(true).unwrap();
        assert!(v.set_private(true).is_err());
        assert!(v.set_constructor(true).is_err());
        assert!(!v.is_direct());
    }

    #[test]
    fn static_defaults() {
        assert!(Value::Int(0).is_default_for(&TypeReference::INT));
        assert!(Value::Null.is_default_for(&TypeReference::string()));
        assert!(!Value::Null.is_default_for(&TypeReference::INT));
        assert!(!Value::Float(-0.0).is_default_for(&TypeReference::FLOAT));
        assert_eq!(Value::default_for(&TypeReference::CHAR), Value::Char(0));
    }
}
