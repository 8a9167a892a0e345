/* Dalvik type references and their descriptor strings e.g. I, [J, Ljava/lang/Object; */

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, one_of};
use nom::combinator::{all_consuming, map, map_opt, verify};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dex::error::DexError;
use crate::freeze::{Freezable, FreezeState, Frozen};

/// The nine Dalvik primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 9] = [
        PrimitiveType::Void,
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Short,
        PrimitiveType::Char,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    pub const fn descriptor_char(self) -> char {
        match self {
            PrimitiveType::Void => 'V',
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Char => 'C',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<PrimitiveType> {
        PrimitiveType::ALL.iter().copied().find(|p| p.descriptor_char() == c)
    }

    pub const fn java_name(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// Long and double occupy a register pair.
    pub const fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }
}

/// A class name split into namespace (package) and simple name.
///
/// References are frozen on construction: they are shared by many members
/// and call sites, so renaming one in place would silently retarget all of
/// them. Use [`ClassReference::new_unfrozen`] or `unfreeze` for builder-phase
/// mutation.
#[derive(Debug, Clone)]
pub struct ClassReference {
    namespace: String,
    name: String,
    freeze: FreezeState,
}

impl ClassReference {
    /// Accepts dotted (`java.lang.Object`) or internal (`java/lang/Object`) names.
    pub fn new(fullname: &str) -> Self {
        let (namespace, name) = split_fullname(fullname);
        ClassReference { namespace, name, freeze: FreezeState::frozen() }
    }

    pub fn new_unfrozen(fullname: &str) -> Self {
        let (namespace, name) = split_fullname(fullname);
        ClassReference { namespace, name, freeze: FreezeState::new() }
    }

    pub fn from_descriptor(descriptor: &str) -> Result<Self, DexError> {
        match parse_descriptor(descriptor)? {
            TypeReference::Class(c) => Ok(c),
            other => fail!("descriptor {} is not a class type", other),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fullname(&self) -> String {
        join_fullname(&self.namespace, &self.name)
    }

    pub fn descriptor(&self) -> String {
        let mut s = String::new();
        self.write_descriptor(&mut s);
        s
    }

    fn write_descriptor(&self, out: &mut String) {
        out.push('L');
        if !self.namespace.is_empty() {
            out.extend(self.namespace.chars().map(|c| if c == '.' { '/' } else { c }));
            out.push('/');
        }
        out.push_str(&self.name);
        out.push(';');
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), DexError> {
        self.freeze.ensure_mutable(self.fullname())?;
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: &str) -> Result<(), DexError> {
        self.freeze.ensure_mutable(self.fullname())?;
        self.namespace = namespace.replace('/', ".");
        Ok(())
    }

    pub fn set_fullname(&mut self, fullname: &str) -> Result<(), DexError> {
        self.freeze.ensure_mutable(self.fullname())?;
        let (namespace, name) = split_fullname(fullname);
        self.namespace = namespace;
        self.name = name;
        Ok(())
    }

    pub fn seal(self) -> Frozen<ClassReference> {
        Frozen::new(self)
    }
}

impl Freezable for ClassReference {
    fn freeze_state(&self) -> &FreezeState {
        &self.freeze
    }
}

impl PartialEq for ClassReference {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl Eq for ClassReference {}

impl Hash for ClassReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ClassReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}

pub(crate) fn split_fullname(fullname: &str) -> (String, String) {
    let dotted = fullname.replace('/', ".");
    match dotted.rsplit_once('.') {
        Some((namespace, name)) => (namespace.to_string(), name.to_string()),
        None => (String::new(), dotted),
    }
}

pub(crate) fn join_fullname(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// A Dalvik type. Equality, ordering and hashing follow the descriptor string,
/// so a by-reference marker equals the array type with the same element.
#[derive(Debug, Clone)]
pub enum TypeReference {
    Primitive(PrimitiveType),
    Array(Box<TypeReference>),
    /// Marker for ref/out parameters; encoded like an array of the element type.
    ByReference(Box<TypeReference>),
    Class(ClassReference),
}

impl TypeReference {
    pub const VOID: TypeReference = TypeReference::Primitive(PrimitiveType::Void);
    pub const BOOLEAN: TypeReference = TypeReference::Primitive(PrimitiveType::Boolean);
    pub const BYTE: TypeReference = TypeReference::Primitive(PrimitiveType::Byte);
    pub const SHORT: TypeReference = TypeReference::Primitive(PrimitiveType::Short);
    pub const CHAR: TypeReference = TypeReference::Primitive(PrimitiveType::Char);
    pub const INT: TypeReference = TypeReference::Primitive(PrimitiveType::Int);
    pub const LONG: TypeReference = TypeReference::Primitive(PrimitiveType::Long);
    pub const FLOAT: TypeReference = TypeReference::Primitive(PrimitiveType::Float);
    pub const DOUBLE: TypeReference = TypeReference::Primitive(PrimitiveType::Double);

    pub fn class(fullname: &str) -> TypeReference {
        TypeReference::Class(ClassReference::new(fullname))
    }

    pub fn array(element: TypeReference) -> TypeReference {
        TypeReference::Array(Box::new(element))
    }

    pub fn by_reference(element: TypeReference) -> TypeReference {
        TypeReference::ByReference(Box::new(element))
    }

    pub fn object() -> TypeReference {
        TypeReference::class("java.lang.Object")
    }

    pub fn string() -> TypeReference {
        TypeReference::class("java.lang.String")
    }

    pub fn descriptor(&self) -> String {
        let mut s = String::new();
        self.write_descriptor(&mut s);
        s
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeReference::Primitive(p) => out.push(p.descriptor_char()),
            TypeReference::Array(e) | TypeReference::ByReference(e) => {
                out.push('[');
                e.write_descriptor(out);
            }
            TypeReference::Class(c) => c.write_descriptor(out),
        }
    }

    /// Source-level spelling, e.g. `int[][]` or `java.lang.String`.
    pub fn java_name(&self) -> String {
        match self {
            TypeReference::Primitive(p) => p.java_name().to_string(),
            TypeReference::Array(e) | TypeReference::ByReference(e) => format!("{}[]", e.java_name()),
            TypeReference::Class(c) => c.fullname(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeReference::Primitive(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeReference::Primitive(PrimitiveType::Void))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeReference::Array(_))
    }

    pub fn is_by_reference(&self) -> bool {
        matches!(self, TypeReference::ByReference(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self, TypeReference::Class(_))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeReference::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassReference> {
        match self {
            TypeReference::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Element type of an array or by-reference type.
    pub fn element_type(&self) -> Option<&TypeReference> {
        match self {
            TypeReference::Array(e) | TypeReference::ByReference(e) => Some(e),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            TypeReference::Array(e) | TypeReference::ByReference(e) => 1 + e.dimensions(),
            _ => 0,
        }
    }

    /// Character used for this type in a prototype shorty.
    pub fn shorty_char(&self) -> char {
        match self {
            TypeReference::Primitive(p) => p.descriptor_char(),
            _ => 'L',
        }
    }
}

impl PartialEq for TypeReference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeReference::Primitive(a), TypeReference::Primitive(b)) => a == b,
            (TypeReference::Class(a), TypeReference::Class(b)) => a == b,
            (
                TypeReference::Array(a) | TypeReference::ByReference(a),
                TypeReference::Array(b) | TypeReference::ByReference(b),
            ) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypeReference {}

impl Hash for TypeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor().hash(state);
    }
}

impl PartialOrd for TypeReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.descriptor().cmp(&other.descriptor())
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

impl FromStr for TypeReference {
    type Err = DexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_descriptor(s)
    }
}

impl From<PrimitiveType> for TypeReference {
    fn from(p: PrimitiveType) -> Self {
        TypeReference::Primitive(p)
    }
}

impl From<ClassReference> for TypeReference {
    fn from(c: ClassReference) -> Self {
        TypeReference::Class(c)
    }
}

impl Serialize for TypeReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.descriptor())
    }
}

impl<'de> Deserialize<'de> for TypeReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_descriptor(&s).map_err(serde::de::Error::custom)
    }
}

fn parse_primitive(input: &str) -> IResult<&str, TypeReference> {
    map(
        map_opt(one_of("VZBSCIJFD"), PrimitiveType::from_descriptor_char),
        TypeReference::Primitive,
    )(input)
}

fn parse_class(input: &str) -> IResult<&str, TypeReference> {
    map(
        delimited(char('L'), take_while1(|c: char| c != ';' && c != '(' && c != ')'), char(';')),
        |name: &str| TypeReference::Class(ClassReference::new(name)),
    )(input)
}

fn parse_array(input: &str) -> IResult<&str, TypeReference> {
    map(
        verify(preceded(char('['), parse_type), |element: &TypeReference| !element.is_void()),
        TypeReference::array,
    )(input)
}

pub(crate) fn parse_type(input: &str) -> IResult<&str, TypeReference> {
    alt((parse_primitive, parse_class, parse_array))(input)
}

/// Parses a single type descriptor; the whole input must be consumed.
pub fn parse_descriptor(descriptor: &str) -> Result<TypeReference, DexError> {
    all_consuming(parse_type)(descriptor)
        .map(|(_, t)| t)
        .map_err(|_| DexError::new(&format!("invalid type descriptor '{}'", descriptor)))
}

/// Parses `(params)ret` into parameter types and return type.
pub fn parse_method_signature(signature: &str) -> Result<(Vec<TypeReference>, TypeReference), DexError> {
    let parsed: IResult<&str, (Vec<TypeReference>, TypeReference)> =
        all_consuming(pair(delimited(char('('), many0(parse_type), char(')')), parse_type))(signature);
    match parsed {
        Ok((_, (params, ret))) if !params.iter().any(|p| p.is_void()) => Ok((params, ret)),
        _ => fail!("invalid method signature '{}'", signature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names() {
        let c = ClassReference::new("java/lang/Object");
        assert_eq!(c.namespace(), "java.lang");
        assert_eq!(c.name(), "Object");
        assert_eq!(c.fullname(), "java.lang.Object");
        assert_eq!(c.descriptor(), "Ljava/lang/Object;");

        let top = ClassReference::new("Main");
        assert_eq!(top.namespace(), "");
        assert_eq!(top.descriptor(), "LMain;");
    }

    #[test]
    fn class_reference_is_frozen_by_default() {
        let mut c = ClassReference::new("com.foo.Bar");
        assert!(c.is_frozen());
        assert!(c.set_name("Baz").is_err());
        c.unfreeze().unwrap();
        c.set_name("Baz").unwrap();
        assert_eq!(c.fullname(), "com.foo.Baz");

        let sealed = c.seal();
        assert_eq!(sealed.descriptor(), "Lcom/foo/Baz;");
        let mut back = sealed.thaw().unwrap();
        assert!(back.set_namespace("org.x").is_ok());
        assert_eq!(back.fullname(), "org.x.Baz");
    }

    #[test]
    fn byref_equals_array_descriptor() {
        let a = TypeReference::array(TypeReference::INT);
        let r = TypeReference::by_reference(TypeReference::INT);
        assert_eq!(a, r);
        assert_eq!(r.descriptor(), "[I");
        assert_ne!(a, TypeReference::array(TypeReference::LONG));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "X", "[V", "Ljava/lang/Object", "II", "L;", "[", "(I)V"] {
            assert!(parse_descriptor(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn method_signatures() {
        let (params, ret) = parse_method_signature("(I[JLjava/lang/String;)V").unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[1].descriptor(), "[J");
        assert!(ret.is_void());
        assert!(parse_method_signature("(V)V").is_err());
        assert!(parse_method_signature("()").is_err());
        assert!(parse_method_signature("()VI").is_err());
    }

    #[test]
    fn java_names() {
        let t = parse_descriptor("[[Ljava/lang/String;").unwrap();
        assert_eq!(t.java_name(), "java.lang.String[][]");
        assert_eq!(t.dimensions(), 2);
        assert_eq!(t.shorty_char(), 'L');
    }
}
