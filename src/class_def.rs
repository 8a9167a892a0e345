use crate::container::ClassId;
use crate::dex::error::DexError;
use crate::members::{AccessFlags, Annotation, FieldDefinition, MethodDefinition, Prototype};
use crate::types::{join_fullname, split_fullname, ClassReference, TypeReference};

/// A class being built or read: the name plus its mutable structure.
///
/// Classes live in a [`ClassArena`](crate::container::ClassArena); inner
/// classes and the owner are arena ids. Renaming goes through the arena so
/// every dex holding the class sees the new name.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    namespace: String,
    name: String,
    pub access_flags: AccessFlags,
    pub super_class: Option<ClassReference>,
    pub interfaces: Vec<ClassReference>,
    fields: Vec<FieldDefinition>,
    methods: Vec<MethodDefinition>,
    pub annotations: Vec<Annotation>,
    pub source_file: Option<String>,
    pub(crate) inner_classes: Vec<ClassId>,
    pub(crate) owner: Option<ClassId>,
}

impl ClassDefinition {
    pub fn new(fullname: &str) -> Self {
        let (namespace, name) = split_fullname(fullname);
        ClassDefinition {
            namespace,
            name,
            access_flags: AccessFlags::empty(),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            annotations: vec![],
            source_file: None,
            inner_classes: vec![],
            owner: None,
        }
    }

    pub fn with_super(mut self, super_class: &str) -> Self {
        self.super_class = Some(ClassReference::new(super_class));
        self
    }

    pub fn with_flags(mut self, access_flags: AccessFlags) -> Self {
        self.access_flags = access_flags;
        self
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
        self.reference().descriptor()
    }

    /// Frozen reference carrying the current name.
    pub fn reference(&self) -> ClassReference {
        ClassReference::new(&self.fullname())
    }

    pub fn type_reference(&self) -> TypeReference {
        TypeReference::Class(self.reference())
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }

    pub fn inner_classes(&self) -> &[ClassId] {
        &self.inner_classes
    }

    pub fn owner(&self) -> Option<ClassId> {
        self.owner
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [FieldDefinition] {
        &mut self.fields
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut [MethodDefinition] {
        &mut self.methods
    }

    /// Field definition owned by this class.
    pub fn new_field(&self, name: &str, field_type: TypeReference, access_flags: AccessFlags) -> FieldDefinition {
        FieldDefinition::new(self.reference(), name, field_type, access_flags)
    }

    /// Method definition owned by this class, flags validated.
    pub fn new_method(&self, name: &str, prototype: Prototype, access_flags: AccessFlags) -> Result<MethodDefinition, DexError> {
        MethodDefinition::new(self.reference(), name, prototype).with_flags(access_flags)
    }

    pub fn add_field(&mut self, field: FieldDefinition) -> Result<(), DexError> {
        if *field.owner() != self.reference() {
            return Err(DexError::structure(format!(
                "field {} does not belong to {}",
                field.reference(),
                self.fullname()
            )));
        }
        if self.get_field(field.name()).is_some() {
            return Err(DexError::structure(format!("duplicate field {}", field.reference())));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn add_method(&mut self, method: MethodDefinition) -> Result<(), DexError> {
        if method.reference().owner != self.type_reference() {
            return Err(DexError::structure(format!(
                "method {} does not belong to {}",
                method.reference(),
                self.fullname()
            )));
        }
        let signature = method.prototype().signature();
        if self.get_method_with_signature(method.name(), &signature).is_some() {
            return Err(DexError::structure(format!("duplicate method {}", method.reference())));
        }
        self.methods.push(method);
        Ok(())
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// First method with the given name.
    pub fn get_method(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| m.name() == name)
    }

    pub fn get_method_with_signature(&self, name: &str, signature: &str) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| m.name() == name && m.prototype().signature() == signature)
    }

    pub fn direct_methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.iter().filter(|m| !m.is_virtual())
    }

    pub fn virtual_methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.iter().filter(|m| m.is_virtual())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_static())
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    /// Changes the name and re-points owned members; containers are not notified.
    pub(crate) fn set_fullname_unchecked(&mut self, fullname: &str) {
        let (namespace, name) = split_fullname(fullname);
        self.namespace = namespace;
        self.name = name;
        let reference = self.reference();
        for field in &mut self.fields {
            field.set_owner(reference.clone());
        }
        for method in &mut self.methods {
            method.set_owner(reference.clone());
        }
    }
}
