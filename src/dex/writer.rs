//! Serializes the classes of a dex container into a dex file.
//!
//! Writing happens in three steps: every referenced string, type, prototype,
//! field and method is collected into sorted pools; each class is turned into
//! a plan of data items (code, type lists, annotations, static values); the
//! data items are then placed and emitted in one pass over a single buffer.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use adler::adler32_slice;
use sha1::{Digest, Sha1};

use crate::class_def::ClassDefinition;
use crate::code::{MethodBody, Operand};
use crate::container::{ClassArena, ClassId, DexId};
use crate::dex::error::DexError;
use crate::dex::header::{
    DexString, Header, MapItem, ENDIAN_CONSTANT, HEADER_SIZE, NO_INDEX, TYPE_ANNOTATIONS_DIRECTORY_ITEM,
    TYPE_ANNOTATION_ITEM, TYPE_ANNOTATION_SET_ITEM, TYPE_ANNOTATION_SET_REF_LIST, TYPE_CLASS_DATA_ITEM,
    TYPE_CLASS_DEF_ITEM, TYPE_CODE_ITEM, TYPE_ENCODED_ARRAY_ITEM, TYPE_FIELD_ID_ITEM, TYPE_HEADER_ITEM,
    TYPE_MAP_LIST, TYPE_METHOD_ID_ITEM, TYPE_PROTO_ID_ITEM, TYPE_STRING_DATA_ITEM, TYPE_STRING_ID_ITEM,
    TYPE_TYPE_ID_ITEM, TYPE_TYPE_LIST,
};
use crate::dex::options::DexOptions;
use crate::dex::values::{write_annotation_item, write_array};
use crate::dex::{align, write_sleb128, write_u2, write_u4, write_uleb128, write_x, IndexResolver};
use crate::members::{Annotation, FieldReference, MethodReference, Prototype, Value};
use crate::types::TypeReference;

/// SHA-1 over everything after the signature field.
pub(crate) fn compute_signature(file: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(&file[32..]);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Adler-32 over everything after the checksum field.
pub(crate) fn compute_checksum(file: &[u8]) -> u32 {
    adler32_slice(&file[12..])
}

#[derive(Debug, Default)]
struct PoolCollector {
    strings: HashSet<String>,
    types: HashSet<String>,
    protos: HashSet<Prototype>,
    fields: HashSet<FieldReference>,
    methods: HashSet<MethodReference>,
}

impl PoolCollector {
    fn add_string(&mut self, value: &str) {
        if !self.strings.contains(value) {
            self.strings.insert(value.to_string());
        }
    }

    fn add_type(&mut self, ty: &TypeReference) {
        let descriptor = ty.descriptor();
        self.add_string(&descriptor);
        self.types.insert(descriptor);
    }

    fn add_proto(&mut self, proto: &Prototype) {
        if self.protos.contains(proto) {
            return;
        }
        self.add_string(&proto.shorty());
        self.add_type(proto.return_type());
        for ty in proto.parameter_types() {
            self.add_type(ty);
        }
        self.protos.insert(proto.clone());
    }

    fn add_field(&mut self, field: &FieldReference) {
        if self.fields.contains(field) {
            return;
        }
        self.add_type(&TypeReference::Class(field.owner.clone()));
        self.add_string(&field.name);
        self.add_type(&field.field_type);
        self.fields.insert(field.clone());
    }

    fn add_method(&mut self, method: &MethodReference) {
        if self.methods.contains(method) {
            return;
        }
        self.add_type(&method.owner);
        self.add_string(&method.name);
        self.add_proto(&method.prototype);
        self.methods.insert(method.clone());
    }

    fn add_value(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.add_string(s),
            Value::Type(ty) => self.add_type(ty),
            Value::Field(f) | Value::Enum(f) => self.add_field(f),
            Value::Method(m) => self.add_method(m),
            Value::Array(values) => {
                for v in values {
                    self.add_value(v);
                }
            }
            Value::Annotation(a) => self.add_annotation(a),
            _ => {}
        }
    }

    fn add_annotation(&mut self, annotation: &Annotation) {
        self.add_type(&TypeReference::Class(annotation.annotation_type.clone()));
        for arg in &annotation.arguments {
            self.add_string(&arg.name);
            self.add_value(&arg.value);
        }
    }

    fn add_body(&mut self, body: &MethodBody) {
        for insn in &body.instructions {
            match &insn.operand {
                Operand::String(s) => self.add_string(s),
                Operand::Type(ty) => self.add_type(ty),
                Operand::Field(f) => self.add_field(f),
                Operand::Method(m) => self.add_method(m),
                _ => {}
            }
        }
        for try_block in &body.tries {
            for handler in &try_block.handlers {
                self.add_type(&handler.exception);
            }
        }
    }

    fn add_class(&mut self, class: &ClassDefinition) {
        self.add_type(&class.type_reference());
        if let Some(super_class) = &class.super_class {
            self.add_type(&TypeReference::Class(super_class.clone()));
        }
        for iface in &class.interfaces {
            self.add_type(&TypeReference::Class(iface.clone()));
        }
        if let Some(source) = &class.source_file {
            self.add_string(source);
        }
        for a in &class.annotations {
            self.add_annotation(a);
        }
        for field in class.fields() {
            self.add_field(field.reference());
            for a in &field.annotations {
                self.add_annotation(a);
            }
            if let Some(value) = &field.value {
                self.add_value(value);
            }
        }
        for method in class.methods() {
            self.add_method(method.reference());
            for a in method.annotations.iter().chain(method.parameter_annotations.iter().flatten()) {
                self.add_annotation(a);
            }
            if let Some(body) = &method.body {
                self.add_body(body);
            }
        }
    }

    fn finish(self) -> Result<Pools, DexError> {
        let mut strings: Vec<String> = self.strings.into_iter().collect();
        strings.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
        let string_index = strings.iter().enumerate().map(|(i, s)| (s.clone(), i as u32)).collect();
        let mut pools = Pools { strings, string_index, ..Pools::default() };

        // Descriptors are pool strings, so string order is type order.
        let mut types: Vec<(u32, String)> = Vec::with_capacity(self.types.len());
        for descriptor in self.types {
            types.push((pools.string_idx(&descriptor)?, descriptor));
        }
        types.sort();
        if types.len() > 0x10000 {
            fail!("{} types exceed the 16-bit type index space", types.len());
        }
        for (i, (string_idx, descriptor)) in types.into_iter().enumerate() {
            pools.types.push(string_idx);
            pools.type_index.insert(descriptor, i as u32);
        }

        let mut protos = Vec::with_capacity(self.protos.len());
        for proto in self.protos {
            let mut parameters = Vec::with_capacity(proto.parameters().len());
            for ty in proto.parameter_types() {
                parameters.push(pools.type_index(ty)?);
            }
            let entry = ProtoEntry {
                shorty_idx: pools.string_idx(&proto.shorty())?,
                return_idx: pools.type_index(proto.return_type())?,
                parameters,
            };
            protos.push((entry, proto));
        }
        protos.sort_by(|a, b| (a.0.return_idx, &a.0.parameters).cmp(&(b.0.return_idx, &b.0.parameters)));
        if protos.len() > 0x10000 {
            fail!("{} prototypes exceed the 16-bit proto index space", protos.len());
        }
        for (i, (entry, proto)) in protos.into_iter().enumerate() {
            pools.protos.push(entry);
            pools.proto_index.insert(proto, i as u32);
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let key = (
                pools.type_index(&TypeReference::Class(field.owner.clone()))?,
                pools.string_idx(&field.name)?,
                pools.type_index(&field.field_type)?,
            );
            fields.push((key, field));
        }
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (i, (key, field)) in fields.into_iter().enumerate() {
            pools.fields.push(key);
            pools.field_index.insert(field, i as u32);
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for method in self.methods {
            let key = (
                pools.type_index(&method.owner)?,
                pools.string_idx(&method.name)?,
                pools.proto_index(&method.prototype)?,
            );
            methods.push((key, method));
        }
        methods.sort_by(|a, b| a.0.cmp(&b.0));
        for (i, (key, method)) in methods.into_iter().enumerate() {
            pools.methods.push(key);
            pools.method_index.insert(method, i as u32);
        }
        Ok(pools)
    }
}

#[derive(Debug)]
struct ProtoEntry {
    shorty_idx: u32,
    return_idx: u32,
    parameters: Vec<u32>,
}

/// Sorted id pools of one dex file.
#[derive(Debug, Default)]
struct Pools {
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    /// String index of each type descriptor.
    types: Vec<u32>,
    type_index: HashMap<String, u32>,
    protos: Vec<ProtoEntry>,
    proto_index: HashMap<Prototype, u32>,
    /// (class, name, type)
    fields: Vec<(u32, u32, u32)>,
    field_index: HashMap<FieldReference, u32>,
    /// (class, name, proto)
    methods: Vec<(u32, u32, u32)>,
    method_index: HashMap<MethodReference, u32>,
}

impl Pools {
    fn string_idx(&self, value: &str) -> Result<u32, DexError> {
        self.string_index
            .get(value)
            .copied()
            .ok_or_else(|| DexError::not_found(format!("string {:?} is not pooled", value)))
    }
}

impl IndexResolver for Pools {
    fn string_index(&self, value: &str) -> Result<u32, DexError> {
        self.string_idx(value)
    }

    fn type_index(&self, ty: &TypeReference) -> Result<u32, DexError> {
        self.type_index
            .get(&ty.descriptor())
            .copied()
            .ok_or_else(|| DexError::not_found(format!("type {} is not pooled", ty)))
    }

    fn proto_index(&self, proto: &Prototype) -> Result<u32, DexError> {
        self.proto_index
            .get(proto)
            .copied()
            .ok_or_else(|| DexError::not_found(format!("prototype {} is not pooled", proto)))
    }

    fn field_index(&self, field: &FieldReference) -> Result<u32, DexError> {
        self.field_index
            .get(field)
            .copied()
            .ok_or_else(|| DexError::not_found(format!("field {} is not pooled", field)))
    }

    fn method_index(&self, method: &MethodReference) -> Result<u32, DexError> {
        self.method_index
            .get(method)
            .copied()
            .ok_or_else(|| DexError::not_found(format!("method {} is not pooled", method)))
    }
}

/// Deduplicating list of data items.
#[derive(Debug, Default)]
struct Interner<T> {
    items: Vec<T>,
    index: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> Interner<T> {
    fn intern(&mut self, item: T) -> usize {
        if let Some(&i) = self.index.get(&item) {
            return i;
        }
        self.items.push(item.clone());
        self.index.insert(item, self.items.len() - 1);
        self.items.len() - 1
    }
}

#[derive(Debug)]
struct EncodedMember {
    idx: u32,
    access_flags: u32,
    code: Option<usize>,
}

#[derive(Debug, Default)]
struct DirectoryPlan {
    class_set: Option<usize>,
    fields: Vec<(u32, usize)>,
    methods: Vec<(u32, usize)>,
    parameters: Vec<(u32, usize)>,
}

impl DirectoryPlan {
    fn size(&self) -> usize {
        16 + 8 * (self.fields.len() + self.methods.len() + self.parameters.len())
    }
}

#[derive(Debug)]
struct ClassPlan {
    class_idx: u32,
    access_flags: u32,
    superclass_idx: u32,
    interfaces: Option<usize>,
    source_file_idx: u32,
    directory: Option<usize>,
    static_values: Option<usize>,
    static_fields: Vec<EncodedMember>,
    instance_fields: Vec<EncodedMember>,
    direct_methods: Vec<EncodedMember>,
    virtual_methods: Vec<EncodedMember>,
}

impl ClassPlan {
    fn has_data(&self) -> bool {
        !(self.static_fields.is_empty()
            && self.instance_fields.is_empty()
            && self.direct_methods.is_empty()
            && self.virtual_methods.is_empty())
    }

    fn encode_data(&self, code_offsets: &[u32]) -> Vec<u8> {
        let mut bytes = vec![];
        write_uleb128(&mut bytes, self.static_fields.len() as u32);
        write_uleb128(&mut bytes, self.instance_fields.len() as u32);
        write_uleb128(&mut bytes, self.direct_methods.len() as u32);
        write_uleb128(&mut bytes, self.virtual_methods.len() as u32);
        encode_members(&mut bytes, &self.static_fields, None);
        encode_members(&mut bytes, &self.instance_fields, None);
        encode_members(&mut bytes, &self.direct_methods, Some(code_offsets));
        encode_members(&mut bytes, &self.virtual_methods, Some(code_offsets));
        bytes
    }
}

/// Members must be sorted by index; indices are written as deltas.
fn encode_members(bytes: &mut Vec<u8>, members: &[EncodedMember], code_offsets: Option<&[u32]>) {
    let mut previous = 0;
    for member in members {
        write_uleb128(bytes, member.idx - previous);
        previous = member.idx;
        write_uleb128(bytes, member.access_flags);
        if let Some(offsets) = code_offsets {
            write_uleb128(bytes, member.code.map_or(0, |c| offsets[c]));
        }
    }
}

/// Data items of a file, before placement.
#[derive(Debug, Default)]
struct DataPlan {
    ref_lists: Interner<Vec<Option<usize>>>,
    sets: Interner<Vec<usize>>,
    code_items: Vec<Vec<u8>>,
    directories: Vec<DirectoryPlan>,
    type_lists: Interner<Vec<u16>>,
    annotations: Interner<Vec<u8>>,
    encoded_arrays: Interner<Vec<u8>>,
}

impl DataPlan {
    fn type_list(&mut self, types: impl IntoIterator<Item = TypeReference>, pools: &Pools) -> Result<Option<usize>, DexError> {
        let mut list = vec![];
        for ty in types {
            let idx = pools.type_index(&ty)?;
            list.push(u16::try_from(idx).map_err(|_| err!("type index {} does not fit a type list", idx))?);
        }
        if list.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.type_lists.intern(list)))
    }

    /// Annotation set with entries ordered by annotation type.
    fn annotation_set(&mut self, annotations: &[Annotation], pools: &Pools) -> Result<usize, DexError> {
        let mut entries = Vec::with_capacity(annotations.len());
        for a in annotations {
            let type_idx = pools.type_index(&TypeReference::Class(a.annotation_type.clone()))?;
            let mut bytes = vec![];
            write_annotation_item(&mut bytes, a, pools)?;
            entries.push((type_idx, self.annotations.intern(bytes)));
        }
        entries.sort_by_key(|e| e.0);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(DexError::structure(format!("annotation type {} appears twice in one set", w[0].0)));
        }
        Ok(self.sets.intern(entries.into_iter().map(|e| e.1).collect()))
    }

    fn code_item(&mut self, body: &MethodBody, pools: &Pools) -> Result<usize, DexError> {
        self.code_items.push(encode_code_item(body, pools)?);
        Ok(self.code_items.len() - 1)
    }

    fn add_class(&mut self, class: &ClassDefinition, pools: &Pools) -> Result<ClassPlan, DexError> {
        let superclass_idx = match &class.super_class {
            Some(s) => pools.type_index(&TypeReference::Class(s.clone()))?,
            None => NO_INDEX,
        };
        let interfaces = self.type_list(class.interfaces.iter().map(|i| TypeReference::Class(i.clone())), pools)?;
        let source_file_idx = match &class.source_file {
            Some(s) => pools.string_idx(s)?,
            None => NO_INDEX,
        };

        let mut directory = DirectoryPlan::default();
        if !class.annotations.is_empty() {
            directory.class_set = Some(self.annotation_set(&class.annotations, pools)?);
        }

        let mut static_fields = vec![];
        let mut instance_fields = vec![];
        for field in class.fields() {
            let idx = pools.field_index(field.reference())?;
            if !field.annotations.is_empty() {
                directory.fields.push((idx, self.annotation_set(&field.annotations, pools)?));
            }
            let member = EncodedMember { idx, access_flags: field.access_flags.bits(), code: None };
            if field.is_static() {
                static_fields.push((member, field));
            } else {
                instance_fields.push(member);
            }
        }
        static_fields.sort_by_key(|(m, _)| m.idx);
        instance_fields.sort_by_key(|m| m.idx);

        let mut values: Vec<Value> = static_fields
            .iter()
            .map(|(_, f)| f.value.clone().unwrap_or_else(|| Value::default_for(f.field_type())))
            .collect();
        let mut keep = values.len();
        while keep > 0 && values[keep - 1].is_default_for(static_fields[keep - 1].1.field_type()) {
            keep -= 1;
        }
        values.truncate(keep);
        let static_values = if values.is_empty() {
            None
        } else {
            let mut bytes = vec![];
            write_array(&mut bytes, &values, pools)?;
            Some(self.encoded_arrays.intern(bytes))
        };

        let mut direct_methods = vec![];
        let mut virtual_methods = vec![];
        for method in class.methods() {
            let idx = pools.method_index(method.reference())?;
            if !method.annotations.is_empty() {
                directory.methods.push((idx, self.annotation_set(&method.annotations, pools)?));
            }
            if method.parameter_annotations.iter().any(|p| !p.is_empty()) {
                let mut refs = Vec::with_capacity(method.parameter_annotations.len());
                for p in &method.parameter_annotations {
                    refs.push(if p.is_empty() { None } else { Some(self.annotation_set(p, pools)?) });
                }
                directory.parameters.push((idx, self.ref_lists.intern(refs)));
            }
            let code = match &method.body {
                Some(body) => Some(self.code_item(body, pools).map_err(|e| err!(e, "method {}", method.reference()))?),
                None => None,
            };
            let member = EncodedMember { idx, access_flags: method.access_flags().bits(), code };
            if method.is_virtual() {
                virtual_methods.push(member);
            } else {
                direct_methods.push(member);
            }
        }
        direct_methods.sort_by_key(|m| m.idx);
        virtual_methods.sort_by_key(|m| m.idx);

        directory.fields.sort_by_key(|e| e.0);
        directory.methods.sort_by_key(|e| e.0);
        directory.parameters.sort_by_key(|e| e.0);
        let directory = if directory.class_set.is_none()
            && directory.fields.is_empty()
            && directory.methods.is_empty()
            && directory.parameters.is_empty()
        {
            None
        } else {
            self.directories.push(directory);
            Some(self.directories.len() - 1)
        };

        Ok(ClassPlan {
            class_idx: pools.type_index(&class.type_reference())?,
            access_flags: class.access_flags.bits(),
            superclass_idx,
            interfaces,
            source_file_idx,
            directory,
            static_values,
            static_fields: static_fields.into_iter().map(|(m, _)| m).collect(),
            instance_fields,
            direct_methods,
            virtual_methods,
        })
    }
}

fn encode_code_item(body: &MethodBody, pools: &Pools) -> Result<Vec<u8>, DexError> {
    let units = body.encode(pools)?;
    let tries_size = u16::try_from(body.tries.len()).map_err(|_| err!("{} try blocks", body.tries.len()))?;

    let mut bytes = vec![];
    write_u2(&mut bytes, body.registers_size);
    write_u2(&mut bytes, body.ins_size);
    write_u2(&mut bytes, body.outs_size);
    write_u2(&mut bytes, tries_size);
    write_u4(&mut bytes, 0);
    write_u4(&mut bytes, units.len() as u32);
    for unit in &units {
        write_u2(&mut bytes, *unit);
    }
    if body.tries.is_empty() {
        return Ok(bytes);
    }
    if units.len() % 2 == 1 {
        write_u2(&mut bytes, 0);
    }

    let mut handlers = vec![];
    write_uleb128(&mut handlers, body.tries.len() as u32);
    let mut handler_offsets = Vec::with_capacity(body.tries.len());
    for try_block in &body.tries {
        handler_offsets.push(handlers.len());
        let count = try_block.handlers.len() as i32;
        write_sleb128(&mut handlers, if try_block.catch_all.is_some() { -count } else { count });
        for handler in &try_block.handlers {
            write_uleb128(&mut handlers, pools.type_index(&handler.exception)?);
            write_uleb128(&mut handlers, handler.address);
        }
        if let Some(address) = try_block.catch_all {
            write_uleb128(&mut handlers, address);
        }
    }

    for (try_block, offset) in body.tries.iter().zip(handler_offsets) {
        let offset = u16::try_from(offset).map_err(|_| err!("handler offset {} does not fit", offset))?;
        write_u4(&mut bytes, try_block.start_address);
        write_u2(&mut bytes, try_block.instruction_count);
        write_u2(&mut bytes, offset);
    }
    write_x(&mut bytes, &handlers);
    Ok(bytes)
}

/// Classes ordered so that each comes after its superclass and interfaces
/// when those are defined in the same file.
fn supertypes_first(arena: &ClassArena, ids: &[ClassId]) -> Vec<ClassId> {
    let by_name: HashMap<String, ClassId> = ids.iter().map(|id| (arena[*id].fullname(), *id)).collect();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(ids.len());
    for id in ids {
        visit(arena, &by_name, *id, &mut visited, &mut order);
    }
    order
}

fn visit(
    arena: &ClassArena,
    by_name: &HashMap<String, ClassId>,
    id: ClassId,
    visited: &mut HashSet<ClassId>,
    order: &mut Vec<ClassId>,
) {
    if !visited.insert(id) {
        return;
    }
    let class = &arena[id];
    for parent in class.super_class.iter().chain(class.interfaces.iter()) {
        if let Some(&p) = by_name.get(&parent.fullname()) {
            visit(arena, by_name, p, visited, order);
        }
    }
    order.push(id);
}

fn place(cursor: &mut u32, alignment: u32, size: usize) -> u32 {
    *cursor = cursor.div_ceil(alignment) * alignment;
    let offset = *cursor;
    *cursor += size as u32;
    offset
}

/// Pads to `alignment`, checks the planned offset and counts the item in the map.
fn begin_item(file: &mut Vec<u8>, map: &mut Vec<MapItem>, type_code: u16, alignment: usize, planned: u32) -> Result<(), DexError> {
    align(file, alignment);
    let offset = file.len() as u32;
    if offset != planned {
        fail!("item of type {:#06x} planned at {:#x} lands at {:#x}", type_code, planned, offset);
    }
    match map.last_mut() {
        Some(item) if item.type_code == type_code => item.size += 1,
        _ => map.push(MapItem::new(type_code, 1, offset)),
    }
    Ok(())
}

fn id_section(map: &mut Vec<MapItem>, type_code: u16, count: usize, offset: u32) -> u32 {
    if count == 0 {
        return 0;
    }
    map.push(MapItem::new(type_code, count as u32, offset));
    offset
}

pub struct DexWriter;

impl DexWriter {
    /// Serializes `dex` with default options.
    pub fn write(arena: &ClassArena, dex: DexId) -> Result<Vec<u8>, DexError> {
        DexWriter::write_with_options(arena, dex, &DexOptions::default())
    }

    pub fn write_with_options(arena: &ClassArena, dex: DexId, options: &DexOptions) -> Result<Vec<u8>, DexError> {
        if arena.dex(dex).is_none() {
            return Err(DexError::not_found(format!("dex {} does not exist", dex.index())));
        }
        let ids = supertypes_first(arena, &arena.flatten(dex));

        let mut collector = PoolCollector::default();
        for id in &ids {
            collector.add_class(&arena[*id]);
        }
        let pools = collector.finish()?;

        let mut plan = DataPlan::default();
        let mut classes = Vec::with_capacity(ids.len());
        for id in &ids {
            let class = &arena[*id];
            classes.push(plan.add_class(class, &pools).map_err(|e| err!(e, "class {}", class.fullname()))?);
        }
        let mut proto_parameters = Vec::with_capacity(pools.protos.len());
        for proto in &pools.protos {
            let list: Vec<u16> = proto.parameters.iter().map(|p| *p as u16).collect();
            proto_parameters.push(if list.is_empty() { None } else { Some(plan.type_lists.intern(list)) });
        }
        let string_data: Vec<Vec<u8>> = pools
            .strings
            .iter()
            .map(|s| {
                let mut bytes = vec![];
                DexString::from_string(s).write(&mut bytes);
                bytes
            })
            .collect();

        // Placement
        let string_ids_off = HEADER_SIZE;
        let type_ids_off = string_ids_off + 4 * pools.strings.len() as u32;
        let proto_ids_off = type_ids_off + 4 * pools.types.len() as u32;
        let field_ids_off = proto_ids_off + 12 * pools.protos.len() as u32;
        let method_ids_off = field_ids_off + 8 * pools.fields.len() as u32;
        let class_defs_off = method_ids_off + 8 * pools.methods.len() as u32;
        let data_off = class_defs_off + 32 * classes.len() as u32;

        let mut cursor = data_off;
        let ref_list_offs: Vec<u32> =
            plan.ref_lists.items.iter().map(|r| place(&mut cursor, 4, 4 + 4 * r.len())).collect();
        let set_offs: Vec<u32> = plan.sets.items.iter().map(|s| place(&mut cursor, 4, 4 + 4 * s.len())).collect();
        let code_offs: Vec<u32> = plan.code_items.iter().map(|c| place(&mut cursor, 4, c.len())).collect();
        let directory_offs: Vec<u32> = plan.directories.iter().map(|d| place(&mut cursor, 4, d.size())).collect();
        let type_list_offs: Vec<u32> =
            plan.type_lists.items.iter().map(|l| place(&mut cursor, 4, 4 + 2 * l.len())).collect();
        let string_offs: Vec<u32> = string_data.iter().map(|s| place(&mut cursor, 1, s.len())).collect();
        let annotation_offs: Vec<u32> = plan.annotations.items.iter().map(|a| place(&mut cursor, 1, a.len())).collect();
        let array_offs: Vec<u32> = plan.encoded_arrays.items.iter().map(|a| place(&mut cursor, 1, a.len())).collect();
        let class_data: Vec<Option<Vec<u8>>> =
            classes.iter().map(|c| c.has_data().then(|| c.encode_data(&code_offs))).collect();
        let class_data_offs: Vec<Option<u32>> =
            class_data.iter().map(|d| d.as_ref().map(|d| place(&mut cursor, 1, d.len()))).collect();
        let map_off = place(&mut cursor, 4, 0);

        // Emission
        let mut map = vec![MapItem::new(TYPE_HEADER_ITEM, 1, 0)];
        let mut header = Header {
            magic: options.version.magic(),
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            map_off,
            string_ids_size: pools.strings.len() as u32,
            string_ids_off: id_section(&mut map, TYPE_STRING_ID_ITEM, pools.strings.len(), string_ids_off),
            type_ids_size: pools.types.len() as u32,
            type_ids_off: id_section(&mut map, TYPE_TYPE_ID_ITEM, pools.types.len(), type_ids_off),
            proto_ids_size: pools.protos.len() as u32,
            proto_ids_off: id_section(&mut map, TYPE_PROTO_ID_ITEM, pools.protos.len(), proto_ids_off),
            field_ids_size: pools.fields.len() as u32,
            field_ids_off: id_section(&mut map, TYPE_FIELD_ID_ITEM, pools.fields.len(), field_ids_off),
            method_ids_size: pools.methods.len() as u32,
            method_ids_off: id_section(&mut map, TYPE_METHOD_ID_ITEM, pools.methods.len(), method_ids_off),
            class_defs_size: classes.len() as u32,
            class_defs_off: id_section(&mut map, TYPE_CLASS_DEF_ITEM, classes.len(), class_defs_off),
            data_off,
            ..Header::default()
        };

        let mut file = vec![0u8; HEADER_SIZE as usize];
        for offset in &string_offs {
            write_u4(&mut file, *offset);
        }
        for string_idx in &pools.types {
            write_u4(&mut file, *string_idx);
        }
        for (proto, parameters) in pools.protos.iter().zip(&proto_parameters) {
            write_u4(&mut file, proto.shorty_idx);
            write_u4(&mut file, proto.return_idx);
            write_u4(&mut file, parameters.map_or(0, |l| type_list_offs[l]));
        }
        for (class_idx, name_idx, type_idx) in &pools.fields {
            write_u2(&mut file, *class_idx as u16);
            write_u2(&mut file, *type_idx as u16);
            write_u4(&mut file, *name_idx);
        }
        for (class_idx, name_idx, proto_idx) in &pools.methods {
            write_u2(&mut file, *class_idx as u16);
            write_u2(&mut file, *proto_idx as u16);
            write_u4(&mut file, *name_idx);
        }
        for (class, data_off) in classes.iter().zip(&class_data_offs) {
            write_u4(&mut file, class.class_idx);
            write_u4(&mut file, class.access_flags);
            write_u4(&mut file, class.superclass_idx);
            write_u4(&mut file, class.interfaces.map_or(0, |l| type_list_offs[l]));
            write_u4(&mut file, class.source_file_idx);
            write_u4(&mut file, class.directory.map_or(0, |d| directory_offs[d]));
            write_u4(&mut file, data_off.unwrap_or(0));
            write_u4(&mut file, class.static_values.map_or(0, |a| array_offs[a]));
        }

        for (refs, planned) in plan.ref_lists.items.iter().zip(&ref_list_offs) {
            begin_item(&mut file, &mut map, TYPE_ANNOTATION_SET_REF_LIST, 4, *planned)?;
            write_u4(&mut file, refs.len() as u32);
            for set in refs {
                write_u4(&mut file, set.map_or(0, |s| set_offs[s]));
            }
        }
        for (set, planned) in plan.sets.items.iter().zip(&set_offs) {
            begin_item(&mut file, &mut map, TYPE_ANNOTATION_SET_ITEM, 4, *planned)?;
            write_u4(&mut file, set.len() as u32);
            for a in set {
                write_u4(&mut file, annotation_offs[*a]);
            }
        }
        for (code, planned) in plan.code_items.iter().zip(&code_offs) {
            begin_item(&mut file, &mut map, TYPE_CODE_ITEM, 4, *planned)?;
            write_x(&mut file, code);
        }
        for (directory, planned) in plan.directories.iter().zip(&directory_offs) {
            begin_item(&mut file, &mut map, TYPE_ANNOTATIONS_DIRECTORY_ITEM, 4, *planned)?;
            write_u4(&mut file, directory.class_set.map_or(0, |s| set_offs[s]));
            write_u4(&mut file, directory.fields.len() as u32);
            write_u4(&mut file, directory.methods.len() as u32);
            write_u4(&mut file, directory.parameters.len() as u32);
            for (idx, set) in directory.fields.iter().chain(&directory.methods) {
                write_u4(&mut file, *idx);
                write_u4(&mut file, set_offs[*set]);
            }
            for (idx, refs) in &directory.parameters {
                write_u4(&mut file, *idx);
                write_u4(&mut file, ref_list_offs[*refs]);
            }
        }
        for (list, planned) in plan.type_lists.items.iter().zip(&type_list_offs) {
            begin_item(&mut file, &mut map, TYPE_TYPE_LIST, 4, *planned)?;
            write_u4(&mut file, list.len() as u32);
            for ty in list {
                write_u2(&mut file, *ty);
            }
        }
        for (data, planned) in string_data.iter().zip(&string_offs) {
            begin_item(&mut file, &mut map, TYPE_STRING_DATA_ITEM, 1, *planned)?;
            write_x(&mut file, data);
        }
        for (annotation, planned) in plan.annotations.items.iter().zip(&annotation_offs) {
            begin_item(&mut file, &mut map, TYPE_ANNOTATION_ITEM, 1, *planned)?;
            write_x(&mut file, annotation);
        }
        for (array, planned) in plan.encoded_arrays.items.iter().zip(&array_offs) {
            begin_item(&mut file, &mut map, TYPE_ENCODED_ARRAY_ITEM, 1, *planned)?;
            write_x(&mut file, array);
        }
        for (data, planned) in class_data.iter().zip(&class_data_offs) {
            if let (Some(data), Some(planned)) = (data, planned) {
                begin_item(&mut file, &mut map, TYPE_CLASS_DATA_ITEM, 1, *planned)?;
                write_x(&mut file, data);
            }
        }
        begin_item(&mut file, &mut map, TYPE_MAP_LIST, 4, map_off)?;
        MapItem::write_list(&map, &mut file);

        header.file_size = file.len() as u32;
        header.data_size = file.len() as u32 - data_off;
        let mut header_bytes = Vec::with_capacity(HEADER_SIZE as usize);
        header.write(&mut header_bytes);
        file[..HEADER_SIZE as usize].copy_from_slice(&header_bytes);

        let signature = compute_signature(&file);
        file[12..32].copy_from_slice(&signature);
        let checksum = compute_checksum(&file);
        file[8..12].copy_from_slice(&checksum.to_le_bytes());

        log::debug!(
            "wrote dex: {} strings, {} types, {} protos, {} fields, {} methods, {} classes, {} code items, {} bytes",
            pools.strings.len(),
            pools.types.len(),
            pools.protos.len(),
            pools.fields.len(),
            pools.methods.len(),
            classes.len(),
            plan.code_items.len(),
            file.len()
        );
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CatchHandler, Instruction, TryBlock};
    use crate::members::AccessFlags;
    use crate::opcodes::RCode;

    fn sample() -> (ClassArena, DexId) {
        let mut arena = ClassArena::new();
        let dex = arena.create_dex();

        let mut base = ClassDefinition::new("a.Base").with_super("java.lang.Object");
        base.access_flags = AccessFlags::PUBLIC;
        let mut derived = ClassDefinition::new("a.Derived").with_super("a.Base");
        let mut field = derived.new_field("NAME", TypeReference::string(), AccessFlags::STATIC | AccessFlags::FINAL);
        field.value = Some(Value::String("derived".to_string()));
        derived.add_field(field).unwrap();
        let mut run = derived
            .new_method("run", Prototype::parse("(I)I").unwrap(), AccessFlags::PUBLIC)
            .unwrap();
        run.set_virtual(true).unwrap();
        let mut body = MethodBody::new(2, 2, 0);
        body.push(Instruction::simple(RCode::Return, &[1]));
        body.push(Instruction::simple(RCode::Return, &[1]));
        body.tries.push(TryBlock {
            start_address: 0,
            instruction_count: 1,
            handlers: vec![CatchHandler { exception: TypeReference::class("java.lang.Exception"), address: 1 }],
            catch_all: None,
        });
        run.body = Some(body);
        derived.add_method(run).unwrap();

        // Added in reverse so the writer has to reorder.
        let derived = arena.alloc(derived);
        let base = arena.alloc(base);
        arena.add_class(dex, derived).unwrap();
        arena.add_class(dex, base).unwrap();
        (arena, dex)
    }

    #[test]
    fn header_and_hashes() {
        let (arena, dex) = sample();
        let file = DexWriter::write(&arena, dex).unwrap();
        let header = Header::read(&file, &mut 0).unwrap();
        assert_eq!(header.file_size as usize, file.len());
        assert_eq!(header.checksum, compute_checksum(&file));
        assert_eq!(header.signature, compute_signature(&file));
        assert_eq!(header.class_defs_size, 2);
        assert_eq!(header.data_off + header.data_size, header.file_size);
        assert_eq!(header.map_off % 4, 0);
    }

    #[test]
    fn supertype_is_written_first() {
        let (arena, dex) = sample();
        let order: Vec<String> = supertypes_first(&arena, &arena.flatten(dex))
            .into_iter()
            .map(|id| arena[id].fullname())
            .collect();
        assert_eq!(order, vec!["a.Base", "a.Derived"]);
    }

    #[test]
    fn strings_sort_by_utf16_units() {
        let mut collector = PoolCollector::default();
        for s in ["b", "\u{10000}", "\u{ffff}", "a", ""] {
            collector.add_string(s);
        }
        let pools = collector.finish().unwrap();
        // U+10000 is a surrogate pair starting 0xd800 and sorts before U+FFFF.
        assert_eq!(pools.strings, vec!["", "a", "b", "\u{10000}", "\u{ffff}"]);
    }

    #[test]
    fn version_lands_in_magic() {
        let (arena, dex) = sample();
        let options = DexOptions::default().with_version(crate::dex::DexVersion::V038);
        let file = DexWriter::write_with_options(&arena, dex, &options).unwrap();
        assert_eq!(&file[..8], b"dex\n038\0");
    }

    #[test]
    fn missing_dex_is_not_found() {
        let mut arena = ClassArena::new();
        let dex = arena.create_dex();
        arena.remove_dex(dex);
        assert!(DexWriter::write(&arena, dex).is_err());
    }
}
