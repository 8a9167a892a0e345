//! Parses a dex file back into classes held by a [`ClassArena`].

use std::collections::HashSet;

use crate::class_def::ClassDefinition;
use crate::code::{decode_instructions, CatchHandler, MethodBody, TryBlock};
use crate::container::{ClassArena, ClassId, DexId};
use crate::dex::error::DexError;
use crate::dex::header::{
    DexString, Header, MapItem, NO_INDEX, TYPE_ANNOTATIONS_DIRECTORY_ITEM, TYPE_ANNOTATION_ITEM,
    TYPE_ANNOTATION_SET_ITEM, TYPE_ANNOTATION_SET_REF_LIST, TYPE_CLASS_DATA_ITEM, TYPE_CLASS_DEF_ITEM,
    TYPE_CODE_ITEM, TYPE_DEBUG_INFO_ITEM, TYPE_ENCODED_ARRAY_ITEM, TYPE_FIELD_ID_ITEM, TYPE_HEADER_ITEM,
    TYPE_MAP_LIST, TYPE_METHOD_ID_ITEM, TYPE_PROTO_ID_ITEM, TYPE_STRING_DATA_ITEM, TYPE_STRING_ID_ITEM,
    TYPE_TYPE_ID_ITEM, TYPE_TYPE_LIST,
};
use crate::dex::options::DexOptions;
use crate::dex::values::{read_annotation_item, read_array};
use crate::dex::writer::{compute_checksum, compute_signature};
use crate::dex::{read_sleb128, read_u2, read_u4, read_uleb128, ReferenceTable};
use crate::lookup::hierarchicalize;
use crate::members::{AccessFlags, Annotation, FieldDefinition, FieldReference, MethodDefinition, MethodReference, Parameter, Prototype};
use crate::types::{parse_descriptor, ClassReference, TypeReference};

const KNOWN_MAP_ITEMS: [u16; 18] = [
    TYPE_HEADER_ITEM,
    TYPE_STRING_ID_ITEM,
    TYPE_TYPE_ID_ITEM,
    TYPE_PROTO_ID_ITEM,
    TYPE_FIELD_ID_ITEM,
    TYPE_METHOD_ID_ITEM,
    TYPE_CLASS_DEF_ITEM,
    TYPE_MAP_LIST,
    TYPE_TYPE_LIST,
    TYPE_ANNOTATION_SET_REF_LIST,
    TYPE_ANNOTATION_SET_ITEM,
    TYPE_CLASS_DATA_ITEM,
    TYPE_CODE_ITEM,
    TYPE_STRING_DATA_ITEM,
    TYPE_DEBUG_INFO_ITEM,
    TYPE_ANNOTATION_ITEM,
    TYPE_ENCODED_ARRAY_ITEM,
    TYPE_ANNOTATIONS_DIRECTORY_ITEM,
];

/// Id pools of the file being read.
#[derive(Debug, Default)]
struct Pools {
    strings: Vec<String>,
    types: Vec<TypeReference>,
    protos: Vec<Prototype>,
    fields: Vec<FieldReference>,
    methods: Vec<MethodReference>,
}

fn pooled<T: Clone>(pool: &[T], idx: u32, what: &str) -> Result<T, DexError> {
    match pool.get(idx as usize) {
        Some(v) => Ok(v.clone()),
        None => fail!("{} index {} out of range ({} entries)", what, idx, pool.len()),
    }
}

impl ReferenceTable for Pools {
    fn string(&self, idx: u32) -> Result<String, DexError> {
        pooled(&self.strings, idx, "string")
    }

    fn type_ref(&self, idx: u32) -> Result<TypeReference, DexError> {
        pooled(&self.types, idx, "type")
    }

    fn field(&self, idx: u32) -> Result<FieldReference, DexError> {
        pooled(&self.fields, idx, "field")
    }

    fn method(&self, idx: u32) -> Result<MethodReference, DexError> {
        pooled(&self.methods, idx, "method")
    }
}

/// Position of `offset`, which must lie inside the file.
fn at(bytes: &[u8], offset: u32, what: &str) -> Result<usize, DexError> {
    if offset as usize >= bytes.len() {
        fail!("{} offset {:#x} is beyond the end of the file", what, offset);
    }
    Ok(offset as usize)
}

fn class_ref(pools: &Pools, idx: u32) -> Result<ClassReference, DexError> {
    match pools.type_ref(idx)? {
        TypeReference::Class(c) => Ok(c),
        other => fail!("type {} is not a class", other),
    }
}

fn read_type_list(bytes: &[u8], pools: &Pools, offset: u32) -> Result<Vec<TypeReference>, DexError> {
    if offset == 0 {
        return Ok(vec![]);
    }
    let mut ix = at(bytes, offset, "type list")?;
    let size = read_u4(bytes, &mut ix)?;
    if size as usize > bytes.len() / 2 {
        fail!("type list size {} is out of bounds", size);
    }
    let mut types = Vec::with_capacity(size as usize);
    for _ in 0..size {
        types.push(pools.type_ref(read_u2(bytes, &mut ix)? as u32)?);
    }
    Ok(types)
}

fn read_pools(bytes: &[u8], h: &Header) -> Result<Pools, DexError> {
    let mut pools = Pools::default();

    let mut ix = h.string_ids_off as usize;
    for i in 0..h.string_ids_size {
        let mut data = at(bytes, read_u4(bytes, &mut ix)?, "string data")?;
        let value = match DexString::read(bytes, &mut data).map_err(|e| err!(e, "string {}", i))? {
            DexString::Decoded(s) => s,
            DexString::Raw(_, raw) => {
                log::warn!("string {} is not valid modified UTF-8", i);
                String::from_utf8_lossy(&raw).into_owned()
            }
        };
        pools.strings.push(value);
    }

    let mut ix = h.type_ids_off as usize;
    for i in 0..h.type_ids_size {
        let descriptor = pools.string(read_u4(bytes, &mut ix)?)?;
        let ty = parse_descriptor(&descriptor).map_err(|e| err!(e, "type {}", i))?;
        pools.types.push(ty);
    }

    let mut ix = h.proto_ids_off as usize;
    for i in 0..h.proto_ids_size {
        let _shorty = read_u4(bytes, &mut ix)?;
        let return_type = pools.type_ref(read_u4(bytes, &mut ix)?)?;
        let parameters = read_type_list(bytes, &pools, read_u4(bytes, &mut ix)?).map_err(|e| err!(e, "proto {}", i))?;
        pools.protos.push(Prototype::new(return_type, parameters.into_iter().map(Parameter::unnamed).collect()));
    }

    let mut ix = h.field_ids_off as usize;
    for i in 0..h.field_ids_size {
        let owner = class_ref(&pools, read_u2(bytes, &mut ix)? as u32).map_err(|e| err!(e, "field {}", i))?;
        let field_type = pools.type_ref(read_u2(bytes, &mut ix)? as u32)?;
        let name = pools.string(read_u4(bytes, &mut ix)?)?;
        pools.fields.push(FieldReference::new(owner, &name, field_type));
    }

    let mut ix = h.method_ids_off as usize;
    for _ in 0..h.method_ids_size {
        let owner = pools.type_ref(read_u2(bytes, &mut ix)? as u32)?;
        let prototype = pooled(&pools.protos, read_u2(bytes, &mut ix)? as u32, "proto")?;
        let name = pools.string(read_u4(bytes, &mut ix)?)?;
        pools.methods.push(MethodReference::new(owner, &name, prototype));
    }
    Ok(pools)
}

pub struct DexReader<'a> {
    bytes: &'a [u8],
    header: Header,
    pools: Pools,
}

impl<'a> DexReader<'a> {
    /// Reads `bytes` with default options; the classes land in a new dex of `arena`.
    pub fn read(bytes: &[u8], arena: &mut ClassArena) -> Result<DexId, DexError> {
        DexReader::read_with_options(bytes, arena, &DexOptions::default())
    }

    pub fn read_with_options(bytes: &[u8], arena: &mut ClassArena, options: &DexOptions) -> Result<DexId, DexError> {
        let header = Header::read(bytes, &mut 0)?;
        let bytes = &bytes[..header.file_size as usize];

        if options.verify_checksum {
            let actual = compute_checksum(bytes);
            if actual != header.checksum {
                fail!("Checksum mismatch: header says {:#010x}, data gives {:#010x}", header.checksum, actual);
            }
        }
        if options.verify_signature && compute_signature(bytes) != header.signature {
            fail!("SHA-1 signature mismatch");
        }

        let pools = read_pools(bytes, &header)?;
        let reader = DexReader { bytes, header, pools };
        reader.check_map()?;

        let classes = reader.read_classes()?;
        let mut seen = HashSet::new();
        for class in &classes {
            let name = class.fullname();
            if !seen.insert(name.clone()) {
                fail!("class {} is defined more than once", name);
            }
        }
        let ids: Vec<ClassId> = classes.into_iter().map(|c| arena.alloc(c)).collect();
        let hierarchy = hierarchicalize(arena, &ids);
        let dex = arena.create_dex();
        for id in hierarchy.top_level {
            arena.add_class(dex, id)?;
        }
        log::debug!(
            "read dex: {} classes, {} strings, {} methods, {} unresolved inner classes",
            ids.len(),
            reader.pools.strings.len(),
            reader.pools.methods.len(),
            hierarchy.diagnostics.len()
        );
        Ok(dex)
    }

    fn at(&self, offset: u32, what: &str) -> Result<usize, DexError> {
        at(self.bytes, offset, what)
    }

    fn check_map(&self) -> Result<(), DexError> {
        let mut ix = self.at(self.header.map_off, "map list")?;
        if ix % 4 != 0 {
            log::warn!("map list at {:#x} is not 4-byte aligned", ix);
        }
        let items = MapItem::read_list(self.bytes, &mut ix)?;
        for item in &items {
            if !KNOWN_MAP_ITEMS.contains(&item.type_code) {
                log::warn!("ignoring unknown map item {:#06x} ({} entries at {:#x})", item.type_code, item.size, item.offset);
            } else if item.size > 0 && item.offset as usize >= self.bytes.len() {
                fail!("map item {:#06x} at {:#x} is beyond the end of the file", item.type_code, item.offset);
            }
        }
        if items.first().map(|i| i.type_code) != Some(TYPE_HEADER_ITEM) {
            log::warn!("map list does not start with the header item");
        }
        Ok(())
    }

    fn class_ref(&self, idx: u32) -> Result<ClassReference, DexError> {
        class_ref(&self.pools, idx)
    }

    fn read_type_list(&self, offset: u32) -> Result<Vec<TypeReference>, DexError> {
        read_type_list(self.bytes, &self.pools, offset)
    }

    fn read_classes(&self) -> Result<Vec<ClassDefinition>, DexError> {
        let mut classes = Vec::with_capacity(self.header.class_defs_size as usize);
        let mut ix = self.header.class_defs_off as usize;
        for i in 0..self.header.class_defs_size {
            let class = self.read_class(&mut ix).map_err(|e| err!(e, "class_def {}", i))?;
            classes.push(class);
        }
        Ok(classes)
    }

    fn read_class(&self, ix: &mut usize) -> Result<ClassDefinition, DexError> {
        let bytes = self.bytes;
        let class_ref = self.class_ref(read_u4(bytes, ix)?)?;
        let access_flags = AccessFlags::from_bits_retain(read_u4(bytes, ix)?);
        let superclass_idx = read_u4(bytes, ix)?;
        let interfaces_off = read_u4(bytes, ix)?;
        let source_file_idx = read_u4(bytes, ix)?;
        let annotations_off = read_u4(bytes, ix)?;
        let class_data_off = read_u4(bytes, ix)?;
        let static_values_off = read_u4(bytes, ix)?;

        let mut class = ClassDefinition::new(&class_ref.fullname()).with_flags(access_flags);
        if superclass_idx != NO_INDEX {
            class.super_class = Some(self.class_ref(superclass_idx)?);
        }
        for iface in self.read_type_list(interfaces_off)? {
            match iface {
                TypeReference::Class(c) => class.interfaces.push(c),
                other => fail!("interface {} is not a class", other),
            }
        }
        if source_file_idx != NO_INDEX {
            class.source_file = Some(self.pools.string(source_file_idx)?);
        }

        let (mut fields, mut methods) = if class_data_off == 0 {
            (vec![], vec![])
        } else {
            self.read_class_data(&class, class_data_off).map_err(|e| err!(e, "class data of {}", class_ref.fullname()))?
        };

        if static_values_off != 0 {
            let mut vix = self.at(static_values_off, "static values")?;
            let values = read_array(bytes, &mut vix, &self.pools)?;
            let mut statics = fields.iter_mut().filter(|(_, f)| f.is_static());
            for value in values {
                match statics.next() {
                    Some((_, field)) => field.value = Some(value),
                    None => fail!("more static values than static fields"),
                }
            }
        }

        if annotations_off != 0 {
            self.read_annotations_directory(annotations_off, &mut class, &mut fields, &mut methods)?;
        }

        for (_, field) in fields {
            class.add_field(field)?;
        }
        for (_, method) in methods {
            class.add_method(method)?;
        }
        Ok(class)
    }

    fn read_class_data(
        &self,
        class: &ClassDefinition,
        offset: u32,
    ) -> Result<(Vec<(u32, FieldDefinition)>, Vec<(u32, MethodDefinition)>), DexError> {
        let bytes = self.bytes;
        let mut ix = self.at(offset, "class data")?;
        let static_fields = read_uleb128(bytes, &mut ix)?;
        let instance_fields = read_uleb128(bytes, &mut ix)?;
        let direct_methods = read_uleb128(bytes, &mut ix)?;
        let virtual_methods = read_uleb128(bytes, &mut ix)?;

        let mut fields = vec![];
        for count in [static_fields, instance_fields] {
            let mut idx = 0u32;
            for _ in 0..count {
                idx = idx.checked_add(read_uleb128(bytes, &mut ix)?).ok_or_else(|| err!("field index overflow"))?;
                let flags = AccessFlags::from_bits_retain(read_uleb128(bytes, &mut ix)?);
                let reference = self.pools.field(idx)?;
                fields.push((idx, FieldDefinition::new(reference.owner, &reference.name, reference.field_type, flags)));
            }
        }

        let mut methods = vec![];
        for (count, is_virtual) in [(direct_methods, false), (virtual_methods, true)] {
            let mut idx = 0u32;
            for _ in 0..count {
                idx = idx.checked_add(read_uleb128(bytes, &mut ix)?).ok_or_else(|| err!("method index overflow"))?;
                let flags = AccessFlags::from_bits_retain(read_uleb128(bytes, &mut ix)?);
                let code_off = read_uleb128(bytes, &mut ix)?;
                let reference = self.pools.method(idx)?;
                let mut method = MethodDefinition::new(class.reference(), &reference.name, reference.prototype.clone())
                    .with_flags(flags)
                    .map_err(|e| err!(e, "method {}", reference))?;
                if is_virtual {
                    method.set_virtual(true)?;
                }
                if code_off != 0 {
                    method.body = Some(self.read_code(code_off).map_err(|e| err!(e, "code of {}", reference))?);
                }
                methods.push((idx, method));
            }
        }
        Ok((fields, methods))
    }

    fn read_code(&self, offset: u32) -> Result<MethodBody, DexError> {
        let bytes = self.bytes;
        let mut ix = self.at(offset, "code item")?;
        let mut body = MethodBody::new(read_u2(bytes, &mut ix)?, read_u2(bytes, &mut ix)?, read_u2(bytes, &mut ix)?);
        let tries_size = read_u2(bytes, &mut ix)?;
        let _debug_info_off = read_u4(bytes, &mut ix)?;
        let insns_size = read_u4(bytes, &mut ix)? as usize;
        if insns_size > bytes.len().saturating_sub(ix) / 2 {
            fail!("{} code units overrun the file", insns_size);
        }
        let mut units = Vec::with_capacity(insns_size);
        for _ in 0..insns_size {
            units.push(read_u2(bytes, &mut ix)?);
        }
        body.instructions = decode_instructions(&units, &self.pools)?;

        if tries_size == 0 {
            return Ok(body);
        }
        if insns_size % 2 == 1 {
            let padding = read_u2(bytes, &mut ix)?;
            if padding != 0 {
                log::warn!("non-zero padding {:#06x} before tries at {:#x}", padding, ix - 2);
            }
        }
        let mut raw_tries = Vec::with_capacity(tries_size as usize);
        for _ in 0..tries_size {
            raw_tries.push((read_u4(bytes, &mut ix)?, read_u2(bytes, &mut ix)?, read_u2(bytes, &mut ix)?));
        }
        let handlers_base = ix;
        for (start_address, instruction_count, handler_off) in raw_tries {
            let mut hix = handlers_base + handler_off as usize;
            let size = read_sleb128(bytes, &mut hix)?;
            let mut handlers = vec![];
            for _ in 0..size.unsigned_abs() {
                let exception = self.pools.type_ref(read_uleb128(bytes, &mut hix)?)?;
                handlers.push(CatchHandler { exception, address: read_uleb128(bytes, &mut hix)? });
            }
            let catch_all = if size <= 0 { Some(read_uleb128(bytes, &mut hix)?) } else { None };
            body.tries.push(TryBlock { start_address, instruction_count, handlers, catch_all });
        }
        Ok(body)
    }

    fn read_annotation_set(&self, offset: u32) -> Result<Vec<Annotation>, DexError> {
        if offset == 0 {
            return Ok(vec![]);
        }
        let mut ix = self.at(offset, "annotation set")?;
        let size = read_u4(self.bytes, &mut ix)?;
        if size as usize > self.bytes.len() / 4 {
            fail!("annotation set size {} is out of bounds", size);
        }
        let mut annotations = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut aix = self.at(read_u4(self.bytes, &mut ix)?, "annotation")?;
            annotations.push(read_annotation_item(self.bytes, &mut aix, &self.pools)?);
        }
        Ok(annotations)
    }

    fn read_annotations_directory(
        &self,
        offset: u32,
        class: &mut ClassDefinition,
        fields: &mut [(u32, FieldDefinition)],
        methods: &mut [(u32, MethodDefinition)],
    ) -> Result<(), DexError> {
        let bytes = self.bytes;
        let mut ix = self.at(offset, "annotations directory")?;
        class.annotations = self.read_annotation_set(read_u4(bytes, &mut ix)?)?;
        let fields_size = read_u4(bytes, &mut ix)?;
        let methods_size = read_u4(bytes, &mut ix)?;
        let parameters_size = read_u4(bytes, &mut ix)?;

        for _ in 0..fields_size {
            let idx = read_u4(bytes, &mut ix)?;
            let set = self.read_annotation_set(read_u4(bytes, &mut ix)?)?;
            match fields.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, field)) => field.annotations = set,
                None => fail!("annotated field {} is not defined by {}", idx, class.fullname()),
            }
        }
        for _ in 0..methods_size {
            let idx = read_u4(bytes, &mut ix)?;
            let set = self.read_annotation_set(read_u4(bytes, &mut ix)?)?;
            match methods.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, method)) => method.annotations = set,
                None => fail!("annotated method {} is not defined by {}", idx, class.fullname()),
            }
        }
        for _ in 0..parameters_size {
            let idx = read_u4(bytes, &mut ix)?;
            let mut rix = self.at(read_u4(bytes, &mut ix)?, "annotation set ref list")?;
            let size = read_u4(bytes, &mut rix)?;
            if size as usize > bytes.len() / 4 {
                fail!("annotation set ref list size {} is out of bounds", size);
            }
            let mut parameters = Vec::with_capacity(size as usize);
            for _ in 0..size {
                parameters.push(self.read_annotation_set(read_u4(bytes, &mut rix)?)?);
            }
            match methods.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, method)) => method.parameter_annotations = parameters,
                None => fail!("method {} with parameter annotations is not defined by {}", idx, class.fullname()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Instruction, Operand};
    use crate::dex::error::ErrorKind;
    use crate::dex::writer::DexWriter;
    use crate::dex::DexVersion;
    use crate::members::{AnnotationVisibility, Value};
    use crate::opcodes::RCode;

    fn build(arena: &mut ClassArena) -> DexId {
        let dex = arena.create_dex();

        let mut outer = ClassDefinition::new("demo.Outer")
            .with_super("java.lang.Object")
            .with_flags(AccessFlags::PUBLIC);
        outer.interfaces.push(ClassReference::new("java.lang.Runnable"));
        outer.source_file = Some("Outer.cs".to_string());
        outer.annotations.push(
            Annotation::new(ClassReference::new("demo.Marker"), AnnotationVisibility::Runtime)
                .with_argument("value", Value::String("outer".to_string()))
                .with_argument("level", Value::Int(3)),
        );

        let mut count = outer.new_field("count", TypeReference::INT, AccessFlags::PRIVATE);
        count.annotations.push(Annotation::new(ClassReference::new("demo.Tracked"), AnnotationVisibility::Build));
        outer.add_field(count).unwrap();
        let mut limit = outer.new_field("LIMIT", TypeReference::LONG, AccessFlags::STATIC | AccessFlags::FINAL);
        limit.value = Some(Value::Long(1 << 40));
        outer.add_field(limit).unwrap();
        let mut scale = outer.new_field("SCALE", TypeReference::DOUBLE, AccessFlags::STATIC);
        scale.value = Some(Value::Double(0.25));
        outer.add_field(scale).unwrap();

        let mut ctor = outer
            .new_method("<init>", Prototype::parse("()V").unwrap(), AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR)
            .unwrap();
        let mut body = MethodBody::new(1, 1, 1);
        let object_init = MethodReference::new(ClassReference::new("java.lang.Object"), "<init>", Prototype::parse("()V").unwrap());
        body.push(Instruction::new(RCode::InvokeDirect, vec![0], Operand::Method(object_init)));
        body.push(Instruction::simple(RCode::ReturnVoid, &[]));
        ctor.body = Some(body);
        outer.add_method(ctor).unwrap();

        let mut run = outer
            .new_method("run", Prototype::parse("(Ljava/lang/String;)V").unwrap(), AccessFlags::PUBLIC)
            .unwrap();
        run.set_virtual(true).unwrap();
        run.parameter_annotations = vec![vec![Annotation::new(ClassReference::new("demo.NotNull"), AnnotationVisibility::Runtime)]];
        let mut body = MethodBody::new(3, 2, 0);
        body.push(Instruction::new(RCode::ConstString, vec![0], Operand::String("h\u{e9}llo".to_string())));
        body.push(Instruction::simple(RCode::ReturnVoid, &[]));
        body.push(Instruction::simple(RCode::MoveException, &[0]));
        body.push(Instruction::simple(RCode::Throw, &[0]));
        body.tries.push(TryBlock {
            start_address: 0,
            instruction_count: 2,
            handlers: vec![CatchHandler { exception: TypeReference::class("java.lang.RuntimeException"), address: 3 }],
            catch_all: Some(3),
        });
        run.body = Some(body);
        outer.add_method(run).unwrap();

        let helper = outer
            .new_method("helper", Prototype::parse("(IJ)I").unwrap(), AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::NATIVE)
            .unwrap();
        outer.add_method(helper).unwrap();

        let inner = ClassDefinition::new("demo.Outer$Inner").with_super("java.lang.Object");

        let outer = arena.alloc(outer);
        let inner = arena.alloc(inner);
        arena.add_class(dex, outer).unwrap();
        arena.add_inner_class(outer, inner).unwrap();
        dex
    }

    #[test]
    fn write_then_read() {
        let mut arena = ClassArena::new();
        let dex = build(&mut arena);
        let file = DexWriter::write(&arena, dex).unwrap();

        let mut target = ClassArena::new();
        let read = DexReader::read_with_options(&file, &mut target, &DexOptions::default().with_verify_signature(true)).unwrap();
        let container = target.dex(read).unwrap();
        assert_eq!(container.class_count(), 2);
        assert!(container.is_top_level("demo.Outer"));
        assert!(container.is_inner("demo.Outer$Inner"));

        let outer = &target[target.get_class(read, "demo.Outer").unwrap()];
        assert_eq!(outer.access_flags, AccessFlags::PUBLIC);
        assert_eq!(outer.super_class.as_ref().map(|c| c.fullname()), Some("java.lang.Object".to_string()));
        assert_eq!(outer.interfaces, vec![ClassReference::new("java.lang.Runnable")]);
        assert_eq!(outer.source_file.as_deref(), Some("Outer.cs"));
        assert_eq!(outer.annotations.len(), 1);
        assert_eq!(outer.annotations[0].argument("level"), Some(&Value::Int(3)));
        assert_eq!(outer.inner_classes().len(), 1);

        assert_eq!(outer.get_field("LIMIT").unwrap().value, Some(Value::Long(1 << 40)));
        assert_eq!(outer.get_field("SCALE").unwrap().value, Some(Value::Double(0.25)));
        assert_eq!(outer.get_field("count").unwrap().annotations[0].visibility, AnnotationVisibility::Build);

        let run = outer.get_method_with_signature("run", "(Ljava/lang/String;)V").unwrap();
        assert!(run.is_virtual());
        assert_eq!(run.parameter_annotations.len(), 1);
        let body = run.body.as_ref().unwrap();
        assert_eq!(body.instructions[0].operand, Operand::String("h\u{e9}llo".to_string()));
        assert_eq!(body.tries[0].catch_all, Some(3));
        assert_eq!(body.tries[0].handlers[0].exception, TypeReference::class("java.lang.RuntimeException"));

        let ctor = outer.get_method("<init>").unwrap();
        assert!(ctor.is_constructor() && !ctor.is_virtual());
        assert_eq!(ctor.body.as_ref().unwrap().instructions.len(), 2);
        let helper = outer.get_method("helper").unwrap();
        assert!(helper.body.is_none());
        assert!(helper.access_flags().contains(AccessFlags::NATIVE));

        // Writing the read classes gives the same bytes.
        assert_eq!(DexWriter::write(&target, read).unwrap(), file);
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut arena = ClassArena::new();
        let dex = build(&mut arena);
        let mut file = DexWriter::write(&arena, dex).unwrap();
        let last = file.len() - 1;
        file[last] ^= 0xff;

        let mut target = ClassArena::new();
        assert_eq!(DexReader::read(&file, &mut target).unwrap_err().kind(), ErrorKind::Format);
        // Unverified, the flipped byte still trips the map list bounds check.
        let lenient = DexOptions::default().with_verify_checksum(false);
        assert!(DexReader::read_with_options(&file, &mut target, &lenient).is_err());
    }

    #[test]
    fn duplicate_class_defs_leave_the_arena_untouched() {
        let mut arena = ClassArena::new();
        let dex = arena.create_dex();
        for name in ["a.A", "a.B"] {
            let id = arena.alloc(ClassDefinition::new(name).with_super("java.lang.Object"));
            arena.add_class(dex, id).unwrap();
        }
        let mut file = DexWriter::write(&arena, dex).unwrap();

        let header = Header::read(&file, &mut 0).unwrap();
        let first = header.class_defs_off as usize;
        let (head, tail) = file.split_at_mut(first + 32);
        tail[..4].copy_from_slice(&head[first..first + 4]);

        let mut target = ClassArena::new();
        let lenient = DexOptions::default().with_verify_checksum(false);
        let e = DexReader::read_with_options(&file, &mut target, &lenient).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Format);
        assert!(target.is_empty());
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut arena = ClassArena::new();
        let dex = build(&mut arena);
        let file = DexWriter::write_with_options(&arena, dex, &DexOptions::default().with_version(DexVersion::V039)).unwrap();

        let mut target = ClassArena::new();
        assert!(DexReader::read(&file, &mut target).is_ok());

        let mut bad = file.clone();
        bad[0] = b'x';
        assert!(DexReader::read(&bad, &mut target).is_err());
        assert!(DexReader::read(&file[..file.len() / 2], &mut target).is_err());
        assert!(DexReader::read(&file[..0x40], &mut target).is_err());
    }
}
