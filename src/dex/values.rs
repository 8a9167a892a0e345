//! `encoded_value`, `encoded_array` and `encoded_annotation` codecs.

use crate::dex::error::DexError;
use crate::dex::{read_u1, read_uleb128, write_u1, write_uleb128, IndexResolver, ReferenceTable};
use crate::members::{Annotation, AnnotationArgument, AnnotationVisibility, Value};

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

fn write_header(bytes: &mut Vec<u8>, value_type: u8, arg: u8) -> usize {
    write_u1(bytes, (arg << 5) | value_type)
}

/// Smallest sign-extended little-endian form of `v`.
fn write_signed(bytes: &mut Vec<u8>, value_type: u8, v: i64) -> usize {
    let mut size = 1;
    while size < 8 {
        let shift = 64 - 8 * size;
        if (v << shift) >> shift == v {
            break;
        }
        size += 1;
    }
    let mut c = write_header(bytes, value_type, (size - 1) as u8);
    for i in 0..size {
        c += write_u1(bytes, (v >> (8 * i)) as u8);
    }
    c
}

/// Smallest zero-extended little-endian form of `v`.
fn write_unsigned(bytes: &mut Vec<u8>, value_type: u8, v: u64) -> usize {
    let mut size = 1;
    while size < 8 && v >> (8 * size) != 0 {
        size += 1;
    }
    let mut c = write_header(bytes, value_type, (size - 1) as u8);
    for i in 0..size {
        c += write_u1(bytes, (v >> (8 * i)) as u8);
    }
    c
}

/// Floating bits of `width` bytes, right-zero-extended: trailing zero bytes
/// of the low end are dropped and only the high-order bytes are stored.
fn write_floating(bytes: &mut Vec<u8>, value_type: u8, bits: u64, width: usize) -> usize {
    let mut drop = 0;
    while drop < width - 1 && (bits >> (8 * drop)) & 0xff == 0 {
        drop += 1;
    }
    let size = width - drop;
    let stored = bits >> (8 * drop);
    let mut c = write_header(bytes, value_type, (size - 1) as u8);
    for i in 0..size {
        c += write_u1(bytes, (stored >> (8 * i)) as u8);
    }
    c
}

fn read_raw(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u64, DexError> {
    let mut v = 0u64;
    for i in 0..size {
        v |= (read_u1(bytes, ix)? as u64) << (8 * i);
    }
    Ok(v)
}

fn read_signed(bytes: &[u8], ix: &mut usize, size: usize) -> Result<i64, DexError> {
    let raw = read_raw(bytes, ix, size)?;
    let shift = 64 - 8 * size;
    Ok(((raw << shift) as i64) >> shift)
}

fn read_floating(bytes: &[u8], ix: &mut usize, size: usize, width: usize) -> Result<u64, DexError> {
    Ok(read_raw(bytes, ix, size)? << (8 * (width - size)))
}

pub(crate) fn write_value(bytes: &mut Vec<u8>, value: &Value, resolver: &dyn IndexResolver) -> Result<usize, DexError> {
    Ok(match value {
        Value::Byte(v) => write_header(bytes, VALUE_BYTE, 0) + write_u1(bytes, *v as u8),
        Value::Short(v) => write_signed(bytes, VALUE_SHORT, *v as i64),
        Value::Char(v) => write_unsigned(bytes, VALUE_CHAR, *v as u64),
        Value::Int(v) => write_signed(bytes, VALUE_INT, *v as i64),
        Value::Long(v) => write_signed(bytes, VALUE_LONG, *v),
        Value::Float(v) => write_floating(bytes, VALUE_FLOAT, v.to_bits() as u64, 4),
        Value::Double(v) => write_floating(bytes, VALUE_DOUBLE, v.to_bits(), 8),
        Value::String(s) => write_unsigned(bytes, VALUE_STRING, resolver.string_index(s)? as u64),
        Value::Type(t) => write_unsigned(bytes, VALUE_TYPE, resolver.type_index(t)? as u64),
        Value::Field(f) => write_unsigned(bytes, VALUE_FIELD, resolver.field_index(f)? as u64),
        Value::Method(m) => write_unsigned(bytes, VALUE_METHOD, resolver.method_index(m)? as u64),
        Value::Enum(f) => write_unsigned(bytes, VALUE_ENUM, resolver.field_index(f)? as u64),
        Value::Array(values) => write_header(bytes, VALUE_ARRAY, 0) + write_array(bytes, values, resolver)?,
        Value::Annotation(a) => write_header(bytes, VALUE_ANNOTATION, 0) + write_annotation(bytes, a, resolver)?,
        Value::Null => write_header(bytes, VALUE_NULL, 0),
        Value::Boolean(b) => write_header(bytes, VALUE_BOOLEAN, *b as u8),
    })
}

pub(crate) fn read_value(bytes: &[u8], ix: &mut usize, table: &dyn ReferenceTable) -> Result<Value, DexError> {
    let header_offset = *ix;
    let header = read_u1(bytes, ix)?;
    let value_type = header & 0x1f;
    let arg = (header >> 5) as usize;
    let size = arg + 1;

    let check = |max: usize| -> Result<(), DexError> {
        if size > max {
            fail!(("Invalid size {} for value type {:#x}", size, value_type), ("encoded value at {:#x}", header_offset));
        }
        Ok(())
    };

    let value = match value_type {
        VALUE_BYTE => {
            check(1)?;
            Value::Byte(read_signed(bytes, ix, size)? as i8)
        }
        VALUE_SHORT => {
            check(2)?;
            Value::Short(read_signed(bytes, ix, size)? as i16)
        }
        VALUE_CHAR => {
            check(2)?;
            Value::Char(read_raw(bytes, ix, size)? as u16)
        }
        VALUE_INT => {
            check(4)?;
            Value::Int(read_signed(bytes, ix, size)? as i32)
        }
        VALUE_LONG => {
            check(8)?;
            Value::Long(read_signed(bytes, ix, size)?)
        }
        VALUE_FLOAT => {
            check(4)?;
            Value::Float(f32::from_bits(read_floating(bytes, ix, size, 4)? as u32))
        }
        VALUE_DOUBLE => {
            check(8)?;
            Value::Double(f64::from_bits(read_floating(bytes, ix, size, 8)?))
        }
        VALUE_STRING | VALUE_TYPE | VALUE_FIELD | VALUE_METHOD | VALUE_ENUM => {
            check(4)?;
            let idx = read_raw(bytes, ix, size)? as u32;
            match value_type {
                VALUE_STRING => Value::String(table.string(idx)?),
                VALUE_TYPE => Value::Type(table.type_ref(idx)?),
                VALUE_FIELD => Value::Field(table.field(idx)?),
                VALUE_METHOD => Value::Method(table.method(idx)?),
                _ => Value::Enum(table.field(idx)?),
            }
        }
        VALUE_ARRAY => {
            check(1)?;
            Value::Array(read_array(bytes, ix, table)?)
        }
        VALUE_ANNOTATION => {
            check(1)?;
            Value::Annotation(Box::new(read_annotation(bytes, ix, table, AnnotationVisibility::Build)?))
        }
        VALUE_NULL => {
            check(1)?;
            Value::Null
        }
        VALUE_BOOLEAN => {
            check(2)?;
            Value::Boolean(arg == 1)
        }
        _ => fail!(("Unsupported encoded value type {:#x}", value_type), ("encoded value at {:#x}", header_offset)),
    };
    Ok(value)
}

pub(crate) fn write_array(bytes: &mut Vec<u8>, values: &[Value], resolver: &dyn IndexResolver) -> Result<usize, DexError> {
    let mut c = write_uleb128(bytes, values.len() as u32);
    for v in values {
        c += write_value(bytes, v, resolver)?;
    }
    Ok(c)
}

pub(crate) fn read_array(bytes: &[u8], ix: &mut usize, table: &dyn ReferenceTable) -> Result<Vec<Value>, DexError> {
    let size = read_uleb128(bytes, ix)? as usize;
    if size > bytes.len().saturating_sub(*ix) {
        fail!("Encoded array size {} exceeds the remaining data", size);
    }
    let mut values = Vec::with_capacity(size);
    for _ in 0..size {
        values.push(read_value(bytes, ix, table)?);
    }
    Ok(values)
}

/// Elements are written in string-index order of their names.
pub(crate) fn write_annotation(bytes: &mut Vec<u8>, annotation: &Annotation, resolver: &dyn IndexResolver) -> Result<usize, DexError> {
    let type_idx = resolver.type_index(&annotation.annotation_type.clone().into())?;
    let mut elements = Vec::with_capacity(annotation.arguments.len());
    for arg in &annotation.arguments {
        elements.push((resolver.string_index(&arg.name)?, &arg.value));
    }
    elements.sort_by_key(|(idx, _)| *idx);

    let mut c = write_uleb128(bytes, type_idx);
    c += write_uleb128(bytes, elements.len() as u32);
    for (name_idx, value) in elements {
        c += write_uleb128(bytes, name_idx);
        c += write_value(bytes, value, resolver)?;
    }
    Ok(c)
}

/// Nested annotations carry no visibility of their own; `visibility` is used.
pub(crate) fn read_annotation(
    bytes: &[u8],
    ix: &mut usize,
    table: &dyn ReferenceTable,
    visibility: AnnotationVisibility,
) -> Result<Annotation, DexError> {
    let type_idx = read_uleb128(bytes, ix)?;
    let annotation_type = match table.type_ref(type_idx)?.as_class() {
        Some(class) => class.clone(),
        None => fail!("Annotation type {} is not a class", type_idx),
    };
    let size = read_uleb128(bytes, ix)? as usize;
    if size > bytes.len().saturating_sub(*ix) {
        fail!("Annotation element count {} exceeds the remaining data", size);
    }
    let mut arguments = Vec::with_capacity(size);
    for _ in 0..size {
        let name = table.string(read_uleb128(bytes, ix)?)?;
        let value = read_value(bytes, ix, table)?;
        arguments.push(AnnotationArgument { name, value });
    }
    Ok(Annotation { annotation_type, visibility, arguments })
}

/// `annotation_item`: visibility byte followed by the encoded annotation.
pub(crate) fn write_annotation_item(bytes: &mut Vec<u8>, annotation: &Annotation, resolver: &dyn IndexResolver) -> Result<usize, DexError> {
    let c = write_u1(bytes, annotation.visibility.to_byte());
    Ok(c + write_annotation(bytes, annotation, resolver)?)
}

pub(crate) fn read_annotation_item(bytes: &[u8], ix: &mut usize, table: &dyn ReferenceTable) -> Result<Annotation, DexError> {
    let visibility = AnnotationVisibility::from_byte(read_u1(bytes, ix)?)?;
    read_annotation(bytes, ix, table, visibility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::tests::ListPools;
    use crate::members::FieldReference;
    use crate::types::{ClassReference, TypeReference};
    use rand::Rng;

    fn roundtrip(value: &Value, pools: &ListPools) -> Vec<u8> {
        let mut bytes = vec![];
        let n = write_value(&mut bytes, value, pools).unwrap();
        assert_eq!(n, bytes.len());
        let mut ix = 0;
        assert_eq!(&read_value(&bytes, &mut ix, pools).unwrap(), value);
        assert_eq!(ix, bytes.len());
        bytes
    }

    #[test]
    fn minimal_sizes() {
        let pools = ListPools::default();
        assert_eq!(roundtrip(&Value::Int(0), &pools), vec![0x04, 0x00]);
        assert_eq!(roundtrip(&Value::Int(-1), &pools), vec![0x04, 0xff]);
        assert_eq!(roundtrip(&Value::Int(128), &pools), vec![0x24, 0x80, 0x00]);
        assert_eq!(roundtrip(&Value::Int(-129), &pools), vec![0x24, 0x7f, 0xff]);
        assert_eq!(roundtrip(&Value::Char(0xffff), &pools), vec![0x23, 0xff, 0xff]);
        assert_eq!(roundtrip(&Value::Long(i64::MIN), &pools).len(), 9);
        assert_eq!(roundtrip(&Value::Boolean(true), &pools), vec![0x3f]);
        assert_eq!(roundtrip(&Value::Null, &pools), vec![0x1e]);
    }

    #[test]
    fn floats_store_high_order_bytes() {
        let pools = ListPools::default();
        // 1.0f is 0x3f800000
        assert_eq!(roundtrip(&Value::Float(1.0), &pools), vec![0x30, 0x80, 0x3f]);
        // 2.0 is 0x4000000000000000
        assert_eq!(roundtrip(&Value::Double(2.0), &pools), vec![0x11, 0x40]);
        assert_eq!(roundtrip(&Value::Float(0.0), &pools), vec![0x10, 0x00]);
        assert_eq!(roundtrip(&Value::Double(-0.5), &pools), vec![0x31, 0xe0, 0xbf]);
    }

    #[test]
    fn random_scalars() {
        let pools = ListPools::default();
        let mut rng = rand::rng();
        for _ in 0..500 {
            roundtrip(&Value::Int(rng.random()), &pools);
            roundtrip(&Value::Long(rng.random()), &pools);
            roundtrip(&Value::Short(rng.random()), &pools);
            roundtrip(&Value::Double(rng.random::<f64>() * 1e6), &pools);
            roundtrip(&Value::Float(rng.random::<f32>() - 0.5), &pools);
        }
    }

    #[test]
    fn references_and_nesting() {
        let pools = ListPools::default();
        let owner = ClassReference::new("a.Color");
        let red = FieldReference::new(owner.clone(), "RED", TypeReference::Class(owner));
        let nested = Annotation::new(ClassReference::new("a.Inner"), AnnotationVisibility::Build)
            .with_argument("value", Value::Int(3));
        let value = Value::Array(vec![
            Value::String("hello".to_string()),
            Value::Type(TypeReference::array(TypeReference::INT)),
            Value::Enum(red),
            Value::Annotation(Box::new(nested)),
        ]);
        roundtrip(&value, &pools);
    }

    #[test]
    fn annotation_items_keep_visibility() {
        let pools = ListPools::default();
        let a = Annotation::new(ClassReference::new("a.Marker"), AnnotationVisibility::Runtime)
            .with_argument("b", Value::Boolean(true))
            .with_argument("a", Value::Null);
        let mut bytes = vec![];
        write_annotation_item(&mut bytes, &a, &pools).unwrap();
        let read = read_annotation_item(&bytes, &mut 0, &pools).unwrap();
        assert_eq!(read.visibility, AnnotationVisibility::Runtime);
        assert_eq!(read.argument("a"), Some(&Value::Null));
        assert_eq!(read.argument("b"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn oversized_values_fail() {
        let pools = ListPools::default();
        assert!(read_value(&[0x20, 0x00, 0x00], &mut 0, &pools).is_err());
        assert!(read_value(&[0x05], &mut 0, &pools).is_err());
        assert!(read_value(&[0x24, 0x01], &mut 0, &pools).is_err());
    }
}
