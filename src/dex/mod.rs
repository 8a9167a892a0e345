//! Binary dex container: byte helpers, header, encoded values, reader and writer.

#[macro_use]
pub mod error;

pub(crate) mod leb;
pub mod header;
pub mod options;
pub(crate) mod values;
pub mod reader;
pub mod writer;

pub use header::{DexString, DexVersion, Header};
pub use options::DexOptions;
pub use reader::DexReader;
pub use writer::DexWriter;

use crate::dex::error::DexError;
use crate::dex::leb::{decode_sleb128, decode_uleb128, decode_uleb128p1, encode_sleb128, encode_uleb128, encode_uleb128p1};
use crate::members::{FieldReference, MethodReference, Prototype};
use crate::types::TypeReference;

/// Maps model references to pool indices while a dex file is being written.
pub(crate) trait IndexResolver {
    fn string_index(&self, value: &str) -> Result<u32, DexError>;
    fn type_index(&self, ty: &TypeReference) -> Result<u32, DexError>;
    fn proto_index(&self, proto: &Prototype) -> Result<u32, DexError>;
    fn field_index(&self, field: &FieldReference) -> Result<u32, DexError>;
    fn method_index(&self, method: &MethodReference) -> Result<u32, DexError>;
}

/// Maps pool indices back to model references while a dex file is being read.
pub(crate) trait ReferenceTable {
    fn string(&self, idx: u32) -> Result<String, DexError>;
    fn type_ref(&self, idx: u32) -> Result<TypeReference, DexError>;
    fn field(&self, idx: u32) -> Result<FieldReference, DexError>;
    fn method(&self, idx: u32) -> Result<MethodReference, DexError>;
}

// Basic type reading and writing
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    let Some(&result) = bytes.get(*ix) else {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    };
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    let Some(b) = bytes.get(*ix..*ix + 2) else {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    };
    *ix += 2;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let Some(b) = bytes.get(*ix..*ix + 4) else {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    };
    *ix += 4;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    decode_uleb128(bytes, ix)
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    decode_sleb128(bytes, ix)
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    decode_uleb128p1(bytes, ix)
}

pub(crate) fn read_x<'a>(bytes: &'a [u8], ix: &mut usize, length: usize) -> Result<&'a [u8], DexError>
{
    let Some(slice) = bytes.get(*ix..*ix + length) else {
        fail!("buffer too short for {} byte read at index {}", length, *ix);
    };
    *ix += length;
    Ok(slice)
}

pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    encode_uleb128(buffer, val)
}

pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    encode_sleb128(buffer, val)
}

pub(crate) fn write_uleb128p1(buffer: &mut Vec<u8>, val: i32) -> usize
{
    encode_uleb128p1(buffer, val)
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    buffer.extend_from_slice(val);
    val.len()
}

/// Pads `buffer` with zeros up to the next multiple of `alignment`.
pub(crate) fn align(buffer: &mut Vec<u8>, alignment: usize)
{
    let rem = buffer.len() % alignment;
    if rem != 0
    {
        buffer.resize(buffer.len() + alignment - rem, 0);
    }
}
