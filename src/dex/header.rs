/* Dex header, map list and string data */

use cesu8::{from_java_cesu8, to_java_cesu8};
use serde::{Deserialize, Serialize};

use crate::dex::error::DexError;
use crate::dex::{read_u1, read_u2, read_u4, read_uleb128, read_x, write_u1, write_u2, write_u4, write_uleb128, write_x};

pub const DEX_FILE_MAGIC: [u8; 4] = [0x64, 0x65, 0x78, 0x0a];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const NO_INDEX: u32 = 0xffffffff;
pub const HEADER_SIZE: u32 = 0x70;

pub const TYPE_HEADER_ITEM: u16 = 0x0000;
pub const TYPE_STRING_ID_ITEM: u16 = 0x0001;
pub const TYPE_TYPE_ID_ITEM: u16 = 0x0002;
pub const TYPE_PROTO_ID_ITEM: u16 = 0x0003;
pub const TYPE_FIELD_ID_ITEM: u16 = 0x0004;
pub const TYPE_METHOD_ID_ITEM: u16 = 0x0005;
pub const TYPE_CLASS_DEF_ITEM: u16 = 0x0006;
pub const TYPE_MAP_LIST: u16 = 0x1000;
pub const TYPE_TYPE_LIST: u16 = 0x1001;
pub const TYPE_ANNOTATION_SET_REF_LIST: u16 = 0x1002;
pub const TYPE_ANNOTATION_SET_ITEM: u16 = 0x1003;
pub const TYPE_CLASS_DATA_ITEM: u16 = 0x2000;
pub const TYPE_CODE_ITEM: u16 = 0x2001;
pub const TYPE_STRING_DATA_ITEM: u16 = 0x2002;
pub const TYPE_DEBUG_INFO_ITEM: u16 = 0x2003;
pub const TYPE_ANNOTATION_ITEM: u16 = 0x2004;
pub const TYPE_ENCODED_ARRAY_ITEM: u16 = 0x2005;
pub const TYPE_ANNOTATIONS_DIRECTORY_ITEM: u16 = 0x2006;

/// Dex format version, the three digits after `dex\n` in the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DexVersion {
    #[serde(rename = "035")]
    #[default]
    V035,
    #[serde(rename = "037")]
    V037,
    #[serde(rename = "038")]
    V038,
    #[serde(rename = "039")]
    V039,
}

impl DexVersion {
    pub fn digits(self) -> &'static [u8; 3] {
        match self {
            DexVersion::V035 => b"035",
            DexVersion::V037 => b"037",
            DexVersion::V038 => b"038",
            DexVersion::V039 => b"039",
        }
    }

    pub fn magic(self) -> [u8; 8] {
        let d = self.digits();
        [DEX_FILE_MAGIC[0], DEX_FILE_MAGIC[1], DEX_FILE_MAGIC[2], DEX_FILE_MAGIC[3], d[0], d[1], d[2], 0]
    }

    pub fn from_magic(magic: &[u8; 8]) -> Result<DexVersion, DexError> {
        if magic[..4] != DEX_FILE_MAGIC || magic[7] != 0 {
            fail!("Invalid magic value {:02x?}", magic);
        }
        match &magic[4..7] {
            b"035" => Ok(DexVersion::V035),
            b"037" => Ok(DexVersion::V037),
            b"038" => Ok(DexVersion::V038),
            b"039" => Ok(DexVersion::V039),
            other => fail!("Unsupported dex version {:?}", String::from_utf8_lossy(other)),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header
{
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE as usize {
            fail!("Not enough bytes for header");
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(read_x(bytes, ix, 8)?);
        let checksum = read_u4(bytes, ix)?;
        let mut signature = [0u8; 20];
        signature.copy_from_slice(read_x(bytes, ix, 20)?);

        let header = Header {
            magic,
            checksum,
            signature,
            file_size: read_u4(bytes, ix)?,
            header_size: read_u4(bytes, ix)?,
            endian_tag: read_u4(bytes, ix)?,
            link_size: read_u4(bytes, ix)?,
            link_off: read_u4(bytes, ix)?,
            map_off: read_u4(bytes, ix)?,
            string_ids_size: read_u4(bytes, ix)?,
            string_ids_off: read_u4(bytes, ix)?,
            type_ids_size: read_u4(bytes, ix)?,
            type_ids_off: read_u4(bytes, ix)?,
            proto_ids_size: read_u4(bytes, ix)?,
            proto_ids_off: read_u4(bytes, ix)?,
            field_ids_size: read_u4(bytes, ix)?,
            field_ids_off: read_u4(bytes, ix)?,
            method_ids_size: read_u4(bytes, ix)?,
            method_ids_off: read_u4(bytes, ix)?,
            class_defs_size: read_u4(bytes, ix)?,
            class_defs_off: read_u4(bytes, ix)?,
            data_size: read_u4(bytes, ix)?,
            data_off: read_u4(bytes, ix)?,
        };
        header.validate(bytes.len())?;
        Ok(header)
    }

    fn validate(&self, len: usize) -> Result<(), DexError>
    {
        DexVersion::from_magic(&self.magic)?;
        if self.endian_tag == REVERSE_ENDIAN_CONSTANT {
            fail!("Big-endian dex files are not supported");
        }
        if self.endian_tag != ENDIAN_CONSTANT {
            fail!("Invalid endian tag {:#x}", self.endian_tag);
        }
        if self.header_size != HEADER_SIZE {
            fail!("Invalid header size {:#x}", self.header_size);
        }
        if self.file_size < HEADER_SIZE {
            fail!("File size {} is smaller than the header", self.file_size);
        }
        if self.file_size as usize > len {
            fail!("File size {} exceeds the {} bytes available", self.file_size, len);
        }
        let sections = [
            ("string_ids", self.string_ids_off, self.string_ids_size, 4),
            ("type_ids", self.type_ids_off, self.type_ids_size, 4),
            ("proto_ids", self.proto_ids_off, self.proto_ids_size, 12),
            ("field_ids", self.field_ids_off, self.field_ids_size, 8),
            ("method_ids", self.method_ids_off, self.method_ids_size, 8),
            ("class_defs", self.class_defs_off, self.class_defs_size, 32),
        ];
        for (name, off, size, item) in sections {
            let end = off as u64 + size as u64 * item;
            if size > 0 && (off < HEADER_SIZE || end > self.file_size as u64) {
                fail!("Section {} at {:#x} with {} items is out of bounds", name, off, size);
            }
        }
        if self.map_off as u64 + 4 > self.file_size as u64 {
            fail!("Map list offset {:#x} is out of bounds", self.map_off);
        }
        Ok(())
    }

    pub fn version(&self) -> Result<DexVersion, DexError>
    {
        DexVersion::from_magic(&self.magic)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_x(bytes, &self.magic);
        c += write_u4(bytes, self.checksum);
        c += write_x(bytes, &self.signature);
        c += write_u4(bytes, self.file_size);
        c += write_u4(bytes, self.header_size);
        c += write_u4(bytes, self.endian_tag);
        c += write_u4(bytes, self.link_size);
        c += write_u4(bytes, self.link_off);
        c += write_u4(bytes, self.map_off);
        c += write_u4(bytes, self.string_ids_size);
        c += write_u4(bytes, self.string_ids_off);
        c += write_u4(bytes, self.type_ids_size);
        c += write_u4(bytes, self.type_ids_off);
        c += write_u4(bytes, self.proto_ids_size);
        c += write_u4(bytes, self.proto_ids_off);
        c += write_u4(bytes, self.field_ids_size);
        c += write_u4(bytes, self.field_ids_off);
        c += write_u4(bytes, self.method_ids_size);
        c += write_u4(bytes, self.method_ids_off);
        c += write_u4(bytes, self.class_defs_size);
        c += write_u4(bytes, self.class_defs_off);
        c += write_u4(bytes, self.data_size);
        c += write_u4(bytes, self.data_off);
        c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapItem {
    pub type_code: u16,
    pub size: u32,
    pub offset: u32,
}

impl MapItem
{
    pub fn new(type_code: u16, size: u32, offset: u32) -> Self
    {
        MapItem { type_code, size, offset }
    }

    pub fn read_list(bytes: &[u8], ix: &mut usize) -> Result<Vec<MapItem>, DexError>
    {
        let size = read_u4(bytes, ix)?;
        if size as usize > bytes.len() / 12 {
            fail!("Map list size {} is out of bounds", size);
        }
        let mut items = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let type_code = read_u2(bytes, ix)?;
            let _unused = read_u2(bytes, ix)?;
            items.push(MapItem { type_code, size: read_u4(bytes, ix)?, offset: read_u4(bytes, ix)? });
        }
        Ok(items)
    }

    pub fn write_list(items: &[MapItem], bytes: &mut Vec<u8>) -> usize
    {
        let mut c = write_u4(bytes, items.len() as u32);
        for item in items {
            c += write_u2(bytes, item.type_code);
            c += write_u2(bytes, 0);
            c += write_u4(bytes, item.size);
            c += write_u4(bytes, item.offset);
        }
        c
    }
}

/// A `string_data_item`: MUTF-8 text prefixed by its UTF-16 length.
///
/// Data that is not valid MUTF-8 is kept raw.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum DexString
{
    Decoded(String),
    Raw(u32, Vec<u8>),
}

impl DexString
{
    pub fn from_string(s: &str) -> DexString
    {
        DexString::Decoded(s.to_string())
    }

    pub fn to_string(&self) -> Result<String, DexError>
    {
        match self
        {
            DexString::Decoded(s) => Ok(s.to_string()),
            DexString::Raw(_, v) => fail!("DexString failed conversion of {} bytes", v.len()),
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<DexString, DexError>
    {
        let utf16_size = read_uleb128(bytes, ix)?;
        let mut v = vec![];

        loop
        {
            let u = read_u1(bytes, ix)?;
            if u != 0 { v.push(u); }
            else { break; }
        }

        Ok(match from_java_cesu8(v.as_slice())
        {
            Ok(converted_str) => DexString::Decoded(converted_str.to_string()),
            _ => DexString::Raw(utf16_size, v)
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;

        match self
        {
            DexString::Raw(utf16_size, v) => {
                c += write_uleb128(bytes, *utf16_size);
                c += write_x(bytes, v);
                c += write_u1(bytes, 0);
            },

            DexString::Decoded(s) => {
                let encoded = to_java_cesu8(s);
                c += write_uleb128(bytes, s.encode_utf16().count() as u32);
                c += write_x(bytes, &encoded);
                c += write_u1(bytes, 0);
            }
        }
        c
    }

    pub fn is_decoded(&self) -> bool
    {
        matches!(self, DexString::Decoded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_magic() {
        for v in [DexVersion::V035, DexVersion::V037, DexVersion::V038, DexVersion::V039] {
            assert_eq!(DexVersion::from_magic(&v.magic()).unwrap(), v);
        }
        assert_eq!(&DexVersion::V039.magic(), b"dex\n039\0");
        assert!(DexVersion::from_magic(b"dex\n040\0").is_err());
        assert!(DexVersion::from_magic(b"dey\n035\0").is_err());
    }

    #[test]
    fn header_rejects_bad_endian_tag() {
        let mut header = Header {
            magic: DexVersion::V035.magic(),
            file_size: HEADER_SIZE + 4,
            header_size: HEADER_SIZE,
            endian_tag: REVERSE_ENDIAN_CONSTANT,
            map_off: HEADER_SIZE,
            ..Header::default()
        };
        let mut bytes = vec![];
        header.write(&mut bytes);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(Header::read(&bytes, &mut 0).is_err());

        header.endian_tag = ENDIAN_CONSTANT;
        let mut bytes = vec![];
        assert_eq!(header.write(&mut bytes), HEADER_SIZE as usize);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(Header::read(&bytes, &mut 0).unwrap(), header);
    }

    #[test]
    fn strings_use_modified_utf8() {
        let s = DexString::from_string("a\0\u{1F600}");
        let mut bytes = vec![];
        s.write(&mut bytes);
        // utf16 length 4, NUL as c0 80, supplementary char as a surrogate pair
        assert_eq!(bytes[0], 4);
        assert_eq!(&bytes[1..4], &[0x61, 0xc0, 0x80]);
        assert_eq!(bytes.len(), 1 + 3 + 6 + 1);
        assert_eq!(DexString::read(&bytes, &mut 0).unwrap(), s);
    }
}
