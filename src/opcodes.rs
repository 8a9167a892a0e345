//! Dalvik opcodes (`RCode`) with their mnemonic, encoding format and
//! constant-pool reference kind.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Instruction encoding formats, named after the dex format identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20t,
    Format21c,
    Format21ih,
    Format21lh,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format3rc,
    Format51l,
}

impl Format {
    /// Size in 16-bit code units.
    pub const fn size(self) -> usize {
        match self {
            Format::Format10t | Format::Format10x | Format::Format11n | Format::Format11x | Format::Format12x => 1,
            Format::Format20t
            | Format::Format21c
            | Format::Format21ih
            | Format::Format21lh
            | Format::Format21s
            | Format::Format21t
            | Format::Format22b
            | Format::Format22c
            | Format::Format22s
            | Format::Format22t
            | Format::Format22x
            | Format::Format23x => 2,
            Format::Format30t
            | Format::Format31c
            | Format::Format31i
            | Format::Format31t
            | Format::Format32x
            | Format::Format35c
            | Format::Format3rc => 3,
            Format::Format51l => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    None,
    String,
    Type,
    Field,
    Method,
}

macro_rules! rcodes {
    ($( $variant:ident = $value:literal, $name:literal, $format:ident, $reference:ident; )*) => {
        /// A Dalvik opcode. The discriminant is the opcode byte.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum RCode {
            $( $variant = $value, )*
        }

        impl RCode {
            pub const ALL: &'static [RCode] = &[ $( RCode::$variant, )* ];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( RCode::$variant => $name, )*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $( RCode::$variant => Format::$format, )*
                }
            }

            pub const fn reference_type(self) -> ReferenceType {
                match self {
                    $( RCode::$variant => ReferenceType::$reference, )*
                }
            }
        }
    };
}

rcodes! {
    Nop = 0x00, "nop", Format10x, None;
    Move = 0x01, "move", Format12x, None;
    MoveFrom16 = 0x02, "move/from16", Format22x, None;
    Move16 = 0x03, "move/16", Format32x, None;
    MoveWide = 0x04, "move-wide", Format12x, None;
    MoveWideFrom16 = 0x05, "move-wide/from16", Format22x, None;
    MoveWide16 = 0x06, "move-wide/16", Format32x, None;
    MoveObject = 0x07, "move-object", Format12x, None;
    MoveObjectFrom16 = 0x08, "move-object/from16", Format22x, None;
    MoveObject16 = 0x09, "move-object/16", Format32x, None;
    MoveResult = 0x0a, "move-result", Format11x, None;
    MoveResultWide = 0x0b, "move-result-wide", Format11x, None;
    MoveResultObject = 0x0c, "move-result-object", Format11x, None;
    MoveException = 0x0d, "move-exception", Format11x, None;
    ReturnVoid = 0x0e, "return-void", Format10x, None;
    Return = 0x0f, "return", Format11x, None;
    ReturnWide = 0x10, "return-wide", Format11x, None;
    ReturnObject = 0x11, "return-object", Format11x, None;
    Const4 = 0x12, "const/4", Format11n, None;
    Const16 = 0x13, "const/16", Format21s, None;
    Const = 0x14, "const", Format31i, None;
    ConstHigh16 = 0x15, "const/high16", Format21ih, None;
    ConstWide16 = 0x16, "const-wide/16", Format21s, None;
    ConstWide32 = 0x17, "const-wide/32", Format31i, None;
    ConstWide = 0x18, "const-wide", Format51l, None;
    ConstWideHigh16 = 0x19, "const-wide/high16", Format21lh, None;
    ConstString = 0x1a, "const-string", Format21c, String;
    ConstStringJumbo = 0x1b, "const-string/jumbo", Format31c, String;
    ConstClass = 0x1c, "const-class", Format21c, Type;
    MonitorEnter = 0x1d, "monitor-enter", Format11x, None;
    MonitorExit = 0x1e, "monitor-exit", Format11x, None;
    CheckCast = 0x1f, "check-cast", Format21c, Type;
    InstanceOf = 0x20, "instance-of", Format22c, Type;
    ArrayLength = 0x21, "array-length", Format12x, None;
    NewInstance = 0x22, "new-instance", Format21c, Type;
    NewArray = 0x23, "new-array", Format22c, Type;
    FilledNewArray = 0x24, "filled-new-array", Format35c, Type;
    FilledNewArrayRange = 0x25, "filled-new-array/range", Format3rc, Type;
    FillArrayData = 0x26, "fill-array-data", Format31t, None;
    Throw = 0x27, "throw", Format11x, None;
    Goto = 0x28, "goto", Format10t, None;
    Goto16 = 0x29, "goto/16", Format20t, None;
    Goto32 = 0x2a, "goto/32", Format30t, None;
    PackedSwitch = 0x2b, "packed-switch", Format31t, None;
    SparseSwitch = 0x2c, "sparse-switch", Format31t, None;
    CmplFloat = 0x2d, "cmpl-float", Format23x, None;
    CmpgFloat = 0x2e, "cmpg-float", Format23x, None;
    CmplDouble = 0x2f, "cmpl-double", Format23x, None;
    CmpgDouble = 0x30, "cmpg-double", Format23x, None;
    CmpLong = 0x31, "cmp-long", Format23x, None;
    IfEq = 0x32, "if-eq", Format22t, None;
    IfNe = 0x33, "if-ne", Format22t, None;
    IfLt = 0x34, "if-lt", Format22t, None;
    IfGe = 0x35, "if-ge", Format22t, None;
    IfGt = 0x36, "if-gt", Format22t, None;
    IfLe = 0x37, "if-le", Format22t, None;
    IfEqz = 0x38, "if-eqz", Format21t, None;
    IfNez = 0x39, "if-nez", Format21t, None;
    IfLtz = 0x3a, "if-ltz", Format21t, None;
    IfGez = 0x3b, "if-gez", Format21t, None;
    IfGtz = 0x3c, "if-gtz", Format21t, None;
    IfLez = 0x3d, "if-lez", Format21t, None;
    Aget = 0x44, "aget", Format23x, None;
    AgetWide = 0x45, "aget-wide", Format23x, None;
    AgetObject = 0x46, "aget-object", Format23x, None;
    AgetBoolean = 0x47, "aget-boolean", Format23x, None;
    AgetByte = 0x48, "aget-byte", Format23x, None;
    AgetChar = 0x49, "aget-char", Format23x, None;
    AgetShort = 0x4a, "aget-short", Format23x, None;
    Aput = 0x4b, "aput", Format23x, None;
    AputWide = 0x4c, "aput-wide", Format23x, None;
    AputObject = 0x4d, "aput-object", Format23x, None;
    AputBoolean = 0x4e, "aput-boolean", Format23x, None;
    AputByte = 0x4f, "aput-byte", Format23x, None;
    AputChar = 0x50, "aput-char", Format23x, None;
    AputShort = 0x51, "aput-short", Format23x, None;
    Iget = 0x52, "iget", Format22c, Field;
    IgetWide = 0x53, "iget-wide", Format22c, Field;
    IgetObject = 0x54, "iget-object", Format22c, Field;
    IgetBoolean = 0x55, "iget-boolean", Format22c, Field;
    IgetByte = 0x56, "iget-byte", Format22c, Field;
    IgetChar = 0x57, "iget-char", Format22c, Field;
    IgetShort = 0x58, "iget-short", Format22c, Field;
    Iput = 0x59, "iput", Format22c, Field;
    IputWide = 0x5a, "iput-wide", Format22c, Field;
    IputObject = 0x5b, "iput-object", Format22c, Field;
    IputBoolean = 0x5c, "iput-boolean", Format22c, Field;
    IputByte = 0x5d, "iput-byte", Format22c, Field;
    IputChar = 0x5e, "iput-char", Format22c, Field;
    IputShort = 0x5f, "iput-short", Format22c, Field;
    Sget = 0x60, "sget", Format21c, Field;
    SgetWide = 0x61, "sget-wide", Format21c, Field;
    SgetObject = 0x62, "sget-object", Format21c, Field;
    SgetBoolean = 0x63, "sget-boolean", Format21c, Field;
    SgetByte = 0x64, "sget-byte", Format21c, Field;
    SgetChar = 0x65, "sget-char", Format21c, Field;
    SgetShort = 0x66, "sget-short", Format21c, Field;
    Sput = 0x67, "sput", Format21c, Field;
    SputWide = 0x68, "sput-wide", Format21c, Field;
    SputObject = 0x69, "sput-object", Format21c, Field;
    SputBoolean = 0x6a, "sput-boolean", Format21c, Field;
    SputByte = 0x6b, "sput-byte", Format21c, Field;
    SputChar = 0x6c, "sput-char", Format21c, Field;
    SputShort = 0x6d, "sput-short", Format21c, Field;
    InvokeVirtual = 0x6e, "invoke-virtual", Format35c, Method;
    InvokeSuper = 0x6f, "invoke-super", Format35c, Method;
    InvokeDirect = 0x70, "invoke-direct", Format35c, Method;
    InvokeStatic = 0x71, "invoke-static", Format35c, Method;
    InvokeInterface = 0x72, "invoke-interface", Format35c, Method;
    InvokeVirtualRange = 0x74, "invoke-virtual/range", Format3rc, Method;
    InvokeSuperRange = 0x75, "invoke-super/range", Format3rc, Method;
    InvokeDirectRange = 0x76, "invoke-direct/range", Format3rc, Method;
    InvokeStaticRange = 0x77, "invoke-static/range", Format3rc, Method;
    InvokeInterfaceRange = 0x78, "invoke-interface/range", Format3rc, Method;
    NegInt = 0x7b, "neg-int", Format12x, None;
    NotInt = 0x7c, "not-int", Format12x, None;
    NegLong = 0x7d, "neg-long", Format12x, None;
    NotLong = 0x7e, "not-long", Format12x, None;
    NegFloat = 0x7f, "neg-float", Format12x, None;
    NegDouble = 0x80, "neg-double", Format12x, None;
    IntToLong = 0x81, "int-to-long", Format12x, None;
    IntToFloat = 0x82, "int-to-float", Format12x, None;
    IntToDouble = 0x83, "int-to-double", Format12x, None;
    LongToInt = 0x84, "long-to-int", Format12x, None;
    LongToFloat = 0x85, "long-to-float", Format12x, None;
    LongToDouble = 0x86, "long-to-double", Format12x, None;
    FloatToInt = 0x87, "float-to-int", Format12x, None;
    FloatToLong = 0x88, "float-to-long", Format12x, None;
    FloatToDouble = 0x89, "float-to-double", Format12x, None;
    DoubleToInt = 0x8a, "double-to-int", Format12x, None;
    DoubleToLong = 0x8b, "double-to-long", Format12x, None;
    DoubleToFloat = 0x8c, "double-to-float", Format12x, None;
    IntToByte = 0x8d, "int-to-byte", Format12x, None;
    IntToChar = 0x8e, "int-to-char", Format12x, None;
    IntToShort = 0x8f, "int-to-short", Format12x, None;
    AddInt = 0x90, "add-int", Format23x, None;
    SubInt = 0x91, "sub-int", Format23x, None;
    MulInt = 0x92, "mul-int", Format23x, None;
    DivInt = 0x93, "div-int", Format23x, None;
    RemInt = 0x94, "rem-int", Format23x, None;
    AndInt = 0x95, "and-int", Format23x, None;
    OrInt = 0x96, "or-int", Format23x, None;
    XorInt = 0x97, "xor-int", Format23x, None;
    ShlInt = 0x98, "shl-int", Format23x, None;
    ShrInt = 0x99, "shr-int", Format23x, None;
    UshrInt = 0x9a, "ushr-int", Format23x, None;
    AddLong = 0x9b, "add-long", Format23x, None;
    SubLong = 0x9c, "sub-long", Format23x, None;
    MulLong = 0x9d, "mul-long", Format23x, None;
    DivLong = 0x9e, "div-long", Format23x, None;
    RemLong = 0x9f, "rem-long", Format23x, None;
    AndLong = 0xa0, "and-long", Format23x, None;
    OrLong = 0xa1, "or-long", Format23x, None;
    XorLong = 0xa2, "xor-long", Format23x, None;
    ShlLong = 0xa3, "shl-long", Format23x, None;
    ShrLong = 0xa4, "shr-long", Format23x, None;
    UshrLong = 0xa5, "ushr-long", Format23x, None;
    AddFloat = 0xa6, "add-float", Format23x, None;
    SubFloat = 0xa7, "sub-float", Format23x, None;
    MulFloat = 0xa8, "mul-float", Format23x, None;
    DivFloat = 0xa9, "div-float", Format23x, None;
    RemFloat = 0xaa, "rem-float", Format23x, None;
    AddDouble = 0xab, "add-double", Format23x, None;
    SubDouble = 0xac, "sub-double", Format23x, None;
    MulDouble = 0xad, "mul-double", Format23x, None;
    DivDouble = 0xae, "div-double", Format23x, None;
    RemDouble = 0xaf, "rem-double", Format23x, None;
    AddInt2Addr = 0xb0, "add-int/2addr", Format12x, None;
    SubInt2Addr = 0xb1, "sub-int/2addr", Format12x, None;
    MulInt2Addr = 0xb2, "mul-int/2addr", Format12x, None;
    DivInt2Addr = 0xb3, "div-int/2addr", Format12x, None;
    RemInt2Addr = 0xb4, "rem-int/2addr", Format12x, None;
    AndInt2Addr = 0xb5, "and-int/2addr", Format12x, None;
    OrInt2Addr = 0xb6, "or-int/2addr", Format12x, None;
    XorInt2Addr = 0xb7, "xor-int/2addr", Format12x, None;
    ShlInt2Addr = 0xb8, "shl-int/2addr", Format12x, None;
    ShrInt2Addr = 0xb9, "shr-int/2addr", Format12x, None;
    UshrInt2Addr = 0xba, "ushr-int/2addr", Format12x, None;
    AddLong2Addr = 0xbb, "add-long/2addr", Format12x, None;
    SubLong2Addr = 0xbc, "sub-long/2addr", Format12x, None;
    MulLong2Addr = 0xbd, "mul-long/2addr", Format12x, None;
    DivLong2Addr = 0xbe, "div-long/2addr", Format12x, None;
    RemLong2Addr = 0xbf, "rem-long/2addr", Format12x, None;
    AndLong2Addr = 0xc0, "and-long/2addr", Format12x, None;
    OrLong2Addr = 0xc1, "or-long/2addr", Format12x, None;
    XorLong2Addr = 0xc2, "xor-long/2addr", Format12x, None;
    ShlLong2Addr = 0xc3, "shl-long/2addr", Format12x, None;
    ShrLong2Addr = 0xc4, "shr-long/2addr", Format12x, None;
    UshrLong2Addr = 0xc5, "ushr-long/2addr", Format12x, None;
    AddFloat2Addr = 0xc6, "add-float/2addr", Format12x, None;
    SubFloat2Addr = 0xc7, "sub-float/2addr", Format12x, None;
    MulFloat2Addr = 0xc8, "mul-float/2addr", Format12x, None;
    DivFloat2Addr = 0xc9, "div-float/2addr", Format12x, None;
    RemFloat2Addr = 0xca, "rem-float/2addr", Format12x, None;
    AddDouble2Addr = 0xcb, "add-double/2addr", Format12x, None;
    SubDouble2Addr = 0xcc, "sub-double/2addr", Format12x, None;
    MulDouble2Addr = 0xcd, "mul-double/2addr", Format12x, None;
    DivDouble2Addr = 0xce, "div-double/2addr", Format12x, None;
    RemDouble2Addr = 0xcf, "rem-double/2addr", Format12x, None;
    AddIntLit16 = 0xd0, "add-int/lit16", Format22s, None;
    RsubInt = 0xd1, "rsub-int", Format22s, None;
    MulIntLit16 = 0xd2, "mul-int/lit16", Format22s, None;
    DivIntLit16 = 0xd3, "div-int/lit16", Format22s, None;
    RemIntLit16 = 0xd4, "rem-int/lit16", Format22s, None;
    AndIntLit16 = 0xd5, "and-int/lit16", Format22s, None;
    OrIntLit16 = 0xd6, "or-int/lit16", Format22s, None;
    XorIntLit16 = 0xd7, "xor-int/lit16", Format22s, None;
    AddIntLit8 = 0xd8, "add-int/lit8", Format22b, None;
    RsubIntLit8 = 0xd9, "rsub-int/lit8", Format22b, None;
    MulIntLit8 = 0xda, "mul-int/lit8", Format22b, None;
    DivIntLit8 = 0xdb, "div-int/lit8", Format22b, None;
    RemIntLit8 = 0xdc, "rem-int/lit8", Format22b, None;
    AndIntLit8 = 0xdd, "and-int/lit8", Format22b, None;
    OrIntLit8 = 0xde, "or-int/lit8", Format22b, None;
    XorIntLit8 = 0xdf, "xor-int/lit8", Format22b, None;
    ShlIntLit8 = 0xe0, "shl-int/lit8", Format22b, None;
    ShrIntLit8 = 0xe1, "shr-int/lit8", Format22b, None;
    UshrIntLit8 = 0xe2, "ushr-int/lit8", Format22b, None;
}

static BY_VALUE: Lazy<[Option<RCode>; 256]> = Lazy::new(|| {
    let mut table = [None; 256];
    for code in RCode::ALL {
        table[code.value() as usize] = Some(*code);
    }
    table
});

static BY_MNEMONIC: Lazy<HashMap<&'static str, RCode>> =
    Lazy::new(|| RCode::ALL.iter().map(|c| (c.mnemonic(), *c)).collect());

impl RCode {
    pub const fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<RCode> {
        BY_VALUE[value as usize]
    }

    pub fn from_mnemonic(name: &str) -> Option<RCode> {
        BY_MNEMONIC.get(name).copied()
    }

    pub fn is_invoke(self) -> bool {
        (RCode::InvokeVirtual.value()..=RCode::InvokeInterfaceRange.value()).contains(&self.value())
    }

    pub fn is_range_invoke(self) -> bool {
        self.is_invoke() && self.format() == Format::Format3rc
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self.format(),
            Format::Format10t | Format::Format20t | Format::Format30t | Format::Format21t | Format::Format22t
        )
    }

    /// Instructions that reference a payload table after the code.
    pub fn uses_payload(self) -> bool {
        matches!(self, RCode::FillArrayData | RCode::PackedSwitch | RCode::SparseSwitch)
    }

    /// The `/range` counterpart of a 35c invoke or filled-new-array.
    pub fn to_range(self) -> Option<RCode> {
        match self {
            RCode::InvokeVirtual => Some(RCode::InvokeVirtualRange),
            RCode::InvokeSuper => Some(RCode::InvokeSuperRange),
            RCode::InvokeDirect => Some(RCode::InvokeDirectRange),
            RCode::InvokeStatic => Some(RCode::InvokeStaticRange),
            RCode::InvokeInterface => Some(RCode::InvokeInterfaceRange),
            RCode::FilledNewArray => Some(RCode::FilledNewArrayRange),
            _ => None,
        }
    }
}

impl fmt::Display for RCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_value_and_name() {
        for code in RCode::ALL {
            assert_eq!(RCode::from_value(code.value()), Some(*code));
            assert_eq!(RCode::from_mnemonic(code.mnemonic()), Some(*code));
        }
        assert_eq!(RCode::from_value(0x3e), None);
        assert_eq!(RCode::from_value(0x73), None);
        assert_eq!(RCode::from_value(0xff), None);
        assert_eq!(RCode::from_mnemonic("aput-wide"), Some(RCode::AputWide));
    }

    #[test]
    fn formats_and_references() {
        assert_eq!(RCode::ConstWide.format().size(), 5);
        assert_eq!(RCode::Nop.format().size(), 1);
        assert_eq!(RCode::InvokeStaticRange.format(), Format::Format3rc);
        assert_eq!(RCode::SgetObject.reference_type(), ReferenceType::Field);
        assert_eq!(RCode::ConstString.reference_type(), ReferenceType::String);
        assert!(RCode::InvokeInterfaceRange.is_range_invoke());
        assert!(!RCode::InvokeInterface.is_range_invoke());
        assert!(RCode::IfLez.is_branch());
        assert_eq!(RCode::InvokeSuper.to_range(), Some(RCode::InvokeSuperRange));
    }

    #[test]
    fn opcode_count() {
        // 0x00..=0xe2 minus the unused 0x3e..=0x43, 0x73, 0x79 and 0x7a
        assert_eq!(RCode::ALL.len(), 0xe3 - 6 - 3);
    }
}
