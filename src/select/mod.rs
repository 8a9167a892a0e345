//! Opcode selection: picks the Dalvik opcode variant for an operation from
//! the register category of its operands.
//!
//! Every selector returns a `Result`; a type that does not fit the operation
//! is an UnsupportedType error, never a silently wrong opcode.

use serde::{Deserialize, Serialize};

use crate::classify::{DexCategory, NumericSlot, ScalarKind, TypeCategoryClassifier};
use crate::dex::error::DexError;
use crate::opcodes::RCode;

pub mod boxing;
pub mod compare;
pub mod invoke;

pub use boxing::BoxInfo;
pub use compare::{cmp_float_or_long, if_test, if_testz, CompareCode};
pub use invoke::{invoke_kind, invoke_opcode, requires_invoke_range, InvokeKind, InvokeSite, InvokeTraits};

/// Arithmetic and bitwise operation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    Neg,
    Not,
}

impl ArithmeticOp {
    pub const ALL: [ArithmeticOp; 13] = [
        ArithmeticOp::Add,
        ArithmeticOp::Sub,
        ArithmeticOp::Mul,
        ArithmeticOp::Div,
        ArithmeticOp::Rem,
        ArithmeticOp::And,
        ArithmeticOp::Or,
        ArithmeticOp::Xor,
        ArithmeticOp::Shl,
        ArithmeticOp::Shr,
        ArithmeticOp::UShr,
        ArithmeticOp::Neg,
        ArithmeticOp::Not,
    ];

    /// Whether float and double operands are accepted.
    pub fn supports_floating(self) -> bool {
        matches!(
            self,
            ArithmeticOp::Add | ArithmeticOp::Sub | ArithmeticOp::Mul | ArithmeticOp::Div | ArithmeticOp::Rem | ArithmeticOp::Neg
        )
    }

    pub fn is_unary(self) -> bool {
        matches!(self, ArithmeticOp::Neg | ArithmeticOp::Not)
    }
}

use RCode::*;

// Columns are int, long, float, double.
const ARITHMETIC: [[RCode; 4]; 13] = [
    [AddInt, AddLong, AddFloat, AddDouble],
    [SubInt, SubLong, SubFloat, SubDouble],
    [MulInt, MulLong, MulFloat, MulDouble],
    [DivInt, DivLong, DivFloat, DivDouble],
    [RemInt, RemLong, RemFloat, RemDouble],
    [AndInt, AndLong, Nop, Nop],
    [OrInt, OrLong, Nop, Nop],
    [XorInt, XorLong, Nop, Nop],
    [ShlInt, ShlLong, Nop, Nop],
    [ShrInt, ShrLong, Nop, Nop],
    [UshrInt, UshrLong, Nop, Nop],
    [NegInt, NegLong, NegFloat, NegDouble],
    [NotInt, NotLong, Nop, Nop],
];

const ARITHMETIC_2ADDR: [[RCode; 4]; 11] = [
    [AddInt2Addr, AddLong2Addr, AddFloat2Addr, AddDouble2Addr],
    [SubInt2Addr, SubLong2Addr, SubFloat2Addr, SubDouble2Addr],
    [MulInt2Addr, MulLong2Addr, MulFloat2Addr, MulDouble2Addr],
    [DivInt2Addr, DivLong2Addr, DivFloat2Addr, DivDouble2Addr],
    [RemInt2Addr, RemLong2Addr, RemFloat2Addr, RemDouble2Addr],
    [AndInt2Addr, AndLong2Addr, Nop, Nop],
    [OrInt2Addr, OrLong2Addr, Nop, Nop],
    [XorInt2Addr, XorLong2Addr, Nop, Nop],
    [ShlInt2Addr, ShlLong2Addr, Nop, Nop],
    [ShrInt2Addr, ShrLong2Addr, Nop, Nop],
    [UshrInt2Addr, UshrLong2Addr, Nop, Nop],
];

// Rows are the target slot, columns the source slot. Nop means no conversion.
const CONVERSIONS: [[RCode; 4]; 4] = [
    [Nop, LongToInt, FloatToInt, DoubleToInt],
    [IntToLong, Nop, FloatToLong, DoubleToLong],
    [IntToFloat, LongToFloat, Nop, DoubleToFloat],
    [IntToDouble, LongToDouble, FloatToDouble, Nop],
];

const CONSTS: [RCode; 4] = [Const, ConstWide, Const, ConstWide];

/// Array access codes of the IL `ldelem.*` / `stelem.*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementAccess {
    I1,
    U1,
    I2,
    U2,
    I,
    I4,
    U4,
    R4,
    I8,
    R8,
    Ref,
    Any,
}

/// Opcode selection over one classifier.
#[derive(Debug, Default, Clone)]
pub struct InstructionSelector<C> {
    classifier: C,
}

impl<C: TypeCategoryClassifier> InstructionSelector<C> {
    pub fn new(classifier: C) -> Self {
        InstructionSelector { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    fn slot(&self, ty: &C::Type) -> Result<NumericSlot, DexError> {
        self.classifier.numeric_slot(ty)
    }

    fn pick(table: &[RCode; 4], op: ArithmeticOp, slot: NumericSlot, ty: &C::Type) -> Result<RCode, DexError> {
        match table[slot.index()] {
            Nop => Err(DexError::unsupported_type(format!("{:?} is not defined for {} operands of type {}", op, slot_name(slot), ty))),
            code => Ok(code),
        }
    }

    /// Three-address (or unary) form of `op` for operands of type `ty`.
    pub fn arithmetic(&self, op: ArithmeticOp, ty: &C::Type) -> Result<RCode, DexError> {
        let slot = self.slot(ty)?;
        Self::pick(&ARITHMETIC[op as usize], op, slot, ty)
    }

    /// `/2addr` form of a binary `op`.
    pub fn arithmetic_2addr(&self, op: ArithmeticOp, ty: &C::Type) -> Result<RCode, DexError> {
        if op.is_unary() {
            return Err(DexError::unsupported_type(format!("{:?} has no 2addr form", op)));
        }
        let slot = self.slot(ty)?;
        Self::pick(&ARITHMETIC_2ADDR[op as usize], op, slot, ty)
    }

    /// Numeric conversion from `from` to the `to` slot; `Nop` when both share a slot.
    pub fn convert(&self, from: &C::Type, to: NumericSlot) -> Result<RCode, DexError> {
        Ok(CONVERSIONS[to.index()][self.slot(from)?.index()])
    }

    /// Truncation needed after an int result is stored as `ty`.
    pub fn narrowing_conversion(&self, ty: &C::Type) -> Result<RCode, DexError> {
        Ok(match self.classifier.category(ty)? {
            DexCategory::Byte => IntToByte,
            DexCategory::Char => IntToChar,
            DexCategory::Short => IntToShort,
            _ => Nop,
        })
    }

    pub fn const_for(&self, ty: &C::Type) -> Result<RCode, DexError> {
        Ok(CONSTS[self.slot(ty)?.index()])
    }

    pub fn move_op(&self, ty: &C::Type) -> Result<RCode, DexError> {
        self.move_family(ty, [MoveWide, MoveObject, Move], "move")
    }

    pub fn move_result(&self, ty: &C::Type) -> Result<RCode, DexError> {
        self.move_family(ty, [MoveResultWide, MoveResultObject, MoveResult], "move-result")
    }

    /// Return opcode for a method returning `ty`; void gives `return-void`.
    pub fn return_op(&self, ty: &C::Type) -> Result<RCode, DexError> {
        if self.classifier.is_void(ty)? {
            return Ok(ReturnVoid);
        }
        self.move_family(ty, [ReturnWide, ReturnObject, Return], "return")
    }

    fn move_family(&self, ty: &C::Type, [wide, object, value]: [RCode; 3], what: &str) -> Result<RCode, DexError> {
        if self.classifier.is_void(ty)? {
            return Err(DexError::unsupported_type(format!("unexpected void type in {}", what)));
        }
        let c = &self.classifier;
        if c.is_dex_wide(ty)? {
            Ok(wide)
        } else if c.is_dex_object(ty)? {
            Ok(object)
        } else {
            Ok(value)
        }
    }

    fn array_element(&self, array: &C::Type) -> Result<C::Type, DexError> {
        self.classifier
            .element_type(array)
            .map_err(|e| err!(e, "array access on {}", array))
    }

    // boolean, byte, char, short, value, wide, object
    fn array_ladder(&self, element: &C::Type, codes: [RCode; 7], array: &C::Type) -> Result<RCode, DexError> {
        let c = &self.classifier;
        if c.is_void(element)? {
            return Err(DexError::unsupported_type(format!("unknown element type for array access on {}", array)));
        }
        let code = match c.category(element)? {
            DexCategory::Boolean => codes[0],
            DexCategory::Byte => codes[1],
            DexCategory::Char => codes[2],
            DexCategory::Short => codes[3],
            DexCategory::Int | DexCategory::Float => codes[4],
            DexCategory::Long | DexCategory::Double => codes[5],
            DexCategory::Object => codes[6],
        };
        Ok(code)
    }

    pub fn aget(&self, array: &C::Type) -> Result<RCode, DexError> {
        let element = self.array_element(array)?;
        self.array_ladder(&element, [AgetBoolean, AgetByte, AgetChar, AgetShort, Aget, AgetWide, AgetObject], array)
    }

    pub fn aput(&self, array: &C::Type) -> Result<RCode, DexError> {
        let element = self.array_element(array)?;
        self.array_ladder(&element, [AputBoolean, AputByte, AputChar, AputShort, Aput, AputWide, AputObject], array)
    }

    fn is_short_kind(&self, element: &C::Type) -> Result<bool, DexError> {
        Ok(matches!(self.classifier.scalar_kind(element)?, Some(ScalarKind::Short | ScalarKind::UShort)))
    }

    /// `aget` variant for an IL `ldelem.*` code.
    pub fn aget_element(&self, access: ElementAccess, array: &C::Type) -> Result<RCode, DexError> {
        let element = self.array_element(array)?;
        Ok(match access {
            ElementAccess::I1 | ElementAccess::U1 => {
                if self.classifier.is_dex_boolean(&element)? {
                    AgetBoolean
                } else {
                    AgetByte
                }
            }
            ElementAccess::I2 | ElementAccess::U2 => {
                if self.is_short_kind(&element)? {
                    AgetShort
                } else {
                    AgetChar
                }
            }
            ElementAccess::I | ElementAccess::I4 | ElementAccess::R4 | ElementAccess::U4 => Aget,
            ElementAccess::I8 | ElementAccess::R8 => AgetWide,
            ElementAccess::Ref | ElementAccess::Any => return self.aget(array),
        })
    }

    /// `aput` variant for an IL `stelem.*` code.
    pub fn aput_element(&self, access: ElementAccess, array: &C::Type) -> Result<RCode, DexError> {
        let element = self.array_element(array)?;
        Ok(match access {
            ElementAccess::I1 => {
                if self.classifier.is_dex_boolean(&element)? {
                    AputBoolean
                } else {
                    AputByte
                }
            }
            ElementAccess::I2 => {
                if self.is_short_kind(&element)? {
                    AputShort
                } else {
                    AputChar
                }
            }
            ElementAccess::I | ElementAccess::I4 | ElementAccess::R4 => Aput,
            ElementAccess::I8 | ElementAccess::R8 => AputWide,
            ElementAccess::Ref | ElementAccess::Any => return self.aput(array),
            ElementAccess::U1 | ElementAccess::U2 | ElementAccess::U4 => {
                return Err(DexError::unsupported_type(format!("no array store for {:?}", access)))
            }
        })
    }

    /// Truncation to apply to a constant before storing it into `array`.
    pub fn aconst_convert_before_put(&self, array: &C::Type) -> Result<RCode, DexError> {
        let element = self.array_element(array)?;
        self.narrowing_conversion(&element)
    }

    // wide, boolean, char, short, byte, value, object
    fn field_ladder(&self, ty: &C::Type, codes: [RCode; 7], what: &str) -> Result<RCode, DexError> {
        let c = &self.classifier;
        if c.is_void(ty)? {
            return Err(DexError::unsupported_type(format!("unexpected void type in {}", what)));
        }
        Ok(match c.category(ty)? {
            DexCategory::Long | DexCategory::Double => codes[0],
            DexCategory::Boolean => codes[1],
            DexCategory::Char => codes[2],
            DexCategory::Short => codes[3],
            DexCategory::Byte => codes[4],
            DexCategory::Int | DexCategory::Float => codes[5],
            DexCategory::Object => codes[6],
        })
    }

    pub fn iget(&self, field_type: &C::Type) -> Result<RCode, DexError> {
        self.field_ladder(field_type, [IgetWide, IgetBoolean, IgetChar, IgetShort, IgetByte, Iget, IgetObject], "iget")
    }

    pub fn iput(&self, field_type: &C::Type) -> Result<RCode, DexError> {
        self.field_ladder(field_type, [IputWide, IputBoolean, IputChar, IputShort, IputByte, Iput, IputObject], "iput")
    }

    pub fn sget(&self, field_type: &C::Type) -> Result<RCode, DexError> {
        self.field_ladder(field_type, [SgetWide, SgetBoolean, SgetChar, SgetShort, SgetByte, Sget, SgetObject], "sget")
    }

    pub fn sput(&self, field_type: &C::Type) -> Result<RCode, DexError> {
        self.field_ladder(field_type, [SputWide, SputBoolean, SputChar, SputShort, SputByte, Sput, SputObject], "sput")
    }

    /// Comparison producing an int from two long, float or double operands.
    pub fn cmp(&self, code: CompareCode, operand: &C::Type) -> Result<RCode, DexError> {
        let slot = self.slot(operand)?;
        cmp_float_or_long(code, slot)
    }

    /// Whether an array initializer of type `array` can be emitted as `fill-array-data`.
    pub fn is_supported_by_fill_array_data(&self, array: &C::Type) -> Result<bool, DexError> {
        let element = self.array_element(array)?;
        if self.classifier.element_type(&element).is_ok() {
            return Ok(false);
        }
        Ok(matches!(
            self.classifier.scalar_kind(&element)?,
            Some(ScalarKind::SByte | ScalarKind::Short | ScalarKind::Int | ScalarKind::Long)
        ))
    }
}

fn slot_name(slot: NumericSlot) -> &'static str {
    match slot {
        NumericSlot::Int => "int",
        NumericSlot::Long => "long",
        NumericSlot::Float => "float",
        NumericSlot::Double => "double",
    }
}
