//! Relational and branch codes of the IL front end, mapped onto the
//! two-register `if-*` and zero-compare `if-*z` families.

use serde::{Deserialize, Serialize};

use crate::classify::NumericSlot;
use crate::dex::error::DexError;
use crate::opcodes::RCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareCode {
    Ceq,
    Cne,
    Clt,
    CltUn,
    Cle,
    CleUn,
    Cgt,
    CgtUn,
    Cge,
    CgeUn,
    Beq,
    BneUn,
    Blt,
    BltUn,
    Ble,
    BleUn,
    Bgt,
    BgtUn,
    Bge,
    BgeUn,
    CIsNull,
    CIsNotNull,
    BrTrue,
    BrFalse,
    BrIfEq,
    BrIfNe,
    BrIfLt,
    BrIfLe,
    BrIfGt,
    BrIfGe,
    CmpLong,
    CmpLFloat,
    CmpGFloat,
}

impl CompareCode {
    pub const ALL: [CompareCode; 33] = [
        CompareCode::Ceq,
        CompareCode::Cne,
        CompareCode::Clt,
        CompareCode::CltUn,
        CompareCode::Cle,
        CompareCode::CleUn,
        CompareCode::Cgt,
        CompareCode::CgtUn,
        CompareCode::Cge,
        CompareCode::CgeUn,
        CompareCode::Beq,
        CompareCode::BneUn,
        CompareCode::Blt,
        CompareCode::BltUn,
        CompareCode::Ble,
        CompareCode::BleUn,
        CompareCode::Bgt,
        CompareCode::BgtUn,
        CompareCode::Bge,
        CompareCode::BgeUn,
        CompareCode::CIsNull,
        CompareCode::CIsNotNull,
        CompareCode::BrTrue,
        CompareCode::BrFalse,
        CompareCode::BrIfEq,
        CompareCode::BrIfNe,
        CompareCode::BrIfLt,
        CompareCode::BrIfLe,
        CompareCode::BrIfGt,
        CompareCode::BrIfGe,
        CompareCode::CmpLong,
        CompareCode::CmpLFloat,
        CompareCode::CmpGFloat,
    ];
}

#[derive(Clone, Copy)]
enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// Unsigned variants share the signed relation.
fn relation(code: CompareCode) -> Option<Relation> {
    use CompareCode::*;
    Some(match code {
        Ceq | Beq => Relation::Eq,
        Cne | BneUn => Relation::Ne,
        Clt | CltUn | Blt | BltUn => Relation::Lt,
        Cle | CleUn | Ble | BleUn => Relation::Le,
        Cgt | CgtUn | Bgt | BgtUn => Relation::Gt,
        Cge | CgeUn | Bge | BgeUn => Relation::Ge,
        _ => return None,
    })
}

/// Two-register branch for `code`.
pub fn if_test(code: CompareCode) -> Result<RCode, DexError> {
    match relation(code) {
        Some(Relation::Eq) => Ok(RCode::IfEq),
        Some(Relation::Ne) => Ok(RCode::IfNe),
        Some(Relation::Lt) => Ok(RCode::IfLt),
        Some(Relation::Le) => Ok(RCode::IfLe),
        Some(Relation::Gt) => Ok(RCode::IfGt),
        Some(Relation::Ge) => Ok(RCode::IfGe),
        None => Err(DexError::unsupported_type(format!("no if-test for {:?}", code))),
    }
}

/// Branch comparing one register against zero or null.
pub fn if_testz(code: CompareCode) -> Result<RCode, DexError> {
    let relation = match code {
        CompareCode::CIsNull | CompareCode::BrFalse | CompareCode::BrIfEq => Relation::Eq,
        CompareCode::CIsNotNull | CompareCode::BrTrue | CompareCode::BrIfNe => Relation::Ne,
        CompareCode::BrIfLt => Relation::Lt,
        CompareCode::BrIfLe => Relation::Le,
        CompareCode::BrIfGt => Relation::Gt,
        CompareCode::BrIfGe => Relation::Ge,
        _ => relation(code).ok_or_else(|| DexError::unsupported_type(format!("no if-testz for {:?}", code)))?,
    };
    Ok(match relation {
        Relation::Eq => RCode::IfEqz,
        Relation::Ne => RCode::IfNez,
        Relation::Lt => RCode::IfLtz,
        Relation::Le => RCode::IfLez,
        Relation::Gt => RCode::IfGtz,
        Relation::Ge => RCode::IfGez,
    })
}

/// `cmp*` opcode for a long or floating comparison code.
pub fn cmp_float_or_long(code: CompareCode, operand: NumericSlot) -> Result<RCode, DexError> {
    match (code, operand) {
        (CompareCode::CmpLong, NumericSlot::Long) => Ok(RCode::CmpLong),
        (CompareCode::CmpGFloat, NumericSlot::Float) => Ok(RCode::CmpgFloat),
        (CompareCode::CmpGFloat, NumericSlot::Double) => Ok(RCode::CmpgDouble),
        (CompareCode::CmpLFloat, NumericSlot::Float) => Ok(RCode::CmplFloat),
        (CompareCode::CmpLFloat, NumericSlot::Double) => Ok(RCode::CmplDouble),
        _ => Err(DexError::unsupported_type(format!("no cmp opcode for {:?} on {:?} operands", code, operand))),
    }
}
