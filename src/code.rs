//! Method bodies and the Dalvik instruction encoding.

use crate::dex::error::DexError;
use crate::dex::{IndexResolver, ReferenceTable};
use crate::members::{FieldReference, MethodReference};
use crate::opcodes::{Format, RCode, ReferenceType};
use crate::types::TypeReference;

const PACKED_SWITCH_IDENT: u16 = 0x0100;
const SPARSE_SWITCH_IDENT: u16 = 0x0200;
const ARRAY_DATA_IDENT: u16 = 0x0300;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    /// Sign-extended literal; for the high16 forms the full shifted value.
    Literal(i64),
    /// Branch or payload target relative to the instruction, in code units.
    Offset(i32),
    String(String),
    Type(TypeReference),
    Field(FieldReference),
    Method(MethodReference),
    /// Raw switch or fill-array-data table, ident unit included.
    Payload(Vec<u16>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: RCode,
    pub registers: Vec<u16>,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: RCode, registers: Vec<u16>, operand: Operand) -> Self {
        Instruction { opcode, registers, operand }
    }

    pub fn simple(opcode: RCode, registers: &[u16]) -> Self {
        Instruction::new(opcode, registers.to_vec(), Operand::None)
    }

    pub fn payload(units: Vec<u16>) -> Self {
        Instruction::new(RCode::Nop, vec![], Operand::Payload(units))
    }

    /// Size in code units.
    pub fn size(&self) -> usize {
        match &self.operand {
            Operand::Payload(units) => units.len(),
            _ => self.opcode.format().size(),
        }
    }

    fn registers_exact<const N: usize>(&self) -> Result<[u16; N], DexError> {
        <[u16; N]>::try_from(self.registers.as_slice()).map_err(|_| {
            err!("{} takes {} registers, got {}", self.opcode, N, self.registers.len())
        })
    }

    fn literal_in(&self, min: i64, max: i64) -> Result<i64, DexError> {
        match self.operand {
            Operand::Literal(v) if v >= min && v <= max => Ok(v),
            Operand::Literal(v) => fail!("literal {} out of range for {}", v, self.opcode),
            _ => fail!("{} requires a literal operand", self.opcode),
        }
    }

    fn offset_in(&self, min: i32, max: i32) -> Result<i32, DexError> {
        match self.operand {
            Operand::Offset(v) if v >= min && v <= max => Ok(v),
            Operand::Offset(v) => fail!("branch offset {} out of range for {}", v, self.opcode),
            _ => fail!("{} requires a branch offset", self.opcode),
        }
    }

    fn reference_index(&self, resolver: &dyn IndexResolver) -> Result<u32, DexError> {
        match (self.opcode.reference_type(), &self.operand) {
            (ReferenceType::String, Operand::String(s)) => resolver.string_index(s),
            (ReferenceType::Type, Operand::Type(t)) => resolver.type_index(t),
            (ReferenceType::Field, Operand::Field(f)) => resolver.field_index(f),
            (ReferenceType::Method, Operand::Method(m)) => resolver.method_index(m),
            (kind, operand) => fail!("{} expects a {:?} reference, got {:?}", self.opcode, kind, operand),
        }
    }

    fn reference_index16(&self, resolver: &dyn IndexResolver) -> Result<u16, DexError> {
        let idx = self.reference_index(resolver)?;
        u16::try_from(idx).map_err(|_| err!("index {} does not fit {}", idx, self.opcode))
    }

    pub(crate) fn encode(&self, resolver: &dyn IndexResolver, out: &mut Vec<u16>) -> Result<(), DexError> {
        if let Operand::Payload(units) = &self.operand {
            if !self.opcode.uses_payload() && self.opcode != RCode::Nop {
                fail!("payload attached to {}", self.opcode);
            }
            out.extend_from_slice(units);
            return Ok(());
        }

        let op = self.opcode.value() as u16;
        match self.opcode.format() {
            Format::Format10x => {
                self.registers_exact::<0>()?;
                out.push(op);
            }
            Format::Format12x => {
                let [a, b] = self.registers_exact()?;
                out.push(op | nibble(a)? << 8 | nibble(b)? << 12);
            }
            Format::Format11n => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(-8, 7)?;
                out.push(op | nibble(a)? << 8 | ((lit as u16) & 0xf) << 12);
            }
            Format::Format11x => {
                let [a] = self.registers_exact()?;
                out.push(op | byte(a)? << 8);
            }
            Format::Format10t => {
                self.registers_exact::<0>()?;
                let off = self.offset_in(i8::MIN as i32, i8::MAX as i32)?;
                out.push(op | ((off as i8 as u8) as u16) << 8);
            }
            Format::Format20t => {
                self.registers_exact::<0>()?;
                let off = self.offset_in(i16::MIN as i32, i16::MAX as i32)?;
                out.extend_from_slice(&[op, off as i16 as u16]);
            }
            Format::Format22x => {
                let [a, b] = self.registers_exact()?;
                out.extend_from_slice(&[op | byte(a)? << 8, b]);
            }
            Format::Format21t => {
                let [a] = self.registers_exact()?;
                let off = self.offset_in(i16::MIN as i32, i16::MAX as i32)?;
                out.extend_from_slice(&[op | byte(a)? << 8, off as i16 as u16]);
            }
            Format::Format21s => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(i16::MIN as i64, i16::MAX as i64)?;
                out.extend_from_slice(&[op | byte(a)? << 8, lit as i16 as u16]);
            }
            Format::Format21ih => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(i32::MIN as i64, i32::MAX as i64)?;
                if lit & 0xffff != 0 {
                    fail!("literal {:#x} has low bits set for {}", lit, self.opcode);
                }
                out.extend_from_slice(&[op | byte(a)? << 8, ((lit as i32 as u32) >> 16) as u16]);
            }
            Format::Format21lh => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(i64::MIN, i64::MAX)?;
                if lit & 0xffff_ffff_ffff != 0 {
                    fail!("literal {:#x} has low bits set for {}", lit, self.opcode);
                }
                out.extend_from_slice(&[op | byte(a)? << 8, ((lit as u64) >> 48) as u16]);
            }
            Format::Format21c => {
                let [a] = self.registers_exact()?;
                let idx = self.reference_index16(resolver)?;
                out.extend_from_slice(&[op | byte(a)? << 8, idx]);
            }
            Format::Format23x => {
                let [a, b, c] = self.registers_exact()?;
                out.extend_from_slice(&[op | byte(a)? << 8, byte(b)? | byte(c)? << 8]);
            }
            Format::Format22b => {
                let [a, b] = self.registers_exact()?;
                let lit = self.literal_in(i8::MIN as i64, i8::MAX as i64)?;
                out.extend_from_slice(&[op | byte(a)? << 8, byte(b)? | ((lit as i8 as u8) as u16) << 8]);
            }
            Format::Format22t => {
                let [a, b] = self.registers_exact()?;
                let off = self.offset_in(i16::MIN as i32, i16::MAX as i32)?;
                out.extend_from_slice(&[op | nibble(a)? << 8 | nibble(b)? << 12, off as i16 as u16]);
            }
            Format::Format22s => {
                let [a, b] = self.registers_exact()?;
                let lit = self.literal_in(i16::MIN as i64, i16::MAX as i64)?;
                out.extend_from_slice(&[op | nibble(a)? << 8 | nibble(b)? << 12, lit as i16 as u16]);
            }
            Format::Format22c => {
                let [a, b] = self.registers_exact()?;
                let idx = self.reference_index16(resolver)?;
                out.extend_from_slice(&[op | nibble(a)? << 8 | nibble(b)? << 12, idx]);
            }
            Format::Format30t => {
                self.registers_exact::<0>()?;
                let off = self.offset_in(i32::MIN, i32::MAX)? as u32;
                out.extend_from_slice(&[op, off as u16, (off >> 16) as u16]);
            }
            Format::Format32x => {
                let [a, b] = self.registers_exact()?;
                out.extend_from_slice(&[op, a, b]);
            }
            Format::Format31i => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(i32::MIN as i64, i32::MAX as i64)? as i32 as u32;
                out.extend_from_slice(&[op | byte(a)? << 8, lit as u16, (lit >> 16) as u16]);
            }
            Format::Format31t => {
                let [a] = self.registers_exact()?;
                let off = self.offset_in(i32::MIN, i32::MAX)? as u32;
                out.extend_from_slice(&[op | byte(a)? << 8, off as u16, (off >> 16) as u16]);
            }
            Format::Format31c => {
                let [a] = self.registers_exact()?;
                let idx = self.reference_index(resolver)?;
                out.extend_from_slice(&[op | byte(a)? << 8, idx as u16, (idx >> 16) as u16]);
            }
            Format::Format35c => {
                if self.registers.len() > 5 {
                    fail!("{} takes at most 5 registers, got {}", self.opcode, self.registers.len());
                }
                let mut regs = [0u16; 5];
                for (slot, r) in regs.iter_mut().zip(&self.registers) {
                    *slot = nibble(*r)?;
                }
                let count = self.registers.len() as u16;
                let idx = self.reference_index16(resolver)?;
                out.extend_from_slice(&[
                    op | regs[4] << 8 | count << 12,
                    idx,
                    regs[0] | regs[1] << 4 | regs[2] << 8 | regs[3] << 12,
                ]);
            }
            Format::Format3rc => {
                let count = self.registers.len();
                if count > 0xff {
                    fail!("{} takes at most 255 registers, got {}", self.opcode, count);
                }
                let first = self.registers.first().copied().unwrap_or(0);
                for (i, r) in self.registers.iter().enumerate() {
                    if *r as usize != first as usize + i {
                        fail!("{} needs contiguous registers, got {:?}", self.opcode, self.registers);
                    }
                }
                let idx = self.reference_index16(resolver)?;
                out.extend_from_slice(&[op | (count as u16) << 8, idx, first]);
            }
            Format::Format51l => {
                let [a] = self.registers_exact()?;
                let lit = self.literal_in(i64::MIN, i64::MAX)? as u64;
                out.extend_from_slice(&[
                    op | byte(a)? << 8,
                    lit as u16,
                    (lit >> 16) as u16,
                    (lit >> 32) as u16,
                    (lit >> 48) as u16,
                ]);
            }
        }
        Ok(())
    }
}

fn nibble(reg: u16) -> Result<u16, DexError> {
    if reg > 0xf {
        fail!("register v{} does not fit in 4 bits", reg);
    }
    Ok(reg)
}

fn byte(reg: u16) -> Result<u16, DexError> {
    if reg > 0xff {
        fail!("register v{} does not fit in 8 bits", reg);
    }
    Ok(reg)
}

/// Code units taken by the payload starting at `units[0]`.
fn payload_size(units: &[u16]) -> Result<usize, DexError> {
    let header = |n: usize| -> Result<&[u16], DexError> {
        units.get(..n).ok_or_else(|| err!("truncated payload header"))
    };
    let size = match units[0] {
        PACKED_SWITCH_IDENT => {
            let h = header(2)?;
            4 + h[1] as usize * 2
        }
        SPARSE_SWITCH_IDENT => {
            let h = header(2)?;
            2 + h[1] as usize * 4
        }
        ARRAY_DATA_IDENT => {
            let h = header(4)?;
            let width = h[1] as usize;
            let count = h[2] as usize | (h[3] as usize) << 16;
            4 + (width * count + 1) / 2
        }
        other => fail!("unknown payload ident {:#06x}", other),
    };
    if size > units.len() {
        fail!("payload of {} code units overruns the method body", size);
    }
    Ok(size)
}

fn decode_reference(opcode: RCode, idx: u32, table: &dyn ReferenceTable) -> Result<Operand, DexError> {
    Ok(match opcode.reference_type() {
        ReferenceType::String => Operand::String(table.string(idx)?),
        ReferenceType::Type => Operand::Type(table.type_ref(idx)?),
        ReferenceType::Field => Operand::Field(table.field(idx)?),
        ReferenceType::Method => Operand::Method(table.method(idx)?),
        ReferenceType::None => fail!("{} carries no reference", opcode),
    })
}

fn decode_one(opcode: RCode, u: &[u16], table: &dyn ReferenceTable) -> Result<Instruction, DexError> {
    let a8 = u[0] >> 8;
    let a4 = (u[0] >> 8) & 0xf;
    let b4 = u[0] >> 12;
    let (registers, operand) = match opcode.format() {
        Format::Format10x => (vec![], Operand::None),
        Format::Format12x => (vec![a4, b4], Operand::None),
        Format::Format11n => (vec![a4], Operand::Literal(((u[0] as i16) >> 12) as i64)),
        Format::Format11x => (vec![a8], Operand::None),
        Format::Format10t => (vec![], Operand::Offset(a8 as u8 as i8 as i32)),
        Format::Format20t => (vec![], Operand::Offset(u[1] as i16 as i32)),
        Format::Format22x => (vec![a8, u[1]], Operand::None),
        Format::Format21t => (vec![a8], Operand::Offset(u[1] as i16 as i32)),
        Format::Format21s => (vec![a8], Operand::Literal(u[1] as i16 as i64)),
        Format::Format21ih => (vec![a8], Operand::Literal(((u[1] as u32) << 16) as i32 as i64)),
        Format::Format21lh => (vec![a8], Operand::Literal(((u[1] as u64) << 48) as i64)),
        Format::Format21c => (vec![a8], decode_reference(opcode, u[1] as u32, table)?),
        Format::Format23x => (vec![a8, u[1] & 0xff, u[1] >> 8], Operand::None),
        Format::Format22b => (vec![a8, u[1] & 0xff], Operand::Literal((u[1] >> 8) as u8 as i8 as i64)),
        Format::Format22t => (vec![a4, b4], Operand::Offset(u[1] as i16 as i32)),
        Format::Format22s => (vec![a4, b4], Operand::Literal(u[1] as i16 as i64)),
        Format::Format22c => (vec![a4, b4], decode_reference(opcode, u[1] as u32, table)?),
        Format::Format30t => (vec![], Operand::Offset((u[1] as u32 | (u[2] as u32) << 16) as i32)),
        Format::Format32x => (vec![u[1], u[2]], Operand::None),
        Format::Format31i => (vec![a8], Operand::Literal((u[1] as u32 | (u[2] as u32) << 16) as i32 as i64)),
        Format::Format31t => (vec![a8], Operand::Offset((u[1] as u32 | (u[2] as u32) << 16) as i32)),
        Format::Format31c => (vec![a8], decode_reference(opcode, u[1] as u32 | (u[2] as u32) << 16, table)?),
        Format::Format35c => {
            let count = (u[0] >> 12) as usize;
            if count > 5 {
                fail!("{} with {} registers", opcode, count);
            }
            let all = [u[2] & 0xf, (u[2] >> 4) & 0xf, (u[2] >> 8) & 0xf, u[2] >> 12, a4];
            (all[..count].to_vec(), decode_reference(opcode, u[1] as u32, table)?)
        }
        Format::Format3rc => {
            if u[2] as u32 + a8 as u32 > 0x10000 {
                fail!("{} register range v{} +{} overflows", opcode, u[2], a8);
            }
            let registers = (0..a8).map(|i| u[2] + i).collect();
            (registers, decode_reference(opcode, u[1] as u32, table)?)
        }
        Format::Format51l => {
            let lit = u[1] as u64 | (u[2] as u64) << 16 | (u[3] as u64) << 32 | (u[4] as u64) << 48;
            (vec![a8], Operand::Literal(lit as i64))
        }
    };
    Ok(Instruction { opcode, registers, operand })
}

pub(crate) fn decode_instructions(units: &[u16], table: &dyn ReferenceTable) -> Result<Vec<Instruction>, DexError> {
    let mut instructions = vec![];
    let mut ix = 0;
    while ix < units.len() {
        let unit = units[ix];
        if unit & 0xff == 0 && unit != 0 {
            let size = payload_size(&units[ix..])?;
            instructions.push(Instruction::payload(units[ix..ix + size].to_vec()));
            ix += size;
            continue;
        }
        let opcode = RCode::from_value((unit & 0xff) as u8)
            .ok_or_else(|| err!("unknown opcode {:#04x} at code unit {}", unit & 0xff, ix))?;
        let size = opcode.format().size();
        let Some(window) = units.get(ix..ix + size) else {
            fail!("truncated {} at code unit {}", opcode, ix);
        };
        let insn = decode_one(opcode, window, table).map_err(|e| err!(e, "code unit {}", ix))?;
        instructions.push(insn);
        ix += size;
    }
    Ok(instructions)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchHandler {
    pub exception: TypeReference,
    pub address: u32,
}

/// A protected range of code units with its handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct TryBlock {
    pub start_address: u32,
    pub instruction_count: u16,
    pub handlers: Vec<CatchHandler>,
    pub catch_all: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub instructions: Vec<Instruction>,
    pub tries: Vec<TryBlock>,
}

impl MethodBody {
    pub fn new(registers_size: u16, ins_size: u16, outs_size: u16) -> Self {
        MethodBody { registers_size, ins_size, outs_size, instructions: vec![], tries: vec![] }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Total length in code units.
    pub fn code_units(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }

    pub(crate) fn encode(&self, resolver: &dyn IndexResolver) -> Result<Vec<u16>, DexError> {
        let mut units = Vec::with_capacity(self.code_units());
        for (i, insn) in self.instructions.iter().enumerate() {
            // payloads must be 4-byte aligned
            if matches!(insn.operand, Operand::Payload(_)) && units.len() % 2 != 0 {
                fail!("payload of instruction {} starts at odd code unit {}", i, units.len());
            }
            insn.encode(resolver, &mut units).map_err(|e| err!(e, "instruction {}", i))?;
        }
        Ok(units)
    }
}
