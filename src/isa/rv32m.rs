//! RV32M 扩展（乘除法）解码表
//!
//! 与 RV32I 共用 OP opcode，以 funct7 = 0b0000001 区分

use crate::isa::fields::*;
use crate::isa::instr::{MulOp, RvInstr};
use crate::isa::instr_def::{r_match, InstrDef, TableDrivenDecoder, R_TYPE_MASK};

const MULDIV: u32 = 0b0000001;

#[inline]
fn mul(op: MulOp, raw: u32) -> RvInstr {
    RvInstr::Mul {
        op,
        rd: rd(raw),
        rs1: rs1(raw),
        rs2: rs2(raw),
    }
}

pub static RV32M_INSTRS: &[InstrDef] = &[
    InstrDef::new("MUL", R_TYPE_MASK, r_match(MULDIV, 0b000, OP_REG), |raw| mul(MulOp::Mul, raw)),
    InstrDef::new("MULH", R_TYPE_MASK, r_match(MULDIV, 0b001, OP_REG), |raw| mul(MulOp::Mulh, raw)),
    InstrDef::new("MULHSU", R_TYPE_MASK, r_match(MULDIV, 0b010, OP_REG), |raw| mul(MulOp::Mulhsu, raw)),
    InstrDef::new("MULHU", R_TYPE_MASK, r_match(MULDIV, 0b011, OP_REG), |raw| mul(MulOp::Mulhu, raw)),
    InstrDef::new("DIV", R_TYPE_MASK, r_match(MULDIV, 0b100, OP_REG), |raw| mul(MulOp::Div, raw)),
    InstrDef::new("DIVU", R_TYPE_MASK, r_match(MULDIV, 0b101, OP_REG), |raw| mul(MulOp::Divu, raw)),
    InstrDef::new("REM", R_TYPE_MASK, r_match(MULDIV, 0b110, OP_REG), |raw| mul(MulOp::Rem, raw)),
    InstrDef::new("REMU", R_TYPE_MASK, r_match(MULDIV, 0b111, OP_REG), |raw| mul(MulOp::Remu, raw)),
];

pub static RV32M_OPCODES: [u32; 1] = [OP_REG];

pub static RV32M_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RV32M", RV32M_INSTRS, Some(&RV32M_OPCODES), true);
