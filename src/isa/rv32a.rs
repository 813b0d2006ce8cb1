//! RV32A 扩展（原子操作）解码表
//!
//! ```text
//! 31   27 26 25 24  20 19  15 14  12 11  7 6      0
//! funct5  aq rl  rs2    rs1   funct3  rd   opcode
//! ```
//! 仅 funct3 = 010（字）合法；LR.W 的 rs2 必须为 0。

use crate::isa::fields::*;
use crate::isa::instr::{AmoOp, RvInstr};
use crate::isa::instr_def::{InstrDef, TableDrivenDecoder};

/// funct5 + funct3 + opcode，忽略 aq/rl
const AMO_MASK: u32 = 0xF800_707F;
/// LR.W 额外检查 rs2
const LR_MASK: u32 = AMO_MASK | (0x1F << 20);

#[inline]
const fn amo_match(funct5: u32) -> u32 {
    (funct5 << 27) | (0b010 << 12) | OP_AMO
}

#[inline]
fn amo(op: AmoOp, raw: u32) -> RvInstr {
    RvInstr::Amo {
        op,
        rd: rd(raw),
        rs1: rs1(raw),
        rs2: rs2(raw),
        aq: (raw >> 26) & 1 != 0,
        rl: (raw >> 25) & 1 != 0,
    }
}

pub static RV32A_INSTRS: &[InstrDef] = &[
    InstrDef::new("LR.W", LR_MASK, amo_match(0b00010), |raw| amo(AmoOp::Lr, raw)),
    InstrDef::new("SC.W", AMO_MASK, amo_match(0b00011), |raw| amo(AmoOp::Sc, raw)),
    InstrDef::new("AMOSWAP.W", AMO_MASK, amo_match(0b00001), |raw| amo(AmoOp::Swap, raw)),
    InstrDef::new("AMOADD.W", AMO_MASK, amo_match(0b00000), |raw| amo(AmoOp::Add, raw)),
    InstrDef::new("AMOXOR.W", AMO_MASK, amo_match(0b00100), |raw| amo(AmoOp::Xor, raw)),
    InstrDef::new("AMOAND.W", AMO_MASK, amo_match(0b01100), |raw| amo(AmoOp::And, raw)),
    InstrDef::new("AMOOR.W", AMO_MASK, amo_match(0b01000), |raw| amo(AmoOp::Or, raw)),
    InstrDef::new("AMOMIN.W", AMO_MASK, amo_match(0b10000), |raw| amo(AmoOp::Min, raw)),
    InstrDef::new("AMOMAX.W", AMO_MASK, amo_match(0b10100), |raw| amo(AmoOp::Max, raw)),
    InstrDef::new("AMOMINU.W", AMO_MASK, amo_match(0b11000), |raw| amo(AmoOp::Minu, raw)),
    InstrDef::new("AMOMAXU.W", AMO_MASK, amo_match(0b11100), |raw| amo(AmoOp::Maxu, raw)),
];

pub static RV32A_OPCODES: [u32; 1] = [OP_AMO];

pub static RV32A_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RV32A", RV32A_INSTRS, Some(&RV32A_OPCODES), false);
