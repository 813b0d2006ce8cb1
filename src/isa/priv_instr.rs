//! 特权指令解码表：MRET / SRET / WFI / SFENCE.VMA
//!
//! 与 RV32I 的 ECALL/EBREAK、Zicsr 共用 SYSTEM opcode。

use crate::isa::fields::{rs1, rs2, OP_SYSTEM};
use crate::isa::instr::RvInstr;
use crate::isa::instr_def::{InstrDef, TableDrivenDecoder, EXACT_MASK};

pub const MRET_ENCODING: u32 = 0x3020_0073;
pub const SRET_ENCODING: u32 = 0x1020_0073;
pub const WFI_ENCODING: u32 = 0x1050_0073;

/// SFENCE.VMA：funct7 = 0001001，rd = 0，funct3 = 0
const SFENCE_VMA_MASK: u32 = 0xFE00_7FFF;
const SFENCE_VMA_MATCH: u32 = 0x1200_0073;

pub static PRIV_INSTRS: &[InstrDef] = &[
    InstrDef::new("MRET", EXACT_MASK, MRET_ENCODING, |_| RvInstr::Mret),
    InstrDef::new("SRET", EXACT_MASK, SRET_ENCODING, |_| RvInstr::Sret),
    InstrDef::new("WFI", EXACT_MASK, WFI_ENCODING, |_| RvInstr::Wfi),
    InstrDef::new("SFENCE.VMA", SFENCE_VMA_MASK, SFENCE_VMA_MATCH, |raw| RvInstr::SfenceVma {
        rs1: rs1(raw),
        rs2: rs2(raw),
    }),
];

pub static PRIV_OPCODES: [u32; 1] = [OP_SYSTEM];

pub static PRIV_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("Priv", PRIV_INSTRS, Some(&PRIV_OPCODES), true);
