//! Zicsr 扩展解码表
//!
//! ```text
//! 31       20 19    15 14  12 11   7 6      0
//!    csr      rs1/zimm  funct3   rd    SYSTEM
//! ```
//! funct3: 001 RW, 010 RS, 011 RC, 101 RWI, 110 RSI, 111 RCI

use crate::isa::fields::*;
use crate::isa::instr::{CsrOp, CsrSrc, RvInstr};
use crate::isa::instr_def::{i_match, InstrDef, TableDrivenDecoder, I_TYPE_MASK};

#[inline]
fn csr_reg(op: CsrOp, raw: u32) -> RvInstr {
    RvInstr::Csr {
        op,
        rd: rd(raw),
        csr: csr_addr(raw),
        src: CsrSrc::Reg(rs1(raw)),
    }
}

#[inline]
fn csr_imm(op: CsrOp, raw: u32) -> RvInstr {
    RvInstr::Csr {
        op,
        rd: rd(raw),
        csr: csr_addr(raw),
        src: CsrSrc::Imm(csr_zimm(raw)),
    }
}

pub static ZICSR_INSTRS: &[InstrDef] = &[
    InstrDef::new("CSRRW", I_TYPE_MASK, i_match(0b001, OP_SYSTEM), |raw| csr_reg(CsrOp::Rw, raw)),
    InstrDef::new("CSRRS", I_TYPE_MASK, i_match(0b010, OP_SYSTEM), |raw| csr_reg(CsrOp::Rs, raw)),
    InstrDef::new("CSRRC", I_TYPE_MASK, i_match(0b011, OP_SYSTEM), |raw| csr_reg(CsrOp::Rc, raw)),
    InstrDef::new("CSRRWI", I_TYPE_MASK, i_match(0b101, OP_SYSTEM), |raw| csr_imm(CsrOp::Rw, raw)),
    InstrDef::new("CSRRSI", I_TYPE_MASK, i_match(0b110, OP_SYSTEM), |raw| csr_imm(CsrOp::Rs, raw)),
    InstrDef::new("CSRRCI", I_TYPE_MASK, i_match(0b111, OP_SYSTEM), |raw| csr_imm(CsrOp::Rc, raw)),
];

pub static ZICSR_OPCODES: [u32; 1] = [OP_SYSTEM];

pub static ZICSR_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("Zicsr", ZICSR_INSTRS, Some(&ZICSR_OPCODES), true);
