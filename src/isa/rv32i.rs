//! RV32I 基础指令集解码表

use crate::isa::fields::*;
use crate::isa::instr::{AluOp, BranchCond, LoadWidth, RvInstr, StoreWidth};
use crate::isa::instr_def::{
    i_match, r_match, shift_match, InstrDef, TableDrivenDecoder, EXACT_MASK, I_TYPE_MASK, R_TYPE_MASK,
    SHIFT_IMM_MASK, U_TYPE_MASK,
};

#[inline]
fn branch(cond: BranchCond, raw: u32) -> RvInstr {
    RvInstr::Branch {
        cond,
        rs1: rs1(raw),
        rs2: rs2(raw),
        offset: imm_b(raw),
    }
}

#[inline]
fn load(width: LoadWidth, raw: u32) -> RvInstr {
    RvInstr::Load {
        width,
        rd: rd(raw),
        rs1: rs1(raw),
        offset: imm_i(raw),
    }
}

#[inline]
fn store(width: StoreWidth, raw: u32) -> RvInstr {
    RvInstr::Store {
        width,
        rs1: rs1(raw),
        rs2: rs2(raw),
        offset: imm_s(raw),
    }
}

#[inline]
fn alu_imm(op: AluOp, raw: u32) -> RvInstr {
    RvInstr::AluImm {
        op,
        rd: rd(raw),
        rs1: rs1(raw),
        imm: imm_i(raw),
    }
}

#[inline]
fn shift_imm(op: AluOp, raw: u32) -> RvInstr {
    RvInstr::AluImm {
        op,
        rd: rd(raw),
        rs1: rs1(raw),
        imm: shamt(raw) as i32,
    }
}

#[inline]
fn alu_reg(op: AluOp, raw: u32) -> RvInstr {
    RvInstr::AluReg {
        op,
        rd: rd(raw),
        rs1: rs1(raw),
        rs2: rs2(raw),
    }
}

pub static RV32I_INSTRS: &[InstrDef] = &[
    // ========== U / J ==========
    InstrDef::new("LUI", U_TYPE_MASK, OP_LUI, |raw| RvInstr::Lui { rd: rd(raw), imm: imm_u(raw) }),
    InstrDef::new("AUIPC", U_TYPE_MASK, OP_AUIPC, |raw| RvInstr::Auipc { rd: rd(raw), imm: imm_u(raw) }),
    InstrDef::new("JAL", U_TYPE_MASK, OP_JAL, |raw| RvInstr::Jal { rd: rd(raw), offset: imm_j(raw) }),
    InstrDef::new("JALR", I_TYPE_MASK, i_match(0b000, OP_JALR), |raw| RvInstr::Jalr {
        rd: rd(raw),
        rs1: rs1(raw),
        offset: imm_i(raw),
    }),
    // ========== Branch ==========
    InstrDef::new("BEQ", I_TYPE_MASK, i_match(0b000, OP_BRANCH), |raw| branch(BranchCond::Eq, raw)),
    InstrDef::new("BNE", I_TYPE_MASK, i_match(0b001, OP_BRANCH), |raw| branch(BranchCond::Ne, raw)),
    InstrDef::new("BLT", I_TYPE_MASK, i_match(0b100, OP_BRANCH), |raw| branch(BranchCond::Lt, raw)),
    InstrDef::new("BGE", I_TYPE_MASK, i_match(0b101, OP_BRANCH), |raw| branch(BranchCond::Ge, raw)),
    InstrDef::new("BLTU", I_TYPE_MASK, i_match(0b110, OP_BRANCH), |raw| branch(BranchCond::Ltu, raw)),
    InstrDef::new("BGEU", I_TYPE_MASK, i_match(0b111, OP_BRANCH), |raw| branch(BranchCond::Geu, raw)),
    // ========== Load / Store ==========
    InstrDef::new("LB", I_TYPE_MASK, i_match(0b000, OP_LOAD), |raw| load(LoadWidth::Byte, raw)),
    InstrDef::new("LH", I_TYPE_MASK, i_match(0b001, OP_LOAD), |raw| load(LoadWidth::Half, raw)),
    InstrDef::new("LW", I_TYPE_MASK, i_match(0b010, OP_LOAD), |raw| load(LoadWidth::Word, raw)),
    InstrDef::new("LBU", I_TYPE_MASK, i_match(0b100, OP_LOAD), |raw| load(LoadWidth::ByteUnsigned, raw)),
    InstrDef::new("LHU", I_TYPE_MASK, i_match(0b101, OP_LOAD), |raw| load(LoadWidth::HalfUnsigned, raw)),
    InstrDef::new("SB", I_TYPE_MASK, i_match(0b000, OP_STORE), |raw| store(StoreWidth::Byte, raw)),
    InstrDef::new("SH", I_TYPE_MASK, i_match(0b001, OP_STORE), |raw| store(StoreWidth::Half, raw)),
    InstrDef::new("SW", I_TYPE_MASK, i_match(0b010, OP_STORE), |raw| store(StoreWidth::Word, raw)),
    // ========== OP-IMM ==========
    InstrDef::new("ADDI", I_TYPE_MASK, i_match(0b000, OP_IMM), |raw| alu_imm(AluOp::Add, raw)),
    InstrDef::new("SLTI", I_TYPE_MASK, i_match(0b010, OP_IMM), |raw| alu_imm(AluOp::Slt, raw)),
    InstrDef::new("SLTIU", I_TYPE_MASK, i_match(0b011, OP_IMM), |raw| alu_imm(AluOp::Sltu, raw)),
    InstrDef::new("XORI", I_TYPE_MASK, i_match(0b100, OP_IMM), |raw| alu_imm(AluOp::Xor, raw)),
    InstrDef::new("ORI", I_TYPE_MASK, i_match(0b110, OP_IMM), |raw| alu_imm(AluOp::Or, raw)),
    InstrDef::new("ANDI", I_TYPE_MASK, i_match(0b111, OP_IMM), |raw| alu_imm(AluOp::And, raw)),
    // RV32 下 shamt[5] 必须为 0，由 funct6 一并检查
    InstrDef::new("SLLI", SHIFT_IMM_MASK | (1 << 25), shift_match(0b000000, 0b001, OP_IMM), |raw| {
        shift_imm(AluOp::Sll, raw)
    }),
    InstrDef::new("SRLI", SHIFT_IMM_MASK | (1 << 25), shift_match(0b000000, 0b101, OP_IMM), |raw| {
        shift_imm(AluOp::Srl, raw)
    }),
    InstrDef::new("SRAI", SHIFT_IMM_MASK | (1 << 25), shift_match(0b010000, 0b101, OP_IMM), |raw| {
        shift_imm(AluOp::Sra, raw)
    }),
    // ========== OP ==========
    InstrDef::new("ADD", R_TYPE_MASK, r_match(0b0000000, 0b000, OP_REG), |raw| alu_reg(AluOp::Add, raw)),
    InstrDef::new("SUB", R_TYPE_MASK, r_match(0b0100000, 0b000, OP_REG), |raw| alu_reg(AluOp::Sub, raw)),
    InstrDef::new("SLL", R_TYPE_MASK, r_match(0b0000000, 0b001, OP_REG), |raw| alu_reg(AluOp::Sll, raw)),
    InstrDef::new("SLT", R_TYPE_MASK, r_match(0b0000000, 0b010, OP_REG), |raw| alu_reg(AluOp::Slt, raw)),
    InstrDef::new("SLTU", R_TYPE_MASK, r_match(0b0000000, 0b011, OP_REG), |raw| alu_reg(AluOp::Sltu, raw)),
    InstrDef::new("XOR", R_TYPE_MASK, r_match(0b0000000, 0b100, OP_REG), |raw| alu_reg(AluOp::Xor, raw)),
    InstrDef::new("SRL", R_TYPE_MASK, r_match(0b0000000, 0b101, OP_REG), |raw| alu_reg(AluOp::Srl, raw)),
    InstrDef::new("SRA", R_TYPE_MASK, r_match(0b0100000, 0b101, OP_REG), |raw| alu_reg(AluOp::Sra, raw)),
    InstrDef::new("OR", R_TYPE_MASK, r_match(0b0000000, 0b110, OP_REG), |raw| alu_reg(AluOp::Or, raw)),
    InstrDef::new("AND", R_TYPE_MASK, r_match(0b0000000, 0b111, OP_REG), |raw| alu_reg(AluOp::And, raw)),
    // ========== MISC-MEM ==========
    InstrDef::new("FENCE", I_TYPE_MASK, i_match(0b000, OP_MISC_MEM), |raw| RvInstr::Fence {
        pred: ((raw >> 24) & 0xF) as u8,
        succ: ((raw >> 20) & 0xF) as u8,
        fm: ((raw >> 28) & 0xF) as u8,
    }),
    InstrDef::new("FENCE.I", I_TYPE_MASK, i_match(0b001, OP_MISC_MEM), |_| RvInstr::FenceI),
    // ========== SYSTEM ==========
    InstrDef::new("ECALL", EXACT_MASK, 0x0000_0073, |_| RvInstr::Ecall),
    InstrDef::new("EBREAK", EXACT_MASK, 0x0010_0073, |_| RvInstr::Ebreak),
];

pub static RV32I_OPCODES: [u32; 11] = [
    OP_LUI, OP_AUIPC, OP_JAL, OP_JALR, OP_BRANCH, OP_LOAD, OP_STORE, OP_MISC_MEM, OP_IMM, OP_REG, OP_SYSTEM,
];

pub static RV32I_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RV32I", RV32I_INSTRS, Some(&RV32I_OPCODES), true);
