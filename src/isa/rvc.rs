//! C 扩展：16-bit 压缩指令展开
//!
//! 压缩指令直接展开为等价的 `RvInstr`，执行单元无需区分长度，
//! 只有链接地址（C.JAL / C.JALR）依赖 `DecodedInstr::len`。
//!
//! 按象限（bits[1:0]）和 funct3（bits[15:13]）分派：
//! - C0：ADDI4SPN、FLD、LW、FLW、FSD、SW、FSW
//! - C1：ADDI/NOP、JAL、LI、ADDI16SP/LUI、SRLI/SRAI/ANDI/SUB/XOR/OR/AND、J、BEQZ、BNEZ
//! - C2：SLLI、FLDSP、LWSP、FLWSP、JR/MV/EBREAK/JALR/ADD、FSDSP、SWSP、FSWSP

use crate::isa::instr::{AluOp, BranchCond, DecodedInstr, FpFmt, LoadWidth, RvInstr, StoreWidth};

/// 压缩浮点访存是否可用，由 F/D 扩展是否启用决定
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RvcConfig {
    pub float: bool,
    pub double: bool,
}

/// bits[hi:lo]
#[inline]
fn bits(half: u16, hi: u32, lo: u32) -> u32 {
    ((half as u32) >> lo) & ((1 << (hi - lo + 1)) - 1)
}

#[inline]
fn bit(half: u16, pos: u32) -> u32 {
    bits(half, pos, pos)
}

#[inline]
fn sext(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

/// rd'/rs1'/rs2'：3-bit 编码映射到 x8..x15
#[inline]
fn creg(field: u32) -> u8 {
    (field + 8) as u8
}

#[inline]
fn rd_full(half: u16) -> u8 {
    bits(half, 11, 7) as u8
}

#[inline]
fn rs2_full(half: u16) -> u8 {
    bits(half, 6, 2) as u8
}

/// CI 格式的 6-bit 有符号立即数 imm[5] = bit12, imm[4:0] = bits[6:2]
#[inline]
fn ci_imm(half: u16) -> i32 {
    sext((bit(half, 12) << 5) | bits(half, 6, 2), 6)
}

/// C.LW / C.SW / C.FLW / C.FSW 偏移：uimm[5:3] = [12:10], uimm[2] = [6], uimm[6] = [5]
#[inline]
fn cl_word_offset(half: u16) -> i32 {
    ((bits(half, 12, 10) << 3) | (bit(half, 6) << 2) | (bit(half, 5) << 6)) as i32
}

/// C.FLD / C.FSD 偏移：uimm[5:3] = [12:10], uimm[7:6] = [6:5]
#[inline]
fn cl_double_offset(half: u16) -> i32 {
    ((bits(half, 12, 10) << 3) | (bits(half, 6, 5) << 6)) as i32
}

/// C.J / C.JAL 偏移：imm[11|4|9:8|10|6|7|3:1|5]
fn cj_offset(half: u16) -> i32 {
    let imm = (bit(half, 12) << 11)
        | (bit(half, 11) << 4)
        | (bits(half, 10, 9) << 8)
        | (bit(half, 8) << 10)
        | (bit(half, 7) << 6)
        | (bit(half, 6) << 7)
        | (bits(half, 5, 3) << 1)
        | (bit(half, 2) << 5);
    sext(imm, 12)
}

/// C.BEQZ / C.BNEZ 偏移：imm[8|4:3] = [12:10], imm[7:6|2:1|5] = [6:2]
fn cb_offset(half: u16) -> i32 {
    let imm = (bit(half, 12) << 8)
        | (bits(half, 11, 10) << 3)
        | (bits(half, 6, 5) << 6)
        | (bits(half, 4, 3) << 1)
        | (bit(half, 2) << 5);
    sext(imm, 9)
}

/// 展开一条 16-bit 指令；保留编码与未启用扩展的编码返回 `Illegal`
pub fn expand(half: u16, cfg: RvcConfig) -> RvInstr {
    let illegal = RvInstr::Illegal { raw: half as u32 };
    let expanded = match half & 0x3 {
        0b00 => quadrant0(half, cfg),
        0b01 => quadrant1(half),
        0b10 => quadrant2(half, cfg),
        _ => None,
    };
    expanded.unwrap_or(illegal)
}

/// 解码为带长度的指令
pub fn decode16(half: u16, cfg: RvcConfig) -> DecodedInstr {
    DecodedInstr {
        raw: half as u32,
        len: 2,
        instr: expand(half, cfg),
    }
}

// ========== C0 ==========

fn quadrant0(half: u16, cfg: RvcConfig) -> Option<RvInstr> {
    let rs1 = creg(bits(half, 9, 7));
    let rd = creg(bits(half, 4, 2));
    let instr = match bits(half, 15, 13) {
        // C.ADDI4SPN：nzuimm[5:4|9:6|2|3]，全零指令与 nzuimm = 0 均为保留
        0b000 => {
            let imm = (bits(half, 12, 11) << 4) | (bits(half, 10, 7) << 6) | (bit(half, 6) << 2) | (bit(half, 5) << 3);
            if imm == 0 {
                return None;
            }
            RvInstr::AluImm { op: AluOp::Add, rd, rs1: 2, imm: imm as i32 }
        }
        0b001 if cfg.double => RvInstr::FpLoad { fmt: FpFmt::D, frd: rd, rs1, offset: cl_double_offset(half) },
        0b010 => RvInstr::Load { width: LoadWidth::Word, rd, rs1, offset: cl_word_offset(half) },
        0b011 if cfg.float => RvInstr::FpLoad { fmt: FpFmt::S, frd: rd, rs1, offset: cl_word_offset(half) },
        0b101 if cfg.double => RvInstr::FpStore { fmt: FpFmt::D, frs2: rd, rs1, offset: cl_double_offset(half) },
        0b110 => RvInstr::Store { width: StoreWidth::Word, rs1, rs2: rd, offset: cl_word_offset(half) },
        0b111 if cfg.float => RvInstr::FpStore { fmt: FpFmt::S, frs2: rd, rs1, offset: cl_word_offset(half) },
        _ => return None,
    };
    Some(instr)
}

// ========== C1 ==========

fn quadrant1(half: u16) -> Option<RvInstr> {
    let rd = rd_full(half);
    let instr = match bits(half, 15, 13) {
        // C.ADDI / C.NOP（imm = 0 为 hint，照常执行）
        0b000 => RvInstr::AluImm { op: AluOp::Add, rd, rs1: rd, imm: ci_imm(half) },
        0b001 => RvInstr::Jal { rd: 1, offset: cj_offset(half) },
        0b010 => RvInstr::AluImm { op: AluOp::Add, rd, rs1: 0, imm: ci_imm(half) },
        0b011 if rd == 2 => {
            // C.ADDI16SP：nzimm[9] = [12], nzimm[4|6|8:7|5] = [6:2]
            let imm = (bit(half, 12) << 9)
                | (bit(half, 6) << 4)
                | (bit(half, 5) << 6)
                | (bits(half, 4, 3) << 7)
                | (bit(half, 2) << 5);
            if imm == 0 {
                return None;
            }
            RvInstr::AluImm { op: AluOp::Add, rd: 2, rs1: 2, imm: sext(imm, 10) }
        }
        0b011 => {
            // C.LUI：nzimm[17] = [12], nzimm[16:12] = [6:2]
            let imm = ci_imm(half);
            if imm == 0 {
                return None;
            }
            RvInstr::Lui { rd, imm: imm << 12 }
        }
        0b100 => return misc_alu(half),
        0b101 => RvInstr::Jal { rd: 0, offset: cj_offset(half) },
        0b110 => RvInstr::Branch { cond: BranchCond::Eq, rs1: creg(bits(half, 9, 7)), rs2: 0, offset: cb_offset(half) },
        _ => RvInstr::Branch { cond: BranchCond::Ne, rs1: creg(bits(half, 9, 7)), rs2: 0, offset: cb_offset(half) },
    };
    Some(instr)
}

/// C.SRLI / C.SRAI / C.ANDI / C.SUB / C.XOR / C.OR / C.AND
fn misc_alu(half: u16) -> Option<RvInstr> {
    let rd = creg(bits(half, 9, 7));
    let instr = match bits(half, 11, 10) {
        0b00 | 0b01 => {
            // RV32 下 shamt[5] = 1 为保留编码
            if bit(half, 12) != 0 {
                return None;
            }
            let op = if bits(half, 11, 10) == 0 { AluOp::Srl } else { AluOp::Sra };
            RvInstr::AluImm { op, rd, rs1: rd, imm: bits(half, 6, 2) as i32 }
        }
        0b10 => RvInstr::AluImm { op: AluOp::And, rd, rs1: rd, imm: ci_imm(half) },
        _ => {
            // bit12 = 1 为 RV64 的 SUBW/ADDW
            if bit(half, 12) != 0 {
                return None;
            }
            let op = match bits(half, 6, 5) {
                0b00 => AluOp::Sub,
                0b01 => AluOp::Xor,
                0b10 => AluOp::Or,
                _ => AluOp::And,
            };
            RvInstr::AluReg { op, rd, rs1: rd, rs2: creg(bits(half, 4, 2)) }
        }
    };
    Some(instr)
}

// ========== C2 ==========

fn quadrant2(half: u16, cfg: RvcConfig) -> Option<RvInstr> {
    let rd = rd_full(half);
    let rs2 = rs2_full(half);
    // C.LWSP / C.FLWSP：uimm[5] = [12], uimm[4:2|7:6] = [6:2]
    let lwsp = ((bit(half, 12) << 5) | (bits(half, 6, 4) << 2) | (bits(half, 3, 2) << 6)) as i32;
    // C.FLDSP：uimm[5] = [12], uimm[4:3|8:6] = [6:2]
    let ldsp = ((bit(half, 12) << 5) | (bits(half, 6, 5) << 3) | (bits(half, 4, 2) << 6)) as i32;
    // C.SWSP / C.FSWSP：uimm[5:2|7:6] = [12:7]
    let swsp = ((bits(half, 12, 9) << 2) | (bits(half, 8, 7) << 6)) as i32;
    // C.FSDSP：uimm[5:3|8:6] = [12:7]
    let sdsp = ((bits(half, 12, 10) << 3) | (bits(half, 9, 7) << 6)) as i32;

    let instr = match bits(half, 15, 13) {
        0b000 => {
            if bit(half, 12) != 0 {
                return None;
            }
            RvInstr::AluImm { op: AluOp::Sll, rd, rs1: rd, imm: bits(half, 6, 2) as i32 }
        }
        0b001 if cfg.double => RvInstr::FpLoad { fmt: FpFmt::D, frd: rd, rs1: 2, offset: ldsp },
        0b010 => {
            if rd == 0 {
                return None;
            }
            RvInstr::Load { width: LoadWidth::Word, rd, rs1: 2, offset: lwsp }
        }
        0b011 if cfg.float => RvInstr::FpLoad { fmt: FpFmt::S, frd: rd, rs1: 2, offset: lwsp },
        0b100 => match (bit(half, 12), rd, rs2) {
            (0, 0, 0) => return None,
            // C.JR
            (0, rs1, 0) => RvInstr::Jalr { rd: 0, rs1, offset: 0 },
            // C.MV
            (0, _, _) => RvInstr::AluReg { op: AluOp::Add, rd, rs1: 0, rs2 },
            (_, 0, 0) => RvInstr::Ebreak,
            // C.JALR
            (_, rs1, 0) => RvInstr::Jalr { rd: 1, rs1, offset: 0 },
            // C.ADD
            _ => RvInstr::AluReg { op: AluOp::Add, rd, rs1: rd, rs2 },
        },
        0b101 if cfg.double => RvInstr::FpStore { fmt: FpFmt::D, frs2: rs2, rs1: 2, offset: sdsp },
        0b110 => RvInstr::Store { width: StoreWidth::Word, rs1: 2, rs2, offset: swsp },
        0b111 if cfg.float => RvInstr::FpStore { fmt: FpFmt::S, frs2: rs2, rs1: 2, offset: swsp },
        _ => return None,
    };
    Some(instr)
}
