//! V 扩展解码表（vset* 与整数/单精度浮点算术）
//!
//! ```text
//! 31    26 25 24  20 19  15 14  12 11  7 6      0
//!  funct6  vm  vs2  vs1/rs1 funct3  vd   OP-V
//! ```
//! funct3 选择操作数类别：
//! OPIVV 000, OPFVV 001, OPIVI 011, OPIVX 100, OPFVF 101, OPCFG 111

use crate::isa::fields::*;
use crate::isa::instr::{RvInstr, VecFpOp, VecIntOp, VecOperand};
use crate::isa::instr_def::{shift_match, InstrDef, TableDrivenDecoder, R_TYPE_MASK, SHIFT_IMM_MASK};

pub const OPIVV: u32 = 0b000;
pub const OPFVV: u32 = 0b001;
pub const OPIVI: u32 = 0b011;
pub const OPIVX: u32 = 0b100;
pub const OPFVF: u32 = 0b101;
pub const OPCFG: u32 = 0b111;

// ========== funct6 ==========
pub const VADD: u32 = 0b000000;
pub const VSUB: u32 = 0b000010;
pub const VRSUB: u32 = 0b000011;
pub const VAND: u32 = 0b001001;
pub const VOR: u32 = 0b001010;
pub const VXOR: u32 = 0b001011;
pub const VSLL: u32 = 0b100101;
pub const VSRL: u32 = 0b101000;
pub const VSRA: u32 = 0b101001;

pub const VFADD: u32 = 0b000000;
pub const VFSUB: u32 = 0b000010;
pub const VFDIV: u32 = 0b100000;
pub const VFRDIV: u32 = 0b100001;
pub const VFMUL: u32 = 0b100100;
pub const VFRSUB: u32 = 0b100111;

/// funct6 + funct3 + opcode，vm 与寄存器字段不参与匹配
const VARITH_MASK: u32 = SHIFT_IMM_MASK;
/// vsetvli：bit31 = 0
const VSETVLI_MASK: u32 = 0x8000_707F;
/// vsetivli：bit31:30 = 11
const VSETIVLI_MASK: u32 = 0xC000_707F;

#[inline]
const fn cfg_match(high: u32) -> u32 {
    high | (OPCFG << 12) | OP_V
}

#[inline]
fn vint(op: VecIntOp, funct3: u32, raw: u32) -> RvInstr {
    let src = match funct3 {
        OPIVV => VecOperand::Vector(rs1(raw)),
        OPIVX => VecOperand::Scalar(rs1(raw)),
        _ => VecOperand::Imm(simm5(raw)),
    };
    RvInstr::VecInt {
        op,
        vd: rd(raw),
        vs2: rs2(raw),
        src,
        vm: vm(raw),
    }
}

#[inline]
fn vfp(op: VecFpOp, funct3: u32, raw: u32) -> RvInstr {
    let src = match funct3 {
        OPFVV => VecOperand::Vector(rs1(raw)),
        _ => VecOperand::Scalar(rs1(raw)),
    };
    RvInstr::VecFp {
        op,
        vd: rd(raw),
        vs2: rs2(raw),
        src,
        vm: vm(raw),
    }
}

pub static RVV_INSTRS: &[InstrDef] = &[
    // ========== 配置 ==========
    InstrDef::new("VSETVLI", VSETVLI_MASK, cfg_match(0), |raw| RvInstr::Vsetvli {
        rd: rd(raw),
        rs1: rs1(raw),
        vtypei: (raw >> 20) & 0x7FF,
    }),
    InstrDef::new("VSETIVLI", VSETIVLI_MASK, cfg_match(0b11 << 30), |raw| RvInstr::Vsetivli {
        rd: rd(raw),
        uimm: rs1(raw),
        vtypei: (raw >> 20) & 0x3FF,
    }),
    InstrDef::new("VSETVL", R_TYPE_MASK, cfg_match(0b1000000 << 25), |raw| RvInstr::Vsetvl {
        rd: rd(raw),
        rs1: rs1(raw),
        rs2: rs2(raw),
    }),
    // ========== OPIVV ==========
    InstrDef::new("VADD.VV", VARITH_MASK, shift_match(VADD, OPIVV, OP_V), |raw| vint(VecIntOp::Add, OPIVV, raw)),
    InstrDef::new("VSUB.VV", VARITH_MASK, shift_match(VSUB, OPIVV, OP_V), |raw| vint(VecIntOp::Sub, OPIVV, raw)),
    InstrDef::new("VAND.VV", VARITH_MASK, shift_match(VAND, OPIVV, OP_V), |raw| vint(VecIntOp::And, OPIVV, raw)),
    InstrDef::new("VOR.VV", VARITH_MASK, shift_match(VOR, OPIVV, OP_V), |raw| vint(VecIntOp::Or, OPIVV, raw)),
    InstrDef::new("VXOR.VV", VARITH_MASK, shift_match(VXOR, OPIVV, OP_V), |raw| vint(VecIntOp::Xor, OPIVV, raw)),
    InstrDef::new("VSLL.VV", VARITH_MASK, shift_match(VSLL, OPIVV, OP_V), |raw| vint(VecIntOp::Sll, OPIVV, raw)),
    InstrDef::new("VSRL.VV", VARITH_MASK, shift_match(VSRL, OPIVV, OP_V), |raw| vint(VecIntOp::Srl, OPIVV, raw)),
    InstrDef::new("VSRA.VV", VARITH_MASK, shift_match(VSRA, OPIVV, OP_V), |raw| vint(VecIntOp::Sra, OPIVV, raw)),
    // ========== OPIVX ==========
    InstrDef::new("VADD.VX", VARITH_MASK, shift_match(VADD, OPIVX, OP_V), |raw| vint(VecIntOp::Add, OPIVX, raw)),
    InstrDef::new("VSUB.VX", VARITH_MASK, shift_match(VSUB, OPIVX, OP_V), |raw| vint(VecIntOp::Sub, OPIVX, raw)),
    InstrDef::new("VRSUB.VX", VARITH_MASK, shift_match(VRSUB, OPIVX, OP_V), |raw| vint(VecIntOp::Rsub, OPIVX, raw)),
    InstrDef::new("VAND.VX", VARITH_MASK, shift_match(VAND, OPIVX, OP_V), |raw| vint(VecIntOp::And, OPIVX, raw)),
    InstrDef::new("VOR.VX", VARITH_MASK, shift_match(VOR, OPIVX, OP_V), |raw| vint(VecIntOp::Or, OPIVX, raw)),
    InstrDef::new("VXOR.VX", VARITH_MASK, shift_match(VXOR, OPIVX, OP_V), |raw| vint(VecIntOp::Xor, OPIVX, raw)),
    InstrDef::new("VSLL.VX", VARITH_MASK, shift_match(VSLL, OPIVX, OP_V), |raw| vint(VecIntOp::Sll, OPIVX, raw)),
    InstrDef::new("VSRL.VX", VARITH_MASK, shift_match(VSRL, OPIVX, OP_V), |raw| vint(VecIntOp::Srl, OPIVX, raw)),
    InstrDef::new("VSRA.VX", VARITH_MASK, shift_match(VSRA, OPIVX, OP_V), |raw| vint(VecIntOp::Sra, OPIVX, raw)),
    // ========== OPIVI（无 vsub.vi） ==========
    InstrDef::new("VADD.VI", VARITH_MASK, shift_match(VADD, OPIVI, OP_V), |raw| vint(VecIntOp::Add, OPIVI, raw)),
    InstrDef::new("VRSUB.VI", VARITH_MASK, shift_match(VRSUB, OPIVI, OP_V), |raw| vint(VecIntOp::Rsub, OPIVI, raw)),
    InstrDef::new("VAND.VI", VARITH_MASK, shift_match(VAND, OPIVI, OP_V), |raw| vint(VecIntOp::And, OPIVI, raw)),
    InstrDef::new("VOR.VI", VARITH_MASK, shift_match(VOR, OPIVI, OP_V), |raw| vint(VecIntOp::Or, OPIVI, raw)),
    InstrDef::new("VXOR.VI", VARITH_MASK, shift_match(VXOR, OPIVI, OP_V), |raw| vint(VecIntOp::Xor, OPIVI, raw)),
    InstrDef::new("VSLL.VI", VARITH_MASK, shift_match(VSLL, OPIVI, OP_V), |raw| vint(VecIntOp::Sll, OPIVI, raw)),
    InstrDef::new("VSRL.VI", VARITH_MASK, shift_match(VSRL, OPIVI, OP_V), |raw| vint(VecIntOp::Srl, OPIVI, raw)),
    InstrDef::new("VSRA.VI", VARITH_MASK, shift_match(VSRA, OPIVI, OP_V), |raw| vint(VecIntOp::Sra, OPIVI, raw)),
    // ========== OPFVV ==========
    InstrDef::new("VFADD.VV", VARITH_MASK, shift_match(VFADD, OPFVV, OP_V), |raw| vfp(VecFpOp::Add, OPFVV, raw)),
    InstrDef::new("VFSUB.VV", VARITH_MASK, shift_match(VFSUB, OPFVV, OP_V), |raw| vfp(VecFpOp::Sub, OPFVV, raw)),
    InstrDef::new("VFMUL.VV", VARITH_MASK, shift_match(VFMUL, OPFVV, OP_V), |raw| vfp(VecFpOp::Mul, OPFVV, raw)),
    InstrDef::new("VFDIV.VV", VARITH_MASK, shift_match(VFDIV, OPFVV, OP_V), |raw| vfp(VecFpOp::Div, OPFVV, raw)),
    // ========== OPFVF ==========
    InstrDef::new("VFADD.VF", VARITH_MASK, shift_match(VFADD, OPFVF, OP_V), |raw| vfp(VecFpOp::Add, OPFVF, raw)),
    InstrDef::new("VFSUB.VF", VARITH_MASK, shift_match(VFSUB, OPFVF, OP_V), |raw| vfp(VecFpOp::Sub, OPFVF, raw)),
    InstrDef::new("VFRSUB.VF", VARITH_MASK, shift_match(VFRSUB, OPFVF, OP_V), |raw| vfp(VecFpOp::Rsub, OPFVF, raw)),
    InstrDef::new("VFMUL.VF", VARITH_MASK, shift_match(VFMUL, OPFVF, OP_V), |raw| vfp(VecFpOp::Mul, OPFVF, raw)),
    InstrDef::new("VFDIV.VF", VARITH_MASK, shift_match(VFDIV, OPFVF, OP_V), |raw| vfp(VecFpOp::Div, OPFVF, raw)),
    InstrDef::new("VFRDIV.VF", VARITH_MASK, shift_match(VFRDIV, OPFVF, OP_V), |raw| vfp(VecFpOp::Rdiv, OPFVF, raw)),
];

pub static RVV_OPCODES: [u32; 1] = [OP_V];

pub static RVV_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RVV", RVV_INSTRS, Some(&RVV_OPCODES), false);
