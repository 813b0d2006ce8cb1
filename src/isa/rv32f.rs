//! RV32F 扩展（单精度浮点）解码表
//!
//! OP-FP 指令按 funct7 区分运算，funct7 低两位即 fmt（00 = S，01 = D）。
//! 本文件的构造函数以 `FpFmt` 为参数，D 扩展的表复用它们。

use crate::isa::fields::*;
use crate::isa::instr::{FmaOp, FpArithOp, FpCmpCond, FpFmt, RvInstr};
use crate::isa::instr_def::{
    i_match, r4_match, r_match, rs2_match, InstrDef, TableDrivenDecoder, I_TYPE_MASK, R4_TYPE_MASK,
    R_RM_MASK, R_RS2_MASK, R_RS2_RM_MASK, R_TYPE_MASK,
};

// ========== funct7（fmt = S） ==========
pub const FADD_S: u32 = 0b0000000;
pub const FSUB_S: u32 = 0b0000100;
pub const FMUL_S: u32 = 0b0001000;
pub const FDIV_S: u32 = 0b0001100;
pub const FSQRT_S: u32 = 0b0101100;
pub const FSGNJ_S: u32 = 0b0010000; // funct3 区分 J/JN/JX
pub const FMINMAX_S: u32 = 0b0010100;
pub const FCVT_W_S: u32 = 0b1100000; // rs2 区分 W/WU
pub const FMV_X_W: u32 = 0b1110000; // funct3 = 001 为 FCLASS
pub const FCMP_S: u32 = 0b1010000;
pub const FCVT_S_W: u32 = 0b1101000;
pub const FMV_W_X: u32 = 0b1111000;

// ========== 共用构造函数 ==========

#[inline]
pub(crate) fn fp_load(fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpLoad {
        fmt,
        frd: rd(raw),
        rs1: rs1(raw),
        offset: imm_i(raw),
    }
}

#[inline]
pub(crate) fn fp_store(fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpStore {
        fmt,
        frs2: rs2(raw),
        rs1: rs1(raw),
        offset: imm_s(raw),
    }
}

#[inline]
pub(crate) fn arith(op: FpArithOp, fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpArith {
        op,
        fmt,
        frd: rd(raw),
        frs1: rs1(raw),
        frs2: rs2(raw),
        rm: rm(raw),
    }
}

#[inline]
pub(crate) fn fma(op: FmaOp, fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpFma {
        op,
        fmt,
        frd: rd(raw),
        frs1: rs1(raw),
        frs2: rs2(raw),
        frs3: rs3(raw),
        rm: rm(raw),
    }
}

#[inline]
pub(crate) fn sqrt(fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpSqrt {
        fmt,
        frd: rd(raw),
        frs1: rs1(raw),
        rm: rm(raw),
    }
}

#[inline]
pub(crate) fn cmp(cond: FpCmpCond, fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpCmp {
        cond,
        fmt,
        rd: rd(raw),
        frs1: rs1(raw),
        frs2: rs2(raw),
    }
}

#[inline]
pub(crate) fn class(fmt: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpClass {
        fmt,
        rd: rd(raw),
        frs1: rs1(raw),
    }
}

#[inline]
pub(crate) fn to_int(fmt: FpFmt, signed: bool, raw: u32) -> RvInstr {
    RvInstr::FpToInt {
        fmt,
        signed,
        rd: rd(raw),
        frs1: rs1(raw),
        rm: rm(raw),
    }
}

#[inline]
pub(crate) fn from_int(fmt: FpFmt, signed: bool, raw: u32) -> RvInstr {
    RvInstr::IntToFp {
        fmt,
        signed,
        frd: rd(raw),
        rs1: rs1(raw),
        rm: rm(raw),
    }
}

pub static RV32F_INSTRS: &[InstrDef] = &[
    // ========== Load / Store ==========
    InstrDef::new("FLW", I_TYPE_MASK, i_match(0b010, OP_LOAD_FP), |raw| fp_load(FpFmt::S, raw)),
    InstrDef::new("FSW", I_TYPE_MASK, i_match(0b010, OP_STORE_FP), |raw| fp_store(FpFmt::S, raw)),
    // ========== 融合乘加 ==========
    InstrDef::new("FMADD.S", R4_TYPE_MASK, r4_match(0b00, OP_MADD), |raw| fma(FmaOp::Madd, FpFmt::S, raw)),
    InstrDef::new("FMSUB.S", R4_TYPE_MASK, r4_match(0b00, OP_MSUB), |raw| fma(FmaOp::Msub, FpFmt::S, raw)),
    InstrDef::new("FNMSUB.S", R4_TYPE_MASK, r4_match(0b00, OP_NMSUB), |raw| fma(FmaOp::Nmsub, FpFmt::S, raw)),
    InstrDef::new("FNMADD.S", R4_TYPE_MASK, r4_match(0b00, OP_NMADD), |raw| fma(FmaOp::Nmadd, FpFmt::S, raw)),
    // ========== 算术 ==========
    InstrDef::new("FADD.S", R_RM_MASK, r_match(FADD_S, 0, OP_FP), |raw| arith(FpArithOp::Add, FpFmt::S, raw)),
    InstrDef::new("FSUB.S", R_RM_MASK, r_match(FSUB_S, 0, OP_FP), |raw| arith(FpArithOp::Sub, FpFmt::S, raw)),
    InstrDef::new("FMUL.S", R_RM_MASK, r_match(FMUL_S, 0, OP_FP), |raw| arith(FpArithOp::Mul, FpFmt::S, raw)),
    InstrDef::new("FDIV.S", R_RM_MASK, r_match(FDIV_S, 0, OP_FP), |raw| arith(FpArithOp::Div, FpFmt::S, raw)),
    InstrDef::new("FSQRT.S", R_RS2_RM_MASK, rs2_match(FSQRT_S, 0, 0, OP_FP), |raw| sqrt(FpFmt::S, raw)),
    // ========== 符号注入 / 最值 ==========
    InstrDef::new("FSGNJ.S", R_TYPE_MASK, r_match(FSGNJ_S, 0b000, OP_FP), |raw| arith(FpArithOp::Sgnj, FpFmt::S, raw)),
    InstrDef::new("FSGNJN.S", R_TYPE_MASK, r_match(FSGNJ_S, 0b001, OP_FP), |raw| {
        arith(FpArithOp::Sgnjn, FpFmt::S, raw)
    }),
    InstrDef::new("FSGNJX.S", R_TYPE_MASK, r_match(FSGNJ_S, 0b010, OP_FP), |raw| {
        arith(FpArithOp::Sgnjx, FpFmt::S, raw)
    }),
    InstrDef::new("FMIN.S", R_TYPE_MASK, r_match(FMINMAX_S, 0b000, OP_FP), |raw| arith(FpArithOp::Min, FpFmt::S, raw)),
    InstrDef::new("FMAX.S", R_TYPE_MASK, r_match(FMINMAX_S, 0b001, OP_FP), |raw| arith(FpArithOp::Max, FpFmt::S, raw)),
    // ========== 比较 / 分类 ==========
    InstrDef::new("FEQ.S", R_TYPE_MASK, r_match(FCMP_S, 0b010, OP_FP), |raw| cmp(FpCmpCond::Eq, FpFmt::S, raw)),
    InstrDef::new("FLT.S", R_TYPE_MASK, r_match(FCMP_S, 0b001, OP_FP), |raw| cmp(FpCmpCond::Lt, FpFmt::S, raw)),
    InstrDef::new("FLE.S", R_TYPE_MASK, r_match(FCMP_S, 0b000, OP_FP), |raw| cmp(FpCmpCond::Le, FpFmt::S, raw)),
    InstrDef::new("FCLASS.S", R_RS2_MASK, rs2_match(FMV_X_W, 0, 0b001, OP_FP), |raw| class(FpFmt::S, raw)),
    // ========== 转换 / 搬移 ==========
    InstrDef::new("FCVT.W.S", R_RS2_RM_MASK, rs2_match(FCVT_W_S, 0, 0, OP_FP), |raw| to_int(FpFmt::S, true, raw)),
    InstrDef::new("FCVT.WU.S", R_RS2_RM_MASK, rs2_match(FCVT_W_S, 1, 0, OP_FP), |raw| to_int(FpFmt::S, false, raw)),
    InstrDef::new("FCVT.S.W", R_RS2_RM_MASK, rs2_match(FCVT_S_W, 0, 0, OP_FP), |raw| from_int(FpFmt::S, true, raw)),
    InstrDef::new("FCVT.S.WU", R_RS2_RM_MASK, rs2_match(FCVT_S_W, 1, 0, OP_FP), |raw| {
        from_int(FpFmt::S, false, raw)
    }),
    InstrDef::new("FMV.X.W", R_RS2_MASK, rs2_match(FMV_X_W, 0, 0b000, OP_FP), |raw| RvInstr::FmvXW {
        rd: rd(raw),
        frs1: rs1(raw),
    }),
    InstrDef::new("FMV.W.X", R_RS2_MASK, rs2_match(FMV_W_X, 0, 0b000, OP_FP), |raw| RvInstr::FmvWX {
        frd: rd(raw),
        rs1: rs1(raw),
    }),
];

/// F 与 D 共享的 opcode
pub static FP_OPCODES: [u32; 7] = [OP_LOAD_FP, OP_STORE_FP, OP_MADD, OP_MSUB, OP_NMSUB, OP_NMADD, OP_FP];

pub static RV32F_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RV32F", RV32F_INSTRS, Some(&FP_OPCODES), true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::InstrDecoder;

    #[test]
    fn test_decode_fadd_dyn_rm() {
        // fadd.s f3, f1, f2（rm = dyn）
        let d = RV32F_DECODER.decode(0x002071D3).unwrap();
        assert_eq!(
            d.instr,
            RvInstr::FpArith { op: FpArithOp::Add, fmt: FpFmt::S, frd: 3, frs1: 1, frs2: 2, rm: 0b111 }
        );
    }

    #[test]
    fn test_decode_fmadd() {
        // fmadd.s f4, f1, f2, f3
        let d = RV32F_DECODER.decode(0x18208243).unwrap();
        assert_eq!(
            d.instr,
            RvInstr::FpFma { op: FmaOp::Madd, fmt: FpFmt::S, frd: 4, frs1: 1, frs2: 2, frs3: 3, rm: 0 }
        );
    }

    #[test]
    fn test_fmv_and_fclass_share_funct7() {
        // fmv.x.w a0, f1
        assert_eq!(RV32F_DECODER.decode(0xE0008553).unwrap().instr, RvInstr::FmvXW { rd: 10, frs1: 1 });
        // fclass.s a0, f1
        assert_eq!(
            RV32F_DECODER.decode(0xE0009553).unwrap().instr,
            RvInstr::FpClass { fmt: FpFmt::S, rd: 10, frs1: 1 }
        );
    }

    #[test]
    fn test_double_encoding_not_matched() {
        // fadd.d f3, f1, f2 不属于 F 表
        assert!(RV32F_DECODER.decode(0x022071D3).is_none());
    }
}
