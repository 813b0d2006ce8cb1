//! RV32D 扩展（双精度浮点）解码表
//!
//! 编码与 F 相同，fmt = 01；RV32 下没有 FMV.X.D / FMV.D.X。

use crate::isa::fields::*;
use crate::isa::instr::{FmaOp, FpArithOp, FpCmpCond, FpFmt, RvInstr};
use crate::isa::instr_def::{
    i_match, r4_match, r_match, rs2_match, InstrDef, TableDrivenDecoder, I_TYPE_MASK, R4_TYPE_MASK,
    R_RM_MASK, R_RS2_MASK, R_RS2_RM_MASK, R_TYPE_MASK,
};
use crate::isa::rv32f::{
    arith, class, cmp, fma, fp_load, fp_store, from_int, sqrt, to_int, FADD_S, FCMP_S, FCVT_S_W, FCVT_W_S, FDIV_S,
    FMINMAX_S, FMUL_S, FMV_X_W, FP_OPCODES, FSGNJ_S, FSQRT_S, FSUB_S,
};

const D: u32 = 0b01;

/// FCVT.S.D：funct7 = 0100000，rs2 = 1
pub const FCVT_S_D: u32 = 0b0100000;
/// FCVT.D.S：funct7 = 0100001，rs2 = 0
pub const FCVT_D_S: u32 = 0b0100001;

#[inline]
fn convert(to: FpFmt, raw: u32) -> RvInstr {
    RvInstr::FpConvert {
        to,
        frd: rd(raw),
        frs1: rs1(raw),
        rm: rm(raw),
    }
}

pub static RV32D_INSTRS: &[InstrDef] = &[
    InstrDef::new("FLD", I_TYPE_MASK, i_match(0b011, OP_LOAD_FP), |raw| fp_load(FpFmt::D, raw)),
    InstrDef::new("FSD", I_TYPE_MASK, i_match(0b011, OP_STORE_FP), |raw| fp_store(FpFmt::D, raw)),
    InstrDef::new("FMADD.D", R4_TYPE_MASK, r4_match(D, OP_MADD), |raw| fma(FmaOp::Madd, FpFmt::D, raw)),
    InstrDef::new("FMSUB.D", R4_TYPE_MASK, r4_match(D, OP_MSUB), |raw| fma(FmaOp::Msub, FpFmt::D, raw)),
    InstrDef::new("FNMSUB.D", R4_TYPE_MASK, r4_match(D, OP_NMSUB), |raw| fma(FmaOp::Nmsub, FpFmt::D, raw)),
    InstrDef::new("FNMADD.D", R4_TYPE_MASK, r4_match(D, OP_NMADD), |raw| fma(FmaOp::Nmadd, FpFmt::D, raw)),
    InstrDef::new("FADD.D", R_RM_MASK, r_match(FADD_S | D, 0, OP_FP), |raw| arith(FpArithOp::Add, FpFmt::D, raw)),
    InstrDef::new("FSUB.D", R_RM_MASK, r_match(FSUB_S | D, 0, OP_FP), |raw| arith(FpArithOp::Sub, FpFmt::D, raw)),
    InstrDef::new("FMUL.D", R_RM_MASK, r_match(FMUL_S | D, 0, OP_FP), |raw| arith(FpArithOp::Mul, FpFmt::D, raw)),
    InstrDef::new("FDIV.D", R_RM_MASK, r_match(FDIV_S | D, 0, OP_FP), |raw| arith(FpArithOp::Div, FpFmt::D, raw)),
    InstrDef::new("FSQRT.D", R_RS2_RM_MASK, rs2_match(FSQRT_S | D, 0, 0, OP_FP), |raw| sqrt(FpFmt::D, raw)),
    InstrDef::new("FSGNJ.D", R_TYPE_MASK, r_match(FSGNJ_S | D, 0b000, OP_FP), |raw| {
        arith(FpArithOp::Sgnj, FpFmt::D, raw)
    }),
    InstrDef::new("FSGNJN.D", R_TYPE_MASK, r_match(FSGNJ_S | D, 0b001, OP_FP), |raw| {
        arith(FpArithOp::Sgnjn, FpFmt::D, raw)
    }),
    InstrDef::new("FSGNJX.D", R_TYPE_MASK, r_match(FSGNJ_S | D, 0b010, OP_FP), |raw| {
        arith(FpArithOp::Sgnjx, FpFmt::D, raw)
    }),
    InstrDef::new("FMIN.D", R_TYPE_MASK, r_match(FMINMAX_S | D, 0b000, OP_FP), |raw| {
        arith(FpArithOp::Min, FpFmt::D, raw)
    }),
    InstrDef::new("FMAX.D", R_TYPE_MASK, r_match(FMINMAX_S | D, 0b001, OP_FP), |raw| {
        arith(FpArithOp::Max, FpFmt::D, raw)
    }),
    InstrDef::new("FEQ.D", R_TYPE_MASK, r_match(FCMP_S | D, 0b010, OP_FP), |raw| cmp(FpCmpCond::Eq, FpFmt::D, raw)),
    InstrDef::new("FLT.D", R_TYPE_MASK, r_match(FCMP_S | D, 0b001, OP_FP), |raw| cmp(FpCmpCond::Lt, FpFmt::D, raw)),
    InstrDef::new("FLE.D", R_TYPE_MASK, r_match(FCMP_S | D, 0b000, OP_FP), |raw| cmp(FpCmpCond::Le, FpFmt::D, raw)),
    InstrDef::new("FCLASS.D", R_RS2_MASK, rs2_match(FMV_X_W | D, 0, 0b001, OP_FP), |raw| class(FpFmt::D, raw)),
    InstrDef::new("FCVT.W.D", R_RS2_RM_MASK, rs2_match(FCVT_W_S | D, 0, 0, OP_FP), |raw| to_int(FpFmt::D, true, raw)),
    InstrDef::new("FCVT.WU.D", R_RS2_RM_MASK, rs2_match(FCVT_W_S | D, 1, 0, OP_FP), |raw| {
        to_int(FpFmt::D, false, raw)
    }),
    InstrDef::new("FCVT.D.W", R_RS2_RM_MASK, rs2_match(FCVT_S_W | D, 0, 0, OP_FP), |raw| {
        from_int(FpFmt::D, true, raw)
    }),
    InstrDef::new("FCVT.D.WU", R_RS2_RM_MASK, rs2_match(FCVT_S_W | D, 1, 0, OP_FP), |raw| {
        from_int(FpFmt::D, false, raw)
    }),
    InstrDef::new("FCVT.S.D", R_RS2_RM_MASK, rs2_match(FCVT_S_D, 1, 0, OP_FP), |raw| convert(FpFmt::S, raw)),
    InstrDef::new("FCVT.D.S", R_RS2_RM_MASK, rs2_match(FCVT_D_S, 0, 0, OP_FP), |raw| convert(FpFmt::D, raw)),
];

pub static RV32D_DECODER: TableDrivenDecoder = TableDrivenDecoder::new("RV32D", RV32D_INSTRS, Some(&FP_OPCODES), true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::InstrDecoder;

    #[test]
    fn test_decode_fld_fsd() {
        // fld f1, 8(x2)
        assert_eq!(
            RV32D_DECODER.decode(0x00813087).unwrap().instr,
            RvInstr::FpLoad { fmt: FpFmt::D, frd: 1, rs1: 2, offset: 8 }
        );
        // fsd f1, 16(x2)
        assert_eq!(
            RV32D_DECODER.decode(0x00113827).unwrap().instr,
            RvInstr::FpStore { fmt: FpFmt::D, frs2: 1, rs1: 2, offset: 16 }
        );
    }

    #[test]
    fn test_decode_convert() {
        // fcvt.s.d f1, f2
        assert_eq!(
            RV32D_DECODER.decode(0x401170D3).unwrap().instr,
            RvInstr::FpConvert { to: FpFmt::S, frd: 1, frs1: 2, rm: 0b111 }
        );
        // fcvt.d.s f1, f2
        assert_eq!(
            RV32D_DECODER.decode(0x420100D3).unwrap().instr,
            RvInstr::FpConvert { to: FpFmt::D, frd: 1, frs1: 2, rm: 0 }
        );
    }

    #[test]
    fn test_no_fmv_on_rv32() {
        // fmv.x.d 编码在 RV32 上非法
        assert!(RV32D_DECODER.decode(0xE2008553).is_none());
    }
}
