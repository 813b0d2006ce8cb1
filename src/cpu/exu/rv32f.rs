//! RV32F / RV32D 浮点执行单元
//!
//! 单精度与双精度共用一套流程，算术经由 `simple_soft_float` 完成以得到
//! RISC-V 要求的舍入模式与异常标志。所有 NaN 结果都写回该格式的规范 NaN。

use std::cmp::Ordering;

use simple_soft_float::{F32, F64, FPState, Float, FloatTraits, RoundingMode, StatusFlags};

use super::super::status::{NanBoxed, CANONICAL_NAN_F32, CANONICAL_NAN_F64};
use super::super::trap::Exception;
use super::super::CpuCore;
use super::{ExecResult, Retire};
use crate::isa::{FmaOp, FpArithOp, FpCmpCond, FpFmt, RvInstr};
use crate::memory::{AccessSize, Memory};

/// 浮点异常标志位
pub mod fflags {
    pub const NX: u32 = 1 << 0; // 不精确
    pub const UF: u32 = 1 << 1; // 下溢
    pub const OF: u32 = 1 << 2; // 上溢
    pub const DZ: u32 = 1 << 3; // 除以零
    pub const NV: u32 = 1 << 4; // 无效操作
}

// ========== 格式的位布局 ==========

/// 一种浮点格式的位布局，供分类、min/max、符号注入等位级操作使用
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    fmt: FpFmt,
    sign: u64,
    exp: u64,
    frac: u64,
    quiet: u64,
    canonical_nan: u64,
}

pub(crate) const SINGLE: Layout = Layout {
    fmt: FpFmt::S,
    sign: 1 << 31,
    exp: 0x7F80_0000,
    frac: 0x007F_FFFF,
    quiet: 1 << 22,
    canonical_nan: CANONICAL_NAN_F32 as u64,
};

pub(crate) const DOUBLE: Layout = Layout {
    fmt: FpFmt::D,
    sign: 1 << 63,
    exp: 0x7FF0_0000_0000_0000,
    frac: 0x000F_FFFF_FFFF_FFFF,
    quiet: 1 << 51,
    canonical_nan: CANONICAL_NAN_F64,
};

impl Layout {
    pub(crate) fn of(fmt: FpFmt) -> Self {
        match fmt {
            FpFmt::S => SINGLE,
            FpFmt::D => DOUBLE,
        }
    }

    #[inline]
    pub(crate) fn is_nan(&self, bits: u64) -> bool {
        bits & self.exp == self.exp && bits & self.frac != 0
    }

    #[inline]
    pub(crate) fn is_snan(&self, bits: u64) -> bool {
        self.is_nan(bits) && bits & self.quiet == 0
    }

    #[inline]
    fn is_zero(&self, bits: u64) -> bool {
        bits & !self.sign == 0
    }

    #[inline]
    pub(crate) fn canonicalize(&self, bits: u64) -> u64 {
        if self.is_nan(bits) {
            self.canonical_nan
        } else {
            bits
        }
    }

    /// FCLASS 的 one-hot 结果
    pub(crate) fn classify(&self, bits: u64) -> u32 {
        let negative = bits & self.sign != 0;
        let exp = bits & self.exp;
        let frac = bits & self.frac;
        let bit = if exp == self.exp {
            if frac == 0 {
                if negative { 0 } else { 7 }
            } else if frac & self.quiet != 0 {
                9
            } else {
                8
            }
        } else if exp == 0 {
            match (frac == 0, negative) {
                (true, true) => 3,
                (true, false) => 4,
                (false, true) => 2,
                (false, false) => 5,
            }
        } else if negative {
            1
        } else {
            6
        };
        1 << bit
    }

    /// 按格式读出寄存器的位模式，单精度会检查 NaN-boxing
    fn read(&self, cpu: &CpuCore, reg: u8) -> u64 {
        let slot = cpu.read_fp(reg);
        match self.fmt {
            FpFmt::S => slot.to_f32_bits() as u64,
            FpFmt::D => slot.to_f64_bits(),
        }
    }

    fn write(&self, cpu: &mut CpuCore, reg: u8, bits: u64) {
        let slot = match self.fmt {
            FpFmt::S => NanBoxed::from_f32_bits(bits as u32),
            FpFmt::D => NanBoxed::from_f64_bits(bits),
        };
        cpu.write_fp(reg, slot);
    }

    /// 两个非 NaN 值的大小比较
    fn less(&self, a: u64, b: u64) -> bool {
        match self.fmt {
            FpFmt::S => f32::from_bits(a as u32) < f32::from_bits(b as u32),
            FpFmt::D => f64::from_bits(a) < f64::from_bits(b),
        }
    }
}

// ========== 舍入与异常标志 ==========

/// rm = 7 表示使用 frm；5、6 以及非法的 frm 都是非法指令
#[inline]
pub(crate) fn decode_rounding_mode(cpu: &CpuCore, instr_rm: u8) -> Option<RoundingMode> {
    let rm = if instr_rm == 0b111 { cpu.frm() as u8 } else { instr_rm };

    match rm {
        0b000 => Some(RoundingMode::TiesToEven),
        0b001 => Some(RoundingMode::TowardZero),
        0b010 => Some(RoundingMode::TowardNegative),
        0b011 => Some(RoundingMode::TowardPositive),
        0b100 => Some(RoundingMode::TiesToAway),
        _ => None,
    }
}

#[inline]
pub(crate) fn apply_fp_state(cpu: &mut CpuCore, fp_state: &FPState) {
    let flags = fp_state.status_flags;
    let mut bits = 0;
    if flags.contains(StatusFlags::INVALID_OPERATION) {
        bits |= fflags::NV;
    }
    if flags.contains(StatusFlags::DIVISION_BY_ZERO) {
        bits |= fflags::DZ;
    }
    if flags.contains(StatusFlags::OVERFLOW) {
        bits |= fflags::OF;
    }
    if flags.contains(StatusFlags::UNDERFLOW) {
        bits |= fflags::UF;
    }
    if flags.contains(StatusFlags::INEXACT) {
        bits |= fflags::NX;
    }
    cpu.accrue_fflags(bits);
}

#[inline]
fn read_s(cpu: &CpuCore, reg: u8) -> F32 {
    F32::from_bits(cpu.read_fp(reg).to_f32_bits())
}

#[inline]
fn read_d(cpu: &CpuCore, reg: u8) -> F64 {
    F64::from_bits(cpu.read_fp(reg).to_f64_bits())
}

#[inline]
fn write_s(cpu: &mut CpuCore, reg: u8, value: F32) {
    SINGLE.write(cpu, reg, SINGLE.canonicalize(value.into_bits() as u64));
}

#[inline]
fn write_d(cpu: &mut CpuCore, reg: u8, value: F64) {
    DOUBLE.write(cpu, reg, DOUBLE.canonicalize(value.into_bits()));
}

fn rounding(cpu: &CpuCore, rm: u8) -> Result<RoundingMode, Exception> {
    decode_rounding_mode(cpu, rm).ok_or_else(Exception::illegal)
}

// ========== 与格式无关的 soft-float 运算 ==========

#[derive(Debug, Clone, Copy)]
enum Binary {
    Add,
    Sub,
    Mul,
    Div,
}

fn binary<FT: FloatTraits>(op: Binary, a: &Float<FT>, b: &Float<FT>, rm: RoundingMode, st: &mut FPState) -> Float<FT> {
    match op {
        Binary::Add => a.add(b, Some(rm), Some(st)),
        Binary::Sub => a.sub(b, Some(rm), Some(st)),
        Binary::Mul => a.mul(b, Some(rm), Some(st)),
        Binary::Div => a.div(b, Some(rm), Some(st)),
    }
}

/// 融合乘加：通过翻转被乘数和加数的符号覆盖四种形式
fn fma<FT: FloatTraits>(
    op: FmaOp,
    a: &Float<FT>,
    b: &Float<FT>,
    c: &Float<FT>,
    rm: RoundingMode,
    st: &mut FPState,
) -> Float<FT> {
    let mut a = a.clone();
    let mut c = c.clone();
    match op {
        FmaOp::Madd => {}
        // a * b - c = a * b + (-c)
        FmaOp::Msub => c.toggle_sign(),
        // -(a * b) + c = (-a) * b + c
        FmaOp::Nmsub => a.toggle_sign(),
        // -(a * b) - c = (-a) * b + (-c)
        FmaOp::Nmadd => {
            a.toggle_sign();
            c.toggle_sign();
        }
    }
    a.fused_mul_add(b, &c, Some(rm), Some(st))
}

fn compare<FT: FloatTraits>(cond: FpCmpCond, a: &Float<FT>, b: &Float<FT>, st: &mut FPState) -> bool {
    match cond {
        // FEQ 只对 sNaN 置 NV
        FpCmpCond::Eq => a.compare_quiet(b, Some(st)) == Some(Ordering::Equal),
        // FLT/FLE 对任何 NaN 置 NV
        FpCmpCond::Lt => a.compare_signaling(b, Some(st)) == Some(Ordering::Less),
        FpCmpCond::Le => matches!(
            a.compare_signaling(b, Some(st)),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
    }
}

/// 溢出或 NaN 时按 RISC-V 规则饱和
fn saturate_i32(result: Option<i32>, nan: bool, negative: bool) -> u32 {
    let value = result.unwrap_or(if nan || !negative { i32::MAX } else { i32::MIN });
    value as u32
}

fn saturate_u32(result: Option<u32>, nan: bool, negative: bool) -> u32 {
    result.unwrap_or(if nan || !negative { u32::MAX } else { 0 })
}

// ========== 执行入口 ==========

/// 执行 RV32F / RV32D 指令
pub fn execute(cpu: &mut CpuCore, mem: &mut dyn Memory, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let result = match instr {
        // ========== Load/Store ==========
        RvInstr::FpLoad { fmt, frd, rs1, offset } => {
            let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
            fp_load(cpu, mem, fmt, frd, addr).map(|()| Retire::next(next_pc))
        }
        RvInstr::FpStore { fmt, frs2, rs1, offset } => {
            let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
            let slot = cpu.read_fp(frs2);
            let stored = match fmt {
                // FSW 存低 32 位原样位模式
                FpFmt::S => cpu.store(mem, addr, AccessSize::Word, slot.0 & 0xFFFF_FFFF),
                FpFmt::D => cpu.store(mem, addr, AccessSize::Double, slot.0),
            };
            stored.map(|()| Retire::next(next_pc))
        }

        // ========== Arithmetic ==========
        RvInstr::FpArith { op, fmt, frd, frs1, frs2, rm } => {
            arith(cpu, op, fmt, frd, frs1, frs2, rm).map(|()| Retire::next(next_pc))
        }
        RvInstr::FpSqrt { fmt, frd, frs1, rm } => rounding(cpu, rm).map(|rm| {
            let mut st = FPState::default();
            match fmt {
                FpFmt::S => {
                    let r = read_s(cpu, frs1).sqrt(Some(rm), Some(&mut st));
                    write_s(cpu, frd, r);
                }
                FpFmt::D => {
                    let r = read_d(cpu, frs1).sqrt(Some(rm), Some(&mut st));
                    write_d(cpu, frd, r);
                }
            }
            apply_fp_state(cpu, &st);
            Retire::next(next_pc)
        }),

        // ========== Fused Multiply-Add ==========
        RvInstr::FpFma { op, fmt, frd, frs1, frs2, frs3, rm } => rounding(cpu, rm).map(|rm| {
            let mut st = FPState::default();
            match fmt {
                FpFmt::S => {
                    let (a, b, c) = (read_s(cpu, frs1), read_s(cpu, frs2), read_s(cpu, frs3));
                    let r = fma(op, &a, &b, &c, rm, &mut st);
                    write_s(cpu, frd, r);
                }
                FpFmt::D => {
                    let (a, b, c) = (read_d(cpu, frs1), read_d(cpu, frs2), read_d(cpu, frs3));
                    let r = fma(op, &a, &b, &c, rm, &mut st);
                    write_d(cpu, frd, r);
                }
            }
            apply_fp_state(cpu, &st);
            Retire::next(next_pc)
        }),

        // ========== Compare ==========
        RvInstr::FpCmp { cond, fmt, rd, frs1, frs2 } => {
            let mut st = FPState::default();
            let result = match fmt {
                FpFmt::S => compare(cond, &read_s(cpu, frs1), &read_s(cpu, frs2), &mut st),
                FpFmt::D => compare(cond, &read_d(cpu, frs1), &read_d(cpu, frs2), &mut st),
            };
            apply_fp_state(cpu, &st);
            Ok(Retire::write(rd, result as u32, next_pc))
        }

        // ========== Classification ==========
        RvInstr::FpClass { fmt, rd, frs1 } => {
            let layout = Layout::of(fmt);
            let class = layout.classify(layout.read(cpu, frs1));
            Ok(Retire::write(rd, class, next_pc))
        }

        // ========== Conversion ==========
        RvInstr::FpToInt { fmt, signed, rd, frs1, rm } => rounding(cpu, rm).map(|rm| {
            let layout = Layout::of(fmt);
            let bits = layout.read(cpu, frs1);
            let nan = layout.is_nan(bits);
            let negative = bits & layout.sign != 0;
            let mut st = FPState::default();
            // exact=true 使得在结果不精确时设置 INEXACT 标志
            let value = match (fmt, signed) {
                (FpFmt::S, true) => saturate_i32(read_s(cpu, frs1).to_i32(true, Some(rm), Some(&mut st)), nan, negative),
                (FpFmt::S, false) => saturate_u32(read_s(cpu, frs1).to_u32(true, Some(rm), Some(&mut st)), nan, negative),
                (FpFmt::D, true) => saturate_i32(read_d(cpu, frs1).to_i32(true, Some(rm), Some(&mut st)), nan, negative),
                (FpFmt::D, false) => saturate_u32(read_d(cpu, frs1).to_u32(true, Some(rm), Some(&mut st)), nan, negative),
            };
            apply_fp_state(cpu, &st);
            Retire::write(rd, value, next_pc)
        }),
        RvInstr::IntToFp { fmt, signed, frd, rs1, rm } => rounding(cpu, rm).map(|rm| {
            let value = cpu.read_reg(rs1);
            let mut st = FPState::default();
            match (fmt, signed) {
                (FpFmt::S, true) => write_s(cpu, frd, F32::from_i32(value as i32, Some(rm), Some(&mut st))),
                (FpFmt::S, false) => write_s(cpu, frd, F32::from_u32(value, Some(rm), Some(&mut st))),
                (FpFmt::D, true) => write_d(cpu, frd, F64::from_i32(value as i32, Some(rm), Some(&mut st))),
                (FpFmt::D, false) => write_d(cpu, frd, F64::from_u32(value, Some(rm), Some(&mut st))),
            }
            apply_fp_state(cpu, &st);
            Retire::next(next_pc)
        }),
        RvInstr::FpConvert { to, frd, frs1, rm } => rounding(cpu, rm).map(|rm| {
            let mut st = FPState::default();
            match to {
                FpFmt::S => {
                    let r = F32::convert_from_float(&read_d(cpu, frs1), Some(rm), Some(&mut st));
                    write_s(cpu, frd, r);
                }
                FpFmt::D => {
                    let r = F64::convert_from_float(&read_s(cpu, frs1), Some(rm), Some(&mut st));
                    write_d(cpu, frd, r);
                }
            }
            apply_fp_state(cpu, &st);
            Retire::next(next_pc)
        }),

        // ========== Move ==========
        // 位模式不变，不检查 NaN-boxing
        RvInstr::FmvXW { rd, frs1 } => Ok(Retire::write(rd, cpu.read_fp(frs1).0 as u32, next_pc)),
        RvInstr::FmvWX { frd, rs1 } => {
            let value = cpu.read_reg(rs1);
            cpu.write_fp(frd, NanBoxed::from_f32_bits(value));
            Ok(Retire::next(next_pc))
        }

        _ => return None,
    };
    Some(result)
}

fn fp_load(cpu: &mut CpuCore, mem: &mut dyn Memory, fmt: FpFmt, frd: u8, addr: u32) -> Result<(), Exception> {
    let slot = match fmt {
        FpFmt::S => NanBoxed::from_f32_bits(cpu.load(mem, addr, AccessSize::Word)? as u32),
        FpFmt::D => NanBoxed::from_f64_bits(cpu.load(mem, addr, AccessSize::Double)?),
    };
    cpu.write_fp(frd, slot);
    Ok(())
}

fn arith(cpu: &mut CpuCore, op: FpArithOp, fmt: FpFmt, frd: u8, frs1: u8, frs2: u8, rm: u8) -> Result<(), Exception> {
    let bin = match op {
        FpArithOp::Add => Binary::Add,
        FpArithOp::Sub => Binary::Sub,
        FpArithOp::Mul => Binary::Mul,
        FpArithOp::Div => Binary::Div,
        FpArithOp::Min | FpArithOp::Max => {
            min_max(cpu, fmt, frd, frs1, frs2, op == FpArithOp::Min);
            return Ok(());
        }
        FpArithOp::Sgnj | FpArithOp::Sgnjn | FpArithOp::Sgnjx => {
            sign_inject(cpu, op, fmt, frd, frs1, frs2);
            return Ok(());
        }
    };

    let rm = rounding(cpu, rm)?;
    let mut st = FPState::default();
    match fmt {
        FpFmt::S => {
            let r = binary(bin, &read_s(cpu, frs1), &read_s(cpu, frs2), rm, &mut st);
            write_s(cpu, frd, r);
        }
        FpFmt::D => {
            let r = binary(bin, &read_d(cpu, frs1), &read_d(cpu, frs2), rm, &mut st);
            write_d(cpu, frd, r);
        }
    }
    apply_fp_state(cpu, &st);
    Ok(())
}

/// 符号注入：取 frs1 的绝对值，符号由 frs2 决定
fn sign_inject(cpu: &mut CpuCore, op: FpArithOp, fmt: FpFmt, frd: u8, frs1: u8, frs2: u8) {
    let layout = Layout::of(fmt);
    let a = layout.read(cpu, frs1);
    let b = layout.read(cpu, frs2);
    let sign = match op {
        FpArithOp::Sgnjn => !b & layout.sign,
        FpArithOp::Sgnjx => (a ^ b) & layout.sign,
        _ => b & layout.sign,
    };
    layout.write(cpu, frd, (a & !layout.sign) | sign);
}

/// FMIN/FMAX：单个 NaN 返回另一个操作数，两个 NaN 返回规范 NaN，sNaN 置 NV
fn min_max(cpu: &mut CpuCore, fmt: FpFmt, frd: u8, frs1: u8, frs2: u8, is_min: bool) {
    let layout = Layout::of(fmt);
    let a = layout.read(cpu, frs1);
    let b = layout.read(cpu, frs2);
    let (a_nan, b_nan) = (layout.is_nan(a), layout.is_nan(b));

    let result = if a_nan && b_nan {
        layout.canonical_nan
    } else if a_nan {
        b
    } else if b_nan {
        a
    } else if layout.is_zero(a) && layout.is_zero(b) {
        // min(+0, -0) = -0, max(+0, -0) = +0
        if is_min { a | b } else { a & b }
    } else {
        let choose_a = if is_min { layout.less(a, b) } else { layout.less(b, a) };
        if choose_a { a } else { b }
    };

    layout.write(cpu, frd, result);
    if layout.is_snan(a) || layout.is_snan(b) {
        cpu.accrue_fflags(fflags::NV);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::csr_def::CSR_FFLAGS;
    use crate::isa::IsaExtensions;
    use crate::memory::VmMemory;

    const BASE: u32 = 0x8000_0000;

    fn setup() -> (CpuCore, VmMemory) {
        let cpu = CpuCore::new(BASE, &IsaExtensions::default()).unwrap();
        (cpu, VmMemory::new(0x10000, BASE))
    }

    fn exec(cpu: &mut CpuCore, mem: &mut VmMemory, instr: RvInstr) -> ExecResult {
        let pc = cpu.pc();
        super::execute(cpu, mem, instr, pc + 4).unwrap()
    }

    fn arith_s(op: FpArithOp) -> RvInstr {
        RvInstr::FpArith { op, fmt: FpFmt::S, frd: 3, frs1: 1, frs2: 2, rm: 0 }
    }

    #[test]
    fn test_fadd_s() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 3.14);
        cpu.write_fp_f32(2, 1.57);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Add)).unwrap();
        assert!((cpu.read_fp_f32(3) - 4.71).abs() < 1e-6);
    }

    #[test]
    fn test_fdiv_s() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 4.9298);
        cpu.write_fp_f32(2, 2.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Div)).unwrap();
        assert!((cpu.read_fp_f32(3) - 2.4649).abs() < 1e-6);
    }

    #[test]
    fn test_fdiv_by_zero_sets_dz() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 1.0);
        cpu.write_fp_f32(2, 0.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Div)).unwrap();
        assert_eq!(cpu.read_fp_f32(3), f32::INFINITY);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(fflags::DZ));
    }

    #[test]
    fn test_nan_result_is_canonical() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, f32::INFINITY);
        cpu.write_fp_f32(2, f32::INFINITY);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Sub)).unwrap();
        assert_eq!(cpu.read_fp(3).to_f32_bits(), CANONICAL_NAN_F32);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(fflags::NV));
    }

    #[test]
    fn test_fadd_d() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f64(1, 1.5);
        cpu.write_fp_f64(2, 2.25);
        let instr = RvInstr::FpArith { op: FpArithOp::Add, fmt: FpFmt::D, frd: 3, frs1: 1, frs2: 2, rm: 0 };
        exec(&mut cpu, &mut mem, instr).unwrap();
        assert_eq!(cpu.read_fp_f64(3), 3.75);
    }

    #[test]
    fn test_fsqrt() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 16.0);
        exec(&mut cpu, &mut mem, RvInstr::FpSqrt { fmt: FpFmt::S, frd: 2, frs1: 1, rm: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f32(2), 4.0);
    }

    #[test]
    fn test_fma_forms() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 2.0);
        cpu.write_fp_f32(2, 3.0);
        cpu.write_fp_f32(3, 1.0);
        let cases = [(FmaOp::Madd, 7.0), (FmaOp::Msub, 5.0), (FmaOp::Nmsub, -5.0), (FmaOp::Nmadd, -7.0)];
        for (op, expected) in cases {
            let instr = RvInstr::FpFma { op, fmt: FpFmt::S, frd: 4, frs1: 1, frs2: 2, frs3: 3, rm: 0 };
            exec(&mut cpu, &mut mem, instr).unwrap();
            assert_eq!(cpu.read_fp_f32(4), expected, "{op:?}");
        }
    }

    #[test]
    fn test_bad_rounding_mode_is_illegal() {
        let (mut cpu, mut mem) = setup();
        let instr = RvInstr::FpArith { op: FpArithOp::Add, fmt: FpFmt::S, frd: 3, frs1: 1, frs2: 2, rm: 5 };
        let err = exec(&mut cpu, &mut mem, instr).unwrap_err();
        assert_eq!(err, Exception::illegal());
    }

    #[test]
    fn test_fmin_fmax_nan_and_zero() {
        let (mut cpu, mut mem) = setup();
        // 一个 qNaN：返回另一个操作数
        cpu.write_fp(1, NanBoxed::from_f32_bits(CANONICAL_NAN_F32));
        cpu.write_fp_f32(2, 5.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Min)).unwrap();
        assert_eq!(cpu.read_fp_f32(3), 5.0);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(0));

        // 两个 NaN：规范 NaN
        cpu.write_fp(2, NanBoxed::from_f32_bits(0x7F80_0001));
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Max)).unwrap();
        assert_eq!(cpu.read_fp(3).to_f32_bits(), CANONICAL_NAN_F32);
        // sNaN 置 NV
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(fflags::NV));

        // ±0
        cpu.write_fp_f32(1, 0.0);
        cpu.write_fp_f32(2, -0.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Min)).unwrap();
        assert_eq!(cpu.read_fp(3).to_f32_bits(), 0x8000_0000);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Max)).unwrap();
        assert_eq!(cpu.read_fp(3).to_f32_bits(), 0);
    }

    #[test]
    fn test_fsgnj() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 3.0);
        cpu.write_fp_f32(2, -5.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Sgnj)).unwrap();
        assert_eq!(cpu.read_fp_f32(3), -3.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Sgnjn)).unwrap();
        assert_eq!(cpu.read_fp_f32(3), 3.0);
        exec(&mut cpu, &mut mem, arith_s(FpArithOp::Sgnjx)).unwrap();
        assert_eq!(cpu.read_fp_f32(3), -3.0);
    }

    #[test]
    fn test_compare() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f32(1, 1.0);
        cpu.write_fp_f32(2, 2.0);
        let cmp = |cond| RvInstr::FpCmp { cond, fmt: FpFmt::S, rd: 10, frs1: 1, frs2: 2 };
        assert_eq!(exec(&mut cpu, &mut mem, cmp(FpCmpCond::Eq)).unwrap().value, 0);
        assert_eq!(exec(&mut cpu, &mut mem, cmp(FpCmpCond::Lt)).unwrap().value, 1);
        assert_eq!(exec(&mut cpu, &mut mem, cmp(FpCmpCond::Le)).unwrap().value, 1);

        // FLT 遇到 qNaN 置 NV，FEQ 不置
        cpu.write_fp(2, NanBoxed::from_f32_bits(CANONICAL_NAN_F32));
        assert_eq!(exec(&mut cpu, &mut mem, cmp(FpCmpCond::Eq)).unwrap().value, 0);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(0));
        assert_eq!(exec(&mut cpu, &mut mem, cmp(FpCmpCond::Lt)).unwrap().value, 0);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(fflags::NV));
    }

    #[test]
    fn test_fclass() {
        assert_eq!(SINGLE.classify(f32::NEG_INFINITY.to_bits() as u64), 1 << 0);
        assert_eq!(SINGLE.classify((-1.0f32).to_bits() as u64), 1 << 1);
        assert_eq!(SINGLE.classify(0x8000_0001), 1 << 2);
        assert_eq!(SINGLE.classify(0x8000_0000), 1 << 3);
        assert_eq!(SINGLE.classify(0), 1 << 4);
        assert_eq!(SINGLE.classify(1), 1 << 5);
        assert_eq!(SINGLE.classify(1.0f32.to_bits() as u64), 1 << 6);
        assert_eq!(SINGLE.classify(f32::INFINITY.to_bits() as u64), 1 << 7);
        assert_eq!(SINGLE.classify(0x7F80_0001), 1 << 8);
        assert_eq!(SINGLE.classify(0x7FC0_0000), 1 << 9);
        assert_eq!(DOUBLE.classify((-2.5f64).to_bits()), 1 << 1);
        assert_eq!(DOUBLE.classify(CANONICAL_NAN_F64), 1 << 9);
    }

    #[test]
    fn test_unboxed_single_reads_as_nan() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f64(1, 1.0);
        let instr = RvInstr::FpClass { fmt: FpFmt::S, rd: 10, frs1: 1 };
        assert_eq!(exec(&mut cpu, &mut mem, instr).unwrap().value, 1 << 9);
    }

    #[test]
    fn test_fcvt_w_s() {
        let (mut cpu, mut mem) = setup();
        let cvt = |signed| RvInstr::FpToInt { fmt: FpFmt::S, signed, rd: 10, frs1: 1, rm: 0 };

        cpu.write_fp_f32(1, 42.7);
        assert_eq!(exec(&mut cpu, &mut mem, cvt(true)).unwrap().value, 43);
        assert_eq!(cpu.csr_read(CSR_FFLAGS), Some(fflags::NX));

        cpu.write_fp_f32(1, -1.0e20);
        assert_eq!(exec(&mut cpu, &mut mem, cvt(true)).unwrap().value, i32::MIN as u32);
        assert_eq!(exec(&mut cpu, &mut mem, cvt(false)).unwrap().value, 0);

        cpu.write_fp(1, NanBoxed::from_f32_bits(CANONICAL_NAN_F32));
        assert_eq!(exec(&mut cpu, &mut mem, cvt(true)).unwrap().value, i32::MAX as u32);
        assert_eq!(exec(&mut cpu, &mut mem, cvt(false)).unwrap().value, u32::MAX);
    }

    #[test]
    fn test_fcvt_int_to_fp() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(1, -42i32 as u32);
        exec(&mut cpu, &mut mem, RvInstr::IntToFp { fmt: FpFmt::S, signed: true, frd: 1, rs1: 1, rm: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f32(1), -42.0);
        exec(&mut cpu, &mut mem, RvInstr::IntToFp { fmt: FpFmt::D, signed: false, frd: 2, rs1: 1, rm: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f64(2), 4294967254.0);
    }

    #[test]
    fn test_fcvt_between_formats() {
        let (mut cpu, mut mem) = setup();
        cpu.write_fp_f64(1, 0.5);
        exec(&mut cpu, &mut mem, RvInstr::FpConvert { to: FpFmt::S, frd: 2, frs1: 1, rm: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f32(2), 0.5);
        assert!(cpu.read_fp(2).is_boxed());
        exec(&mut cpu, &mut mem, RvInstr::FpConvert { to: FpFmt::D, frd: 3, frs1: 2, rm: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f64(3), 0.5);
    }

    #[test]
    fn test_fmv() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(1, 0x40490FDB);
        exec(&mut cpu, &mut mem, RvInstr::FmvWX { frd: 1, rs1: 1 }).unwrap();
        assert_eq!(cpu.read_fp(1), NanBoxed::from_f32_bits(0x40490FDB));
        let r = exec(&mut cpu, &mut mem, RvInstr::FmvXW { rd: 2, frs1: 1 }).unwrap();
        assert_eq!(r.value, 0x40490FDB);
    }

    #[test]
    fn test_flw_fsw_fld() {
        let (mut cpu, mut mem) = setup();
        let pi_bits = std::f32::consts::PI.to_bits();
        mem.store32(BASE + 0x100, pi_bits).unwrap();

        cpu.write_reg(1, BASE + 0x100);
        exec(&mut cpu, &mut mem, RvInstr::FpLoad { fmt: FpFmt::S, frd: 1, rs1: 1, offset: 0 }).unwrap();
        assert_eq!(cpu.read_fp(1).to_f32_bits(), pi_bits);

        exec(&mut cpu, &mut mem, RvInstr::FpStore { fmt: FpFmt::S, frs2: 1, rs1: 1, offset: 0x100 }).unwrap();
        assert_eq!(mem.load32(BASE + 0x200).unwrap(), pi_bits);

        mem.store64(BASE + 0x300, 2.5f64.to_bits()).unwrap();
        cpu.write_reg(2, BASE + 0x300);
        exec(&mut cpu, &mut mem, RvInstr::FpLoad { fmt: FpFmt::D, frd: 4, rs1: 2, offset: 0 }).unwrap();
        assert_eq!(cpu.read_fp_f64(4), 2.5);
    }
}
