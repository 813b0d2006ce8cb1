//! RVV 执行单元（VLEN = 128，SEW 8/16/32，LMUL 1/2/4/8）
//!
//! 元素按 vstart..vl 逐个执行；vm = 0 时 v0 对应位为 0 的元素被跳过，
//! 目的元素保持不变。指令完成后 vstart 归零。

use log::debug;
use simple_soft_float::{F32, FPState, RoundingMode};

use super::super::csr_def::{CSR_VL, CSR_VSTART, CSR_VTYPE};
use super::super::status::VLEN_BYTES;
use super::super::trap::Exception;
use super::super::CpuCore;
use super::rv32f::{apply_fp_state, decode_rounding_mode, SINGLE};
use super::{ExecResult, Retire};
use crate::isa::{RvInstr, VecFpOp, VecIntOp, VecOperand};

/// vtype.vill
pub const VTYPE_VILL: u32 = 1 << 31;

/// 已校验的 vtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VType {
    /// 元素字节数
    pub sew_bytes: usize,
    /// 寄存器组大小
    pub lmul: usize,
}

impl VType {
    /// 解析 vtype，非法组合返回 None
    ///
    /// vlmul 只接受整数倍 1/2/4/8，vsew 只接受 8/16/32，其余保留位必须为 0
    pub fn parse(raw: u32) -> Option<Self> {
        if raw & !0xFF != 0 {
            return None;
        }
        let vlmul = raw & 0x7;
        let vsew = (raw >> 3) & 0x7;
        if vlmul > 3 || vsew > 2 {
            return None;
        }
        Some(VType {
            sew_bytes: 1 << vsew,
            lmul: 1 << vlmul,
        })
    }

    #[inline]
    pub fn vlmax(&self) -> u32 {
        (VLEN_BYTES * self.lmul / self.sew_bytes) as u32
    }

    #[inline]
    fn sew_bits(&self) -> u32 {
        self.sew_bytes as u32 * 8
    }

    #[inline]
    fn elem_mask(&self) -> u32 {
        u32::MAX >> (32 - self.sew_bits())
    }
}

pub fn execute(cpu: &mut CpuCore, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let result = match instr {
        // rs1 = x0 时 AVL 取 VLMAX
        RvInstr::Vsetvli { rd, rs1, vtypei } => {
            let avl = (rs1 != 0).then(|| cpu.read_reg(rs1));
            Ok(vset(cpu, rd, avl, vtypei, next_pc))
        }
        RvInstr::Vsetivli { rd, uimm, vtypei } => Ok(vset(cpu, rd, Some(uimm as u32), vtypei, next_pc)),
        RvInstr::Vsetvl { rd, rs1, rs2 } => {
            let avl = (rs1 != 0).then(|| cpu.read_reg(rs1));
            let vtype = cpu.read_reg(rs2);
            Ok(vset(cpu, rd, avl, vtype, next_pc))
        }
        RvInstr::VecInt { op, vd, vs2, src, vm } => vec_int(cpu, op, vd, vs2, src, vm).map(|()| Retire::next(next_pc)),
        RvInstr::VecFp { op, vd, vs2, src, vm } => vec_fp(cpu, op, vd, vs2, src, vm).map(|()| Retire::next(next_pc)),
        _ => return None,
    };
    Some(result)
}

/// vsetvl 系列：非法 vtype 不产生异常，只置 vill 并令 vl = 0
fn vset(cpu: &mut CpuCore, rd: u8, avl: Option<u32>, raw: u32, next_pc: u32) -> Retire {
    let (vtype, vl) = match VType::parse(raw) {
        Some(vt) => {
            let vlmax = vt.vlmax();
            (raw, avl.map_or(vlmax, |avl| avl.min(vlmax)))
        }
        None => (VTYPE_VILL, 0),
    };
    cpu.set_csr(CSR_VTYPE, vtype);
    cpu.set_csr(CSR_VL, vl);
    cpu.set_csr(CSR_VSTART, 0);
    debug!("vsetvl: vtype=0x{:08x} vl={} (avl={:?})", vtype, vl, avl);
    Retire::write(rd, vl, next_pc)
}

/// 当前 vtype；vill 置位时任何向量运算都是非法指令
fn current_vtype(cpu: &CpuCore) -> Result<VType, Exception> {
    VType::parse(cpu.csr(CSR_VTYPE)).ok_or_else(Exception::illegal)
}

/// 寄存器组必须按 LMUL 对齐且不越过 v31
fn check_group(reg: u8, vt: &VType) -> Result<(), Exception> {
    let reg = reg as usize;
    if reg % vt.lmul != 0 || reg + vt.lmul > 32 {
        return Err(Exception::illegal());
    }
    Ok(())
}

fn check_operands(vt: &VType, vd: u8, vs2: u8, src: VecOperand, vm: bool) -> Result<(), Exception> {
    check_group(vd, vt)?;
    check_group(vs2, vt)?;
    if let VecOperand::Vector(vs1) = src {
        check_group(vs1, vt)?;
    }
    // 带掩码时目的寄存器组不能覆盖 v0
    if !vm && vd == 0 {
        return Err(Exception::illegal());
    }
    Ok(())
}

/// 本条指令要处理的元素下标，已剔除被掩码关闭的元素
///
/// 上界取 min(vl, VLMAX)，下标总落在已校验的寄存器组内。
fn active_elements(cpu: &CpuCore, vt: &VType, vm: bool) -> Vec<usize> {
    let start = cpu.csr(CSR_VSTART) as usize;
    let end = (cpu.csr(CSR_VL) as usize).min(vt.vlmax() as usize);
    (start..end).filter(|&i| vm || cpu.vec().mask_bit(i)).collect()
}

fn int_op(op: VecIntOp, a: u32, b: u32, vt: &VType) -> u32 {
    let bits = vt.sew_bits();
    let shamt = b & (bits - 1);
    let r = match op {
        VecIntOp::Add => a.wrapping_add(b),
        VecIntOp::Sub => a.wrapping_sub(b),
        VecIntOp::Rsub => b.wrapping_sub(a),
        VecIntOp::And => a & b,
        VecIntOp::Or => a | b,
        VecIntOp::Xor => a ^ b,
        VecIntOp::Sll => a << shamt,
        VecIntOp::Srl => a >> shamt,
        VecIntOp::Sra => {
            // 先按 SEW 符号扩展
            let signed = ((a << (32 - bits)) as i32) >> (32 - bits);
            (signed >> shamt) as u32
        }
    };
    r & vt.elem_mask()
}

fn vec_int(cpu: &mut CpuCore, op: VecIntOp, vd: u8, vs2: u8, src: VecOperand, vm: bool) -> Result<(), Exception> {
    let vt = current_vtype(cpu)?;
    check_operands(&vt, vd, vs2, src, vm)?;

    let scalar = match src {
        VecOperand::Vector(_) => 0,
        VecOperand::Scalar(rs1) => cpu.read_reg(rs1),
        VecOperand::Imm(simm5) => simm5 as u32,
    } & vt.elem_mask();

    for i in active_elements(cpu, &vt, vm) {
        let vec = cpu.vec();
        let a = vec.read_elem(vs2, i, vt.sew_bytes);
        let b = match src {
            VecOperand::Vector(vs1) => vec.read_elem(vs1, i, vt.sew_bytes),
            _ => scalar,
        };
        let r = int_op(op, a, b, &vt);
        cpu.vec_mut().write_elem(vd, i, vt.sew_bytes, r);
    }

    cpu.set_csr(CSR_VSTART, 0);
    Ok(())
}

fn fp_op(op: VecFpOp, a: &F32, b: &F32, rm: RoundingMode, st: &mut FPState) -> F32 {
    match op {
        VecFpOp::Add => a.add(b, Some(rm), Some(st)),
        VecFpOp::Sub => a.sub(b, Some(rm), Some(st)),
        VecFpOp::Rsub => b.sub(a, Some(rm), Some(st)),
        VecFpOp::Mul => a.mul(b, Some(rm), Some(st)),
        VecFpOp::Div => a.div(b, Some(rm), Some(st)),
        VecFpOp::Rdiv => b.div(a, Some(rm), Some(st)),
    }
}

/// 单精度向量浮点，要求 SEW = 32，舍入模式取 frm
fn vec_fp(cpu: &mut CpuCore, op: VecFpOp, vd: u8, vs2: u8, src: VecOperand, vm: bool) -> Result<(), Exception> {
    let vt = current_vtype(cpu)?;
    if vt.sew_bytes != 4 {
        return Err(Exception::illegal());
    }
    check_operands(&vt, vd, vs2, src, vm)?;
    let rm = decode_rounding_mode(cpu, 0b111).ok_or_else(Exception::illegal)?;

    let scalar = match src {
        VecOperand::Scalar(rs1) => cpu.read_fp(rs1).to_f32_bits(),
        _ => 0,
    };

    let mut st = FPState::default();
    for i in active_elements(cpu, &vt, vm) {
        let vec = cpu.vec();
        let a = F32::from_bits(vec.read_elem(vs2, i, 4));
        let b = F32::from_bits(match src {
            VecOperand::Vector(vs1) => vec.read_elem(vs1, i, 4),
            _ => scalar,
        });
        let r = fp_op(op, &a, &b, rm, &mut st);
        let bits = SINGLE.canonicalize(r.into_bits() as u64) as u32;
        cpu.vec_mut().write_elem(vd, i, 4, bits);
    }
    apply_fp_state(cpu, &st);

    cpu.set_csr(CSR_VSTART, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::IsaExtensions;

    fn setup() -> CpuCore {
        CpuCore::new(0x8000_0000, &IsaExtensions::default()).unwrap()
    }

    /// e{sew} m{lmul} 的 vtypei
    fn vtypei(sew_bits: u32, lmul: u32) -> u32 {
        ((sew_bits / 8).trailing_zeros() << 3) | lmul.trailing_zeros()
    }

    fn set_elems(cpu: &mut CpuCore, reg: u8, sew_bytes: usize, values: &[u32]) {
        for (i, &v) in values.iter().enumerate() {
            cpu.vec_mut().write_elem(reg, i, sew_bytes, v);
        }
    }

    #[test]
    fn test_vtype_parse() {
        assert_eq!(VType::parse(vtypei(32, 1)), Some(VType { sew_bytes: 4, lmul: 1 }));
        assert_eq!(VType::parse(vtypei(8, 8)).map(|v| v.vlmax()), Some(128));
        // SEW=64 不支持
        assert_eq!(VType::parse(3 << 3), None);
        // 分数 LMUL
        assert_eq!(VType::parse(0b111), None);
        // 保留位
        assert_eq!(VType::parse(1 << 8), None);
        // vta/vma 合法
        assert!(VType::parse(vtypei(16, 2) | 0xC0).is_some());
    }

    #[test]
    fn test_vsetvli_clamps_to_vlmax() {
        let mut cpu = setup();
        cpu.write_reg(10, 100);
        let r = execute(&mut cpu, RvInstr::Vsetvli { rd: 11, rs1: 10, vtypei: vtypei(32, 1) }, 4)
            .unwrap()
            .unwrap();
        assert_eq!(r.rd, 11);
        assert_eq!(r.value, 4);
        assert_eq!(cpu.csr(CSR_VL), 4);

        cpu.write_reg(10, 3);
        execute(&mut cpu, RvInstr::Vsetvli { rd: 11, rs1: 10, vtypei: vtypei(32, 2) }, 4);
        assert_eq!(cpu.csr(CSR_VL), 3);
    }

    #[test]
    fn test_vsetvli_x0_avl_is_vlmax() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetvli { rd: 0, rs1: 0, vtypei: vtypei(16, 4) }, 4);
        assert_eq!(cpu.csr(CSR_VL), 32);
    }

    #[test]
    fn test_illegal_vtype_sets_vill() {
        let mut cpu = setup();
        let r = execute(&mut cpu, RvInstr::Vsetivli { rd: 5, uimm: 4, vtypei: 3 << 3 }, 4)
            .unwrap()
            .unwrap();
        assert_eq!(r.value, 0);
        assert_eq!(cpu.csr(CSR_VTYPE), VTYPE_VILL);
        assert_eq!(cpu.csr(CSR_VL), 0);

        // vill 状态下执行向量运算是非法指令
        let add = RvInstr::VecInt { op: VecIntOp::Add, vd: 1, vs2: 2, src: VecOperand::Vector(3), vm: true };
        assert_eq!(execute(&mut cpu, add, 4), Some(Err(Exception::illegal())));
    }

    #[test]
    fn test_vadd_vv_and_vi() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 4, vtypei: vtypei(32, 1) }, 4);
        set_elems(&mut cpu, 2, 4, &[1, 2, 3, 4]);
        set_elems(&mut cpu, 3, 4, &[10, 20, 30, 40]);

        let add = RvInstr::VecInt { op: VecIntOp::Add, vd: 1, vs2: 2, src: VecOperand::Vector(3), vm: true };
        execute(&mut cpu, add, 4).unwrap().unwrap();
        let out: Vec<u32> = (0..4).map(|i| cpu.vec().read_elem(1, i, 4)).collect();
        assert_eq!(out, vec![11, 22, 33, 44]);

        let rsub = RvInstr::VecInt { op: VecIntOp::Rsub, vd: 1, vs2: 2, src: VecOperand::Imm(-1), vm: true };
        execute(&mut cpu, rsub, 4).unwrap().unwrap();
        assert_eq!(cpu.vec().read_elem(1, 0, 4), -2i32 as u32);
        assert_eq!(cpu.csr(CSR_VSTART), 0);
    }

    #[test]
    fn test_masked_elements_untouched() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 4, vtypei: vtypei(32, 1) }, 4);
        set_elems(&mut cpu, 2, 4, &[1, 1, 1, 1]);
        set_elems(&mut cpu, 4, 4, &[7, 7, 7, 7]);
        // v0 掩码 0b0101
        cpu.vec_mut().reg_mut(0)[0] = 0b0101;
        cpu.write_reg(5, 100);

        let add = RvInstr::VecInt { op: VecIntOp::Add, vd: 4, vs2: 2, src: VecOperand::Scalar(5), vm: false };
        execute(&mut cpu, add, 4).unwrap().unwrap();
        let out: Vec<u32> = (0..4).map(|i| cpu.vec().read_elem(4, i, 4)).collect();
        assert_eq!(out, vec![101, 7, 101, 7]);
    }

    #[test]
    fn test_elements_stop_at_vlmax() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 4, vtypei: vtypei(32, 1) }, 4);
        // 架构写入不能改 vl
        assert!(cpu.csr_write(CSR_VL, 0x10000));
        assert_eq!(cpu.csr(CSR_VL), 4);

        // 即使 vl 超过 VLMAX，也只处理 v4 组内的 4 个元素
        cpu.set_csr(CSR_VL, 0x10000);
        cpu.vec_mut().reg_mut(0).fill(0xFF);
        set_elems(&mut cpu, 2, 4, &[1, 2, 3, 4]);
        set_elems(&mut cpu, 5, 4, &[9, 9, 9, 9]);
        let add = RvInstr::VecInt { op: VecIntOp::Add, vd: 4, vs2: 2, src: VecOperand::Imm(1), vm: false };
        execute(&mut cpu, add, 4).unwrap().unwrap();

        let out: Vec<u32> = (0..4).map(|i| cpu.vec().read_elem(4, i, 4)).collect();
        assert_eq!(out, vec![2, 3, 4, 5]);
        let next: Vec<u32> = (0..4).map(|i| cpu.vec().read_elem(5, i, 4)).collect();
        assert_eq!(next, vec![9, 9, 9, 9]);
        assert_eq!(cpu.csr(CSR_VSTART), 0);
    }

    #[test]
    fn test_sew8_shift_and_wrap() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 2, vtypei: vtypei(8, 1) }, 4);
        set_elems(&mut cpu, 2, 1, &[0x80, 0xFF]);

        let sra = RvInstr::VecInt { op: VecIntOp::Sra, vd: 1, vs2: 2, src: VecOperand::Imm(1), vm: true };
        execute(&mut cpu, sra, 4).unwrap().unwrap();
        assert_eq!(cpu.vec().read_elem(1, 0, 1), 0xC0);

        // 移位量按 SEW 取模：9 & 7 = 1
        let srl = RvInstr::VecInt { op: VecIntOp::Srl, vd: 1, vs2: 2, src: VecOperand::Imm(9), vm: true };
        execute(&mut cpu, srl, 4).unwrap().unwrap();
        assert_eq!(cpu.vec().read_elem(1, 0, 1), 0x40);

        let add = RvInstr::VecInt { op: VecIntOp::Add, vd: 1, vs2: 2, src: VecOperand::Imm(1), vm: true };
        execute(&mut cpu, add, 4).unwrap().unwrap();
        assert_eq!(cpu.vec().read_elem(1, 1, 1), 0);
    }

    #[test]
    fn test_register_group_alignment() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 8, vtypei: vtypei(32, 2) }, 4);
        let bad = RvInstr::VecInt { op: VecIntOp::Add, vd: 1, vs2: 2, src: VecOperand::Vector(4), vm: true };
        assert_eq!(execute(&mut cpu, bad, 4), Some(Err(Exception::illegal())));

        // m2 下 8 个元素跨越 v2、v3
        set_elems(&mut cpu, 2, 4, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let ok = RvInstr::VecInt { op: VecIntOp::Sll, vd: 6, vs2: 2, src: VecOperand::Imm(1), vm: true };
        execute(&mut cpu, ok, 4).unwrap().unwrap();
        assert_eq!(cpu.vec().read_elem(7, 3, 4), 16);
    }

    #[test]
    fn test_vfadd_vf() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 2, vtypei: vtypei(32, 1) }, 4);
        set_elems(&mut cpu, 2, 4, &[1.5f32.to_bits(), 2.0f32.to_bits()]);
        cpu.write_fp_f32(1, 0.5);

        let add = RvInstr::VecFp { op: VecFpOp::Add, vd: 1, vs2: 2, src: VecOperand::Scalar(1), vm: true };
        execute(&mut cpu, add, 4).unwrap().unwrap();
        assert_eq!(f32::from_bits(cpu.vec().read_elem(1, 0, 4)), 2.0);
        assert_eq!(f32::from_bits(cpu.vec().read_elem(1, 1, 4)), 2.5);

        let rdiv = RvInstr::VecFp { op: VecFpOp::Rdiv, vd: 1, vs2: 2, src: VecOperand::Scalar(1), vm: true };
        execute(&mut cpu, rdiv, 4).unwrap().unwrap();
        assert_eq!(f32::from_bits(cpu.vec().read_elem(1, 1, 4)), 0.25);
    }

    #[test]
    fn test_vfp_requires_sew32() {
        let mut cpu = setup();
        execute(&mut cpu, RvInstr::Vsetivli { rd: 0, uimm: 2, vtypei: vtypei(16, 1) }, 4);
        let add = RvInstr::VecFp { op: VecFpOp::Add, vd: 1, vs2: 2, src: VecOperand::Vector(3), vm: true };
        assert_eq!(execute(&mut cpu, add, 4), Some(Err(Exception::illegal())));
    }
}
