//! Zicsr 扩展执行单元
//!
//! 实现 CSR 操作指令的执行逻辑

use log::debug;

use super::super::trap::{Exception, PrivilegeMode};
use super::super::CpuCore;
use super::{ExecResult, Retire};
use crate::isa::{CsrOp, CsrSrc, RvInstr};

/// 执行 Zicsr 指令
pub fn execute(cpu: &mut CpuCore, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let RvInstr::Csr { op, rd, csr, src } = instr else {
        return None;
    };
    Some(csr_op(cpu, op, rd, csr, src, next_pc))
}

fn csr_op(cpu: &mut CpuCore, op: CsrOp, rd: u8, csr: u16, src: CsrSrc, next_pc: u32) -> ExecResult {
    // 地址 bit[9:8] 是访问所需的最低特权级
    let required = PrivilegeMode::from_bits(((csr >> 8) & 0x3) as u32);
    if cpu.privilege() < required {
        return Err(Exception::illegal());
    }

    let (operand, src_is_zero) = match src {
        CsrSrc::Reg(rs1) => (cpu.read_reg(rs1), rs1 == 0),
        CsrSrc::Imm(zimm) => (zimm as u32, zimm == 0),
    };

    // 读取没有副作用，CSRRW rd=x0 也照常读取以检查地址是否实现
    let old = cpu.csr_read(csr).ok_or_else(Exception::illegal)?;

    // CSRRS/CSRRC 的源为 x0（或 zimm=0）时不写
    let new = match op {
        CsrOp::Rw => Some(operand),
        CsrOp::Rs if !src_is_zero => Some(old | operand),
        CsrOp::Rc if !src_is_zero => Some(old & !operand),
        _ => None,
    };
    if let Some(value) = new {
        if cpu.csr_is_read_only(csr) {
            debug!("write 0x{:08x} to read-only csr 0x{:03x} ignored", value, csr);
        }
        if !cpu.csr_write(csr, value) {
            return Err(Exception::illegal());
        }
    }

    Ok(Retire::write(rd, old, next_pc))
}
