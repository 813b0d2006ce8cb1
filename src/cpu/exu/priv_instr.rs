//! 特权指令执行单元
//!
//! MRET、SRET、WFI 与 SFENCE.VMA

use super::super::trap::{Exception, PrivilegeMode};
use super::super::CpuCore;
use super::{ExecResult, Retire};
use crate::isa::RvInstr;

/// 执行特权指令
pub fn execute(cpu: &mut CpuCore, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let result = match instr {
        RvInstr::Mret => xret(cpu, PrivilegeMode::Machine),
        RvInstr::Sret => xret(cpu, PrivilegeMode::Supervisor),
        // 没有中断控制器可等，也没有 TLB 可刷
        RvInstr::Wfi | RvInstr::SfenceVma { .. } => Ok(Retire::next(next_pc)),
        _ => return None,
    };
    Some(result)
}

/// xRET 只能在不低于对应特权级时执行
fn xret(cpu: &mut CpuCore, mode: PrivilegeMode) -> ExecResult {
    if cpu.privilege() < mode {
        return Err(Exception::illegal());
    }
    let epc = cpu.trap_return(mode);
    Ok(Retire::next(epc))
}
