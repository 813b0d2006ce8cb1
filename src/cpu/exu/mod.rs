//! 执行单元，按 ISA 模块拆分
//!
//! 每个单元对自己不认识的指令返回 `None`，由 `execute` 依次尝试。
//! 执行成功返回 `Retire`（目的寄存器、写回值、下一条 PC），
//! 失败返回 `Exception`，此时架构状态不得被部分修改。

pub mod priv_instr;
pub mod rv32a;
pub mod rv32f;
pub mod rv32i;
pub mod rv32m;
pub mod rvv;
pub mod zicsr;

use super::trap::{Exception, TrapCause};
use super::CpuCore;
use crate::isa::DecodedInstr;
use crate::memory::Memory;

/// 指令退休信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retire {
    /// 0 表示不写回整数寄存器
    pub rd: u8,
    pub value: u32,
    pub next_pc: u32,
}

impl Retire {
    #[inline]
    pub fn next(next_pc: u32) -> Self {
        Retire { rd: 0, value: 0, next_pc }
    }

    #[inline]
    pub fn write(rd: u8, value: u32, next_pc: u32) -> Self {
        Retire { rd, value, next_pc }
    }
}

pub type ExecResult = Result<Retire, Exception>;

/// 执行已解码的指令，委托到分 ISA 的执行单元
pub fn execute(cpu: &mut CpuCore, mem: &mut dyn Memory, decoded: &DecodedInstr, pc: u32) -> ExecResult {
    let instr = decoded.instr;
    let next_pc = pc.wrapping_add(decoded.len as u32);

    if let Some(r) = rv32i::execute(cpu, mem, instr, pc, next_pc) {
        return r;
    }
    if let Some(r) = rv32m::execute(cpu, instr, next_pc) {
        return r;
    }
    if let Some(r) = rv32a::execute(cpu, mem, instr, next_pc) {
        return r;
    }
    if let Some(r) = rv32f::execute(cpu, mem, instr, next_pc) {
        return r;
    }
    if let Some(r) = rvv::execute(cpu, instr, next_pc) {
        return r;
    }
    if let Some(r) = zicsr::execute(cpu, instr, next_pc) {
        return r;
    }
    if let Some(r) = priv_instr::execute(cpu, instr, next_pc) {
        return r;
    }

    Err(Exception::illegal())
}

/// 跳转目标对齐检查：启用 C 时 2 字节对齐，否则 4 字节
#[inline]
pub(crate) fn jump_target(cpu: &CpuCore, target: u32) -> Result<u32, Exception> {
    let align_mask = if cpu.has_compressed() { 0x1 } else { 0x3 };
    if target & align_mask != 0 {
        return Err(Exception::with_tval(TrapCause::InstructionAddressMisaligned, target));
    }
    Ok(target)
}
