//! RV32A 原子指令执行单元
//!
//! 单核单线程模型下读-改-写天然不可分割；LR/SC 只保留一个保留地址。

use super::super::trap::{AccessType, Exception, TrapCause};
use super::super::CpuCore;
use super::{ExecResult, Retire};
use crate::isa::{AmoOp, RvInstr};
use crate::memory::{AccessSize, Memory};

pub fn execute(cpu: &mut CpuCore, mem: &mut dyn Memory, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let RvInstr::Amo { op, rd, rs1, rs2, .. } = instr else {
        return None;
    };
    Some(amo(cpu, mem, op, rd, rs1, rs2, next_pc))
}

fn amo(cpu: &mut CpuCore, mem: &mut dyn Memory, op: AmoOp, rd: u8, rs1: u8, rs2: u8, next_pc: u32) -> ExecResult {
    let addr = cpu.read_reg(rs1);
    let src = cpu.read_reg(rs2);

    match op {
        AmoOp::Lr => {
            if addr & 0x3 != 0 {
                return Err(Exception::with_tval(TrapCause::LoadAddressMisaligned, addr));
            }
            let value = cpu.load(mem, addr, AccessSize::Word)? as u32;
            cpu.set_reservation(addr);
            Ok(Retire::write(rd, value, next_pc))
        }
        AmoOp::Sc => {
            if addr & 0x3 != 0 {
                return Err(Exception::with_tval(TrapCause::StoreAddressMisaligned, addr));
            }
            // 无论成功与否保留都被消耗
            if cpu.take_reservation() != Some(addr) {
                return Ok(Retire::write(rd, 1, next_pc));
            }
            cpu.store(mem, addr, AccessSize::Word, src as u64)?;
            Ok(Retire::write(rd, 0, next_pc))
        }
        _ => {
            if addr & 0x3 != 0 {
                return Err(Exception::with_tval(TrapCause::StoreAddressMisaligned, addr));
            }
            // AMO 的读也按写权限翻译，出错报 store 类异常
            let old = cpu.load_as(mem, addr, AccessSize::Word, AccessType::Store)? as u32;
            let new = amo_value(op, old, src);
            cpu.store(mem, addr, AccessSize::Word, new as u64)?;
            cpu.take_reservation();
            Ok(Retire::write(rd, old, next_pc))
        }
    }
}

fn amo_value(op: AmoOp, old: u32, src: u32) -> u32 {
    match op {
        AmoOp::Swap => src,
        AmoOp::Add => old.wrapping_add(src),
        AmoOp::Xor => old ^ src,
        AmoOp::And => old & src,
        AmoOp::Or => old | src,
        AmoOp::Min => (old as i32).min(src as i32) as u32,
        AmoOp::Max => (old as i32).max(src as i32) as u32,
        AmoOp::Minu => old.min(src),
        AmoOp::Maxu => old.max(src),
        AmoOp::Lr | AmoOp::Sc => old,
    }
}
