//! RV32I 基础整数执行单元

use super::super::trap::{Exception, TrapCause};
use super::super::CpuCore;
use super::{jump_target, ExecResult, Retire};
use crate::isa::{AluOp, BranchCond, LoadWidth, RvInstr, StoreWidth};
use crate::memory::{AccessSize, Memory};

/// 执行 RV32I 指令，不认识的指令返回 None
pub fn execute(
    cpu: &mut CpuCore,
    mem: &mut dyn Memory,
    instr: RvInstr,
    pc: u32,
    next_pc: u32,
) -> Option<ExecResult> {
    let result = match instr {
        // ========== U-type ==========
        RvInstr::Lui { rd, imm } => Ok(Retire::write(rd, imm as u32, next_pc)),
        RvInstr::Auipc { rd, imm } => Ok(Retire::write(rd, pc.wrapping_add(imm as u32), next_pc)),

        // ========== 控制流 ==========
        RvInstr::Jal { rd, offset } => {
            jump_target(cpu, pc.wrapping_add(offset as u32)).map(|target| Retire::write(rd, next_pc, target))
        }
        RvInstr::Jalr { rd, rs1, offset } => {
            let target = cpu.read_reg(rs1).wrapping_add(offset as u32) & !1;
            jump_target(cpu, target).map(|target| Retire::write(rd, next_pc, target))
        }
        RvInstr::Branch { cond, rs1, rs2, offset } => {
            if branch_taken(cond, cpu.read_reg(rs1), cpu.read_reg(rs2)) {
                jump_target(cpu, pc.wrapping_add(offset as u32)).map(Retire::next)
            } else {
                Ok(Retire::next(next_pc))
            }
        }

        // ========== 访存 ==========
        RvInstr::Load { width, rd, rs1, offset } => load(cpu, mem, width, rd, rs1, offset, next_pc),
        RvInstr::Store { width, rs1, rs2, offset } => store(cpu, mem, width, rs1, rs2, offset, next_pc),

        // ========== 算术/逻辑 ==========
        RvInstr::AluImm { op, rd, rs1, imm } => {
            Ok(Retire::write(rd, alu(op, cpu.read_reg(rs1), imm as u32), next_pc))
        }
        RvInstr::AluReg { op, rd, rs1, rs2 } => {
            Ok(Retire::write(rd, alu(op, cpu.read_reg(rs1), cpu.read_reg(rs2)), next_pc))
        }

        // ========== 系统 ==========
        // 单核模型中 fence 视为立即完成，也不模拟指令缓存
        RvInstr::Fence { .. } | RvInstr::FenceI => Ok(Retire::next(next_pc)),
        RvInstr::Ecall => Err(Exception::with_tval(TrapCause::ecall_from(cpu.privilege()), 0)),
        RvInstr::Ebreak => Err(Exception::with_tval(TrapCause::Breakpoint, pc)),

        _ => return None,
    };
    Some(result)
}

/// 寄存器与立即数形式共用的 ALU，移位量取低 5 位
pub(crate) fn alu(op: AluOp, a: u32, b: u32) -> u32 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Sll => a << (b & 0x1F),
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::Sltu => (a < b) as u32,
        AluOp::Xor => a ^ b,
        AluOp::Srl => a >> (b & 0x1F),
        AluOp::Sra => ((a as i32) >> (b & 0x1F)) as u32,
        AluOp::Or => a | b,
        AluOp::And => a & b,
    }
}

fn branch_taken(cond: BranchCond, a: u32, b: u32) -> bool {
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i32) < (b as i32),
        BranchCond::Ge => (a as i32) >= (b as i32),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    }
}

fn load(
    cpu: &mut CpuCore,
    mem: &mut dyn Memory,
    width: LoadWidth,
    rd: u8,
    rs1: u8,
    offset: i32,
    next_pc: u32,
) -> ExecResult {
    let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
    let value = match width {
        LoadWidth::Byte => cpu.load(mem, addr, AccessSize::Byte)? as u8 as i8 as i32 as u32,
        LoadWidth::Half => cpu.load(mem, addr, AccessSize::Half)? as u16 as i16 as i32 as u32,
        LoadWidth::Word => cpu.load(mem, addr, AccessSize::Word)? as u32,
        LoadWidth::ByteUnsigned => cpu.load(mem, addr, AccessSize::Byte)? as u32,
        LoadWidth::HalfUnsigned => cpu.load(mem, addr, AccessSize::Half)? as u32,
    };
    Ok(Retire::write(rd, value, next_pc))
}

fn store(
    cpu: &mut CpuCore,
    mem: &mut dyn Memory,
    width: StoreWidth,
    rs1: u8,
    rs2: u8,
    offset: i32,
    next_pc: u32,
) -> ExecResult {
    let addr = cpu.read_reg(rs1).wrapping_add(offset as u32);
    let value = cpu.read_reg(rs2) as u64;
    let size = match width {
        StoreWidth::Byte => AccessSize::Byte,
        StoreWidth::Half => AccessSize::Half,
        StoreWidth::Word => AccessSize::Word,
    };
    cpu.store(mem, addr, size, value)?;
    Ok(Retire::next(next_pc))
}
