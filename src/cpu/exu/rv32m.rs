//! RV32M 乘除法执行单元
//!
//! 除零与有符号溢出按 RISC-V 规定返回固定值，不产生异常。

use super::super::CpuCore;
use super::{ExecResult, Retire};
use crate::isa::{MulOp, RvInstr};

/// 执行 RV32M 指令
pub fn execute(cpu: &mut CpuCore, instr: RvInstr, next_pc: u32) -> Option<ExecResult> {
    let RvInstr::Mul { op, rd, rs1, rs2 } = instr else {
        return None;
    };
    let result = muldiv(op, cpu.read_reg(rs1), cpu.read_reg(rs2));
    Some(Ok(Retire::write(rd, result, next_pc)))
}

pub(crate) fn muldiv(op: MulOp, a: u32, b: u32) -> u32 {
    match op {
        MulOp::Mul => a.wrapping_mul(b),
        MulOp::Mulh => ((a as i32 as i64 * b as i32 as i64) >> 32) as u32,
        MulOp::Mulhsu => ((a as i32 as i64 * b as u64 as i64) >> 32) as u32,
        MulOp::Mulhu => ((a as u64 * b as u64) >> 32) as u32,
        MulOp::Div => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                u32::MAX
            } else if a == i32::MIN && b == -1 {
                a as u32
            } else {
                (a / b) as u32
            }
        }
        MulOp::Divu => {
            if b == 0 {
                u32::MAX
            } else {
                a / b
            }
        }
        MulOp::Rem => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                a as u32
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                (a % b) as u32
            }
        }
        MulOp::Remu => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
    }
}
