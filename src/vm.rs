//! 虚拟机状态与运行循环
//!
//! `VmState` 把 `CpuCore` 和 `VmMemory` 组合在一起，对宿主暴露按指令预算运行的
//! `run` 接口。一次 `run` 的结局只有四种：预算用完（暂停）、系统调用事件（暂停，
//! 等待宿主处理）、错误、结束。
//!
//! 系统调用 ABI：a7 为调用号，a0/a1 为参数，返回值写回 a0。

use log::{debug, warn};
use thiserror::Error;

use crate::cpu::csr_def::{CSR_MCAUSE, CSR_MIE};
use crate::cpu::{CpuCore, StepResult, TrapRecord};
use crate::isa::{IsaError, IsaExtensions};
use crate::memory::{MemError, VmMemory};

// ========== 常量 ==========

/// RAM 在地址空间中的起始地址，程序镜像从这里开始
pub const VM_RAM_IMAGE_OFFSET: u32 = 0x8000_0000;
/// 默认 RAM 大小
pub const VM_MEMORY_SIZE: usize = 64 * 1024;
pub use crate::memory::{VM_EXTRAM_BASE, VM_EXTRAM_END};

/// 停止虚拟机
pub const SYSCALL_HALT: u32 = 0x100_0000;
/// 主动让出，宿主直接继续
pub const SYSCALL_YIELD: u32 = 0x100_0001;
/// 栈保护
pub const SYSCALL_STACK_PROTECT: u32 = 0x100_0002;

const REG_A0: u8 = 10;
const REG_A1: u8 = 11;
const REG_A7: u8 = 17;
const REG_SP: u8 = 2;

// ========== 状态与事件 ==========

/// 虚拟机运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmStatus {
    #[default]
    Paused,
    Running,
    Ended,
    Error,
}

/// 对宿主可见的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmErr {
    #[error("vm is not ready to run")]
    NotReady,
    #[error("memory read error")]
    MemRd,
    #[error("memory write error")]
    MemWr,
    #[error("bad syscall code")]
    BadSysCall,
    #[error("vm hung")]
    Hung,
    #[error("internal core error")]
    InternalCore,
    #[error("internal state error")]
    InternalState,
    #[error("bad arguments passed to vm")]
    Args,
}

/// 系统调用快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallEvt {
    /// a7
    pub code: u32,
    /// a0, a1
    pub params: [u32; 2],
}

/// `run` 返回给宿主的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmEvt {
    Err { code: VmErr, msg: String },
    Syscall(SyscallEvt),
    End,
}

impl VmEvt {
    fn err(code: VmErr) -> Self {
        VmEvt::Err { code, msg: code.to_string() }
    }
}

/// 系统调用参数槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmArg {
    /// a0
    Arg0,
    /// a1
    Arg1,
    /// 返回值，与 Arg0 同为 a0
    Ret,
}

impl VmArg {
    fn reg(self) -> u8 {
        match self {
            VmArg::Arg0 | VmArg::Ret => REG_A0,
            VmArg::Arg1 => REG_A1,
        }
    }
}

// ========== VmState ==========

/// 虚拟机完整状态
pub struct VmState {
    cpu: CpuCore,
    memory: VmMemory,
    status: VmStatus,
    err: Option<VmErr>,
    /// 等待宿主处理的系统调用
    pending: Option<SyscallEvt>,
}

impl VmState {
    /// 默认 ISA（rv32imafdcv）、RAM 位于 `VM_RAM_IMAGE_OFFSET`
    pub fn new(memory_size: usize) -> Result<Self, IsaError> {
        Self::with_isa(memory_size, VM_RAM_IMAGE_OFFSET, &IsaExtensions::default())
    }

    pub fn with_isa(memory_size: usize, base: u32, isa: &IsaExtensions) -> Result<Self, IsaError> {
        let cpu = CpuCore::new(base, isa)?;
        Ok(Self::with_parts(cpu, VmMemory::new(memory_size, base)))
    }

    /// 用已有的核心和内存组装虚拟机
    ///
    /// PC 指向 RAM 起始，sp 指向 RAM 末尾下方 16 字节对齐处
    pub fn with_parts(mut cpu: CpuCore, memory: VmMemory) -> Self {
        let base = memory.base_addr();
        let end = base.wrapping_add(memory.size() as u32);
        cpu.set_pc(base);
        cpu.write_reg(REG_SP, (end & !0xF).wrapping_sub(16));
        VmState {
            cpu,
            memory,
            status: VmStatus::Paused,
            err: None,
            pending: None,
        }
    }

    /// 把原始镜像拷贝到 RAM 起始处
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), MemError> {
        let base = self.memory.base_addr();
        self.memory.write_bytes(base, image)
    }

    pub fn cpu(&self) -> &CpuCore {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuCore {
        &mut self.cpu
    }

    pub fn memory(&self) -> &VmMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut VmMemory {
        &mut self.memory
    }

    pub fn program_counter(&self) -> u32 {
        self.cpu.pc()
    }

    pub fn set_program_counter(&mut self, pc: u32) {
        self.cpu.set_pc(pc);
    }

    // ========== 状态 ==========

    pub fn status(&self) -> VmStatus {
        self.status
    }

    /// 最近一次记录的错误
    pub fn error(&self) -> Option<VmErr> {
        self.err
    }

    /// Error 状态只能由 `clear_error` 离开
    pub fn set_status(&mut self, status: VmStatus) {
        if self.status != VmStatus::Error {
            self.status = status;
        }
    }

    /// 进入 Error 状态，只记录第一个错误
    pub fn set_status_err(&mut self, err: VmErr) {
        if self.status != VmStatus::Error {
            self.status = VmStatus::Error;
            self.err = Some(err);
        }
    }

    pub fn clear_error(&mut self) {
        if self.status == VmStatus::Error {
            self.status = VmStatus::Paused;
        }
    }

    pub fn has_ended(&self) -> bool {
        self.status == VmStatus::Ended
    }

    // ========== 系统调用参数 ==========

    pub fn pending_syscall(&self) -> Option<&SyscallEvt> {
        self.pending.as_ref()
    }

    /// 读取系统调用参数；没有挂起的系统调用时记录 `VmErr::Args` 并返回 0
    pub fn arg_get(&mut self, arg: VmArg) -> u32 {
        if self.pending.is_none() {
            self.set_status_err(VmErr::Args);
            return 0;
        }
        self.cpu.read_reg(arg.reg())
    }

    /// 写回系统调用参数或返回值
    pub fn arg_set(&mut self, arg: VmArg, value: u32) {
        if self.pending.is_none() {
            self.set_status_err(VmErr::Args);
            return;
        }
        self.cpu.write_reg(arg.reg(), value);
    }

    // ========== 运行循环 ==========

    /// 最多执行 `meter` 条指令（0 视为 1）
    ///
    /// 返回实际执行的指令数与事件；事件为 None 表示预算用完，虚拟机处于暂停状态
    pub fn run(&mut self, meter: u32) -> (u32, Option<VmEvt>) {
        self.clear_error();
        let meter = meter.max(1);

        if self.status != VmStatus::Paused {
            self.set_status_err(VmErr::NotReady);
            warn!("run called in state {:?}", self.status);
            return (0, Some(VmEvt::err(VmErr::NotReady)));
        }

        self.pending = None;
        self.set_status(VmStatus::Running);

        let mut executed = 0;
        while self.status == VmStatus::Running && executed < meter {
            self.cpu.check_interrupts();

            let result = self.cpu.step(&mut self.memory);
            executed += 1;

            match result {
                StepResult::Retired { pc, next_pc } => {
                    // 跳转到自身且没有中断可以打破循环
                    if next_pc == pc && self.cpu.csr(CSR_MIE) == 0 {
                        self.set_status_err(VmErr::Hung);
                    }
                }
                StepResult::Trapped(trap) => {
                    self.cpu.set_csr(CSR_MCAUSE, trap.cause.to_cause_value());
                    if trap.cause.is_syscall() {
                        let evt = self.enter_syscall(&trap);
                        self.set_status(VmStatus::Paused);
                        return (executed, Some(VmEvt::Syscall(evt)));
                    }
                    let err = if trap.cause.is_read_fault() {
                        VmErr::MemRd
                    } else if trap.cause.is_write_fault() {
                        VmErr::MemWr
                    } else {
                        VmErr::InternalCore
                    };
                    warn!(
                        "{:?} at pc=0x{:08x} tval=0x{:08x}: {}",
                        trap.cause, trap.epc, trap.tval, err
                    );
                    self.set_status_err(err);
                }
            }
        }

        if self.status == VmStatus::Running {
            self.set_status(VmStatus::Paused);
        }

        let evt = match self.status {
            VmStatus::Ended => Some(VmEvt::End),
            VmStatus::Error => Some(VmEvt::err(self.err.unwrap_or(VmErr::InternalState))),
            _ => None,
        };
        (executed, evt)
    }

    /// 记录系统调用；客户机没有安装 trap handler 时由宿主充当 handler，
    /// 直接返回到 ECALL/EBREAK 之后
    fn enter_syscall(&mut self, trap: &TrapRecord) -> SyscallEvt {
        if trap.handler == 0 {
            let epc = self.cpu.trap_return(trap.target);
            self.cpu.set_pc(epc.wrapping_add(trap.len as u32));
        }
        let evt = SyscallEvt {
            code: self.cpu.read_reg(REG_A7),
            params: [self.cpu.read_reg(REG_A0), self.cpu.read_reg(REG_A1)],
        };
        debug!(
            "syscall 0x{:x}({:#x}, {:#x}) from pc=0x{:08x}",
            evt.code, evt.params[0], evt.params[1], trap.epc
        );
        self.pending = Some(evt);
        evt
    }
}
