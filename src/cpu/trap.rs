//! Trap 与特权级定义
//!
//! 同步异常由执行单元以 `Exception` 返回，异步中断由运行循环在取指前检查。
//! 两者最终都通过 `CpuCore::take_trap` 进入 M 或 S 态处理程序。

/// 特权级模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum PrivilegeMode {
    User = 0,
    Supervisor = 1,
    #[default]
    Machine = 3,
}

impl PrivilegeMode {
    /// 从 2-bit 编码创建特权级，保留编码 2 视为 Machine
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => PrivilegeMode::User,
            1 => PrivilegeMode::Supervisor,
            _ => PrivilegeMode::Machine,
        }
    }

    pub fn to_bits(self) -> u32 {
        self as u32
    }
}

/// 访存类别，决定地址翻译使用的权限位以及出错时的异常码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Fetch,
    Load,
    Store,
}

/// Trap 原因
///
/// 编码遵循 mcause/scause：bit 31 表示中断，低位为原因码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    // ========== 异常 ==========
    InstructionAddressMisaligned,
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreAddressMisaligned,
    StoreAccessFault,
    EcallFromU,
    EcallFromS,
    EcallFromM,
    InstructionPageFault,
    LoadPageFault,
    StorePageFault,

    // ========== 中断 ==========
    SupervisorSoftwareInterrupt,
    MachineSoftwareInterrupt,
    SupervisorTimerInterrupt,
    MachineTimerInterrupt,
    SupervisorExternalInterrupt,
    MachineExternalInterrupt,
}

impl TrapCause {
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            TrapCause::SupervisorSoftwareInterrupt
                | TrapCause::MachineSoftwareInterrupt
                | TrapCause::SupervisorTimerInterrupt
                | TrapCause::MachineTimerInterrupt
                | TrapCause::SupervisorExternalInterrupt
                | TrapCause::MachineExternalInterrupt
        )
    }

    /// 原因码（mcause 低位）
    pub fn code(&self) -> u32 {
        match self {
            TrapCause::InstructionAddressMisaligned => 0,
            TrapCause::InstructionAccessFault => 1,
            TrapCause::IllegalInstruction => 2,
            TrapCause::Breakpoint => 3,
            TrapCause::LoadAddressMisaligned => 4,
            TrapCause::LoadAccessFault => 5,
            TrapCause::StoreAddressMisaligned => 6,
            TrapCause::StoreAccessFault => 7,
            TrapCause::EcallFromU => 8,
            TrapCause::EcallFromS => 9,
            TrapCause::EcallFromM => 11,
            TrapCause::InstructionPageFault => 12,
            TrapCause::LoadPageFault => 13,
            TrapCause::StorePageFault => 15,
            TrapCause::SupervisorSoftwareInterrupt => 1,
            TrapCause::MachineSoftwareInterrupt => 3,
            TrapCause::SupervisorTimerInterrupt => 5,
            TrapCause::MachineTimerInterrupt => 7,
            TrapCause::SupervisorExternalInterrupt => 9,
            TrapCause::MachineExternalInterrupt => 11,
        }
    }

    /// 写入 mcause/scause 的完整值
    pub fn to_cause_value(&self) -> u32 {
        let interrupt_bit = if self.is_interrupt() { 1u32 << 31 } else { 0 };
        interrupt_bit | self.code()
    }

    /// 从 mcause 值还原，未知编码返回 None
    pub fn from_cause_value(value: u32) -> Option<Self> {
        let code = value & 0x7FFF_FFFF;
        let cause = if value & (1 << 31) != 0 {
            match code {
                1 => TrapCause::SupervisorSoftwareInterrupt,
                3 => TrapCause::MachineSoftwareInterrupt,
                5 => TrapCause::SupervisorTimerInterrupt,
                7 => TrapCause::MachineTimerInterrupt,
                9 => TrapCause::SupervisorExternalInterrupt,
                11 => TrapCause::MachineExternalInterrupt,
                _ => return None,
            }
        } else {
            match code {
                0 => TrapCause::InstructionAddressMisaligned,
                1 => TrapCause::InstructionAccessFault,
                2 => TrapCause::IllegalInstruction,
                3 => TrapCause::Breakpoint,
                4 => TrapCause::LoadAddressMisaligned,
                5 => TrapCause::LoadAccessFault,
                6 => TrapCause::StoreAddressMisaligned,
                7 => TrapCause::StoreAccessFault,
                8 => TrapCause::EcallFromU,
                9 => TrapCause::EcallFromS,
                11 => TrapCause::EcallFromM,
                12 => TrapCause::InstructionPageFault,
                13 => TrapCause::LoadPageFault,
                15 => TrapCause::StorePageFault,
                _ => return None,
            }
        };
        Some(cause)
    }

    pub fn ecall_from(mode: PrivilegeMode) -> Self {
        match mode {
            PrivilegeMode::User => TrapCause::EcallFromU,
            PrivilegeMode::Supervisor => TrapCause::EcallFromS,
            PrivilegeMode::Machine => TrapCause::EcallFromM,
        }
    }

    pub fn misaligned(kind: AccessType) -> Self {
        match kind {
            AccessType::Fetch => TrapCause::InstructionAddressMisaligned,
            AccessType::Load => TrapCause::LoadAddressMisaligned,
            AccessType::Store => TrapCause::StoreAddressMisaligned,
        }
    }

    pub fn access_fault(kind: AccessType) -> Self {
        match kind {
            AccessType::Fetch => TrapCause::InstructionAccessFault,
            AccessType::Load => TrapCause::LoadAccessFault,
            AccessType::Store => TrapCause::StoreAccessFault,
        }
    }

    pub fn page_fault(kind: AccessType) -> Self {
        match kind {
            AccessType::Fetch => TrapCause::InstructionPageFault,
            AccessType::Load => TrapCause::LoadPageFault,
            AccessType::Store => TrapCause::StorePageFault,
        }
    }

    /// 是否是读方向的访存错误（取指或加载）
    pub fn is_read_fault(&self) -> bool {
        matches!(
            self,
            TrapCause::InstructionAddressMisaligned
                | TrapCause::InstructionAccessFault
                | TrapCause::LoadAddressMisaligned
                | TrapCause::LoadAccessFault
                | TrapCause::InstructionPageFault
                | TrapCause::LoadPageFault
        )
    }

    pub fn is_write_fault(&self) -> bool {
        matches!(
            self,
            TrapCause::StoreAddressMisaligned | TrapCause::StoreAccessFault | TrapCause::StorePageFault
        )
    }

    pub fn is_syscall(&self) -> bool {
        matches!(
            self,
            TrapCause::EcallFromU | TrapCause::EcallFromS | TrapCause::EcallFromM | TrapCause::Breakpoint
        )
    }
}

/// 执行单元返回的同步异常
///
/// `tval` 为 None 时由核心填入原始指令字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exception {
    pub cause: TrapCause,
    pub tval: Option<u32>,
}

impl Exception {
    pub fn new(cause: TrapCause) -> Self {
        Exception { cause, tval: None }
    }

    pub fn with_tval(cause: TrapCause, tval: u32) -> Self {
        Exception { cause, tval: Some(tval) }
    }

    pub fn illegal() -> Self {
        Exception::new(TrapCause::IllegalInstruction)
    }
}

impl From<TrapCause> for Exception {
    fn from(cause: TrapCause) -> Self {
        Exception::new(cause)
    }
}

// ========== mstatus 字段 ==========

pub mod mstatus {
    pub const SIE: u32 = 1 << 1;
    pub const MIE: u32 = 1 << 3;
    pub const SPIE: u32 = 1 << 5;
    pub const MPIE: u32 = 1 << 7;
    pub const SPP: u32 = 1 << 8;
    pub const MPP_SHIFT: u32 = 11;
    pub const MPP: u32 = 0x3 << MPP_SHIFT;
    pub const FS: u32 = 0x3 << 13;
    pub const VS: u32 = 0x3 << 9;
    pub const SUM: u32 = 1 << 18;
    pub const MXR: u32 = 1 << 19;

    /// sstatus 是 mstatus 的受限视图
    pub const SSTATUS_MASK: u32 = SIE | SPIE | SPP | FS | VS | SUM | MXR;

    #[inline]
    pub fn read_mpp(mstatus: u32) -> u32 {
        (mstatus & MPP) >> MPP_SHIFT
    }

    #[inline]
    pub fn write_mpp(mstatus: u32, mpp: u32) -> u32 {
        (mstatus & !MPP) | ((mpp & 0x3) << MPP_SHIFT)
    }
}

/// 中断挂起位（mip/mie）
pub mod irq {
    pub const SSIP: u32 = 1 << 1;
    pub const MSIP: u32 = 1 << 3;
    pub const STIP: u32 = 1 << 5;
    pub const MTIP: u32 = 1 << 7;
    pub const SEIP: u32 = 1 << 9;
    pub const MEIP: u32 = 1 << 11;
}

// ========== tvec ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvecMode {
    /// 所有 trap 跳转到 BASE
    Direct,
    /// 中断跳转到 BASE + 4*code
    Vectored,
}

/// 解析 mtvec/stvec，返回 (base, mode)
#[inline]
pub fn parse_tvec(tvec: u32) -> (u32, TvecMode) {
    let mode = if tvec & 0x3 == 1 { TvecMode::Vectored } else { TvecMode::Direct };
    (tvec & !0x3, mode)
}

#[inline]
pub fn calculate_trap_pc(tvec: u32, cause: &TrapCause) -> u32 {
    match parse_tvec(tvec) {
        (base, TvecMode::Vectored) if cause.is_interrupt() => base.wrapping_add(4 * cause.code()),
        (base, _) => base,
    }
}
