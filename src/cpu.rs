//! CPU 核心与执行引擎
//!
//! `CpuCore` 持有单个 hart 的全部架构状态：整数 / 浮点 / 向量寄存器堆、CSR bank、
//! 程序计数器、特权级与 LR 保留地址，以及按 ISA 配置构建好的解码器。
//!
//! 一次 `step` 完成 取指 → 解码 → 执行 → 写回；执行单元报告的异常在这里
//! 转成架构 trap（写 xEPC/xCAUSE/xTVAL、切换特权级、跳到 tvec），
//! 结果以 `StepResult` 交给上层的运行循环。

use std::sync::Arc;

use log::{debug, trace};

use crate::isa::{DecodedInstr, DecoderRegistry, IsaError, IsaExtensions};
use crate::memory::{AccessSize, MemError, Memory};

pub mod csr_def;
mod exu;
pub mod mmu;
mod status;
pub mod trap;

use csr_def::*;
use status::Status;
pub use status::{CsrEntry, CsrKind, NanBoxed, StatusSnapshot, VecRegFile, VLEN_BYTES};
pub use trap::{AccessType, Exception, PrivilegeMode, TrapCause};
use trap::{calculate_trap_pc, irq, mstatus};

/// 一次 trap 的完整记录，供运行循环把 trap 映射为宿主事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapRecord {
    pub cause: TrapCause,
    pub tval: u32,
    /// 触发 trap 的指令地址（中断时为下一条要执行的指令）
    pub epc: u32,
    /// 触发指令的长度，取指失败时为 0
    pub len: u8,
    /// trap 进入的特权级
    pub target: PrivilegeMode,
    /// 跳转到的 handler 地址
    pub handler: u32,
}

/// 单步执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// 指令正常退休
    Retired { pc: u32, next_pc: u32 },
    /// 指令产生同步异常，trap 已经被处理
    Trapped(TrapRecord),
}

/// 单 hart CPU 核心
///
/// 设计约定：
/// - x0 永远为 0，写入时丢弃
/// - 启用 C 扩展时 PC 2 字节对齐，否则 4 字节对齐
/// - 执行失败的指令不修改任何架构寄存器
pub struct CpuCore {
    /// 架构状态（寄存器文件 + CSR）
    status: Status,
    pc: u32,
    /// LR.W 建立的保留地址
    reservation: Option<u32>,
    decoder: Arc<DecoderRegistry>,
}

impl CpuCore {
    /// 按扩展集合创建 CPU 核心
    ///
    /// ```
    /// use allude_vm::cpu::CpuCore;
    /// use allude_vm::isa::IsaExtensions;
    ///
    /// let cpu = CpuCore::new(0x8000_0000, &IsaExtensions::default()).unwrap();
    /// assert_eq!(cpu.pc(), 0x8000_0000);
    /// ```
    pub fn new(entry_pc: u32, isa: &IsaExtensions) -> Result<Self, IsaError> {
        let decoder = Arc::new(isa.build_registry()?);
        Ok(Self::with_decoder(entry_pc, isa.misa(), decoder))
    }

    /// 使用已构建的解码器创建核心，多个核心可以共享同一个注册表
    pub fn with_decoder(entry_pc: u32, misa: u32, decoder: Arc<DecoderRegistry>) -> Self {
        CpuCore {
            status: Status::new(misa),
            pc: entry_pc,
            reservation: None,
            decoder,
        }
    }

    pub fn decoder(&self) -> &DecoderRegistry {
        &self.decoder
    }

    // ========== PC / 特权级 ==========

    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    #[inline]
    pub fn privilege(&self) -> PrivilegeMode {
        self.status.privilege
    }

    pub fn set_privilege(&mut self, mode: PrivilegeMode) {
        self.status.privilege = mode;
    }

    /// 是否允许 2 字节对齐的指令
    #[inline]
    pub fn has_compressed(&self) -> bool {
        self.decoder.compressed().is_some()
    }

    // ========== 整数寄存器 ==========

    /// 读取 x0 总是返回 0
    #[inline]
    pub fn read_reg(&self, reg: u8) -> u32 {
        self.status.int_read(reg)
    }

    #[inline]
    pub fn write_reg(&mut self, reg: u8, value: u32) {
        self.status.int_write(reg, value)
    }

    pub fn regs(&self) -> &[u32; 32] {
        self.status.int.snapshot()
    }

    // ========== 浮点寄存器 ==========

    #[inline]
    pub fn read_fp(&self, reg: u8) -> NanBoxed {
        self.status.fp.read(reg)
    }

    #[inline]
    pub fn write_fp(&mut self, reg: u8, value: NanBoxed) {
        self.status.fp.write(reg, value);
    }

    pub fn read_fp_f32(&self, reg: u8) -> f32 {
        self.read_fp(reg).to_f32()
    }

    pub fn write_fp_f32(&mut self, reg: u8, value: f32) {
        self.write_fp(reg, NanBoxed::from_f32(value));
    }

    pub fn read_fp_f64(&self, reg: u8) -> f64 {
        self.read_fp(reg).to_f64()
    }

    pub fn write_fp_f64(&mut self, reg: u8, value: f64) {
        self.write_fp(reg, NanBoxed::from_f64(value));
    }

    // ========== 向量寄存器 ==========

    #[inline]
    pub fn vec(&self) -> &VecRegFile {
        &self.status.vec
    }

    #[inline]
    pub fn vec_mut(&mut self) -> &mut VecRegFile {
        &mut self.status.vec
    }

    // ========== CSR ==========

    /// 架构读，未实现的地址返回 None
    pub fn csr_read(&self, addr: u16) -> Option<u32> {
        self.status.csr.read(addr)
    }

    /// 架构写，未实现的地址返回 false
    pub fn csr_write(&mut self, addr: u16, value: u32) -> bool {
        self.status.csr.write(addr, value)
    }

    /// 架构写入是否会被忽略
    pub fn csr_is_read_only(&self, addr: u16) -> bool {
        self.status.csr.is_read_only(addr)
    }

    /// 原始读取，不经过视图与写语义
    #[inline]
    pub fn csr(&self, addr: u16) -> u32 {
        self.status.csr.get(addr)
    }

    #[inline]
    pub fn set_csr(&mut self, addr: u16, value: u32) {
        self.status.csr.set(addr, value)
    }

    #[inline]
    pub fn frm(&self) -> u32 {
        self.status.csr.frm()
    }

    #[inline]
    pub fn accrue_fflags(&mut self, flags: u32) {
        self.status.csr.accrue_fflags(flags)
    }

    // ========== LR/SC 保留 ==========

    pub fn set_reservation(&mut self, addr: u32) {
        self.reservation = Some(addr);
    }

    /// 取出并清除保留地址
    pub fn take_reservation(&mut self) -> Option<u32> {
        self.reservation.take()
    }

    // ========== 访存 ==========

    /// 按 satp 翻译虚拟地址，Machine 模式同样生效
    pub fn translate(&self, mem: &dyn Memory, vaddr: u32, access: AccessType) -> Result<u32, Exception> {
        mmu::translate(mem, self.csr(CSR_SATP), vaddr, access)
    }

    /// 数据加载，按 `AccessType::Load` 翻译
    pub fn load(&self, mem: &dyn Memory, vaddr: u32, size: AccessSize) -> Result<u64, Exception> {
        self.load_as(mem, vaddr, size, AccessType::Load)
    }

    /// 以指定访问类型加载，AMO 的读取按存储权限检查
    pub fn load_as(&self, mem: &dyn Memory, vaddr: u32, size: AccessSize, access: AccessType) -> Result<u64, Exception> {
        if !size.is_aligned(vaddr) {
            return Err(Exception::with_tval(TrapCause::misaligned(access), vaddr));
        }
        let paddr = self.translate(mem, vaddr, access)?;
        let value = match size {
            AccessSize::Byte => mem.load8(paddr).map(u64::from),
            AccessSize::Half => mem.load16(paddr).map(u64::from),
            AccessSize::Word => mem.load32(paddr).map(u64::from),
            AccessSize::Double => mem.load64(paddr),
        };
        value.map_err(|e| mem_exception(e, access, vaddr))
    }

    /// 数据存储，只使用 `value` 的低 `size` 字节
    pub fn store(&self, mem: &mut dyn Memory, vaddr: u32, size: AccessSize, value: u64) -> Result<(), Exception> {
        let access = AccessType::Store;
        if !size.is_aligned(vaddr) {
            return Err(Exception::with_tval(TrapCause::misaligned(access), vaddr));
        }
        let paddr = self.translate(&*mem, vaddr, access)?;
        let result = match size {
            AccessSize::Byte => mem.store8(paddr, value as u8),
            AccessSize::Half => mem.store16(paddr, value as u16),
            AccessSize::Word => mem.store32(paddr, value as u32),
            AccessSize::Double => mem.store64(paddr, value),
        };
        result.map_err(|e| mem_exception(e, access, vaddr))
    }

    /// 取指：返回 (指令字, 长度)
    fn fetch(&self, mem: &dyn Memory) -> Result<(u32, u8), Exception> {
        let pc = self.pc;
        if pc & 0x1 != 0 {
            return Err(Exception::with_tval(TrapCause::InstructionAddressMisaligned, pc));
        }
        let lo = self.fetch_half(mem, pc)?;
        if lo & 0x3 != 0x3 {
            return Ok((lo as u32, 2));
        }
        // 高半字单独翻译，指令可以跨页
        let hi = self.fetch_half(mem, pc.wrapping_add(2))?;
        Ok(((hi as u32) << 16 | lo as u32, 4))
    }

    fn fetch_half(&self, mem: &dyn Memory, vaddr: u32) -> Result<u16, Exception> {
        let paddr = self.translate(mem, vaddr, AccessType::Fetch)?;
        mem.load16(paddr)
            .map_err(|e| mem_exception(e, AccessType::Fetch, vaddr))
    }

    // ========== 执行 ==========

    /// 执行单步指令
    ///
    /// # 流程
    ///
    /// 1. 从 PC 处取 16 bit，低两位不是 `11` 时按压缩指令解码
    /// 2. 否则再取 16 bit 拼成 32 bit 指令
    /// 3. 交给执行单元，成功则写回 rd 并推进计数器
    /// 4. 失败则进入 trap，PC 指向 handler
    pub fn step(&mut self, mem: &mut dyn Memory) -> StepResult {
        let pc = self.pc;

        let (raw, len) = match self.fetch(&*mem) {
            Ok(word) => word,
            Err(e) => {
                let tval = e.tval.unwrap_or(pc);
                return StepResult::Trapped(self.trap(e.cause, tval, pc, 0));
            }
        };

        let decoded: DecodedInstr = if len == 2 {
            self.decoder.decode16(raw as u16)
        } else {
            self.decoder.decode(raw)
        };
        trace!("0x{:08x}: {:08x} {:?}", pc, raw, decoded.instr);

        match exu::execute(self, mem, &decoded, pc) {
            Ok(retire) => {
                if retire.rd != 0 {
                    self.write_reg(retire.rd, retire.value);
                }
                self.pc = retire.next_pc;
                self.status.csr.tick_counters();
                StepResult::Retired { pc, next_pc: retire.next_pc }
            }
            Err(e) => {
                let tval = e.tval.unwrap_or(raw);
                StepResult::Trapped(self.trap(e.cause, tval, pc, len))
            }
        }
    }

    fn trap(&mut self, cause: TrapCause, tval: u32, epc: u32, len: u8) -> TrapRecord {
        let target = self.take_trap(cause, tval, epc);
        TrapRecord { cause, tval, epc, len, target, handler: self.pc }
    }

    /// 进入 trap（异常或中断），返回处理 trap 的特权级
    ///
    /// 当前特权级低于 M 且 medeleg/mideleg 对应位置 1 时委托给 S-mode，
    /// 否则由 M-mode 处理：
    /// - 保存 epc / cause / tval
    /// - xPIE ← xIE，xIE ← 0，xPP ← 当前特权级
    /// - PC 跳到 xtvec
    pub fn take_trap(&mut self, cause: TrapCause, tval: u32, epc: u32) -> PrivilegeMode {
        let deleg = if cause.is_interrupt() { CSR_MIDELEG } else { CSR_MEDELEG };
        let prev = self.privilege();
        let delegated = prev < PrivilegeMode::Machine && (self.csr(deleg) >> cause.code()) & 1 != 0;

        let status = self.csr(CSR_MSTATUS);
        let (target, tvec) = if delegated {
            self.set_csr(CSR_SEPC, epc);
            self.set_csr(CSR_SCAUSE, cause.to_cause_value());
            self.set_csr(CSR_STVAL, tval);

            let mut s = status & !(mstatus::SPIE | mstatus::SPP);
            if status & mstatus::SIE != 0 {
                s |= mstatus::SPIE;
            }
            if prev == PrivilegeMode::Supervisor {
                s |= mstatus::SPP;
            }
            s &= !mstatus::SIE;
            self.set_csr(CSR_MSTATUS, s);
            (PrivilegeMode::Supervisor, self.csr(CSR_STVEC))
        } else {
            self.set_csr(CSR_MEPC, epc);
            self.set_csr(CSR_MCAUSE, cause.to_cause_value());
            self.set_csr(CSR_MTVAL, tval);

            let mut s = status & !mstatus::MPIE;
            if status & mstatus::MIE != 0 {
                s |= mstatus::MPIE;
            }
            s &= !mstatus::MIE;
            s = mstatus::write_mpp(s, prev.to_bits());
            self.set_csr(CSR_MSTATUS, s);
            (PrivilegeMode::Machine, self.csr(CSR_MTVEC))
        };

        self.status.privilege = target;
        self.pc = calculate_trap_pc(tvec, &cause);
        debug!(
            "trap {:?} epc=0x{:08x} tval=0x{:08x} {:?}->{:?} handler=0x{:08x}",
            cause, epc, tval, prev, target, self.pc
        );
        target
    }

    /// 从 trap 返回：恢复特权级与中断使能，返回 xEPC
    ///
    /// 调用方负责把 PC 设为返回值
    pub fn trap_return(&mut self, mode: PrivilegeMode) -> u32 {
        let status = self.csr(CSR_MSTATUS);
        let (next, s, epc) = match mode {
            PrivilegeMode::Supervisor => {
                let next = if status & mstatus::SPP != 0 {
                    PrivilegeMode::Supervisor
                } else {
                    PrivilegeMode::User
                };
                let mut s = status & !(mstatus::SIE | mstatus::SPP);
                if status & mstatus::SPIE != 0 {
                    s |= mstatus::SIE;
                }
                s |= mstatus::SPIE;
                (next, s, self.csr(CSR_SEPC))
            }
            _ => {
                let next = PrivilegeMode::from_bits(mstatus::read_mpp(status));
                let mut s = status & !mstatus::MIE;
                if status & mstatus::MPIE != 0 {
                    s |= mstatus::MIE;
                }
                s |= mstatus::MPIE;
                s = mstatus::write_mpp(s, PrivilegeMode::User.to_bits());
                (next, s, self.csr(CSR_MEPC))
            }
        };
        self.set_csr(CSR_MSTATUS, s);
        debug!("{:?} return to {:?} at 0x{:08x}", mode, next, epc);
        self.status.privilege = next;
        epc
    }

    /// 当前可以响应的最高优先级中断
    ///
    /// 优先级：MEI > MSI > MTI > SEI > SSI > STI。
    /// 中断的目标特权级高于当前特权级时总是使能，相等时看 xIE。
    pub fn pending_interrupt(&self) -> Option<TrapCause> {
        let pending = self.csr(CSR_MIE) & self.csr(CSR_MIP);
        if pending == 0 {
            return None;
        }
        let status = self.csr(CSR_MSTATUS);
        let mideleg = self.csr(CSR_MIDELEG);
        let prev = self.privilege();

        const ORDER: [(u32, TrapCause); 6] = [
            (irq::MEIP, TrapCause::MachineExternalInterrupt),
            (irq::MSIP, TrapCause::MachineSoftwareInterrupt),
            (irq::MTIP, TrapCause::MachineTimerInterrupt),
            (irq::SEIP, TrapCause::SupervisorExternalInterrupt),
            (irq::SSIP, TrapCause::SupervisorSoftwareInterrupt),
            (irq::STIP, TrapCause::SupervisorTimerInterrupt),
        ];
        ORDER.iter().find_map(|&(bit, cause)| {
            if pending & bit == 0 {
                return None;
            }
            let (target, ie) = if prev < PrivilegeMode::Machine && mideleg & bit != 0 {
                (PrivilegeMode::Supervisor, mstatus::SIE)
            } else {
                (PrivilegeMode::Machine, mstatus::MIE)
            };
            let enabled = target > prev || (target == prev && status & ie != 0);
            enabled.then_some(cause)
        })
    }

    /// 在取指前检查中断，有可响应的中断则进入 trap
    pub fn check_interrupts(&mut self) -> bool {
        match self.pending_interrupt() {
            Some(cause) => {
                self.take_trap(cause, 0, self.pc);
                true
            }
            None => false,
        }
    }

    // ========== 调试 ==========

    /// 获取完整架构状态快照
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// 打印所有存在的状态（用于调试）
    pub fn dump_regs(&self) {
        println!("═══════════════════════════════════════════════════════════════════");
        println!("CPU Status Dump");
        println!("═══════════════════════════════════════════════════════════════════");

        println!("PC: 0x{:08x}  Privilege: {:?}", self.pc, self.status.privilege);
        println!();

        println!("─── Integer Registers (x0-x31) ───────────────────────────────────");
        for i in 0..32 {
            if i % 4 == 0 {
                print!("  ");
            }
            print!("x{:02}: 0x{:08x}  ", i, self.read_reg(i as u8));
            if i % 4 == 3 {
                println!();
            }
        }

        println!();
        println!("─── Floating-Point Registers (f0-f31) ────────────────────────────");
        for i in 0..32 {
            if i % 2 == 0 {
                print!("  ");
            }
            let slot = self.read_fp(i as u8);
            if slot.is_boxed() {
                print!("f{:02}: 0x{:016x} ({:>12.6})  ", i, slot.0, slot.to_f32());
            } else {
                print!("f{:02}: 0x{:016x} ({:>12.6})  ", i, slot.0, slot.to_f64());
            }
            if i % 2 == 1 {
                println!();
            }
        }

        println!();
        println!("─── Vector Registers (v0-v31, VLEN=128) ──────────────────────────");
        for i in 0..32 {
            print!("  v{:02}: ", i);
            for b in self.vec().reg(i as u8).iter().rev() {
                print!("{:02x}", b);
            }
            println!();
        }

        let csr = &self.status.csr;
        let addrs = csr.addresses();
        println!();
        println!("─── Control and Status Registers (CSR) ───────────────────────────");
        let mut shown = 0;
        for addr in addrs {
            let Some(value) = csr.read(addr) else {
                continue;
            };
            print!("  0x{:03x}: 0x{:08x}", addr, value);
            shown += 1;
            if shown % 3 == 0 {
                println!();
            } else {
                print!("  ");
            }
        }
        if shown % 3 != 0 {
            println!();
        }

        println!("═══════════════════════════════════════════════════════════════════");
    }
}

/// 内存层错误转成对应访问类型的异常，tval 为虚拟地址
fn mem_exception(err: MemError, access: AccessType, vaddr: u32) -> Exception {
    let cause = match err {
        MemError::Unaligned { .. } => TrapCause::misaligned(access),
        MemError::OutOfRange { .. } => TrapCause::access_fault(access),
    };
    Exception::with_tval(cause, vaddr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VmMemory;

    const BASE: u32 = 0x8000_0000;

    fn setup() -> (CpuCore, VmMemory) {
        let cpu = CpuCore::new(BASE, &IsaExtensions::default()).unwrap();
        (cpu, VmMemory::new(0x10000, BASE))
    }

    /// 将指令写入内存
    fn write_instr(mem: &mut VmMemory, addr: u32, instr: u32) {
        mem.store32(addr, instr).unwrap();
    }

    fn run(cpu: &mut CpuCore, mem: &mut VmMemory, n: usize) {
        for _ in 0..n {
            cpu.step(mem);
        }
    }

    fn expect_trap(result: StepResult) -> TrapRecord {
        match result {
            StepResult::Trapped(t) => t,
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn test_addi() {
        let (mut cpu, mut mem) = setup();

        // addi x1, x0, 42
        write_instr(&mut mem, BASE, 0x02A00093);
        let r = cpu.step(&mut mem);

        assert_eq!(r, StepResult::Retired { pc: BASE, next_pc: BASE + 4 });
        assert_eq!(cpu.read_reg(1), 42);
        assert_eq!(cpu.pc(), BASE + 4);
    }

    #[test]
    fn test_add_sub() {
        let (mut cpu, mut mem) = setup();

        // addi x1, x0, 100
        write_instr(&mut mem, BASE, 0x06400093);
        // addi x2, x0, 30
        write_instr(&mut mem, BASE + 4, 0x01E00113);
        // add x3, x1, x2
        write_instr(&mut mem, BASE + 8, 0x002081B3);
        // sub x4, x1, x2
        write_instr(&mut mem, BASE + 12, 0x40208233);

        run(&mut cpu, &mut mem, 4);

        assert_eq!(cpu.read_reg(3), 130);
        assert_eq!(cpu.read_reg(4), 70);
    }

    #[test]
    fn test_lw_sw() {
        let (mut cpu, mut mem) = setup();

        // addi x1, x0, 0x42
        write_instr(&mut mem, BASE, 0x04200093);
        // lui x2, 0x80000
        write_instr(&mut mem, BASE + 4, 0x80000137);
        // sw x1, 256(x2)
        write_instr(&mut mem, BASE + 8, 0x10112023);
        // lw x3, 256(x2)
        write_instr(&mut mem, BASE + 12, 0x10012183);

        run(&mut cpu, &mut mem, 4);

        assert_eq!(cpu.read_reg(3), 0x42);
        assert_eq!(mem.load32(BASE + 0x100).unwrap(), 0x42);
    }

    #[test]
    fn test_beq_taken() {
        let (mut cpu, mut mem) = setup();

        // addi x1, x0, 5
        write_instr(&mut mem, BASE, 0x00500093);
        // addi x2, x0, 5
        write_instr(&mut mem, BASE + 4, 0x00500113);
        // beq x1, x2, 8
        write_instr(&mut mem, BASE + 8, 0x00208463);
        // addi x3, x0, 1（被跳过）
        write_instr(&mut mem, BASE + 12, 0x00100193);

        run(&mut cpu, &mut mem, 3);

        assert_eq!(cpu.pc(), BASE + 16);
        assert_eq!(cpu.read_reg(3), 0);
    }

    #[test]
    fn test_jal_lui_auipc() {
        let (mut cpu, mut mem) = setup();

        // jal x1, 8
        write_instr(&mut mem, BASE, 0x008000EF);
        // lui x5, 0x12345
        write_instr(&mut mem, BASE + 8, 0x123452B7);
        // auipc x6, 0x1
        write_instr(&mut mem, BASE + 12, 0x00001317);

        run(&mut cpu, &mut mem, 3);

        assert_eq!(cpu.read_reg(1), BASE + 4);
        assert_eq!(cpu.read_reg(5), 0x12345000);
        assert_eq!(cpu.read_reg(6), BASE + 12 + 0x1000);
    }

    #[test]
    fn test_x0_always_zero() {
        let (mut cpu, mut mem) = setup();

        // addi x0, x0, 42
        write_instr(&mut mem, BASE, 0x02A00013);
        cpu.step(&mut mem);

        assert_eq!(cpu.read_reg(0), 0);
    }

    #[test]
    fn test_compressed_fetch() {
        let (mut cpu, mut mem) = setup();

        // c.addi x1, 5 ; c.addi x1, 5
        write_instr(&mut mem, BASE, 0x0095_0095);
        let r = cpu.step(&mut mem);
        assert_eq!(r, StepResult::Retired { pc: BASE, next_pc: BASE + 2 });
        cpu.step(&mut mem);

        assert_eq!(cpu.read_reg(1), 10);
        assert_eq!(cpu.pc(), BASE + 4);
    }

    #[test]
    fn test_ecall_traps_to_mtvec() {
        let (mut cpu, mut mem) = setup();
        cpu.set_csr(CSR_MTVEC, BASE + 0x100);

        write_instr(&mut mem, BASE, 0x00000073);
        let t = expect_trap(cpu.step(&mut mem));

        assert_eq!(t.cause, TrapCause::EcallFromM);
        assert_eq!(t.len, 4);
        assert_eq!(t.target, PrivilegeMode::Machine);
        assert_eq!(cpu.pc(), BASE + 0x100);
        assert_eq!(cpu.csr(CSR_MEPC), BASE);
        assert_eq!(cpu.csr(CSR_MCAUSE), 11);
    }

    #[test]
    fn test_ebreak() {
        let (mut cpu, mut mem) = setup();
        cpu.set_csr(CSR_MTVEC, BASE + 0x200);

        write_instr(&mut mem, BASE, 0x00100073);
        let t = expect_trap(cpu.step(&mut mem));

        assert_eq!(t.cause, TrapCause::Breakpoint);
        assert_eq!(cpu.csr(CSR_MTVAL), BASE);
        assert_eq!(cpu.csr(CSR_MCAUSE), 3);
    }

    #[test]
    fn test_illegal_leaves_registers_unchanged() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(5, 0x1234);
        let before = *cpu.regs();

        write_instr(&mut mem, BASE, 0xFFFF_FFFF);
        let t = expect_trap(cpu.step(&mut mem));

        assert_eq!(t.cause, TrapCause::IllegalInstruction);
        assert_eq!(t.tval, 0xFFFF_FFFF);
        assert_eq!(*cpu.regs(), before);
        assert_eq!(cpu.csr(CSR_MINSTRET), 0);
    }

    #[test]
    fn test_disabled_extension_is_illegal() {
        let mut cpu = CpuCore::new(BASE, &IsaExtensions::base()).unwrap();
        let mut mem = VmMemory::new(0x1000, BASE);

        // mul x3, x1, x2
        write_instr(&mut mem, BASE, 0x022081B3);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::IllegalInstruction);
    }

    #[test]
    fn test_misaligned_jump_without_c() {
        let mut cpu = CpuCore::new(BASE, &IsaExtensions::base()).unwrap();
        let mut mem = VmMemory::new(0x1000, BASE);

        // jal x0, 2
        write_instr(&mut mem, BASE, 0x0020006F);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::InstructionAddressMisaligned);
        assert_eq!(t.tval, BASE + 2);
    }

    #[test]
    fn test_misaligned_load() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(2, BASE);

        // lw x3, 1(x2)
        write_instr(&mut mem, BASE, 0x00112183);
        let t = expect_trap(cpu.step(&mut mem));

        assert_eq!(t.cause, TrapCause::LoadAddressMisaligned);
        assert_eq!(cpu.csr(CSR_MTVAL), BASE + 1);
    }

    #[test]
    fn test_load_out_of_range() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(2, 0x9000_0000);

        // lw x3, 0(x2)
        write_instr(&mut mem, BASE, 0x00012183);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::LoadAccessFault);
        assert_eq!(t.tval, 0x9000_0000);
    }

    #[test]
    fn test_machine_mode_follows_satp() {
        use super::mmu::pte;

        let (mut cpu, mut mem) = setup();
        let root = BASE + 0x1000;
        // 4 MiB 超级页：代码区恒等映射，0x0040_0000 映射到 RAM 起始
        let leaf = ((BASE >> 12) << 10) | pte::V | pte::R | pte::W | pte::X;
        mem.store32(root + (BASE >> 22) * 4, leaf).unwrap();
        mem.store32(root + 4, leaf).unwrap();
        cpu.set_csr(CSR_SATP, SATP_MODE_SV32 | (root >> 12));
        assert_eq!(cpu.privilege(), PrivilegeMode::Machine);

        mem.store32(BASE + 0x10, 0xCAFE_F00D).unwrap();
        cpu.write_reg(5, 0x0040_0000);
        // lw x4, 0x10(x5)
        write_instr(&mut mem, BASE, 0x0102A203);
        assert!(matches!(cpu.step(&mut mem), StepResult::Retired { .. }));
        assert_eq!(cpu.read_reg(4), 0xCAFE_F00D);

        // 0x0 没有映射：Machine 模式下也是页错误
        cpu.write_reg(2, 0);
        // lw x3, 0(x2)
        write_instr(&mut mem, BASE + 4, 0x00012183);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::LoadPageFault);
        assert_eq!(t.tval, 0);
    }

    #[test]
    fn test_fetch_fault() {
        let (mut cpu, mut mem) = setup();
        cpu.set_pc(0x9000_0000);
        let t = expect_trap(cpu.step(&mut mem));

        assert_eq!(t.cause, TrapCause::InstructionAccessFault);
        assert_eq!(t.len, 0);
        assert_eq!(t.tval, 0x9000_0000);
    }

    #[test]
    fn test_ecall_delegated_to_supervisor() {
        let (mut cpu, mut mem) = setup();
        cpu.set_privilege(PrivilegeMode::User);
        cpu.set_csr(CSR_MEDELEG, 1 << 8);
        cpu.set_csr(CSR_STVEC, BASE + 0x80);
        cpu.set_csr(CSR_MSTATUS, mstatus::SIE);

        write_instr(&mut mem, BASE, 0x00000073);
        // sret
        write_instr(&mut mem, BASE + 0x80, 0x10200073);

        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::EcallFromU);
        assert_eq!(t.target, PrivilegeMode::Supervisor);
        assert_eq!(cpu.privilege(), PrivilegeMode::Supervisor);
        assert_eq!(cpu.csr(CSR_SCAUSE), 8);
        assert_eq!(cpu.csr(CSR_SEPC), BASE);
        let s = cpu.csr(CSR_MSTATUS);
        assert_eq!(s & mstatus::SPP, 0);
        assert_ne!(s & mstatus::SPIE, 0);
        assert_eq!(s & mstatus::SIE, 0);

        cpu.step(&mut mem);
        assert_eq!(cpu.privilege(), PrivilegeMode::User);
        assert_eq!(cpu.pc(), BASE);
        assert_ne!(cpu.csr(CSR_MSTATUS) & mstatus::SIE, 0);
    }

    #[test]
    fn test_machine_mode_ignores_medeleg() {
        let (mut cpu, mut mem) = setup();
        cpu.set_csr(CSR_MEDELEG, 1 << 11);
        cpu.set_csr(CSR_MTVEC, BASE + 0x40);

        write_instr(&mut mem, BASE, 0x00000073);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.target, PrivilegeMode::Machine);
        assert_eq!(cpu.pc(), BASE + 0x40);
    }

    #[test]
    fn test_mret() {
        let (mut cpu, mut mem) = setup();
        cpu.set_csr(CSR_MEPC, BASE + 0x40);
        cpu.set_csr(CSR_MSTATUS, mstatus::MPIE);

        // mret
        write_instr(&mut mem, BASE, 0x30200073);
        cpu.step(&mut mem);

        assert_eq!(cpu.pc(), BASE + 0x40);
        assert_eq!(cpu.privilege(), PrivilegeMode::User);
        let s = cpu.csr(CSR_MSTATUS);
        assert_ne!(s & mstatus::MIE, 0);
        assert_ne!(s & mstatus::MPIE, 0);
        assert_eq!(mstatus::read_mpp(s), 0);
    }

    #[test]
    fn test_mret_from_user_is_illegal() {
        let (mut cpu, mut mem) = setup();
        cpu.set_privilege(PrivilegeMode::User);
        write_instr(&mut mem, BASE, 0x30200073);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::IllegalInstruction);
    }

    #[test]
    fn test_timer_interrupt() {
        let (mut cpu, _mem) = setup();
        cpu.set_csr(CSR_MTVEC, (BASE + 0x100) | 1);
        cpu.set_csr(CSR_MIE, irq::MTIP);
        cpu.set_csr(CSR_MIP, irq::MTIP);

        // MIE 未置位时不响应
        assert!(!cpu.check_interrupts());

        cpu.set_csr(CSR_MSTATUS, mstatus::MIE);
        assert!(cpu.check_interrupts());
        assert_eq!(cpu.csr(CSR_MCAUSE), 0x8000_0007);
        assert_eq!(cpu.csr(CSR_MEPC), BASE);
        assert_eq!(cpu.pc(), BASE + 0x100 + 4 * 7);
        assert_eq!(cpu.csr(CSR_MSTATUS) & mstatus::MIE, 0);
    }

    #[test]
    fn test_lr_sc_amo() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(2, BASE + 0x100);
        cpu.write_reg(5, 7);
        mem.store32(BASE + 0x100, 10).unwrap();

        // lr.w x3, (x2)
        write_instr(&mut mem, BASE, 0x100121AF);
        // sc.w x4, x5, (x2)
        write_instr(&mut mem, BASE + 4, 0x1851222F);
        // sc.w x4, x5, (x2)（保留已被消耗）
        write_instr(&mut mem, BASE + 8, 0x1851222F);
        // amoadd.w x6, x5, (x2)
        write_instr(&mut mem, BASE + 12, 0x0051232F);

        run(&mut cpu, &mut mem, 2);
        assert_eq!(cpu.read_reg(3), 10);
        assert_eq!(cpu.read_reg(4), 0);
        assert_eq!(mem.load32(BASE + 0x100).unwrap(), 7);

        cpu.step(&mut mem);
        assert_eq!(cpu.read_reg(4), 1);

        cpu.step(&mut mem);
        assert_eq!(cpu.read_reg(6), 7);
        assert_eq!(mem.load32(BASE + 0x100).unwrap(), 14);
    }

    #[test]
    fn test_csr_instructions() {
        let (mut cpu, mut mem) = setup();
        cpu.write_reg(2, 0xDEAD_BEEF);

        // csrrw x1, mscratch, x2
        write_instr(&mut mem, BASE, 0x340110F3);
        // csrrs x3, mscratch, x0
        write_instr(&mut mem, BASE + 4, 0x340021F3);
        // csrrs x3, 0x7c0, x0（未实现）
        write_instr(&mut mem, BASE + 8, 0x7C0021F3);

        run(&mut cpu, &mut mem, 2);
        assert_eq!(cpu.read_reg(1), 0);
        assert_eq!(cpu.read_reg(3), 0xDEAD_BEEF);

        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::IllegalInstruction);
    }

    #[test]
    fn test_csr_privilege_check() {
        let (mut cpu, mut mem) = setup();
        cpu.set_privilege(PrivilegeMode::User);

        // csrrs x3, mscratch, x0
        write_instr(&mut mem, BASE, 0x340021F3);
        let t = expect_trap(cpu.step(&mut mem));
        assert_eq!(t.cause, TrapCause::IllegalInstruction);
    }

    #[test]
    fn test_counters_tick_on_retire() {
        let (mut cpu, mut mem) = setup();
        for i in 0..3 {
            write_instr(&mut mem, BASE + 4 * i, 0x00000013);
        }
        run(&mut cpu, &mut mem, 3);
        assert_eq!(cpu.csr(CSR_MINSTRET), 3);
        assert_eq!(cpu.csr_read(CSR_INSTRET), Some(3));
    }

    #[test]
    fn test_simple_loop() {
        let (mut cpu, mut mem) = setup();
        cpu.set_csr(CSR_MTVEC, BASE + 0x100);

        // 计算 1+2+3 = 6
        write_instr(&mut mem, BASE, 0x00000093); // addi x1, x0, 0
        write_instr(&mut mem, BASE + 4, 0x00100113); // addi x2, x0, 1
        write_instr(&mut mem, BASE + 8, 0x00400193); // addi x3, x0, 4
        write_instr(&mut mem, BASE + 12, 0x002080B3); // add x1, x1, x2
        write_instr(&mut mem, BASE + 16, 0x00110113); // addi x2, x2, 1
        write_instr(&mut mem, BASE + 20, 0xFE314CE3); // blt x2, x3, -8
        write_instr(&mut mem, BASE + 24, 0x00000073); // ecall

        let mut executed = 0;
        while cpu.pc() != BASE + 0x100 && executed < 100 {
            cpu.step(&mut mem);
            executed += 1;
        }

        assert_eq!(cpu.read_reg(1), 6);
        assert_eq!(cpu.csr(CSR_MEPC), BASE + 24);
        assert!(executed < 100);
    }
}
