//! 仿真环境
//!
//! 本模块负责：
//! - 仿真配置（`SimConfig` 构建器）
//! - 解析 ELF 文件并把 `PT_LOAD` 段装入内存
//! - 创建 `VmState` 并驱动宿主循环，处理系统调用事件
//!
//! # 示例
//!
//! ```no_run
//! use allude_vm::sim_env::{SimConfig, SimEnv};
//!
//! let config = SimConfig::default()
//!     .with_elf_path("program.elf")
//!     .with_memory_size(64 * 1024);
//!
//! let mut env = SimEnv::from_config(config).expect("Failed to create sim env");
//! let (executed, outcome) = env.run_until_halt();
//! println!("{executed} instructions, {outcome:?}");
//! ```

use std::io;
use std::path::{Path, PathBuf};

use elf::abi::{EM_RISCV, PF_W, PF_X, PT_LOAD};
use elf::endian::AnyEndian;
use elf::ElfBytes;
use log::{debug, info, warn};
use thiserror::Error;

pub use crate::isa::IsaExtensions;
use crate::isa::IsaError;
use crate::memory::{MemError, Memory, VmMemory};
use crate::vm::{
    SyscallEvt, VmArg, VmErr, VmEvt, VmState, VmStatus, SYSCALL_HALT, SYSCALL_STACK_PROTECT,
    SYSCALL_YIELD, VM_MEMORY_SIZE, VM_RAM_IMAGE_OFFSET,
};

/// 仿真环境错误
#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ELF parse error: {0}")]
    Elf(#[from] elf::ParseError),

    #[error("unsupported ELF: {0}")]
    Unsupported(String),

    #[error("memory error: {0}")]
    Memory(#[from] MemError),

    #[error("ISA config error: {0}")]
    Isa(#[from] IsaError),

    #[error("config error: {0}")]
    Config(String),
}

// ========== 配置 ==========

/// 仿真配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// ELF 文件路径
    pub elf_path: Option<PathBuf>,
    /// 原始二进制路径与加载地址，只在没有 ELF 时使用
    pub bin_path: Option<(PathBuf, u32)>,
    /// 入口 PC，覆盖 ELF 入口
    pub entry_pc: Option<u32>,
    pub memory_base: u32,
    pub memory_size: usize,
    /// 扩展内存大小，0 表示不挂载
    pub extram_size: usize,
    pub isa: IsaExtensions,
    /// 最大执行指令数（0 表示无限制）
    pub max_instructions: u64,
    /// 每次 `VmState::run` 的指令预算
    pub meter: u32,
    pub verbose: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            elf_path: None,
            bin_path: None,
            entry_pc: None,
            memory_base: VM_RAM_IMAGE_OFFSET,
            memory_size: VM_MEMORY_SIZE,
            extram_size: 0,
            isa: IsaExtensions::default(),
            max_instructions: 0,
            meter: 10_000,
            verbose: false,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.elf_path = Some(path.into());
        self
    }

    pub fn with_bin_path(mut self, path: impl Into<PathBuf>, load_addr: u32) -> Self {
        self.bin_path = Some((path.into(), load_addr));
        self
    }

    pub fn with_entry_pc(mut self, pc: u32) -> Self {
        self.entry_pc = Some(pc);
        self
    }

    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    pub fn with_memory_base(mut self, base: u32) -> Self {
        self.memory_base = base;
        self
    }

    pub fn with_extram_size(mut self, size: usize) -> Self {
        self.extram_size = size;
        self
    }

    pub fn with_extensions(mut self, isa: IsaExtensions) -> Self {
        self.isa = isa;
        self
    }

    /// 从字符串设置 ISA，例如 "rv32imafdcv"、"rv32gc"
    pub fn with_isa(mut self, isa: &str) -> Result<Self, SimError> {
        self.isa = IsaExtensions::parse(isa)?;
        Ok(self)
    }

    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    pub fn with_meter(mut self, meter: u32) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// ========== ELF ==========

/// ELF 程序段信息
#[derive(Debug, Clone)]
pub struct ElfSegment {
    pub vaddr: u32,
    pub paddr: u32,
    pub file_size: usize,
    pub mem_size: usize,
    pub data: Vec<u8>,
    pub executable: bool,
    pub writable: bool,
}

/// ELF 符号信息
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    pub name: String,
    pub addr: u32,
    pub size: u32,
}

/// ELF 文件解析结果
#[derive(Debug, Clone)]
pub struct ElfInfo {
    pub entry: u32,
    pub segments: Vec<ElfSegment>,
    /// 只保留宿主关心的符号
    pub symbols: Vec<ElfSymbol>,
}

/// 宿主关心的符号
const KNOWN_SYMBOLS: [&str; 2] = ["tohost", "fromhost"];

impl ElfInfo {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse_bytes(&data)
    }

    /// 只接受 32 位小端 RISC-V ELF
    pub fn parse_bytes(data: &[u8]) -> Result<Self, SimError> {
        let file = ElfBytes::<AnyEndian>::minimal_parse(data)?;
        let header = &file.ehdr;

        if header.e_machine != EM_RISCV {
            return Err(SimError::Unsupported(format!(
                "machine type 0x{:x}, expected RISC-V (0x{:x})",
                header.e_machine, EM_RISCV
            )));
        }
        if header.class != elf::file::Class::ELF32 {
            return Err(SimError::Unsupported("only ELF32 is supported".into()));
        }
        if header.endianness != AnyEndian::Little {
            return Err(SimError::Unsupported("only little-endian ELF is supported".into()));
        }

        let mut segments = Vec::new();
        if let Some(phdrs) = file.segments() {
            for phdr in phdrs.iter().filter(|p| p.p_type == PT_LOAD) {
                let data = file.segment_data(&phdr)?.to_vec();
                segments.push(ElfSegment {
                    vaddr: phdr.p_vaddr as u32,
                    paddr: phdr.p_paddr as u32,
                    file_size: phdr.p_filesz as usize,
                    mem_size: phdr.p_memsz as usize,
                    data,
                    executable: phdr.p_flags & PF_X != 0,
                    writable: phdr.p_flags & PF_W != 0,
                });
            }
        }

        let mut symbols = Vec::new();
        if let Ok(Some((symtab, strtab))) = file.symbol_table() {
            for sym in symtab.iter().filter(|s| s.st_value != 0) {
                let Ok(name) = strtab.get(sym.st_name as usize) else {
                    continue;
                };
                if KNOWN_SYMBOLS.contains(&name) {
                    symbols.push(ElfSymbol {
                        name: name.to_string(),
                        addr: sym.st_value as u32,
                        size: sym.st_size as u32,
                    });
                }
            }
        }

        Ok(ElfInfo {
            entry: header.e_entry as u32,
            segments,
            symbols,
        })
    }

    pub fn find_symbol(&self, name: &str) -> Option<u32> {
        self.symbols.iter().find(|s| s.name == name).map(|s| s.addr)
    }

    /// 所有段覆盖的物理地址范围 [min, max)
    pub fn address_range(&self) -> Option<(u32, u32)> {
        let min = self.segments.iter().map(|s| s.paddr).min()?;
        let max = self
            .segments
            .iter()
            .map(|s| s.paddr.wrapping_add(s.mem_size as u32))
            .max()?;
        Some((min, max))
    }
}

/// 把 `PT_LOAD` 段拷贝到 RAM 中 paddr 对应的位置，超出文件大小的部分清零
pub fn load_segments(memory: &mut VmMemory, segments: &[ElfSegment]) -> Result<(), SimError> {
    for seg in segments.iter().filter(|s| s.mem_size > 0) {
        let file_size = seg.file_size.min(seg.data.len());
        memory.write_bytes(seg.paddr, &seg.data[..file_size])?;
        if seg.mem_size > file_size {
            let bss_start = seg.paddr.wrapping_add(file_size as u32);
            memory.fill(bss_start, seg.mem_size - file_size, 0)?;
        }
    }
    Ok(())
}

// ========== 系统调用 ==========

/// 宿主提供的系统调用实现
///
/// 保留调用号（Halt / Yield / StackProtect）由 `SimEnv` 自己处理，其余调用号交给这里
pub trait SyscallHandler {
    /// 通过 `vm.arg_get` / `vm.arg_set` 读写参数与返回值
    fn handle(&mut self, vm: &mut VmState, evt: &SyscallEvt) -> Result<(), VmErr> {
        let _ = (vm, evt);
        Err(VmErr::BadSysCall)
    }
}

/// 拒绝所有用户系统调用
#[derive(Debug, Default)]
pub struct RejectSyscalls;

impl SyscallHandler for RejectSyscalls {}

/// 宿主循环的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 客户程序调用了 Halt，携带 a0
    Halted { code: u32 },
    Error(VmErr),
    /// 达到 `max_instructions`
    Limit,
}

// ========== SimEnv ==========

/// 仿真环境：虚拟机 + 配置 + 系统调用处理器
pub struct SimEnv {
    vm: VmState,
    config: SimConfig,
    handler: Box<dyn SyscallHandler>,
    /// 累计执行的指令数
    pub instructions_executed: u64,
    tohost_addr: Option<u32>,
}

impl SimEnv {
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        if config.memory_size == 0 {
            return Err(SimError::Config("memory size must be non-zero".into()));
        }
        let mut vm = VmState::with_isa(config.memory_size, config.memory_base, &config.isa)?;

        let mut entry_pc = config.memory_base;
        let mut tohost_addr = None;

        if let Some(path) = &config.elf_path {
            let elf = ElfInfo::parse(path)?;
            load_segments(vm.memory_mut(), &elf.segments)?;
            tohost_addr = elf.find_symbol("tohost");
            entry_pc = elf.entry;

            info!(
                "loaded ELF {}: entry=0x{:08x}, {} segment(s)",
                path.display(),
                elf.entry,
                elf.segments.len()
            );
            for (i, seg) in elf.segments.iter().enumerate() {
                let line = format!(
                    "  segment {}: paddr=0x{:08x} filesz=0x{:x} memsz=0x{:x} {}{}",
                    i,
                    seg.paddr,
                    seg.file_size,
                    seg.mem_size,
                    if seg.executable { "X" } else { "-" },
                    if seg.writable { "W" } else { "R" },
                );
                if config.verbose {
                    info!("{line}");
                } else {
                    debug!("{line}");
                }
            }
        } else if let Some((path, load_addr)) = &config.bin_path {
            let data = std::fs::read(path)?;
            vm.memory_mut().write_bytes(*load_addr, &data)?;
            entry_pc = *load_addr;
            info!("loaded binary {} ({} bytes) at 0x{:08x}", path.display(), data.len(), load_addr);
        }

        if let Some(pc) = config.entry_pc {
            entry_pc = pc;
        }
        vm.set_program_counter(entry_pc);

        if config.extram_size > 0 {
            vm.memory_mut().mount_extram(vec![0; config.extram_size]);
        }

        Ok(SimEnv {
            vm,
            config,
            handler: Box::new(RejectSyscalls),
            instructions_executed: 0,
            tohost_addr,
        })
    }

    /// 替换系统调用处理器
    pub fn with_handler(mut self, handler: impl SyscallHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn vm(&self) -> &VmState {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VmState {
        &mut self.vm
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// tohost 符号处的当前值
    pub fn tohost(&self) -> Option<u32> {
        let addr = self.tohost_addr?;
        self.vm.memory().load32(addr).ok()
    }

    /// 反复调用 `run`，直到结束、出错或达到指令上限
    pub fn run_until_halt(&mut self) -> (u64, RunOutcome) {
        let start = self.instructions_executed;
        let limit = self.config.max_instructions;

        loop {
            let done = self.instructions_executed - start;
            if limit > 0 && done >= limit {
                info!("instruction limit {} reached", limit);
                return (done, RunOutcome::Limit);
            }

            let mut meter = self.config.meter.max(1);
            if limit > 0 {
                meter = meter.min((limit - done).min(u32::MAX as u64) as u32);
            }

            let (executed, evt) = self.vm.run(meter);
            self.instructions_executed += executed as u64;

            let outcome = match evt {
                None => None,
                Some(VmEvt::End) => Some(RunOutcome::Halted { code: 0 }),
                Some(VmEvt::Err { code, msg }) => {
                    warn!("vm error at pc=0x{:08x}: {}", self.vm.program_counter(), msg);
                    Some(RunOutcome::Error(code))
                }
                Some(VmEvt::Syscall(sys)) => self.service(&sys),
            };
            if let Some(outcome) = outcome {
                let total = self.instructions_executed - start;
                info!("stopped after {} instructions: {:?}", total, outcome);
                return (total, outcome);
            }
        }
    }

    /// 处理一次系统调用，返回 Some 表示宿主循环应当停止
    fn service(&mut self, evt: &SyscallEvt) -> Option<RunOutcome> {
        match evt.code {
            SYSCALL_HALT => {
                self.vm.set_status(VmStatus::Ended);
                return Some(RunOutcome::Halted { code: evt.params[0] });
            }
            SYSCALL_YIELD => {}
            SYSCALL_STACK_PROTECT => {
                warn!("stack protect syscall at pc=0x{:08x} ignored", self.vm.program_counter());
            }
            _ => {
                if let Err(e) = self.handler.handle(&mut self.vm, evt) {
                    warn!("syscall 0x{:x} failed: {}", evt.code, e);
                    self.vm.set_status_err(e);
                }
            }
        }
        match self.vm.status() {
            VmStatus::Error => Some(RunOutcome::Error(self.vm.error().unwrap_or(VmErr::InternalState))),
            VmStatus::Ended => Some(RunOutcome::Halted { code: self.vm.cpu().read_reg(10) }),
            _ => None,
        }
    }

    /// 打印仿真状态
    pub fn dump(&self) {
        println!("=== SimEnv Status ===");
        println!("Instructions executed: {}", self.instructions_executed);
        println!("VM status: {:?}", self.vm.status());
        if let Some(value) = self.tohost() {
            println!("tohost: 0x{:08x}", value);
        }
        self.vm.cpu().dump_regs();
    }
}

/// 把 a0 当作 `VmArg::Ret` 写回的便捷函数
pub fn set_syscall_return(vm: &mut VmState, value: u32) {
    vm.arg_set(VmArg::Ret, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = VM_RAM_IMAGE_OFFSET;

    // lui a7, 0x1000  => a7 = SYSCALL_HALT
    const LI_A7_HALT: u32 = 0x010008B7;
    const ECALL: u32 = 0x00000073;

    fn write_program(env: &mut SimEnv, words: &[u32]) {
        for (i, &w) in words.iter().enumerate() {
            env.vm_mut().memory_mut().store32(BASE + 4 * i as u32, w).unwrap();
        }
    }

    /// 只有一个 PT_LOAD 段的最小 ELF32
    fn tiny_elf(entry: u32, paddr: u32, code: &[u32], mem_size: u32) -> Vec<u8> {
        let payload: Vec<u8> = code.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // e_type = EXEC
        out.extend_from_slice(&0xF3u16.to_le_bytes()); // e_machine = RISC-V
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&entry.to_le_bytes());
        out.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        out.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        for field in [
            PT_LOAD,
            84, // p_offset
            paddr,
            paddr,
            payload.len() as u32,
            mem_size,
            PF_X | 0x4,
            4,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn test_sim_config_builder() {
        let config = SimConfig::new()
            .with_memory_size(128 * 1024)
            .with_memory_base(0x8000_0000)
            .with_entry_pc(0x8000_0100)
            .with_max_instructions(1000)
            .with_meter(50)
            .with_isa("rv32imc")
            .unwrap();

        assert_eq!(config.memory_size, 128 * 1024);
        assert_eq!(config.entry_pc, Some(0x8000_0100));
        assert_eq!(config.max_instructions, 1000);
        assert_eq!(config.meter, 50);
        assert!(config.isa.c);
        assert!(!config.isa.f);

        assert!(SimConfig::new().with_isa("rv32iq").is_err());
    }

    #[test]
    fn test_elf_parse_and_load() {
        let bytes = tiny_elf(BASE + 4, BASE, &[0x00000013, 0x00000013], 16);
        let elf = ElfInfo::parse_bytes(&bytes).unwrap();

        assert_eq!(elf.entry, BASE + 4);
        assert_eq!(elf.segments.len(), 1);
        assert!(elf.segments[0].executable);
        assert_eq!(elf.address_range(), Some((BASE, BASE + 16)));
        assert_eq!(elf.find_symbol("tohost"), None);

        let mut mem = VmMemory::new(0x1000, BASE);
        mem.fill(BASE, 32, 0xAA).unwrap();
        load_segments(&mut mem, &elf.segments).unwrap();
        assert_eq!(mem.load32(BASE).unwrap(), 0x00000013);
        // bss 清零
        assert_eq!(mem.load32(BASE + 8).unwrap(), 0);
        assert_eq!(mem.load32(BASE + 12).unwrap(), 0);
        assert_eq!(mem.load32(BASE + 16).unwrap(), 0xAAAA_AAAA);
    }

    #[test]
    fn test_elf_rejects_other_machines() {
        let mut bytes = tiny_elf(BASE, BASE, &[0x13], 4);
        bytes[18] = 0x3E; // x86-64
        assert!(matches!(ElfInfo::parse_bytes(&bytes), Err(SimError::Unsupported(_))));
        assert!(ElfInfo::parse_bytes(b"not an elf").is_err());
    }

    #[test]
    fn test_run_elf_until_halt() {
        let dir = std::env::temp_dir().join(format!("allude_vm_halt_{}.elf", std::process::id()));
        let code = [LI_A7_HALT, 0x00700513, ECALL]; // a0 = 7
        std::fs::write(&dir, tiny_elf(BASE, BASE, &code, 12)).unwrap();

        let mut env = SimEnv::from_config(SimConfig::new().with_elf_path(&dir)).unwrap();
        let (executed, outcome) = env.run_until_halt();
        std::fs::remove_file(&dir).ok();

        assert_eq!(outcome, RunOutcome::Halted { code: 7 });
        assert_eq!(executed, 3);
        assert!(env.vm().has_ended());
    }

    #[test]
    fn test_yield_continues() {
        let mut env = SimEnv::from_config(SimConfig::new()).unwrap();
        write_program(
            &mut env,
            &[
                LI_A7_HALT,
                0x00188893, // addi a7, a7, 1 => YIELD
                ECALL,
                LI_A7_HALT,
                ECALL,
            ],
        );
        let (executed, outcome) = env.run_until_halt();
        assert_eq!(outcome, RunOutcome::Halted { code: 0 });
        assert_eq!(executed, 5);
    }

    #[test]
    fn test_unknown_syscall_rejected_by_default() {
        let mut env = SimEnv::from_config(SimConfig::new()).unwrap();
        write_program(&mut env, &[0x02A00893, ECALL]); // a7 = 42
        let (_, outcome) = env.run_until_halt();
        assert_eq!(outcome, RunOutcome::Error(VmErr::BadSysCall));
    }

    struct Doubler;

    impl SyscallHandler for Doubler {
        fn handle(&mut self, vm: &mut VmState, evt: &SyscallEvt) -> Result<(), VmErr> {
            if evt.code != 42 {
                return Err(VmErr::BadSysCall);
            }
            let a0 = vm.arg_get(VmArg::Arg0);
            set_syscall_return(vm, a0 * 2);
            Ok(())
        }
    }

    #[test]
    fn test_custom_syscall_handler() {
        let mut env = SimEnv::from_config(SimConfig::new()).unwrap().with_handler(Doubler);
        write_program(
            &mut env,
            &[
                0x02A00893, // addi a7, x0, 42
                0x01500513, // addi a0, x0, 21
                ECALL,
                LI_A7_HALT,
                ECALL,
            ],
        );
        let (_, outcome) = env.run_until_halt();
        assert_eq!(outcome, RunOutcome::Halted { code: 42 });
    }

    #[test]
    fn test_instruction_limit() {
        let mut env = SimEnv::from_config(SimConfig::new().with_max_instructions(100).with_meter(30)).unwrap();
        write_program(
            &mut env,
            &[
                0x00108093, // addi x1, x1, 1
                0xFFDFF06F, // jal x0, -4
            ],
        );
        let (executed, outcome) = env.run_until_halt();
        assert_eq!(outcome, RunOutcome::Limit);
        assert_eq!(executed, 100);
        assert_eq!(env.vm().cpu().read_reg(1), 50);
    }

    #[test]
    fn test_extram_mounted() {
        let mut env = SimEnv::from_config(SimConfig::new().with_extram_size(0x100)).unwrap();
        env.vm_mut().cpu_mut().write_reg(2, crate::memory::VM_EXTRAM_BASE);
        env.vm_mut().cpu_mut().write_reg(5, 0x55);
        write_program(
            &mut env,
            &[
                0x00512223, // sw x5, 4(x2)
                LI_A7_HALT,
                ECALL,
            ],
        );
        let (_, outcome) = env.run_until_halt();
        assert_eq!(outcome, RunOutcome::Halted { code: 0 });
        assert!(env.vm().memory().extram_dirty());
        assert_eq!(env.vm().memory().load32(crate::memory::VM_EXTRAM_BASE + 4).unwrap(), 0x55);
    }
}
