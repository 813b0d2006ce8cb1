//! CPU 架构状态：整数 / 浮点 / 向量寄存器堆与 CSR bank

use std::collections::HashMap;

use super::csr_def::*;
use super::trap::{mstatus, PrivilegeMode};

/// 通用寄存器堆
///
/// - `N`: 寄存器个数
/// - `T`: 元素类型
/// - `ZERO_HARDWIRE`: 为 true 时 0 号寄存器恒为 0，写入被丢弃
#[derive(Clone, Debug)]
pub struct GenericRegFile<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool> {
    regs: [T; N],
}

impl<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool> GenericRegFile<N, T, ZERO_HARDWIRE> {
    pub fn new() -> Self {
        Self { regs: [T::default(); N] }
    }

    #[inline]
    pub fn read(&self, reg: u8) -> T {
        self.regs[reg as usize]
    }

    /// 写回时屏蔽 x0，读路径不做判断
    #[inline]
    pub fn write(&mut self, reg: u8, value: T) {
        if ZERO_HARDWIRE && reg == 0 {
            return;
        }
        self.regs[reg as usize] = value;
    }

    pub fn snapshot(&self) -> &[T; N] {
        &self.regs
    }
}

impl<const N: usize, T: Copy + Default, const ZERO_HARDWIRE: bool> Default for GenericRegFile<N, T, ZERO_HARDWIRE> {
    fn default() -> Self {
        Self::new()
    }
}

/// x0..x31，x0 硬连线为 0
pub type RegFile = GenericRegFile<32, u32, true>;

/// f0..f31，每个 64 bit，单精度值按 NaN-boxing 存放
pub type FpRegFile = GenericRegFile<32, NanBoxed, false>;

// ========== NaN-boxing ==========

pub const CANONICAL_NAN_F32: u32 = 0x7FC0_0000;
pub const CANONICAL_NAN_F64: u64 = 0x7FF8_0000_0000_0000;

const BOX_MASK: u64 = 0xFFFF_FFFF_0000_0000;

/// 64 bit 浮点寄存器槽
///
/// 单精度值存放在低 32 位，高 32 位全 1；
/// 以单精度读取一个没有正确装箱的值得到规范 NaN。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NanBoxed(pub u64);

impl NanBoxed {
    #[inline]
    pub fn from_f32_bits(bits: u32) -> Self {
        NanBoxed(BOX_MASK | bits as u64)
    }

    #[inline]
    pub fn to_f32_bits(self) -> u32 {
        if self.0 & BOX_MASK == BOX_MASK {
            self.0 as u32
        } else {
            CANONICAL_NAN_F32
        }
    }

    #[inline]
    pub fn from_f64_bits(bits: u64) -> Self {
        NanBoxed(bits)
    }

    #[inline]
    pub fn to_f64_bits(self) -> u64 {
        self.0
    }

    pub fn from_f32(value: f32) -> Self {
        Self::from_f32_bits(value.to_bits())
    }

    pub fn to_f32(self) -> f32 {
        f32::from_bits(self.to_f32_bits())
    }

    pub fn from_f64(value: f64) -> Self {
        NanBoxed(value.to_bits())
    }

    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn is_boxed(self) -> bool {
        self.0 & BOX_MASK == BOX_MASK
    }
}

// ========== 向量寄存器堆 ==========

/// VLEN / 8
pub const VLEN_BYTES: usize = 16;
pub const VREG_COUNT: usize = 32;

/// 32 个 128-bit 向量寄存器，连续存放于一个 512 字节数组
#[derive(Clone, Debug)]
pub struct VecRegFile {
    bytes: [u8; VLEN_BYTES * VREG_COUNT],
}

impl Default for VecRegFile {
    fn default() -> Self {
        Self::new()
    }
}

impl VecRegFile {
    pub fn new() -> Self {
        VecRegFile {
            bytes: [0; VLEN_BYTES * VREG_COUNT],
        }
    }

    /// 逻辑元素在寄存器数组中的字节偏移
    ///
    /// 元素 `idx` 落在寄存器组内第 `idx / (VLEN_BYTES / sew_bytes)` 个寄存器。
    #[inline]
    pub fn element_addr(reg: u8, idx: usize, sew_bytes: usize) -> usize {
        let per_reg = VLEN_BYTES / sew_bytes;
        (reg as usize + idx / per_reg) * VLEN_BYTES + (idx % per_reg) * sew_bytes
    }

    /// 读一个元素（零扩展到 u32），越过寄存器堆的下标读为 0
    pub fn read_elem(&self, reg: u8, idx: usize, sew_bytes: usize) -> u32 {
        let at = Self::element_addr(reg, idx, sew_bytes);
        let mut buf = [0u8; 4];
        if let Some(src) = self.bytes.get(at..at + sew_bytes) {
            buf[..sew_bytes].copy_from_slice(src);
        }
        u32::from_le_bytes(buf)
    }

    /// 写一个元素（截断到 SEW），越过寄存器堆的下标被忽略
    pub fn write_elem(&mut self, reg: u8, idx: usize, sew_bytes: usize, value: u32) {
        let at = Self::element_addr(reg, idx, sew_bytes);
        if let Some(dst) = self.bytes.get_mut(at..at + sew_bytes) {
            dst.copy_from_slice(&value.to_le_bytes()[..sew_bytes]);
        }
    }

    /// v0 中第 idx 个掩码位，超出 v0 的下标视为 0
    #[inline]
    pub fn mask_bit(&self, idx: usize) -> bool {
        self.bytes[..VLEN_BYTES]
            .get(idx / 8)
            .is_some_and(|b| (b >> (idx % 8)) & 1 != 0)
    }

    pub fn reg(&self, reg: u8) -> &[u8] {
        let at = reg as usize * VLEN_BYTES;
        &self.bytes[at..at + VLEN_BYTES]
    }

    pub fn reg_mut(&mut self, reg: u8) -> &mut [u8] {
        let at = reg as usize * VLEN_BYTES;
        &mut self.bytes[at..at + VLEN_BYTES]
    }

    pub fn as_bytes(&self) -> &[u8; VLEN_BYTES * VREG_COUNT] {
        &self.bytes
    }
}

// ========== CSR ==========

/// CSR 写语义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrKind {
    /// 普通读写
    Plain,
    /// 写入被接受但忽略
    ReadOnly,
    /// 只保留掩码内的位
    Masked(u32),
    /// 其他寄存器的视图，没有独立存储
    View,
}

/// CSR 声明项：名字、地址、复位值、写语义
#[derive(Debug, Clone, Copy)]
pub struct CsrEntry {
    pub name: &'static str,
    pub addr: u16,
    pub reset: u32,
    pub kind: CsrKind,
}

impl CsrEntry {
    pub const fn new(name: &'static str, addr: u16, reset: u32) -> Self {
        CsrEntry { name, addr, reset, kind: CsrKind::Plain }
    }

    pub const fn read_only(name: &'static str, addr: u16, reset: u32) -> Self {
        CsrEntry { name, addr, reset, kind: CsrKind::ReadOnly }
    }

    pub const fn masked(name: &'static str, addr: u16, mask: u32) -> Self {
        CsrEntry { name, addr, reset: 0, kind: CsrKind::Masked(mask) }
    }

    pub const fn view(name: &'static str, addr: u16) -> Self {
        CsrEntry { name, addr, reset: 0, kind: CsrKind::View }
    }
}

/// CSR bank：按地址索引的哈希表
///
/// 注册的表由 misa 决定，没有注册的地址读写都失败（由执行单元转为非法指令）。
#[derive(Clone, Debug, Default)]
pub struct CsrBank {
    table: HashMap<u16, u32>,
    kinds: HashMap<u16, CsrKind>,
}

impl CsrBank {
    pub fn new(misa: u32) -> Self {
        let mut bank = CsrBank::default();
        bank.register(M_CSRS);
        bank.register(S_CSRS);
        bank.register(COUNTER_CSRS);
        if misa & (misa_bit(b'f') | misa_bit(b'd')) != 0 {
            bank.register(F_CSRS);
        }
        if misa & misa_bit(b'v') != 0 {
            bank.register(V_CSRS);
        }
        bank.table.insert(CSR_MISA, misa);
        bank
    }

    pub fn register(&mut self, entries: &[CsrEntry]) {
        for e in entries {
            if e.kind != CsrKind::View {
                self.table.insert(e.addr, e.reset);
            }
            self.kinds.insert(e.addr, e.kind);
        }
    }

    #[inline]
    pub fn is_implemented(&self, addr: u16) -> bool {
        self.kinds.contains_key(&addr) || is_pmp_csr(addr)
    }

    /// 原始存储读取，视图与未实现地址读为 0（供核心内部使用）
    #[inline]
    pub fn get(&self, addr: u16) -> u32 {
        self.table.get(&addr).copied().unwrap_or(0)
    }

    /// 原始存储写入，绕过写语义（供核心内部使用）
    #[inline]
    pub fn set(&mut self, addr: u16, value: u32) {
        self.table.insert(addr, value);
    }

    /// 架构读：未实现地址返回 None
    pub fn read(&self, addr: u16) -> Option<u32> {
        if is_pmp_csr(addr) {
            return Some(0);
        }
        let kind = self.kinds.get(&addr)?;
        if *kind != CsrKind::View {
            return self.table.get(&addr).copied();
        }
        let value = match addr {
            CSR_FFLAGS => self.get(CSR_FCSR) & 0x1F,
            CSR_FRM => (self.get(CSR_FCSR) >> 5) & 0x7,
            CSR_SSTATUS => self.get(CSR_MSTATUS) & mstatus::SSTATUS_MASK,
            CSR_CYCLE => self.get(CSR_MCYCLE),
            CSR_CYCLEH => self.get(CSR_MCYCLEH),
            CSR_INSTRET => self.get(CSR_MINSTRET),
            CSR_INSTRETH => self.get(CSR_MINSTRETH),
            _ => return None,
        };
        Some(value)
    }

    /// 架构写：未实现地址返回 false，只读寄存器静默忽略
    pub fn write(&mut self, addr: u16, value: u32) -> bool {
        if is_pmp_csr(addr) {
            return true;
        }
        let Some(kind) = self.kinds.get(&addr).copied() else {
            return false;
        };
        match kind {
            CsrKind::Plain => {
                self.table.insert(addr, value);
            }
            CsrKind::ReadOnly => {}
            CsrKind::Masked(mask) => {
                self.table.insert(addr, value & mask);
            }
            CsrKind::View => match addr {
                CSR_FFLAGS => {
                    let fcsr = self.get(CSR_FCSR);
                    self.set(CSR_FCSR, (fcsr & !0x1F) | (value & 0x1F));
                }
                CSR_FRM => {
                    let fcsr = self.get(CSR_FCSR);
                    self.set(CSR_FCSR, (fcsr & !0xE0) | ((value & 0x7) << 5));
                }
                CSR_SSTATUS => {
                    let m = self.get(CSR_MSTATUS);
                    self.set(CSR_MSTATUS, (m & !mstatus::SSTATUS_MASK) | (value & mstatus::SSTATUS_MASK));
                }
                // 用户态计数器影子只读
                _ => {}
            },
        }
        true
    }

    /// 写入会被忽略的寄存器：地址 bit[11:10] = 0b11，或声明为只读
    pub fn is_read_only(&self, addr: u16) -> bool {
        addr >> 10 == 0b11 || self.kinds.get(&addr) == Some(&CsrKind::ReadOnly)
    }

    /// 每条指令退休后推进 mcycle / minstret
    pub fn tick_counters(&mut self) {
        let inhibit = self.get(CSR_MCOUNTINHIBIT);
        if inhibit & 0x1 == 0 {
            self.bump64(CSR_MCYCLE, CSR_MCYCLEH);
        }
        if inhibit & 0x4 == 0 {
            self.bump64(CSR_MINSTRET, CSR_MINSTRETH);
        }
    }

    fn bump64(&mut self, lo: u16, hi: u16) {
        let value = self.read_u64(lo, hi).wrapping_add(1);
        self.set(lo, value as u32);
        self.set(hi, (value >> 32) as u32);
    }

    pub fn read_u64(&self, lo: u16, hi: u16) -> u64 {
        ((self.get(hi) as u64) << 32) | self.get(lo) as u64
    }

    /// 累积 IEEE 异常标志到 fflags
    #[inline]
    pub fn accrue_fflags(&mut self, flags: u32) {
        if flags != 0 {
            let fcsr = self.get(CSR_FCSR);
            self.set(CSR_FCSR, fcsr | (flags & 0x1F));
        }
    }

    #[inline]
    pub fn frm(&self) -> u32 {
        (self.get(CSR_FCSR) >> 5) & 0x7
    }

    /// 所有已实现 CSR 的地址（升序）
    pub fn addresses(&self) -> Vec<u16> {
        let mut addrs: Vec<u16> = self.kinds.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    pub fn snapshot(&self) -> &HashMap<u16, u32> {
        &self.table
    }
}

/// 架构状态集合
#[derive(Clone, Debug)]
pub struct Status {
    pub int: RegFile,
    pub fp: FpRegFile,
    pub vec: VecRegFile,
    pub csr: CsrBank,
    pub privilege: PrivilegeMode,
}

impl Status {
    pub fn new(misa: u32) -> Self {
        Self {
            int: RegFile::new(),
            fp: FpRegFile::new(),
            vec: VecRegFile::new(),
            csr: CsrBank::new(misa),
            privilege: PrivilegeMode::Machine, // 启动时为 M-mode
        }
    }

    #[inline]
    pub fn int_read(&self, reg: u8) -> u32 {
        self.int.read(reg)
    }

    #[inline]
    pub fn int_write(&mut self, reg: u8, value: u32) {
        self.int.write(reg, value)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            int: *self.int.snapshot(),
            fp: self.fp.snapshot().map(|f| f.0),
            vec: self.vec.as_bytes().to_vec(),
            csr: self.csr.snapshot().clone(),
            privilege: self.privilege,
        }
    }
}

/// 架构状态快照
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    pub int: [u32; 32],
    pub fp: [u64; 32],
    pub vec: Vec<u8>,
    pub csr: HashMap<u16, u32>,
    pub privilege: PrivilegeMode,
}
