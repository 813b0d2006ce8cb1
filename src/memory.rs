//! 内存抽象层
//!
//! 本模块定义了内存访问的统一接口 `Memory` trait，
//! 以及虚拟机使用的 `VmMemory`：一段主 RAM 加上一个可选的外部挂载扩展内存（extram）。
//!
//! 地址空间划分：
//! - `[VM_EXTRAM_BASE, VM_EXTRAM_END)`：扩展内存窗口，写入会置 dirty 标志；
//!   未挂载时客户访存越界
//! - `[base, base + size)`：主 RAM

use thiserror::Error;

/// 扩展内存窗口起始地址
pub const VM_EXTRAM_BASE: u32 = 0x1000_0000;
/// 扩展内存窗口结束地址（不含）
pub const VM_EXTRAM_END: u32 = 0x1200_0000;

/// 访存粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
    Double,
}

impl AccessSize {
    pub fn bytes(self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
            AccessSize::Double => 8,
        }
    }

    #[inline]
    pub fn is_aligned(self, addr: u32) -> bool {
        addr % self.bytes() as u32 == 0
    }
}

/// 扩展内存访问类型，编码与 load/store 指令的 funct3 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtramAccess {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

impl ExtramAccess {
    /// 从访问类型码解析：0=B, 1=H, 2=W, 4=BU, 5=HU
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ExtramAccess::Byte),
            1 => Some(ExtramAccess::Half),
            2 => Some(ExtramAccess::Word),
            4 => Some(ExtramAccess::ByteUnsigned),
            5 => Some(ExtramAccess::HalfUnsigned),
            _ => None,
        }
    }

    fn size(self) -> AccessSize {
        match self {
            ExtramAccess::Byte | ExtramAccess::ByteUnsigned => AccessSize::Byte,
            ExtramAccess::Half | ExtramAccess::HalfUnsigned => AccessSize::Half,
            ExtramAccess::Word => AccessSize::Word,
        }
    }
}

/// 内存访问错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemError {
    /// 地址未按访问粒度对齐
    #[error("unaligned {access:?} access at 0x{addr:08x}")]
    Unaligned { addr: u32, access: AccessSize },
    /// 地址越界（未映射到当前内存区域）
    #[error("out-of-range {access:?} access at 0x{addr:08x} (region=0x{base:08x}+0x{size:x})")]
    OutOfRange { addr: u32, access: AccessSize, base: u32, size: usize },
}

pub type MemResult<T> = Result<T, MemError>;

/// 内存访问的统一接口（小端序）
pub trait Memory {
    fn load8(&self, addr: u32) -> MemResult<u8>;
    fn load16(&self, addr: u32) -> MemResult<u16>;
    fn load32(&self, addr: u32) -> MemResult<u32>;
    fn load64(&self, addr: u32) -> MemResult<u64>;

    fn store8(&mut self, addr: u32, value: u8) -> MemResult<()>;
    fn store16(&mut self, addr: u32, value: u16) -> MemResult<()>;
    fn store32(&mut self, addr: u32, value: u32) -> MemResult<()>;
    fn store64(&mut self, addr: u32, value: u64) -> MemResult<()>;
}

/// 虚拟机内存：主 RAM + 可选扩展内存
pub struct VmMemory {
    /// 主 RAM
    data: Vec<u8>,
    /// RAM 在地址空间中的起始地址
    base_addr: u32,
    /// 外部挂载的扩展内存
    extram: Option<Vec<u8>>,
    /// 扩展内存自上次清除后是否被写过
    extram_dirty: bool,
}

impl VmMemory {
    /// 创建一段 `size` 字节、映射到 `base_addr` 的主 RAM
    ///
    /// ```
    /// use allude_vm::memory::VmMemory;
    ///
    /// let mem = VmMemory::new(64 * 1024, 0x8000_0000);
    /// assert_eq!(mem.size(), 64 * 1024);
    /// ```
    pub fn new(size: usize, base_addr: u32) -> Self {
        VmMemory {
            data: vec![0; size],
            base_addr,
            extram: None,
            extram_dirty: false,
        }
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 主 RAM 的原始字节视图（下标为相对 base 的偏移）
    pub fn ram(&self) -> &[u8] {
        &self.data
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 挂载扩展内存，替换之前挂载的内容
    pub fn mount_extram(&mut self, ram: Vec<u8>) {
        self.extram = Some(ram);
        self.extram_dirty = false;
    }

    /// 卸载扩展内存并取回其内容
    pub fn unmount_extram(&mut self) -> Option<Vec<u8>> {
        self.extram_dirty = false;
        self.extram.take()
    }

    pub fn extram(&self) -> Option<&[u8]> {
        self.extram.as_deref()
    }

    pub fn extram_dirty(&self) -> bool {
        self.extram_dirty
    }

    pub fn clear_extram_dirty(&mut self) {
        self.extram_dirty = false;
    }

    #[inline]
    fn in_extram_window(addr: u32) -> bool {
        (VM_EXTRAM_BASE..VM_EXTRAM_END).contains(&addr)
    }

    /// 已挂载扩展内存中的偏移；窗口外、未挂载或越过挂载长度都是 OutOfRange
    fn extram_offset(&self, addr: u32, access: AccessSize) -> MemResult<usize> {
        let len = self.extram.as_ref().map_or(0, Vec::len);
        let out_of_range = MemError::OutOfRange {
            addr,
            access,
            base: VM_EXTRAM_BASE,
            size: len,
        };
        if !Self::in_extram_window(addr) {
            return Err(out_of_range);
        }
        let offset = addr.checked_sub(VM_EXTRAM_BASE).ok_or(out_of_range)? as usize;
        let end = offset.checked_add(access.bytes()).ok_or(out_of_range)?;
        if end > len {
            return Err(out_of_range);
        }
        Ok(offset)
    }

    fn read_extram(&self, addr: u32, access: ExtramAccess) -> MemResult<u32> {
        let offset = self.extram_offset(addr, access.size())?;
        let ram = self.extram.as_deref().unwrap_or_default();
        let half = || u16::from_le_bytes([ram[offset], ram[offset + 1]]);
        let value = match access {
            ExtramAccess::Byte => ram[offset] as i8 as i32 as u32,
            ExtramAccess::ByteUnsigned => ram[offset] as u32,
            ExtramAccess::Half => half() as i16 as i32 as u32,
            ExtramAccess::HalfUnsigned => half() as u32,
            ExtramAccess::Word => u32::from_le_bytes([
                ram[offset],
                ram[offset + 1],
                ram[offset + 2],
                ram[offset + 3],
            ]),
        };
        Ok(value)
    }

    fn write_extram(&mut self, addr: u32, value: u32, access: ExtramAccess) -> MemResult<()> {
        let offset = self.extram_offset(addr, access.size())?;
        let len = access.size().bytes();
        if let Some(ram) = self.extram.as_mut() {
            ram[offset..offset + len].copy_from_slice(&value.to_le_bytes()[..len]);
            self.extram_dirty = true;
        }
        Ok(())
    }

    /// 宿主按访问类型读取扩展内存；窗口内但未挂载时读为 0
    pub fn extram_load(&self, addr: u32, access: ExtramAccess) -> MemResult<u32> {
        if self.extram.is_none() && Self::in_extram_window(addr) {
            return Ok(0);
        }
        self.read_extram(addr, access)
    }

    /// 宿主按访问类型写入扩展内存并置 dirty；窗口内但未挂载时写入被丢弃
    pub fn extram_store(&mut self, addr: u32, value: u32, access: ExtramAccess) -> MemResult<()> {
        if self.extram.is_none() && Self::in_extram_window(addr) {
            return Ok(());
        }
        self.write_extram(addr, value, access)
    }

    fn ram_offset(&self, addr: u32, len: usize, access: AccessSize) -> MemResult<usize> {
        let out_of_range = MemError::OutOfRange {
            addr,
            access,
            base: self.base_addr,
            size: self.data.len(),
        };
        let relative = addr.checked_sub(self.base_addr).ok_or(out_of_range)? as usize;
        let end = relative.checked_add(len).ok_or(out_of_range)?;
        if end > self.data.len() {
            return Err(out_of_range);
        }
        Ok(relative)
    }

    fn read_ram<const N: usize>(&self, addr: u32, access: AccessSize) -> MemResult<[u8; N]> {
        if !access.is_aligned(addr) {
            return Err(MemError::Unaligned { addr, access });
        }
        let idx = self.ram_offset(addr, N, access)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.data[idx..idx + N]);
        Ok(buf)
    }

    fn write_ram(&mut self, addr: u32, bytes: &[u8], access: AccessSize) -> MemResult<()> {
        if !access.is_aligned(addr) {
            return Err(MemError::Unaligned { addr, access });
        }
        let idx = self.ram_offset(addr, bytes.len(), access)?;
        self.data[idx..idx + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// 批量写入数据到主 RAM
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> MemResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let start = self.ram_offset(addr, data.len(), AccessSize::Byte)?;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// 批量读取主 RAM
    pub fn read_bytes(&self, addr: u32, len: usize) -> MemResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = self.ram_offset(addr, len, AccessSize::Byte)?;
        Ok(self.data[start..start + len].to_vec())
    }

    /// 将指定范围填充为固定字节
    pub fn fill(&mut self, addr: u32, len: usize, value: u8) -> MemResult<()> {
        if len == 0 {
            return Ok(());
        }
        let start = self.ram_offset(addr, len, AccessSize::Byte)?;
        self.data[start..start + len].fill(value);
        Ok(())
    }

    /// 在主 RAM 或扩展内存中取一段经过边界检查的切片，供宿主访问客户缓冲区
    pub fn get_safe_slice(&self, addr: u32, len: u32) -> Option<&[u8]> {
        if Self::in_extram_window(addr) {
            let ram = self.extram.as_deref()?;
            let start = (addr - VM_EXTRAM_BASE) as usize;
            return ram.get(start..start.checked_add(len as usize)?);
        }
        let start = addr.checked_sub(self.base_addr)? as usize;
        self.data.get(start..start.checked_add(len as usize)?)
    }

    pub fn get_safe_slice_mut(&mut self, addr: u32, len: u32) -> Option<&mut [u8]> {
        if Self::in_extram_window(addr) {
            let ram = self.extram.as_deref_mut()?;
            let start = (addr - VM_EXTRAM_BASE) as usize;
            self.extram_dirty = true;
            return ram.get_mut(start..start.checked_add(len as usize)?);
        }
        let start = addr.checked_sub(self.base_addr)? as usize;
        self.data.get_mut(start..start.checked_add(len as usize)?)
    }
}

impl Memory for VmMemory {
    fn load8(&self, addr: u32) -> MemResult<u8> {
        if Self::in_extram_window(addr) {
            return self.read_extram(addr, ExtramAccess::ByteUnsigned).map(|v| v as u8);
        }
        Ok(self.read_ram::<1>(addr, AccessSize::Byte)?[0])
    }

    fn load16(&self, addr: u32) -> MemResult<u16> {
        if Self::in_extram_window(addr) {
            return self.read_extram(addr, ExtramAccess::HalfUnsigned).map(|v| v as u16);
        }
        self.read_ram(addr, AccessSize::Half).map(u16::from_le_bytes)
    }

    fn load32(&self, addr: u32) -> MemResult<u32> {
        if Self::in_extram_window(addr) {
            return self.read_extram(addr, ExtramAccess::Word);
        }
        self.read_ram(addr, AccessSize::Word).map(u32::from_le_bytes)
    }

    fn load64(&self, addr: u32) -> MemResult<u64> {
        if Self::in_extram_window(addr) {
            let lo = self.read_extram(addr, ExtramAccess::Word)? as u64;
            let hi = self.read_extram(addr.wrapping_add(4), ExtramAccess::Word)? as u64;
            return Ok(lo | (hi << 32));
        }
        self.read_ram(addr, AccessSize::Double).map(u64::from_le_bytes)
    }

    fn store8(&mut self, addr: u32, value: u8) -> MemResult<()> {
        if Self::in_extram_window(addr) {
            return self.write_extram(addr, value as u32, ExtramAccess::Byte);
        }
        self.write_ram(addr, &[value], AccessSize::Byte)
    }

    fn store16(&mut self, addr: u32, value: u16) -> MemResult<()> {
        if Self::in_extram_window(addr) {
            return self.write_extram(addr, value as u32, ExtramAccess::Half);
        }
        self.write_ram(addr, &value.to_le_bytes(), AccessSize::Half)
    }

    fn store32(&mut self, addr: u32, value: u32) -> MemResult<()> {
        if Self::in_extram_window(addr) {
            return self.write_extram(addr, value, ExtramAccess::Word);
        }
        self.write_ram(addr, &value.to_le_bytes(), AccessSize::Word)
    }

    fn store64(&mut self, addr: u32, value: u64) -> MemResult<()> {
        if Self::in_extram_window(addr) {
            self.write_extram(addr, value as u32, ExtramAccess::Word)?;
            return self.write_extram(addr.wrapping_add(4), (value >> 32) as u32, ExtramAccess::Word);
        }
        self.write_ram(addr, &value.to_le_bytes(), AccessSize::Double)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_basic() {
        let mut mem = VmMemory::new(1024, 0);

        mem.store8(0, 0x12).unwrap();
        assert_eq!(mem.load8(0).unwrap(), 0x12);

        // 小端序
        mem.store16(2, 0x3456).unwrap();
        assert_eq!(mem.load16(2).unwrap(), 0x3456);
        assert_eq!(mem.load8(2).unwrap(), 0x56);
        assert_eq!(mem.load8(3).unwrap(), 0x34);

        mem.store32(4, 0x78ABCDEF).unwrap();
        assert_eq!(mem.load32(4).unwrap(), 0x78ABCDEF);
        assert_eq!(mem.load8(7).unwrap(), 0x78);

        mem.store64(8, 0x0123_4567_89AB_CDEF).unwrap();
        assert_eq!(mem.load64(8).unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(mem.load32(12).unwrap(), 0x0123_4567);
    }

    #[test]
    fn test_ram_with_base_addr() {
        let mut mem = VmMemory::new(1024, 0x8000_0000);
        mem.store32(0x8000_0000, 0xDEADBEEF).unwrap();
        assert_eq!(mem.load32(0x8000_0000).unwrap(), 0xDEADBEEF);
        assert_eq!(mem.ram()[0], 0xEF);

        let err = mem.load32(0x7FFF_FFFC).unwrap_err();
        assert!(matches!(err, MemError::OutOfRange { .. }));
    }

    #[test]
    fn test_unaligned() {
        let mem = VmMemory::new(1024, 0);
        assert!(matches!(mem.load16(1).unwrap_err(), MemError::Unaligned { .. }));
        assert!(matches!(mem.load32(2).unwrap_err(), MemError::Unaligned { .. }));
        assert!(matches!(mem.load64(4).unwrap_err(), MemError::Unaligned { .. }));
    }

    #[test]
    fn test_out_of_bounds_tail() {
        let mem = VmMemory::new(1024, 0);
        assert!(mem.load32(1020).is_ok());
        assert!(matches!(mem.load32(1024).unwrap_err(), MemError::OutOfRange { .. }));
        assert!(matches!(mem.load64(1020 - 4).map(|_| ()), Ok(())));
    }

    #[test]
    fn test_write_bytes_and_fill() {
        let mut mem = VmMemory::new(64, 0x100);
        mem.write_bytes(0x100, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mem.load32(0x100).unwrap(), 0x04030201);
        mem.fill(0x102, 2, 0xAA).unwrap();
        assert_eq!(mem.read_bytes(0x100, 4).unwrap(), vec![1, 2, 0xAA, 0xAA]);
        assert!(mem.write_bytes(0x13E, &[0; 4]).is_err());
    }

    #[test]
    fn test_extram_unmounted_reads_zero() {
        let mut mem = VmMemory::new(64, 0);
        assert_eq!(mem.extram_load(VM_EXTRAM_BASE, ExtramAccess::Word).unwrap(), 0);
        mem.extram_store(VM_EXTRAM_BASE, 5, ExtramAccess::Word).unwrap();
        assert!(!mem.extram_dirty());
    }

    #[test]
    fn test_extram_access_types() {
        let mut mem = VmMemory::new(64, 0);
        mem.mount_extram(vec![0; 16]);

        mem.extram_store(VM_EXTRAM_BASE, 0xFFFF_FF80, ExtramAccess::Word).unwrap();
        assert!(mem.extram_dirty());
        assert_eq!(mem.extram_load(VM_EXTRAM_BASE, ExtramAccess::Byte).unwrap(), 0xFFFF_FF80);
        assert_eq!(mem.extram_load(VM_EXTRAM_BASE, ExtramAccess::ByteUnsigned).unwrap(), 0x80);
        assert_eq!(mem.extram_load(VM_EXTRAM_BASE, ExtramAccess::Half).unwrap(), 0xFFFF_FF80);
        assert_eq!(mem.extram_load(VM_EXTRAM_BASE, ExtramAccess::HalfUnsigned).unwrap(), 0xFF80);

        mem.clear_extram_dirty();
        mem.store8(VM_EXTRAM_BASE + 4, 0x7F).unwrap();
        assert!(mem.extram_dirty());
        assert_eq!(mem.load8(VM_EXTRAM_BASE + 4).unwrap(), 0x7F);
    }

    #[test]
    fn test_extram_bounds() {
        let mut mem = VmMemory::new(64, 0);
        mem.mount_extram(vec![0; 8]);
        assert!(mem.extram_load(VM_EXTRAM_BASE + 8, ExtramAccess::Byte).is_err());
        assert!(mem.extram_load(VM_EXTRAM_BASE + 6, ExtramAccess::Word).is_err());
        assert!(mem.extram_store(VM_EXTRAM_BASE + 8, 1, ExtramAccess::Byte).is_err());
        assert_eq!(ExtramAccess::from_code(3), None);
        assert_eq!(ExtramAccess::from_code(5), Some(ExtramAccess::HalfUnsigned));

        // 窗口外的地址
        assert!(matches!(
            mem.extram_load(0x100, ExtramAccess::Word).unwrap_err(),
            MemError::OutOfRange { addr: 0x100, .. }
        ));
        assert!(mem.extram_store(VM_EXTRAM_END, 1, ExtramAccess::Byte).is_err());
        assert!(!mem.extram_dirty());
    }

    #[test]
    fn test_unmounted_extram_window_is_out_of_range() {
        let mut mem = VmMemory::new(64, 0);
        assert!(matches!(mem.load32(VM_EXTRAM_BASE).unwrap_err(), MemError::OutOfRange { .. }));
        assert!(matches!(mem.load8(VM_EXTRAM_BASE + 3).unwrap_err(), MemError::OutOfRange { .. }));
        assert!(matches!(mem.store32(VM_EXTRAM_BASE, 1).unwrap_err(), MemError::OutOfRange { .. }));
        assert!(mem.store64(VM_EXTRAM_END - 8, 1).is_err());
        assert!(!mem.extram_dirty());

        // 宿主接口在窗口外同样报错
        assert!(mem.extram_load(0x100, ExtramAccess::Word).is_err());
    }

    #[test]
    fn test_get_safe_slice() {
        let mut mem = VmMemory::new(64, 0x8000_0000);
        mem.write_bytes(0x8000_0010, b"hi").unwrap();
        assert_eq!(mem.get_safe_slice(0x8000_0010, 2), Some(&b"hi"[..]));
        assert!(mem.get_safe_slice(0x8000_003F, 2).is_none());
        assert!(mem.get_safe_slice(VM_EXTRAM_BASE, 1).is_none());

        mem.mount_extram(vec![0; 4]);
        mem.get_safe_slice_mut(VM_EXTRAM_BASE, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert!(mem.extram_dirty());
        assert_eq!(mem.extram().unwrap(), &[1, 2, 3, 4]);
    }
}
