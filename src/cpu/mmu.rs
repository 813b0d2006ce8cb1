//! Sv32 地址翻译
//!
//! 两级页表：vaddr = VPN[1](10) | VPN[0](10) | offset(12)。
//! satp.MODE = 1 时对所有特权级生效，Bare 模式下恒等映射。
//! 页表项读取失败与无效项一样按访问类型报页错误。

use log::trace;

use super::csr_def::{SATP_MODE_SV32, SATP_PPN_MASK};
use super::trap::{AccessType, Exception, TrapCause};
use crate::memory::Memory;

pub const PAGE_SIZE: u32 = 4096;

pub mod pte {
    pub const V: u32 = 1 << 0;
    pub const R: u32 = 1 << 1;
    pub const W: u32 = 1 << 2;
    pub const X: u32 = 1 << 3;
    pub const U: u32 = 1 << 4;
    pub const G: u32 = 1 << 5;
    pub const A: u32 = 1 << 6;
    pub const D: u32 = 1 << 7;
}

#[inline]
fn page_fault(access: AccessType, vaddr: u32) -> Exception {
    Exception::with_tval(TrapCause::page_fault(access), vaddr)
}

#[inline]
fn is_leaf(entry: u32) -> bool {
    entry & (pte::R | pte::W | pte::X) != 0
}

/// 校验 PTE 是否有效以及 W-without-R 保留组合
#[inline]
fn check_valid(entry: u32, access: AccessType, vaddr: u32) -> Result<(), Exception> {
    if entry & pte::V == 0 || (entry & pte::W != 0 && entry & pte::R == 0) {
        return Err(page_fault(access, vaddr));
    }
    Ok(())
}

/// 叶子 PTE 的访问权限：取指需要 X，加载需要 R，存储需要 W
#[inline]
fn check_permissions(entry: u32, access: AccessType, vaddr: u32) -> Result<(), Exception> {
    let need = match access {
        AccessType::Fetch => pte::X,
        AccessType::Load => pte::R,
        AccessType::Store => pte::W,
    };
    if entry & need == 0 {
        return Err(page_fault(access, vaddr));
    }
    Ok(())
}

fn read_pte(mem: &dyn Memory, addr: u32, access: AccessType, vaddr: u32) -> Result<u32, Exception> {
    mem.load32(addr).map_err(|_| page_fault(access, vaddr))
}

/// 是否需要做页表翻译
#[inline]
pub fn paging_enabled(satp: u32) -> bool {
    satp & SATP_MODE_SV32 != 0
}

/// 虚拟地址到物理地址
pub fn translate(
    mem: &dyn Memory,
    satp: u32,
    vaddr: u32,
    access: AccessType,
) -> Result<u32, Exception> {
    if !paging_enabled(satp) {
        return Ok(vaddr);
    }

    let vpn1 = (vaddr >> 22) & 0x3FF;
    let vpn0 = (vaddr >> 12) & 0x3FF;
    let offset = vaddr & 0xFFF;
    let ptbr = (satp & SATP_PPN_MASK).wrapping_mul(PAGE_SIZE);

    let pte1 = read_pte(mem, ptbr.wrapping_add(vpn1 * 4), access, vaddr)?;
    check_valid(pte1, access, vaddr)?;

    if is_leaf(pte1) {
        // 4 MiB 超级页：PPN[0] 必须为 0
        if (pte1 >> 10) & 0x3FF != 0 {
            return Err(page_fault(access, vaddr));
        }
        check_permissions(pte1, access, vaddr)?;
        let paddr = (((pte1 >> 20) & 0xFFF) << 22) | (vaddr & 0x3F_FFFF);
        trace!("sv32 superpage 0x{:08x} -> 0x{:08x}", vaddr, paddr);
        return Ok(paddr);
    }

    let table0 = ((pte1 >> 10) & SATP_PPN_MASK).wrapping_mul(PAGE_SIZE);
    let pte0 = read_pte(mem, table0.wrapping_add(vpn0 * 4), access, vaddr)?;
    check_valid(pte0, access, vaddr)?;
    if !is_leaf(pte0) {
        return Err(page_fault(access, vaddr));
    }
    check_permissions(pte0, access, vaddr)?;

    let paddr = ((pte0 >> 10) & SATP_PPN_MASK).wrapping_mul(PAGE_SIZE) | offset;
    trace!("sv32 0x{:08x} -> 0x{:08x}", vaddr, paddr);
    Ok(paddr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VmMemory;

    const ROOT: u32 = 0x8000_1000;
    const L0: u32 = 0x8000_2000;

    fn satp_for(root: u32) -> u32 {
        SATP_MODE_SV32 | (root / PAGE_SIZE)
    }

    fn table_entry(ppn_addr: u32) -> u32 {
        ((ppn_addr / PAGE_SIZE) << 10) | pte::V
    }

    /// 建立 vaddr 0x0040_3xxx -> paddr 0x8000_5xxx 的两级映射
    fn setup(leaf_flags: u32) -> VmMemory {
        let mut mem = VmMemory::new(64 * 1024, 0x8000_0000);
        let vaddr: u32 = 0x0040_3000;
        let vpn1 = vaddr >> 22;
        let vpn0 = (vaddr >> 12) & 0x3FF;
        mem.store32(ROOT + vpn1 * 4, table_entry(L0)).unwrap();
        mem.store32(L0 + vpn0 * 4, ((0x8000_5000 / PAGE_SIZE) << 10) | leaf_flags).unwrap();
        mem
    }

    #[test]
    fn test_bare_mode_is_identity() {
        let mem = VmMemory::new(1024, 0);
        let r = translate(&mem, 0, 0x1234, AccessType::Load);
        assert_eq!(r, Ok(0x1234));
        let r = translate(&mem, SATP_PPN_MASK, 0x1234, AccessType::Store);
        assert_eq!(r, Ok(0x1234));
    }

    #[test]
    fn test_two_level_walk() {
        let mem = setup(pte::V | pte::R | pte::W);
        let r = translate(&mem, satp_for(ROOT), 0x0040_3ABC, AccessType::Load);
        assert_eq!(r, Ok(0x8000_5ABC));
        let r = translate(&mem, satp_for(ROOT), 0x0040_3004, AccessType::Store);
        assert_eq!(r, Ok(0x8000_5004));
    }

    #[test]
    fn test_permission_fault() {
        let mem = setup(pte::V | pte::R);
        let err = translate(&mem, satp_for(ROOT), 0x0040_3000, AccessType::Store).unwrap_err();
        assert_eq!(err.cause, TrapCause::StorePageFault);
        assert_eq!(err.tval, Some(0x0040_3000));

        let err = translate(&mem, satp_for(ROOT), 0x0040_3000, AccessType::Fetch).unwrap_err();
        assert_eq!(err.cause, TrapCause::InstructionPageFault);
    }

    #[test]
    fn test_invalid_leaf() {
        let mem = setup(pte::R);
        let err = translate(&mem, satp_for(ROOT), 0x0040_3000, AccessType::Load).unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadPageFault);
    }

    #[test]
    fn test_write_without_read_is_reserved() {
        let mem = setup(pte::V | pte::W);
        let err = translate(&mem, satp_for(ROOT), 0x0040_3000, AccessType::Store).unwrap_err();
        assert_eq!(err.cause, TrapCause::StorePageFault);
    }

    #[test]
    fn test_unmapped_level1() {
        let mem = setup(pte::V | pte::R);
        let err = translate(&mem, satp_for(ROOT), 0x0080_0000, AccessType::Load).unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadPageFault);
    }

    #[test]
    fn test_superpage() {
        let mut mem = VmMemory::new(64 * 1024, 0x8000_0000);
        // vpn1 = 1 -> 物理 4 MiB 页 0x8000_0000
        let leaf = ((0x8000_0000u32 >> 12) << 10) | pte::V | pte::R | pte::X;
        mem.store32(ROOT + 4, leaf).unwrap();
        let r = translate(&mem, satp_for(ROOT), 0x0040_0010, AccessType::Fetch);
        assert_eq!(r, Ok(0x8000_0010));

        // PPN[0] 非零的超级页未对齐
        mem.store32(ROOT + 8, leaf | (1 << 10)).unwrap();
        let err = translate(&mem, satp_for(ROOT), 0x0080_0000, AccessType::Load).unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadPageFault);
    }

    #[test]
    fn test_page_table_outside_memory() {
        let mem = VmMemory::new(1024, 0x8000_0000);
        let err = translate(&mem, satp_for(0x9000_0000), 0x1000, AccessType::Load).unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadPageFault);
        assert_eq!(err.tval, Some(0x1000));

        let err = translate(&mem, satp_for(0x9000_0000), 0x1000, AccessType::Fetch).unwrap_err();
        assert_eq!(err.cause, TrapCause::InstructionPageFault);
    }
}
