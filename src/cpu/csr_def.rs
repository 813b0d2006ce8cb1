//! CSR 地址常量与声明表
//!
//! 每组扩展提供一张 `CsrEntry` 静态表，`CsrBank` 根据 misa 选择需要注册的表。
//! 地址常量同时供执行单元与 trap 处理直接引用。

use super::status::CsrEntry;

// ============================================================================
// 计数器
// ============================================================================

pub const CSR_CYCLE: u16 = 0xC00;
pub const CSR_INSTRET: u16 = 0xC02;
pub const CSR_CYCLEH: u16 = 0xC80;
pub const CSR_INSTRETH: u16 = 0xC82;

pub const CSR_MCYCLE: u16 = 0xB00;
pub const CSR_MINSTRET: u16 = 0xB02;
pub const CSR_MCYCLEH: u16 = 0xB80;
pub const CSR_MINSTRETH: u16 = 0xB82;
pub const CSR_MCOUNTINHIBIT: u16 = 0x320;

/// mcountinhibit 中有意义的位：CY(0) / TM(1) / IR(2)
pub const MCOUNTINHIBIT_MASK: u32 = 0x7;

/// 用户态只读计数器是机器态计数器的影子
pub const COUNTER_CSRS: &[CsrEntry] = &[
    CsrEntry::new("mcycle", CSR_MCYCLE, 0),
    CsrEntry::new("minstret", CSR_MINSTRET, 0),
    CsrEntry::new("mcycleh", CSR_MCYCLEH, 0),
    CsrEntry::new("minstreth", CSR_MINSTRETH, 0),
    CsrEntry::masked("mcountinhibit", CSR_MCOUNTINHIBIT, MCOUNTINHIBIT_MASK),
    CsrEntry::view("cycle", CSR_CYCLE),
    CsrEntry::view("instret", CSR_INSTRET),
    CsrEntry::view("cycleh", CSR_CYCLEH),
    CsrEntry::view("instreth", CSR_INSTRETH),
];

// ============================================================================
// F/D 扩展
// ============================================================================

pub const CSR_FFLAGS: u16 = 0x001;
pub const CSR_FRM: u16 = 0x002;
pub const CSR_FCSR: u16 = 0x003;

/// fflags 与 frm 只是 fcsr 的位段视图
pub const F_CSRS: &[CsrEntry] = &[
    CsrEntry::view("fflags", CSR_FFLAGS),
    CsrEntry::view("frm", CSR_FRM),
    CsrEntry::masked("fcsr", CSR_FCSR, 0xFF),
];

// ============================================================================
// V 扩展
// ============================================================================

pub const CSR_VSTART: u16 = 0x008;
pub const CSR_VL: u16 = 0xC20;
pub const CSR_VTYPE: u16 = 0xC21;
pub const CSR_VLENB: u16 = 0xC22;

/// VLEN = 128 bit
pub const VLENB: u32 = 16;

pub const V_CSRS: &[CsrEntry] = &[
    CsrEntry::new("vstart", CSR_VSTART, 0),
    // vl / vtype 只能由 vset* 修改
    CsrEntry::read_only("vl", CSR_VL, 0),
    CsrEntry::read_only("vtype", CSR_VTYPE, 1 << 31),
    CsrEntry::read_only("vlenb", CSR_VLENB, VLENB),
];

// ============================================================================
// Machine 级
// ============================================================================

pub const CSR_MVENDORID: u16 = 0xF11;
pub const CSR_MARCHID: u16 = 0xF12;
pub const CSR_MIMPID: u16 = 0xF13;
pub const CSR_MHARTID: u16 = 0xF14;

pub const CSR_MSTATUS: u16 = 0x300;
pub const CSR_MISA: u16 = 0x301;
pub const CSR_MEDELEG: u16 = 0x302;
pub const CSR_MIDELEG: u16 = 0x303;
pub const CSR_MIE: u16 = 0x304;
pub const CSR_MTVEC: u16 = 0x305;
pub const CSR_MCOUNTEREN: u16 = 0x306;

pub const CSR_MSCRATCH: u16 = 0x340;
pub const CSR_MEPC: u16 = 0x341;
pub const CSR_MCAUSE: u16 = 0x342;
pub const CSR_MTVAL: u16 = 0x343;
pub const CSR_MIP: u16 = 0x344;

pub const CSR_PMPCFG0: u16 = 0x3A0;
pub const CSR_PMPADDR0: u16 = 0x3B0;

pub const M_CSRS: &[CsrEntry] = &[
    CsrEntry::read_only("mvendorid", CSR_MVENDORID, 0),
    CsrEntry::read_only("marchid", CSR_MARCHID, 0),
    CsrEntry::read_only("mimpid", CSR_MIMPID, 0),
    CsrEntry::read_only("mhartid", CSR_MHARTID, 0),
    CsrEntry::new("mstatus", CSR_MSTATUS, 0),
    // 复位值由 CsrBank::new 按启用的扩展填入
    CsrEntry::read_only("misa", CSR_MISA, 0),
    CsrEntry::new("medeleg", CSR_MEDELEG, 0),
    CsrEntry::new("mideleg", CSR_MIDELEG, 0),
    CsrEntry::new("mie", CSR_MIE, 0),
    CsrEntry::new("mtvec", CSR_MTVEC, 0),
    CsrEntry::new("mcounteren", CSR_MCOUNTEREN, 0),
    CsrEntry::new("mscratch", CSR_MSCRATCH, 0),
    CsrEntry::new("mepc", CSR_MEPC, 0),
    CsrEntry::new("mcause", CSR_MCAUSE, 0),
    CsrEntry::new("mtval", CSR_MTVAL, 0),
    CsrEntry::new("mip", CSR_MIP, 0),
];

/// PMP 只是占位：读为 0，写入被接受但不生效
pub fn is_pmp_csr(addr: u16) -> bool {
    (CSR_PMPCFG0..CSR_PMPCFG0 + 4).contains(&addr) || (CSR_PMPADDR0..CSR_PMPADDR0 + 16).contains(&addr)
}

// ============================================================================
// Supervisor 级
// ============================================================================

pub const CSR_SSTATUS: u16 = 0x100;
pub const CSR_SIE: u16 = 0x104;
pub const CSR_STVEC: u16 = 0x105;
pub const CSR_SCOUNTEREN: u16 = 0x106;
pub const CSR_SSCRATCH: u16 = 0x140;
pub const CSR_SEPC: u16 = 0x141;
pub const CSR_SCAUSE: u16 = 0x142;
pub const CSR_STVAL: u16 = 0x143;
pub const CSR_SIP: u16 = 0x144;
pub const CSR_SATP: u16 = 0x180;

pub const S_CSRS: &[CsrEntry] = &[
    CsrEntry::view("sstatus", CSR_SSTATUS),
    CsrEntry::new("sie", CSR_SIE, 0),
    CsrEntry::new("stvec", CSR_STVEC, 0),
    CsrEntry::new("scounteren", CSR_SCOUNTEREN, 0),
    CsrEntry::new("sscratch", CSR_SSCRATCH, 0),
    CsrEntry::new("sepc", CSR_SEPC, 0),
    CsrEntry::new("scause", CSR_SCAUSE, 0),
    CsrEntry::new("stval", CSR_STVAL, 0),
    CsrEntry::new("sip", CSR_SIP, 0),
    CsrEntry::new("satp", CSR_SATP, 0),
];

/// satp.MODE（bit 31）为 1 时启用 Sv32
pub const SATP_MODE_SV32: u32 = 1 << 31;
pub const SATP_PPN_MASK: u32 = 0x003F_FFFF;

// ============================================================================
// misa
// ============================================================================

/// MXL = 1（RV32）
pub const MISA_MXL_32: u32 = 1 << 30;

/// 扩展字母在 misa 中的位
#[inline]
pub const fn misa_bit(letter: u8) -> u32 {
    1 << (letter - b'a')
}

/// 查找 CSR 的声明项（按名字打印时使用）
pub fn lookup(addr: u16) -> Option<&'static CsrEntry> {
    [COUNTER_CSRS, F_CSRS, V_CSRS, M_CSRS, S_CSRS]
        .into_iter()
        .flatten()
        .find(|e| e.addr == addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misa_bits() {
        assert_eq!(misa_bit(b'a'), 0x1);
        assert_eq!(misa_bit(b'i'), 0x100);
        assert_eq!(misa_bit(b'v'), 0x20_0000);
    }

    #[test]
    fn test_lookup_and_pmp() {
        assert_eq!(lookup(CSR_MSTATUS).map(|e| e.name), Some("mstatus"));
        assert_eq!(lookup(CSR_VLENB).map(|e| e.reset), Some(16));
        assert!(lookup(0x7C0).is_none());
        assert!(is_pmp_csr(0x3A3));
        assert!(is_pmp_csr(0x3BF));
        assert!(!is_pmp_csr(0x3A4));
    }

    #[test]
    fn test_tables_have_unique_addresses() {
        let mut seen = std::collections::HashSet::new();
        for e in [COUNTER_CSRS, F_CSRS, V_CSRS, M_CSRS, S_CSRS].into_iter().flatten() {
            assert!(seen.insert(e.addr), "duplicate csr {}", e.name);
        }
    }
}
