//! 指令定义与表驱动解码器
//!
//! 一处定义，两处使用：
//! - 解码：mask/match 命中后调用 decode 函数
//! - 冲突检测：比较两条定义的 mask/match 是否可能同时命中

use super::decoder::InstrDecoder;
use super::instr::{DecodedInstr, RvInstr};

#[derive(Clone)]
pub struct InstrDef {
    /// 指令名称（调试与冲突报告用）
    pub name: &'static str,
    /// 需要检查的位
    pub mask: u32,
    /// 这些位应有的值
    pub match_val: u32,
    /// 从原始编码构造 RvInstr
    pub decode: fn(u32) -> RvInstr,
}

impl InstrDef {
    pub const fn new(name: &'static str, mask: u32, match_val: u32, decode: fn(u32) -> RvInstr) -> Self {
        Self {
            name,
            mask,
            match_val,
            decode,
        }
    }

    #[inline]
    pub fn matches(&self, raw: u32) -> bool {
        (raw & self.mask) == self.match_val
    }

    #[inline]
    pub fn decode_instr(&self, raw: u32) -> DecodedInstr {
        DecodedInstr {
            raw,
            len: 4,
            instr: (self.decode)(raw),
        }
    }

    /// 存在某个指令字同时匹配两者即视为冲突
    pub fn conflicts_with(&self, other: &InstrDef) -> bool {
        let common_mask = self.mask & other.mask;
        (self.match_val & common_mask) == (other.match_val & common_mask)
    }
}

impl std::fmt::Debug for InstrDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrDef")
            .field("name", &self.name)
            .field("mask", &format_args!("0x{:08X}", self.mask))
            .field("match_val", &format_args!("0x{:08X}", self.match_val))
            .finish()
    }
}

// ========== 掩码 ==========

/// opcode + funct3 + funct7
pub const R_TYPE_MASK: u32 = 0xFE00_707F;
/// opcode + funct3
pub const I_TYPE_MASK: u32 = 0x0000_707F;
/// 只检查 opcode
pub const U_TYPE_MASK: u32 = 0x0000_007F;
/// opcode + funct3 + funct6（移位立即数）
pub const SHIFT_IMM_MASK: u32 = 0xFC00_707F;
/// opcode + funct7 + rs2（如 FSQRT / FCVT / FMV）
pub const R_RS2_MASK: u32 = 0xFFF0_707F;
/// opcode + funct7 + rs2，不检查 funct3（携带 rm 的单操作数浮点指令）
pub const R_RS2_RM_MASK: u32 = 0xFFF0_007F;
/// opcode + funct7，不检查 funct3（携带 rm 的浮点运算）
pub const R_RM_MASK: u32 = 0xFE00_007F;
/// opcode + fmt（R4-type 融合乘加）
pub const R4_TYPE_MASK: u32 = 0x0600_007F;
/// 整个指令字
pub const EXACT_MASK: u32 = 0xFFFF_FFFF;

#[inline]
pub const fn r_match(funct7: u32, funct3: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (funct3 << 12) | opcode
}

#[inline]
pub const fn i_match(funct3: u32, opcode: u32) -> u32 {
    (funct3 << 12) | opcode
}

#[inline]
pub const fn shift_match(funct6: u32, funct3: u32, opcode: u32) -> u32 {
    (funct6 << 26) | (funct3 << 12) | opcode
}

#[inline]
pub const fn rs2_match(funct7: u32, rs2: u32, funct3: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (funct3 << 12) | opcode
}

#[inline]
pub const fn r4_match(fmt: u32, opcode: u32) -> u32 {
    (fmt << 25) | opcode
}

// ========== 表驱动解码器 ==========

#[derive(Clone, Copy)]
pub struct TableDrivenDecoder {
    name: &'static str,
    instrs: &'static [InstrDef],
    /// 处理的 opcode，None 表示全部
    opcodes: Option<&'static [u32]>,
    /// 是否允许与其他解码器共享 opcode（如 RV32I/RV32M 共用 OP）
    allow_overlap: bool,
}

impl TableDrivenDecoder {
    pub const fn new(
        name: &'static str,
        instrs: &'static [InstrDef],
        opcodes: Option<&'static [u32]>,
        allow_overlap: bool,
    ) -> Self {
        Self {
            name,
            instrs,
            opcodes,
            allow_overlap,
        }
    }

    pub fn instrs(&self) -> &'static [InstrDef] {
        self.instrs
    }
}

impl InstrDecoder for TableDrivenDecoder {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, raw: u32) -> Option<DecodedInstr> {
        self.instrs
            .iter()
            .find(|def| def.matches(raw))
            .map(|def| def.decode_instr(raw))
    }

    fn handled_opcodes(&self) -> Option<&[u32]> {
        self.opcodes
    }

    fn allow_opcode_overlap(&self) -> bool {
        self.allow_overlap
    }
}
