//! ISA 配置与冲突检测
//!
//! `IsaExtensions` 描述启用了哪些扩展（可由 "rv32imafdcv" 之类的字符串解析），
//! `IsaConfig` 收集各扩展的指令签名，检测编码冲突后构建 `DecoderRegistry`。

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;

use super::decoder::{DecoderRegistry, InstrDecoder, IsaError};
use super::instr_def::{InstrDef, TableDrivenDecoder};
use super::priv_instr::PRIV_DECODER;
use super::rv32a::RV32A_DECODER;
use super::rv32d::RV32D_DECODER;
use super::rv32f::RV32F_DECODER;
use super::rv32i::RV32I_DECODER;
use super::rv32m::RV32M_DECODER;
use super::rvc::RvcConfig;
use super::rvv::RVV_DECODER;
use super::zicsr::ZICSR_DECODER;
use crate::cpu::csr_def::{misa_bit, MISA_MXL_32};

/// 支持的 ISA 扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IsaExtension {
    /// 基础整数指令集（必选）
    I,
    /// 乘除法
    M,
    /// 原子操作
    A,
    /// 单精度浮点
    F,
    /// 双精度浮点
    D,
    /// 压缩指令
    C,
    /// 向量
    V,
    /// CSR 操作指令
    Zicsr,
    /// MRET / SRET / WFI / SFENCE.VMA
    Priv,
}

impl std::fmt::Display for IsaExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsaExtension::I => write!(f, "I"),
            IsaExtension::M => write!(f, "M"),
            IsaExtension::A => write!(f, "A"),
            IsaExtension::F => write!(f, "F"),
            IsaExtension::D => write!(f, "D"),
            IsaExtension::C => write!(f, "C"),
            IsaExtension::V => write!(f, "V"),
            IsaExtension::Zicsr => write!(f, "_Zicsr"),
            IsaExtension::Priv => write!(f, "_Priv"),
        }
    }
}

impl IsaExtension {
    /// 该扩展的 32-bit 解码器；C 扩展没有表驱动解码器
    fn decoder(self) -> Option<&'static TableDrivenDecoder> {
        let decoder = match self {
            IsaExtension::I => &RV32I_DECODER,
            IsaExtension::M => &RV32M_DECODER,
            IsaExtension::A => &RV32A_DECODER,
            IsaExtension::F => &RV32F_DECODER,
            IsaExtension::D => &RV32D_DECODER,
            IsaExtension::V => &RVV_DECODER,
            IsaExtension::Zicsr => &ZICSR_DECODER,
            IsaExtension::Priv => &PRIV_DECODER,
            IsaExtension::C => return None,
        };
        Some(decoder)
    }
}

/// 指令模式描述（用于冲突检测）
#[derive(Debug, Clone)]
pub struct InstrSignature {
    pub extension: IsaExtension,
    pub name: &'static str,
    pub mask: u32,
    pub match_val: u32,
}

impl InstrSignature {
    pub const fn new(extension: IsaExtension, name: &'static str, mask: u32, match_val: u32) -> Self {
        Self {
            extension,
            name,
            mask,
            match_val,
        }
    }

    pub fn from_def(def: &InstrDef, extension: IsaExtension) -> Self {
        Self {
            extension,
            name: def.name,
            mask: def.mask,
            match_val: def.match_val,
        }
    }

    /// 存在某个指令字同时匹配两者即冲突
    pub fn conflicts_with(&self, other: &InstrSignature) -> bool {
        let common_mask = self.mask & other.mask;
        (self.match_val & common_mask) == (other.match_val & common_mask)
    }
}

/// 冲突信息
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub instr1: InstrSignature,
    pub instr2: InstrSignature,
    /// 同时命中两者的示例编码
    pub example_raw: u32,
}

impl std::fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "冲突: {}:{} 与 {}:{} (示例: 0x{:08X})",
            self.instr1.extension, self.instr1.name, self.instr2.extension, self.instr2.name, self.example_raw
        )
    }
}

/// ISA 配置构建器
///
/// ```
/// use allude_vm::isa::IsaConfig;
///
/// let registry = IsaConfig::new()
///     .with_m_extension()
///     .with_zicsr_extension()
///     .build()
///     .expect("无冲突");
/// assert_eq!(registry.decoder_count(), 3);
/// ```
pub struct IsaConfig {
    extensions: HashSet<IsaExtension>,
    signatures: Vec<InstrSignature>,
}

impl IsaConfig {
    /// 只含 RV32I
    pub fn new() -> Self {
        let mut config = Self {
            extensions: HashSet::new(),
            signatures: Vec::new(),
        };
        config.enable(IsaExtension::I);
        config
    }

    fn enable(&mut self, ext: IsaExtension) {
        if !self.extensions.insert(ext) {
            return;
        }
        if let Some(decoder) = ext.decoder() {
            self.signatures
                .extend(decoder.instrs().iter().map(|def| InstrSignature::from_def(def, ext)));
        }
    }

    pub fn with_extension(mut self, ext: IsaExtension) -> Self {
        self.enable(ext);
        self
    }

    pub fn with_m_extension(self) -> Self {
        self.with_extension(IsaExtension::M)
    }

    pub fn with_a_extension(self) -> Self {
        self.with_extension(IsaExtension::A)
    }

    pub fn with_f_extension(self) -> Self {
        self.with_extension(IsaExtension::F)
    }

    /// D 依赖 F，一并启用
    pub fn with_d_extension(self) -> Self {
        self.with_extension(IsaExtension::F).with_extension(IsaExtension::D)
    }

    pub fn with_c_extension(self) -> Self {
        self.with_extension(IsaExtension::C)
    }

    pub fn with_v_extension(self) -> Self {
        self.with_extension(IsaExtension::V)
    }

    pub fn with_zicsr_extension(self) -> Self {
        self.with_extension(IsaExtension::Zicsr)
    }

    pub fn with_priv_extension(self) -> Self {
        self.with_extension(IsaExtension::Priv)
    }

    /// 检测不同扩展之间的指令冲突（扩展内部的表视为正确）
    pub fn detect_conflicts(&self) -> Vec<ConflictInfo> {
        let mut conflicts = Vec::new();
        for (i, sig1) in self.signatures.iter().enumerate() {
            for sig2 in self.signatures.iter().skip(i + 1) {
                if sig1.extension == sig2.extension {
                    continue;
                }
                if sig1.conflicts_with(sig2) {
                    let example = (sig1.match_val & sig1.mask) | (sig2.match_val & sig2.mask);
                    conflicts.push(ConflictInfo {
                        instr1: sig1.clone(),
                        instr2: sig2.clone(),
                        example_raw: example,
                    });
                }
            }
        }
        conflicts
    }

    pub fn is_valid(&self) -> bool {
        self.detect_conflicts().is_empty()
    }

    pub fn has(&self, ext: IsaExtension) -> bool {
        self.extensions.contains(&ext)
    }

    /// ISA 字符串（如 "RV32IMAFDCV"）
    pub fn isa_string(&self) -> String {
        let mut s = String::from("RV32");
        let order = [
            IsaExtension::I,
            IsaExtension::M,
            IsaExtension::A,
            IsaExtension::F,
            IsaExtension::D,
            IsaExtension::C,
            IsaExtension::V,
        ];
        for ext in order.iter().filter(|e| self.has(**e)) {
            s.push_str(&ext.to_string());
        }
        s
    }

    /// 构建解码器注册表；存在冲突时返回错误
    pub fn build(self) -> Result<DecoderRegistry, IsaError> {
        let conflicts = self.detect_conflicts();
        if !conflicts.is_empty() {
            return Err(IsaError::Conflicts(conflicts));
        }

        let mut enabled: Vec<IsaExtension> = self.extensions.iter().copied().collect();
        enabled.sort_unstable();

        let mut registry = DecoderRegistry::new();
        for ext in &enabled {
            if let Some(decoder) = ext.decoder() {
                registry.register(Arc::new(*decoder) as Arc<dyn InstrDecoder>)?;
            }
        }
        if self.has(IsaExtension::C) {
            registry.enable_compressed(RvcConfig {
                float: self.has(IsaExtension::F),
                double: self.has(IsaExtension::D),
            });
        }

        debug!("isa {} decoders {:?}", self.isa_string(), registry.decoder_names());
        Ok(registry)
    }

    pub fn enabled_extensions(&self) -> &HashSet<IsaExtension> {
        &self.extensions
    }

    /// 配置摘要
    pub fn summary(&self) -> String {
        let mut s = format!("ISA: {}\n", self.isa_string());
        s.push_str(&format!("指令签名数: {}\n", self.signatures.len()));
        let conflicts = self.detect_conflicts();
        if conflicts.is_empty() {
            s.push_str("状态: 无冲突\n");
        } else {
            s.push_str(&format!("状态: {} 个冲突\n", conflicts.len()));
            for c in &conflicts {
                s.push_str(&format!("  - {}\n", c));
            }
        }
        s
    }
}

impl Default for IsaConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 扩展选择
// ============================================================================

/// 启用的标准扩展
///
/// Zicsr 与特权指令总是启用，trap 处理依赖它们
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaExtensions {
    pub m: bool,
    pub a: bool,
    pub f: bool,
    pub d: bool,
    pub c: bool,
    pub v: bool,
}

impl Default for IsaExtensions {
    /// rv32imafdcv
    fn default() -> Self {
        Self {
            m: true,
            a: true,
            f: true,
            d: true,
            c: true,
            v: true,
        }
    }
}

impl IsaExtensions {
    /// 只有 RV32I
    pub fn base() -> Self {
        Self {
            m: false,
            a: false,
            f: false,
            d: false,
            c: false,
            v: false,
        }
    }

    /// 解析 "rv32imafdcv"、"rv32gc"、"imf"、"rv32ima_zicsr" 等
    pub fn parse(s: &str) -> Result<Self, IsaError> {
        let lower = s.trim().to_ascii_lowercase();
        let body = match lower.strip_prefix("rv") {
            Some(rest) => rest.strip_prefix("32").ok_or_else(|| IsaError::BadIsaString(s.to_string()))?,
            None => lower.as_str(),
        };

        let mut parts = body.split('_');
        let letters = parts.next().unwrap_or("");
        let mut ext = Self::base();
        for ch in letters.chars() {
            match ch {
                'i' => {}
                'g' => {
                    ext.m = true;
                    ext.a = true;
                    ext.f = true;
                    ext.d = true;
                }
                'm' => ext.m = true,
                'a' => ext.a = true,
                'f' => ext.f = true,
                'd' => ext.d = true,
                'c' => ext.c = true,
                'v' => ext.v = true,
                other => return Err(IsaError::UnknownExtension(other)),
            }
        }
        for name in parts.filter(|p| !p.is_empty()) {
            match name {
                "zicsr" | "zifencei" => {}
                other => return Err(IsaError::UnknownExtension(other.chars().next().unwrap_or('_'))),
            }
        }
        // D 依赖 F
        if ext.d {
            ext.f = true;
        }
        Ok(ext)
    }

    /// misa：MXL = 1 加上扩展字母位
    pub fn misa(&self) -> u32 {
        let mut misa = MISA_MXL_32 | misa_bit(b'i');
        for (enabled, letter) in [
            (self.m, b'm'),
            (self.a, b'a'),
            (self.f, b'f'),
            (self.d, b'd'),
            (self.c, b'c'),
            (self.v, b'v'),
        ] {
            if enabled {
                misa |= misa_bit(letter);
            }
        }
        misa
    }

    pub fn to_config(&self) -> IsaConfig {
        let mut config = IsaConfig::new().with_zicsr_extension().with_priv_extension();
        for (enabled, ext) in [
            (self.m, IsaExtension::M),
            (self.a, IsaExtension::A),
            (self.f, IsaExtension::F),
            (self.d, IsaExtension::D),
            (self.c, IsaExtension::C),
            (self.v, IsaExtension::V),
        ] {
            if enabled {
                config = config.with_extension(ext);
            }
        }
        config
    }

    pub fn build_registry(&self) -> Result<DecoderRegistry, IsaError> {
        self.to_config().build()
    }
}

impl FromStr for IsaExtensions {
    type Err = IsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for IsaExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_config().isa_string().to_ascii_lowercase())
    }
}
