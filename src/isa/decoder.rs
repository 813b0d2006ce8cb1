//! 解码器框架
//!
//! 32-bit 指令按 opcode 分桶交给已注册的解码器；16-bit 指令交给 C 扩展展开器。

use std::sync::Arc;

use thiserror::Error;

use crate::isa::rvc::{self, RvcConfig};
use crate::isa::{ConflictInfo, DecodedInstr};

/// 指令解码器 trait
///
/// 每个扩展实现一个解码器，注册到 `DecoderRegistry`
pub trait InstrDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// 能解码返回 `Some`，否则交给同一 opcode 上的下一个解码器
    fn decode(&self, raw: u32) -> Option<DecodedInstr>;

    /// 此解码器处理的 opcode 列表，None 表示全部
    fn handled_opcodes(&self) -> Option<&[u32]> {
        None
    }

    /// 是否允许与其他解码器在同一 opcode 上共存
    fn allow_opcode_overlap(&self) -> bool {
        false
    }
}

/// ISA 配置与解码器注册错误
#[derive(Debug, Error)]
pub enum IsaError {
    #[error("opcode 0x{opcode:02X} already handled; rejecting decoder {decoder}")]
    OpcodeTaken { opcode: u32, decoder: String },

    #[error("wildcard decoder {0} cannot register due to overlap")]
    WildcardOverlap(String),

    #[error("{} instruction encoding conflict(s)", .0.len())]
    Conflicts(Vec<ConflictInfo>),

    #[error("unknown ISA extension '{0}'")]
    UnknownExtension(char),

    #[error("ISA string must start with rv32: {0}")]
    BadIsaString(String),
}

/// 解码器注册表
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn InstrDecoder>>,
    /// 按 opcode 分桶的解码器索引
    opcode_map: [Vec<usize>; 128],
    /// None 表示未启用 C 扩展，16-bit 编码一律非法
    rvc: Option<RvcConfig>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
            opcode_map: std::array::from_fn(|_| Vec::new()),
            rvc: None,
        }
    }

    /// 注册一个解码器；若声明的 opcode 已被独占则返回错误
    pub fn register(&mut self, decoder: Arc<dyn InstrDecoder>) -> Result<(), IsaError> {
        let idx = self.decoders.len();

        // 先做冲突检测，避免错误时污染注册表
        if let Some(opcodes) = decoder.handled_opcodes() {
            for &op in opcodes {
                let Some(bucket) = self.opcode_map.get(op as usize) else {
                    continue;
                };
                if bucket.is_empty() {
                    continue;
                }
                let existing_conflict = bucket.iter().any(|&i| !self.decoders[i].allow_opcode_overlap());
                if existing_conflict || !decoder.allow_opcode_overlap() {
                    return Err(IsaError::OpcodeTaken {
                        opcode: op,
                        decoder: decoder.name().to_string(),
                    });
                }
            }
        } else {
            let has_blocking = self
                .opcode_map
                .iter()
                .any(|bucket| bucket.iter().any(|&i| !self.decoders[i].allow_opcode_overlap()));
            if has_blocking || !decoder.allow_opcode_overlap() {
                return Err(IsaError::WildcardOverlap(decoder.name().to_string()));
            }
        }

        self.decoders.push(decoder);

        if let Some(opcodes) = self.decoders[idx].handled_opcodes() {
            for &op in opcodes {
                if let Some(bucket) = self.opcode_map.get_mut(op as usize) {
                    bucket.push(idx);
                }
            }
        } else {
            for bucket in &mut self.opcode_map {
                bucket.push(idx);
            }
        }

        Ok(())
    }

    /// 启用 C 扩展
    pub fn enable_compressed(&mut self, cfg: RvcConfig) {
        self.rvc = Some(cfg);
    }

    pub fn compressed(&self) -> Option<RvcConfig> {
        self.rvc
    }

    /// 解码 32-bit 指令，仅尝试该 opcode 桶中的解码器
    pub fn decode(&self, raw: u32) -> DecodedInstr {
        let opcode = (raw & 0x7F) as usize;
        self.opcode_map[opcode]
            .iter()
            .find_map(|&idx| self.decoders[idx].decode(raw))
            .unwrap_or_else(|| DecodedInstr::illegal(raw, 4))
    }

    /// 解码 16-bit 指令
    pub fn decode16(&self, half: u16) -> DecodedInstr {
        match self.rvc {
            Some(cfg) => rvc::decode16(half, cfg),
            None => DecodedInstr::illegal(half as u32, 2),
        }
    }

    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }

    pub fn decoder_names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoders", &self.decoder_names())
            .field("rvc", &self.rvc)
            .finish()
    }
}
