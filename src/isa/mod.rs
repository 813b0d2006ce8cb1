//! RISC-V ISA 抽象与解码框架
//!
//! - `RvInstr`: 指令的语义表示
//! - `InstrDef`: 统一的指令定义，同时用于解码和冲突检测
//! - `InstrDecoder` / `DecoderRegistry`: 按 opcode 分桶的插件式解码
//! - `rvc`: 16-bit 压缩指令展开
//! - `IsaConfig` / `IsaExtensions`: 扩展选择、冲突检测与 misa

mod config;
mod decoder;
mod fields;
mod instr;
mod instr_def;
mod priv_instr;
mod rv32a;
mod rv32d;
mod rv32f;
mod rv32i;
mod rv32m;
pub mod rvc;
mod rvv;
mod zicsr;

pub use config::{ConflictInfo, InstrSignature, IsaConfig, IsaExtension, IsaExtensions};
pub use decoder::{DecoderRegistry, InstrDecoder, IsaError};
pub use fields::*;
pub use instr::*;
pub use instr_def::{InstrDef, TableDrivenDecoder};
pub use priv_instr::{PRIV_DECODER, PRIV_INSTRS, MRET_ENCODING, SRET_ENCODING, WFI_ENCODING};
pub use rv32a::{RV32A_DECODER, RV32A_INSTRS};
pub use rv32d::{RV32D_DECODER, RV32D_INSTRS};
pub use rv32f::{RV32F_DECODER, RV32F_INSTRS};
pub use rv32i::{RV32I_DECODER, RV32I_INSTRS, RV32I_OPCODES};
pub use rv32m::{RV32M_DECODER, RV32M_INSTRS};
pub use rvc::RvcConfig;
pub use rvv::{RVV_DECODER, RVV_INSTRS};
pub use zicsr::{ZICSR_DECODER, ZICSR_INSTRS};
