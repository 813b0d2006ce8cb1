//! allude_vm: RV32IMAFDCV 单 hart 虚拟机
//!
//! 以指令预算驱动的 RISC-V 解释器，支持 M/S/U 特权级、Sv32 分页、
//! F/D 软浮点和 VLEN=128 的向量扩展。客户程序通过 ECALL 与宿主交互。
//!
//! # 模块结构
//!
//! - `isa`: 指令模型、mask/match 解码表、C 扩展展开、ISA 配置
//! - `cpu`: CPU 核心、CSR、trap、Sv32 与执行单元
//! - `memory`: 内存抽象层（主 RAM + 扩展内存窗口）
//! - `vm`: 虚拟机状态、运行循环与系统调用 ABI
//! - `sim_env`: 仿真环境（配置、ELF 加载、宿主循环）

pub mod cpu;
pub mod isa;
pub mod memory;
pub mod sim_env;
pub mod vm;
