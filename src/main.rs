//! allude_vm 命令行入口
//!
//! 加载 RISC-V ELF（或原始二进制），在虚拟机中运行直到 Halt 系统调用、
//! 出错或达到指令上限。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};

use allude_vm::sim_env::{RunOutcome, SimConfig, SimEnv, SimError};

#[derive(Parser, Debug)]
#[command(version, about = "RV32IMAFDCV virtual machine", long_about = None)]
struct Args {
    /// 要执行的 ELF 文件
    program: PathBuf,

    /// 按原始二进制加载到此地址，而不是解析 ELF
    #[arg(long, value_parser = parse_u32)]
    raw: Option<u32>,

    /// ISA 字符串，例如 rv32imafdcv、rv32gc
    #[arg(long, default_value = "rv32imafdcv")]
    isa: String,

    /// RAM 大小（字节），支持 0x 前缀与 K/M 后缀
    #[arg(long, default_value = "64K", value_parser = parse_size)]
    mem_size: usize,

    /// 扩展内存大小，0 表示不挂载
    #[arg(long, default_value = "0", value_parser = parse_size)]
    extram_size: usize,

    /// 最大执行指令数，0 表示无限制
    #[arg(long, default_value_t = 0)]
    max_instructions: u64,

    /// 每次 run 的指令预算
    #[arg(long, default_value_t = 10_000)]
    meter: u32,

    /// 提高日志级别（-v info，-vv debug，-vvv trace）
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 结束时打印寄存器状态
    #[arg(long)]
    dump: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (digits, scale) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 1024),
        Some((i, 'm' | 'M')) => (&s[..i], 1024 * 1024),
        _ => (s, 1),
    };
    let value = parse_u32(digits)? as usize;
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("size '{s}' overflows"))
}

fn build_config(args: &Args) -> Result<SimConfig, SimError> {
    let mut config = SimConfig::new()
        .with_isa(&args.isa)?
        .with_memory_size(args.mem_size)
        .with_extram_size(args.extram_size)
        .with_max_instructions(args.max_instructions)
        .with_meter(args.meter)
        .with_verbose(args.verbose > 0);
    config = match args.raw {
        Some(addr) => config.with_bin_path(&args.program, addr),
        None => config.with_elf_path(&args.program),
    };
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut env = match build_config(&args).and_then(SimEnv::from_config) {
        Ok(env) => env,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!("running {} with {}", args.program.display(), env.config().isa);
    let (executed, outcome) = env.run_until_halt();

    if args.dump {
        env.dump();
    }

    println!("executed {executed} instructions: {outcome:?}");
    match outcome {
        RunOutcome::Halted { code } => ExitCode::from(code.min(255) as u8),
        RunOutcome::Error(_) | RunOutcome::Limit => ExitCode::FAILURE,
    }
}
