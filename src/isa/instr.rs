//! 指令的语义表示
//!
//! 解码阶段一次性完成字段提取与符号扩展，执行单元只需匹配 `RvInstr`。
//! 同一格式、只差运算种类的指令合并为一个变体，运算种类由子枚举区分。

/// 分支条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

/// 整数加载宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWidth {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWidth {
    Byte,
    Half,
    Word,
}

/// 整数 ALU 运算（立即数与寄存器两种形式共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

/// M 扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

/// A 扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmoOp {
    Lr,
    Sc,
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrOp {
    /// 读后写
    Rw,
    /// 读后置位
    Rs,
    /// 读后清位
    Rc,
}

/// CSR 指令的写入源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrSrc {
    Reg(u8),
    /// 5-bit 零扩展立即数
    Imm(u8),
}

/// 浮点格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpFmt {
    S,
    D,
}

/// OP-FP 中的双操作数运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Sgnj,
    Sgnjn,
    Sgnjx,
}

/// 融合乘加
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmaOp {
    /// rs1*rs2 + rs3
    Madd,
    /// rs1*rs2 - rs3
    Msub,
    /// -(rs1*rs2) + rs3
    Nmsub,
    /// -(rs1*rs2) - rs3
    Nmadd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpCmpCond {
    Eq,
    Lt,
    Le,
}

/// 向量整数运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecIntOp {
    Add,
    Sub,
    Rsub,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sra,
}

/// 向量单精度浮点运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecFpOp {
    Add,
    Sub,
    Rsub,
    Mul,
    Div,
    Rdiv,
}

/// 向量指令的第二操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecOperand {
    /// vs1
    Vector(u8),
    /// x[rs1]（整数）或 f[rs1]（浮点）
    Scalar(u8),
    /// simm5
    Imm(i32),
}

/// 已解码指令的语义表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RvInstr {
    // ========== RV32I ==========
    Lui { rd: u8, imm: i32 },
    Auipc { rd: u8, imm: i32 },
    Jal { rd: u8, offset: i32 },
    Jalr { rd: u8, rs1: u8, offset: i32 },
    Branch { cond: BranchCond, rs1: u8, rs2: u8, offset: i32 },
    Load { width: LoadWidth, rd: u8, rs1: u8, offset: i32 },
    Store { width: StoreWidth, rs1: u8, rs2: u8, offset: i32 },
    /// 移位类指令的 imm 即 shamt
    AluImm { op: AluOp, rd: u8, rs1: u8, imm: i32 },
    AluReg { op: AluOp, rd: u8, rs1: u8, rs2: u8 },
    Fence { pred: u8, succ: u8, fm: u8 },
    FenceI,
    Ecall,
    Ebreak,

    // ========== M / A ==========
    Mul { op: MulOp, rd: u8, rs1: u8, rs2: u8 },
    Amo { op: AmoOp, rd: u8, rs1: u8, rs2: u8, aq: bool, rl: bool },

    // ========== Zicsr / 特权 ==========
    Csr { op: CsrOp, rd: u8, csr: u16, src: CsrSrc },
    Mret,
    Sret,
    Wfi,
    SfenceVma { rs1: u8, rs2: u8 },

    // ========== F / D ==========
    FpLoad { fmt: FpFmt, frd: u8, rs1: u8, offset: i32 },
    FpStore { fmt: FpFmt, frs2: u8, rs1: u8, offset: i32 },
    /// Min/Max/Sgnj* 的 rm 字段是功能选择位，执行时忽略
    FpArith { op: FpArithOp, fmt: FpFmt, frd: u8, frs1: u8, frs2: u8, rm: u8 },
    FpSqrt { fmt: FpFmt, frd: u8, frs1: u8, rm: u8 },
    FpFma { op: FmaOp, fmt: FpFmt, frd: u8, frs1: u8, frs2: u8, frs3: u8, rm: u8 },
    FpCmp { cond: FpCmpCond, fmt: FpFmt, rd: u8, frs1: u8, frs2: u8 },
    FpClass { fmt: FpFmt, rd: u8, frs1: u8 },
    /// FCVT.W[U].{S,D}
    FpToInt { fmt: FpFmt, signed: bool, rd: u8, frs1: u8, rm: u8 },
    /// FCVT.{S,D}.W[U]
    IntToFp { fmt: FpFmt, signed: bool, frd: u8, rs1: u8, rm: u8 },
    /// FCVT.S.D（to = S）与 FCVT.D.S（to = D）
    FpConvert { to: FpFmt, frd: u8, frs1: u8, rm: u8 },
    FmvXW { rd: u8, frs1: u8 },
    FmvWX { frd: u8, rs1: u8 },

    // ========== V ==========
    Vsetvli { rd: u8, rs1: u8, vtypei: u32 },
    Vsetivli { rd: u8, uimm: u8, vtypei: u32 },
    Vsetvl { rd: u8, rs1: u8, rs2: u8 },
    VecInt { op: VecIntOp, vd: u8, vs2: u8, src: VecOperand, vm: bool },
    VecFp { op: VecFpOp, vd: u8, vs2: u8, src: VecOperand, vm: bool },

    /// 非法指令
    Illegal { raw: u32 },
}

impl RvInstr {
    pub fn is_illegal(&self) -> bool {
        matches!(self, RvInstr::Illegal { .. })
    }
}

/// 已解码的指令：原始编码、长度（2 或 4 字节）与语义表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstr {
    pub raw: u32,
    pub len: u8,
    pub instr: RvInstr,
}

impl DecodedInstr {
    pub fn illegal(raw: u32, len: u8) -> Self {
        DecodedInstr {
            raw,
            len,
            instr: RvInstr::Illegal { raw },
        }
    }
}
