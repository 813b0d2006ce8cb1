//! 指令字段提取
//!
//! 32-bit 指令字各字段的提取与立即数符号扩展

#[inline]
pub fn opcode(raw: u32) -> u32 {
    raw & 0x7F
}

/// rd [11:7]
#[inline]
pub fn rd(raw: u32) -> u8 {
    ((raw >> 7) & 0x1F) as u8
}

/// funct3 [14:12]
#[inline]
pub fn funct3(raw: u32) -> u32 {
    (raw >> 12) & 0x7
}

/// rs1 [19:15]
#[inline]
pub fn rs1(raw: u32) -> u8 {
    ((raw >> 15) & 0x1F) as u8
}

/// rs2 [24:20]
#[inline]
pub fn rs2(raw: u32) -> u8 {
    ((raw >> 20) & 0x1F) as u8
}

/// rs3 [31:27]，R4-type 融合乘加使用
#[inline]
pub fn rs3(raw: u32) -> u8 {
    ((raw >> 27) & 0x1F) as u8
}

/// funct7 [31:25]
#[inline]
pub fn funct7(raw: u32) -> u32 {
    (raw >> 25) & 0x7F
}

/// funct6 [31:26]，向量算术指令使用
#[inline]
pub fn funct6(raw: u32) -> u32 {
    (raw >> 26) & 0x3F
}

/// 浮点舍入模式 rm [14:12]
#[inline]
pub fn rm(raw: u32) -> u8 {
    funct3(raw) as u8
}

/// 浮点格式 fmt [26:25]
#[inline]
pub fn fmt(raw: u32) -> u32 {
    (raw >> 25) & 0x3
}

/// I-type 立即数 imm[11:0] = raw[31:20]
#[inline]
pub fn imm_i(raw: u32) -> i32 {
    (raw as i32) >> 20
}

/// S-type 立即数 imm[11:5] = raw[31:25], imm[4:0] = raw[11:7]
#[inline]
pub fn imm_s(raw: u32) -> i32 {
    let imm = ((raw >> 25) << 5) | ((raw >> 7) & 0x1F);
    ((imm as i32) << 20) >> 20
}

/// B-type 立即数
/// imm[12] = raw[31], imm[10:5] = raw[30:25], imm[4:1] = raw[11:8], imm[11] = raw[7]
#[inline]
pub fn imm_b(raw: u32) -> i32 {
    let imm = (((raw >> 31) & 0x1) << 12)
        | (((raw >> 7) & 0x1) << 11)
        | (((raw >> 25) & 0x3F) << 5)
        | (((raw >> 8) & 0xF) << 1);
    ((imm as i32) << 19) >> 19
}

/// U-type 立即数（低 12 位为 0）
#[inline]
pub fn imm_u(raw: u32) -> i32 {
    (raw & 0xFFFF_F000) as i32
}

/// J-type 立即数
/// imm[20] = raw[31], imm[10:1] = raw[30:21], imm[11] = raw[20], imm[19:12] = raw[19:12]
#[inline]
pub fn imm_j(raw: u32) -> i32 {
    let imm = (((raw >> 31) & 0x1) << 20)
        | (raw & 0x000F_F000)
        | (((raw >> 20) & 0x1) << 11)
        | (((raw >> 21) & 0x3FF) << 1);
    ((imm as i32) << 11) >> 11
}

/// shamt [24:20]
#[inline]
pub fn shamt(raw: u32) -> u8 {
    rs2(raw)
}

/// CSR 地址 [31:20]
#[inline]
pub fn csr_addr(raw: u32) -> u16 {
    ((raw >> 20) & 0xFFF) as u16
}

/// CSR 立即数 zimm 占用 rs1 字段，零扩展
#[inline]
pub fn csr_zimm(raw: u32) -> u8 {
    rs1(raw)
}

/// 向量指令的 vm 位 [25]，为 0 表示按 v0 掩码执行
#[inline]
pub fn vm(raw: u32) -> bool {
    (raw >> 25) & 0x1 != 0
}

/// 向量 simm5 占用 rs1 字段，符号扩展
#[inline]
pub fn simm5(raw: u32) -> i32 {
    ((rs1(raw) as i32) << 27) >> 27
}

// ========== Opcode 常量 ==========
pub const OP_LOAD: u32 = 0b0000011;
pub const OP_LOAD_FP: u32 = 0b0000111;
pub const OP_MISC_MEM: u32 = 0b0001111;
pub const OP_IMM: u32 = 0b0010011;
pub const OP_AUIPC: u32 = 0b0010111;
pub const OP_STORE: u32 = 0b0100011;
pub const OP_STORE_FP: u32 = 0b0100111;
pub const OP_AMO: u32 = 0b0101111;
pub const OP_REG: u32 = 0b0110011;
pub const OP_LUI: u32 = 0b0110111;
pub const OP_MADD: u32 = 0b1000011;
pub const OP_MSUB: u32 = 0b1000111;
pub const OP_NMSUB: u32 = 0b1001011;
pub const OP_NMADD: u32 = 0b1001111;
pub const OP_FP: u32 = 0b1010011;
pub const OP_V: u32 = 0b1010111;
pub const OP_BRANCH: u32 = 0b1100011;
pub const OP_JALR: u32 = 0b1100111;
pub const OP_JAL: u32 = 0b1101111;
pub const OP_SYSTEM: u32 = 0b1110011;
