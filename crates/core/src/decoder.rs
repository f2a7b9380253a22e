// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! RV32I base integer instruction decoding.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Lui { rd: u8, imm: u32 },
    Auipc { rd: u8, imm: u32 },
    Jal { rd: u8, imm: i32 },
    Jalr { rd: u8, rs1: u8, imm: i32 },
    Beq { rs1: u8, rs2: u8, imm: i32 },
    Bne { rs1: u8, rs2: u8, imm: i32 },
    Blt { rs1: u8, rs2: u8, imm: i32 },
    Bge { rs1: u8, rs2: u8, imm: i32 },
    Bltu { rs1: u8, rs2: u8, imm: i32 },
    Bgeu { rs1: u8, rs2: u8, imm: i32 },
    Lb { rd: u8, rs1: u8, imm: i32 },
    Lh { rd: u8, rs1: u8, imm: i32 },
    Lw { rd: u8, rs1: u8, imm: i32 },
    Lbu { rd: u8, rs1: u8, imm: i32 },
    Lhu { rd: u8, rs1: u8, imm: i32 },
    Sb { rs1: u8, rs2: u8, imm: i32 },
    Sh { rs1: u8, rs2: u8, imm: i32 },
    Sw { rs1: u8, rs2: u8, imm: i32 },
    Addi { rd: u8, rs1: u8, imm: i32 },
    Slti { rd: u8, rs1: u8, imm: i32 },
    Sltiu { rd: u8, rs1: u8, imm: i32 },
    Xori { rd: u8, rs1: u8, imm: i32 },
    Ori { rd: u8, rs1: u8, imm: i32 },
    Andi { rd: u8, rs1: u8, imm: i32 },
    Slli { rd: u8, rs1: u8, shamt: u8 },
    Srli { rd: u8, rs1: u8, shamt: u8 },
    Srai { rd: u8, rs1: u8, shamt: u8 },
    Add { rd: u8, rs1: u8, rs2: u8 },
    Sub { rd: u8, rs1: u8, rs2: u8 },
    Sll { rd: u8, rs1: u8, rs2: u8 },
    Slt { rd: u8, rs1: u8, rs2: u8 },
    Sltu { rd: u8, rs1: u8, rs2: u8 },
    Xor { rd: u8, rs1: u8, rs2: u8 },
    Srl { rd: u8, rs1: u8, rs2: u8 },
    Sra { rd: u8, rs1: u8, rs2: u8 },
    Or { rd: u8, rs1: u8, rs2: u8 },
    And { rd: u8, rs1: u8, rs2: u8 },
    Fence,
    Ecall,
    Ebreak,
    Unknown(u32),
}

fn rd(inst: u32) -> u8 {
    ((inst >> 7) & 0x1F) as u8
}

fn rs1(inst: u32) -> u8 {
    ((inst >> 15) & 0x1F) as u8
}

fn rs2(inst: u32) -> u8 {
    ((inst >> 20) & 0x1F) as u8
}

fn funct3(inst: u32) -> u32 {
    (inst >> 12) & 0x7
}

fn funct7(inst: u32) -> u32 {
    inst >> 25
}

fn imm_i(inst: u32) -> i32 {
    (inst as i32) >> 20
}

fn imm_s(inst: u32) -> i32 {
    (((inst & 0xFE00_0000) as i32) >> 20) | ((inst >> 7) & 0x1F) as i32
}

fn imm_b(inst: u32) -> i32 {
    let imm = (((inst >> 31) & 0x1) << 12)
        | (((inst >> 7) & 0x1) << 11)
        | (((inst >> 25) & 0x3F) << 5)
        | (((inst >> 8) & 0xF) << 1);
    // Sign-extend from bit 12
    ((imm << 19) as i32) >> 19
}

fn imm_j(inst: u32) -> i32 {
    let imm = (((inst >> 31) & 0x1) << 20)
        | (((inst >> 12) & 0xFF) << 12)
        | (((inst >> 20) & 0x1) << 11)
        | (((inst >> 21) & 0x3FF) << 1);
    // Sign-extend from bit 20
    ((imm << 11) as i32) >> 11
}

/// Decodes one 32-bit RV32I instruction word.
pub fn decode_rv32(inst: u32) -> Instruction {
    match inst & 0x7F {
        0x37 => Instruction::Lui {
            rd: rd(inst),
            imm: inst & 0xFFFF_F000,
        },
        0x17 => Instruction::Auipc {
            rd: rd(inst),
            imm: inst & 0xFFFF_F000,
        },
        0x6F => Instruction::Jal {
            rd: rd(inst),
            imm: imm_j(inst),
        },
        0x67 if funct3(inst) == 0 => Instruction::Jalr {
            rd: rd(inst),
            rs1: rs1(inst),
            imm: imm_i(inst),
        },
        0x63 => {
            let (rs1, rs2, imm) = (rs1(inst), rs2(inst), imm_b(inst));
            match funct3(inst) {
                0b000 => Instruction::Beq { rs1, rs2, imm },
                0b001 => Instruction::Bne { rs1, rs2, imm },
                0b100 => Instruction::Blt { rs1, rs2, imm },
                0b101 => Instruction::Bge { rs1, rs2, imm },
                0b110 => Instruction::Bltu { rs1, rs2, imm },
                0b111 => Instruction::Bgeu { rs1, rs2, imm },
                _ => Instruction::Unknown(inst),
            }
        }
        0x03 => {
            let (rd, rs1, imm) = (rd(inst), rs1(inst), imm_i(inst));
            match funct3(inst) {
                0b000 => Instruction::Lb { rd, rs1, imm },
                0b001 => Instruction::Lh { rd, rs1, imm },
                0b010 => Instruction::Lw { rd, rs1, imm },
                0b100 => Instruction::Lbu { rd, rs1, imm },
                0b101 => Instruction::Lhu { rd, rs1, imm },
                _ => Instruction::Unknown(inst),
            }
        }
        0x23 => {
            let (rs1, rs2, imm) = (rs1(inst), rs2(inst), imm_s(inst));
            match funct3(inst) {
                0b000 => Instruction::Sb { rs1, rs2, imm },
                0b001 => Instruction::Sh { rs1, rs2, imm },
                0b010 => Instruction::Sw { rs1, rs2, imm },
                _ => Instruction::Unknown(inst),
            }
        }
        0x13 => {
            let (rd, rs1, imm) = (rd(inst), rs1(inst), imm_i(inst));
            let shamt = rs2(inst);
            match (funct3(inst), funct7(inst)) {
                (0b000, _) => Instruction::Addi { rd, rs1, imm },
                (0b010, _) => Instruction::Slti { rd, rs1, imm },
                (0b011, _) => Instruction::Sltiu { rd, rs1, imm },
                (0b100, _) => Instruction::Xori { rd, rs1, imm },
                (0b110, _) => Instruction::Ori { rd, rs1, imm },
                (0b111, _) => Instruction::Andi { rd, rs1, imm },
                (0b001, 0x00) => Instruction::Slli { rd, rs1, shamt },
                (0b101, 0x00) => Instruction::Srli { rd, rs1, shamt },
                (0b101, 0x20) => Instruction::Srai { rd, rs1, shamt },
                _ => Instruction::Unknown(inst),
            }
        }
        0x33 => {
            let (rd, rs1, rs2) = (rd(inst), rs1(inst), rs2(inst));
            match (funct3(inst), funct7(inst)) {
                (0b000, 0x00) => Instruction::Add { rd, rs1, rs2 },
                (0b000, 0x20) => Instruction::Sub { rd, rs1, rs2 },
                (0b001, 0x00) => Instruction::Sll { rd, rs1, rs2 },
                (0b010, 0x00) => Instruction::Slt { rd, rs1, rs2 },
                (0b011, 0x00) => Instruction::Sltu { rd, rs1, rs2 },
                (0b100, 0x00) => Instruction::Xor { rd, rs1, rs2 },
                (0b101, 0x00) => Instruction::Srl { rd, rs1, rs2 },
                (0b101, 0x20) => Instruction::Sra { rd, rs1, rs2 },
                (0b110, 0x00) => Instruction::Or { rd, rs1, rs2 },
                (0b111, 0x00) => Instruction::And { rd, rs1, rs2 },
                _ => Instruction::Unknown(inst),
            }
        }
        0x0F => Instruction::Fence,
        0x73 => match inst {
            0x0000_0073 => Instruction::Ecall,
            0x0010_0073 => Instruction::Ebreak,
            _ => Instruction::Unknown(inst),
        },
        _ => Instruction::Unknown(inst),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_addi() {
        // ADDI x1, x0, 5
        assert_eq!(
            decode_rv32(0x0050_0093),
            Instruction::Addi { rd: 1, rs1: 0, imm: 5 }
        );
        // ADDI x2, x2, -16
        assert_eq!(
            decode_rv32(0xFF01_0113),
            Instruction::Addi { rd: 2, rs1: 2, imm: -16 }
        );
    }

    #[test]
    fn test_decode_beq() {
        // BEQ x1, x2, +8
        assert_eq!(
            decode_rv32(0x0020_8463),
            Instruction::Beq { rs1: 1, rs2: 2, imm: 8 }
        );
    }

    #[test]
    fn test_decode_jal_self_loop() {
        // j .
        assert_eq!(decode_rv32(0x0000_006F), Instruction::Jal { rd: 0, imm: 0 });
        // jal ra, -4
        assert_eq!(decode_rv32(0xFFDF_F0EF), Instruction::Jal { rd: 1, imm: -4 });
    }

    #[test]
    fn test_decode_sb_lui() {
        // sb t1, 0(t0)
        assert_eq!(
            decode_rv32(0x0062_8023),
            Instruction::Sb { rs1: 5, rs2: 6, imm: 0 }
        );
        // lui sp, 0x10
        assert_eq!(
            decode_rv32(0x0001_0137),
            Instruction::Lui { rd: 2, imm: 0x0001_0000 }
        );
    }

    #[test]
    fn test_decode_system_and_unknown() {
        assert_eq!(decode_rv32(0x0000_0073), Instruction::Ecall);
        assert_eq!(decode_rv32(0x0010_0073), Instruction::Ebreak);
        assert_eq!(decode_rv32(0x0000_0000), Instruction::Unknown(0));
        assert_eq!(decode_rv32(0xFFFF_FFFF), Instruction::Unknown(0xFFFF_FFFF));
    }
}
