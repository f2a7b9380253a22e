// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Minimal RV32I encoder, the inverse of [`crate::decoder`].
//!
//! Enough to build test programs and the reference firmware image without a
//! cross toolchain.

/// ABI register numbers.
pub mod reg {
    pub const ZERO: u8 = 0;
    pub const RA: u8 = 1;
    pub const SP: u8 = 2;
    pub const T0: u8 = 5;
    pub const T1: u8 = 6;
    pub const T2: u8 = 7;
    pub const A0: u8 = 10;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AsmError {
    #[error("Label {0} was never bound")]
    UnboundLabel(usize),
    #[error("Branch offset {offset} at {pc:#x} is out of range")]
    OffsetOutOfRange { pc: u32, offset: i64 },
}

fn i_type(opcode: u32, funct3: u32, rd: u8, rs1: u8, imm: i32) -> u32 {
    ((imm as u32 & 0xFFF) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | opcode
}

fn s_type(funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7F) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((imm & 0x1F) << 7)
        | 0x23
}

fn b_type(funct3: u32, rs1: u8, rs2: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 12) & 0x1) << 31)
        | (((imm >> 5) & 0x3F) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xF) << 8)
        | (((imm >> 11) & 0x1) << 7)
        | 0x63
}

/// `imm` is the full 32-bit value; its low 12 bits are dropped.
pub fn lui(rd: u8, imm: u32) -> u32 {
    (imm & 0xFFFF_F000) | ((rd as u32) << 7) | 0x37
}

pub fn jal(rd: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 20) & 0x1) << 31)
        | (((imm >> 1) & 0x3FF) << 21)
        | (((imm >> 11) & 0x1) << 20)
        | (((imm >> 12) & 0xFF) << 12)
        | ((rd as u32) << 7)
        | 0x6F
}

pub fn jalr(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0x67, 0b000, rd, rs1, imm)
}

pub fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(0b000, rs1, rs2, offset)
}

pub fn bgeu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(0b111, rs1, rs2, offset)
}

pub fn lw(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0x03, 0b010, rd, rs1, imm)
}

pub fn lbu(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0x03, 0b100, rd, rs1, imm)
}

pub fn sb(rs2: u8, rs1: u8, imm: i32) -> u32 {
    s_type(0b000, rs1, rs2, imm)
}

pub fn sw(rs2: u8, rs1: u8, imm: i32) -> u32 {
    s_type(0b010, rs1, rs2, imm)
}

pub fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(0x13, 0b000, rd, rs1, imm)
}

/// `li rd, value` as one `addi` or a `lui`/`addi` pair.
pub fn li(rd: u8, value: u32) -> Vec<u32> {
    let signed = value as i32;
    if (-2048..2048).contains(&signed) {
        return vec![addi(rd, reg::ZERO, signed)];
    }
    // `addi` sign-extends, so round the upper part.
    let hi = value.wrapping_add(0x800) & 0xFFFF_F000;
    let lo = value.wrapping_sub(hi) as i32;
    let mut out = vec![lui(rd, hi)];
    if lo != 0 {
        out.push(addi(rd, rd, lo));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum FixupKind {
    Jal { rd: u8 },
    Branch { funct3: u32, rs1: u8, rs2: u8 },
}

#[derive(Debug)]
struct Fixup {
    index: usize,
    label: Label,
    kind: FixupKind,
}

/// Straight-line assembler with forward-referenced labels.
#[derive(Debug)]
pub struct Assembler {
    origin: u32,
    words: Vec<u32>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl Assembler {
    pub fn new(origin: u32) -> Self {
        Self {
            origin,
            words: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Address of the next emitted instruction.
    pub fn pc(&self) -> u32 {
        self.origin + (self.words.len() as u32) * 4
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.pc());
    }

    pub fn label_addr(&self, label: Label) -> Option<u32> {
        self.labels.get(label.0).copied().flatten()
    }

    pub fn emit(&mut self, word: u32) {
        self.words.push(word);
    }

    pub fn emit_all(&mut self, words: impl IntoIterator<Item = u32>) {
        self.words.extend(words);
    }

    pub fn li(&mut self, rd: u8, value: u32) {
        self.emit_all(li(rd, value));
    }

    pub fn jal_to(&mut self, rd: u8, label: Label) {
        self.fixup(label, FixupKind::Jal { rd });
    }

    /// Unsigned `rs1 >= rs2`.
    pub fn bgeu_to(&mut self, rs1: u8, rs2: u8, label: Label) {
        self.fixup(label, FixupKind::Branch { funct3: 0b111, rs1, rs2 });
    }

    fn fixup(&mut self, label: Label, kind: FixupKind) {
        self.fixups.push(Fixup {
            index: self.words.len(),
            label,
            kind,
        });
        // Placeholder until `finish` resolves the target.
        self.words.push(0);
    }

    /// Resolves all label references and returns the instruction words.
    pub fn finish(mut self) -> Result<Vec<u32>, AsmError> {
        for fixup in &self.fixups {
            let target = self
                .labels
                .get(fixup.label.0)
                .copied()
                .flatten()
                .ok_or(AsmError::UnboundLabel(fixup.label.0))?;
            let pc = self.origin + (fixup.index as u32) * 4;
            let offset = target as i64 - pc as i64;
            let word = match fixup.kind {
                FixupKind::Jal { rd } => {
                    if !(-(1 << 20)..(1 << 20)).contains(&offset) {
                        return Err(AsmError::OffsetOutOfRange { pc, offset });
                    }
                    jal(rd, offset as i32)
                }
                FixupKind::Branch { funct3, rs1, rs2 } => {
                    if !(-(1 << 12)..(1 << 12)).contains(&offset) {
                        return Err(AsmError::OffsetOutOfRange { pc, offset });
                    }
                    b_type(funct3, rs1, rs2, offset as i32)
                }
            };
            self.words[fixup.index] = word;
        }
        Ok(self.words)
    }
}

/// Little-endian byte image of `words`.
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_rv32, Instruction};

    #[test]
    fn test_known_encodings() {
        assert_eq!(addi(1, 0, 5), 0x0050_0093);
        assert_eq!(beq(1, 2, 8), 0x0020_8463);
        assert_eq!(jal(reg::ZERO, 0), 0x0000_006F);
        assert_eq!(jal(reg::RA, -4), 0xFFDF_F0EF);
        assert_eq!(sb(reg::T1, reg::T0, 0), 0x0062_8023);
        assert_eq!(lui(reg::SP, 0x0001_0000), 0x0001_0137);
    }

    #[test]
    fn test_decoder_agrees() {
        assert_eq!(
            decode_rv32(sw(reg::T2, reg::SP, -12)),
            Instruction::Sw { rs1: 2, rs2: 7, imm: -12 }
        );
        assert_eq!(
            decode_rv32(bgeu(reg::A0, reg::T2, -2048)),
            Instruction::Bgeu { rs1: 10, rs2: 7, imm: -2048 }
        );
        assert_eq!(
            decode_rv32(jal(reg::RA, 0x7FFFE)),
            Instruction::Jal { rd: 1, imm: 0x7FFFE }
        );
    }

    #[test]
    fn test_li_sequences() {
        assert_eq!(li(reg::T0, 0x100), vec![addi(reg::T0, 0, 0x100)]);
        assert_eq!(li(reg::SP, 0x1_0000), vec![lui(reg::SP, 0x1_0000)]);
        // 100_000 = 0x186A0: low part 0x6A0 is positive
        assert_eq!(
            li(reg::T2, 100_000),
            vec![lui(reg::T2, 0x1_8000), addi(reg::T2, reg::T2, 0x6A0)]
        );
        // 0x1_0800: low part would be negative, so the upper part rounds up
        assert_eq!(
            li(reg::T2, 0x1_0800),
            vec![lui(reg::T2, 0x1_1000), addi(reg::T2, reg::T2, -2048)]
        );
    }

    #[test]
    fn test_forward_label() {
        let mut a = Assembler::new(0);
        let end = a.new_label();
        a.jal_to(reg::ZERO, end);
        a.emit(addi(1, 0, 1));
        a.bind(end);
        a.emit(addi(2, 0, 2));
        assert_eq!(a.label_addr(end), Some(8));
        let words = a.finish().unwrap();
        assert_eq!(decode_rv32(words[0]), Instruction::Jal { rd: 0, imm: 8 });
    }

    #[test]
    fn test_unbound_label() {
        let mut a = Assembler::new(0);
        let nowhere = a.new_label();
        a.bgeu_to(1, 2, nowhere);
        assert_eq!(a.finish().unwrap_err(), AsmError::UnboundLabel(0));
    }
}
