// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The reference UART firmware, assembled directly to RV32I.
//!
//! Mirrors `crates/firmware`: a startup shim that loads `sp` and calls `main`,
//! and a `main` that emits the banner byte by byte and then spins on a
//! counter kept in its stack frame, so the delay loop does real loads and
//! stores and cannot collapse to nothing.
//!
//! ```text
//! _start: li   sp, STACK_TOP
//!         jal  ra, main
//! halt:   j    halt
//! main:   addi sp, sp, -16
//!         li   t0, UART_BASE
//! loop:   li t1, 'S' ; sb t1, 0(t0)    (once per banner byte)
//!         li   t2, DELAY
//!         sw   zero, 12(sp)
//! spin:   lw   a0, 12(sp)
//!         bgeu a0, t2, done
//!         lw   a0, 12(sp)
//!         addi a0, a0, 1
//!         sw   a0, 12(sp)
//!         j    spin
//! done:   j    loop
//! ```

use crate::asm::{self, reg, AsmError, Assembler};
use crate::memory::ProgramImage;
use basic_soc_config::BoardDescriptor;
use basic_soc_hal::board;

/// Bytes of stack `main` reserves.
pub const MAIN_FRAME_SIZE: u32 = 16;

/// Offset of the spin counter inside `main`'s frame.
const COUNTER_OFFSET: i32 = 12;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FirmwareError {
    #[error(transparent)]
    Asm(#[from] AsmError),
    #[error("Image [{start:#x}, {end:#x}) overlaps the UART at {uart:#x}")]
    OverlapsUart { start: u64, end: u64, uart: u64 },
    #[error("Image [{start:#x}, {end:#x}) runs into the stack frame below {stack_top:#x}")]
    OverlapsStack { start: u64, end: u64, stack_top: u64 },
    #[error("Stack frame below {stack_top:#x} overlaps the UART at {uart:#x}")]
    StackOverlapsUart { stack_top: u64, uart: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLayout {
    pub load_addr: u32,
    pub stack_top: u32,
    pub uart_base: u32,
    pub message: Vec<u8>,
    pub delay_iterations: u32,
}

impl Default for ReferenceLayout {
    fn default() -> Self {
        Self {
            load_addr: board::MEMORY_BASE as u32,
            stack_top: board::STACK_TOP as u32,
            uart_base: board::UART_BASE as u32,
            message: basic_soc_hal::MESSAGE.to_vec(),
            delay_iterations: board::DELAY_ITERATIONS,
        }
    }
}

impl ReferenceLayout {
    pub fn from_board(board: &BoardDescriptor) -> anyhow::Result<Self> {
        board.validate()?;
        Ok(Self {
            load_addr: board.memory.base as u32,
            stack_top: board.stack_top()? as u32,
            uart_base: board.uart.base_address as u32,
            message: board.firmware.message.as_bytes().to_vec(),
            delay_iterations: board.firmware.delay_iterations,
        })
    }
}

/// An assembled image plus the addresses of its landmarks.
#[derive(Debug, Clone)]
pub struct ReferenceFirmware {
    pub image: ProgramImage,
    pub start_addr: u32,
    /// The `jal ra, main` in the startup shim.
    pub call_addr: u32,
    pub main_addr: u32,
    /// First instruction of each banner emission.
    pub loop_addr: u32,
    /// First instruction after the last banner byte.
    pub delay_addr: u32,
}

/// Assembles the image for `layout`.
///
/// Fails if the code would cover the UART register or reach into `main`'s
/// stack frame; either way the core would fetch or clobber its own program.
pub fn build(layout: &ReferenceLayout) -> Result<ReferenceFirmware, FirmwareError> {
    let mut a = Assembler::new(layout.load_addr);
    let main = a.new_label();
    let halt = a.new_label();
    let emit = a.new_label();
    let spin = a.new_label();
    let done = a.new_label();

    // Startup shim
    let start_addr = a.pc();
    a.li(reg::SP, layout.stack_top);
    let call_addr = a.pc();
    a.jal_to(reg::RA, main);
    a.bind(halt);
    a.jal_to(reg::ZERO, halt);

    // main
    let main_addr = a.pc();
    a.bind(main);
    a.emit(asm::addi(reg::SP, reg::SP, -(MAIN_FRAME_SIZE as i32)));
    a.li(reg::T0, layout.uart_base);

    let loop_addr = a.pc();
    a.bind(emit);
    for &byte in &layout.message {
        a.emit(asm::addi(reg::T1, reg::ZERO, byte as i32));
        a.emit(asm::sb(reg::T1, reg::T0, 0));
    }

    let delay_addr = a.pc();
    a.li(reg::T2, layout.delay_iterations);
    a.emit(asm::sw(reg::ZERO, reg::SP, COUNTER_OFFSET));
    a.bind(spin);
    a.emit(asm::lw(reg::A0, reg::SP, COUNTER_OFFSET));
    a.bgeu_to(reg::A0, reg::T2, done);
    a.emit(asm::lw(reg::A0, reg::SP, COUNTER_OFFSET));
    a.emit(asm::addi(reg::A0, reg::A0, 1));
    a.emit(asm::sw(reg::A0, reg::SP, COUNTER_OFFSET));
    a.jal_to(reg::ZERO, spin);
    a.bind(done);
    a.jal_to(reg::ZERO, emit);

    let words = a.finish()?;
    check_layout(layout, words.len() as u64 * 4)?;

    let mut image = ProgramImage::new(start_addr as u64);
    image.add_segment(layout.load_addr as u64, asm::to_bytes(&words));

    Ok(ReferenceFirmware {
        image,
        start_addr,
        call_addr,
        main_addr,
        loop_addr,
        delay_addr,
    })
}

fn check_layout(layout: &ReferenceLayout, code_size: u64) -> Result<(), FirmwareError> {
    let start = layout.load_addr as u64;
    let end = start + code_size;
    let uart = layout.uart_base as u64;
    let stack_top = layout.stack_top as u64;
    let frame_base = stack_top.saturating_sub(MAIN_FRAME_SIZE as u64);

    if (start..end).contains(&uart) {
        return Err(FirmwareError::OverlapsUart { start, end, uart });
    }
    if end > frame_base && start < stack_top {
        return Err(FirmwareError::OverlapsStack { start, end, stack_top });
    }
    if (frame_base..stack_top).contains(&uart) {
        return Err(FirmwareError::StackOverlapsUart { stack_top, uart });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_rv32, Instruction};

    fn words(fw: &ReferenceFirmware) -> Vec<u32> {
        fw.image.segments[0]
            .data
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_default_layout_fits_below_uart() {
        let fw = build(&ReferenceLayout::default()).unwrap();
        let (start, end) = fw.image.span().unwrap();
        assert_eq!(start, 0);
        assert!(end <= 0x100, "image ends at {:#x}", end);
        assert_eq!(fw.image.entry_point, 0);
    }

    #[test]
    fn test_shim_sets_sp_before_call() {
        let fw = build(&ReferenceLayout::default()).unwrap();
        let w = words(&fw);
        // 0x10000 needs only the upper immediate
        assert_eq!(decode_rv32(w[0]), Instruction::Lui { rd: reg::SP, imm: 0x1_0000 });
        assert_eq!(fw.call_addr, 4);
        match decode_rv32(w[1]) {
            Instruction::Jal { rd, imm } => {
                assert_eq!(rd, reg::RA);
                assert_eq!(fw.call_addr.wrapping_add(imm as u32), fw.main_addr);
            }
            other => panic!("expected jal, got {:?}", other),
        }
    }

    #[test]
    fn test_emit_block_stores_message() {
        let fw = build(&ReferenceLayout::default()).unwrap();
        let w = words(&fw);
        let first = (fw.loop_addr / 4) as usize;
        let stored: Vec<u8> = w[first..(fw.delay_addr / 4) as usize]
            .chunks(2)
            .map(|pair| match (decode_rv32(pair[0]), decode_rv32(pair[1])) {
                (Instruction::Addi { rd: reg::T1, rs1: 0, imm }, Instruction::Sb { rs1: reg::T0, rs2: reg::T1, imm: 0 }) => {
                    imm as u8
                }
                other => panic!("unexpected pair {:?}", other),
            })
            .collect();
        assert_eq!(stored, b"SHAKTI\n\r".to_vec());
    }

    #[test]
    fn test_from_board() {
        let mut board = BoardDescriptor::default();
        board.firmware.delay_iterations = 7;
        board.firmware.message = "OK".to_string();
        let layout = ReferenceLayout::from_board(&board).unwrap();
        assert_eq!(layout.delay_iterations, 7);
        assert_eq!(layout.message, b"OK".to_vec());
        assert_eq!(layout.stack_top, 0x1_0000);
        assert_eq!(layout.uart_base, 0x100);
    }

    #[test]
    fn test_long_message_cannot_reach_uart() {
        // 29 bytes of banner push the emit block past 0x100.
        let layout = ReferenceLayout {
            message: vec![b'x'; 29],
            delay_iterations: 3,
            ..ReferenceLayout::default()
        };
        match build(&layout) {
            Err(FirmwareError::OverlapsUart { start, end, uart }) => {
                assert_eq!(start, 0);
                assert!(end > 0x100);
                assert_eq!(uart, 0x100);
            }
            other => panic!("expected UART overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_uart_inside_code_rejected() {
        let layout = ReferenceLayout {
            uart_base: 0x10,
            ..ReferenceLayout::default()
        };
        assert!(matches!(build(&layout), Err(FirmwareError::OverlapsUart { .. })));
    }

    #[test]
    fn test_code_must_stay_below_stack_frame() {
        let layout = ReferenceLayout {
            stack_top: 0x40,
            ..ReferenceLayout::default()
        };
        assert!(matches!(build(&layout), Err(FirmwareError::OverlapsStack { .. })));

        let layout = ReferenceLayout {
            uart_base: 0xFFF8,
            ..ReferenceLayout::default()
        };
        assert!(matches!(build(&layout), Err(FirmwareError::StackOverlapsUart { .. })));
    }

    #[test]
    fn test_delay_compare_is_unsigned() {
        let fw = build(&ReferenceLayout::default()).unwrap();
        let w = words(&fw);
        assert!(w.iter().any(|&word| matches!(
            decode_rv32(word),
            Instruction::Bgeu { rs1: reg::A0, rs2: reg::T2, .. }
        )));
    }
}
