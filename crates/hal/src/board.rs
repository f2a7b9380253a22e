// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Memory map of the BasicSoC reference board.
//!
//! These are placeholder values, not datasheet facts. The simulator reads the
//! same numbers from its board descriptor and may override them.

/// UART transmit register, one byte wide, write-only.
pub const UART_BASE: usize = 0x0000_0100;

/// Start of the single RAM region. Code is loaded here.
pub const MEMORY_BASE: usize = 0x0000_0000;

/// 64 KiB of RAM.
pub const MEMORY_SIZE: usize = 0x0001_0000;

/// Initial stack pointer. Must match `_stack_top` in the firmware linker script.
pub const STACK_TOP: usize = MEMORY_BASE + MEMORY_SIZE;

/// Spin iterations between banners.
pub const DELAY_ITERATIONS: u32 = 100_000;
