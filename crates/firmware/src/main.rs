// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_std]
#![no_main]

use basic_soc_hal::{run, MmioUart, SpinDelay};
use core::arch::global_asm;
use panic_halt as _;

// Reset entry. Nothing may touch the stack before `sp` is loaded.
global_asm!(
    r#"
    .section .text.init, "ax"
    .global _start
_start:
    la sp, _stack_top
    call _start_rust
1:
    j 1b
"#
);

#[export_name = "_start_rust"]
pub extern "C" fn main() -> ! {
    // SAFETY: we are on the board; nothing else drives the UART.
    let mut uart = unsafe { MmioUart::board() };
    let mut delay = SpinDelay::default();
    run(&mut uart, &mut delay)
}
