// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::board;

/// Anything that can accept one transmitted byte.
pub trait ByteSink {
    fn send(&mut self, byte: u8);
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn send(&mut self, byte: u8) {
        (**self).send(byte)
    }
}

/// Write-only UART transmit register.
///
/// Every [`ByteSink::send`] is a single volatile byte store to `tx`. There is
/// no status register, so a busy transmitter is not detected.
#[derive(Debug)]
pub struct MmioUart {
    tx: *mut u8,
}

impl MmioUart {
    /// # Safety
    ///
    /// `tx` must be a writable byte-wide register (or memory) for as long as
    /// the returned handle is used, and nothing else may write through it
    /// concurrently.
    pub const unsafe fn new(tx: *mut u8) -> Self {
        Self { tx }
    }

    /// The board's fixed UART at [`board::UART_BASE`].
    ///
    /// # Safety
    ///
    /// Only valid when running on the board itself.
    pub const unsafe fn board() -> Self {
        Self::new(board::UART_BASE as *mut u8)
    }

    pub fn address(&self) -> usize {
        self.tx as usize
    }
}

impl ByteSink for MmioUart {
    #[inline]
    fn send(&mut self, byte: u8) {
        // SAFETY: upheld by the constructor contract.
        unsafe { core::ptr::write_volatile(self.tx, byte) }
    }
}

/// Transmits `b` on the board UART.
///
/// # Safety
///
/// Only valid when running on the board itself.
#[inline]
pub unsafe fn uart_put_byte(b: u8) {
    core::ptr::write_volatile(board::UART_BASE as *mut u8, b);
}
