// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::ptr;

/// Pause between banners.
pub trait Delay {
    fn delay(&mut self);
}

/// Count-bounded busy wait.
///
/// Stands in for a real timer; the wall-clock length depends on the core
/// clock. The loop counter is only touched through volatile accesses so the
/// loop survives optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinDelay {
    iterations: u32,
}

impl SpinDelay {
    pub const fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Runs the loop and returns how many iterations actually executed.
    #[inline(never)]
    pub fn spin(&self) -> u32 {
        let mut i: u32 = 0;
        let counter = &mut i as *mut u32;
        // SAFETY: `counter` points at a live local.
        unsafe {
            while ptr::read_volatile(counter) < self.iterations {
                ptr::write_volatile(counter, ptr::read_volatile(counter) + 1);
            }
            ptr::read_volatile(counter)
        }
    }
}

impl Default for SpinDelay {
    fn default() -> Self {
        Self::new(crate::board::DELAY_ITERATIONS)
    }
}

impl Delay for SpinDelay {
    fn delay(&mut self) {
        self.spin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteSink;

    #[test]
    fn test_spin_runs_configured_count() {
        assert_eq!(SpinDelay::new(1).spin(), 1);
        assert_eq!(SpinDelay::new(1_000).spin(), 1_000);
        assert_eq!(SpinDelay::default().spin(), 100_000);
    }

    #[test]
    fn test_zero_iterations() {
        assert_eq!(SpinDelay::new(0).spin(), 0);
    }

    #[test]
    fn test_delay_does_not_touch_uart() {
        let mut reg = 0x5Au8;
        let mut uart = unsafe { crate::MmioUart::new(&mut reg as *mut u8) };
        let mut delay = SpinDelay::new(500);
        delay.delay();
        assert_eq!(reg, 0x5A);

        // The register still belongs to the UART afterwards.
        uart.send(0x01);
        delay.delay();
        assert_eq!(reg, 0x01);
    }
}
