// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::io::{self, Write};

/// One byte leaving the transmit register, stamped with the bus tick it was
/// written on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub tick: u64,
    pub byte: u8,
}

/// Write-only UART with a single transmit register at offset 0.
///
/// There is no status register and no receive path; reads return zero.
/// Every write to offset 0 is logged as transmitted.
#[derive(Debug, Default)]
pub struct Uart {
    ticks: u64,
    log: Vec<TxEvent>,
    echo_stdout: bool,
}

impl Uart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print each transmitted byte to stdout.
    pub fn set_stdout_echo(&mut self, echo: bool) {
        self.echo_stdout = echo;
    }

    pub fn events(&self) -> &[TxEvent] {
        &self.log
    }

    pub fn output(&self) -> Vec<u8> {
        self.log.iter().map(|e| e.byte).collect()
    }
}

impl crate::Peripheral for Uart {
    fn read(&self, _offset: u64) -> SimResult<u8> {
        Ok(0)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        if offset == 0x00 {
            self.log.push(TxEvent {
                tick: self.ticks,
                byte: value,
            });
            tracing::trace!("UART TX {:#04x} at tick {}", value, self.ticks);
            if self.echo_stdout {
                let mut out = io::stdout().lock();
                let _ = out.write_all(&[value]);
                let _ = out.flush();
            }
        }
        Ok(())
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;

    #[test]
    fn test_uart_logs_each_write() {
        let mut uart = Uart::new();
        for b in 0..=255u8 {
            uart.write(0, b).unwrap();
        }
        let out = uart.output();
        assert_eq!(out.len(), 256);
        assert!(out.iter().enumerate().all(|(i, &b)| b as usize == i));
    }

    #[test]
    fn test_uart_ignores_other_offsets() {
        let mut uart = Uart::new();
        uart.write(1, b'X').unwrap();
        uart.write(3, b'Y').unwrap();
        assert!(uart.events().is_empty());
        assert_eq!(uart.read(0).unwrap(), 0);
    }

    #[test]
    fn test_uart_tick_stamps() {
        let mut uart = Uart::new();
        uart.write(0, b'A').unwrap();
        uart.tick();
        uart.tick();
        uart.write(0, b'B').unwrap();
        assert_eq!(
            uart.events(),
            &[TxEvent { tick: 0, byte: b'A' }, TxEvent { tick: 2, byte: b'B' }]
        );
        assert_eq!(uart.output(), b"AB".to_vec());
    }
}
