// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::LinearMemory;
use crate::peripherals::uart::Uart;
use crate::{Peripheral, SimResult, SimulationError};
use anyhow::Context;
use basic_soc_config::BoardDescriptor;
use basic_soc_hal::board;

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}

/// RAM plus memory-mapped peripherals. Peripheral windows shadow RAM.
#[derive(Debug)]
pub struct SystemBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    /// The reference board: 64 KiB RAM at 0 and the UART at 0x100.
    pub fn new() -> Self {
        let mut bus = Self::with_memory(board::MEMORY_BASE as u64, board::MEMORY_SIZE);
        bus.add_peripheral("uart", board::UART_BASE as u64, 1, Box::new(Uart::new()));
        bus
    }

    /// RAM only, no peripherals.
    pub fn with_memory(base: u64, size: usize) -> Self {
        Self {
            ram: LinearMemory::new(size, base),
            peripherals: Vec::new(),
        }
    }

    pub fn from_config(board: &BoardDescriptor) -> anyhow::Result<Self> {
        board.validate()?;
        let size = board
            .memory_size()
            .with_context(|| format!("Invalid memory size for board '{}'", board.name))?;
        let mut bus = Self::with_memory(board.memory.base, size as usize);
        bus.add_peripheral("uart", board.uart.base_address, 1, Box::new(Uart::new()));
        tracing::debug!(
            "Bus for '{}': RAM {:#x}+{:#x}, UART at {:#x}",
            board.name,
            board.memory.base,
            size,
            board.uart.base_address
        );
        Ok(bus)
    }

    pub fn add_peripheral(&mut self, name: &str, base: u64, size: u64, dev: Box<dyn Peripheral>) {
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            dev,
        });
    }

    fn find_peripheral(&self, addr: u64) -> Option<usize> {
        self.peripherals.iter().position(|p| p.contains(addr))
    }

    /// Name of the first peripheral window overlapping `[start, end)`.
    pub fn overlaps_peripheral(&self, start: u64, end: u64) -> Option<&str> {
        self.peripherals
            .iter()
            .find(|p| start < p.base + p.size && p.base < end)
            .map(|p| p.name.as_str())
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn uart(&self) -> Option<&Uart> {
        self.peripheral::<Uart>("uart")
    }

    pub fn uart_mut(&mut self) -> Option<&mut Uart> {
        self.peripheral_mut::<Uart>("uart")
    }
}

impl crate::Bus for SystemBus {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        if let Some(idx) = self.find_peripheral(addr) {
            let p = &self.peripherals[idx];
            return p.dev.read(addr - p.base);
        }
        self.ram
            .read_u8(addr)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if let Some(idx) = self.find_peripheral(addr) {
            let p = &mut self.peripherals[idx];
            return p.dev.write(addr - p.base, value);
        }
        if self.ram.write_u8(addr, value) {
            return Ok(());
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn tick_peripherals(&mut self) {
        for p in &mut self.peripherals {
            p.dev.tick();
        }
    }
}
