// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod asm;
pub mod bus;
pub mod cpu;
pub mod decoder;
pub mod firmware;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use basic_soc_config::StopReason;


#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Instruction decoding error at {0:#x}")]
    DecodeError(u64),
    #[error("Misaligned instruction fetch at {0:#x}")]
    MisalignedFetch(u64),
}

impl SimulationError {
    pub fn stop_reason(&self) -> StopReason {
        match self {
            SimulationError::MemoryViolation(_) => StopReason::MemoryViolation,
            SimulationError::DecodeError(_) => StopReason::DecodeError,
            SimulationError::MisalignedFetch(_) => StopReason::MisalignedFetch,
        }
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_step_start(&self, _pc: u32, _opcode: u32) {}
    fn on_step_end(&self, _cycles: u32) {}
}

/// Trait representing a CPU architecture
pub trait Cpu {
    fn reset(&mut self);
    fn step(
        &mut self,
        bus: &mut dyn Bus,
        observers: &[Arc<dyn SimulationObserver>],
    ) -> SimResult<()>;
    fn set_pc(&mut self, val: u32);
    fn get_pc(&self) -> u32;
    fn set_sp(&mut self, val: u32);
    fn get_sp(&self) -> u32;
    fn get_register(&self, id: u8) -> u32;
    fn set_register(&mut self, id: u8, val: u32);
    fn snapshot(&self) -> snapshot::CpuSnapshot;
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;
    /// Called once per executed instruction.
    fn tick(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;
    fn tick_peripherals(&mut self);

    fn read_u16(&self, addr: u64) -> SimResult<u16> {
        let b0 = self.read_u8(addr)? as u16;
        let b1 = self.read_u8(addr + 1)? as u16;
        // Little Endian
        Ok(b0 | (b1 << 8))
    }

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let b0 = self.read_u8(addr)? as u32;
        let b1 = self.read_u8(addr + 1)? as u32;
        let b2 = self.read_u8(addr + 2)? as u32;
        let b3 = self.read_u8(addr + 3)? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        self.write_u8(addr + 2, ((value >> 16) & 0xFF) as u8)?;
        self.write_u8(addr + 3, ((value >> 24) & 0xFF) as u8)?;
        Ok(())
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        Ok(())
    }
}

/// Bounds for [`Machine::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_steps: u64,
    pub wall_time: Option<Duration>,
}

impl RunLimits {
    pub fn steps(max_steps: u64) -> Self {
        Self {
            max_steps,
            wall_time: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub steps: u64,
    pub error: Option<SimulationError>,
}

// Wall clock is sampled every this many steps.
const WALL_TIME_CHECK_INTERVAL: u64 = 1024;

pub struct Machine<C: Cpu> {
    pub cpu: C,
    pub bus: bus::SystemBus,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
    pub entry_point: u32,
    pub steps: u64,
}

impl<C: Cpu + Default> Machine<C> {
    pub fn with_bus(bus: bus::SystemBus) -> Self {
        Self::new(C::default(), bus)
    }
}

impl<C: Cpu + Default> Default for Machine<C> {
    fn default() -> Self {
        Self::with_bus(bus::SystemBus::new())
    }
}

impl<C: Cpu> Machine<C> {
    pub fn new(cpu: C, bus: bus::SystemBus) -> Self {
        Self {
            cpu,
            bus,
            observers: Vec::new(),
            entry_point: 0,
            steps: 0,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn load_firmware(&mut self, image: &memory::ProgramImage) -> SimResult<()> {
        for segment in &image.segments {
            if let Some(name) = self
                .bus
                .overlaps_peripheral(segment.start_addr, segment.end_addr())
            {
                tracing::warn!(
                    "Segment at {:#x}..{:#x} overlaps peripheral '{}'; those bytes are unreachable",
                    segment.start_addr,
                    segment.end_addr(),
                    name
                );
            }
            if !self.bus.ram.load_from_segment(segment) {
                tracing::warn!(
                    "Failed to load segment at {:#x} - outside of memory map",
                    segment.start_addr
                );
            }
        }

        self.entry_point = image.entry_point as u32;

        for observer in &self.observers {
            observer.on_simulation_start();
        }
        self.reset()
    }

    /// Jumps to the reset vector. Registers, including `sp`, start at zero.
    pub fn reset(&mut self) -> SimResult<()> {
        self.cpu.reset();
        self.cpu.set_pc(self.entry_point);
        self.steps = 0;
        Ok(())
    }

    pub fn step(&mut self) -> SimResult<()> {
        let res = self.cpu.step(&mut self.bus, &self.observers);
        self.bus.tick_peripherals();
        if res.is_ok() {
            self.steps += 1;
        }
        res
    }

    /// Steps until a limit is hit, the core stops on an error, or the core
    /// jumps to itself.
    pub fn run(&mut self, limits: &RunLimits) -> RunSummary {
        let started = Instant::now();
        let mut executed = 0u64;

        let summary = loop {
            if executed >= limits.max_steps {
                break RunSummary {
                    stop_reason: StopReason::MaxSteps,
                    steps: executed,
                    error: None,
                };
            }
            if let Some(limit) = limits.wall_time {
                if executed % WALL_TIME_CHECK_INTERVAL == 0 && started.elapsed() >= limit {
                    break RunSummary {
                        stop_reason: StopReason::WallTime,
                        steps: executed,
                        error: None,
                    };
                }
            }

            let pc = self.cpu.get_pc();
            match self.step() {
                Ok(()) => {
                    executed += 1;
                    if self.cpu.get_pc() == pc {
                        tracing::info!("Core halted at {:#x}", pc);
                        break RunSummary {
                            stop_reason: StopReason::Halt,
                            steps: executed,
                            error: None,
                        };
                    }
                }
                Err(e) => {
                    tracing::info!("Simulation error after {} steps: {}", executed, e);
                    break RunSummary {
                        stop_reason: e.stop_reason(),
                        steps: executed,
                        error: Some(e),
                    };
                }
            }
        };

        for observer in &self.observers {
            observer.on_simulation_stop();
        }
        summary
    }

    pub fn uart_output(&self) -> Vec<u8> {
        self.bus.uart().map(|u| u.output()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> snapshot::MachineSnapshot {
        snapshot::MachineSnapshot {
            cpu: self.cpu.snapshot(),
            steps: self.steps,
            uart: self.uart_output(),
        }
    }
}
