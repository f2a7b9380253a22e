use crate::SimulationObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    instruction_count: AtomicU64,
    cycle_count: AtomicU64,
    start_time: Instant,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            instruction_count: AtomicU64::new(0),
            cycle_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        self.instruction_count.store(0, Ordering::SeqCst);
        self.cycle_count.store(0, Ordering::SeqCst);
    }

    pub fn get_instructions(&self) -> u64 {
        self.instruction_count.load(Ordering::SeqCst)
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    pub fn get_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_instructions() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_simulation_start(&self) {
        self.reset();
    }

    fn on_step_start(&self, _pc: u32, _opcode: u32) {
        self.instruction_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_step_end(&self, cycles: u32) {
        self.cycle_count.fetch_add(cycles as u64, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{self, reg};
    use crate::cpu::RiscV;
    use crate::memory::ProgramImage;
    use crate::{Machine, RunLimits, StopReason};
    use std::sync::Arc;

    #[test]
    fn test_metrics_count_steps() {
        let mut image = ProgramImage::new(0);
        image.add_segment(
            0,
            asm::to_bytes(&[
                asm::addi(reg::T0, reg::ZERO, 1),
                asm::addi(reg::T0, reg::T0, 1),
                asm::jal(reg::ZERO, 0),
            ]),
        );

        let metrics = Arc::new(PerformanceMetrics::new());
        let mut machine = Machine::<RiscV>::default();
        machine.add_observer(metrics.clone());
        machine.load_firmware(&image).unwrap();

        let summary = machine.run(&RunLimits::steps(100));
        assert_eq!(summary.stop_reason, StopReason::Halt);
        assert_eq!(metrics.get_instructions(), 3);
        assert_eq!(metrics.get_cycles(), 3);
    }
}
