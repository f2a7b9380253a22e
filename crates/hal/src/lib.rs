// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Board support for the BasicSoC UART stub.
//!
//! The firmware binary wires [`uart::MmioUart`] and [`delay::SpinDelay`] into
//! [`run`]. Host tests drive the same loop through mock sinks.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod delay;
pub mod uart;

pub use delay::{Delay, SpinDelay};
pub use uart::{ByteSink, MmioUart};

/// Banner emitted once per main-loop iteration.
pub const MESSAGE: &[u8; 8] = b"SHAKTI\n\r";

/// Writes [`MESSAGE`] to `sink`, one byte at a time, in order.
pub fn emit_message<S: ByteSink + ?Sized>(sink: &mut S) {
    for &byte in MESSAGE.iter() {
        sink.send(byte);
    }
}

/// One pass of the main loop: emit the banner, then wait.
pub fn cycle<S, D>(sink: &mut S, delay: &mut D)
where
    S: ByteSink + ?Sized,
    D: Delay + ?Sized,
{
    emit_message(sink);
    delay.delay();
}

/// The firmware main loop. There is no exit.
pub fn run<S, D>(sink: &mut S, delay: &mut D) -> !
where
    S: ByteSink + ?Sized,
    D: Delay + ?Sized,
{
    loop {
        cycle(sink, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct RecordingSink {
        bytes: Vec<u8>,
    }

    impl ByteSink for RecordingSink {
        fn send(&mut self, byte: u8) {
            self.bytes.push(byte);
        }
    }

    /// Records the sink length at each delay so tests can see where one
    /// iteration ends and the next begins.
    #[derive(Debug, Default)]
    struct MarkerDelay {
        marks: Vec<usize>,
        sent_so_far: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl Delay for MarkerDelay {
        fn delay(&mut self) {
            self.marks.push(self.sent_so_far.get());
        }
    }

    struct CountingSink {
        sent: std::rc::Rc<std::cell::Cell<usize>>,
        bytes: Vec<u8>,
        limit: usize,
    }

    impl ByteSink for CountingSink {
        fn send(&mut self, byte: u8) {
            if self.bytes.len() == self.limit {
                panic!("sink limit reached");
            }
            self.bytes.push(byte);
            self.sent.set(self.bytes.len());
        }
    }

    #[test]
    fn test_emit_message_bytes() {
        let mut sink = RecordingSink::default();
        emit_message(&mut sink);
        assert_eq!(
            sink.bytes,
            vec![0x53, 0x48, 0x41, 0x4B, 0x54, 0x49, 0x0A, 0x0D]
        );
    }

    #[test]
    fn test_cycle_emits_then_delays() {
        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut sink = CountingSink {
            sent: counter.clone(),
            bytes: Vec::new(),
            limit: usize::MAX,
        };
        let mut delay = MarkerDelay {
            marks: Vec::new(),
            sent_so_far: counter,
        };

        for _ in 0..5 {
            cycle(&mut sink, &mut delay);
        }

        // Each delay starts right after a complete banner.
        assert_eq!(delay.marks, vec![8, 16, 24, 32, 40]);
        for chunk in sink.bytes.chunks(MESSAGE.len()) {
            assert_eq!(chunk, MESSAGE);
        }
    }

    #[test]
    #[should_panic(expected = "sink limit reached")]
    fn test_run_keeps_emitting() {
        // Three full iterations fit; the fourth banner trips the limit, so
        // `run` was still emitting after N rounds.
        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut sink = CountingSink {
            sent: counter.clone(),
            bytes: Vec::new(),
            limit: MESSAGE.len() * 3,
        };
        let mut delay = MarkerDelay {
            marks: Vec::new(),
            sent_so_far: counter,
        };
        run(&mut sink, &mut delay);
    }

    #[test]
    fn test_dyn_sink() {
        let mut sink = RecordingSink::default();
        let dyn_sink: &mut dyn ByteSink = &mut sink;
        emit_message(dyn_sink);
        assert_eq!(&sink.bytes[..], &MESSAGE[..]);
    }
}
