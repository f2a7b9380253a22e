// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start_addr: u64,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn end_addr(&self) -> u64 {
        self.start_addr + self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    pub entry_point: u64,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(entry_point: u64) -> Self {
        Self {
            entry_point,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, start_addr: u64, data: Vec<u8>) {
        self.segments.push(Segment { start_addr, data });
    }

    pub fn total_size(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    /// Lowest and one-past-highest loaded address.
    pub fn span(&self) -> Option<(u64, u64)> {
        let start = self.segments.iter().map(|s| s.start_addr).min()?;
        let end = self.segments.iter().map(Segment::end_addr).max()?;
        Some((start, end))
    }

    /// Flattens all segments into one contiguous buffer starting at `span().0`.
    /// Gaps are zero-filled.
    pub fn flatten(&self) -> (u64, Vec<u8>) {
        let Some((start, end)) = self.span() else {
            return (self.entry_point, Vec::new());
        };
        let mut out = vec![0u8; (end - start) as usize];
        for segment in &self.segments {
            let offset = (segment.start_addr - start) as usize;
            out[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
        }
        (start, out)
    }
}

/// A simple flat memory storage
#[derive(Debug)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr < self.base_addr + self.data.len() as u64
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        if self.contains(addr) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        if self.contains(addr) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    pub fn load_from_segment(&mut self, segment: &Segment) -> bool {
        let mem_end = self.base_addr + self.data.len() as u64;

        if segment.start_addr >= self.base_addr && segment.end_addr() <= mem_end {
            let offset = (segment.start_addr - self.base_addr) as usize;
            self.data[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
            return true;
        }
        false
    }
}
