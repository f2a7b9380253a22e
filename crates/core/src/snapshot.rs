use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineSnapshot {
    pub cpu: CpuSnapshot,
    pub steps: u64,
    pub uart: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    /// x0..x31
    pub registers: Vec<u32>,
    pub pc: u32,
}

impl MachineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
