// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use basic_soc_hal::board;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported arch '{0}'. Supported: 'rv32i'")]
    UnsupportedArch(String),
    #[error("Stack top {stack_top:#x} lies outside memory [{base:#x}, {end:#x}]")]
    StackOutsideMemory { stack_top: u64, base: u64, end: u64 },
    #[error("Firmware message cannot be empty")]
    EmptyMessage,
    #[error("Delay iterations must be greater than zero")]
    ZeroDelay,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "64KiB"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UartConfig {
    pub base_address: u64,
}

/// Parameters of the built-in reference firmware.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FirmwareParams {
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_delay_iterations")]
    pub delay_iterations: u32,
}

fn default_message() -> String {
    String::from_utf8_lossy(basic_soc_hal::MESSAGE).into_owned()
}

fn default_delay_iterations() -> u32 {
    board::DELAY_ITERATIONS
}

fn default_arch() -> String {
    "rv32i".to_string()
}

impl Default for FirmwareParams {
    fn default() -> Self {
        Self {
            message: default_message(),
            delay_iterations: default_delay_iterations(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BoardDescriptor {
    pub name: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub memory: MemoryRange,
    pub uart: UartConfig,
    /// Defaults to the end of `memory`.
    #[serde(default)]
    pub stack_top: Option<u64>,
    #[serde(default)]
    pub firmware: FirmwareParams,
}

impl Default for BoardDescriptor {
    fn default() -> Self {
        Self {
            name: "basic-soc".to_string(),
            arch: default_arch(),
            memory: MemoryRange {
                base: board::MEMORY_BASE as u64,
                size: format!("{}KiB", board::MEMORY_SIZE / 1024),
            },
            uart: UartConfig {
                base_address: board::UART_BASE as u64,
            },
            stack_top: None,
            firmware: FirmwareParams::default(),
        }
    }
}

impl BoardDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open board descriptor at {:?}", path.as_ref()))?;
        let board: Self = serde_yaml::from_reader(f).context("Failed to parse Board Descriptor")?;
        board.validate()?;
        Ok(board)
    }

    pub fn memory_size(&self) -> Result<u64> {
        parse_size(&self.memory.size)
    }

    pub fn memory_end(&self) -> Result<u64> {
        Ok(self.memory.base + self.memory_size()?)
    }

    pub fn stack_top(&self) -> Result<u64> {
        match self.stack_top {
            Some(top) => Ok(top),
            None => self.memory_end(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.arch != "rv32i" {
            return Err(ConfigError::UnsupportedArch(self.arch.clone()).into());
        }

        let base = self.memory.base;
        let end = self.memory_end()?;
        let stack_top = self.stack_top()?;
        // The stack grows down from `stack_top`, so the top itself may be
        // one past the last byte.
        if stack_top <= base || stack_top > end {
            return Err(ConfigError::StackOutsideMemory {
                stack_top,
                base,
                end,
            }
            .into());
        }
        if self.firmware.message.is_empty() {
            return Err(ConfigError::EmptyMessage.into());
        }
        if self.firmware.delay_iterations == 0 {
            return Err(ConfigError::ZeroDelay.into());
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    /// ELF or `.hex` image. The built-in reference firmware when omitted.
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_steps: u64,
    #[serde(default)]
    pub wall_time_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    WallTime,
    MemoryViolation,
    DecodeError,
    MisalignedFetch,
    Halt,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartEqualsAssertion {
    pub uart_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RepeatSpec {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartRepeatsAssertion {
    pub uart_repeats: RepeatSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    UartContains(UartContainsAssertion),
    UartEquals(UartEqualsAssertion),
    UartRepeats(UartRepeatsAssertion),
    ExpectedStopReason(StopReasonAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if let Some(firmware) = &self.inputs.firmware {
            if firmware.trim().is_empty() {
                anyhow::bail!("Input 'firmware' path cannot be empty");
            }
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        for assertion in &self.assertions {
            if let TestAssertion::UartRepeats(a) = assertion {
                if a.uart_repeats.text.is_empty() {
                    anyhow::bail!("Assertion 'uart_repeats' needs a non-empty text");
                }
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
