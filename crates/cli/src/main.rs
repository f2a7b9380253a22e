// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use basic_soc_config::{BoardDescriptor, StopReason, TestAssertion, TestScript};
use basic_soc_core::bus::SystemBus;
use basic_soc_core::cpu::RiscV;
use basic_soc_core::firmware::{self, ReferenceLayout};
use basic_soc_core::memory::ProgramImage;
use basic_soc_core::metrics::PerformanceMetrics;
use basic_soc_core::{Machine, RunLimits, RunSummary};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Scripts asking for more than this are rejected as misconfigured.
const MAX_ALLOWED_STEPS: u64 = 50_000_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "BasicSoC Simulator", long_about = None)]
struct Cli {
    /// Enable instruction-level execution tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot firmware on the simulated board and stream its UART
    Run(RunArgs),
    /// Run a scripted simulation and check its assertions
    Test(TestArgs),
    /// Write a firmware image as a $readmemh hex file or an address listing
    Dump(DumpArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Firmware image (ELF or .hex). Defaults to the built-in reference firmware
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Board descriptor (YAML)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Maximum number of steps to execute
    #[arg(long, default_value_t = 20_000)]
    max_steps: u64,

    /// Do not echo UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,

    /// Write a JSON machine snapshot here when the run stops
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct TestArgs {
    /// Test script (YAML)
    #[arg(long)]
    script: PathBuf,

    /// Directory for result.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not echo UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DumpFormat {
    Hex,
    Listing,
}

#[derive(clap::Args, Debug)]
struct DumpArgs {
    /// Firmware image (ELF or .hex). Defaults to the built-in reference firmware
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Board descriptor (YAML) used to lay out the built-in firmware
    #[arg(short, long)]
    system: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DumpFormat::Hex)]
    format: DumpFormat,

    /// Output file. Stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // Logs go to stderr so stdout carries only UART bytes.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Run(args) => run_interactive(args),
        Commands::Test(args) => run_test(args),
        Commands::Dump(args) => run_dump(args),
    };
    ExitCode::from(code)
}

fn load_board(system: Option<&Path>) -> Result<BoardDescriptor> {
    match system {
        Some(path) => {
            info!("Loading board descriptor: {:?}", path);
            BoardDescriptor::from_file(path)
        }
        None => {
            info!("Using default board configuration");
            Ok(BoardDescriptor::default())
        }
    }
}

/// Loads `firmware`, or assembles the reference firmware for `board`.
/// Also returns the SHA-256 of the image bytes.
fn load_program(firmware: Option<&Path>, board: &BoardDescriptor) -> Result<(ProgramImage, String)> {
    let (image, raw) = match firmware {
        Some(path) => {
            info!("Loading firmware: {:?}", path);
            let raw = std::fs::read(path)
                .with_context(|| format!("Failed to read firmware file: {:?}", path))?;
            let image = basic_soc_loader::load_image(path)?;
            basic_soc_loader::check_span(&image, board.memory_size()?)?;
            (image, raw)
        }
        None => {
            info!("Assembling built-in reference firmware");
            let layout = ReferenceLayout::from_board(board)?;
            let fw = firmware::build(&layout).context("Failed to assemble reference firmware")?;
            let raw = fw.image.flatten().1;
            (fw.image, raw)
        }
    };

    let hash = Sha256::digest(&raw)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    Ok((image, hash))
}

fn build_machine(board: &BoardDescriptor, image: &ProgramImage, echo: bool) -> Result<Machine<RiscV>> {
    let mut bus = SystemBus::from_config(board)?;
    if let Some(uart) = bus.uart_mut() {
        uart.set_stdout_echo(echo);
    }
    let mut machine = Machine::<RiscV>::with_bus(bus);
    machine
        .load_firmware(image)
        .context("Failed to load firmware into memory")?;
    Ok(machine)
}

fn run_interactive(args: RunArgs) -> u8 {
    let prepared = load_board(args.system.as_deref()).and_then(|board| {
        let (image, _hash) = load_program(args.firmware.as_deref(), &board)?;
        info!("Entry Point: {:#x}", image.entry_point);
        let machine = build_machine(&board, &image, !args.no_uart_stdout)?;
        Ok(machine)
    });
    let mut machine = match prepared {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let metrics = Arc::new(PerformanceMetrics::new());
    machine.add_observer(metrics.clone());

    info!("Starting Simulation...");
    info!("Running for {} steps...", args.max_steps);
    let summary = machine.run(&RunLimits::steps(args.max_steps));

    info!(
        "Stopped: {:?} after {} steps ({:.0} IPS)",
        summary.stop_reason,
        summary.steps,
        metrics.get_ips()
    );
    info!(
        "Final PC: {:#x}, SP: {:#x}, UART bytes: {}",
        machine.cpu.pc,
        machine.cpu.read_reg(2),
        machine.uart_output().len()
    );

    if let Some(path) = &args.snapshot {
        let written = machine
            .snapshot()
            .to_json()
            .context("Failed to serialize snapshot")
            .and_then(|json| {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write snapshot to {:?}", path))
            });
        if let Err(e) = written {
            error!("{:#}", e);
            return EXIT_RUNTIME_ERROR;
        }
        info!("Snapshot written to {:?}", path);
    }

    match summary.error {
        Some(e) => {
            error!("Simulation error: {}", e);
            EXIT_RUNTIME_ERROR
        }
        None => EXIT_PASS,
    }
}

#[derive(Debug, Serialize)]
struct AssertionResult {
    assertion: String,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ResultConfig {
    firmware: Option<String>,
    system: Option<String>,
    max_steps: u64,
    wall_time_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TestResult {
    status: &'static str,
    stop_reason: StopReason,
    steps: u64,
    uart: String,
    firmware_hash: String,
    error: Option<String>,
    assertions: Vec<AssertionResult>,
    config: ResultConfig,
}

/// `output` is `text` repeated at least `count` times, optionally followed
/// by the start of one more copy.
fn repeats(output: &str, text: &str, count: usize) -> bool {
    let mut copies = 0;
    let mut rest = output;
    while let Some(tail) = rest.strip_prefix(text) {
        copies += 1;
        rest = tail;
    }
    copies >= count && text.starts_with(rest)
}

fn evaluate(assertion: &TestAssertion, output: &str, summary: &RunSummary) -> AssertionResult {
    match assertion {
        TestAssertion::UartContains(a) => AssertionResult {
            assertion: format!("uart_contains {:?}", a.uart_contains),
            passed: output.contains(&a.uart_contains),
            detail: format!("uart output was {:?}", output),
        },
        TestAssertion::UartEquals(a) => AssertionResult {
            assertion: format!("uart_equals {:?}", a.uart_equals),
            passed: output == a.uart_equals,
            detail: format!("uart output was {:?}", output),
        },
        TestAssertion::UartRepeats(a) => AssertionResult {
            assertion: format!(
                "uart_repeats {:?} x{}",
                a.uart_repeats.text, a.uart_repeats.count
            ),
            passed: repeats(output, &a.uart_repeats.text, a.uart_repeats.count),
            detail: format!("uart output was {:?}", output),
        },
        TestAssertion::ExpectedStopReason(a) => AssertionResult {
            assertion: format!("expected_stop_reason {:?}", a.expected_stop_reason),
            passed: summary.stop_reason == a.expected_stop_reason,
            detail: format!("stopped with {:?}", summary.stop_reason),
        },
    }
}

fn resolve(base: &Path, relative: &str) -> PathBuf {
    let p = Path::new(relative);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn run_test(args: TestArgs) -> u8 {
    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    if script.limits.max_steps > MAX_ALLOWED_STEPS {
        error!(
            "Limit 'max_steps' ({}) exceeds the allowed maximum of {}",
            script.limits.max_steps, MAX_ALLOWED_STEPS
        );
        return EXIT_CONFIG_ERROR;
    }

    let script_dir = args
        .script
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let firmware_path = script.inputs.firmware.as_deref().map(|f| resolve(&script_dir, f));
    let system_path = script.inputs.system.as_deref().map(|s| resolve(&script_dir, s));

    let prepared = load_board(system_path.as_deref()).and_then(|board| {
        let (image, hash) = load_program(firmware_path.as_deref(), &board)?;
        let machine = build_machine(&board, &image, !args.no_uart_stdout)?;
        Ok((machine, hash))
    });
    let (mut machine, firmware_hash) = match prepared {
        Ok(p) => p,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let limits = RunLimits {
        max_steps: script.limits.max_steps,
        wall_time: script.limits.wall_time_ms.map(Duration::from_millis),
    };
    let summary = machine.run(&limits);
    let output = String::from_utf8_lossy(&machine.uart_output()).into_owned();

    let results: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|a| evaluate(a, &output, &summary))
        .collect();

    let stop_expected = script
        .assertions
        .iter()
        .any(|a| matches!(a, TestAssertion::ExpectedStopReason(_)));
    let unexpected_error = summary.error.is_some() && !stop_expected;
    let all_passed = results.iter().all(|r| r.passed);

    for r in &results {
        if r.passed {
            info!("PASS {}", r.assertion);
        } else {
            error!("FAIL {} ({})", r.assertion, r.detail);
        }
    }

    let (status, code) = if unexpected_error {
        ("error", EXIT_RUNTIME_ERROR)
    } else if all_passed {
        ("pass", EXIT_PASS)
    } else {
        ("fail", EXIT_ASSERT_FAIL)
    };
    info!(
        "Test {}: {:?} after {} steps",
        status, summary.stop_reason, summary.steps
    );

    if let Some(dir) = &args.output_dir {
        let result = TestResult {
            status,
            stop_reason: summary.stop_reason,
            steps: summary.steps,
            uart: output,
            firmware_hash,
            error: summary.error.as_ref().map(|e| e.to_string()),
            assertions: results,
            config: ResultConfig {
                firmware: firmware_path.map(|p| p.display().to_string()),
                system: system_path.map(|p| p.display().to_string()),
                max_steps: script.limits.max_steps,
                wall_time_ms: script.limits.wall_time_ms,
            },
        };
        if let Err(e) = write_result(dir, &result) {
            error!("{:#}", e);
            return EXIT_RUNTIME_ERROR;
        }
    }

    code
}

fn write_result(dir: &Path, result: &TestResult) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    let path = dir.join("result.json");
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Result written to {:?}", path);
    Ok(())
}

fn run_dump(args: DumpArgs) -> u8 {
    let rendered = load_board(args.system.as_deref()).and_then(|board| {
        let (image, _hash) = load_program(args.firmware.as_deref(), &board)?;
        Ok(match args.format {
            DumpFormat::Hex => basic_soc_loader::to_hex(&image),
            DumpFormat::Listing => basic_soc_loader::to_listing(&image),
        })
    });
    let text = match rendered {
        Ok(t) => t,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                error!("Failed to write {:?}: {}", path, e);
                return EXIT_RUNTIME_ERROR;
            }
            info!("Image written to {:?}", path);
        }
        None => print!("{}", text),
    }
    EXIT_PASS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats() {
        assert!(repeats("SHAKTI\n\rSHAKTI\n\r", "SHAKTI\n\r", 2));
        assert!(repeats("SHAKTI\n\rSHAKTI\n\rSHA", "SHAKTI\n\r", 2));
        assert!(!repeats("SHAKTI\n\r", "SHAKTI\n\r", 2));
        assert!(!repeats("SHAKTI\n\rXSHAKTI\n\r", "SHAKTI\n\r", 1));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["basic-soc", "run", "--max-steps", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(ref a) if a.max_steps == 5));

        let cli = Cli::try_parse_from(["basic-soc", "dump", "--format", "listing"]).unwrap();
        assert!(matches!(cli.command, Commands::Dump(ref a) if matches!(a.format, DumpFormat::Listing)));
    }
}
