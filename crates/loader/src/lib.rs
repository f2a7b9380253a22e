// BasicSoC - UART Firmware and Simulation Harness
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use basic_soc_core::memory::ProgramImage;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Loads an ELF or `.hex` image, chosen by file extension.
pub fn load_image(path: &Path) -> Result<ProgramImage> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("hex") => load_hex(path),
        _ => load_elf(path),
    }
}

pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;
    parse_elf(&buffer)
}

pub fn parse_elf(buffer: &[u8]) -> Result<ProgramImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    if elf.is_64 {
        bail!("Expected a 32-bit RISC-V ELF, found ELF64");
    }
    if elf.header.e_machine != goblin::elf::header::EM_RISCV {
        bail!(
            "Expected a RISC-V ELF, found machine type {}",
            elf.header.e_machine
        );
    }

    info!("ELF Entry Point: {:#x}", elf.entry);

    let mut program_image = ProgramImage::new(elf.entry);

    for ph in elf.program_headers {
        if ph.p_type == PT_LOAD {
            // Physical address (LMA): where the bytes live at reset.
            let start_addr = ph.p_paddr;
            let size = ph.p_filesz as usize;
            let offset = ph.p_offset as usize;

            if size == 0 {
                continue;
            }

            debug!(
                "Found Loadable Segment: Addr={:#x}, Size={} bytes, Offset={:#x}",
                start_addr, size, offset
            );

            if offset + size > buffer.len() {
                return Err(anyhow!("Segment out of bounds in ELF file"));
            }

            let segment_data = buffer[offset..offset + size].to_vec();
            program_image.add_segment(start_addr, segment_data);
        }
    }

    if program_image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(program_image)
}

pub fn load_hex(path: &Path) -> Result<ProgramImage> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hex file: {:?}", path))?;
    parse_hex(&text).with_context(|| format!("Failed to parse hex file: {:?}", path))
}

/// Parses a `$readmemh` word image: one 32-bit hex word per line, stored
/// little-endian at consecutive word addresses starting from 0.
///
/// `@addr` lines move the load address (a word index, as in Verilog).
/// `//` comments and blank lines are ignored. The entry point is address 0.
pub fn parse_hex(text: &str) -> Result<ProgramImage> {
    let mut image = ProgramImage::new(0);
    let mut seg_start: u64 = 0;
    let mut seg_data: Vec<u8> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        for token in line.split_whitespace() {
            if let Some(addr) = token.strip_prefix('@') {
                let word_index = u32::from_str_radix(addr, 16)
                    .with_context(|| format!("line {}: bad address '{}'", lineno + 1, token))?;
                let byte_addr = word_index.checked_mul(4).ok_or_else(|| {
                    anyhow!(
                        "line {}: address '{}' is outside the 32-bit address space",
                        lineno + 1,
                        token
                    )
                })?;
                if !seg_data.is_empty() {
                    image.add_segment(seg_start, std::mem::take(&mut seg_data));
                }
                seg_start = byte_addr as u64;
                continue;
            }

            if token.len() > 8 {
                bail!("line {}: word '{}' is wider than 32 bits", lineno + 1, token);
            }
            let word = u32::from_str_radix(token, 16)
                .with_context(|| format!("line {}: bad word '{}'", lineno + 1, token))?;
            seg_data.extend_from_slice(&word.to_le_bytes());
        }
    }

    if !seg_data.is_empty() {
        image.add_segment(seg_start, seg_data);
    }
    if image.segments.is_empty() {
        warn!("Hex image contains no words");
    }
    debug!("Parsed hex image: {} bytes", image.total_size());
    Ok(image)
}

/// Rejects images whose lowest and highest addresses are further apart than
/// `limit` bytes. Flattening such an image would allocate the whole gap.
pub fn check_span(image: &ProgramImage, limit: u64) -> Result<()> {
    if let Some((start, end)) = image.span() {
        if end - start > limit {
            bail!(
                "Image spans [{:#x}, {:#x}), more than the {:#x} bytes of board memory",
                start,
                end,
                limit
            );
        }
    }
    Ok(())
}

/// Renders `image` as a `$readmemh` file, one word per line.
///
/// Gaps between segments are zero-filled; a leading `@` line is emitted
/// when the image does not start at address 0.
pub fn to_hex(image: &ProgramImage) -> String {
    let (start, bytes) = image.flatten();
    let mut out = String::new();
    if start != 0 {
        let _ = writeln!(out, "@{:08x}", start / 4);
    }
    for word in words(&bytes) {
        let _ = writeln!(out, "{:08x}", word);
    }
    out
}

/// Address-annotated listing, one `aaaaaaaa: wwwwwwww` line per word.
pub fn to_listing(image: &ProgramImage) -> String {
    let (start, bytes) = image.flatten();
    let mut out = String::new();
    for (i, word) in words(&bytes).enumerate() {
        let _ = writeln!(out, "{:08x}: {:08x}", start + (i as u64) * 4, word);
    }
    out
}

fn words(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes.chunks(4).map(|c| {
        let mut w = [0u8; 4];
        w[..c.len()].copy_from_slice(c);
        u32::from_le_bytes(w)
    })
}
