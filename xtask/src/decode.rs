//! xtask decode: turn a saved panic region back into a readable fault report.
//!
//! Two inputs are accepted: the raw region bytes (e.g. from
//! `probe-rs read b8 0x081E0000 ...` saved as binary), or a terminal capture of
//! `fault data` / the panic console, which prints `OOOOOOOO: <hex>` lines.
//! Any other lines in a capture (prompts, the fault announce line) are skipped.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use firmware::fault::FaultDump;
use firmware::flight_recorder::chronological;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Hex when the file is text made of dump lines, raw otherwise.
    Auto,
    /// Raw region bytes.
    Raw,
    /// `OOOOOOOO: <hex>` lines as printed by the console.
    Hex,
}

pub fn run(file: &Path, format: Format) -> Result<()> {
    let bytes = load(file, format)?;
    let dump = FaultDump::parse(&bytes).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!();
    print!("{}", render(&dump));
    println!();
    Ok(())
}

pub(crate) fn load(file: &Path, format: Format) -> Result<Vec<u8>> {
    let contents =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let as_hex = match format {
        Format::Raw => false,
        Format::Hex => true,
        Format::Auto => std::str::from_utf8(&contents)
            .map(|text| text.lines().any(|l| parse_line(l).is_some()))
            .unwrap_or(false),
    };
    if !as_hex {
        return Ok(contents);
    }
    let text = std::str::from_utf8(&contents).context("hex dump is not UTF-8 text")?;
    parse_hex_dump(text)
}

/// `(offset, bytes)` for a dump line, `None` for anything else.
fn parse_line(line: &str) -> Option<(usize, Vec<u8>)> {
    let (offset, hex) = line.trim().split_once(": ")?;
    if offset.len() != 8 || hex.is_empty() || !hex.len().is_multiple_of(2) {
        return None;
    }
    let offset = usize::from_str_radix(offset, 16).ok()?;
    let bytes = hex
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|b| u8::from_str_radix(b, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()?;
    Some((offset, bytes))
}

/// Reassemble contiguous dump lines into the region bytes they cover.
pub(crate) fn parse_hex_dump(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let Some((offset, bytes)) = parse_line(line) else {
            continue;
        };
        anyhow::ensure!(
            offset == out.len(),
            "line {}: offset {offset:#010x} does not follow {:#010x}",
            n.saturating_add(1),
            out.len()
        );
        out.extend_from_slice(&bytes);
    }
    anyhow::ensure!(!out.is_empty(), "no dump lines found");
    Ok(out)
}

pub(crate) fn render(dump: &FaultDump<'_>) -> String {
    let r = &dump.record;
    let f = &r.exception_frame;
    let s = &r.status;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!(
            "Fault: {} (type {}) param={} at {} ms",
            r.fault_kind.name(),
            r.fault_kind.as_u32(),
            r.fault_param,
            r.timestamp_ms
        )
        .red()
        .bold()
    );
    let _ = writeln!(
        out,
        "  SP=0x{:08x} LR=0x{:08x}",
        r.stack_pointer_at_fault, r.link_register_at_fault
    );
    let _ = writeln!(out, "{}", "Exception frame:".cyan());
    let _ = writeln!(
        out,
        "  R0=0x{:08x} R1=0x{:08x} R2=0x{:08x} R3=0x{:08x}",
        f.r0, f.r1, f.r2, f.r3
    );
    let _ = writeln!(
        out,
        "  R12=0x{:08x} LR=0x{:08x} PC=0x{:08x} xPSR=0x{:08x}",
        f.r12, f.lr, f.return_address, f.xpsr
    );
    let _ = writeln!(out, "{}", "Fault status:".cyan());
    let _ = writeln!(
        out,
        "  IPSR=0x{:08x} ICSR=0x{:08x} SHCSR=0x{:08x}",
        s.ipsr, s.icsr, s.shcsr
    );
    let _ = writeln!(
        out,
        "  CFSR=0x{:08x} HFSR=0x{:08x} MMFAR=0x{:08x} BFAR=0x{:08x}",
        s.cfsr, s.hfsr, s.mmfar, s.bfar
    );
    let _ = writeln!(
        out,
        "{}",
        format!("Flight recorder ({} bytes):", dump.recorder.len()).cyan()
    );
    // A board image is a ring with a header; anything else is shown as is.
    let events = match chronological(dump.recorder) {
        Some((older, newer)) => [older, newer].concat(),
        None => dump.recorder.to_vec(),
    };
    for line in String::from_utf8_lossy(&events).lines() {
        let _ = writeln!(out, "  {}", line.dimmed());
    }
    out
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use firmware::fault::{EndMarker, FaultKind, FaultRecord};
    use firmware::RingRecorder;
    use std::io::Write;

    fn sample_dump(recorder: &[u8]) -> Vec<u8> {
        let mut record = FaultRecord {
            fault_kind: FaultKind::WatchdogTimeout,
            fault_param: 2,
            timestamp_ms: 1234,
            ..FaultRecord::EMPTY
        };
        record.stamp();
        let mut bytes = record.encode().to_vec();
        bytes.extend_from_slice(recorder);
        bytes.extend_from_slice(&EndMarker.encode());
        bytes.resize(bytes.len() + 64, 0xFF);
        bytes
    }

    fn as_console_text(bytes: &[u8]) -> String {
        let mut text = String::from("> fault data\n");
        for (i, chunk) in bytes.chunks(32).enumerate() {
            let hex: String = chunk.iter().map(|b| format!("{b:02x}")).collect();
            text.push_str(&format!("{:08x}: {hex}\r\n", i * 32));
        }
        text
    }

    #[test]
    fn raw_file_decodes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample_dump(b"boot\nfault status\n")).unwrap();

        let bytes = load(file.path(), Format::Auto).unwrap();
        let dump = FaultDump::parse(&bytes).unwrap();
        assert_eq!(dump.record.fault_param, 2);
        assert_eq!(dump.recorder, b"boot\nfault status\n");
    }

    #[test]
    fn console_capture_decodes() {
        let raw = sample_dump(b"event");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(as_console_text(&raw).as_bytes()).unwrap();

        let bytes = load(file.path(), Format::Auto).unwrap();
        assert_eq!(bytes, raw);
        let report = render(&FaultDump::parse(&bytes).unwrap());
        assert!(report.contains("param=2 at 1234 ms"));
        assert!(report.contains("Flight recorder (5 bytes)"));
    }

    #[test]
    fn ring_image_is_shown_oldest_first() {
        let rec = RingRecorder::<32>::new(); // 24-byte ring
        rec.record(b"boot\n");
        rec.record(b"fault status\n");
        rec.record(b"fault data\n");
        let raw = sample_dump(&rec.snapshot());

        let report = render(&FaultDump::parse(&raw).unwrap());
        let tail = report.split("Flight recorder").nth(1).unwrap();
        // 29 bytes into a 24-byte ring: "boot\n" was overwritten.
        assert!(!tail.contains("boot"));
        assert!(tail.contains("status"));
        assert!(tail.find("status").unwrap() < tail.find("fault data").unwrap());
    }

    #[test]
    fn gaps_in_a_capture_are_rejected() {
        let text = "00000000: 7ada17fa\n00000020: 00000000\n";
        let err = parse_hex_dump(text).unwrap_err();
        assert!(err.to_string().contains("does not follow"));
    }

    #[test]
    fn text_without_dump_lines_is_rejected() {
        assert!(parse_hex_dump("Fault detected\n").is_err());
    }

    #[test]
    fn erased_region_reports_no_fault() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xFF; 256]).unwrap();
        let bytes = load(file.path(), Format::Raw).unwrap();
        let err = FaultDump::parse(&bytes).unwrap_err();
        assert_eq!(err.to_string(), "no fault recorded");
    }
}
