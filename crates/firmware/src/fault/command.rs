//! The `fault` console command.
//!
//! ```text
//! fault data [erase]                  hex dump (or erase) the panic region
//! fault status                        stack usage and reset flags
//! fault test                          list test operations
//! fault test report <kind> <param>    enter the panic path from software
//! fault test stack                    overflow the stack
//! fault test ptr                      write through a bad pointer
//! ```
//!
//! Parsing and the read-only operations are portable. The test operations
//! are returned to the caller as a [`FaultTest`], since only the board code
//! can reach the panic controller or provoke a real exception.

use core::fmt::Write;

use embedded_storage::nor_flash::NorFlash;
use platform::reset_cause::RESET_FLAG_NAMES;
use platform::ResetFlags;

use super::record::{FaultKind, END_MARKER_LEN, RECORD_LEN};
use super::region::{FaultRegion, RegionError};
use super::store::{hex_line, HEX_BYTES_PER_LINE};
use crate::stack_watermark::{StackMemory, StackWatermark};

/// A parsed `fault` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCommand {
    /// `fault data`
    Data,
    /// `fault data erase`
    DataErase,
    /// `fault status`
    Status,
    /// `fault test`
    TestHelp,
    /// `fault test report|stack|ptr ...`
    Test(FaultTest),
}

/// A deliberate fault requested from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTest {
    /// Software entry with the given kind and parameter.
    Report {
        /// Fault kind to report.
        kind: FaultKind,
        /// Fault parameter to report.
        param: u32,
    },
    /// Unbounded recursion into the stack guard.
    StackOverflow,
    /// Store through an invalid pointer.
    BadPointer,
}

/// What the caller must do after [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Output written, nothing else to do.
    Done,
    /// Carry out this test; it does not return.
    Trigger(FaultTest),
}

/// Command failure, reported back on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum CommandError {
    /// The line does not start with `fault`.
    #[error("not a fault command")]
    NotFaultCommand,
    /// Wrong number or form of arguments.
    #[error("Invalid command arguments")]
    BadArguments,
    /// `fault test <op>` with an unknown op.
    #[error("Invalid test")]
    UnknownTest,
    /// Reading or erasing the region failed.
    #[error("{0}")]
    Region(RegionError),
    /// The output sink refused a write.
    #[error("console write failed")]
    Output,
}

impl From<RegionError> for CommandError {
    fn from(e: RegionError) -> Self {
        Self::Region(e)
    }
}

impl From<core::fmt::Error> for CommandError {
    fn from(_: core::fmt::Error) -> Self {
        Self::Output
    }
}

const MAX_WORDS: usize = 6;

impl FaultCommand {
    /// Parse a full console line such as `fault test report 1 7`.
    ///
    /// Keywords are case-insensitive.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words: heapless::Vec<&str, MAX_WORDS> = heapless::Vec::new();
        for word in line.split_whitespace() {
            words.push(word).map_err(|_| CommandError::BadArguments)?;
        }
        let (first, args) = words
            .split_first()
            .ok_or(CommandError::NotFaultCommand)?;
        if !first.eq_ignore_ascii_case("fault") {
            return Err(CommandError::NotFaultCommand);
        }
        Self::parse_args(args)
    }

    fn parse_args(args: &[&str]) -> Result<Self, CommandError> {
        let (op, rest) = args.split_first().ok_or(CommandError::BadArguments)?;
        if op.eq_ignore_ascii_case("data") {
            return match rest {
                [] => Ok(Self::Data),
                [erase] if erase.eq_ignore_ascii_case("erase") => Ok(Self::DataErase),
                _ => Err(CommandError::BadArguments),
            };
        }
        if op.eq_ignore_ascii_case("status") {
            return if rest.is_empty() {
                Ok(Self::Status)
            } else {
                Err(CommandError::BadArguments)
            };
        }
        if op.eq_ignore_ascii_case("test") {
            return Self::parse_test(rest);
        }
        Err(CommandError::BadArguments)
    }

    fn parse_test(args: &[&str]) -> Result<Self, CommandError> {
        let Some((op, rest)) = args.split_first() else {
            return Ok(Self::TestHelp);
        };
        let test = if op.eq_ignore_ascii_case("report") {
            let [kind, param] = rest else {
                return Err(CommandError::BadArguments);
            };
            FaultTest::Report {
                kind: parse_kind(kind)?,
                param: parse_u32(param)?,
            }
        } else if op.eq_ignore_ascii_case("stack") && rest.is_empty() {
            FaultTest::StackOverflow
        } else if op.eq_ignore_ascii_case("ptr") && rest.is_empty() {
            FaultTest::BadPointer
        } else {
            return Err(CommandError::UnknownTest);
        };
        Ok(Self::Test(test))
    }
}

fn parse_kind(word: &str) -> Result<FaultKind, CommandError> {
    if word.eq_ignore_ascii_case("watchdog") || word.eq_ignore_ascii_case("wdg") {
        return Ok(FaultKind::WatchdogTimeout);
    }
    if word.eq_ignore_ascii_case("exception") {
        return Ok(FaultKind::ProcessorException);
    }
    FaultKind::from_u32(parse_u32(word)?).ok_or(CommandError::BadArguments)
}

fn parse_u32(word: &str) -> Result<u32, CommandError> {
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => word.parse(),
    };
    parsed.map_err(|_| CommandError::BadArguments)
}

/// Normal-mode state the read-only operations report on.
pub struct OperatorContext<'a, F, M> {
    /// The panic region.
    pub region: &'a mut FaultRegion<F>,
    /// Stack monitor.
    pub watermark: &'a StackWatermark,
    /// Memory holding the stack.
    pub stack_memory: &'a M,
    /// Reset flags cached at boot.
    pub reset_flags: ResetFlags,
    /// Reset register value right now.
    pub live_reset_raw: u32,
    /// Size of the flight-recorder image the panic path would dump.
    pub recorder_len: usize,
}

/// Run `command`, writing its output to `out`.
pub fn execute<F, M, W>(
    command: FaultCommand,
    ctx: &mut OperatorContext<'_, F, M>,
    out: &mut W,
) -> Result<CommandOutcome, CommandError>
where
    F: NorFlash,
    M: StackMemory,
    W: Write,
{
    match command {
        FaultCommand::Data => dump_region(ctx, out)?,
        FaultCommand::DataErase => {
            if let Err(e) = ctx.region.clear() {
                writeln!(out, "Flash erase fails")?;
                return Err(RegionError::Store(e).into());
            }
        }
        FaultCommand::Status => status(ctx, out)?,
        FaultCommand::TestHelp => {
            writeln!(out, "Test operations and param(s) are as follows:")?;
            writeln!(out, "  Report fault: usage: fault test report <type> <param>")?;
            writeln!(out, "  Stack overflow: usage: fault test stack")?;
            writeln!(out, "  Bad pointer: usage: fault test ptr")?;
        }
        FaultCommand::Test(test) => return Ok(CommandOutcome::Trigger(test)),
    }
    Ok(CommandOutcome::Done)
}

fn dump_region<F: NorFlash, M, W: Write>(
    ctx: &mut OperatorContext<'_, F, M>,
    out: &mut W,
) -> Result<(), CommandError> {
    let wanted = RECORD_LEN
        .saturating_add(ctx.recorder_len)
        .saturating_add(END_MARKER_LEN);
    let total = u32::try_from(wanted)
        .unwrap_or(u32::MAX)
        .min(ctx.region.size());
    let mut offset = 0u32;
    let mut chunk = [0u8; HEX_BYTES_PER_LINE];
    while offset < total {
        #[allow(clippy::cast_possible_truncation)] // HEX_BYTES_PER_LINE == 32
        let len = total.saturating_sub(offset).min(HEX_BYTES_PER_LINE as u32);
        let line = chunk.get_mut(..len as usize).unwrap_or(&mut []);
        ctx.region.read(offset, line).map_err(RegionError::Store)?;
        writeln!(out, "{}", hex_line(offset, line))?;
        offset = offset.saturating_add(len);
    }
    Ok(())
}

fn status<F, M: StackMemory, W: Write>(
    ctx: &mut OperatorContext<'_, F, M>,
    out: &mut W,
) -> Result<(), CommandError> {
    let bounds = ctx.watermark.bounds();
    let usage = ctx.watermark.high_water_mark(ctx.stack_memory);
    writeln!(
        out,
        "Stack: 0x{:08x} -> 0x{:08x} ({} bytes)",
        bounds.top(),
        bounds.guard_end(),
        bounds.size_bytes()
    )?;
    writeln!(
        out,
        "Stack usage: 0x{:08x} -> 0x{:08x} ({} bytes)",
        bounds.top(),
        usage.deepest,
        usage.used_bytes
    )?;
    writeln!(
        out,
        "RSR: Poweron=0x{:08x} Current=0x{:08x}",
        ctx.reset_flags.0, ctx.live_reset_raw
    )?;
    for (name, mask) in RESET_FLAG_NAMES {
        if ctx.reset_flags.0 & mask != 0 {
            writeln!(out, "     {name} reset bit set in RSR at power on.")?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_commands() {
        assert_eq!(FaultCommand::parse("fault data"), Ok(FaultCommand::Data));
        assert_eq!(
            FaultCommand::parse("FAULT data Erase"),
            Ok(FaultCommand::DataErase)
        );
        assert_eq!(
            FaultCommand::parse("fault data wipe"),
            Err(CommandError::BadArguments)
        );
        assert_eq!(
            FaultCommand::parse("fault data erase now"),
            Err(CommandError::BadArguments)
        );
    }

    #[test]
    fn parses_status_and_help() {
        assert_eq!(FaultCommand::parse("fault status"), Ok(FaultCommand::Status));
        assert_eq!(FaultCommand::parse("fault test"), Ok(FaultCommand::TestHelp));
    }

    #[test]
    fn parses_report_with_numeric_or_named_kind() {
        assert_eq!(
            FaultCommand::parse("fault test report 1 7"),
            Ok(FaultCommand::Test(FaultTest::Report {
                kind: FaultKind::WatchdogTimeout,
                param: 7
            }))
        );
        assert_eq!(
            FaultCommand::parse("fault test report exception 0x10"),
            Ok(FaultCommand::Test(FaultTest::Report {
                kind: FaultKind::ProcessorException,
                param: 16
            }))
        );
        assert_eq!(
            FaultCommand::parse("fault test report 9 1"),
            Err(CommandError::BadArguments)
        );
        assert_eq!(
            FaultCommand::parse("fault test report 1"),
            Err(CommandError::BadArguments)
        );
    }

    #[test]
    fn parses_exception_tests() {
        assert_eq!(
            FaultCommand::parse("fault test stack"),
            Ok(FaultCommand::Test(FaultTest::StackOverflow))
        );
        assert_eq!(
            FaultCommand::parse("fault test ptr"),
            Ok(FaultCommand::Test(FaultTest::BadPointer))
        );
        assert_eq!(
            FaultCommand::parse("fault test divide"),
            Err(CommandError::UnknownTest)
        );
    }

    #[test]
    fn rejects_other_commands() {
        assert_eq!(
            FaultCommand::parse("wdg status"),
            Err(CommandError::NotFaultCommand)
        );
        assert_eq!(FaultCommand::parse(""), Err(CommandError::NotFaultCommand));
        assert_eq!(FaultCommand::parse("fault"), Err(CommandError::BadArguments));
        assert_eq!(
            FaultCommand::parse("fault a b c d e f g"),
            Err(CommandError::BadArguments)
        );
    }
}
