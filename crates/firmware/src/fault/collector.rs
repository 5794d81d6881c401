//! Diagnostic collector: fills a [`FaultRecord`] from processor state.
//!
//! Stateless apart from the RAM bounds it validates frame pointers against.
//! Nothing here allocates or blocks.

use platform::cpu::{ExceptionFrame, PanicCpu, EXCEPTION_FRAME_BYTES, EXCEPTION_FRAME_WORDS};
use platform::{MillisClock, RamBounds};

use super::record::FaultRecord;

/// Reads fault registers, the timestamp and the stacked exception frame.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticCollector {
    ram: RamBounds,
}

impl DiagnosticCollector {
    /// Collector that trusts frame pointers only inside `ram`.
    pub const fn new(ram: RamBounds) -> Self {
        Self { ram }
    }

    /// RAM window used for frame validation.
    pub const fn ram(&self) -> RamBounds {
        self.ram
    }

    /// `sp` is 8-byte aligned and the whole 32-byte frame above it is RAM.
    pub fn frame_is_readable(&self, sp: u32) -> bool {
        sp.is_multiple_of(8) && self.ram.contains_span(sp, EXCEPTION_FRAME_BYTES)
    }

    /// Copy the hardware-stacked frame at `sp`, or zeros if `sp` is not readable.
    pub fn capture_exception_frame<C: PanicCpu>(&self, cpu: &C, sp: u32) -> ExceptionFrame {
        if !self.frame_is_readable(sp) {
            return ExceptionFrame::ZERO;
        }
        let mut words = [0u32; EXCEPTION_FRAME_WORDS];
        // SAFETY: `sp` is 8-byte aligned and `[sp, sp + 32)` lies inside RAM,
        // checked by `frame_is_readable` above.
        unsafe { cpu.read_words(sp, &mut words) };
        ExceptionFrame::from_words(words)
    }

    /// Fault status registers and timestamp into `record`.
    pub fn collect<C: PanicCpu, K: MillisClock>(
        &self,
        cpu: &C,
        clock: &K,
        record: &mut FaultRecord,
    ) {
        record.status = cpu.read_fault_status_registers();
        record.timestamp_ms = clock.milliseconds_since_boot();
    }
}
