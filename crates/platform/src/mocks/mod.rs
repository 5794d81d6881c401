//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests.
//!
//! [`MockCpu::system_reset`] cannot really reset anything, so it unwinds with
//! a [`ResetRequested`] payload. Tests run the panic path under
//! `std::panic::catch_unwind` and treat that payload as the success signal.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::panic)] // mocks report misuse by panicking
#![allow(clippy::indexing_slicing)] // mock memories are bounds-checked explicitly
#![allow(clippy::arithmetic_side_effects)]

use core::cell::Cell;
use std::string::{String, ToString};
use std::vec;
use std::vec::Vec;

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::clock::MillisClock;
use crate::console::PollingConsole;
use crate::cpu::{FaultStatusRegisters, PanicContinuation, PanicCpu};
use crate::flight_recorder::FlightRecorder;
use crate::reset_cause::{ResetCauseRegister, RSR_FLAGS_MASK, RSR_RMVF};
use crate::watchdog::HardwareWatchdog;

std::thread_local! {
    /// Stack top of a switch not yet filed into a `MockCpu` event log.
    static PENDING_STACK_SWITCH: Cell<Option<u32>> = const { Cell::new(None) };
}

/// Unwind payload raised by [`MockCpu::system_reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequested;

/// Operations the mock CPU saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEvent {
    /// `disable_interrupts`
    InterruptsDisabled,
    /// `disable_mpu`
    MpuDisabled,
    /// `switch_stack_to(top)`
    StackSwitched(u32),
    /// `system_reset`
    Reset,
}

/// Mock CPU with a simulated word-addressed RAM window.
pub struct MockCpu {
    /// Value returned by `read_link_register`.
    pub link_register: u32,
    /// Value returned by `read_stack_pointer`.
    pub stack_pointer: u32,
    /// Value returned by `active_exception`.
    pub active_exception: u32,
    /// Value returned by `read_fault_status_registers`.
    pub fault_status: FaultStatusRegisters,
    /// Recorded operations.
    pub events: Vec<CpuEvent>,
    ram_base: u32,
    ram: Vec<u32>,
    reads: Cell<usize>,
}

impl MockCpu {
    /// New CPU whose RAM covers `[ram_base, ram_base + 4 * words)`, zero-filled.
    pub fn new(ram_base: u32, words: usize) -> Self {
        Self {
            link_register: 0,
            stack_pointer: 0,
            active_exception: 0,
            fault_status: FaultStatusRegisters::default(),
            events: Vec::new(),
            ram_base,
            ram: vec![0; words],
            reads: Cell::new(0),
        }
    }

    /// Store `words` into simulated RAM starting at `addr`.
    pub fn poke(&mut self, addr: u32, words: &[u32]) {
        let start = self.index_of(addr);
        self.ram[start..start + words.len()].copy_from_slice(words);
    }

    /// Number of `read_words` calls made so far.
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    /// `true` once `disable_interrupts` has been called.
    pub fn interrupts_disabled(&self) -> bool {
        self.events.contains(&CpuEvent::InterruptsDisabled)
    }

    /// `true` once `disable_mpu` has been called.
    pub fn mpu_disabled(&self) -> bool {
        self.events.contains(&CpuEvent::MpuDisabled)
    }

    /// Stack top passed to `switch_stack_to`, if it was called.
    pub fn switched_stack(&self) -> Option<u32> {
        self.events.iter().find_map(|e| match e {
            CpuEvent::StackSwitched(top) => Some(*top),
            _ => None,
        })
    }

    /// Append `event`, filing a pending stack switch first.
    ///
    /// `switch_stack_to` has no receiver, so the switch lands in the log at
    /// the next operation of the CPU that continued on the new stack.
    fn note(&mut self, event: CpuEvent) {
        if let Some(top) = PENDING_STACK_SWITCH.with(Cell::take) {
            self.events.push(CpuEvent::StackSwitched(top));
        }
        self.events.push(event);
    }

    fn index_of(&self, addr: u32) -> usize {
        assert!(addr % 4 == 0, "unaligned mock RAM access at {addr:#010x}");
        assert!(
            addr >= self.ram_base,
            "mock RAM access below base at {addr:#010x}"
        );
        let index = ((addr - self.ram_base) / 4) as usize;
        assert!(
            index < self.ram.len(),
            "mock RAM access past end at {addr:#010x}"
        );
        index
    }
}

impl PanicCpu for MockCpu {
    fn disable_interrupts(&mut self) {
        self.note(CpuEvent::InterruptsDisabled);
    }

    fn disable_mpu(&mut self) {
        self.note(CpuEvent::MpuDisabled);
    }

    fn read_link_register(&self) -> u32 {
        self.link_register
    }

    fn read_stack_pointer(&self) -> u32 {
        self.stack_pointer
    }

    fn active_exception(&self) -> u32 {
        self.active_exception
    }

    fn read_fault_status_registers(&self) -> FaultStatusRegisters {
        self.fault_status
    }

    unsafe fn read_words(&self, addr: u32, out: &mut [u32]) {
        self.reads.set(self.reads.get() + 1);
        let start = self.index_of(addr);
        let end = start + out.len();
        assert!(end <= self.ram.len(), "mock RAM read past end");
        out.copy_from_slice(&self.ram[start..end]);
    }

    unsafe fn switch_stack_to(top: u32, arg: *mut (), entry: PanicContinuation) -> ! {
        PENDING_STACK_SWITCH.with(|pending| pending.set(Some(top)));
        // SAFETY: the caller upholds `entry`'s contract for `arg`.
        unsafe { entry(arg) }
    }

    fn system_reset(&mut self) -> ! {
        self.note(CpuEvent::Reset);
        std::panic::panic_any(ResetRequested)
    }
}

/// Counts hardware watchdog reloads.
#[derive(Debug, Default)]
pub struct MockWatchdog {
    /// Number of `feed_hardware` calls.
    pub feeds: usize,
}

impl MockWatchdog {
    /// New watchdog with zero feeds.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HardwareWatchdog for MockWatchdog {
    fn feed_hardware(&mut self) {
        self.feeds += 1;
    }
}

/// Settable millisecond clock.
#[derive(Debug, Default)]
pub struct MockClock {
    now_ms: Cell<u32>,
}

impl MockClock {
    /// Clock reading `now_ms`.
    pub fn new(now_ms: u32) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
        }
    }

    /// Move the clock to `now_ms`.
    pub fn set(&self, now_ms: u32) {
        self.now_ms.set(now_ms);
    }

    /// Advance the clock by `ms`.
    pub fn advance(&self, ms: u32) {
        self.now_ms.set(self.now_ms.get().wrapping_add(ms));
    }
}

impl MillisClock for MockClock {
    fn milliseconds_since_boot(&self) -> u32 {
        self.now_ms.get()
    }
}

/// Captures console lines.
#[derive(Debug, Default)]
pub struct MockConsole {
    /// Every line written, without the line terminator.
    pub lines: Vec<String>,
}

impl MockConsole {
    /// Empty console.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl PollingConsole for MockConsole {
    fn write_line_polling(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// Fixed-content flight recorder.
#[derive(Debug, Default)]
pub struct MockRecorder {
    /// Recorder bytes returned by `buffer`.
    pub bytes: Vec<u8>,
    /// Current live-logging state.
    pub logging_enabled: bool,
}

impl MockRecorder {
    /// Recorder holding `bytes`, logging enabled.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            logging_enabled: true,
        }
    }
}

impl FlightRecorder for MockRecorder {
    fn set_logging_enabled(&mut self, enabled: bool) {
        self.logging_enabled = enabled;
    }

    fn buffer(&self) -> &[u8] {
        &self.bytes
    }
}

/// Reset-cause register with sticky flags, an `RMVF` latch and access counters.
///
/// While `RMVF` is set the flags read as 0 and [`MockResetCause::hardware_reset`]
/// cannot latch a new one, as on the STM32H7.
#[derive(Debug, Default)]
pub struct MockResetCause {
    raw: u32,
    reads: Cell<usize>,
    /// Number of `clear` calls that ended with `RMVF` released.
    pub clears: usize,
}

impl MockResetCause {
    /// Register holding `raw`.
    pub fn new(raw: u32) -> Self {
        Self {
            raw,
            reads: Cell::new(0),
            clears: 0,
        }
    }

    /// Current raw value without counting as a hardware read.
    pub fn peek(&self) -> u32 {
        self.raw
    }

    /// Number of `read_raw` calls.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// `true` while `RMVF` holds the flags cleared.
    pub fn flags_held(&self) -> bool {
        self.raw & RSR_RMVF != 0
    }

    /// A reset that is not a power-on: latch `flags` unless `RMVF` holds them.
    pub fn hardware_reset(&mut self, flags: u32) {
        if !self.flags_held() {
            self.raw |= flags & RSR_FLAGS_MASK;
        }
    }
}

impl ResetCauseRegister for MockResetCause {
    fn read_raw(&self) -> u32 {
        self.reads.set(self.reads.get() + 1);
        self.raw
    }

    fn write_raw(&mut self, value: u32) {
        let flags = if value & RSR_RMVF != 0 {
            0
        } else {
            self.raw & RSR_FLAGS_MASK
        };
        let was_held = self.flags_held();
        self.raw = (self.raw & !(RSR_FLAGS_MASK | RSR_RMVF)) | flags | (value & RSR_RMVF);
        if was_held && !self.flags_held() {
            self.clears += 1;
        }
    }
}

/// NOR flash simulator: erased bytes read `0xFF`, programming can only clear bits.
pub struct MockFlash {
    data: Vec<u8>,
    /// Number of successful `erase` calls.
    pub erases: usize,
    /// Number of successful `write` calls.
    pub writes: usize,
    /// Number of writes that landed on bytes that were not erased.
    pub dirty_writes: usize,
    /// Fail every erase with `NorFlashErrorKind::Other`.
    pub fail_erase: bool,
    /// Fail the n-th write (0-based) with `NorFlashErrorKind::Other`.
    pub fail_write_at: Option<usize>,
    write_attempts: usize,
}

impl MockFlash {
    /// Erased flash of `sectors * ERASE_SIZE` bytes.
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0xFF; sectors * <Self as NorFlash>::ERASE_SIZE],
            erases: 0,
            writes: 0,
            dirty_writes: 0,
            fail_erase: false,
            fail_write_at: None,
            write_attempts: 0,
        }
    }

    /// Raw flash contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite flash contents directly, bypassing NOR rules.
    pub fn preload(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 32;
    const ERASE_SIZE: usize = 1024;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        self.data[from as usize..to as usize].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        let attempt = self.write_attempts;
        self.write_attempts += 1;
        if self.fail_write_at == Some(attempt) {
            return Err(NorFlashErrorKind::Other);
        }
        let start = offset as usize;
        let target = &mut self.data[start..start + bytes.len()];
        if target.iter().any(|b| *b != 0xFF) {
            self.dirty_writes += 1;
        }
        for (cell, byte) in target.iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_flash_starts_erased_and_programs_by_and() {
        let mut flash = MockFlash::new(1);
        assert!(flash.contents().iter().all(|b| *b == 0xFF));
        flash.write(0, &[0x0F; 32]).unwrap();
        flash.write(0, &[0xF1; 32]).unwrap();
        assert_eq!(flash.contents()[0], 0x01);
        assert_eq!(flash.dirty_writes, 1);
    }

    #[test]
    fn mock_flash_rejects_unaligned_write() {
        let mut flash = MockFlash::new(1);
        assert_eq!(
            flash.write(4, &[0; 32]),
            Err(NorFlashErrorKind::NotAligned)
        );
    }

    #[test]
    fn mock_reset_cause_clear_keeps_non_flag_bits() {
        let mut rsr = MockResetCause::new((1 << 26) | 0x3);
        rsr.clear();
        assert_eq!(rsr.peek(), 0x3);
        assert_eq!(rsr.clears, 1);
    }

    #[test]
    fn mock_reset_cause_holds_flags_while_rmvf_is_set() {
        let mut rsr = MockResetCause::new(1 << 23);
        rsr.write_raw(RSR_RMVF);
        rsr.hardware_reset(1 << 26);
        assert_eq!(rsr.peek() & RSR_FLAGS_MASK, 0);
        assert!(rsr.flags_held());

        rsr.write_raw(0);
        rsr.hardware_reset(1 << 26);
        assert_eq!(rsr.peek(), 1 << 26);
        assert_eq!(rsr.clears, 1);
    }

    #[test]
    fn mock_cpu_reset_unwinds_with_marker() {
        let result = std::panic::catch_unwind(|| {
            let mut cpu = MockCpu::new(0x2000_0000, 16);
            cpu.system_reset();
        });
        let payload = result.unwrap_err();
        assert!(payload.downcast_ref::<ResetRequested>().is_some());
    }

    unsafe extern "C-unwind" fn reset_on_new_stack(cpu: *mut ()) -> ! {
        // SAFETY: the test passes a pointer to a live `MockCpu`.
        let cpu = unsafe { &mut *cpu.cast::<MockCpu>() };
        cpu.system_reset()
    }

    #[test]
    fn reset_unwinds_out_of_a_stack_switch() {
        let mut cpu = MockCpu::new(0x2000_0000, 16);
        let arg: *mut MockCpu = &mut cpu;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: `arg` outlives the call and nothing else borrows `cpu`.
            unsafe { MockCpu::switch_stack_to(0x2000_0040, arg.cast(), reset_on_new_stack) }
        }));
        let payload = result.unwrap_err();
        assert!(payload.downcast_ref::<ResetRequested>().is_some());
        assert_eq!(
            cpu.events,
            vec![CpuEvent::StackSwitched(0x2000_0040), CpuEvent::Reset]
        );
        assert_eq!(cpu.switched_stack(), Some(0x2000_0040));
    }
}
