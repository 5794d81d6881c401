//! Shared host fixtures: a mock board wired from `platform::mocks`.
#![allow(dead_code)] // not every test binary uses every helper

use std::panic::{catch_unwind, AssertUnwindSafe};

use firmware::fault::{PanicBoard, PanicConfig, PanicController, PanicParts, PanicStoreConfig};
use platform::mocks::{
    MockClock, MockConsole, MockCpu, MockFlash, MockRecorder, MockWatchdog, ResetRequested,
};
use platform::RamBounds;

/// Simulated RAM window: 4 KB at the DTCM base.
pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_WORDS: usize = 1024;
pub const RAM_END: u32 = RAM_BASE + (RAM_WORDS as u32) * 4;

/// Panic region: 2 KB starting one erase sector into a 3 KB mock flash.
pub const REGION_OFFSET: u32 = 1024;
pub const REGION_SIZE: u32 = 2048;
pub const FLASH_SECTORS: usize = 3;

pub struct MockBoard;

impl PanicBoard for MockBoard {
    type Cpu = MockCpu;
    type Watchdog = MockWatchdog;
    type Recorder = MockRecorder;
    type Clock = MockClock;
    type Console = MockConsole;
    type Flash = MockFlash;
}

pub type MockController = PanicController<MockBoard>;

pub fn config() -> PanicConfig {
    PanicConfig {
        ram: RamBounds::new(RAM_BASE, RAM_END).unwrap(),
        panic_stack_top: RAM_END,
        store: PanicStoreConfig::new(REGION_OFFSET, REGION_SIZE),
    }
}

pub fn parts(recorder: &[u8], now_ms: u32) -> PanicParts<MockBoard> {
    PanicParts {
        cpu: MockCpu::new(RAM_BASE, RAM_WORDS),
        watchdog: MockWatchdog::new(),
        recorder: MockRecorder::new(recorder),
        clock: MockClock::new(now_ms),
        console: MockConsole::new(),
    }
}

pub fn controller(recorder: &[u8], now_ms: u32) -> MockController {
    controller_with(parts(recorder, now_ms), MockFlash::new(FLASH_SECTORS), config())
}

pub fn controller_with(
    parts: PanicParts<MockBoard>,
    flash: MockFlash,
    config: PanicConfig,
) -> MockController {
    PanicController::new(parts, flash, config)
}

/// Run a diverging panic entry and assert that it ended in a system reset.
pub fn expect_reset(f: impl FnOnce()) {
    let payload = catch_unwind(AssertUnwindSafe(f)).expect_err("panic path returned");
    assert!(
        payload.downcast_ref::<ResetRequested>().is_some(),
        "panic path unwound with something other than a reset request"
    );
}

/// The panic region as seen by the store's flash.
pub fn region(controller: &MockController) -> &[u8] {
    let start = REGION_OFFSET as usize;
    &controller.store().flash().contents()[start..start + REGION_SIZE as usize]
}

/// Deterministic recorder bytes that contain no erased (0xFF) bytes.
pub fn recorder_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
