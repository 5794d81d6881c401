//! Architecture boundary tests: run with `cargo test -p firmware --test arch_boundaries`
// Architecture test file: expect/unwrap/panic/cast are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::assertions_on_constants
)]
//!
//! These tests enforce the layering rules of the fault capture firmware:
//!   Rule 1: platform (HAL traits + mocks) must not depend on firmware
//!   Rule 2: `unsafe` stays in the modules that touch raw memory or the CPU
//!   Rule 3: the boot order latches the reset reason first and unleashes
//!           the IWDG only after the panic controller is installed
//!   Rule 4: the linker script leaves the panic sector out of program flash
//!
//! Rules 2 and 4 are checked by embedding source files with `include_str!`
//! and scanning them, so they run on the host with no MCU attached.

/// Verify that the platform HAL crate exposes its core traits without
/// requiring any firmware application types.
///
/// If `platform` accidentally depended on `firmware`, this integration test
/// binary would fail to link (circular dependency: firmware -> platform -> firmware).
#[test]
fn platform_hal_is_independent() {
    fn _assert_cpu_trait_exists<T: platform::PanicCpu>() {}
    fn _assert_watchdog_trait_exists<T: platform::HardwareWatchdog>() {}
    fn _assert_console_trait_exists<T: platform::PollingConsole>() {}
    fn _assert_recorder_trait_exists<T: platform::FlightRecorder>() {}
    fn _assert_reset_trait_exists<T: platform::ResetCauseRegister>() {}

    // Compile-only check; if this test compiles, the boundary is intact.
}

/// Portable fault-core modules: pure logic over traits, no raw memory access.
///
/// Each entry is (path, source). Adding `unsafe` to any of these means the
/// code belongs in `hal` or behind a `PanicCpu`/`StackMemory` method instead.
const SAFE_MODULES: &[(&str, &str)] = &[
    ("fault/record.rs", include_str!("../src/fault/record.rs")),
    ("fault/store.rs", include_str!("../src/fault/store.rs")),
    ("fault/region.rs", include_str!("../src/fault/region.rs")),
    ("fault/dump.rs", include_str!("../src/fault/dump.rs")),
    ("fault/command.rs", include_str!("../src/fault/command.rs")),
    ("watchdog.rs", include_str!("../src/watchdog.rs")),
    ("reset_reason.rs", include_str!("../src/reset_reason.rs")),
    ("stack_watermark.rs", include_str!("../src/stack_watermark.rs")),
    ("exception_handlers.rs", include_str!("../src/exception_handlers.rs")),
];

/// Verify that the portable modules contain no `unsafe` blocks or functions.
#[test]
fn portable_modules_contain_no_unsafe() {
    for (path, source) in SAFE_MODULES {
        for (n, line) in source.lines().enumerate() {
            let code = line.split("//").next().unwrap_or("");
            assert!(
                !code.contains("unsafe"),
                "{path}:{}: `unsafe` outside the hal/cpu boundary: {line}",
                n + 1
            );
        }
    }
}

/// Verify that every `unsafe` block in the panic controller carries a
/// `SAFETY:` comment on one of the lines just above it.
#[test]
fn controller_unsafe_blocks_are_documented() {
    let sources = [
        ("fault/controller.rs", include_str!("../src/fault/controller.rs")),
        ("fault/collector.rs", include_str!("../src/fault/collector.rs")),
        ("fault/slot.rs", include_str!("../src/fault/slot.rs")),
    ];
    for (path, source) in sources {
        let lines: Vec<&str> = source.lines().collect();
        for (n, line) in lines.iter().enumerate() {
            if !line.contains("unsafe {") {
                continue;
            }
            let window = &lines[n.saturating_sub(4)..=n];
            assert!(
                window.iter().any(|l| l.contains("SAFETY:")),
                "{path}:{}: unsafe block without a SAFETY comment",
                n + 1
            );
        }
    }
}

/// Verify that both fault trampolines exist and both move onto the panic
/// stack before dispatching.
///
/// A trampoline that calls into Rust on the faulting stack dies again on a
/// stack overflow, and the fault is never recorded.
#[test]
fn fault_trampolines_switch_to_the_panic_stack() {
    assert!(firmware::exception_handlers::FAULT_TRAMPOLINES_DEFINED);
    let source = include_str!("../src/exception_handlers.rs");
    for symbol in ["HardFault:", "DefaultHandler:"] {
        let body = source
            .split(symbol)
            .nth(1)
            .unwrap_or_else(|| panic!("no {symbol} trampoline"));
        let dispatch = body.find("b {dispatch}").expect("trampoline never dispatches");
        let reload = body.find("ldr r2, =_stack_start").expect("trampoline keeps the faulting stack");
        assert!(reload < dispatch, "{symbol} dispatches before switching stacks");
    }
}

/// Verify that the log shim defines no macro named after a built-in
/// attribute; re-exporting one fails to resolve.
#[test]
fn log_shim_macros_do_not_shadow_builtin_attributes() {
    let source = include_str!("../src/log.rs");
    for builtin in ["warn", "allow", "deny", "forbid", "expect", "test", "cfg"] {
        assert!(
            !source.contains(&format!("macro_rules! {builtin} ")),
            "log.rs defines `{builtin}!`, which clashes with #[{builtin}]"
        );
    }
}

/// Verify that the CPU calls made before `fault_detected` reads LR are
/// inlined, so no `bl` clobbers the return address it records.
#[test]
fn panic_entry_register_reads_are_inlined() {
    let source = include_str!("../src/hal/mod.rs");
    let lines: Vec<&str> = source.lines().collect();
    for method in [
        "fn disable_interrupts(",
        "fn read_link_register(",
        "fn read_stack_pointer(",
    ] {
        let n = lines
            .iter()
            .position(|l| l.contains(method))
            .unwrap_or_else(|| panic!("hal has no {method}"));
        assert!(
            lines[n.saturating_sub(3)..n]
                .iter()
                .any(|l| l.contains("#[inline(always)]")),
            "{method} must be #[inline(always)]"
        );
    }
    let disable = source.split("fn disable_interrupts(").nth(1).unwrap();
    let body = &disable[..disable.find("\n    }").unwrap()];
    assert!(body.contains("cpsid i"));
    assert!(!body.contains("interrupt::disable"));
}

/// Verify that the first boot step latches the reset reason.
///
/// Architecture rule: RCC_RSR must be read and cleared before anything else
/// can reset the part, otherwise the cause of the previous reset is lost.
#[test]
fn boot_sequence_step_0_is_reset_reason() {
    let steps = firmware::boot::BOOT_SEQUENCE_STEPS;
    assert!(!steps.is_empty(), "boot sequence must have steps");
    assert!(
        steps[0].to_lowercase().contains("reset reason"),
        "step 0 must latch the reset reason, got: {}",
        steps[0]
    );
}

/// Verify that the panic controller is installed before the IWDG is
/// unleashed, and that the stack is painted after both, just before the
/// main loop.
///
/// An IWDG that fires before the panic slot is armed resets the part with
/// no record of why.
#[test]
fn boot_sequence_arms_panic_path_before_watchdog() {
    let steps = firmware::boot::BOOT_SEQUENCE_STEPS;
    let position = |needle: &str| {
        steps
            .iter()
            .position(|s| s.to_lowercase().contains(needle))
            .unwrap_or_else(|| panic!("no boot step mentions {needle}"))
    };
    assert!(position("mpu") < position("stack paint"));
    assert!(position("panic controller") < position("iwdg"));
    assert!(position("iwdg") < position("stack paint"));
    assert!(position("stack paint") < position("main loop"));
}

/// Verify that `firmware::boot` exposes `apply_stack_guard_from_peripherals`
/// as a public hardware API function.
///
/// Without the hardware feature (host test runs), the inner block is absent
/// and the test trivially passes.
#[test]
fn stack_guard_fn_is_public_hardware_api() {
    #[cfg(feature = "hardware")]
    {
        let _: fn(platform::StackBounds) -> Result<(), platform::mpu::MpuError> =
            firmware::boot::hardware::apply_stack_guard_from_peripherals;
    }
    let _ = ();
}

/// Verify that the firmware Cargo.toml does not contain `time-driver-any`.
///
/// Architecture rule: `time-driver-any` is banned because it lets Cargo silently
/// choose a timer. The firmware Cargo.toml must explicitly specify
/// `time-driver-tim2`.
#[test]
fn no_time_driver_any_in_cargo_toml() {
    let firmware_cargo = include_str!("../Cargo.toml");
    assert!(
        !firmware_cargo.contains("time-driver-any"),
        "firmware Cargo.toml must not contain `time-driver-any`; use `time-driver-tim2` instead"
    );
}

// ─── memory.x tests ──────────────────────────────────────────────────────────
//
// The panic region is the last 128 KB sector of bank 2. The linker must never
// place code there, or `fault data erase` would wipe part of the image.

/// Verify that memory.x shrinks program flash by exactly one sector.
#[test]
fn memory_x_excludes_panic_sector_from_flash() {
    let memory_x = include_str!("../../../memory.x");
    let flash_line = memory_x
        .lines()
        .find(|l| l.trim_start().starts_with("FLASH"))
        .expect("memory.x must define FLASH");
    assert!(
        flash_line.contains("0x08000000"),
        "FLASH must start at 0x08000000, got: {flash_line}"
    );
    assert!(
        flash_line.contains("2048K - 128K"),
        "FLASH must stop one sector short of 2 MB, got: {flash_line}"
    );
}

/// Verify that memory.x keeps the reserved sector aligned with the store's
/// compile-time region.
#[test]
fn panic_region_is_last_flash_sector() {
    use platform::memory_map::{FLASH_SECTOR_BYTES, FLASH_SIZE_BYTES};

    let store = firmware::PanicStoreConfig::board_default();
    assert_eq!(store.region_size, FLASH_SECTOR_BYTES);
    assert_eq!(store.region_offset + store.region_size, FLASH_SIZE_BYTES);
}

/// Verify that memory.x places RAM (and so the main stack) in DTCM.
///
/// The exception trampolines reload `_stack_start` as the panic stack; it
/// must be the top of the region the collector treats as readable RAM.
#[test]
fn memory_x_stack_starts_at_top_of_dtcm() {
    let memory_x = include_str!("../../../memory.x");
    assert!(
        memory_x.contains("0x20000000"),
        "memory.x must map RAM to DTCM at 0x20000000"
    );
    assert!(
        memory_x.contains("_stack_start = ORIGIN(RAM) + LENGTH(RAM)"),
        "memory.x must put _stack_start at the top of RAM"
    );
}
