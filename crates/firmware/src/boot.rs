//! Hardware boot sequence for the fault capture subsystem.
//!
//! Initialization order (MUST be respected):
//!   1. Latch and clear the reset reason (RCC_RSR)
//!   2. Program the MPU stack guard below the stack
//!   3. Configure clocks via `embassy_stm32::init`
//!   4. Build the panic controller and install it in the panic slot
//!   5. Register the supervisor's trigger handler, then start the IWDG
//!   6. Paint the free stack with the watermark pattern
//!   7. Main loop: supervisor checks + operator console
//!
//! # Safety
//! Steps 1-2 run from privileged mode before any task or interrupt handler.

use platform::mpu::{MpuApplier, MpuError};
use platform::memory_map::STACK_GUARD_BYTES;
use platform::StackBounds;

use crate::watchdog::SupervisorConfig;

/// Ordered list of boot sequence steps for documentation and testing.
///
/// # Correctness Invariants
///
/// - The reset reason is read before anything can trigger a reset of its own,
///   and cleared so the next boot sees only fresh flags.
/// - The guard is armed before anything can grow the stack into `.bss`.
/// - The panic controller is installed before the IWDG is unleashed, so a
///   supervisor timeout always finds a controller to hand off to.
/// - The stack is painted last, once every collaborator is registered, so
///   the watermark only measures the main loop and what it calls.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. Reset reason: latch RCC_RSR flags, then clear them with RMVF",
    "2. MPU: read-only guard region below the stack",
    "3. Clocks: embassy_stm32::init with the board RCC config",
    "4. Panic controller: build and install in the panic slot",
    "5. Watchdog: register supervisor trigger handler, unleash IWDG",
    "6. Stack paint: fill free stack with the watermark pattern",
    "7. Main loop: supervisor checks + operator console",
];

/// Stack growing down from `top` towards `static_end` (end of `.uninit`),
/// with one aligned guard block kept in between.
pub fn stack_bounds_above(static_end: u32, top: u32) -> Option<StackBounds> {
    let guard_base = static_end.checked_next_multiple_of(STACK_GUARD_BYTES)?;
    StackBounds::new(guard_base.checked_add(STACK_GUARD_BYTES)?, top)
}

/// Base of the 32-byte guard block sitting directly below `stack`.
pub fn stack_guard_base(stack: StackBounds) -> u32 {
    stack.guard_end().saturating_sub(STACK_GUARD_BYTES)
}

/// `(RBAR, RASR)` for the guard block below `stack`.
///
/// Pure math, no hardware access. See [`hardware::apply_stack_guard`].
pub fn stack_guard_register_pair(stack: StackBounds) -> Result<(u32, u32), MpuError> {
    MpuApplier::stack_guard_pair(stack_guard_base(stack))
}

/// IWDG timeout in microseconds for `IndependentWatchdog::new`.
pub fn iwdg_timeout_us(config: &SupervisorConfig) -> u32 {
    config.hardware_timeout_ms.saturating_mul(1_000)
}

// ── RCC clock configuration ───────────────────────────────────────────────────

/// Build the `embassy_stm32::Config` for the STM32H743.
///
/// # Clock Tree (HSI → 400 MHz core)
///
/// HSI (64 MHz) → PLL1 (prediv=4, mul=50) → PLL1_P = 400 MHz (sys)
/// AHB prescaler: DIV2 → 200 MHz
/// APB1/2/3/4:    DIV2 → 100 MHz (USART3 kernel clock on APB1)
///
/// Flash wait states follow from the AHB clock and voltage scale; embassy
/// programs them during `init`, which the panic-path flash driver relies on.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc::*;

    let mut config = embassy_stm32::Config::default();

    config.rcc.hsi = Some(HSIPrescaler::DIV1);
    config.rcc.csi = true;

    // HSI (64 MHz) / prediv(4) = 16 MHz → × mul(50) = 800 MHz VCO
    // PLL1_P = VCO / divp(2) = 400 MHz  → system clock
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSI,
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL50,
        divp: Some(PllDiv::DIV2),
        divq: None,
        divr: None,
    });

    config.rcc.sys = Sysclk::PLL1_P; // 400 MHz
    config.rcc.ahb_pre = AHBPrescaler::DIV2; // 200 MHz
    config.rcc.apb1_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb2_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb3_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.apb4_pre = APBPrescaler::DIV2; // 100 MHz
    config.rcc.voltage_scale = VoltageScale::Scale1;

    config
}

// ── Hardware-only init ────────────────────────────────────────────────────────
//
// Actual register writes using `cortex_m` peripheral types. Host tests never
// compile or link this module.

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Actual hardware register write implementations.
    //! Only compiled when targeting real hardware (`--features hardware`).

    use platform::mpu::{MpuApplier, MpuError};
    use platform::StackBounds;

    /// Program the stack guard region into the Cortex-M7 MPU.
    ///
    /// # Safety
    ///
    /// - Must be called from privileged mode.
    /// - Nothing may live in the guard block: every write to it faults once
    ///   this returns.
    #[allow(unsafe_code)]
    pub unsafe fn apply_stack_guard(
        mpu: &mut cortex_m::peripheral::MPU,
        stack: StackBounds,
    ) -> Result<(), MpuError> {
        let (rbar, rasr) = super::stack_guard_register_pair(stack)?;

        // Disable MPU before reconfiguring (ARM DDI0489F §B3.5.1).
        unsafe {
            mpu.ctrl.write(0);
        }

        // RBAR has VALID=1, so the write selects the region slot itself.
        unsafe {
            mpu.rbar.write(rbar);
            mpu.rasr.write(rasr);
        }

        // ENABLE | PRIVDEFENA: everything outside the guard keeps the default map.
        unsafe {
            mpu.ctrl.write(MpuApplier::CTRL_ENABLE_PRIVDEFENA);
        }

        cortex_m::asm::isb();
        cortex_m::asm::dsb();
        Ok(())
    }

    /// Zero-argument entry point for `main.rs`.
    ///
    /// Steals the Cortex-M peripherals singleton for the duration of the call.
    /// The stolen reference is dropped before `embassy_stm32::init()` takes
    /// the peripherals through its own path.
    #[allow(unsafe_code)]
    pub fn apply_stack_guard_from_peripherals(stack: StackBounds) -> Result<(), MpuError> {
        // SAFETY: called once at boot before any task or interrupt handler has
        // started. No other code holds Cortex-M peripherals yet.
        let mut cp = unsafe { cortex_m::Peripherals::steal() };
        // SAFETY: privileged boot context; the guard block lies between the
        // end of static data and the painted stack, so nothing lives in it.
        unsafe { apply_stack_guard(&mut cp.MPU, stack) }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
