//! Hardware implementations of the platform seams for the STM32H743.
//!
//! Everything here is polling and interrupt-free unless noted: these types
//! are the collaborators of the panic path, which runs with interrupts
//! masked and the executor abandoned.
//!
//! | Seam | Type | Backing |
//! |------|------|---------|
//! | `PanicCpu` | [`CortexMCpu`] | inline asm, `cortex_m` SCB/MPU |
//! | `HardwareWatchdog` | [`Iwdg`] | raw `IWDG1_KR` write |
//! | `HardwareWatchdog` | [`EmbassyIwdg`] | `embassy_stm32::wdg` (normal mode) |
//! | `ResetCauseRegister` | [`RccResetCause`] | raw `RCC_RSR` |
//! | `PollingConsole` | [`PanicUart`] | raw USART3 TDR polling |
//! | `MillisClock` | [`EmbassyClock`] | `embassy_time::Instant` |
//! | `StackMemory` | [`StackRam`] | volatile word access |
//! | `NorFlash` | `embassy_stm32::flash::Flash<Blocking>` | blocking flash driver |

#![allow(unsafe_code)]

use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::peripherals::{FLASH, IWDG1};
use embassy_stm32::wdg::IndependentWatchdog;
use platform::cpu::{FaultStatusRegisters, PanicContinuation, PanicCpu};
use platform::memory_map::{
    DTCM_END, IWDG1_KR, IWDG_KEY_RELOAD, RCC_RSR, USART3_ISR, USART3_TDR, USART_ISR_TXE,
};
use platform::{
    HardwareWatchdog, MillisClock, PollingConsole, ResetCauseRegister, StackBounds,
};

use crate::boot;
use crate::fault::command::FaultTest;
use crate::fault::{PanicBoard, PanicController, PanicSlot};
use crate::flight_recorder::RingRecorder;
use crate::stack_watermark::StackMemory;

/// Size of the flight recorder image dumped at panic time.
pub const BOARD_RECORDER_BYTES: usize = 2048;

/// Flight recorder shared by every task; frozen by the panic path.
pub static FLIGHT_RECORDER: RingRecorder<BOARD_RECORDER_BYTES> = RingRecorder::new();

/// Collaborator set of the STM32H743 board.
pub struct Stm32h743Board;

impl PanicBoard for Stm32h743Board {
    type Cpu = CortexMCpu;
    type Watchdog = Iwdg;
    type Recorder = &'static RingRecorder<BOARD_RECORDER_BYTES>;
    type Clock = EmbassyClock;
    type Console = PanicUart;
    type Flash = Flash<'static, Blocking>;
}

/// Panic controller for this board.
pub type BoardController = PanicController<Stm32h743Board>;

/// One-shot hand-off from the supervisor and the exception trampolines to
/// the panic controller.
pub static PANIC_SLOT: PanicSlot<BoardController> = PanicSlot::new();

// ── Processor ────────────────────────────────────────────────────────────────

/// Cortex-M7 processor boundary.
pub struct CortexMCpu;

impl PanicCpu for CortexMCpu {
    // Inline `cpsid`: an out-of-line call here would clobber the LR that
    // `fault_detected` reads next.
    #[inline(always)]
    fn disable_interrupts(&mut self) {
        // SAFETY: masking interrupts cannot break memory safety.
        unsafe { core::arch::asm!("cpsid i", options(nostack, preserves_flags)) };
    }

    fn disable_mpu(&mut self) {
        // SAFETY: privileged code; disabling the MPU only widens access, and
        // the barriers make it effective before the next memory access.
        unsafe { (*cortex_m::peripheral::MPU::PTR).ctrl.write(0) };
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    #[inline(always)]
    fn read_link_register(&self) -> u32 {
        let lr: u32;
        // SAFETY: register move, no memory access.
        unsafe { core::arch::asm!("mov {}, lr", out(reg) lr, options(nomem, nostack, preserves_flags)) };
        lr
    }

    #[inline(always)]
    fn read_stack_pointer(&self) -> u32 {
        let sp: u32;
        // SAFETY: register move, no memory access.
        unsafe { core::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
        sp
    }

    fn active_exception(&self) -> u32 {
        let ipsr: u32;
        // SAFETY: special-register read, no memory access.
        unsafe { core::arch::asm!("mrs {}, IPSR", out(reg) ipsr, options(nomem, nostack, preserves_flags)) };
        ipsr & 0x1FF
    }

    fn read_fault_status_registers(&self) -> FaultStatusRegisters {
        // SAFETY: the SCB is always mapped and these registers are read-only
        // from our side; reading has no side effects.
        let scb = unsafe { &*cortex_m::peripheral::SCB::PTR };
        FaultStatusRegisters {
            ipsr: self.active_exception(),
            icsr: scb.icsr.read(),
            shcsr: scb.shcsr.read(),
            cfsr: scb.cfsr.read(),
            hfsr: scb.hfsr.read(),
            mmfar: scb.mmfar.read(),
            bfar: scb.bfar.read(),
        }
    }

    unsafe fn read_words(&self, addr: u32, out: &mut [u32]) {
        let base = addr as *const u32;
        for (i, word) in out.iter_mut().enumerate() {
            // SAFETY: the caller guarantees `[addr, addr + 4 * out.len())` is
            // readable RAM.
            *word = unsafe { core::ptr::read_volatile(base.add(i)) };
        }
    }

    unsafe fn switch_stack_to(top: u32, arg: *mut (), entry: PanicContinuation) -> ! {
        // SAFETY: the caller guarantees `top` is the top of a stack nothing
        // else uses and that `entry` tolerates the abandoned stack.
        unsafe {
            core::arch::asm!(
                "msr msp, {top}",
                "mov sp, {top}",
                "bx {entry}",
                top = in(reg) top,
                entry = in(reg) entry,
                in("r0") arg,
                options(noreturn),
            )
        }
    }

    fn system_reset(&mut self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }
}

// ── Watchdog ─────────────────────────────────────────────────────────────────

/// IWDG1 reload through its key register; usable with interrupts masked.
pub struct Iwdg;

impl HardwareWatchdog for Iwdg {
    fn feed_hardware(&mut self) {
        // SAFETY: IWDG1_KR is a write-only key register; writing the reload
        // key has no effect other than restarting the down-counter.
        unsafe { core::ptr::write_volatile(IWDG1_KR as *mut u32, IWDG_KEY_RELOAD) };
    }
}

/// Normal-mode IWDG handle owned by the main loop.
pub struct EmbassyIwdg(pub IndependentWatchdog<'static, IWDG1>);

impl HardwareWatchdog for EmbassyIwdg {
    fn feed_hardware(&mut self) {
        self.0.pet();
    }
}

// ── Reset cause ──────────────────────────────────────────────────────────────

/// `RCC_RSR` access.
pub struct RccResetCause;

impl ResetCauseRegister for RccResetCause {
    fn read_raw(&self) -> u32 {
        // SAFETY: RCC_RSR is always readable; reading has no side effects.
        unsafe { core::ptr::read_volatile(RCC_RSR as *const u32) }
    }

    fn write_raw(&mut self, value: u32) {
        // SAFETY: RMVF is the only writable bit of RCC_RSR; writing it affects
        // the sticky reset flags and nothing else.
        unsafe { core::ptr::write_volatile(RCC_RSR as *mut u32, value) };
    }
}

// ── Console ──────────────────────────────────────────────────────────────────

const TXE_SPIN_LIMIT: u32 = 100_000;

/// Panic console on USART3, driven by polling the data register.
///
/// Assumes embassy already configured USART3 (baud rate, pins). A byte that
/// cannot be sent within the spin limit is dropped rather than hanging the
/// panic path.
pub struct PanicUart;

impl PanicUart {
    fn put(byte: u8) {
        let mut spins = 0u32;
        // SAFETY: USART3_ISR is a read-only status register.
        while unsafe { core::ptr::read_volatile(USART3_ISR as *const u32) } & USART_ISR_TXE == 0 {
            spins = spins.saturating_add(1);
            if spins >= TXE_SPIN_LIMIT {
                return;
            }
        }
        // SAFETY: TXE is set, so the write is accepted by the transmitter.
        unsafe { core::ptr::write_volatile(USART3_TDR as *mut u32, u32::from(byte)) };
    }
}

impl PollingConsole for PanicUart {
    fn write_line_polling(&mut self, line: &str) {
        for byte in line.bytes() {
            Self::put(byte);
        }
        Self::put(b'\r');
        Self::put(b'\n');
    }
}

// ── Clock ────────────────────────────────────────────────────────────────────

/// Millisecond tick from the embassy time driver (TIM2).
pub struct EmbassyClock;

impl MillisClock for EmbassyClock {
    fn milliseconds_since_boot(&self) -> u32 {
        // Truncation wraps after ~49 days, like the record's timestamp field.
        embassy_time::Instant::now().as_millis() as u32
    }
}

// ── Stack ────────────────────────────────────────────────────────────────────

/// Volatile access to the live main stack.
pub struct StackRam;

impl StackMemory for StackRam {
    fn read_word(&self, addr: u32) -> u32 {
        // SAFETY: callers only pass word-aligned addresses inside the
        // watermark's stack bounds, which lie in DTCM.
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        // SAFETY: as above; painting only touches words below the live SP.
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) };
    }

    #[inline(always)]
    fn current_sp(&self) -> u32 {
        cortex_m::register::msp::read()
    }
}

extern "C" {
    static __sheap: u32;
    static _stack_start: u32;
}

/// Stack bounds from the linker: above `.uninit` (plus the guard) up to
/// `_stack_start`.
pub fn linker_stack_bounds() -> Option<StackBounds> {
    // SAFETY: only the addresses of the linker symbols are taken.
    let (static_end, top) = unsafe {
        (
            core::ptr::addr_of!(__sheap) as u32,
            core::ptr::addr_of!(_stack_start) as u32,
        )
    };
    boot::stack_bounds_above(static_end, top)
}

// ── Flash ────────────────────────────────────────────────────────────────────

/// Blocking flash driver for the panic store.
///
/// The operator console holds the driver built from the `FLASH` peripheral
/// taken at init; the panic store gets a second handle. Both drive the same
/// controller, but the panic path only runs after every other user has been
/// frozen with interrupts masked.
pub fn steal_panic_flash() -> Flash<'static, Blocking> {
    // SAFETY: see above; the two handles are never active at the same time.
    let flash = unsafe { FLASH::steal() };
    Flash::new_blocking(flash)
}

// ── Fault tests ──────────────────────────────────────────────────────────────

/// Execute an operator-requested fault test. Never returns.
pub fn run_fault_test(test: FaultTest) -> ! {
    match test {
        FaultTest::Report { kind, param } => match PANIC_SLOT.take() {
            Some(controller) => controller.fault_detected(kind, param),
            None => cortex_m::peripheral::SCB::sys_reset(),
        },
        FaultTest::StackOverflow => {
            let _ = overflow_stack(0);
            cortex_m::peripheral::SCB::sys_reset()
        }
        FaultTest::BadPointer => {
            // DTCM ends at 0x2002_0000; AXI SRAM starts at 0x2400_0000. The
            // gap is reserved, so the store raises a bus fault.
            // SAFETY: deliberately invalid; the fault is the purpose.
            unsafe { core::ptr::write_volatile(DTCM_END as *mut u32, 0xDEAD_BEEF) };
            cortex_m::peripheral::SCB::sys_reset()
        }
    }
}

#[inline(never)]
#[allow(unconditional_recursion)]
fn overflow_stack(depth: u32) -> u32 {
    let frame = core::hint::black_box([depth; 16]);
    overflow_stack(depth.wrapping_add(1)) ^ frame.len() as u32
}
