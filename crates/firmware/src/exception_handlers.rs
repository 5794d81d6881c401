//! Cortex-M exception handlers for the fault capture path.
//!
//! Every fault-class exception (HardFault, MemManage, BusFault, UsageFault)
//! and every unhandled interrupt lands in one of two tiny assembly
//! trampolines:
//!
//! - **HardFault** overrides cortex-m-rt's default symbol.
//! - **DefaultHandler** catches MemManage, BusFault, UsageFault (none of them
//!   get a dedicated handler) plus any interrupt without one.
//!
//! Each trampoline:
//!
//! 1. selects the stack the processor pushed the exception frame on from
//!    `EXC_RETURN` bit 2 (MSP or PSP) and passes it in `r0`,
//! 2. passes `EXC_RETURN` itself in `r1`,
//! 3. loads the top of RAM (`_stack_start`) into SP, so a stack overflow
//!    cannot take the handler down with it,
//! 4. branches to [`fault_exception_dispatch`], which never returns.
//!
//! # Stack Overflow Protection
//!
//! The MPU guard programmed at boot (see [`crate::boot`]) makes the first
//! write below the stack raise MemManage. The trampoline's stack reload is
//! what lets the panic path run after that.
//!
//! # Hardware-only handler
//!
//! The assembly requires ARM target intrinsics and is therefore gated behind
//! `#[cfg(feature = "hardware")]`. The module itself (and
//! `FAULT_TRAMPOLINES_DEFINED`) compiles unconditionally so host tests can
//! verify it exists without an ARM toolchain.

#![allow(clippy::doc_markdown)] // Exception handler docs use hardware terminology (HardFault, MSP) as plain text

/// Marker constant: confirmed by arch tests to verify this module exists.
pub const FAULT_TRAMPOLINES_DEFINED: bool = true;

/// `EXC_RETURN` bit 2: the exception frame was stacked on PSP.
pub const EXC_RETURN_USES_PSP: u32 = 1 << 2;

/// Stack pointer holding the exception frame for a given `EXC_RETURN`.
///
/// Mirrors the `tst lr, #4` selection in the trampolines.
pub fn frame_stack_pointer(exc_return: u32, msp: u32, psp: u32) -> u32 {
    if exc_return & EXC_RETURN_USES_PSP == 0 {
        msp
    } else {
        psp
    }
}

#[cfg(feature = "hardware")]
core::arch::global_asm!(
    ".section .text.HardFault, \"ax\"",
    ".global HardFault",
    ".type HardFault, %function",
    ".thumb_func",
    "HardFault:",
    "    mov r1, lr",
    "    tst r1, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    ldr r2, =_stack_start",
    "    mov sp, r2",
    "    b {dispatch}",
    "",
    ".section .text.DefaultHandler, \"ax\"",
    ".global DefaultHandler",
    ".type DefaultHandler, %function",
    ".thumb_func",
    "DefaultHandler:",
    "    mov r1, lr",
    "    tst r1, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    ldr r2, =_stack_start",
    "    mov sp, r2",
    "    b {dispatch}",
    dispatch = sym fault_exception_dispatch,
);

/// Hand a processor exception to the installed panic controller.
///
/// Runs on the panic stack. With no controller installed (fault during early
/// boot) the board is reset straight away.
#[cfg(feature = "hardware")]
extern "C" fn fault_exception_dispatch(frame_sp: u32, exc_return: u32) -> ! {
    match crate::hal::PANIC_SLOT.take() {
        Some(controller) => controller.exception_entry(frame_sp, exc_return),
        None => cortex_m::peripheral::SCB::sys_reset(),
    }
}
