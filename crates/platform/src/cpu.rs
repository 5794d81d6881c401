//! Processor access from panic mode.
//!
//! Everything the fault core needs from the Cortex-M core that cannot be
//! expressed in portable Rust sits behind [`PanicCpu`]: masking interrupts,
//! reading LR/SP, repointing the stack, reading the System Control Block
//! fault registers and resetting the chip. The hardware implementation lives
//! in `firmware::hal::cortex_m`; host tests use [`crate::mocks::MockCpu`].
//!
//! # Exception stack frame (ARMv7-M, basic frame)
//!
//! ```text
//!  SP+28 -> xPSR
//!  SP+24 -> return address
//!  SP+20 -> LR (R14)
//!  SP+16 -> R12
//!  SP+12 -> R3
//!  SP+8  -> R2
//!  SP+4  -> R1
//!  SP    -> R0
//! ```

/// Number of 32-bit words the core pushes on exception entry (basic frame).
pub const EXCEPTION_FRAME_WORDS: usize = 8;

/// Size of the basic exception frame in bytes.
#[allow(clippy::cast_possible_truncation)] // 8 * 4 fits in u32
pub const EXCEPTION_FRAME_BYTES: u32 = (EXCEPTION_FRAME_WORDS * 4) as u32;

/// Continuation invoked on the panic stack by [`PanicCpu::switch_stack_to`].
///
/// Receives the opaque argument passed to `switch_stack_to` in `r0`. The
/// ABI is `C-unwind` so a host reset, which unwinds, can leave through it.
pub type PanicContinuation = unsafe extern "C-unwind" fn(*mut ()) -> !;

/// The eight words the core stacks on exception entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExceptionFrame {
    /// R0
    pub r0: u32,
    /// R1
    pub r1: u32,
    /// R2
    pub r2: u32,
    /// R3
    pub r3: u32,
    /// R12
    pub r12: u32,
    /// Link register at the time of the exception.
    pub lr: u32,
    /// Address of the instruction that was executing (or next to execute).
    pub return_address: u32,
    /// Program status register.
    pub xpsr: u32,
}

impl ExceptionFrame {
    /// All-zero frame: used when no frame applies or it could not be read safely.
    pub const ZERO: Self = Self {
        r0: 0,
        r1: 0,
        r2: 0,
        r3: 0,
        r12: 0,
        lr: 0,
        return_address: 0,
        xpsr: 0,
    };

    /// Build a frame from words in stacking order.
    #[must_use]
    #[allow(clippy::indexing_slicing)] // constant indices into a fixed [u32; 8]
    pub const fn from_words(w: [u32; EXCEPTION_FRAME_WORDS]) -> Self {
        Self {
            r0: w[0],
            r1: w[1],
            r2: w[2],
            r3: w[3],
            r12: w[4],
            lr: w[5],
            return_address: w[6],
            xpsr: w[7],
        }
    }

    /// Frame words in stacking order.
    #[must_use]
    pub const fn to_words(&self) -> [u32; EXCEPTION_FRAME_WORDS] {
        [
            self.r0,
            self.r1,
            self.r2,
            self.r3,
            self.r12,
            self.lr,
            self.return_address,
            self.xpsr,
        ]
    }

    /// `true` when every word is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// System Control Block fault/status registers captured at fault time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultStatusRegisters {
    /// Interrupt program status register (active exception number).
    pub ipsr: u32,
    /// Interrupt control and state register.
    pub icsr: u32,
    /// System handler control and state register.
    pub shcsr: u32,
    /// Configurable fault status register (MMFSR | BFSR | UFSR).
    pub cfsr: u32,
    /// HardFault status register.
    pub hfsr: u32,
    /// MemManage fault address register.
    pub mmfar: u32,
    /// BusFault address register.
    pub bfar: u32,
}

/// Narrow hardware boundary used by the panic path.
///
/// Implementations must be usable with interrupts disabled and with every
/// normal peripheral driver potentially broken.
pub trait PanicCpu {
    /// Mask all configurable-priority interrupts (`cpsid i`).
    fn disable_interrupts(&mut self);

    /// Turn the MPU off so introspection cannot raise a MemManage fault.
    fn disable_mpu(&mut self);

    /// Current link register value.
    fn read_link_register(&self) -> u32;

    /// Current (active) stack pointer value.
    fn read_stack_pointer(&self) -> u32;

    /// Number of the exception currently being handled (IPSR), 0 in thread mode.
    fn active_exception(&self) -> u32;

    /// Snapshot of the SCB fault/status registers.
    fn read_fault_status_registers(&self) -> FaultStatusRegisters;

    /// Read `out.len()` consecutive words starting at `addr`.
    ///
    /// # Safety
    ///
    /// `[addr, addr + 4 * out.len())` must be readable memory and `addr`
    /// must be word aligned.
    unsafe fn read_words(&self, addr: u32, out: &mut [u32]);

    /// Point the active stack at `top` and jump to `entry(arg)`.
    ///
    /// Takes no receiver: `entry` usually reborrows the object that owns the
    /// CPU, so no borrow of it may be live across the jump.
    ///
    /// # Safety
    ///
    /// Every stack-resident value of the caller is abandoned. `arg` must
    /// point to memory that is not on the old stack, and `entry` must not
    /// return.
    unsafe fn switch_stack_to(top: u32, arg: *mut (), entry: PanicContinuation) -> !;

    /// Request a system reset (`AIRCR.SYSRESETREQ`). Never returns.
    fn system_reset(&mut self) -> !;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_words_round_trip_in_stacking_order() {
        let words = [0, 1, 2, 3, 12, 0xFFFF_FFF9, 0x0800_1234, 0x2100_0000];
        let frame = ExceptionFrame::from_words(words);
        assert_eq!(frame.r12, 12);
        assert_eq!(frame.return_address, 0x0800_1234);
        assert_eq!(frame.to_words(), words);
    }

    #[test]
    fn zero_frame_is_default() {
        assert!(ExceptionFrame::default().is_zero());
        assert_eq!(EXCEPTION_FRAME_BYTES, 32);
    }
}
