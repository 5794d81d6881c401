//! Memory map constants and address-range newtypes for STM32H743ZI.
//!
//! ## Regions the fault subsystem cares about
//!
//! | Region              | Base Address | Size    | Use |
//! |---------------------|-------------|---------|-----|
//! | DTCM                | 0x2000_0000 | 128 KB  | `.data`, `.bss`, main stack (top of DTCM) |
//! | Flash bank 1 + 2    | 0x0800_0000 | 2 MB    | code, rodata |
//! | Panic region        | 0x081E_0000 | 128 KB  | last sector of bank 2, fault record + flight recorder dump |
//!
//! The panic region is excluded from the `FLASH` memory in `memory.x` so the
//! linker never places code there.
//!
//! ## Peripheral registers touched from panic mode
//!
//! | Register   | Address      | Use |
//! |------------|-------------|-----|
//! | `IWDG1_KR` | 0x5800_4800 | write `0xAAAA` to reload the independent watchdog |
//! | `RCC_RSR`  | 0x5802_44D0 | reset status flags, `RMVF` (bit 16) clears them |
//! | `USART3_TDR` | 0x4000_4828 | polled byte output for the panic console |

// ── RAM ──────────────────────────────────────────────────────────────────────

/// Base address of DTCM RAM (holds `.data`, `.bss` and the main stack).
pub const DTCM_BASE: u32 = 0x2000_0000;

/// Size of DTCM RAM in bytes (128 KB).
pub const DTCM_SIZE_BYTES: u32 = 128 * 1024;

/// One past the last DTCM address; the initial main stack pointer.
#[allow(clippy::arithmetic_side_effects)] // const: 0x2000_0000 + 0x2_0000 cannot overflow
pub const DTCM_END: u32 = DTCM_BASE + DTCM_SIZE_BYTES;

/// Size of the guard block kept between `.uninit` and the lowest painted stack word.
pub const STACK_GUARD_BYTES: u32 = 32;

// ── Flash ────────────────────────────────────────────────────────────────────

/// Base address of internal flash (bank 1).
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Total internal flash size in bytes (2 MB, two banks).
pub const FLASH_SIZE_BYTES: u32 = 2 * 1024 * 1024;

/// Erase granule (sector) size in bytes. STM32H743: 128 KB.
pub const FLASH_SECTOR_BYTES: u32 = 128 * 1024;

/// Program granule ("flash word") size in bytes. STM32H743: 256 bits.
pub const FLASH_WRITE_BYTES: u32 = 32;

/// Worst-case erase time of one sector (datasheet `tERASE128KB` max). The
/// erase is a single blocking operation: nothing can feed a watchdog during it.
pub const FLASH_SECTOR_ERASE_MAX_MS: u32 = 4_000;

/// Offset of the reserved panic region, relative to [`FLASH_BASE`].
///
/// Last sector of bank 2.
#[allow(clippy::arithmetic_side_effects)] // const: 2 MB - 128 KB
pub const PANIC_REGION_OFFSET: u32 = FLASH_SIZE_BYTES - FLASH_SECTOR_BYTES;

/// Size of the reserved panic region in bytes (one sector).
pub const PANIC_REGION_SIZE: u32 = FLASH_SECTOR_BYTES;

// ── Peripheral registers ─────────────────────────────────────────────────────

/// IWDG1 key register. Writing [`IWDG_KEY_RELOAD`] reloads the down-counter.
pub const IWDG1_KR: u32 = 0x5800_4800;

/// Key value that reloads the IWDG counter.
pub const IWDG_KEY_RELOAD: u32 = 0xAAAA;

/// RCC reset status register (`RCC_RSR`, STM32H7).
pub const RCC_RSR: u32 = 0x5802_44D0;

/// USART3 base (Nucleo-H743ZI virtual COM port, PD8/PD9).
pub const USART3_BASE: u32 = 0x4000_4800;

/// USART3 interrupt and status register.
pub const USART3_ISR: u32 = 0x4000_481C;

/// USART3 transmit data register.
pub const USART3_TDR: u32 = 0x4000_4828;

/// `USART_ISR.TXE_TXFNF`: transmit register (or FIFO) can take a byte.
pub const USART_ISR_TXE: u32 = 1 << 7;

// ── Address ranges ───────────────────────────────────────────────────────────

/// A half-open RAM address range `[start, end)`.
///
/// Used to decide whether a stack pointer captured at fault time can be
/// dereferenced without risking a second fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RamBounds {
    start: u32,
    end: u32,
}

impl RamBounds {
    /// DTCM: where the main stack lives on this board.
    pub const DTCM: Self = Self {
        start: DTCM_BASE,
        end: DTCM_END,
    };

    /// Create a range. Returns `None` when `end < start`.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Option<Self> {
        if end < start {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Exclusive upper bound.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// `true` when `[addr, addr + len)` lies entirely inside this range.
    ///
    /// Uses checked arithmetic: a range that would wrap past `u32::MAX`
    /// is never contained.
    #[must_use]
    pub fn contains_span(&self, addr: u32, len: u32) -> bool {
        match addr.checked_add(len) {
            Some(span_end) => addr >= self.start && span_end <= self.end,
            None => false,
        }
    }
}

/// Main stack layout: grows down from `top` towards `guard_end`.
///
/// `guard_end` is the first address above the guard block; words in
/// `[guard_end, top)` are painted at start of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackBounds {
    guard_end: u32,
    top: u32,
}

impl StackBounds {
    /// Create stack bounds. Both addresses must be word aligned and
    /// `guard_end <= top`.
    #[must_use]
    pub const fn new(guard_end: u32, top: u32) -> Option<Self> {
        if guard_end > top || guard_end % 4 != 0 || top % 4 != 0 {
            None
        } else {
            Some(Self { guard_end, top })
        }
    }

    /// Lowest paintable address (just above the guard block).
    #[must_use]
    pub const fn guard_end(&self) -> u32 {
        self.guard_end
    }

    /// Initial stack pointer (one past the highest stack word).
    #[must_use]
    pub const fn top(&self) -> u32 {
        self.top
    }

    /// Stack capacity in bytes.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // guard_end <= top enforced by new()
    pub const fn size_bytes(&self) -> u32 {
        self.top - self.guard_end
    }
}
