//! Stack high-water mark by painting.
//!
//! At start of day every word from [`PAINT_SP_MARGIN_BYTES`] below the
//! current SP down to the guard boundary is filled with
//! [`STACK_PAINT_PATTERN`]. The SP is read inside [`StackWatermark::paint`],
//! so the margin covers paint's own callees. Later, walking up
//! from the guard boundary to the first word that no longer holds the pattern
//! gives the deepest point the stack has ever reached.
//!
//! ```text
//! top (initial SP) ─┐
//!                   │ used at paint time
//! SP at paint ──────┤
//!                   │ margin, left alone
//! ceiling ──────────┤
//!                   │ painted, overwritten as the stack grows
//! deepest ──────────┤
//!                   │ still painted
//! guard_end ────────┘
//! guard block (MPU read-only)
//! ```

use platform::StackBounds;

/// Value written to every unused stack word.
pub const STACK_PAINT_PATTERN: u32 = 0xCAFE_BADD;

/// Bytes below the SP read by `paint` that are never painted.
///
/// Frames pushed by calls made from `paint` (the word accessors when not
/// inlined) sit in this band.
pub const PAINT_SP_MARGIN_BYTES: u32 = 64;

/// Word access to the memory holding the stack.
///
/// The hardware implementation uses volatile accesses to the live stack;
/// tests back it with a plain array.
pub trait StackMemory {
    /// Read the word at `addr`.
    fn read_word(&self, addr: u32) -> u32;

    /// Write `value` at `addr`.
    fn write_word(&mut self, addr: u32, value: u32);

    /// Stack pointer of the caller, read at the point of the call.
    fn current_sp(&self) -> u32;
}

/// Deepest observed stack extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackUsage {
    /// Lowest address that no longer holds the paint pattern (or `top`).
    pub deepest: u32,
    /// Bytes between `deepest` and the stack top.
    pub used_bytes: u32,
    /// Bytes between the guard boundary and `deepest` never touched.
    pub untouched_bytes: u32,
}

/// Paints the stack and reports its high-water mark.
#[derive(Debug, Clone, Copy)]
pub struct StackWatermark {
    bounds: StackBounds,
}

impl StackWatermark {
    /// Monitor over `bounds`.
    pub const fn new(bounds: StackBounds) -> Self {
        Self { bounds }
    }

    /// Stack range being monitored.
    pub const fn bounds(&self) -> StackBounds {
        self.bounds
    }

    /// Fill `[guard_end, sp - PAINT_SP_MARGIN_BYTES)` with the paint pattern,
    /// where `sp` is read from `memory` inside this call.
    ///
    /// The ceiling is clamped into the stack range and rounded down to a word.
    /// Call once, early, from the thread that owns the stack.
    #[inline(never)]
    pub fn paint<M: StackMemory>(&self, memory: &mut M) {
        let sp = memory.current_sp();
        let ceiling = sp.saturating_sub(PAINT_SP_MARGIN_BYTES).min(self.bounds.top()) & !3;
        let mut addr = self.bounds.guard_end();
        while addr < ceiling {
            memory.write_word(addr, STACK_PAINT_PATTERN);
            #[allow(clippy::arithmetic_side_effects)] // addr < ceiling <= u32::MAX - 3
            {
                addr += 4;
            }
        }
    }

    /// Walk up from the guard boundary to the first overwritten word.
    pub fn high_water_mark<M: StackMemory>(&self, memory: &M) -> StackUsage {
        let guard_end = self.bounds.guard_end();
        let top = self.bounds.top();
        let mut addr = guard_end;
        while addr < top && memory.read_word(addr) == STACK_PAINT_PATTERN {
            #[allow(clippy::arithmetic_side_effects)] // addr < top, both word aligned
            {
                addr += 4;
            }
        }
        StackUsage {
            deepest: addr,
            used_bytes: top.saturating_sub(addr),
            untouched_bytes: addr.saturating_sub(guard_end),
        }
    }
}
