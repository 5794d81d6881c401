//! Millisecond tick source.

/// Monotonic milliseconds since boot.
///
/// Must stay readable with interrupts disabled; a stale value is
/// acceptable, a hang is not.
pub trait MillisClock {
    /// Milliseconds since boot, wrapping at `u32::MAX`.
    fn milliseconds_since_boot(&self) -> u32;
}
