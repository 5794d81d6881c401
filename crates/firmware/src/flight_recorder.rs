//! Const-generic, statically allocated flight recorder.
//!
//! `RingRecorder<N>` keeps the most recent bytes of a binary event log in an
//! `N`-byte image that the panic path copies to flash verbatim. Old bytes are
//! overwritten once the ring is full.
//!
//! # Image layout
//!
//! ```text
//! [0..4]  put index into the ring (u32 le)
//! [4..8]  total bytes ever recorded (u32 le, wrapping)
//! [8..N]  ring bytes
//! ```
//!
//! # Concurrency
//!
//! Writers serialise through `critical_section`. The panic path first turns
//! logging off and then reads the image without locking; interrupts are
//! already disabled by then.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use platform::FlightRecorder;

/// Bytes of header in front of the ring.
pub const RECORDER_HEADER_LEN: usize = 8;

/// Fixed-size flight recorder suitable for a `static`.
pub struct RingRecorder<const N: usize> {
    image: UnsafeCell<[u8; N]>,
    enabled: AtomicBool,
}

// SAFETY: all mutation of `image` happens inside a critical section, and the
// only unlocked reader runs with interrupts disabled after logging is off.
unsafe impl<const N: usize> Sync for RingRecorder<N> {}

impl<const N: usize> RingRecorder<N> {
    /// Capacity of the ring in bytes.
    #[allow(clippy::arithmetic_side_effects)] // checked by the assertion in `new`
    pub const RING_LEN: usize = N - RECORDER_HEADER_LEN;

    /// Empty recorder with logging enabled.
    ///
    /// This function is `const` so recorders can be stored in `static`
    /// variables without a runtime initialiser.
    pub const fn new() -> Self {
        assert!(N > RECORDER_HEADER_LEN, "recorder image must exceed its header");
        Self {
            image: UnsafeCell::new([0u8; N]),
            enabled: AtomicBool::new(true),
        }
    }

    /// Whether [`record`](Self::record) currently stores bytes.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Append `event` to the ring, overwriting the oldest bytes when full.
    ///
    /// Does nothing while logging is disabled.
    #[allow(clippy::arithmetic_side_effects)] // ring.len() > 0; indices wrap with %
    pub fn record(&self, event: &[u8]) {
        if !self.is_enabled() {
            return;
        }
        critical_section::with(|_| {
            // SAFETY: writers are serialised by the critical section; the
            // panic-time reader only runs after `enabled` is cleared.
            let image = unsafe { &mut *self.image.get() };
            let (header, ring) = image.split_at_mut(RECORDER_HEADER_LEN);
            let mut put = read_u32(header, 0) as usize % ring.len();
            for &byte in event {
                if let Some(slot) = ring.get_mut(put) {
                    *slot = byte;
                }
                put = (put + 1) % ring.len();
            }
            #[allow(clippy::cast_possible_truncation)] // ring.len() < N fits u32 for any recorder we build
            {
                write_u32(header, 0, put as u32);
                let total = read_u32(header, 4).wrapping_add(event.len() as u32);
                write_u32(header, 4, total);
            }
        });
    }

    /// Copy of the current image.
    pub fn snapshot(&self) -> [u8; N] {
        critical_section::with(|_| {
            // SAFETY: read under the same lock writers take.
            unsafe { *self.image.get() }
        })
    }
}

impl<const N: usize> Default for RingRecorder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FlightRecorder for &RingRecorder<N> {
    fn set_logging_enabled(&mut self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn buffer(&self) -> &[u8] {
        // SAFETY: only called from the panic path, with interrupts disabled and
        // logging turned off, so no writer can be active.
        unsafe { &*self.image.get() }
    }
}

/// Split a recorder image into its ring bytes in chronological order.
///
/// Returns `(older, newer)`; concatenated they are the ring contents from the
/// oldest surviving byte to the newest. Returns `None` if `image` is shorter
/// than the header or its put index is out of range.
pub fn chronological(image: &[u8]) -> Option<(&[u8], &[u8])> {
    let header = image.get(..RECORDER_HEADER_LEN)?;
    let ring = image.get(RECORDER_HEADER_LEN..)?;
    let put = read_u32(header, 0) as usize;
    let total = read_u32(header, 4) as usize;
    if put > ring.len() {
        return None;
    }
    if total < ring.len() {
        return Some((&[], ring.get(..put)?));
    }
    let (newer, older) = ring.split_at(put);
    Some((older, newer))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    if let Some(src) = bytes.get(at..at.saturating_add(4)) {
        word.copy_from_slice(src);
    }
    u32::from_le_bytes(word)
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    if let Some(dst) = bytes.get_mut(at..at.saturating_add(4)) {
        dst.copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn ring_len_excludes_header() {
        assert_eq!(RingRecorder::<24>::RING_LEN, 16);
    }

    #[test]
    fn records_in_order_until_full() {
        let rec = RingRecorder::<24>::new();
        rec.record(b"abc");
        rec.record(b"de");
        let image = rec.snapshot();
        let (older, newer) = chronological(&image).unwrap();
        assert!(older.is_empty());
        assert_eq!(newer, b"abcde");
    }

    #[test]
    fn wraps_and_keeps_newest_bytes() {
        let rec = RingRecorder::<16>::new(); // 8-byte ring
        rec.record(b"0123456789");
        let image = rec.snapshot();
        let (older, newer) = chronological(&image).unwrap();
        let mut joined = older.to_vec();
        joined.extend_from_slice(newer);
        assert_eq!(joined, b"23456789");
    }

    #[test]
    fn disabled_recorder_ignores_events() {
        let rec = RingRecorder::<24>::new();
        rec.record(b"keep");
        let mut handle = &rec;
        handle.set_logging_enabled(false);
        rec.record(b"drop");
        assert!(!rec.is_enabled());
        let (_, newer) = chronological(handle.buffer()).unwrap();
        assert_eq!(newer, b"keep");
    }

    #[test]
    fn buffer_is_the_whole_fixed_image() {
        let rec = RingRecorder::<64>::new();
        let handle = &rec;
        assert_eq!(handle.buffer().len(), 64);
    }

    #[test]
    fn chronological_rejects_corrupt_header() {
        let mut image = [0u8; 16];
        image[0] = 200;
        assert!(chronological(&image).is_none());
        assert!(chronological(&[0u8; 4]).is_none());
    }
}
