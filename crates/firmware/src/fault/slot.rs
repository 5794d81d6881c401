//! One-shot handoff of the panic controller to the fault entry points.
//!
//! Normal-mode code builds the controller, installs it here and never touches
//! it again. The first fault entry takes it; any later entry (a fault inside
//! the panic path, or a second watchdog trigger) finds the slot empty and must
//! reset without further work.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use platform::{WatchdogClientId, WatchdogTriggerHandler};

/// Holds at most one `&'static mut T` until a fault entry claims it.
pub struct PanicSlot<T> {
    ptr: AtomicPtr<T>,
}

impl<T> PanicSlot<T> {
    /// Empty slot, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Hand `value` to the slot.
    ///
    /// # Errors
    ///
    /// Gives `value` back if the slot is already occupied.
    pub fn install(&self, value: &'static mut T) -> Result<(), &'static mut T> {
        let raw: *mut T = value;
        match self
            .ptr
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            // SAFETY: `raw` came from the `&'static mut` we were given and was
            // not stored, so we still hold the only reference.
            Err(_) => Err(unsafe { &mut *raw }),
        }
    }

    /// Claim the contents. Returns `Some` exactly once per install.
    pub fn take(&self) -> Option<&'static mut T> {
        let raw = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: a non-null pointer was stored by `install` from a
        // `&'static mut T`, and the swap removes it so no second caller can
        // observe it.
        unsafe { raw.as_mut() }
    }

    /// Something is installed and not yet claimed.
    pub fn is_armed(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for PanicSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The supervisor reaches the controller through the slot, so a watchdog
/// trigger and an exception can never both own it.
impl<T: WatchdogTriggerHandler> WatchdogTriggerHandler for &'static PanicSlot<T> {
    fn on_watchdog_trigger(&mut self, client: WatchdogClientId) -> ! {
        match self.take() {
            Some(handler) => handler.on_watchdog_trigger(client),
            // Already panicking: stop feeding and let the hardware watchdog fire.
            #[allow(clippy::empty_loop)]
            None => loop {},
        }
    }
}
