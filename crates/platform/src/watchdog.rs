//! Watchdog abstractions.
//!
//! Two layers:
//! - [`HardwareWatchdog`]: the independent watchdog (IWDG) reload. The panic
//!   path calls this between long blocking operations.
//! - [`WatchdogTriggerHandler`]: what a software-watchdog supervisor calls when
//!   a supervised client misses its deadline. The panic controller implements
//!   it, so the call never returns.

/// Identifier of a software-watchdog client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchdogClientId(pub u32);

/// Independent hardware watchdog reload.
pub trait HardwareWatchdog {
    /// Reload the hardware down-counter. Safe with interrupts disabled.
    fn feed_hardware(&mut self);
}

/// Receives the "client timed out" notification from the supervisor.
pub trait WatchdogTriggerHandler {
    /// Called once, with the first client found expired. Must not return.
    fn on_watchdog_trigger(&mut self, client: WatchdogClientId) -> !;
}

impl<T: HardwareWatchdog + ?Sized> HardwareWatchdog for &mut T {
    fn feed_hardware(&mut self) {
        (**self).feed_hardware();
    }
}
