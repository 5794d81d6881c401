//! Software watchdog supervisor.
//!
//! Each long-running activity registers as a client with its own period and
//! feeds the supervisor while it makes progress. The main loop calls
//! [`Supervisor::run`] every `check_period_ms`: if every client is healthy the
//! hardware watchdog is reloaded, otherwise the registered trigger handler
//! (the panic controller) is invoked with the first starved client.
//!
//! Without a trigger handler a starved client simply stops the hardware
//! feed, so the independent watchdog still resets the board.

use platform::memory_map::FLASH_SECTOR_ERASE_MAX_MS;
use platform::{HardwareWatchdog, WatchdogClientId, WatchdogTriggerHandler};

use crate::log;

/// Supervisor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupervisorConfig {
    /// How often the main loop calls [`Supervisor::run`].
    pub check_period_ms: u32,
    /// Independent watchdog timeout programmed at boot.
    pub hardware_timeout_ms: u32,
}

impl SupervisorConfig {
    /// Check every 100 ms against an 8 s hardware timeout.
    ///
    /// The panic store erases its sector in one call it cannot feed from, so
    /// the timeout must outlast a worst-case sector erase.
    pub const fn board_default() -> Self {
        Self {
            check_period_ms: 100,
            hardware_timeout_ms: 8_000,
        }
    }

    /// `true` when the IWDG cannot fire during a single sector erase.
    pub const fn outlasts_sector_erase(&self) -> bool {
        self.hardware_timeout_ms > FLASH_SECTOR_ERASE_MAX_MS
    }

    /// The hardware timeout must outlast several missed checks.
    pub fn validate(&self) -> Result<(), WatchdogError> {
        if self.check_period_ms == 0
            || self.hardware_timeout_ms < self.check_period_ms.saturating_mul(2)
        {
            return Err(WatchdogError::HardwareTimeoutTooShort {
                check_period_ms: self.check_period_ms,
                hardware_timeout_ms: self.hardware_timeout_ms,
            });
        }
        Ok(())
    }
}

const _: () = assert!(SupervisorConfig::board_default().outlasts_sector_erase());

/// Supervisor misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogError {
    /// Client id outside `0..N`.
    #[error("watchdog client {0} out of range")]
    UnknownClient(u32),
    /// Feed for a client that never registered.
    #[error("watchdog client {0} is not registered")]
    NotRegistered(u32),
    /// A period of zero would trigger immediately.
    #[error("watchdog client {0} has a zero period")]
    ZeroPeriod(u32),
    /// The hardware watchdog would fire between two checks.
    #[error("hardware timeout {hardware_timeout_ms} ms too short for {check_period_ms} ms checks")]
    HardwareTimeoutTooShort {
        /// Configured check period.
        check_period_ms: u32,
        /// Configured hardware timeout.
        hardware_timeout_ms: u32,
    },
}

#[derive(Debug, Clone, Copy)]
struct SoftWatchdog {
    period_ms: u32,
    last_feed_ms: u32,
}

impl SoftWatchdog {
    fn expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_feed_ms) > self.period_ms
    }
}

/// `N` software watchdogs multiplexed onto one hardware watchdog.
pub struct Supervisor<H, const N: usize> {
    config: SupervisorConfig,
    clients: [Option<SoftWatchdog>; N],
    handler: Option<H>,
}

impl<H: WatchdogTriggerHandler, const N: usize> Supervisor<H, N> {
    /// Supervisor with no clients and no trigger handler.
    pub fn new(config: SupervisorConfig) -> Result<Self, WatchdogError> {
        config.validate()?;
        Ok(Self {
            config,
            clients: [None; N],
            handler: None,
        })
    }

    /// Timing this supervisor was built with.
    pub fn config(&self) -> SupervisorConfig {
        self.config
    }

    /// Start supervising `client` with a timeout of `period_ms`, counted from `now_ms`.
    pub fn register(
        &mut self,
        client: WatchdogClientId,
        period_ms: u32,
        now_ms: u32,
    ) -> Result<(), WatchdogError> {
        if period_ms == 0 {
            return Err(WatchdogError::ZeroPeriod(client.0));
        }
        let slot = self
            .clients
            .get_mut(client.0 as usize)
            .ok_or(WatchdogError::UnknownClient(client.0))?;
        *slot = Some(SoftWatchdog {
            period_ms,
            last_feed_ms: now_ms,
        });
        log::info!("watchdog client {} registered, period {} ms", client.0, period_ms);
        Ok(())
    }

    /// Record progress for `client`.
    pub fn feed(&mut self, client: WatchdogClientId, now_ms: u32) -> Result<(), WatchdogError> {
        let wdg = self
            .clients
            .get_mut(client.0 as usize)
            .ok_or(WatchdogError::UnknownClient(client.0))?
            .as_mut()
            .ok_or(WatchdogError::NotRegistered(client.0))?;
        wdg.last_feed_ms = now_ms;
        Ok(())
    }

    /// Install the callback invoked when a client starves.
    pub fn register_trigger_handler(&mut self, handler: H) {
        self.handler = Some(handler);
    }

    /// First client whose period has elapsed without a feed.
    pub fn check(&self, now_ms: u32) -> Option<WatchdogClientId> {
        self.clients
            .iter()
            .zip(0u32..)
            .find_map(|(slot, id)| match slot {
                Some(wdg) if wdg.expired(now_ms) => Some(WatchdogClientId(id)),
                _ => None,
            })
    }

    /// Periodic check: feed the hardware if healthy, otherwise trigger.
    ///
    /// Returns the starved client if there is no handler to hand it to; the
    /// hardware watchdog is then left unfed.
    pub fn run<W: HardwareWatchdog>(
        &mut self,
        now_ms: u32,
        hardware: &mut W,
    ) -> Option<WatchdogClientId> {
        let Some(starved) = self.check(now_ms) else {
            hardware.feed_hardware();
            return None;
        };
        match self.handler.as_mut() {
            Some(handler) => handler.on_watchdog_trigger(starved),
            None => {
                log::error!("watchdog client {} starved, no handler", starved.0);
                Some(starved)
            }
        }
    }
}
