//! Logging shim: `defmt` on hardware, `tracing` on host builds, nothing otherwise.
//!
//! Format strings must stay within the subset both backends accept (plain
//! `{}` placeholders). Macro names must not collide with built-in attributes
//! (`warn`, `allow`, ...): a `use` of such a name is ambiguous.
//!
//! The panic path never logs through here; RTT and subscriber state may be
//! corrupt by the time it runs. It writes to the polling console instead.

macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::info!($fmt $(, $arg)*);
        #[cfg(all(feature = "tracing", not(feature = "defmt")))]
        tracing::info!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        { $( let _ = &$arg; )* }
    }};
}

macro_rules! error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        defmt::error!($fmt $(, $arg)*);
        #[cfg(all(feature = "tracing", not(feature = "defmt")))]
        tracing::error!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        { $( let _ = &$arg; )* }
    }};
}

pub(crate) use {error, info};
