//! Reset-reason cache.
//!
//! The reset flags are sticky until cleared, so reading them late (or twice
//! across boots) would mix causes. [`ResetReasonCache::get`] reads and clears
//! the hardware on its first call and serves the cached value afterwards. Boot
//! calls it before anything else.

use platform::{ResetCauseRegister, ResetFlags};

/// Reset flags captured once per boot.
#[derive(Debug, Default)]
pub struct ResetReasonCache {
    cached: Option<ResetFlags>,
}

impl ResetReasonCache {
    /// Nothing captured yet.
    pub const fn new() -> Self {
        Self { cached: None }
    }

    /// Flags from the boot that started this session.
    ///
    /// The first call reads `register` and clears it; later calls do not touch it.
    pub fn get<R: ResetCauseRegister>(&mut self, register: &mut R) -> ResetFlags {
        *self.cached.get_or_insert_with(|| {
            let flags = ResetFlags(register.read_raw());
            register.clear();
            flags
        })
    }

    /// Cached flags, if [`get`](Self::get) has run.
    pub fn cached(&self) -> Option<ResetFlags> {
        self.cached
    }
}
