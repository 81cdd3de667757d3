//! Reserve margin: bytes intentionally left unconsumed during a fill.
//!
//! Leaving headroom keeps the host out of pathological low-space states
//! (allocation failures mid-write, journal exhaustion) while the fill is in
//! place. The margin comes from configuration at construction time; there
//! is no module-level default that code paths can mutate.

use crate::core::config::{MIB, ReserveConfig};

/// Default reserve margin in megabytes (500 MB headroom + 10 MB slack).
pub const DEFAULT_RESERVE_MARGIN_MB: u64 = 510;

/// Converts the configured megabyte margin into a byte reserve.
#[derive(Debug, Clone, Copy)]
pub struct ReserveCalculator {
    margin_mb: u64,
}

impl ReserveCalculator {
    #[must_use]
    pub const fn new(margin_mb: u64) -> Self {
        Self { margin_mb }
    }

    #[must_use]
    pub const fn from_config(config: &ReserveConfig) -> Self {
        Self::new(config.margin_mb)
    }

    /// Configured margin in megabytes.
    #[must_use]
    pub const fn margin_mb(&self) -> u64 {
        self.margin_mb
    }

    /// The reserve in bytes: `margin_mb × 1_048_576`.
    ///
    /// Clamping against a volume's free space is the fill engine's job.
    #[must_use]
    pub const fn reserve_bytes(&self) -> u64 {
        self.margin_mb.saturating_mul(MIB)
    }
}

impl Default for ReserveCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVE_MARGIN_MB)
    }
}
