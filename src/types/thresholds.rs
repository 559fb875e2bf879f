//! Threshold pair used by the classifier

use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::{DEFAULT_LOCK_RSSI, DEFAULT_UNLOCK_RSSI};

/// Immutable per-cycle threshold snapshot (dBm)
///
/// Invariant: `unlock_rssi > lock_rssi`. Readings strictly between the two
/// are MID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// At or above this ⇒ NEAR
    pub unlock_rssi: i16,
    /// At or below this ⇒ FAR
    pub lock_rssi: i16,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            unlock_rssi: DEFAULT_UNLOCK_RSSI,
            lock_rssi: DEFAULT_LOCK_RSSI,
        }
    }
}

impl ThresholdConfig {
    /// Build a checked pair
    pub fn new(unlock_rssi: i16, lock_rssi: i16) -> Result<Self, ConfigError> {
        let cfg = Self { unlock_rssi, lock_rssi };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn is_valid(&self) -> bool {
        self.unlock_rssi > self.lock_rssi
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds {
                unlock: self.unlock_rssi,
                lock: self.lock_rssi,
            })
        }
    }

    /// This pair if valid, otherwise `fallback` if that is valid, otherwise
    /// the built-in default.
    pub fn or_fallback(self, fallback: Self) -> Self {
        if self.is_valid() {
            self
        } else if fallback.is_valid() {
            fallback
        } else {
            Self::default()
        }
    }
}
