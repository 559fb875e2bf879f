//! Proxi-Lock: lock and unlock a host from beacon proximity
//!
//! Pipeline: sample → classifier → debouncer → lock actuator,
//! with an ownership arbiter gating auto-unlock.

pub mod core;
pub mod error;
pub mod types;

// =============================================================================
// THRESHOLDS - signal strength in dBm
// =============================================================================

/// Reading at or above this is NEAR
pub const DEFAULT_UNLOCK_RSSI: i16 = -30;

/// Reading at or below this is FAR
pub const DEFAULT_LOCK_RSSI: i16 = -70;

/// Reading above this resets the FAR counter under the midpoint policy
pub const DEFAULT_MAX_UNLOCKING_RSSI: i16 = -50;

/// Consecutive FAR readings before a lock is attempted
pub const DEFAULT_CONSECUTIVE_FAR_REQUIRED: u32 = 5;

// =============================================================================
// GRACE WINDOWS (seconds)
// =============================================================================

/// A script lock may take this long to become visible to the probe
pub const SCRIPT_GRACE_SECS: f64 = 2.0;

/// Lock-state probe is unreliable for this long after wake
pub const WAKE_GRACE_SECS: f64 = 10.0;

/// FAR counter is held at zero for this long after wake
pub const WAKE_DEBOUNCE_SECS: f64 = 2.0;

// =============================================================================
// TIMING (seconds)
// =============================================================================

/// Period of the lock-state poll tick
pub const SCAN_INTERVAL_SECS: f64 = 0.2;

/// Target is considered absent after this long without a sample
pub const DEVICE_TIMEOUT_SECS: f64 = 3.0;

/// Upper bound on every external call (lock, unlock, probe)
pub const CALL_TIMEOUT_SECS: f64 = 2.0;

/// Pause between stopping and restarting the transport after wake
pub const TRANSPORT_RESTART_DELAY_MS: u64 = 1000;

/// Keychain service name holding the unlock password
pub const DEFAULT_KEYCHAIN_ITEM: &str = "proxi-lock-password";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "0.3.0";
