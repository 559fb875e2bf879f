//! Reason codes for decisions and state changes

use serde::{Deserialize, Serialize};

/// Reason codes attached to every decision output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // R101: Zones
    // =========================================================================
    /// Reading at or above unlock threshold
    R101_ZONE_NEAR,
    /// Reading in the dead zone
    R101_ZONE_MID,
    /// No reading (out of range or stale), treated as FAR
    R101_SIGNAL_ABSENT,

    // =========================================================================
    // R102: Debounce
    // =========================================================================
    /// FAR counter climbing toward the required count
    R102_FAR_ACCUMULATING,
    /// FAR counter reached the required count
    R102_FAR_CONFIRMED,
    /// FAR counter past the required count without a lock
    R102_FAR_EXCEEDED,
    /// FAR counter reset by a non-FAR reading
    R102_DEBOUNCE_RESET,
    /// FAR counter held at zero just after wake
    R102_WAKE_SUPPRESSED,

    // =========================================================================
    // R103: Lock
    // =========================================================================
    /// Lock call succeeded
    R103_LOCK_ISSUED,
    /// Lock call failed or timed out
    R103_LOCK_FAILED,
    /// Host already locked, nothing to do
    R103_ALREADY_LOCKED,

    // =========================================================================
    // R104: Unlock
    // =========================================================================
    /// Unlock call succeeded
    R104_UNLOCK_ISSUED,
    /// Unlock call failed or timed out
    R104_UNLOCK_FAILED,
    /// Lock is user-owned, never auto-unlocked
    R104_UNLOCK_BLOCKED_USER,
    /// No script lock to undo
    R104_UNLOCK_NOT_OWNED,
    /// Lock-only mode skips unlocking
    R104_LOCK_ONLY_MODE,

    // =========================================================================
    // R105: Ownership / lifecycle
    // =========================================================================
    /// Ownership observation tick
    R105_OWNERSHIP_OBSERVED,
    /// Wake handled, transport restarted
    R105_WAKE_RESTART,
    /// Config swapped
    R105_CONFIG_APPLIED,
    /// Config rejected, fallback thresholds used
    R105_CONFIG_FALLBACK,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_ZONE_NEAR => "R101_ZONE_NEAR",
            Self::R101_ZONE_MID => "R101_ZONE_MID",
            Self::R101_SIGNAL_ABSENT => "R101_SIGNAL_ABSENT",
            Self::R102_FAR_ACCUMULATING => "R102_FAR_ACCUMULATING",
            Self::R102_FAR_CONFIRMED => "R102_FAR_CONFIRMED",
            Self::R102_FAR_EXCEEDED => "R102_FAR_EXCEEDED",
            Self::R102_DEBOUNCE_RESET => "R102_DEBOUNCE_RESET",
            Self::R102_WAKE_SUPPRESSED => "R102_WAKE_SUPPRESSED",
            Self::R103_LOCK_ISSUED => "R103_LOCK_ISSUED",
            Self::R103_LOCK_FAILED => "R103_LOCK_FAILED",
            Self::R103_ALREADY_LOCKED => "R103_ALREADY_LOCKED",
            Self::R104_UNLOCK_ISSUED => "R104_UNLOCK_ISSUED",
            Self::R104_UNLOCK_FAILED => "R104_UNLOCK_FAILED",
            Self::R104_UNLOCK_BLOCKED_USER => "R104_UNLOCK_BLOCKED_USER",
            Self::R104_UNLOCK_NOT_OWNED => "R104_UNLOCK_NOT_OWNED",
            Self::R104_LOCK_ONLY_MODE => "R104_LOCK_ONLY_MODE",
            Self::R105_OWNERSHIP_OBSERVED => "R105_OWNERSHIP_OBSERVED",
            Self::R105_WAKE_RESTART => "R105_WAKE_RESTART",
            Self::R105_CONFIG_APPLIED => "R105_CONFIG_APPLIED",
            Self::R105_CONFIG_FALLBACK => "R105_CONFIG_FALLBACK",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R101_ZONE_NEAR => "Beacon near",
            Self::R101_ZONE_MID => "Beacon in dead zone",
            Self::R101_SIGNAL_ABSENT => "No signal - treated as far",
            Self::R102_FAR_ACCUMULATING => "Counting far readings",
            Self::R102_FAR_CONFIRMED => "Far confirmed",
            Self::R102_FAR_EXCEEDED => "Far threshold exceeded but not locked",
            Self::R102_DEBOUNCE_RESET => "Far counter reset",
            Self::R102_WAKE_SUPPRESSED => "Far counter held after wake",
            Self::R103_LOCK_ISSUED => "Screen locked",
            Self::R103_LOCK_FAILED => "Lock attempt failed",
            Self::R103_ALREADY_LOCKED => "Screen already locked",
            Self::R104_UNLOCK_ISSUED => "Screen unlocked",
            Self::R104_UNLOCK_FAILED => "Unlock attempt failed",
            Self::R104_UNLOCK_BLOCKED_USER => "Locked by user - unlock blocked",
            Self::R104_UNLOCK_NOT_OWNED => "Nothing to unlock",
            Self::R104_LOCK_ONLY_MODE => "Lock-only mode - unlock skipped",
            Self::R105_OWNERSHIP_OBSERVED => "Lock state observed",
            Self::R105_WAKE_RESTART => "System wake - scanner restarted",
            Self::R105_CONFIG_APPLIED => "Configuration applied",
            Self::R105_CONFIG_FALLBACK => "Invalid thresholds - fallback applied",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
