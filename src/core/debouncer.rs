//! Debouncer: consecutive FAR readings gate the lock action
//!
//! The trigger fires exactly once per sustained FAR episode, on the first FAR
//! reading that brings the counter to `required_count` or beyond. Any reset
//! re-arms it.

use serde::{Deserialize, Serialize};
use crate::types::{ProximityZone, ThresholdConfig};

/// How non-FAR readings affect the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DebouncePolicy {
    /// Any NEAR or MID reading resets the counter
    #[default]
    ResetOnNonFar,
    /// Only readings strictly above `midpoint_rssi` reset the counter;
    /// MID readings at or below it leave the counter where it is
    ResetAboveMidpoint { midpoint_rssi: i16 },
}

impl DebouncePolicy {
    /// Keep the midpoint inside `[lock_rssi, unlock_rssi]` so NEAR always resets
    pub fn clamped(self, thresholds: &ThresholdConfig) -> Self {
        match self {
            Self::ResetOnNonFar => Self::ResetOnNonFar,
            Self::ResetAboveMidpoint { midpoint_rssi } => Self::ResetAboveMidpoint {
                midpoint_rssi: midpoint_rssi.clamp(thresholds.lock_rssi, thresholds.unlock_rssi),
            },
        }
    }
}

/// Per-session FAR counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceState {
    pub consecutive_far_count: u32,
    pub required_count: u32,
}

/// Stateful debouncer owned by one monitoring session
#[derive(Debug, Clone)]
pub struct Debouncer {
    state: DebounceState,
    policy: DebouncePolicy,
    /// Trigger already spent in the current FAR episode
    fired: bool,
}

impl Debouncer {
    /// `required_count` is clamped to at least 1
    pub fn new(required_count: u32, policy: DebouncePolicy) -> Self {
        Self {
            state: DebounceState {
                consecutive_far_count: 0,
                required_count: required_count.max(1),
            },
            policy,
            fired: false,
        }
    }

    /// Feed one classification. Returns true when a FAR episode is confirmed.
    pub fn observe(&mut self, zone: ProximityZone) -> bool {
        match zone {
            ProximityZone::Far => {
                self.state.consecutive_far_count = self.state.consecutive_far_count.saturating_add(1);
                if self.fired || self.state.consecutive_far_count < self.state.required_count {
                    return false;
                }
                self.fired = true;
                true
            }
            ProximityZone::Near | ProximityZone::Mid => {
                self.force_reset();
                false
            }
        }
    }

    /// Feed a classification together with the reading it came from, honoring
    /// the configured policy.
    pub fn observe_reading(&mut self, zone: ProximityZone, reading: Option<i16>) -> bool {
        match (self.policy, zone, reading) {
            (DebouncePolicy::ResetAboveMidpoint { midpoint_rssi }, ProximityZone::Near | ProximityZone::Mid, Some(r))
                if r <= midpoint_rssi =>
            {
                false
            }
            _ => self.observe(zone),
        }
    }

    /// Zero the counter without a classification
    pub fn force_reset(&mut self) {
        self.state.consecutive_far_count = 0;
        self.fired = false;
    }

    /// Change the required count; the current counter is kept. A counter
    /// already at or past the new count fires on the next FAR reading.
    pub fn set_required(&mut self, required_count: u32) {
        self.state.required_count = required_count.max(1);
    }

    pub fn set_policy(&mut self, policy: DebouncePolicy) {
        self.policy = policy;
    }

    pub fn count(&self) -> u32 {
        self.state.consecutive_far_count
    }

    pub fn required(&self) -> u32 {
        self.state.required_count
    }

    /// Trigger already spent in this FAR episode
    pub fn exceeded(&self) -> bool {
        self.fired
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }
}
