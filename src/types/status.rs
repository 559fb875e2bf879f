//! Engine status snapshot for an external UI layer

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{ActionOutcome, LockOwner, ProximityZone, ReasonCode, ThresholdConfig};

/// Everything a UI needs to report what the engine is doing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub monitoring: bool,
    pub thresholds: ThresholdConfig,
    pub last_rssi: Option<i16>,
    pub last_zone: Option<ProximityZone>,
    pub consecutive_far: u32,
    pub required: u32,
    pub owner: LockOwner,
    pub owner_since: Option<DateTime<Utc>>,
    /// Last value reported by the lock-state probe
    pub observed_locked: Option<bool>,
    pub last_action: ActionOutcome,
    pub last_reason: Option<ReasonCode>,
    pub samples_seen: u64,
    pub lock_only_mode: bool,
}

impl EngineStatus {
    /// Status of a monitor that is not running
    pub fn idle() -> Self {
        Self {
            monitoring: false,
            thresholds: ThresholdConfig::default(),
            last_rssi: None,
            last_zone: None,
            consecutive_far: 0,
            required: crate::DEFAULT_CONSECUTIVE_FAR_REQUIRED,
            owner: LockOwner::None,
            owner_since: None,
            observed_locked: None,
            last_action: ActionOutcome::NoAction,
            last_reason: None,
            samples_seen: 0,
            lock_only_mode: false,
        }
    }
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self::idle()
    }
}
