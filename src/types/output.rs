//! Output structures for terminal display and the status API

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{LockOwner, ProximityZone, ReasonCode};

/// What the engine did with the host in one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    #[default]
    NoAction,
    LockIssued,
    LockFailed,
    AlreadyLocked,
    UnlockIssued,
    UnlockFailed,
    UnlockSkipped,
}

impl ActionOutcome {
    /// Did this step touch the host?
    pub fn is_actuation(&self) -> bool {
        matches!(
            self,
            Self::LockIssued | Self::LockFailed | Self::UnlockIssued | Self::UnlockFailed
        )
    }
}

/// Output structure for each decision step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutput {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Reading that drove this step (`None` = absent or a tick)
    pub rssi: Option<i16>,
    /// Classified zone, `None` for ticks and lifecycle events
    pub zone: Option<ProximityZone>,
    /// FAR counter after this step
    pub consecutive_far: u32,
    /// Required FAR count
    pub required: u32,
    /// Ownership after this step
    pub owner: LockOwner,
    /// Action taken
    pub action: ActionOutcome,
    /// Reason for this step
    pub reason: ReasonCode,
}

impl DecisionOutput {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let (color, emoji, zone) = match self.zone {
            Some(z) => (z.color_code(), z.emoji(), z.to_string()),
            None => ("\x1b[90m", "·", "-".to_string()),
        };
        format!(
            "{}{} {} | rssi={} | far={}/{} | owner={} | {}{}",
            color,
            emoji,
            zone,
            format_rssi(self.rssi),
            self.consecutive_far,
            self.required,
            self.owner,
            self.reason.code(),
            ProximityZone::color_reset()
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "zone={} | rssi={} | far={}/{} | owner={} | action={:?} | reason={}",
            self.zone.map(|z| z.to_string()).unwrap_or_else(|| "-".to_string()),
            format_rssi(self.rssi),
            self.consecutive_far,
            self.required,
            self.owner,
            self.action,
            self.reason.code()
        )
    }
}

fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map(|r| r.to_string()).unwrap_or_else(|| "none".to_string())
}
