//! Proximity zone definitions

use serde::{Deserialize, Serialize};

/// Classified proximity bucket for one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProximityZone {
    /// Reading at or above the unlock threshold
    Near,
    /// Reading at or below the lock threshold, or no reading at all
    Far,
    /// Dead zone between the thresholds
    Mid,
}

impl ProximityZone {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            ProximityZone::Near => "\x1b[32m", // Green
            ProximityZone::Mid => "\x1b[33m",  // Yellow
            ProximityZone::Far => "\x1b[31m",  // Red
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for zone
    pub fn emoji(&self) -> &'static str {
        match self {
            ProximityZone::Near => "📶",
            ProximityZone::Mid => "〰",
            ProximityZone::Far => "📴",
        }
    }
}

impl std::fmt::Display for ProximityZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProximityZone::Near => "NEAR",
            ProximityZone::Far => "FAR",
            ProximityZone::Mid => "MID",
        };
        write!(f, "{}", name)
    }
}
