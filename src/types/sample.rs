//! Inbound proximity samples

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// One observation from the beacon transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Advertised device name or address
    pub identity: String,
    /// Signal strength in dBm, `None` when the transport saw the device but
    /// could not read a strength
    pub rssi: Option<i16>,
    /// When the transport observed it
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Create a sample stamped now
    pub fn new(identity: impl Into<String>, rssi: Option<i16>) -> Self {
        Self {
            identity: identity.into(),
            rssi,
            timestamp: Utc::now(),
        }
    }
}
