//! Classifier: signal strength → proximity zone
//!
//! - reading ≥ unlock_rssi → NEAR
//! - reading ≤ lock_rssi → FAR
//! - otherwise → MID
//! - no reading → FAR (loss of signal biases toward locking)

use crate::types::{ProximityZone, ThresholdConfig};

/// Classify one reading. Total and deterministic; an invalid threshold pair
/// is replaced by the built-in default before comparing.
pub fn classify(reading: Option<i16>, cfg: &ThresholdConfig) -> ProximityZone {
    let cfg = cfg.or_fallback(ThresholdConfig::default());
    match reading {
        None => ProximityZone::Far,
        Some(r) if r >= cfg.unlock_rssi => ProximityZone::Near,
        Some(r) if r <= cfg.lock_rssi => ProximityZone::Far,
        Some(_) => ProximityZone::Mid,
    }
}
