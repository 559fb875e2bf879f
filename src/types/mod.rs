//! Core types for Proxi-Lock

mod zone;
mod thresholds;
mod sample;
mod ownership;
mod output;
mod reason;
mod status;

pub use zone::ProximityZone;
pub use thresholds::ThresholdConfig;
pub use sample::Sample;
pub use ownership::{LockOwner, OwnershipEvent};
pub use output::{ActionOutcome, DecisionOutput};
pub use reason::ReasonCode;
pub use status::EngineStatus;
