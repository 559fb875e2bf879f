//! Decision engine: one monitoring session's state and decisions
//!
//! Synchronous and clock-injected. The async monitor loop feeds it events one
//! at a time and carries out the intents it returns, then reports the
//! actuator outcome back before the next event is consumed.

use std::time::{Duration, Instant};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::arbiter::OwnershipArbiter;
use crate::core::classifier::classify;
use crate::core::config::EngineConfig;
use crate::core::debouncer::Debouncer;
use crate::types::{
    ActionOutcome, DecisionOutput, EngineStatus, LockOwner, ProximityZone, ReasonCode,
    ThresholdConfig,
};

/// What the loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    None,
    /// FAR confirmed: probe lock state, then report via `on_lock_probe`
    ProbeThenLock,
    /// Call the lock actuator, then report via `on_lock_result`
    Lock,
    /// Call the unlock actuator, then report via `on_unlock_result`
    Unlock,
}

/// One decision: what happened, and what to do about it
#[derive(Debug, Clone)]
pub struct Step {
    pub output: DecisionOutput,
    pub intent: Intent,
}

/// Session state for one monitoring run
#[derive(Debug)]
pub struct DecisionEngine {
    config: EngineConfig,
    /// Last thresholds that passed validation
    good_thresholds: ThresholdConfig,
    debouncer: Debouncer,
    arbiter: OwnershipArbiter,
    last_zone: Option<ProximityZone>,
    last_rssi: Option<i16>,
    started_at: Instant,
    last_sample_at: Option<Instant>,
    last_absent_at: Option<Instant>,
    last_action: ActionOutcome,
    last_reason: Option<ReasonCode>,
    samples_seen: u64,
}

impl DecisionEngine {
    /// Fresh session: counter zero, ownership NONE, no baseline
    pub fn new(config: EngineConfig, now: Instant) -> Self {
        let good_thresholds = config.thresholds.or_fallback(ThresholdConfig::default());
        let debounce_policy = config.debounce_policy.clamped(&good_thresholds);
        let debouncer = Debouncer::new(config.required_count, debounce_policy);
        let arbiter = OwnershipArbiter::new(config.script_grace(), config.wake_grace());
        Self {
            config: EngineConfig { thresholds: good_thresholds, debounce_policy, ..config },
            good_thresholds,
            debouncer,
            arbiter,
            last_zone: None,
            last_rssi: None,
            started_at: now,
            last_sample_at: None,
            last_absent_at: None,
            last_action: ActionOutcome::NoAction,
            last_reason: None,
            samples_seen: 0,
        }
    }

    /// Hot-swap configuration. Invalid thresholds are replaced with the last
    /// known good pair. Counter and ownership carry over.
    pub fn configure(&mut self, config: EngineConfig) -> DecisionOutput {
        let reason = if config.thresholds.is_valid() {
            self.good_thresholds = config.thresholds;
            ReasonCode::R105_CONFIG_APPLIED
        } else {
            warn!(
                unlock = config.thresholds.unlock_rssi,
                lock = config.thresholds.lock_rssi,
                fallback_unlock = self.good_thresholds.unlock_rssi,
                fallback_lock = self.good_thresholds.lock_rssi,
                "invalid threshold pair, keeping last known good"
            );
            ReasonCode::R105_CONFIG_FALLBACK
        };
        let debounce_policy = config.debounce_policy.clamped(&self.good_thresholds);
        self.debouncer.set_required(config.required_count);
        self.debouncer.set_policy(debounce_policy);
        self.arbiter.set_grace(config.script_grace(), config.wake_grace());
        self.config = EngineConfig {
            thresholds: self.good_thresholds,
            debounce_policy,
            ..config
        };
        self.output(None, None, ActionOutcome::NoAction, reason)
    }

    /// A sample for the target identity arrived
    pub fn on_sample(&mut self, reading: Option<i16>, now: Instant) -> Step {
        self.last_sample_at = Some(now);
        self.samples_seen += 1;
        self.step(reading)
    }

    /// No sample within the device timeout; feed an absent reading
    pub fn on_absent(&mut self, now: Instant) -> Step {
        self.last_absent_at = Some(now);
        debug!("target silent past device timeout");
        self.step(None)
    }

    /// Is an absent reading due? At most one per device timeout period.
    pub fn absent_due(&self, now: Instant) -> bool {
        let reference = [Some(self.started_at), self.last_sample_at, self.last_absent_at]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.started_at);
        now.saturating_duration_since(reference) >= self.config.device_timeout()
    }

    fn step(&mut self, reading: Option<i16>) -> Step {
        let zone = classify(reading, &self.config.thresholds);
        let was_near = self.last_zone == Some(ProximityZone::Near);
        let had_count = self.debouncer.count();
        let triggered = self.debouncer.observe_reading(zone, reading);
        self.last_zone = Some(zone);
        self.last_rssi = reading;

        if triggered {
            info!(count = self.debouncer.count(), "far confirmed");
            let output = self.output(reading, Some(zone), ActionOutcome::NoAction, ReasonCode::R102_FAR_CONFIRMED);
            return Step { output, intent: Intent::ProbeThenLock };
        }

        if zone == ProximityZone::Near && !was_near {
            return self.near_edge(reading);
        }

        let reason = match zone {
            ProximityZone::Far if reading.is_none() => ReasonCode::R101_SIGNAL_ABSENT,
            ProximityZone::Far if self.debouncer.exceeded() => {
                debug!(count = self.debouncer.count(), "far threshold exceeded but not locked");
                ReasonCode::R102_FAR_EXCEEDED
            }
            ProximityZone::Far => ReasonCode::R102_FAR_ACCUMULATING,
            _ if had_count > 0 && self.debouncer.count() == 0 => ReasonCode::R102_DEBOUNCE_RESET,
            ProximityZone::Near => ReasonCode::R101_ZONE_NEAR,
            ProximityZone::Mid => ReasonCode::R101_ZONE_MID,
        };
        let output = self.output(reading, Some(zone), ActionOutcome::NoAction, reason);
        Step { output, intent: Intent::None }
    }

    /// Entered NEAR from anything else
    fn near_edge(&mut self, reading: Option<i16>) -> Step {
        let zone = Some(ProximityZone::Near);
        if self.config.lock_only_mode {
            let output = self.output(reading, zone, ActionOutcome::UnlockSkipped, ReasonCode::R104_LOCK_ONLY_MODE);
            return Step { output, intent: Intent::None };
        }
        let owner = self.arbiter.owner();
        if owner.may_auto_unlock() {
            let output = self.output(reading, zone, ActionOutcome::NoAction, ReasonCode::R101_ZONE_NEAR);
            return Step { output, intent: Intent::Unlock };
        }
        match owner {
            LockOwner::User => {
                info!("locked by user, unlock blocked");
                let output = self.output(reading, zone, ActionOutcome::UnlockSkipped, ReasonCode::R104_UNLOCK_BLOCKED_USER);
                Step { output, intent: Intent::None }
            }
            LockOwner::Script | LockOwner::None => {
                let output = self.output(reading, zone, ActionOutcome::UnlockSkipped, ReasonCode::R104_UNLOCK_NOT_OWNED);
                Step { output, intent: Intent::None }
            }
        }
    }

    /// Result of the lock-state probe taken after a FAR confirmation
    pub fn on_lock_probe(&mut self, already_locked: bool) -> Step {
        if already_locked {
            self.debouncer.force_reset();
            let output = self.output(self.last_rssi, self.last_zone, ActionOutcome::AlreadyLocked, ReasonCode::R103_ALREADY_LOCKED);
            return Step { output, intent: Intent::None };
        }
        let output = self.output(self.last_rssi, self.last_zone, ActionOutcome::NoAction, ReasonCode::R102_FAR_CONFIRMED);
        Step { output, intent: Intent::Lock }
    }

    /// Outcome of the lock actuator. Failure leaves counter and ownership as
    /// they were; the next FAR episode re-arms the trigger.
    pub fn on_lock_result(&mut self, succeeded: bool, now: Instant) -> DecisionOutput {
        if succeeded {
            self.arbiter.notify_script_lock_at(now);
            self.debouncer.force_reset();
            self.output(self.last_rssi, self.last_zone, ActionOutcome::LockIssued, ReasonCode::R103_LOCK_ISSUED)
        } else {
            self.output(self.last_rssi, self.last_zone, ActionOutcome::LockFailed, ReasonCode::R103_LOCK_FAILED)
        }
    }

    /// Outcome of the unlock actuator. Failure keeps SCRIPT ownership so the
    /// next NEAR edge retries.
    pub fn on_unlock_result(&mut self, succeeded: bool) -> DecisionOutput {
        if succeeded {
            self.arbiter.confirm_unlock();
            self.debouncer.force_reset();
            self.output(self.last_rssi, self.last_zone, ActionOutcome::UnlockIssued, ReasonCode::R104_UNLOCK_ISSUED)
        } else {
            self.output(self.last_rssi, self.last_zone, ActionOutcome::UnlockFailed, ReasonCode::R104_UNLOCK_FAILED)
        }
    }

    /// Periodic poll: ownership observation plus post-wake counter hold
    pub fn on_tick(&mut self, is_locked: bool, now: Instant, since_wake: Option<Duration>) -> DecisionOutput {
        self.arbiter.observe_lock_state_at(is_locked, now, since_wake);

        let just_woke = since_wake.map(|d| d < self.config.wake_debounce()).unwrap_or(false);
        if just_woke && self.debouncer.count() > 0 {
            self.debouncer.force_reset();
            return self.output(None, None, ActionOutcome::NoAction, ReasonCode::R102_WAKE_SUPPRESSED);
        }
        self.output(None, None, ActionOutcome::NoAction, ReasonCode::R105_OWNERSHIP_OBSERVED)
    }

    /// System woke: the scanner restarts, so the FAR streak and ownership
    /// start over. The next sample is the first of a new stream and the next
    /// probe only records a baseline.
    pub fn on_wake(&mut self, now: Instant) -> DecisionOutput {
        self.debouncer.force_reset();
        self.arbiter = OwnershipArbiter::new(self.config.script_grace(), self.config.wake_grace());
        self.last_zone = None;
        self.last_sample_at = Some(now);
        self.output(None, None, ActionOutcome::NoAction, ReasonCode::R105_WAKE_RESTART)
    }

    fn output(
        &mut self,
        rssi: Option<i16>,
        zone: Option<ProximityZone>,
        action: ActionOutcome,
        reason: ReasonCode,
    ) -> DecisionOutput {
        if action != ActionOutcome::NoAction {
            self.last_action = action;
        }
        self.last_reason = Some(reason);
        DecisionOutput {
            timestamp: Utc::now(),
            rssi,
            zone,
            consecutive_far: self.debouncer.count(),
            required: self.debouncer.required(),
            owner: self.arbiter.owner(),
            action,
            reason,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn owner(&self) -> LockOwner {
        self.arbiter.owner()
    }

    pub fn consecutive_far(&self) -> u32 {
        self.debouncer.count()
    }

    pub fn last_zone(&self) -> Option<ProximityZone> {
        self.last_zone
    }

    /// Snapshot for the status surface
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            monitoring: true,
            thresholds: self.config.thresholds,
            last_rssi: self.last_rssi,
            last_zone: self.last_zone,
            consecutive_far: self.debouncer.count(),
            required: self.debouncer.required(),
            owner: self.arbiter.owner(),
            owner_since: Some(self.arbiter.owner_since()),
            observed_locked: self.arbiter.last_observed(),
            last_action: self.last_action,
            last_reason: self.last_reason,
            samples_seen: self.samples_seen,
            lock_only_mode: self.config.lock_only_mode,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
