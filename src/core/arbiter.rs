//! Ownership arbiter: who caused the current lock?
//!
//! State transitions (see `transition`):
//! - any → SCRIPT: our lock call succeeded
//! - NONE/USER → USER: unlocked→locked edge outside both grace windows
//! - SCRIPT → SCRIPT: locked edge while we already own the lock
//! - any → NONE: locked→unlocked edge, or our unlock confirmed
//!
//! Lock-state observations are edge-triggered against the previous probe
//! value. The first observation after a (re)start only records a baseline.

use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use crate::types::{LockOwner, OwnershipEvent};

/// Pure ownership transition function
pub fn transition(current: LockOwner, event: OwnershipEvent) -> LockOwner {
    match event {
        OwnershipEvent::ScriptLock => LockOwner::Script,
        OwnershipEvent::UnlockedEdge | OwnershipEvent::UnlockConfirmed => LockOwner::None,
        OwnershipEvent::LockedEdge { in_grace: true } => current,
        OwnershipEvent::LockedEdge { in_grace: false } => match current {
            LockOwner::Script => LockOwner::Script,
            LockOwner::User | LockOwner::None => LockOwner::User,
        },
        OwnershipEvent::NoEdge => current,
    }
}

/// Stateful arbiter owned by one monitoring session
#[derive(Debug, Clone)]
pub struct OwnershipArbiter {
    owner: LockOwner,
    owner_since: DateTime<Utc>,
    last_script_lock: Option<Instant>,
    last_observed: Option<bool>,
    script_grace: Duration,
    wake_grace: Duration,
}

impl OwnershipArbiter {
    /// Fresh arbiter in NONE with no baseline
    pub fn new(script_grace: Duration, wake_grace: Duration) -> Self {
        Self {
            owner: LockOwner::None,
            owner_since: Utc::now(),
            last_script_lock: None,
            last_observed: None,
            script_grace,
            wake_grace,
        }
    }

    /// Our lock call succeeded
    pub fn notify_script_lock(&mut self) {
        self.notify_script_lock_at(Instant::now());
    }

    pub fn notify_script_lock_at(&mut self, now: Instant) {
        self.last_script_lock = Some(now);
        self.apply(OwnershipEvent::ScriptLock);
    }

    /// Our unlock call succeeded
    pub fn confirm_unlock(&mut self) {
        self.apply(OwnershipEvent::UnlockConfirmed);
    }

    /// Feed one probe result, returning the event it produced
    pub fn observe_lock_state(&mut self, is_locked: bool, since_wake: Option<Duration>) -> OwnershipEvent {
        self.observe_lock_state_at(is_locked, Instant::now(), since_wake)
    }

    pub fn observe_lock_state_at(
        &mut self,
        is_locked: bool,
        now: Instant,
        since_wake: Option<Duration>,
    ) -> OwnershipEvent {
        let event = match (self.last_observed, is_locked) {
            (Some(false), true) => OwnershipEvent::LockedEdge {
                in_grace: self.in_script_grace(now) || self.in_wake_grace(since_wake),
            },
            (Some(true), false) => OwnershipEvent::UnlockedEdge,
            _ => OwnershipEvent::NoEdge,
        };
        self.last_observed = Some(is_locked);
        self.apply(event);
        event
    }

    fn in_script_grace(&self, now: Instant) -> bool {
        self.last_script_lock
            .map(|t| now.saturating_duration_since(t) < self.script_grace)
            .unwrap_or(false)
    }

    fn in_wake_grace(&self, since_wake: Option<Duration>) -> bool {
        since_wake.map(|d| d < self.wake_grace).unwrap_or(false)
    }

    fn apply(&mut self, event: OwnershipEvent) {
        let next = transition(self.owner, event);
        if next != self.owner {
            info!(from = %self.owner, to = %next, ?event, "lock owner changed");
            self.owner = next;
            self.owner_since = Utc::now();
        } else if event != OwnershipEvent::NoEdge {
            debug!(owner = %self.owner, ?event, "lock owner unchanged");
        }
    }

    /// Update grace windows (hot config swap)
    pub fn set_grace(&mut self, script_grace: Duration, wake_grace: Duration) {
        self.script_grace = script_grace;
        self.wake_grace = wake_grace;
    }

    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    pub fn owner_since(&self) -> DateTime<Utc> {
        self.owner_since
    }

    /// Last probe value, `None` before the first observation
    pub fn last_observed(&self) -> Option<bool> {
        self.last_observed
    }
}

// =============================================================================
// TESTS
// =============================================================================
