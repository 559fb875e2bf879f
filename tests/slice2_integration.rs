//! Integration tests for Slice 2 - Lock Ownership
//!
//! - our lock followed by the locked edge stays SCRIPT
//! - an unexplained locked edge is USER
//! - any unlocked edge is NONE
//! - locked edges right after a wake are not blamed on the user

use proxilock::core::{transition, OwnershipArbiter};
use proxilock::types::{LockOwner, OwnershipEvent};
use std::time::{Duration, Instant};

fn arbiter() -> OwnershipArbiter {
    OwnershipArbiter::new(Duration::from_secs(2), Duration::from_secs(10))
}

#[test]
fn test_script_lock_then_locked_edge_within_grace() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.observe_lock_state_at(false, t0, None);
    a.notify_script_lock_at(t0);
    let event = a.observe_lock_state_at(true, t0 + Duration::from_millis(300), None);

    assert_eq!(event, OwnershipEvent::LockedEdge { in_grace: true });
    assert_eq!(a.owner(), LockOwner::Script);
}

#[test]
fn test_script_lock_before_any_probe() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.notify_script_lock_at(t0);
    // first observation is only a baseline
    assert_eq!(a.observe_lock_state_at(true, t0, None), OwnershipEvent::NoEdge);
    assert_eq!(a.owner(), LockOwner::Script);
}

#[test]
fn test_unexplained_lock_is_user_then_unlock_is_none() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.observe_lock_state_at(false, t0, None);
    a.observe_lock_state_at(true, t0 + Duration::from_secs(30), None);
    assert_eq!(a.owner(), LockOwner::User);

    a.observe_lock_state_at(false, t0 + Duration::from_secs(60), None);
    assert_eq!(a.owner(), LockOwner::None);
}

#[test]
fn test_unlocked_edge_clears_script_ownership() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.observe_lock_state_at(false, t0, None);
    a.notify_script_lock_at(t0);
    a.observe_lock_state_at(true, t0 + Duration::from_millis(200), None);
    a.observe_lock_state_at(false, t0 + Duration::from_secs(20), None);
    assert_eq!(a.owner(), LockOwner::None);
}

#[test]
fn test_locked_edge_one_second_after_wake_is_not_user() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.observe_lock_state_at(false, t0, None);
    a.observe_lock_state_at(true, t0 + Duration::from_secs(1), Some(Duration::from_secs(1)));
    assert_ne!(a.owner(), LockOwner::User);
}

#[test]
fn test_locked_edge_long_after_wake_is_user() {
    let mut a = arbiter();
    let t0 = Instant::now();
    a.observe_lock_state_at(false, t0, Some(Duration::from_secs(60)));
    a.observe_lock_state_at(true, t0 + Duration::from_secs(1), Some(Duration::from_secs(61)));
    assert_eq!(a.owner(), LockOwner::User);
}

#[test]
fn test_steady_state_is_not_an_edge() {
    let mut a = arbiter();
    let t0 = Instant::now();
    for i in 0..5 {
        let event = a.observe_lock_state_at(true, t0 + Duration::from_secs(i), None);
        assert_eq!(event, OwnershipEvent::NoEdge);
    }
    assert_eq!(a.owner(), LockOwner::None);
}

#[test]
fn test_transition_never_leaves_script_on_locked_edge() {
    for in_grace in [true, false] {
        assert_eq!(
            transition(LockOwner::Script, OwnershipEvent::LockedEdge { in_grace }),
            LockOwner::Script
        );
    }
}

#[test]
fn test_transition_unlock_events_always_none() {
    for owner in [LockOwner::Script, LockOwner::User, LockOwner::None] {
        assert_eq!(transition(owner, OwnershipEvent::UnlockedEdge), LockOwner::None);
        assert_eq!(transition(owner, OwnershipEvent::UnlockConfirmed), LockOwner::None);
        assert_eq!(transition(owner, OwnershipEvent::ScriptLock), LockOwner::Script);
    }
}
