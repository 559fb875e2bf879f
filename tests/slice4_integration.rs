//! Integration tests for Slice 4 - Monitor Loop
//!
//! Drives the live loop with scripted samples on a paused clock:
//! - sustained FAR locks exactly once, return unlocks our own lock
//! - user locks and lock-only mode never auto-unlock
//! - actuator failures and timeouts degrade without crashing the loop
//! - a system wake discards the FAR streak

use async_trait::async_trait;
use proxilock::core::{
    DryRunActuator, EngineConfig, LockActuator, Monitor, ScriptedSource, WakeClock,
};
use proxilock::error::ActuatorError;
use proxilock::types::{ActionOutcome, DecisionOutput, LockOwner, ReasonCode, ThresholdConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const GAP: Duration = Duration::from_millis(10);

fn config(required: u32) -> EngineConfig {
    EngineConfig {
        target: Some("beacon".to_string()),
        thresholds: ThresholdConfig::new(-40, -70).unwrap(),
        required_count: required,
        ..Default::default()
    }
}

fn source(readings: &[i16], gap: Duration) -> Box<ScriptedSource> {
    let readings: Vec<Option<i16>> = readings.iter().map(|r| Some(*r)).collect();
    Box::new(ScriptedSource::from_readings("beacon", &readings, gap))
}

/// Collect outputs until `done` matches one or `limit` of virtual time passes
async fn collect_until(
    rx: &mut broadcast::Receiver<DecisionOutput>,
    limit: Duration,
    mut done: impl FnMut(&DecisionOutput) -> bool,
) -> Vec<DecisionOutput> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(limit, async {
        loop {
            match rx.recv().await {
                Ok(output) => {
                    let stop = done(&output);
                    seen.push(output);
                    if stop {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    seen
}

fn count(outputs: &[DecisionOutput], action: ActionOutcome) -> usize {
    outputs.iter().filter(|o| o.action == action).count()
}

/// Actuator with injectable failures
#[derive(Default)]
struct FlakyActuator {
    fail_lock: bool,
    fail_probe: bool,
    lock_delay: Option<Duration>,
    locked: AtomicBool,
    lock_calls: AtomicU32,
}

#[async_trait]
impl LockActuator for FlakyActuator {
    async fn lock(&self) -> Result<(), ActuatorError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lock_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lock {
            return Err(ActuatorError::CommandFailed {
                command: "osascript".to_string(),
                stderr: "not allowed to send keystrokes".to_string(),
            });
        }
        self.locked.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), ActuatorError> {
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, ActuatorError> {
        if self.fail_probe {
            return Err(ActuatorError::Timeout("lock probe"));
        }
        Ok(self.locked.load(Ordering::SeqCst))
    }
}

// =============================================================================
// LOCK / UNLOCK
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_far_streak_locks_once() {
    let dry = Arc::new(DryRunActuator::new());
    let mut m = Monitor::new(config(3), dry.clone(), source(&[-80, -80, -80], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(2), |o| o.action == ActionOutcome::LockIssued).await;

    assert_eq!(count(&seen, ActionOutcome::LockIssued), 1);
    assert_eq!(dry.lock_calls(), 1);
    assert_eq!(m.status().owner, LockOwner::Script);
    assert_eq!(m.status().consecutive_far, 0);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_return_unlocks_script_lock() {
    let dry = Arc::new(DryRunActuator::new());
    let mut m = Monitor::new(config(3), dry.clone(), source(&[-80, -80, -80, -30], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(2), |o| o.action == ActionOutcome::UnlockIssued).await;

    assert_eq!(count(&seen, ActionOutcome::UnlockIssued), 1);
    assert_eq!((dry.lock_calls(), dry.unlock_calls()), (1, 1));
    assert_eq!(m.status().owner, LockOwner::None);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lock_only_mode_never_unlocks() {
    let dry = Arc::new(DryRunActuator::new());
    let cfg = EngineConfig { lock_only_mode: true, ..config(3) };
    let mut m = Monitor::new(cfg, dry.clone(), source(&[-80, -80, -80, -30], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(2), |o| o.reason == ReasonCode::R104_LOCK_ONLY_MODE).await;

    assert_eq!(seen.last().map(|o| o.reason), Some(ReasonCode::R104_LOCK_ONLY_MODE));
    assert_eq!((dry.lock_calls(), dry.unlock_calls()), (1, 0));
    assert_eq!(m.status().owner, LockOwner::Script);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_user_lock_blocks_unlock() {
    let dry = Arc::new(DryRunActuator::new());
    let mut readings = vec![-50i16; 20];
    readings.push(-30);
    let mut m = Monitor::new(config(3), dry.clone(), source(&readings, Duration::from_millis(100)), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    // let the first probe record an unlocked baseline
    tokio::time::sleep(Duration::from_millis(500)).await;
    dry.set_locked(true);

    let seen = collect_until(&mut rx, Duration::from_secs(5), |o| {
        o.reason == ReasonCode::R104_UNLOCK_BLOCKED_USER
    })
    .await;

    assert!(seen.iter().any(|o| o.owner == LockOwner::User));
    assert_eq!(seen.last().map(|o| o.action), Some(ActionOutcome::UnlockSkipped));
    assert_eq!((dry.lock_calls(), dry.unlock_calls()), (0, 0));
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_non_target_samples_ignored() {
    let dry = Arc::new(DryRunActuator::new());
    let stranger = ScriptedSource::from_readings("stranger", &[Some(-80); 5], GAP);
    let mut m = Monitor::new(config(3), dry.clone(), Box::new(stranger), WakeClock::new());
    m.start().unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(dry.lock_calls(), 0);
    assert_eq!(m.status().samples_seen, 0);
    m.stop().await.unwrap();
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_lock_not_retried_within_episode() {
    let flaky = Arc::new(FlakyActuator { fail_lock: true, ..Default::default() });
    let mut m = Monitor::new(config(3), flaky.clone(), source(&[-80; 6], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(1), |_| false).await;

    assert_eq!(count(&seen, ActionOutcome::LockFailed), 1);
    assert_eq!(flaky.lock_calls.load(Ordering::SeqCst), 1);
    assert_eq!(m.status().owner, LockOwner::None);
    assert!(m.is_running());
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_reads_unlocked() {
    let flaky = Arc::new(FlakyActuator { fail_probe: true, ..Default::default() });
    let mut m = Monitor::new(config(3), flaky.clone(), source(&[-80, -80, -80], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(2), |o| o.action == ActionOutcome::LockIssued).await;

    assert_eq!(count(&seen, ActionOutcome::AlreadyLocked), 0);
    assert_eq!(count(&seen, ActionOutcome::LockIssued), 1);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hung_lock_times_out() {
    let flaky = Arc::new(FlakyActuator { lock_delay: Some(Duration::from_secs(60)), ..Default::default() });
    let cfg = config(3);
    let limit = cfg.call_timeout();
    let mut m = Monitor::new(cfg, flaky.clone(), source(&[-80, -80, -80], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    let started = tokio::time::Instant::now();
    m.start().unwrap();

    let seen = collect_until(&mut rx, Duration::from_secs(10), |o| o.action == ActionOutcome::LockFailed).await;

    assert_eq!(seen.last().map(|o| o.action), Some(ActionOutcome::LockFailed));
    assert!(started.elapsed() >= limit);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(m.status().owner, LockOwner::None);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_lock_in_flight() {
    let flaky = Arc::new(FlakyActuator { lock_delay: Some(Duration::from_secs(60)), ..Default::default() });
    let mut m = Monitor::new(config(3), flaky.clone(), source(&[-80, -80, -80], GAP), WakeClock::new());
    m.start().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(flaky.lock_calls.load(Ordering::SeqCst), 1);

    let started = tokio::time::Instant::now();
    m.stop().await.unwrap();
    assert!(!m.is_running());
    assert!(started.elapsed() < Duration::from_secs(10));
}

// =============================================================================
// WAKE AND CONFIG
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_wake_discards_far_streak() {
    let dry = Arc::new(DryRunActuator::new());
    let mut m = Monitor::new(config(5), dry.clone(), source(&[-80; 6], Duration::from_millis(100)), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    m.notify_wake().await;

    let seen = collect_until(&mut rx, Duration::from_secs(3), |_| false).await;

    assert!(seen.iter().any(|o| o.reason == ReasonCode::R105_WAKE_RESTART));
    assert_eq!(count(&seen, ActionOutcome::LockIssued), 0);
    assert_eq!(dry.lock_calls(), 0);
    assert!(m.wake_clock().time_since_wake().is_some());
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_config_swap() {
    let dry = Arc::new(DryRunActuator::new());
    let mut m = Monitor::new(config(10), dry.clone(), source(&[-80; 6], Duration::from_millis(100)), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(m.configure(config(3)).await);

    let seen = collect_until(&mut rx, Duration::from_secs(2), |o| o.action == ActionOutcome::LockIssued).await;

    assert!(seen.iter().any(|o| o.reason == ReasonCode::R105_CONFIG_APPLIED));
    assert_eq!(count(&seen, ActionOutcome::LockIssued), 1);
    assert_eq!(m.config().required_count, 3);
    m.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restart_is_a_fresh_session() {
    let dry = Arc::new(DryRunActuator::new());
    let mut m = Monitor::new(config(3), dry.clone(), source(&[-80, -80, -80], GAP), WakeClock::new());
    let mut rx = m.subscribe();
    m.start().unwrap();
    collect_until(&mut rx, Duration::from_secs(2), |o| o.action == ActionOutcome::LockIssued).await;
    assert_eq!(m.status().owner, LockOwner::Script);
    m.stop().await.unwrap();

    m.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(m.status().owner, LockOwner::None);
    assert_eq!(m.status().consecutive_far, 0);
    m.stop().await.unwrap();
}
