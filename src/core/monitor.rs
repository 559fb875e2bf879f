//! Monitor: the live decision loop
//!
//! One task owns the session (debouncer + arbiter) and consumes, in order:
//! shutdown, commands (config swap, wake), the poll tick, and queued samples.
//! Only one event is evaluated at a time. Actuator calls run on their own
//! task under a timeout while samples keep queueing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::core::actuator::LockActuator;
use crate::core::config::EngineConfig;
use crate::core::engine::{DecisionEngine, Intent, Step};
use crate::core::source::SampleSource;
use crate::core::wake::{now, WakeClock};
use crate::error::{ActuatorError, MonitorError};
use crate::types::{DecisionOutput, EngineStatus, ReasonCode, Sample};
use crate::TRANSPORT_RESTART_DELAY_MS;

/// Samples buffered while an actuator call is in flight
pub const SAMPLE_QUEUE_DEPTH: usize = 256;

/// Live decision outputs kept for slow subscribers
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

enum Command {
    Configure(EngineConfig),
    Wake,
}

struct Running {
    cmd_tx: mpsc::Sender<Command>,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Held by the loop for the life of a session; released even if the loop
/// panics or is aborted
type SharedSource = Arc<Mutex<Box<dyn SampleSource>>>;

/// Owner of the monitoring lifecycle
pub struct Monitor {
    config: EngineConfig,
    actuator: Arc<dyn LockActuator>,
    wake: WakeClock,
    source: SharedSource,
    running: Option<Running>,
    status_tx: watch::Sender<EngineStatus>,
    updates_tx: broadcast::Sender<DecisionOutput>,
}

impl Monitor {
    pub fn new(
        config: EngineConfig,
        actuator: Arc<dyn LockActuator>,
        source: Box<dyn SampleSource>,
        wake: WakeClock,
    ) -> Self {
        let (status_tx, _) = watch::channel(EngineStatus::idle());
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            config,
            actuator,
            wake,
            source: Arc::new(Mutex::new(source)),
            running: None,
            status_tx,
            updates_tx,
        }
    }

    /// Start a fresh session. Returns false if already running.
    pub fn start(&mut self) -> Result<bool, MonitorError> {
        if self.is_running() {
            return Ok(false);
        }
        let source = Arc::clone(&self.source)
            .try_lock_owned()
            .map_err(|_| MonitorError::SourceUnavailable)?;
        if self.config.target.is_none() {
            warn!("no target identity configured, every sample will be ignored");
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = Session {
            engine: DecisionEngine::new(self.config.clone(), now()),
            actuator: Arc::clone(&self.actuator),
            wake: self.wake.clone(),
            status_tx: self.status_tx.clone(),
            updates_tx: self.updates_tx.clone(),
        };
        info!(source = source.name(), target = ?self.config.target, "monitoring started");
        let join = tokio::spawn(run_loop(session, source, cmd_rx, shutdown_rx));
        self.running = Some(Running { cmd_tx, shutdown_tx, join });
        Ok(true)
    }

    /// Stop the session and discard its state. No-op when not running.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let Running { cmd_tx, shutdown_tx, mut join } = running;
        drop(cmd_tx);
        let _ = shutdown_tx.send(());

        let bound = self.stop_bound();
        let result = match tokio::time::timeout(bound, &mut join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MonitorError::LoopPanicked),
            Err(_) => {
                join.abort();
                // wait for the aborted loop to drop its hold on the source
                let _ = join.await;
                Err(MonitorError::StopTimeout(bound))
            }
        };
        if result.is_err() {
            self.recover_source().await;
        }
        self.status_tx.send_modify(|s| s.monitoring = false);
        info!("monitoring stopped");
        result
    }

    /// The loop died without stopping its source; stop it here so the next
    /// `start` begins clean
    async fn recover_source(&self) {
        let mut source = self.source.lock().await;
        match tokio::time::timeout(self.config.call_timeout(), source.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "sample source stop failed"),
            Err(_) => warn!("sample source stop timed out"),
        }
    }

    /// Worst case for one loop step: tick probe, then an absent reading that
    /// confirms FAR, then probe + lock. Plus a wake restart and slack.
    fn stop_bound(&self) -> Duration {
        self.config.call_timeout() * 3
            + Duration::from_millis(TRANSPORT_RESTART_DELAY_MS)
            + Duration::from_secs(1)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.join.is_finished())
            .unwrap_or(false)
    }

    /// Swap configuration, live if running. Invalid thresholds are replaced
    /// with the previous pair; returns false when that happened.
    pub async fn configure(&mut self, mut config: EngineConfig) -> bool {
        let accepted = config.thresholds.is_valid();
        config.thresholds = config.thresholds.or_fallback(self.config.thresholds);
        self.config = config.clone();
        if let Some(running) = &self.running {
            let _ = running.cmd_tx.send(Command::Configure(config)).await;
        }
        accepted
    }

    /// Record a system wake and restart the sample source
    pub async fn notify_wake(&mut self) {
        self.wake.record_wake();
        if let Some(running) = &self.running {
            let _ = running.cmd_tx.send(Command::Wake).await;
        }
    }

    /// Record that the system is about to sleep
    pub fn notify_sleep(&self) {
        self.wake.record_sleep();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn wake_clock(&self) -> &WakeClock {
        &self.wake
    }

    /// Latest status snapshot
    pub fn status(&self) -> EngineStatus {
        self.status_tx.borrow().clone()
    }

    /// Live stream of decision outputs
    pub fn subscribe(&self) -> broadcast::Receiver<DecisionOutput> {
        self.updates_tx.subscribe()
    }
}

// =============================================================================
// LOOP
// =============================================================================

struct Session {
    engine: DecisionEngine,
    actuator: Arc<dyn LockActuator>,
    wake: WakeClock,
    status_tx: watch::Sender<EngineStatus>,
    updates_tx: broadcast::Sender<DecisionOutput>,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_loop(
    mut session: Session,
    mut source: OwnedMutexGuard<Box<dyn SampleSource>>,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let (sample_tx, mut sample_rx) = mpsc::channel(SAMPLE_QUEUE_DEPTH);
    // clear anything a crashed session left running
    let _ = source.stop().await;
    if let Err(e) = source.start(sample_tx.clone()).await {
        warn!(source = source.name(), error = %e, "sample source failed to start, target will read as absent");
    }
    let mut tick = ticker(session.engine.config().scan_interval());
    session.publish_status();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            Some(cmd) = cmd_rx.recv() => match cmd {
                Command::Configure(config) => {
                    let period = config.scan_interval();
                    let changed = period != session.engine.config().scan_interval();
                    let output = session.engine.configure(config);
                    session.emit(output);
                    if changed {
                        tick = ticker(period);
                    }
                }
                Command::Wake => {
                    session.restart_after_wake(&mut **source, &sample_tx, &mut sample_rx).await;
                }
            },
            _ = tick.tick() => session.handle_tick().await,
            Some(sample) = sample_rx.recv() => session.handle_sample(sample).await,
        }
    }

    if let Err(e) = source.stop().await {
        warn!(source = source.name(), error = %e, "sample source stop failed");
    }
}

impl Session {
    async fn handle_sample(&mut self, sample: Sample) {
        if !self.engine.config().accepts(&sample.identity) {
            trace!(identity = %sample.identity, "ignoring non-target sample");
            return;
        }
        let step = self.engine.on_sample(sample.rssi, now());
        self.drive(step).await;
    }

    async fn handle_tick(&mut self) {
        let locked = self.probe().await;
        let owner_before = self.engine.owner();
        let output = self.engine.on_tick(locked, now(), self.wake.time_since_wake());
        if output.owner != owner_before || output.reason == ReasonCode::R102_WAKE_SUPPRESSED {
            self.emit(output);
        } else {
            self.publish_status();
        }

        if self.engine.absent_due(now()) {
            let step = self.engine.on_absent(now());
            self.drive(step).await;
        }
    }

    async fn restart_after_wake(
        &mut self,
        source: &mut dyn SampleSource,
        sample_tx: &mpsc::Sender<Sample>,
        sample_rx: &mut mpsc::Receiver<Sample>,
    ) {
        info!(source = source.name(), "system wake, restarting sample source");
        let output = self.engine.on_wake(now());
        self.emit(output);

        if let Err(e) = source.stop().await {
            warn!(error = %e, "sample source stop failed");
        }
        tokio::time::sleep(Duration::from_millis(TRANSPORT_RESTART_DELAY_MS)).await;
        // readings taken before sleep say nothing about now
        let mut dropped = 0usize;
        while sample_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded pre-wake samples");
        }
        if let Err(e) = source.start(sample_tx.clone()).await {
            warn!(error = %e, "sample source restart failed, target will read as absent");
        }
    }

    /// Carry out an intent chain to completion before the next event
    async fn drive(&mut self, step: Step) {
        self.emit(step.output);
        let mut intent = step.intent;
        loop {
            intent = match intent {
                Intent::None => break,
                Intent::ProbeThenLock => {
                    let locked = self.probe().await;
                    let step = self.engine.on_lock_probe(locked);
                    self.emit(step.output);
                    step.intent
                }
                Intent::Lock => {
                    let actuator = Arc::clone(&self.actuator);
                    let result = bounded("lock", self.call_timeout(), async move { actuator.lock().await }).await;
                    if let Err(e) = &result {
                        warn!(error = %e, "lock failed");
                    }
                    let output = self.engine.on_lock_result(result.is_ok(), now());
                    self.emit(output);
                    Intent::None
                }
                Intent::Unlock => {
                    let actuator = Arc::clone(&self.actuator);
                    let result = bounded("unlock", self.call_timeout(), async move { actuator.unlock().await }).await;
                    if let Err(e) = &result {
                        warn!(error = %e, "unlock failed");
                    }
                    let output = self.engine.on_unlock_result(result.is_ok());
                    self.emit(output);
                    Intent::None
                }
            };
        }
    }

    /// Probe lock state; any failure reads as unlocked
    async fn probe(&self) -> bool {
        let actuator = Arc::clone(&self.actuator);
        match bounded("lock probe", self.call_timeout(), async move { actuator.is_locked().await }).await {
            Ok(locked) => locked,
            Err(e) => {
                debug!(error = %e, "lock probe failed, assuming unlocked");
                false
            }
        }
    }

    fn call_timeout(&self) -> Duration {
        self.engine.config().call_timeout()
    }

    fn emit(&self, output: DecisionOutput) {
        if output.action.is_actuation() {
            info!(
                zone = ?output.zone,
                rssi = ?output.rssi,
                owner = %output.owner,
                action = ?output.action,
                reason = output.reason.code(),
                "action"
            );
        } else {
            debug!(
                zone = ?output.zone,
                rssi = ?output.rssi,
                count = output.consecutive_far,
                owner = %output.owner,
                reason = output.reason.code(),
                "decision"
            );
        }
        let _ = self.updates_tx.send(output);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.engine.status());
    }
}

/// Run an actuator call on its own task, bounded by `limit`
async fn bounded<T, F>(what: &'static str, limit: Duration, fut: F) -> Result<T, ActuatorError>
where
    F: Future<Output = Result<T, ActuatorError>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ActuatorError::CommandFailed {
            command: what.to_string(),
            stderr: e.to_string(),
        }),
        Err(_) => {
            handle.abort();
            Err(ActuatorError::Timeout(what))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actuator::DryRunActuator;
    use crate::core::source::ScriptedSource;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn monitor() -> Monitor {
        let config = EngineConfig {
            target: Some("beacon".to_string()),
            ..Default::default()
        };
        let source = ScriptedSource::from_readings("beacon", &[], Duration::from_millis(10));
        Monitor::new(config, Arc::new(DryRunActuator::new()), Box::new(source), WakeClock::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let mut m = monitor();
        assert!(m.start().unwrap());
        assert!(!m.start().unwrap());
        assert!(m.is_running());
        m.stop().await.unwrap();
        m.stop().await.unwrap();
        assert!(!m.is_running());
        assert!(!m.status().monitoring);
        // source handed back, so a restart works
        assert!(m.start().unwrap());
        m.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_scan_interval_keeps_loop_alive() {
        let mut m = monitor();
        m.start().unwrap();
        let config = EngineConfig {
            scan_interval_secs: 1e300,
            call_timeout_secs: 1e300,
            ..m.config().clone()
        };
        m.configure(config).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(m.is_running());
        m.stop().await.unwrap();
        assert!(m.start().unwrap());
        m.stop().await.unwrap();
    }

    /// Source whose first `stop` never returns
    struct StuckSource {
        stuck: Arc<AtomicBool>,
        starts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SampleSource for StuckSource {
        async fn start(&mut self, _tx: mpsc::Sender<Sample>) -> Result<(), TransportError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), TransportError> {
            if self.stuck.swap(false, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_timeout() {
        let starts = Arc::new(AtomicU32::new(0));
        let stuck = Arc::new(AtomicBool::new(false));
        let source = StuckSource { stuck: Arc::clone(&stuck), starts: Arc::clone(&starts) };
        let config = EngineConfig {
            target: Some("beacon".to_string()),
            ..Default::default()
        };
        let mut m = Monitor::new(config, Arc::new(DryRunActuator::new()), Box::new(source), WakeClock::new());

        m.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stuck.store(true, Ordering::SeqCst);
        assert!(matches!(m.stop().await, Err(MonitorError::StopTimeout(_))));
        assert!(!m.is_running());

        assert!(m.start().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        m.stop().await.unwrap();
    }

    #[test]
    fn test_stop_bound_covers_three_calls() {
        let m = Monitor::new(
            EngineConfig { call_timeout_secs: 5.0, ..Default::default() },
            Arc::new(DryRunActuator::new()),
            Box::new(ScriptedSource::from_readings("beacon", &[], Duration::from_millis(10))),
            WakeClock::new(),
        );
        assert!(m.stop_bound() > Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<(), ActuatorError> = bounded("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ActuatorError::Timeout("slow"))));
    }
}
