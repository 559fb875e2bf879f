//! Sample sources: where beacon readings come from
//!
//! A source pushes `Sample`s into the monitor's queue. Sources are restartable:
//! the monitor stops and starts them again after a system wake.

use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::types::Sample;

lazy_static! {
    /// `<identity> <rssi>`; identity may contain spaces, rssi may be `none`
    static ref PLAIN_LINE_RE: Regex =
        Regex::new(r"^(?P<identity>.+?)\s+(?P<rssi>-?\d+|none|null)$").unwrap();
}

/// A restartable producer of proximity samples
#[async_trait]
pub trait SampleSource: Send {
    /// Begin pushing samples into `tx`
    async fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<(), TransportError>;
    /// Stop pushing; safe to call when not started
    async fn stop(&mut self) -> Result<(), TransportError>;
    /// Short name for logs
    fn name(&self) -> &str;
}

/// Parse one scanner output line.
///
/// Accepts JSON (`{"identity": "Phone", "rssi": -61}`) or plain
/// `Phone -61`. Blank lines and `#` comments yield `None`.
pub fn parse_sample_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if line.starts_with('{') {
        return serde_json::from_str(line).ok();
    }
    let caps = PLAIN_LINE_RE.captures(line)?;
    let rssi = match &caps["rssi"] {
        "none" | "null" => None,
        n => Some(n.parse::<i16>().ok()?),
    };
    Some(Sample::new(caps["identity"].trim(), rssi))
}

/// Forward parsed lines from `reader` until EOF or the queue closes
async fn pump_lines<R>(reader: R, tx: mpsc::Sender<Sample>, origin: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_sample_line(&line) {
                Some(sample) => {
                    if tx.send(sample).await.is_err() {
                        break;
                    }
                }
                None => debug!(origin = %origin, line = %line, "skipping unparsable line"),
            },
            Ok(None) => {
                info!(origin = %origin, "sample stream ended");
                break;
            }
            Err(e) => {
                warn!(origin = %origin, error = %e, "sample stream read failed");
                break;
            }
        }
    }
}

// =============================================================================
// COMMAND SOURCE
// =============================================================================

/// Spawns an external scanner and reads samples from its stdout
#[derive(Debug)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
    task: Option<JoinHandle<()>>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
            task: None,
        }
    }

    /// Split a shell-style command line on whitespace
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl SampleSource for CommandSource {
    async fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<(), TransportError> {
        if self.child.is_some() {
            return Err(TransportError::AlreadyRunning);
        }
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or(TransportError::NoStdout)?;
        info!(program = %self.program, "scanner started");
        self.task = Some(tokio::spawn(pump_lines(stdout, tx, self.program.clone())));
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                // already exited
                debug!(error = %e, "scanner kill");
            }
            info!(program = %self.program, "scanner stopped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

// =============================================================================
// STDIN SOURCE
// =============================================================================

/// Reads samples from standard input, e.g. `blescan | proxilock`
#[derive(Debug, Default)]
pub struct StdinSource {
    task: Option<JoinHandle<()>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleSource for StdinSource {
    async fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::AlreadyRunning);
        }
        self.task = Some(tokio::spawn(pump_lines(tokio::io::stdin(), tx, "stdin".to_string())));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdin"
    }
}

// =============================================================================
// SCRIPTED SOURCE
// =============================================================================

/// Replays a fixed list of samples with a constant gap. A restart resumes
/// where the previous run stopped.
#[derive(Debug)]
pub struct ScriptedSource {
    samples: Arc<Vec<Sample>>,
    gap: Duration,
    cursor: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn new(samples: Vec<Sample>, gap: Duration) -> Self {
        Self {
            samples: Arc::new(samples),
            gap,
            cursor: Arc::new(AtomicUsize::new(0)),
            task: None,
        }
    }

    /// Target-identity samples from a list of readings
    pub fn from_readings(identity: &str, readings: &[Option<i16>], gap: Duration) -> Self {
        let samples = readings.iter().map(|r| Sample::new(identity, *r)).collect();
        Self::new(samples, gap)
    }

    /// Samples parsed from text in the scanner line format
    pub fn from_lines(text: &str, gap: Duration) -> Self {
        Self::new(text.lines().filter_map(parse_sample_line).collect(), gap)
    }

    /// Samples delivered so far
    pub fn delivered(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    async fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::AlreadyRunning);
        }
        let samples = Arc::clone(&self.samples);
        let cursor = Arc::clone(&self.cursor);
        let gap = self.gap;
        self.task = Some(tokio::spawn(async move {
            loop {
                let i = cursor.load(Ordering::SeqCst);
                let Some(sample) = samples.get(i) else { break };
                tokio::time::sleep(gap).await;
                cursor.store(i + 1, Ordering::SeqCst);
                if tx.send(sample.clone()).await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_line() {
        let s = parse_sample_line("Sam's iPhone -67").unwrap();
        assert_eq!(s.identity, "Sam's iPhone");
        assert_eq!(s.rssi, Some(-67));
    }

    #[test]
    fn test_parse_absent_reading() {
        let s = parse_sample_line("Watch none").unwrap();
        assert_eq!(s.identity, "Watch");
        assert_eq!(s.rssi, None);
    }

    #[test]
    fn test_parse_json_line() {
        let s = parse_sample_line(r#"{"identity": "Tag", "rssi": -42}"#).unwrap();
        assert_eq!(s.identity, "Tag");
        assert_eq!(s.rssi, Some(-42));

        let s = parse_sample_line(r#"{"identity": "Tag", "rssi": null}"#).unwrap();
        assert_eq!(s.rssi, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_sample_line("").is_none());
        assert!(parse_sample_line("# comment").is_none());
        assert!(parse_sample_line("no-rssi-here").is_none());
        assert!(parse_sample_line("Tag -99999").is_none());
        assert!(parse_sample_line("{broken").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_resumes_after_restart() {
        let mut src = ScriptedSource::from_readings("t", &[Some(-1), Some(-2), Some(-3)], Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(8);
        src.start(tx.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().rssi, Some(-1));
        src.stop().await.unwrap();

        src.start(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().rssi, Some(-2));
        assert_eq!(rx.recv().await.unwrap().rssi, Some(-3));
        assert_eq!(src.delivered(), 3);
    }

    #[tokio::test]
    async fn test_pump_lines_skips_bad_lines() {
        let input: &[u8] = b"Tag -50\ngarbage\n\nTag none\n";
        let (tx, mut rx) = mpsc::channel(8);
        pump_lines(input, tx, "test".to_string()).await;
        assert_eq!(rx.recv().await.unwrap().rssi, Some(-50));
        assert_eq!(rx.recv().await.unwrap().rssi, None);
        assert!(rx.recv().await.is_none());
    }
}
