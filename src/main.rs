//! Proxi-Lock CLI
//!
//! Usage:
//!   blescan | proxilock --target "My Phone"       # Samples from stdin
//!   proxilock --scanner "blescan --json"          # Spawn a scanner
//!   proxilock --replay samples.txt --dry-run      # Replay a recording
//!   proxilock --serve                             # Also run the status API
//!   proxilock --json                              # JSON output
//!   proxilock set-password                        # Store the unlock password
//!
//! Send SIGUSR1 (or POST /wake) after the host wakes from sleep.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing_subscriber::EnvFilter;

use proxilock::core::{
    run_server, CommandSource, DryRunActuator, LockActuator, MacActuator, Monitor, ProxiLockConfig,
    SampleSource, ScriptedSource, SharedMonitor, StdinSource, WakeClock,
};
use proxilock::types::{ActionOutcome, DecisionOutput, ReasonCode};
use proxilock::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "proxilock",
    version = VERSION,
    about = "Proxi-Lock - lock when your beacon walks away, unlock when it returns",
    long_about = "Proxi-Lock follows one BLE beacon's signal strength and locks the host\n\
                  once the beacon has read FAR for enough consecutive samples.\n\
                  It unlocks again only if it was the one that locked.\n\n\
                  Sample lines: '<identity> <rssi>' or JSON {\"identity\", \"rssi\"}.\n\n\
                  Zones:\n  \
                  NEAR - rssi >= unlock threshold\n  \
                  MID  - between the thresholds\n  \
                  FAR  - rssi <= lock threshold, or no signal"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: ~/Library/Application Support/Proxi-Lock/.proxi_lock_config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Beacon identity to follow (overrides and saves target_name)
    #[arg(short, long)]
    target: Option<String>,

    /// Never unlock automatically
    #[arg(long)]
    lock_only: bool,

    /// Log lock/unlock instead of performing them
    #[arg(long)]
    dry_run: bool,

    /// Scanner command whose stdout yields sample lines
    #[arg(long, conflicts_with = "replay")]
    scanner: Option<String>,

    /// Replay sample lines from a file
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Gap between replayed samples (milliseconds)
    #[arg(long, default_value_t = 200)]
    replay_gap_ms: u64,

    /// Run the HTTP status API
    #[arg(short, long)]
    serve: bool,

    /// Server address
    #[arg(long, default_value = "127.0.0.1:7878")]
    addr: String,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the unlock password in the login keychain
    SetPassword,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proxilock=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = args.config.clone().unwrap_or_else(ProxiLockConfig::default_path);
    let mut config = ProxiLockConfig::load(&path)?;
    if let Some(Command::SetPassword) = args.command {
        return set_password(&config).await;
    }
    if let Some(target) = &args.target {
        config.set_target_name(Some(target.clone()))?;
    }
    if args.lock_only {
        config.lock_only_mode = true;
    }

    let engine_config = config.engine_config();
    let actuator: Arc<dyn LockActuator> = if args.dry_run {
        Arc::new(DryRunActuator::new())
    } else {
        Arc::new(MacActuator::new(
            config.keychain_item.clone(),
            config.use_screen_saver_lock,
            engine_config.call_timeout(),
        ))
    };
    let source = build_source(&args)?;

    print_header(&config, source.name(), args.dry_run);

    let mut monitor = Monitor::new(engine_config, actuator, source, WakeClock::new());
    let updates = monitor.subscribe();
    monitor.start()?;
    let monitor: SharedMonitor = Arc::new(Mutex::new(monitor));

    let printer = tokio::spawn(print_updates(updates, args.json));
    if args.serve {
        let shared = Arc::clone(&monitor);
        let addr = args.addr.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, shared).await {
                eprintln!("{} {}", "server error:".red(), e);
            }
        });
    }

    wait_for_shutdown(&monitor).await;

    monitor.lock().await.stop().await?;
    printer.abort();
    println!("\nMonitoring stopped.");
    Ok(())
}

/// Prompt twice without echo and store the password under `keychain_item`
async fn set_password(config: &ProxiLockConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", "Proxi-Lock password setup".bold());
    println!("  Stored in the login keychain as `{}`, used only for auto-unlock.\n", config.keychain_item);

    let (password, confirm) = tokio::task::spawn_blocking(|| -> std::io::Result<(String, String)> {
        let password = prompt_hidden("Enter your Mac password: ")?;
        let confirm = prompt_hidden("Confirm password: ")?;
        Ok((password, confirm))
    })
    .await??;
    if password.is_empty() {
        return Err("password cannot be empty".into());
    }
    if password != confirm {
        return Err("passwords don't match".into());
    }

    let actuator = MacActuator::new(
        config.keychain_item.clone(),
        config.use_screen_saver_lock,
        config.engine_config().call_timeout(),
    );
    if actuator.store_password(&password).await? {
        println!("{}", "✅ Password updated in keychain".green());
    } else {
        println!("{}", "✅ Password stored in keychain".green());
    }
    println!("  Grant Accessibility permission: System Settings → Privacy & Security → Accessibility");
    Ok(())
}

/// Read one line from the terminal without echoing it
fn prompt_hidden(prompt: &str) -> std::io::Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    crossterm::terminal::enable_raw_mode()?;
    let line = read_hidden_line();
    let _ = crossterm::terminal::disable_raw_mode();
    println!();
    line
}

fn read_hidden_line() -> std::io::Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}

fn build_source(args: &Args) -> Result<Box<dyn SampleSource>, Box<dyn std::error::Error + Send + Sync>> {
    if let Some(path) = &args.replay {
        let text = std::fs::read_to_string(path)?;
        let source = ScriptedSource::from_lines(&text, Duration::from_millis(args.replay_gap_ms));
        if source.is_empty() {
            return Err(format!("no samples in {}", path.display()).into());
        }
        return Ok(Box::new(source));
    }
    if let Some(command_line) = &args.scanner {
        let source = CommandSource::from_command_line(command_line).ok_or("empty --scanner command")?;
        return Ok(Box::new(source));
    }
    Ok(Box::new(StdinSource::new()))
}

/// Block until Ctrl-C, forwarding SIGUSR1 as a wake notification
#[cfg(unix)]
async fn wait_for_shutdown(monitor: &SharedMonitor) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut wake = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "SIGUSR1 handler unavailable, wake only via API");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(()) = wake.recv() => {
                println!("{}", "⏰ System wake - restarting scanner".cyan());
                monitor.lock().await.notify_wake().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_monitor: &SharedMonitor) {
    let _ = tokio::signal::ctrl_c().await;
}

/// Print the live decision stream
async fn print_updates(mut rx: broadcast::Receiver<DecisionOutput>, json: bool) {
    loop {
        let output = match rx.recv().await {
            Ok(output) => output,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if json {
            match serde_json::to_string(&output) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "output not serializable"),
            }
            continue;
        }
        if colored::control::SHOULD_COLORIZE.should_colorize() {
            println!("{}", output.to_terminal_string());
        } else {
            println!("{}", output.to_parseable_string());
        }
        print_action_message(&output);
    }
}

/// Highlight lock and unlock events
fn print_action_message(output: &DecisionOutput) {
    match output.action {
        ActionOutcome::LockIssued => println!("{}", "  🔒 Screen locked (owner: SCRIPT)".green()),
        ActionOutcome::UnlockIssued => println!("{}", "  🔓 Screen unlocked".green()),
        ActionOutcome::LockFailed => println!("{}", "  ⚠ Lock attempt failed".red()),
        ActionOutcome::UnlockFailed => println!("{}", "  ⚠ Unlock attempt failed".red()),
        ActionOutcome::UnlockSkipped if output.reason == ReasonCode::R104_UNLOCK_BLOCKED_USER => {
            println!("{}", "  ✋ Locked by user - unlock blocked".yellow())
        }
        _ => {}
    }
}

/// Print header
fn print_header(config: &ProxiLockConfig, source: &str, dry_run: bool) {
    println!("{}", format!("Proxi-Lock v{}", VERSION).bold());
    println!(
        "  target={} | near>={} | far<={} | consecutive={} | source={}{}{}",
        config.target_name.as_deref().unwrap_or("<none>"),
        config.rssi_near,
        config.rssi_far,
        config.consecutive_far_required,
        source,
        if config.lock_only_mode { " | lock-only" } else { "" },
        if dry_run { " | dry-run" } else { "" },
    );
    if let Some(path) = config.path() {
        println!("  config={}", path.display());
    }
    println!();
}
