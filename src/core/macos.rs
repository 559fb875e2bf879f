//! macOS actuator: osascript, ioreg, caffeinate and the login keychain
//!
//! Requires Accessibility permission for the terminal (or app bundle)
//! running this process.

use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::actuator::LockActuator;
use crate::error::ActuatorError;

lazy_static! {
    /// `"CGSSessionScreenIsLocked" = Yes` in `ioreg -n Root -d1` output
    static ref SCREEN_LOCKED_RE: Regex =
        Regex::new(r#""CGSSessionScreenIsLocked"\s*=\s*(Yes|No)"#).unwrap();
}

const LOCK_KEYSTROKE: &str =
    r#"tell application "System Events" to keystroke "q" using {command down, control down}"#;
const SCREEN_SAVER: &str = r#"tell application "ScreenSaverEngine" to activate"#;

/// Pause between waking the display and typing
const LOGIN_WINDOW_DELAY_MS: u64 = 500;

/// Actuator backed by macOS command-line tools
#[derive(Debug, Clone)]
pub struct MacActuator {
    keychain_item: String,
    use_screen_saver_lock: bool,
    command_timeout: Duration,
}

impl MacActuator {
    pub fn new(keychain_item: impl Into<String>, use_screen_saver_lock: bool, command_timeout: Duration) -> Self {
        Self {
            keychain_item: keychain_item.into(),
            use_screen_saver_lock,
            command_timeout,
        }
    }

    /// Run a command to completion, failing on non-zero exit
    async fn run(&self, program: &str, args: &[&str], what: &'static str) -> Result<Vec<u8>, ActuatorError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| ActuatorError::Timeout(what))??;

        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not allowed") {
            return Err(ActuatorError::PermissionDenied(what));
        }
        Err(ActuatorError::CommandFailed {
            command: program.to_string(),
            stderr,
        })
    }

    async fn osascript(&self, script: &str, what: &'static str) -> Result<(), ActuatorError> {
        self.run("osascript", &["-e", script], what).await.map(|_| ())
    }

    /// Fetch the unlock password for the current user
    async fn password(&self) -> Result<String, ActuatorError> {
        let user = current_user();
        let stdout = self
            .run("security", &keychain_find_args(&user, &self.keychain_item, true), "keychain lookup")
            .await
            .map_err(|e| match e {
                ActuatorError::CommandFailed { .. } => ActuatorError::CredentialMissing(self.keychain_item.clone()),
                other => other,
            })?;
        let password = String::from_utf8_lossy(&stdout).trim_end_matches(['\r', '\n']).to_string();
        if password.is_empty() {
            return Err(ActuatorError::CredentialMissing(self.keychain_item.clone()));
        }
        Ok(password)
    }

    /// Store the unlock password in the login keychain, updating an existing
    /// entry in place. Returns true when an entry was replaced.
    pub async fn store_password(&self, password: &str) -> Result<bool, ActuatorError> {
        let user = current_user();
        let exists = self
            .run("security", &keychain_find_args(&user, &self.keychain_item, false), "keychain lookup")
            .await
            .is_ok();
        self.run(
            "security",
            &keychain_add_args(&user, &self.keychain_item, password, exists),
            "keychain store",
        )
        .await?;
        info!(item = %self.keychain_item, updated = exists, "unlock password stored");
        Ok(exists)
    }

    /// Nudge the display awake without waiting for caffeinate to exit
    fn wake_display(&self) {
        match Command::new("caffeinate")
            .args(["-u", "-t", "1"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => debug!("display wake requested"),
            Err(e) => debug!(error = %e, "caffeinate unavailable"),
        }
    }
}

#[async_trait]
impl LockActuator for MacActuator {
    async fn lock(&self) -> Result<(), ActuatorError> {
        if !self.use_screen_saver_lock {
            match self.osascript(LOCK_KEYSTROKE, "lock").await {
                Ok(()) => {
                    info!("screen locked");
                    return Ok(());
                }
                Err(ActuatorError::PermissionDenied(what)) => {
                    warn!("accessibility permission needed: System Settings → Privacy & Security → Accessibility");
                    debug!(what, "falling back to screen saver");
                }
                Err(e) => debug!(error = %e, "lock keystroke failed, falling back to screen saver"),
            }
        }
        self.osascript(SCREEN_SAVER, "screen saver lock").await?;
        info!("screen locked (via screen saver)");
        Ok(())
    }

    async fn unlock(&self) -> Result<(), ActuatorError> {
        self.wake_display();
        tokio::time::sleep(Duration::from_millis(LOGIN_WINDOW_DELAY_MS)).await;

        let password = self.password().await?;
        let script = format!(
            "tell application \"System Events\"\n    keystroke \"{}\"\n    delay 0.1\n    key code 36\nend tell",
            escape_applescript(&password)
        );
        self.osascript(&script, "unlock").await?;
        info!("unlock command executed");
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, ActuatorError> {
        let stdout = self.run("ioreg", &["-n", "Root", "-d1"], "lock probe").await?;
        Ok(parse_screen_locked(&String::from_utf8_lossy(&stdout)))
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_default()
}

/// `security find-generic-password` arguments; `-w` prints the secret
pub fn keychain_find_args<'a>(account: &'a str, item: &'a str, print_password: bool) -> Vec<&'a str> {
    let mut args = vec!["find-generic-password"];
    if print_password {
        args.push("-w");
    }
    args.extend(["-a", account, "-s", item]);
    args
}

/// `security add-generic-password` arguments; `-U` updates an existing entry
pub fn keychain_add_args<'a>(account: &'a str, item: &'a str, password: &'a str, update: bool) -> Vec<&'a str> {
    let mut args = vec!["add-generic-password", "-a", account, "-s", item, "-w", password];
    if update {
        args.push("-U");
    }
    args
}

/// Missing key means nobody is at the login window: unlocked
pub fn parse_screen_locked(ioreg_output: &str) -> bool {
    SCREEN_LOCKED_RE
        .captures(ioreg_output)
        .map(|c| &c[1] == "Yes")
        .unwrap_or(false)
}

/// Escape a string for use inside an AppleScript string literal
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locked() {
        let out = r#"  | {"IOConsoleUsers" = ({"kCGSSessionOnConsoleKey"=Yes,"CGSSessionScreenIsLocked"=Yes,"kCGSSessionUserNameKey"="me"})}"#;
        assert!(parse_screen_locked(out));
    }

    #[test]
    fn test_parse_unlocked_and_missing() {
        assert!(!parse_screen_locked(r#""CGSSessionScreenIsLocked" = No"#));
        assert!(!parse_screen_locked(r#"{"kCGSSessionOnConsoleKey"=Yes}"#));
        assert!(!parse_screen_locked(""));
    }

    #[test]
    fn test_keychain_find_args() {
        assert_eq!(
            keychain_find_args("me", "proxi-lock-password", true),
            vec!["find-generic-password", "-w", "-a", "me", "-s", "proxi-lock-password"]
        );
        assert!(!keychain_find_args("me", "item", false).contains(&"-w"));
    }

    #[test]
    fn test_keychain_add_args_update_flag() {
        let create = keychain_add_args("me", "item", "s3cret", false);
        assert_eq!(create, vec!["add-generic-password", "-a", "me", "-s", "item", "-w", "s3cret"]);
        let update = keychain_add_args("me", "item", "s3cret", true);
        assert_eq!(update.last(), Some(&"-U"));
        assert_eq!(&update[..update.len() - 1], &create[..]);
    }

    #[test]
    fn test_escape_applescript() {
        assert_eq!(escape_applescript(r#"pa"ss\word"#), r#"pa\"ss\\word"#);
        assert_eq!(escape_applescript("plain"), "plain");
    }
}
