//! Persisted configuration and the engine snapshot derived from it
//!
//! The file is pretty JSON. Unknown keys are ignored, missing keys take
//! defaults, and an unreadable file is replaced with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::debouncer::DebouncePolicy;
use crate::error::ConfigError;
use crate::types::ThresholdConfig;
use crate::{
    CALL_TIMEOUT_SECS, DEFAULT_CONSECUTIVE_FAR_REQUIRED, DEFAULT_KEYCHAIN_ITEM, DEFAULT_LOCK_RSSI,
    DEFAULT_MAX_UNLOCKING_RSSI, DEFAULT_UNLOCK_RSSI, DEVICE_TIMEOUT_SECS, SCAN_INTERVAL_SECS,
    SCRIPT_GRACE_SECS, WAKE_DEBOUNCE_SECS, WAKE_GRACE_SECS,
};

/// File name used inside the config directory
pub const CONFIG_FILE_NAME: &str = ".proxi_lock_config.json";

/// Debounce policy as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebouncePolicyName {
    #[default]
    ResetOnNonFar,
    ResetAboveMidpoint,
}

/// On-disk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxiLockConfig {
    /// Advertised name of the beacon to follow
    pub target_name: Option<String>,
    pub rssi_near: i16,
    pub rssi_far: i16,
    /// Midpoint for the `reset_above_midpoint` policy, kept inside
    /// `[rssi_far, rssi_near]`
    pub max_unlocking_rssi: i16,
    pub scan_interval: f64,
    pub device_timeout: f64,
    pub consecutive_far_required: u32,
    pub keychain_item: String,
    pub use_screen_saver_lock: bool,
    pub lock_only_mode: bool,
    pub debounce_policy: DebouncePolicyName,
    pub script_grace_secs: f64,
    pub wake_grace_secs: f64,
    pub wake_debounce_secs: f64,
    pub call_timeout_secs: f64,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for ProxiLockConfig {
    fn default() -> Self {
        Self {
            target_name: None,
            rssi_near: DEFAULT_UNLOCK_RSSI,
            rssi_far: DEFAULT_LOCK_RSSI,
            max_unlocking_rssi: DEFAULT_MAX_UNLOCKING_RSSI,
            scan_interval: SCAN_INTERVAL_SECS,
            device_timeout: DEVICE_TIMEOUT_SECS,
            consecutive_far_required: DEFAULT_CONSECUTIVE_FAR_REQUIRED,
            keychain_item: DEFAULT_KEYCHAIN_ITEM.to_string(),
            use_screen_saver_lock: false,
            lock_only_mode: false,
            debounce_policy: DebouncePolicyName::default(),
            script_grace_secs: SCRIPT_GRACE_SECS,
            wake_grace_secs: WAKE_GRACE_SECS,
            wake_debounce_secs: WAKE_DEBOUNCE_SECS,
            call_timeout_secs: CALL_TIMEOUT_SECS,
            path: None,
        }
    }
}

impl ProxiLockConfig {
    /// `$HOME/Library/Application Support/Proxi-Lock/.proxi_lock_config.json`,
    /// or the working directory when `HOME` is unset
    pub fn default_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Proxi-Lock")
                .join(CONFIG_FILE_NAME),
            None => PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    /// Load from `path`. A missing file is created with defaults; a corrupt
    /// one is overwritten with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let mut cfg = Self::default();
            cfg.path = Some(path.to_path_buf());
            cfg.save()?;
            info!(path = %path.display(), "created default config");
            return Ok(cfg);
        }

        let raw = std::fs::read_to_string(path)?;
        let mut cfg = match serde_json::from_str::<Self>(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                let mut cfg = Self::default();
                cfg.path = Some(path.to_path_buf());
                cfg.save()?;
                return Ok(cfg);
            }
        };
        cfg.path = Some(path.to_path_buf());
        if cfg.validate() {
            cfg.save()?;
        }
        Ok(cfg)
    }

    /// Write to the path this config was loaded from. No-op for in-memory configs.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Repair invalid values in place. Returns true if anything changed.
    pub fn validate(&mut self) -> bool {
        let before = self.clone();

        if self.rssi_near <= self.rssi_far {
            warn!(
                rssi_near = self.rssi_near,
                rssi_far = self.rssi_far,
                "rssi_near must exceed rssi_far, restoring defaults"
            );
            self.rssi_near = DEFAULT_UNLOCK_RSSI;
            self.rssi_far = DEFAULT_LOCK_RSSI;
        }
        self.max_unlocking_rssi = self.max_unlocking_rssi.clamp(self.rssi_far, self.rssi_near);
        self.consecutive_far_required = self.consecutive_far_required.max(1);
        for (value, default) in [
            (&mut self.scan_interval, SCAN_INTERVAL_SECS),
            (&mut self.device_timeout, DEVICE_TIMEOUT_SECS),
            (&mut self.script_grace_secs, SCRIPT_GRACE_SECS),
            (&mut self.wake_grace_secs, WAKE_GRACE_SECS),
            (&mut self.wake_debounce_secs, WAKE_DEBOUNCE_SECS),
            (&mut self.call_timeout_secs, CALL_TIMEOUT_SECS),
        ] {
            *value = clamp_secs(*value, default);
        }

        *self != before
    }

    pub fn set_target_name(&mut self, name: Option<String>) -> Result<(), ConfigError> {
        self.target_name = name;
        self.save()
    }

    /// Snapshot consumed by the decision loop
    pub fn engine_config(&self) -> EngineConfig {
        let debounce_policy = match self.debounce_policy {
            DebouncePolicyName::ResetOnNonFar => DebouncePolicy::ResetOnNonFar,
            DebouncePolicyName::ResetAboveMidpoint => DebouncePolicy::ResetAboveMidpoint {
                midpoint_rssi: self.max_unlocking_rssi,
            },
        };
        EngineConfig {
            target: self.target_name.clone(),
            thresholds: ThresholdConfig {
                unlock_rssi: self.rssi_near,
                lock_rssi: self.rssi_far,
            },
            required_count: self.consecutive_far_required,
            lock_only_mode: self.lock_only_mode,
            debounce_policy,
            script_grace_secs: self.script_grace_secs,
            wake_grace_secs: self.wake_grace_secs,
            wake_debounce_secs: self.wake_debounce_secs,
            scan_interval_secs: self.scan_interval,
            device_timeout_secs: self.device_timeout,
            call_timeout_secs: self.call_timeout_secs,
        }
    }
}

/// Immutable snapshot the decision engine runs against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Only samples from this identity are classified
    pub target: Option<String>,
    pub thresholds: ThresholdConfig,
    pub required_count: u32,
    pub lock_only_mode: bool,
    pub debounce_policy: DebouncePolicy,
    pub script_grace_secs: f64,
    pub wake_grace_secs: f64,
    pub wake_debounce_secs: f64,
    pub scan_interval_secs: f64,
    pub device_timeout_secs: f64,
    pub call_timeout_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        ProxiLockConfig::default().engine_config()
    }
}

impl EngineConfig {
    pub fn script_grace(&self) -> Duration {
        secs(self.script_grace_secs, SCRIPT_GRACE_SECS)
    }

    pub fn wake_grace(&self) -> Duration {
        secs(self.wake_grace_secs, WAKE_GRACE_SECS)
    }

    pub fn wake_debounce(&self) -> Duration {
        secs(self.wake_debounce_secs, WAKE_DEBOUNCE_SECS)
    }

    /// Poll period, never zero
    pub fn scan_interval(&self) -> Duration {
        secs(self.scan_interval_secs, SCAN_INTERVAL_SECS).max(Duration::from_millis(10))
    }

    pub fn device_timeout(&self) -> Duration {
        secs(self.device_timeout_secs, DEVICE_TIMEOUT_SECS)
    }

    pub fn call_timeout(&self) -> Duration {
        secs(self.call_timeout_secs, CALL_TIMEOUT_SECS)
    }

    pub fn accepts(&self, identity: &str) -> bool {
        self.target.as_deref() == Some(identity)
    }
}

/// Upper bound for every configured period or timeout
pub const MAX_TIMING_SECS: f64 = 86_400.0;

/// Negative or non-finite values take `fallback`; large ones are capped
fn clamp_secs(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value.min(MAX_TIMING_SECS)
    } else {
        fallback
    }
}

fn secs(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(clamp_secs(value, fallback)).unwrap_or(Duration::from_secs_f64(fallback))
}
