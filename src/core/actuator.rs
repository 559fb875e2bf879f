//! Lock actuator capability
//!
//! Every call may block on the OS for hundreds of milliseconds. The monitor
//! runs each one on its own task under a bounded timeout.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use async_trait::async_trait;
use tracing::info;

use crate::error::ActuatorError;

/// Physical lock / unlock / probe primitives
#[async_trait]
pub trait LockActuator: Send + Sync {
    /// Lock the host
    async fn lock(&self) -> Result<(), ActuatorError>;
    /// Wake the display and unlock with the stored credential
    async fn unlock(&self) -> Result<(), ActuatorError>;
    /// Is the host locked right now?
    async fn is_locked(&self) -> Result<bool, ActuatorError>;
}

/// In-memory actuator: logs instead of touching the host
#[derive(Debug, Default)]
pub struct DryRunActuator {
    locked: AtomicBool,
    lock_calls: AtomicU32,
    unlock_calls: AtomicU32,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate someone locking or unlocking the host by hand
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn lock_calls(&self) -> u32 {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> u32 {
        self.unlock_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockActuator for DryRunActuator {
    async fn lock(&self) -> Result<(), ActuatorError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.locked.store(true, Ordering::SeqCst);
        info!("[dry-run] lock");
        Ok(())
    }

    async fn unlock(&self) -> Result<(), ActuatorError> {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        self.locked.store(false, Ordering::SeqCst);
        info!("[dry-run] unlock");
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool, ActuatorError> {
        Ok(self.locked.load(Ordering::SeqCst))
    }
}
