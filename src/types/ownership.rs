//! Lock ownership tags

use serde::{Deserialize, Serialize};

/// Who is responsible for the current lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockOwner {
    /// The engine's own lock explains the current locked state
    Script,
    /// A lock happened that the engine did not cause
    User,
    /// Unlocked, or no claim either way
    #[default]
    None,
}

impl LockOwner {
    /// Auto-unlock is only ever allowed to undo our own lock
    pub fn may_auto_unlock(&self) -> bool {
        matches!(self, LockOwner::Script)
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LockOwner::Script => "SCRIPT",
            LockOwner::User => "USER",
            LockOwner::None => "NONE",
        };
        write!(f, "{}", name)
    }
}

/// Inputs to the ownership transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipEvent {
    /// Our lock call succeeded
    ScriptLock,
    /// Probe saw unlocked → locked; `in_grace` when either grace window is open
    LockedEdge { in_grace: bool },
    /// Probe saw locked → unlocked
    UnlockedEdge,
    /// Probe value unchanged, or first observation
    NoEdge,
    /// Our unlock call succeeded
    UnlockConfirmed,
}
