//! Core modules for Proxi-Lock

pub mod classifier;
pub mod debouncer;
pub mod arbiter;
pub mod config;
pub mod engine;
pub mod actuator;
pub mod macos;
pub mod source;
pub mod wake;
pub mod monitor;
pub mod api;

pub use classifier::classify;
pub use debouncer::{DebouncePolicy, DebounceState, Debouncer};
pub use arbiter::{transition, OwnershipArbiter};
pub use config::{DebouncePolicyName, EngineConfig, ProxiLockConfig};
pub use engine::{DecisionEngine, Intent, Step};
pub use actuator::{DryRunActuator, LockActuator};
pub use macos::MacActuator;
pub use source::{parse_sample_line, CommandSource, SampleSource, ScriptedSource, StdinSource};
pub use wake::WakeClock;
pub use monitor::Monitor;
pub use api::{create_router, run_server, SharedMonitor};
