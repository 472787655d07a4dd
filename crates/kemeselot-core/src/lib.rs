pub mod bridge;
pub mod config;
pub mod daemon;
pub mod daemon_control;
pub mod error;
pub mod ipc;
pub mod lock_gate;
pub mod monitor;
pub mod overlay;
pub mod permissions;
pub mod speech;
pub mod supervisor;

pub use bridge::{Bridge, BridgeStatus};
pub use daemon::Daemon;
pub use error::BridgeError;
pub use lock_gate::{GateState, LockSession, RitualEvent};
pub use supervisor::{RestoreReason, ServiceSupervisor};
