//! Device session layer
//!
//! This module owns the lifecycle of the single device connection and
//! everything that runs against it.
//!
//! # Components
//!
//! - [`ConnectionManager`]: single-flight connect, teardown, core detection
//! - [`HealthMonitor`]: periodic run-state check with automatic teardown
//! - [`ActionDispatcher`]: debounced press/release protocol per control
//! - [`StatusNotifier`]: ordered status events for the front end

pub mod dispatcher;
pub mod manager;
pub mod monitor;
pub mod status;

pub use dispatcher::{ActionDispatcher, ButtonState, IgnoreReason, PressOutcome, ReleaseOutcome};
pub use manager::{ConnectAttempt, ConnectionManager, ControlSnapshot, SessionInfo};
pub use monitor::{HealthMonitor, Verdict};
pub use status::{
    status_channel, Severity, StatusEvent, StatusNotifier, StatusPump, StatusReceiver, StatusSink,
    CONNECTED, DISCONNECTED,
};
