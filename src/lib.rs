//! # SuperADS-RS: session manager for ADS-controlled vehicles
//!
//! A control client for one industrial controller (PLC/LGV) selected from a
//! fleet list. The crate covers the device session: connecting, watching the
//! device's run-state, the press/release protocol for operator controls and
//! the mapping of those controls to wire-level symbol names.
//!
//! ## Architecture
//!
//! - **Backend**: device link traits, the link worker thread that serializes
//!   all I/O on a connection, and an in-memory simulated device
//! - **Session**: connection manager, health monitor, action dispatcher and
//!   the status event stream
//! - **Variables**: default symbol table plus persisted user overrides
//! - **Communication**: Crossbeam channels between the front end and the
//!   background threads
//!
//! ## Configuration
//!
//! Settings and symbol overrides are stored in the platform-appropriate data
//! directory under `dev.superads.superads-rs`:
//!
//! - **Linux**: `~/.local/share/dev.superads.superads-rs/`
//! - **macOS**: `~/Library/Application Support/dev.superads.superads-rs/`
//! - **Windows**: `%APPDATA%\dev.superads.superads-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use superads_rs::{
//!     backend::SimulatedDevice,
//!     config::AppConfig,
//!     types::{ActionKind, DeviceProfile, DeviceVariant},
//!     variables::{OverrideStore, VariableResolver},
//!     Controller,
//! };
//!
//! let config = AppConfig::load_or_default();
//! let resolver = VariableResolver::open_or_defaults(OverrideStore::from_config(&config)?);
//! let (controller, status) =
//!     Controller::new(config, Arc::new(SimulatedDevice::new()), resolver.shared());
//!
//! let profile = DeviceProfile::new("LGV01", "5.2.1.1.1.1", DeviceVariant::V3);
//! controller.connect(profile)?.wait()?;
//! controller.press(ActionKind::Run)?;
//! controller.release(ActionKind::Run)?;
//! controller.disconnect();
//!
//! for event in status.drain() {
//!     println!("{}", event);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod fleet;
pub mod session;
pub mod types;
pub mod variables;

// Re-export commonly used types
pub use backend::{DeviceLink, DeviceTransport, SimulatedDevice};
pub use config::AppConfig;
pub use controller::{Controller, SelectionChange};
pub use error::{AdsError, Result};
pub use fleet::Fleet;
pub use session::{ConnectionManager, StatusEvent, StatusReceiver};
pub use types::{ActionKind, DeviceProfile, DeviceVariant, SessionState};
pub use variables::{OverrideStore, VariableResolver};
