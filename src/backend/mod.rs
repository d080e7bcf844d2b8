//! Backend module: the layer immediately above the wire protocol
//!
//! This module holds the seam to the raw device client and the single
//! serialization point every session request goes through.
//!
//! # Components
//!
//! - [`DeviceTransport`] / [`DeviceLink`] - Traits implemented by the wire-level client
//! - [`LinkWorker`] - Thread that owns an open link and serves requests in order
//! - [`LinkClient`] - Cloneable accessor used by the monitor and the dispatcher
//! - [`LinkHandle`] - Owning handle; closing it closes the link
//! - [`SimulatedDevice`] - In-memory controller for tests and the bench console
//!
//! # Example
//!
//! ```ignore
//! use superads_rs::backend::{DeviceTransport, LinkWorker, SimulatedDevice};
//! use std::time::Duration;
//!
//! let device = SimulatedDevice::new().with_symbol("MAIN.Run", false);
//! let link = device.open("5.2.1.1.1.1", 851)?;
//! let handle = LinkWorker::spawn(link, "LGV01", Duration::from_secs(2))?;
//!
//! let client = handle.client();
//! client.write_bool("MAIN.Run", true)?;
//! handle.close();
//! ```

pub mod device_trait;
pub mod sim_device;
pub mod worker;

pub use device_trait::{DeviceLink, DeviceTransport, LinkStats};
pub use sim_device::{SimulatedDevice, WriteRecord};
pub use worker::{LinkClient, LinkHandle, LinkWorker};
