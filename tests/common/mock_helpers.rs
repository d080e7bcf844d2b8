//! Simulated device and controller construction helpers

use std::sync::Arc;
use superads_rs::{
    backend::SimulatedDevice,
    config::AppConfig,
    session::StatusReceiver,
    types::DeviceVariant,
    variables::{OverrideStore, VariableResolver, VariableTable},
    Controller,
};

/// Config with fast timings for tests
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.session.health_interval_ms = super::test_interval().as_millis() as u64;
    config.session.cooldown_ms = 150;
    config.session.reply_timeout_ms = 500;
    config
}

/// A running V3 device with the core library present
pub fn v3_core_device() -> SimulatedDevice {
    SimulatedDevice::new().with_control_symbols(&VariableTable::defaults(), DeviceVariant::V3, true)
}

/// A running V3 device without the core library
pub fn v3_plain_device() -> SimulatedDevice {
    SimulatedDevice::new().with_control_symbols(&VariableTable::defaults(), DeviceVariant::V3, false)
}

/// A running V2 device
pub fn v2_device() -> SimulatedDevice {
    SimulatedDevice::new().with_control_symbols(&VariableTable::defaults(), DeviceVariant::V2, false)
}

/// Controller over `device` with in-memory overrides
pub fn controller_for(device: &SimulatedDevice) -> (Controller, StatusReceiver) {
    Controller::new(
        test_config(),
        Arc::new(device.clone()),
        VariableResolver::in_memory().shared(),
    )
}

/// Controller over `device` with overrides persisted in `store`
pub fn controller_with_store(
    device: &SimulatedDevice,
    store: OverrideStore,
) -> (Controller, StatusReceiver) {
    let resolver = VariableResolver::open(store).expect("override store should load");
    Controller::new(test_config(), Arc::new(device.clone()), resolver.shared())
}
