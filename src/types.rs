//! Core data types for the SuperADS session layer
//!
//! This module defines the fundamental types used throughout the crate:
//!
//! - [`DeviceProfile`] - A device selected from the fleet list
//! - [`DeviceVariant`] - Controller runtime family (V2/V3)
//! - [`ActionKind`] - Logical controls exposed to the operator
//! - [`DeviceState`] - Run-state codes reported by the device
//! - [`SessionState`] - Lifecycle of the single device session

use crate::error::AdsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Controller runtime family
///
/// V2 and V3 devices use different symbol naming and listen on different ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceVariant {
    #[serde(alias = "TC2")]
    V2,
    #[serde(alias = "TC3")]
    V3,
}

impl DeviceVariant {
    pub const ALL: [DeviceVariant; 2] = [DeviceVariant::V2, DeviceVariant::V3];
}

impl fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceVariant::V2 => write!(f, "V2"),
            DeviceVariant::V3 => write!(f, "V3"),
        }
    }
}

impl FromStr for DeviceVariant {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V2" | "TC2" => Ok(DeviceVariant::V2),
            "V3" | "TC3" => Ok(DeviceVariant::V3),
            other => Err(AdsError::Config(format!("Unknown device variant '{}'", other))),
        }
    }
}

/// A device from the fleet list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Display name (e.g. "LGV01")
    pub name: String,
    /// Network address of the controller (AMS Net Id)
    pub address: String,
    /// Runtime family
    pub variant: DeviceVariant,
}

impl DeviceProfile {
    /// Create a new device profile
    pub fn new(name: impl Into<String>, address: impl Into<String>, variant: DeviceVariant) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            variant,
        }
    }

    /// Build a profile from an inventory route entry
    ///
    /// Vehicles are named `LGVnn` after their numeric id and addressed by their
    /// IP with the `.1.1` AMS suffix appended.
    pub fn from_route(id: u32, ip: &str, variant: DeviceVariant) -> Self {
        Self::new(format!("LGV{:02}", id), format!("{}.1.1", ip.trim()), variant)
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.address, self.variant)
    }
}

/// Logical operator controls
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reset,
    Run,
    Stop,
    ManAuto,
    DisableHorn,
}

impl ActionKind {
    /// Every control, in panel order
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Reset,
        ActionKind::Run,
        ActionKind::Stop,
        ActionKind::ManAuto,
        ActionKind::DisableHorn,
    ];

    /// Key used in persisted files and the console
    pub fn key(&self) -> &'static str {
        match self {
            ActionKind::Reset => "reset",
            ActionKind::Run => "run",
            ActionKind::Stop => "stop",
            ActionKind::ManAuto => "man_auto",
            ActionKind::DisableHorn => "disable_horn",
        }
    }

    /// Whether the control is a press/release button (DisableHorn is a toggle)
    pub fn is_momentary(&self) -> bool {
        !matches!(self, ActionKind::DisableHorn)
    }

    /// Value written when the control is pressed
    ///
    /// The device reads Stop as a normally-engaged signal, so its polarity is inverted.
    pub fn press_value(&self) -> bool {
        !matches!(self, ActionKind::Stop)
    }

    /// Value written when the control is released
    pub fn release_value(&self) -> bool {
        !self.press_value()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Reset => "Reset",
            ActionKind::Run => "Run",
            ActionKind::Stop => "Stop",
            ActionKind::ManAuto => "Man/Auto",
            ActionKind::DisableHorn => "Disable Horn",
        };
        f.write_str(label)
    }
}

impl FromStr for ActionKind {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '/'], "_");
        match normalized.as_str() {
            "reset" => Ok(ActionKind::Reset),
            "run" => Ok(ActionKind::Run),
            "stop" => Ok(ActionKind::Stop),
            "man_auto" | "manauto" => Ok(ActionKind::ManAuto),
            "disable_horn" | "horn" => Ok(ActionKind::DisableHorn),
            _ => Err(AdsError::Config(format!("Unknown action '{}'", s.trim()))),
        }
    }
}

/// ADS run-state codes reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Invalid,
    Idle,
    Reset,
    Init,
    Start,
    Run,
    Stop,
    SaveConfig,
    LoadConfig,
    PowerFailure,
    PowerGood,
    Error,
    Shutdown,
    Suspend,
    Resume,
    Config,
    Reconfig,
    /// A code outside the known state table
    Unknown(u16),
}

impl DeviceState {
    /// Code the device reports while its program is running
    pub const RUN_CODE: u16 = 5;

    /// Decode a raw run-state code
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => DeviceState::Invalid,
            1 => DeviceState::Idle,
            2 => DeviceState::Reset,
            3 => DeviceState::Init,
            4 => DeviceState::Start,
            5 => DeviceState::Run,
            6 => DeviceState::Stop,
            7 => DeviceState::SaveConfig,
            8 => DeviceState::LoadConfig,
            9 => DeviceState::PowerFailure,
            10 => DeviceState::PowerGood,
            11 => DeviceState::Error,
            12 => DeviceState::Shutdown,
            13 => DeviceState::Suspend,
            14 => DeviceState::Resume,
            15 => DeviceState::Config,
            16 => DeviceState::Reconfig,
            other => DeviceState::Unknown(other),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, DeviceState::Run)
    }

    /// Turn a raw code into an error unless the device is running
    pub fn require_run(code: u16) -> crate::error::Result<()> {
        let state = Self::from_code(code);
        if state.is_running() {
            Ok(())
        } else {
            Err(AdsError::InvalidDeviceState {
                code,
                state: state.to_string(),
            })
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Unknown(code) => write!(f, "Unknown({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Lifecycle state of the device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session exists
    #[default]
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Connected and the monitor is running
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting..."),
            SessionState::Connected => write!(f, "Connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity() {
        for kind in [ActionKind::Reset, ActionKind::Run, ActionKind::ManAuto] {
            assert!(kind.press_value());
            assert!(!kind.release_value());
        }
        assert!(!ActionKind::Stop.press_value());
        assert!(ActionKind::Stop.release_value());
        assert!(!ActionKind::DisableHorn.is_momentary());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("Man/Auto".parse::<ActionKind>().unwrap(), ActionKind::ManAuto);
        assert_eq!("horn".parse::<ActionKind>().unwrap(), ActionKind::DisableHorn);
        assert!("jump".parse::<ActionKind>().is_err());
        for kind in ActionKind::ALL {
            assert_eq!(kind.key().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_variant_aliases() {
        assert_eq!("tc3".parse::<DeviceVariant>().unwrap(), DeviceVariant::V3);
        let parsed: DeviceVariant = serde_json::from_str("\"TC2\"").unwrap();
        assert_eq!(parsed, DeviceVariant::V2);
    }

    #[test]
    fn test_profile_from_route() {
        let profile = DeviceProfile::from_route(7, "10.0.0.7", DeviceVariant::V2);
        assert_eq!(profile.name, "LGV07");
        assert_eq!(profile.address, "10.0.0.7.1.1");
    }

    #[test]
    fn test_device_state_codes() {
        assert!(DeviceState::require_run(DeviceState::RUN_CODE).is_ok());
        assert_eq!(DeviceState::from_code(6), DeviceState::Stop);
        assert_eq!(DeviceState::from_code(99).to_string(), "Unknown(99)");
        assert!(matches!(
            DeviceState::require_run(6),
            Err(AdsError::InvalidDeviceState { code: 6, .. })
        ));
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(SessionState::Connected.to_string(), "Connected");
    }
}
