//! Front-end facing facade
//!
//! [`Controller`] bundles the connection manager, the action dispatcher, the
//! symbol resolver and the fleet list behind the operations a front end
//! issues. Every operation returns its error to the caller and also reports
//! it through the status stream.

use crate::backend::DeviceTransport;
use crate::config::AppConfig;
use crate::error::{AdsError, Result};
use crate::fleet::Fleet;
use crate::session::{
    status_channel, ActionDispatcher, ConnectAttempt, ConnectionManager, ControlSnapshot,
    PressOutcome, ReleaseOutcome, SessionInfo, StatusEvent, StatusReceiver,
};
use crate::types::{ActionKind, DeviceProfile, DeviceVariant, SessionState};
use crate::variables::{SaveOutcome, SharedResolver, SymbolEdits};
use std::sync::{Arc, PoisonError};

/// What a selection change did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionChange {
    /// The selection moved to a different device
    pub changed: bool,
    /// The previous device still had its horn disabled
    pub horn_was_disabled: bool,
    /// The previous session was torn down
    pub disconnected: bool,
}

pub struct Controller {
    manager: ConnectionManager,
    dispatcher: ActionDispatcher,
    fleet: Fleet,
}

impl Controller {
    /// Create a controller and the receiving end of its status stream
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn DeviceTransport>,
        resolver: SharedResolver,
    ) -> (Self, StatusReceiver) {
        let (notifier, receiver) = status_channel();
        let manager = ConnectionManager::new(config, transport, resolver, notifier);
        let dispatcher = ActionDispatcher::new(manager.clone());
        let controller = Self {
            manager,
            dispatcher,
            fleet: Fleet::default(),
        };
        (controller, receiver)
    }

    pub fn with_fleet(mut self, fleet: Fleet) -> Self {
        self.fleet = fleet;
        self
    }

    /// Start connecting to `profile`
    pub fn connect(&self, profile: DeviceProfile) -> Result<ConnectAttempt> {
        self.manager.connect(profile)
    }

    /// Start connecting to the selected fleet device
    pub fn connect_selected(&self) -> Result<ConnectAttempt> {
        let profile = self.fleet.selected().cloned().ok_or_else(|| {
            let e = AdsError::Config("No device selected".to_string());
            self.manager
                .notifier()
                .notify(StatusEvent::warning("Connect rejected").with_detail(&e));
            e
        })?;
        self.manager.connect(profile)
    }

    pub fn disconnect(&self) -> bool {
        self.manager.disconnect()
    }

    pub fn press(&self, kind: ActionKind) -> Result<PressOutcome> {
        self.dispatcher.press(kind)
    }

    pub fn release(&self, kind: ActionKind) -> Result<ReleaseOutcome> {
        self.dispatcher.release(kind)
    }

    pub fn activate_horn_toggle(&self) -> Result<PressOutcome> {
        self.dispatcher.toggle_horn()
    }

    /// Persist symbol edits for one variant/core branch
    pub fn save_overrides(
        &self,
        edits: &SymbolEdits,
        variant: DeviceVariant,
        core_detected: bool,
    ) -> Result<SaveOutcome> {
        let result = self
            .manager
            .resolver()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .save_overrides(edits, variant, core_detected);

        let notifier = self.manager.notifier();
        match &result {
            Ok(SaveOutcome::NothingToSave) => {
                notifier.notify(StatusEvent::info("Nothing to save"));
            }
            Ok(SaveOutcome::Saved { changed }) => {
                let names: Vec<_> = changed.iter().map(ActionKind::to_string).collect();
                notifier.notify(StatusEvent::info("Variables saved").with_detail(names.join(", ")));
            }
            Err(e) => {
                tracing::error!("Failed to save symbol overrides: {}", e);
                notifier.notify(StatusEvent::error("Save failed").with_detail(e));
            }
        }
        result
    }

    /// Drop every symbol override
    pub fn reset_overrides(&self) -> Result<()> {
        let result = self
            .manager
            .resolver()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reset_overrides();

        let notifier = self.manager.notifier();
        match &result {
            Ok(()) => notifier.notify(StatusEvent::info("Variables reset to defaults")),
            Err(e) => {
                tracing::error!("Failed to reset symbol overrides: {}", e);
                notifier.notify(StatusEvent::error("Reset failed").with_detail(e));
            }
        }
        result
    }

    /// Select another fleet device
    ///
    /// Moving the selection ends the current session. If the horn is still
    /// disabled on the device being left, a warning is emitted first.
    pub fn select_device(&mut self, index: usize) -> Result<SelectionChange> {
        if self.fleet.get(index).is_none() {
            return self.fleet.select(index).map(|_| SelectionChange::default());
        }
        if self.fleet.selected_index() == Some(index) {
            return Ok(SelectionChange::default());
        }

        let mut change = SelectionChange {
            changed: true,
            ..SelectionChange::default()
        };

        if self.manager.is_connected() {
            if let Ok(true) = self.manager.read_control(ActionKind::DisableHorn) {
                change.horn_was_disabled = true;
                let name = self
                    .manager
                    .session_info()
                    .map(|info| info.profile.name)
                    .unwrap_or_default();
                tracing::warn!("Leaving {} with the horn disabled", name);
                self.manager.notifier().notify(
                    StatusEvent::warning("Horn is disabled")
                        .with_detail(format!("{} still has its horn disabled", name)),
                );
            }
        }

        if self.manager.state() != SessionState::Disconnected {
            change.disconnected = self.manager.disconnect();
        }

        self.fleet.select(index)?;
        Ok(change)
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.manager.session_info()
    }

    pub fn core_detected(&self) -> bool {
        self.manager.core_detected()
    }

    pub fn control_snapshot(&self) -> Option<ControlSnapshot> {
        self.manager.control_snapshot()
    }

    pub fn horn_toggled(&self) -> bool {
        self.dispatcher.horn_toggled()
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet {
        &mut self.fleet
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &SharedResolver {
        self.manager.resolver()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.manager.is_connected() {
            self.manager.disconnect();
        }
    }
}
