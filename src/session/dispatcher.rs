//! Press/release protocol for operator controls
//!
//! Each momentary control runs its own small state machine:
//!
//! ```text
//! Idle ──press──▶ Pressed ──write ok──▶ release writes ──▶ Idle + cooldown
//!                    │
//!                    └──write failed──▶ Idle (a later release skips)
//! ```
//!
//! State lives in one [`ButtonState`] per control, each behind its own lock,
//! so operating two controls at once never contends. Writes go through the
//! connection manager, which routes them to the session's link worker.

use crate::error::Result;
use crate::session::manager::ConnectionManager;
use crate::session::status::StatusEvent;
use crate::types::ActionKind;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Per-control interaction state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    /// Presses are ignored until this instant
    pub cooldown_until: Option<Instant>,
    /// A press was accepted and its release is pending
    pub interaction_in_progress: bool,
    /// The most recent press write succeeded
    pub last_press_succeeded: bool,
    /// Local view of a toggle control
    pub toggled: bool,
}

impl ButtonState {
    pub fn cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

/// One [`ButtonState`] per control
#[derive(Debug)]
pub struct ControlBoard {
    states: [Mutex<ButtonState>; ActionKind::ALL.len()],
}

impl Default for ControlBoard {
    fn default() -> Self {
        Self {
            states: std::array::from_fn(|_| Mutex::new(ButtonState::default())),
        }
    }
}

impl ControlBoard {
    fn lock(&self, kind: ActionKind) -> MutexGuard<'_, ButtonState> {
        self.states[kind as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of one control's state
    pub fn get(&self, kind: ActionKind) -> ButtonState {
        *self.lock(kind)
    }

    /// Forget every pending interaction and toggle (session teardown)
    pub fn reset_all(&self) {
        for kind in ActionKind::ALL {
            *self.lock(kind) = ButtonState::default();
        }
    }
}

/// Why a press was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Inside the post-release cooldown window
    CoolingDown,
    /// The previous press has not been released yet
    AlreadyPressed,
    /// No active session
    Disabled,
}

/// Result of a press (or horn toggle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PressOutcome {
    Written { symbol: String, value: bool },
    Ignored(IgnoreReason),
}

/// Result of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Written { symbol: String, value: bool },
    /// The press did not reach the device, so nothing is written
    Skipped,
    /// The control is a toggle and has no release phase
    NotMomentary,
}

/// Drives operator controls against the active session
#[derive(Clone)]
pub struct ActionDispatcher {
    manager: ConnectionManager,
    cooldown: Duration,
}

impl ActionDispatcher {
    pub fn new(manager: ConnectionManager) -> Self {
        let cooldown = manager.config().session.cooldown();
        Self { manager, cooldown }
    }

    /// Press a control
    ///
    /// Toggle controls are activated instead. Ignored presses return
    /// `Ok(PressOutcome::Ignored(..))`; a failed write returns the error and
    /// leaves the control free for an immediate retry.
    pub fn press(&self, kind: ActionKind) -> Result<PressOutcome> {
        if !kind.is_momentary() {
            return self.toggle_horn();
        }

        let mut state = self.manager.controls().lock(kind);
        if state.cooling_down(Instant::now()) {
            tracing::trace!("{} press ignored, cooling down", kind);
            return Ok(PressOutcome::Ignored(IgnoreReason::CoolingDown));
        }
        if state.interaction_in_progress {
            return Ok(PressOutcome::Ignored(IgnoreReason::AlreadyPressed));
        }
        if !self.manager.is_connected() {
            return Ok(PressOutcome::Ignored(IgnoreReason::Disabled));
        }

        state.interaction_in_progress = true;
        state.last_press_succeeded = false;

        let value = kind.press_value();
        match self.manager.write_control(kind, value) {
            Ok(symbol) => {
                state.last_press_succeeded = true;
                tracing::debug!("{} pressed: {} <- {}", kind, symbol, value);
                Ok(PressOutcome::Written { symbol, value })
            }
            Err(e) => {
                state.interaction_in_progress = false;
                tracing::warn!("{} press failed: {}", kind, e);
                self.notify_failure(kind, &e);
                Err(e)
            }
        }
    }

    /// Release a control
    ///
    /// Writes the release value only if the matching press reached the
    /// device; a successful release starts the cooldown.
    pub fn release(&self, kind: ActionKind) -> Result<ReleaseOutcome> {
        if !kind.is_momentary() {
            return Ok(ReleaseOutcome::NotMomentary);
        }

        let mut state = self.manager.controls().lock(kind);
        let pressed = std::mem::take(&mut state.interaction_in_progress);
        let succeeded = std::mem::take(&mut state.last_press_succeeded);
        if !(pressed && succeeded) {
            tracing::trace!("{} release skipped", kind);
            return Ok(ReleaseOutcome::Skipped);
        }

        let value = kind.release_value();
        match self.manager.write_control(kind, value) {
            Ok(symbol) => {
                state.cooldown_until = Some(Instant::now() + self.cooldown);
                tracing::debug!("{} released: {} <- {}", kind, symbol, value);
                Ok(ReleaseOutcome::Written { symbol, value })
            }
            Err(e) => {
                tracing::warn!("{} release failed: {}", kind, e);
                self.notify_failure(kind, &e);
                Err(e)
            }
        }
    }

    /// Invert the remote horn-disable flag
    pub fn toggle_horn(&self) -> Result<PressOutcome> {
        let kind = ActionKind::DisableHorn;
        let mut state = self.manager.controls().lock(kind);
        if !self.manager.is_connected() {
            return Ok(PressOutcome::Ignored(IgnoreReason::Disabled));
        }

        let current = self.manager.read_control(kind).inspect_err(|e| {
            tracing::warn!("Horn state read failed: {}", e);
            self.notify_failure(kind, e);
        })?;

        let value = !current;
        match self.manager.write_control(kind, value) {
            Ok(symbol) => {
                state.toggled = value;
                tracing::info!("Horn {}", if value { "disabled" } else { "enabled" });
                Ok(PressOutcome::Written { symbol, value })
            }
            Err(e) => {
                state.toggled = false;
                tracing::warn!("Horn toggle failed: {}", e);
                self.notify_failure(kind, &e);
                Err(e)
            }
        }
    }

    /// Local view of the horn toggle
    pub fn horn_toggled(&self) -> bool {
        self.manager.controls().get(ActionKind::DisableHorn).toggled
    }

    pub fn button_state(&self, kind: ActionKind) -> ButtonState {
        self.manager.controls().get(kind)
    }

    fn notify_failure(&self, kind: ActionKind, error: &crate::error::AdsError) {
        self.manager
            .notifier()
            .notify(StatusEvent::error(format!("{} failed", kind)).with_detail(error));
    }
}
