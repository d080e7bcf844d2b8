//! Connection manager: owner of the single device session
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──RUN + link ok──▶ Connected
//!       ▲                        │                           │
//!       └──── attempt failed ────┘◀──── disconnect / loss ───┘
//! ```
//!
//! One mutex guards the in-flight flag, the session slot and a generation
//! counter. Every teardown bumps the generation, so a connect attempt that
//! completes after a disconnect sees the mismatch, closes its link and fails
//! instead of resurrecting a stale session. The health monitor uses the same
//! counter to make sure a late loss report never tears down a newer session.

use crate::backend::{DeviceTransport, LinkClient, LinkHandle, LinkStats, LinkWorker};
use crate::config::AppConfig;
use crate::error::{AdsError, Result};
use crate::session::dispatcher::ControlBoard;
use crate::session::monitor::{HealthMonitor, Verdict};
use crate::session::status::{StatusEvent, StatusNotifier, CONNECTED, DISCONNECTED};
use crate::types::{ActionKind, DeviceProfile, DeviceState, DeviceVariant, SessionState};
use crate::variables::SharedResolver;
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Last known remote value of every control (`None` = read failed)
pub type ControlSnapshot = BTreeMap<ActionKind, Option<bool>>;

/// Read-only view of the active session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub profile: DeviceProfile,
    pub port: u16,
    pub core_detected: bool,
    pub connected_at: DateTime<Local>,
}

/// The active session. Owned by the manager's slot and nothing else.
struct Session {
    info: SessionInfo,
    link: LinkHandle,
    monitor: Option<HealthMonitor>,
}

#[derive(Default)]
struct SessionSlot {
    /// Profile and generation of the attempt in flight
    connecting: Option<(DeviceProfile, u64)>,
    /// Bumped by every new attempt and every teardown
    generation: u64,
    session: Option<Session>,
}

struct Shared {
    config: AppConfig,
    transport: Arc<dyn DeviceTransport>,
    resolver: SharedResolver,
    notifier: StatusNotifier,
    controls: Arc<ControlBoard>,
    slot: Mutex<SessionSlot>,
    snapshot: Mutex<Option<ControlSnapshot>>,
}

/// Owns the single device session
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// Handle to a background connect attempt
pub struct ConnectAttempt {
    result_rx: Receiver<Result<SessionInfo>>,
    thread: Option<JoinHandle<()>>,
}

impl ConnectAttempt {
    /// Block until the attempt resolves
    pub fn wait(mut self) -> Result<SessionInfo> {
        let result = self
            .result_rx
            .recv()
            .unwrap_or_else(|_| Err(AdsError::connect_failed("connect attempt aborted")));
        self.join();
        result
    }

    /// Wait up to `timeout`; `None` if the attempt is still running
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<SessionInfo>> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Some(Err(AdsError::connect_failed("connect attempt aborted")))
            }
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Clears the in-flight flag on every exit path of an attempt, panics included
struct InFlightGuard<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.shared.lock_slot();
        if matches!(slot.connecting, Some((_, g)) if g == self.generation) {
            slot.connecting = None;
        }
    }
}

impl ConnectionManager {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn DeviceTransport>,
        resolver: SharedResolver,
        notifier: StatusNotifier,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                resolver,
                notifier,
                controls: Arc::new(ControlBoard::default()),
                slot: Mutex::new(SessionSlot::default()),
                snapshot: Mutex::new(None),
            }),
        }
    }

    /// Start connecting to `profile` in the background
    ///
    /// Fails immediately with [`AdsError::Busy`] while another attempt is in
    /// flight and with [`AdsError::AlreadyConnected`] while a session exists.
    pub fn connect(&self, profile: DeviceProfile) -> Result<ConnectAttempt> {
        let generation = {
            let mut slot = self.shared.lock_slot();
            let rejected = if slot.connecting.is_some() {
                Some(AdsError::Busy)
            } else {
                slot.session
                    .as_ref()
                    .map(|s| AdsError::AlreadyConnected(s.info.profile.name.clone()))
            };
            if let Some(e) = rejected {
                drop(slot);
                tracing::debug!("Connect to {} rejected: {}", profile.name, e);
                self.shared
                    .notifier
                    .notify(StatusEvent::warning("Connect rejected").with_detail(&e));
                return Err(e);
            }
            slot.generation += 1;
            slot.connecting = Some((profile.clone(), slot.generation));
            slot.generation
        };

        tracing::info!("Connecting to {}", profile);

        let shared = Arc::clone(&self.shared);
        let (result_tx, result_rx) = bounded(1);
        let spawned = std::thread::Builder::new()
            .name(format!("ads-connect-{}", profile.name))
            .spawn(move || {
                let guard = InFlightGuard {
                    shared: &shared,
                    generation,
                };
                let result = shared.run_attempt(&profile, generation);
                if let Err(e) = &result {
                    tracing::error!("Connection to {} failed: {}", profile.name, e);
                    shared
                        .notifier
                        .notify(StatusEvent::error("Connection failed").with_detail(e));
                }
                // Flag cleared before the caller learns the outcome
                drop(guard);
                let _ = result_tx.send(result);
            });

        match spawned {
            Ok(thread) => Ok(ConnectAttempt {
                result_rx,
                thread: Some(thread),
            }),
            Err(e) => {
                self.shared.lock_slot().connecting = None;
                Err(AdsError::Io(e))
            }
        }
    }

    /// Tear down the session, if any
    ///
    /// Idempotent: without a session only the status event is re-emitted.
    /// Returns whether a session was torn down.
    pub fn disconnect(&self) -> bool {
        self.shared.teardown(None, None)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        let slot = self.shared.lock_slot();
        if slot.session.is_some() {
            SessionState::Connected
        } else if matches!(slot.connecting, Some((_, g)) if g == slot.generation) {
            SessionState::Connecting
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock_slot().session.is_some()
    }

    /// Whether a connect attempt is still running
    pub fn is_connecting(&self) -> bool {
        self.shared.lock_slot().connecting.is_some()
    }

    /// Whether the core library was detected; false unless connected
    pub fn core_detected(&self) -> bool {
        self.shared
            .lock_slot()
            .session
            .as_ref()
            .is_some_and(|s| s.info.core_detected)
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.shared
            .lock_slot()
            .session
            .as_ref()
            .map(|s| s.info.clone())
    }

    /// Request counters of the active link
    pub fn link_stats(&self) -> Option<LinkStats> {
        self.shared
            .lock_slot()
            .session
            .as_ref()
            .map(|s| s.link.client().stats())
    }

    /// Remote control values from the latest monitor tick
    pub fn control_snapshot(&self) -> Option<ControlSnapshot> {
        self.shared.lock_snapshot().clone()
    }

    /// Symbol the control resolves to on the active session
    pub fn control_symbol(&self, kind: ActionKind) -> Result<String> {
        let (_, variant, core) = self.shared.active_link()?;
        Ok(self.shared.resolve(kind, variant, core))
    }

    /// Read a control's remote value through the session
    pub fn read_control(&self, kind: ActionKind) -> Result<bool> {
        let (client, variant, core) = self.shared.active_link()?;
        let symbol = self.shared.resolve(kind, variant, core);
        client.read_bool(&symbol)
    }

    /// Write a control's remote value through the session; returns the symbol written
    pub fn write_control(&self, kind: ActionKind, value: bool) -> Result<String> {
        let (client, variant, core) = self.shared.active_link()?;
        let symbol = self.shared.resolve(kind, variant, core);
        client.write_bool(&symbol, value)?;
        Ok(symbol)
    }

    pub fn config(&self) -> &AppConfig {
        &self.shared.config
    }

    pub fn resolver(&self) -> &SharedResolver {
        &self.shared.resolver
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.shared.notifier
    }

    pub(crate) fn controls(&self) -> &Arc<ControlBoard> {
        &self.shared.controls
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Option<ControlSnapshot>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, kind: ActionKind, variant: DeviceVariant, core: bool) -> String {
        self.resolver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(kind, variant, core)
            .to_string()
    }

    /// Client, variant and core flag of the active session
    fn active_link(&self) -> Result<(LinkClient, DeviceVariant, bool)> {
        let slot = self.lock_slot();
        let session = slot.session.as_ref().ok_or(AdsError::NoActiveSession)?;
        Ok((
            session.link.client(),
            session.info.profile.variant,
            session.info.core_detected,
        ))
    }

    /// Body of the background connect attempt
    fn run_attempt(self: &Arc<Self>, profile: &DeviceProfile, generation: u64) -> Result<SessionInfo> {
        let port = self.config.ports.port_for(profile.variant);

        let link = self
            .transport
            .open(&profile.address, port)
            .map_err(AdsError::connect_failed)?;
        let handle = LinkWorker::spawn(link, &profile.name, self.config.session.reply_timeout())
            .map_err(AdsError::connect_failed)?;
        let client = handle.client();

        let verified = client
            .read_run_state()
            .and_then(DeviceState::require_run);
        if let Err(e) = verified {
            handle.close();
            return Err(AdsError::connect_failed(e));
        }

        let core_detected = profile.variant == DeviceVariant::V3 && self.probe_core(&client);

        let mut slot = self.lock_slot();
        if slot.generation != generation {
            drop(slot);
            handle.close();
            tracing::info!("Disconnect requested while connecting to {}", profile.name);
            return Err(AdsError::connect_failed("disconnect requested while connecting"));
        }

        let monitor = match self.start_monitor(profile, client, generation) {
            Ok(monitor) => monitor,
            Err(e) => {
                drop(slot);
                handle.close();
                return Err(AdsError::connect_failed(e));
            }
        };

        let info = SessionInfo {
            profile: profile.clone(),
            port,
            core_detected,
            connected_at: Local::now(),
        };
        slot.session = Some(Session {
            info: info.clone(),
            link: handle,
            monitor: Some(monitor),
        });

        // Emitted under the lock so a racing disconnect cannot report first
        self.notifier.notify(
            StatusEvent::info(CONNECTED).with_detail(format!(
                "{}{}",
                profile,
                if core_detected { ", core library" } else { "" }
            )),
        );
        drop(slot);

        tracing::info!(
            "Connected to {} on port {} (core library: {})",
            profile.name,
            port,
            core_detected
        );
        Ok(info)
    }

    /// Probe a core-only symbol; any failure means no core library
    fn probe_core(&self, client: &LinkClient) -> bool {
        let symbol = self.resolve(ActionKind::Reset, DeviceVariant::V3, true);
        match client.read_bool(&symbol) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Core library probe failed ({}), assuming no core", e);
                false
            }
        }
    }

    fn start_monitor(
        self: &Arc<Self>,
        profile: &DeviceProfile,
        client: LinkClient,
        generation: u64,
    ) -> Result<HealthMonitor> {
        let weak: Weak<Shared> = Arc::downgrade(self);
        HealthMonitor::start(
            &profile.name,
            self.config.session.health_interval(),
            move || match weak.upgrade() {
                Some(shared) => shared.monitor_tick(&client, generation),
                None => Verdict::Lost,
            },
        )
    }

    /// One health monitor tick
    fn monitor_tick(&self, client: &LinkClient, generation: u64) -> Verdict {
        let verified = client
            .read_run_state()
            .and_then(DeviceState::require_run);

        match verified {
            Ok(()) => {
                if self.config.session.refresh_control_states {
                    self.refresh_controls(client, generation);
                }
                Verdict::Healthy
            }
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                self.teardown(Some(generation), Some(&e));
                Verdict::Lost
            }
        }
    }

    /// Read every control's remote value into the snapshot
    fn refresh_controls(&self, client: &LinkClient, generation: u64) {
        let target = {
            let slot = self.lock_slot();
            match &slot.session {
                Some(session) if slot.generation == generation => {
                    Some((session.info.profile.variant, session.info.core_detected))
                }
                _ => None,
            }
        };
        let Some((variant, core)) = target else {
            return;
        };

        let snapshot: ControlSnapshot = ActionKind::ALL
            .into_iter()
            .map(|kind| {
                let symbol = self.resolve(kind, variant, core);
                (kind, client.read_bool(&symbol).ok())
            })
            .collect();

        if self.lock_slot().generation == generation {
            *self.lock_snapshot() = Some(snapshot);
        }
    }

    /// Tear down the session
    ///
    /// With `expected`, only the session of that generation is torn down
    /// (used by the monitor); stale reports are ignored entirely.
    fn teardown(&self, expected: Option<u64>, cause: Option<&AdsError>) -> bool {
        let session = {
            let mut slot = self.lock_slot();
            if let Some(generation) = expected {
                if slot.generation != generation || slot.session.is_none() {
                    return false;
                }
            }
            slot.generation += 1;
            slot.session.take()
        };

        let torn_down = session.is_some();
        if let Some(mut session) = session {
            if let Some(monitor) = session.monitor.take() {
                monitor.cancel();
            }
            session.link.close();
            tracing::info!("Disconnected from {}", session.info.profile.name);
        }

        self.controls.reset_all();
        *self.lock_snapshot() = None;

        let event = match cause {
            Some(cause) => StatusEvent::warning(DISCONNECTED).with_detail(cause),
            None => StatusEvent::info(DISCONNECTED),
        };
        self.notifier.notify(event);
        torn_down
    }
}
