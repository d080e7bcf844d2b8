//! Status events from background tasks to the front end
//!
//! Producers (connection manager, health monitor, action dispatcher) push
//! [`StatusEvent`]s through a cloneable [`StatusNotifier`] without blocking.
//! A single consumer either drains the [`StatusReceiver`] itself or hands it
//! to a [`StatusPump`], which applies queued events to a [`StatusSink`] on a
//! fixed tick.
//!
//! The channel is unbounded: events are produced once per state change, not
//! per tick, so volume stays low and no overflow policy is needed.

use crate::error::Result;
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};
use std::fmt;
use std::thread::JoinHandle;
use std::time::Duration;

/// Label emitted when a session becomes connected
pub const CONNECTED: &str = "Connected";

/// Label emitted whenever a session is torn down
pub const DISCONNECTED: &str = "Disconnected";

/// How prominent a status event is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// An immutable status notice
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    label: String,
    severity: Severity,
    detail: Option<String>,
    at: DateTime<Local>,
}

impl StatusEvent {
    pub fn new(label: impl Into<String>, severity: Severity) -> Self {
        Self {
            label: label.into(),
            severity,
            detail: None,
            at: Local::now(),
        }
    }

    pub fn info(label: impl Into<String>) -> Self {
        Self::new(label, Severity::Info)
    }

    pub fn warning(label: impl Into<String>) -> Self {
        Self::new(label, Severity::Warning)
    }

    pub fn error(label: impl Into<String>) -> Self {
        Self::new(label, Severity::Error)
    }

    /// Attach a human-readable detail (consumes the event)
    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// When the event was created
    pub fn at(&self) -> DateTime<Local> {
        self.at
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.label)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Create a connected notifier/receiver pair
pub fn status_channel() -> (StatusNotifier, StatusReceiver) {
    let (tx, rx) = unbounded();
    (StatusNotifier { tx }, StatusReceiver { rx })
}

/// Producer side; clone freely
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    tx: Sender<StatusEvent>,
}

impl StatusNotifier {
    /// Queue an event. Never blocks.
    pub fn notify(&self, event: StatusEvent) {
        tracing::trace!("status: {}", event);
        if self.tx.send(event).is_err() {
            tracing::trace!("Status consumer is gone, event dropped");
        }
    }
}

/// Consumer side
#[derive(Debug)]
pub struct StatusReceiver {
    rx: Receiver<StatusEvent>,
}

impl StatusReceiver {
    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StatusEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Receive all pending events, oldest first
    pub fn drain(&self) -> Vec<StatusEvent> {
        self.rx.try_iter().collect()
    }
}

/// UI-facing destination of status events
pub trait StatusSink: Send {
    fn apply(&mut self, event: StatusEvent);
}

impl<F> StatusSink for F
where
    F: FnMut(StatusEvent) + Send,
{
    fn apply(&mut self, event: StatusEvent) {
        self(event)
    }
}

/// Background consumer applying queued events to a sink on a fixed tick
pub struct StatusPump {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StatusPump {
    /// Start draining `receiver` into `sink` every `tick_interval`
    pub fn spawn<S>(receiver: StatusReceiver, mut sink: S, tick_interval: Duration) -> Result<Self>
    where
        S: StatusSink + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("ads-status".to_string())
            .spawn(move || {
                let ticker = tick(tick_interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            for event in receiver.drain() {
                                sink.apply(event);
                            }
                        }
                        recv(stop_rx) -> _ => {
                            // Deliver what was queued before the stop request
                            for event in receiver.drain() {
                                sink.apply(event);
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the pump after a final drain
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Status pump panicked");
            }
        }
    }
}

impl Drop for StatusPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_drain_preserves_order() {
        let (notifier, receiver) = status_channel();
        notifier.notify(StatusEvent::info("one"));
        notifier.notify(StatusEvent::warning("two"));
        notifier.notify(StatusEvent::error("three"));

        let labels: Vec<_> = receiver.drain().iter().map(|e| e.label().to_string()).collect();
        assert_eq!(labels, ["one", "two", "three"]);
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let (notifier, receiver) = status_channel();
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let notifier = notifier.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        notifier.notify(StatusEvent::info(format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let events = receiver.drain();
        assert_eq!(events.len(), 1000);

        // Per-producer order is preserved
        for t in 0..4 {
            let prefix = format!("{}-", t);
            let seq: Vec<usize> = events
                .iter()
                .filter_map(|e| e.label().strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_pump_applies_and_flushes_on_stop() {
        let (notifier, receiver) = status_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);

        let pump = StatusPump::spawn(
            receiver,
            move |event: StatusEvent| sink_seen.lock().unwrap().push(event.label().to_string()),
            Duration::from_millis(10),
        )
        .unwrap();

        notifier.notify(StatusEvent::info(CONNECTED));
        notifier.notify(StatusEvent::info(DISCONNECTED));
        pump.stop();

        assert_eq!(*seen.lock().unwrap(), [CONNECTED, DISCONNECTED]);
    }

    #[test]
    fn test_event_display_includes_detail() {
        let event = StatusEvent::warning(DISCONNECTED).with_detail("run-state Stop");
        assert_eq!(event.detail(), Some("run-state Stop"));
        assert!(event.to_string().ends_with("Disconnected: run-state Stop"));
    }
}
