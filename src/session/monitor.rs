//! Periodic liveness probe of the connected device
//!
//! The monitor runs a tick function on a fixed interval until it is
//! cancelled or the tick reports [`Verdict::Lost`]. What a tick does (read
//! the run-state, refresh control values, trigger teardown) is supplied by
//! the connection manager.
//!
//! Cancellation is synchronous: [`HealthMonitor::cancel`] returns only after
//! the monitor thread has exited, so no tick runs afterwards. When the
//! monitor thread itself triggers the teardown that cancels it, the join is
//! skipped; the loop exits on its own right after the tick returns.

use crate::error::Result;
use crossbeam_channel::{bounded, select, tick, Sender, TryRecvError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

/// Outcome of one monitor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep ticking
    Healthy,
    /// The connection is gone; stop ticking
    Lost,
}

/// Handle to a running monitor thread
pub struct HealthMonitor {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl HealthMonitor {
    /// Start calling `on_tick` every `interval`
    ///
    /// The first tick fires one interval after start.
    pub fn start<F>(device: &str, interval: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() -> Verdict + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let name = device.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("ads-health-{}", device))
            .spawn(move || {
                tracing::debug!("Health monitor for {} started", name);
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            // A stop request racing with the tick wins
                            if let Err(TryRecvError::Disconnected) = stop_rx.try_recv() {
                                break;
                            }
                            if on_tick() == Verdict::Lost {
                                break;
                            }
                        }
                    }
                }
                tracing::debug!("Health monitor for {} stopped", name);
            })?;

        Ok(Self {
            thread_id: thread.thread().id(),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the monitor; returns once no further tick can run
    pub fn cancel(mut self) {
        self.shutdown();
    }

    /// Whether the monitor thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if std::thread::current().id() == self.thread_id {
                // Teardown triggered by our own tick; the loop exits after it returns
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Health monitor panicked");
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let monitor = HealthMonitor::start("test", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Verdict::Healthy
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        monitor.cancel();
        let after_cancel = ticks.load(Ordering::SeqCst);
        assert!(after_cancel > 0);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_lost_stops_the_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let monitor = HealthMonitor::start("test", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Verdict::Lost
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(monitor.is_finished());
        monitor.cancel();
    }
}
