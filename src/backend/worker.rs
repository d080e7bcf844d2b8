//! Device Link Worker Thread
//!
//! Every request against an open [`DeviceLink`] goes through a single worker
//! thread that owns the link exclusively. The health monitor, the action
//! dispatcher and the control-state refresh all submit requests over
//! a crossbeam channel and wait for the reply, so transport I/O is totally
//! ordered and never interleaves.
//!
//! # Lifetime
//!
//! The worker lives exactly as long as the session that spawned it.
//! [`LinkHandle::close`] queues a close request, the worker finishes the
//! request it is currently serving, closes the link and exits. Requests still
//! queued behind the close are dropped and their callers observe
//! [`AdsError::NoActiveSession`].
//!
//! # Reply timeout
//!
//! A caller stops waiting after the reply timeout only while its request is
//! still queued. The request is then marked abandoned and the worker skips
//! it, so a reported failure never lands on the device afterwards. Once the
//! worker has started a request the caller waits for its real outcome.

use crate::backend::device_trait::{DeviceLink, LinkStats};
use crate::error::{AdsError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Claim shared by a caller and the worker for one request
///
/// Exactly one side wins: the worker starts the request or the caller
/// abandons it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ticket(Arc<AtomicU8>);

impl Ticket {
    /// Worker side; false if the caller already gave up
    fn start(&self) -> bool {
        self.claim(STARTED)
    }

    /// Caller side; false if the worker already started the request
    fn abandon(&self) -> bool {
        self.claim(ABANDONED)
    }

    fn claim(&self, state: u8) -> bool {
        self.0
            .compare_exchange(PENDING, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Requests served by the link worker
#[derive(Debug)]
pub(crate) enum LinkRequest {
    /// Read the numeric run-state
    ReadRunState {
        ticket: Ticket,
        reply: Sender<Result<u16>>,
    },
    /// Read a named boolean
    ReadBool {
        symbol: String,
        ticket: Ticket,
        reply: Sender<Result<bool>>,
    },
    /// Write a named boolean
    WriteBool {
        symbol: String,
        value: bool,
        ticket: Ticket,
        reply: Sender<Result<()>>,
    },
    /// Close the link and stop the worker
    Close,
}

impl LinkRequest {
    fn ticket(&self) -> Option<&Ticket> {
        match self {
            LinkRequest::ReadRunState { ticket, .. }
            | LinkRequest::ReadBool { ticket, .. }
            | LinkRequest::WriteBool { ticket, .. } => Some(ticket),
            LinkRequest::Close => None,
        }
    }
}

/// The worker that owns a device link
pub struct LinkWorker {
    /// Device name, for logging
    device: String,
    /// The open link (never shared)
    link: Box<dyn DeviceLink>,
    /// Incoming requests
    request_rx: Receiver<LinkRequest>,
    /// Request counters
    stats: Arc<Mutex<LinkStats>>,
}

impl LinkWorker {
    /// Spawn a worker thread that takes ownership of `link`
    pub fn spawn(
        link: Box<dyn DeviceLink>,
        device: &str,
        reply_timeout: Duration,
    ) -> Result<LinkHandle> {
        let (request_tx, request_rx) = unbounded();
        let stats = Arc::new(Mutex::new(LinkStats::default()));

        let worker = LinkWorker {
            device: device.to_string(),
            link,
            request_rx,
            stats: Arc::clone(&stats),
        };

        let thread = std::thread::Builder::new()
            .name(format!("ads-link-{}", device))
            .spawn(move || worker.run())?;

        Ok(LinkHandle {
            client: LinkClient {
                request_tx,
                reply_timeout,
                stats,
            },
            thread: Some(thread),
        })
    }

    /// Serve requests until closed or every client is gone
    fn run(mut self) {
        tracing::debug!("Link worker for {} started", self.device);

        while let Ok(request) = self.request_rx.recv() {
            let started = match request.ticket() {
                Some(ticket) => ticket.start(),
                None => break,
            };
            if started {
                self.handle_request(request);
            } else {
                tracing::debug!("{}: skipping abandoned request", self.device);
            }
        }

        self.link.close();
        tracing::debug!("Link worker for {} stopped", self.device);
    }

    /// Handle a single request
    fn handle_request(&mut self, request: LinkRequest) {
        match request {
            LinkRequest::ReadRunState { reply, .. } => {
                let result = self.link.read_run_state();
                self.record(|s| s.record_read(result.is_ok()));
                let _ = reply.send(result);
            }
            LinkRequest::ReadBool { symbol, reply, .. } => {
                let result = self.link.read_bool(&symbol).map_err(|e| AdsError::ReadFailed {
                    symbol: symbol.clone(),
                    cause: e.to_string(),
                });
                self.record(|s| s.record_read(result.is_ok()));
                tracing::trace!("{}: read {} -> {:?}", self.device, symbol, result);
                let _ = reply.send(result);
            }
            LinkRequest::WriteBool {
                symbol,
                value,
                reply,
                ..
            } => {
                let result =
                    self.link
                        .write_bool(&symbol, value)
                        .map_err(|e| AdsError::WriteFailed {
                            symbol: symbol.clone(),
                            cause: e.to_string(),
                        });
                self.record(|s| s.record_write(result.is_ok()));
                match &result {
                    Ok(()) => tracing::debug!("{}: wrote {} to {}", self.device, value, symbol),
                    Err(e) => tracing::warn!("{}: {}", self.device, e),
                }
                let _ = reply.send(result);
            }
            LinkRequest::Close => {}
        }
    }

    fn record(&self, f: impl FnOnce(&mut LinkStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Cloneable accessor that submits requests to the link worker
#[derive(Debug, Clone)]
pub struct LinkClient {
    request_tx: Sender<LinkRequest>,
    reply_timeout: Duration,
    stats: Arc<Mutex<LinkStats>>,
}

impl LinkClient {
    /// Read the device run-state code
    pub fn read_run_state(&self) -> Result<u16> {
        self.call(
            |ticket, reply| LinkRequest::ReadRunState { ticket, reply },
            AdsError::Transport,
        )
    }

    /// Read a named boolean
    pub fn read_bool(&self, symbol: &str) -> Result<bool> {
        let name = symbol.to_string();
        self.call(
            |ticket, reply| LinkRequest::ReadBool {
                symbol: name,
                ticket,
                reply,
            },
            |cause| AdsError::ReadFailed {
                symbol: symbol.to_string(),
                cause,
            },
        )
    }

    /// Write a named boolean
    pub fn write_bool(&self, symbol: &str, value: bool) -> Result<()> {
        let name = symbol.to_string();
        self.call(
            |ticket, reply| LinkRequest::WriteBool {
                symbol: name,
                value,
                ticket,
                reply,
            },
            |cause| AdsError::WriteFailed {
                symbol: symbol.to_string(),
                cause,
            },
        )
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> LinkStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Submit a request and wait for the worker's reply
    ///
    /// `timed_out` builds the error for a request abandoned while queued.
    fn call<T>(
        &self,
        build: impl FnOnce(Ticket, Sender<Result<T>>) -> LinkRequest,
        timed_out: impl FnOnce(String) -> AdsError,
    ) -> Result<T> {
        let ticket = Ticket::default();
        let (reply_tx, reply_rx) = bounded(1);
        self.request_tx
            .send(build(ticket.clone(), reply_tx))
            .map_err(|_| AdsError::NoActiveSession)?;

        match reply_rx.recv_timeout(self.reply_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) if ticket.abandon() => Err(timed_out(format!(
                "device did not answer within {} ms",
                self.reply_timeout.as_millis()
            ))),
            // Already running on the link, its outcome is the answer
            Err(RecvTimeoutError::Timeout) => reply_rx
                .recv()
                .unwrap_or(Err(AdsError::NoActiveSession)),
            Err(RecvTimeoutError::Disconnected) => Err(AdsError::NoActiveSession),
        }
    }
}

/// Owning handle of a link worker
///
/// Dropping the handle closes the link.
pub struct LinkHandle {
    client: LinkClient,
    thread: Option<JoinHandle<()>>,
}

impl LinkHandle {
    /// Get a client for submitting requests
    pub fn client(&self) -> LinkClient {
        self.client.clone()
    }

    /// Close the link and wait for the worker to exit
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.client.request_tx.send(LinkRequest::Close);
            if thread.join().is_err() {
                tracing::error!("Link worker panicked");
            }
        }
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::device_trait::MockDeviceLink;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn spawn(link: MockDeviceLink) -> LinkHandle {
        LinkWorker::spawn(Box::new(link), "test", Duration::from_secs(1)).unwrap()
    }

    fn spawn_with_timeout(link: MockDeviceLink, reply_timeout: Duration) -> LinkHandle {
        LinkWorker::spawn(Box::new(link), "test", reply_timeout).unwrap()
    }

    #[test]
    fn test_requests_reach_the_link_in_order() {
        let mut link = MockDeviceLink::new();
        let mut seq = Sequence::new();
        link.expect_read_run_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(5));
        link.expect_write_bool()
            .with(eq("MAIN.Run"), eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        link.expect_close().times(1).in_sequence(&mut seq).return_const(());

        let handle = spawn(link);
        let client = handle.client();
        assert_eq!(client.read_run_state().unwrap(), 5);
        client.write_bool("MAIN.Run", true).unwrap();
        handle.close();
    }

    #[test]
    fn test_failures_carry_the_symbol() {
        let mut link = MockDeviceLink::new();
        link.expect_read_bool()
            .returning(|_| Err(AdsError::Transport("symbol not found".into())));
        link.expect_write_bool()
            .returning(|_, _| Err(AdsError::Transport("timeout".into())));
        link.expect_close().return_const(());

        let handle = spawn(link);
        let client = handle.client();

        match client.read_bool("Core.HMI.Reset") {
            Err(AdsError::ReadFailed { symbol, .. }) => assert_eq!(symbol, "Core.HMI.Reset"),
            other => panic!("unexpected {:?}", other),
        }
        match client.write_bool("MAIN.Stop", false) {
            Err(AdsError::WriteFailed { symbol, cause }) => {
                assert_eq!(symbol, "MAIN.Stop");
                assert!(cause.contains("timeout"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let stats = client.stats();
        assert_eq!(stats.failed_reads, 1);
        assert_eq!(stats.failed_writes, 1);
    }

    #[test]
    fn test_client_after_close_reports_no_session() {
        let mut link = MockDeviceLink::new();
        link.expect_close().times(1).return_const(());

        let handle = spawn(link);
        let client = handle.client();
        drop(handle);

        assert!(matches!(
            client.read_run_state(),
            Err(AdsError::NoActiveSession)
        ));
    }

    #[test]
    fn test_slow_write_is_awaited_past_the_timeout() {
        let mut link = MockDeviceLink::new();
        let mut seq = Sequence::new();
        link.expect_write_bool()
            .with(eq("MAIN.Run"), eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            });
        link.expect_write_bool()
            .with(eq("MAIN.Run"), eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        link.expect_close().return_const(());

        let handle = spawn_with_timeout(link, Duration::from_millis(100));
        let client = handle.client();
        client.write_bool("MAIN.Run", true).unwrap();
        client.write_bool("MAIN.Run", false).unwrap();

        let stats = client.stats();
        assert_eq!(stats.failed_writes, 0);
        handle.close();
    }

    #[test]
    fn test_queued_write_past_the_timeout_is_never_performed() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let mut link = MockDeviceLink::new();
        let log = Arc::clone(&written);
        link.expect_write_bool().returning(move |symbol, value| {
            if symbol == "MAIN.Slow" {
                std::thread::sleep(Duration::from_millis(300));
            }
            log.lock().unwrap().push((symbol.to_string(), value));
            Ok(())
        });
        link.expect_read_run_state().returning(|| Ok(5));
        link.expect_close().return_const(());

        let handle = spawn_with_timeout(link, Duration::from_millis(100));
        let slow = handle.client();
        let busy = std::thread::spawn(move || slow.write_bool("MAIN.Slow", true));
        std::thread::sleep(Duration::from_millis(30));

        match handle.client().write_bool("MAIN.Stop", false) {
            Err(AdsError::WriteFailed { symbol, cause }) => {
                assert_eq!(symbol, "MAIN.Stop");
                assert!(cause.contains("100 ms"));
            }
            other => panic!("unexpected {:?}", other),
        }
        busy.join().unwrap().unwrap();

        // Served after the abandoned write was dequeued
        assert_eq!(handle.client().read_run_state().unwrap(), 5);
        assert_eq!(
            *written.lock().unwrap(),
            [("MAIN.Slow".to_string(), true)]
        );
        handle.close();
    }
}
