//! Wire-level device client traits
//!
//! The raw ADS protocol lives outside this crate. These traits are the seam
//! the session layer talks through, so real clients and the simulated device
//! can be swapped freely.

use crate::error::Result;

/// Counters for requests served by a device link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Total number of successful reads (run-state and booleans)
    pub successful_reads: u64,
    /// Total number of failed reads
    pub failed_reads: u64,
    /// Total number of successful writes
    pub successful_writes: u64,
    /// Total number of failed writes
    pub failed_writes: u64,
}

impl LinkStats {
    pub fn record_read(&mut self, ok: bool) {
        if ok {
            self.successful_reads += 1;
        } else {
            self.failed_reads += 1;
        }
    }

    pub fn record_write(&mut self, ok: bool) {
        if ok {
            self.successful_writes += 1;
        } else {
            self.failed_writes += 1;
        }
    }

    /// Success rate over all requests as a percentage
    pub fn success_rate(&self) -> f64 {
        let ok = self.successful_reads + self.successful_writes;
        let total = ok + self.failed_reads + self.failed_writes;
        if total == 0 {
            100.0
        } else {
            (ok as f64 / total as f64) * 100.0
        }
    }
}

/// Factory for device connections
///
/// Implementations must be shareable across threads because connect
/// attempts run on a background thread.
pub trait DeviceTransport: Send + Sync {
    /// Open a connection handle to the device at `address` on `port`
    fn open(&self, address: &str, port: u16) -> Result<Box<dyn DeviceLink>>;
}

/// An open connection handle
///
/// A link is not safe for concurrent use. The session layer hands it to a
/// single [`LinkWorker`](super::LinkWorker) thread which serializes every
/// request against it.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceLink: Send {
    /// Read the numeric run-state of the device
    fn read_run_state(&mut self) -> Result<u16>;

    /// Read a named boolean
    fn read_bool(&mut self, symbol: &str) -> Result<bool>;

    /// Write a named boolean
    fn write_bool(&mut self, symbol: &str, value: bool) -> Result<()>;

    /// Close the handle. Further calls must fail.
    fn close(&mut self);
}
