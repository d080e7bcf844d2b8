//! Simulated Device for Testing
//!
//! This module provides an in-memory stand-in for an ADS controller so the
//! session layer can be exercised without hardware.
//!
//! # Features
//!
//! - **Symbol table**: named booleans that can be read and written
//! - **Run-state**: configurable code returned by run-state reads
//! - **Fault injection**: failing opens, reads, writes and a severable link
//! - **Open latency**: delays `open` to hold a connect attempt in flight
//! - **Write latency**: delays every write to model a slow link
//! - **Write log**: every successful write, in order
//!
//! # Example
//!
//! ```ignore
//! use superads_rs::backend::SimulatedDevice;
//! use superads_rs::types::DeviceVariant;
//! use superads_rs::variables::VariableTable;
//!
//! let device = SimulatedDevice::new()
//!     .with_control_symbols(&VariableTable::defaults(), DeviceVariant::V3, true);
//!
//! // Hand a clone to the controller, keep one to inspect or inject faults
//! device.set_run_state(6);
//! assert_eq!(device.writes().len(), 0);
//! ```

use crate::backend::device_trait::{DeviceLink, DeviceTransport};
use crate::error::{AdsError, Result};
use crate::types::{ActionKind, DeviceState, DeviceVariant};
use crate::variables::VariableTable;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A successful write observed by the simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub symbol: String,
    pub value: bool,
}

/// Shared state behind every clone of a [`SimulatedDevice`]
#[derive(Debug)]
struct SimState {
    /// Code returned by run-state reads
    run_state: u16,
    /// Known symbols and their values
    symbols: HashMap<String, bool>,
    /// Error returned by `open`, if any
    open_error: Option<String>,
    /// Delay applied inside `open`
    open_delay: Duration,
    /// Delay applied before every write
    write_delay: Duration,
    /// Symbols whose reads fail
    failing_reads: HashSet<String>,
    /// Symbols whose writes fail
    failing_writes: HashSet<String>,
    /// When set, every request on an open link fails
    severed: bool,
    /// Successful writes, oldest first
    writes: Vec<WriteRecord>,
    /// Address and port of every open call
    opens: Vec<(String, u16)>,
    /// Number of closed links
    closes: usize,
    /// Number of run-state reads served
    run_state_reads: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            run_state: DeviceState::RUN_CODE,
            symbols: HashMap::new(),
            open_error: None,
            open_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            severed: false,
            writes: Vec::new(),
            opens: Vec::new(),
            closes: 0,
            run_state_reads: 0,
        }
    }
}

/// In-memory ADS controller
///
/// Clones share the same state, so a test can keep one handle for fault
/// injection while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    /// Create a running device with no symbols
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol with an initial value
    pub fn with_symbol(self, symbol: impl Into<String>, value: bool) -> Self {
        self.state().symbols.insert(symbol.into(), value);
        self
    }

    /// Register every control symbol of one variant branch
    ///
    /// For V3 with `core` set, the core-library symbols are registered, which
    /// is what makes core detection succeed.
    pub fn with_control_symbols(self, table: &VariableTable, variant: DeviceVariant, core: bool) -> Self {
        {
            let mut state = self.state();
            for kind in ActionKind::ALL {
                let initial = kind == ActionKind::Stop;
                state
                    .symbols
                    .insert(table.resolve(kind, variant, core).to_string(), initial);
            }
        }
        self
    }

    /// Delay every `open` call
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.state().open_delay = delay;
        self
    }

    /// Delay every write on an open link
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.state().write_delay = delay;
        self
    }

    /// Set the run-state code reported by the device
    pub fn set_run_state(&self, code: u16) {
        self.state().run_state = code;
    }

    /// Make `open` fail with the given message (None restores it)
    pub fn fail_open(&self, error: Option<&str>) {
        self.state().open_error = error.map(str::to_string);
    }

    /// Make reads of `symbol` fail or succeed
    pub fn fail_reads(&self, symbol: &str, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_reads.insert(symbol.to_string());
        } else {
            state.failing_reads.remove(symbol);
        }
    }

    /// Make writes of `symbol` fail or succeed
    pub fn fail_writes(&self, symbol: &str, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_writes.insert(symbol.to_string());
        } else {
            state.failing_writes.remove(symbol);
        }
    }

    /// Simulate a pulled cable: every request on an open link fails
    pub fn sever(&self, severed: bool) {
        self.state().severed = severed;
    }

    /// Set a symbol's value directly
    pub fn set_symbol(&self, symbol: &str, value: bool) {
        self.state().symbols.insert(symbol.to_string(), value);
    }

    /// Current value of a symbol
    pub fn symbol(&self, symbol: &str) -> Option<bool> {
        self.state().symbols.get(symbol).copied()
    }

    /// All successful writes, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Address and port of every open call
    pub fn opens(&self) -> Vec<(String, u16)> {
        self.state().opens.clone()
    }

    /// Number of links that have been closed
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    /// Number of run-state reads served
    pub fn run_state_reads(&self) -> usize {
        self.state().run_state_reads
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceTransport for SimulatedDevice {
    fn open(&self, address: &str, port: u16) -> Result<Box<dyn DeviceLink>> {
        let delay = {
            let mut state = self.state();
            state.opens.push((address.to_string(), port));
            state.open_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if let Some(error) = self.state().open_error.clone() {
            return Err(AdsError::Transport(error));
        }

        tracing::debug!("Simulated device opened at {}:{}", address, port);
        Ok(Box::new(SimLink {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

/// An open link to the simulated device
struct SimLink {
    state: Arc<Mutex<SimState>>,
    open: bool,
}

impl SimLink {
    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        if !self.open {
            return Err(AdsError::Transport("link is closed".to_string()));
        }
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.severed {
            return Err(AdsError::Transport("target port not found".to_string()));
        }
        Ok(state)
    }
}

impl DeviceLink for SimLink {
    fn read_run_state(&mut self) -> Result<u16> {
        let mut state = self.state()?;
        state.run_state_reads += 1;
        Ok(state.run_state)
    }

    fn read_bool(&mut self, symbol: &str) -> Result<bool> {
        let state = self.state()?;
        if state.failing_reads.contains(symbol) {
            return Err(AdsError::Transport("read rejected".to_string()));
        }
        state
            .symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| AdsError::Transport("symbol not found".to_string()))
    }

    fn write_bool(&mut self, symbol: &str, value: bool) -> Result<()> {
        let delay = self.state()?.write_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state()?;
        if state.failing_writes.contains(symbol) {
            return Err(AdsError::Transport("write rejected".to_string()));
        }
        match state.symbols.get_mut(symbol) {
            Some(slot) => *slot = value,
            None => return Err(AdsError::Transport("symbol not found".to_string())),
        }
        state.writes.push(WriteRecord {
            symbol: symbol.to_string(),
            value,
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .closes += 1;
        }
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_known_symbol() {
        let device = SimulatedDevice::new().with_symbol("MAIN.Run", false);
        let mut link = device.open("5.2.1.1.1.1", 851).unwrap();

        assert!(!link.read_bool("MAIN.Run").unwrap());
        link.write_bool("MAIN.Run", true).unwrap();
        assert_eq!(device.symbol("MAIN.Run"), Some(true));
        assert_eq!(
            device.writes(),
            vec![WriteRecord {
                symbol: "MAIN.Run".into(),
                value: true
            }]
        );
        assert_eq!(device.opens(), vec![("5.2.1.1.1.1".to_string(), 851)]);
    }

    #[test]
    fn test_unknown_symbol_fails() {
        let device = SimulatedDevice::new();
        let mut link = device.open("1.1.1.1.1.1", 801).unwrap();
        assert!(link.read_bool("Core.HMI.Reset").is_err());
        assert!(link.write_bool("Core.HMI.Reset", true).is_err());
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_close_counts_once_and_blocks_io() {
        let device = SimulatedDevice::new();
        let mut link = device.open("1.1.1.1.1.1", 801).unwrap();
        link.close();
        link.close();
        assert!(link.read_run_state().is_err());
        drop(link);
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_fault_injection() {
        let device = SimulatedDevice::new().with_symbol("MAIN.Stop", true);
        device.fail_open(Some("no route"));
        assert!(device.open("1.1.1.1.1.1", 801).is_err());
        device.fail_open(None);

        let mut link = device.open("1.1.1.1.1.1", 801).unwrap();
        device.fail_writes("MAIN.Stop", true);
        assert!(link.write_bool("MAIN.Stop", false).is_err());

        device.sever(true);
        assert!(link.read_run_state().is_err());
        device.sever(false);
        device.set_run_state(6);
        assert_eq!(link.read_run_state().unwrap(), 6);
    }
}
