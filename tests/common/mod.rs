//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};
use superads_rs::session::{StatusEvent, StatusReceiver};

/// Health interval used by integration tests
pub fn test_interval() -> Duration {
    Duration::from_millis(25)
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Labels of every pending status event
pub fn drain_labels(receiver: &StatusReceiver) -> Vec<String> {
    receiver
        .drain()
        .iter()
        .map(StatusEvent::label)
        .map(str::to_string)
        .collect()
}

/// Count events with `label`
pub fn count_label(events: &[String], label: &str) -> usize {
    events.iter().filter(|l| l.as_str() == label).count()
}
