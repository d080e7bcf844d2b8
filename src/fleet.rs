//! Fleet inventory: the ordered device list and its selection
//!
//! Importing the inventory is someone else's job; this module only holds the
//! result. Selection changes that should disconnect the current session go
//! through [`Controller::select_device`](crate::controller::Controller::select_device).

use crate::error::{AdsError, Result};
use crate::types::DeviceProfile;
use std::cmp::Ordering;

/// Column to sort the fleet by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Address,
}

/// Ordered device list with at most one selected entry
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    devices: Vec<DeviceProfile>,
    selected: Option<usize>,
}

impl Fleet {
    /// Create a fleet; the first device (if any) is selected
    pub fn new(devices: Vec<DeviceProfile>) -> Self {
        let selected = if devices.is_empty() { None } else { Some(0) };
        Self { devices, selected }
    }

    pub fn devices(&self) -> &[DeviceProfile] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceProfile> {
        self.devices.get(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&DeviceProfile> {
        self.selected.and_then(|i| self.devices.get(i))
    }

    /// Append a device; selects it if nothing was selected
    pub fn push(&mut self, profile: DeviceProfile) {
        self.devices.push(profile);
        if self.selected.is_none() {
            self.selected = Some(self.devices.len() - 1);
        }
    }

    /// Select the device at `index`; returns whether the selection changed
    pub fn select(&mut self, index: usize) -> Result<bool> {
        if index >= self.devices.len() {
            return Err(AdsError::Config(format!(
                "No device at index {} (fleet has {})",
                index,
                self.devices.len()
            )));
        }
        let changed = self.selected != Some(index);
        self.selected = Some(index);
        Ok(changed)
    }

    /// Index of the device named `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name == name)
    }

    /// Natural sort by `key`; the selected device stays selected
    pub fn sort_by(&mut self, key: SortKey, descending: bool) {
        let selected = self.selected().cloned();

        self.devices.sort_by(|a, b| {
            let ordering = match key {
                SortKey::Name => natural_cmp(&a.name, &b.name),
                SortKey::Address => natural_cmp(&a.address, &b.address),
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        self.selected = selected.and_then(|s| self.devices.iter().position(|d| *d == s));
    }
}

/// Compare strings so that embedded numbers order numerically
///
/// `LGV2 < LGV10`, and `5.2.1.1` < `10.2.1.1`. Letters compare
/// case-insensitively; ties fall back to plain string order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x, y) {
                    (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
                    (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
                    (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
                    (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn cmp_digits(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Splits a string into alternating runs of digits and non-digits
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}
