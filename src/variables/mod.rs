//! Symbol resolution for operator controls
//!
//! Every [`ActionKind`] maps to a wire-level boolean symbol. The mapping
//! depends on the device variant and, for V3 devices, on whether the core
//! library is present.
//!
//! Two tables exist:
//!
//! - the fixed defaults ([`VariableTable::defaults`])
//! - sparse user overrides ([`SymbolOverrides`]), persisted by [`OverrideStore`]
//!
//! The effective table is the defaults with every override leaf applied on top.
//!
//! # Persisted Format
//!
//! Keyed by control name. Under each control a V2 override is a single
//! symbol and a V3 override is a `core`/`no_core` pair; every part is
//! optional and anything absent keeps its default.
//!
//! ```json
//! {
//!   "run": { "V2": "MAIN.RunCmd", "V3": { "core": "X.Y" } },
//!   "stop": { "V3": { "no_core": "MAIN.bStop" } }
//! }
//! ```

pub mod store;

pub use store::OverrideStore;

use crate::error::{Result, ResultExt};
use crate::types::{ActionKind, DeviceVariant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A resolver shared between the session layer and the front end
pub type SharedResolver = Arc<RwLock<VariableResolver>>;

/// User-entered symbol names keyed by control; empty entries are ignored
pub type SymbolEdits = BTreeMap<ActionKind, String>;

/// V3 symbol pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSplit {
    /// Symbol used when the core library is present
    pub core: String,
    /// Symbol used without the core library
    pub no_core: String,
}

impl CoreSplit {
    pub fn new(core: impl Into<String>, no_core: impl Into<String>) -> Self {
        Self {
            core: core.into(),
            no_core: no_core.into(),
        }
    }

    pub fn pick(&self, core_detected: bool) -> &str {
        if core_detected {
            &self.core
        } else {
            &self.no_core
        }
    }
}

/// Symbols of one control for every variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSymbols {
    pub v2: String,
    pub v3: CoreSplit,
}

/// Complete symbol table
///
/// Indexed by [`ActionKind`], so every control always has a V2 entry and a
/// V3 core/no_core pair and resolution cannot miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableTable {
    actions: [ActionSymbols; ActionKind::ALL.len()],
}

impl VariableTable {
    /// Built-in symbol names
    pub fn defaults() -> Self {
        let entry = |name: &str| ActionSymbols {
            v2: format!("MAIN.{}", name),
            v3: CoreSplit::new(format!("Core.HMI.{}", name), format!("MAIN.HMI.{}", name)),
        };

        Self {
            actions: [
                entry("Reset"),
                entry("Run"),
                entry("Stop"),
                entry("ManAuto"),
                entry("DisableHorn"),
            ],
        }
    }

    /// Symbol for `action` on a device of `variant`
    ///
    /// `core_detected` only matters for V3 devices.
    pub fn resolve(&self, action: ActionKind, variant: DeviceVariant, core_detected: bool) -> &str {
        let symbols = self.get(action);
        match variant {
            DeviceVariant::V2 => &symbols.v2,
            DeviceVariant::V3 => symbols.v3.pick(core_detected),
        }
    }

    /// All symbols of one control
    pub fn get(&self, action: ActionKind) -> &ActionSymbols {
        &self.actions[action as usize]
    }

    fn get_mut(&mut self, action: ActionKind) -> &mut ActionSymbols {
        &mut self.actions[action as usize]
    }

    /// This table with every override leaf applied
    pub fn with_overrides(&self, overrides: &SymbolOverrides) -> Self {
        let mut table = self.clone();
        for (action, entry) in overrides.iter() {
            let target = table.get_mut(action);
            if let Some(v2) = &entry.v2 {
                target.v2 = v2.clone();
            }
            if let Some(core) = &entry.v3.core {
                target.v3.core = core.clone();
            }
            if let Some(no_core) = &entry.v3.no_core {
                target.v3.no_core = no_core.clone();
            }
        }
        table
    }
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Sparse V3 override; absent sides keep their default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSplitOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_core: Option<String>,
}

impl CoreSplitOverride {
    pub fn is_empty(&self) -> bool {
        self.core.is_none() && self.no_core.is_none()
    }

    fn pick(&self, core_detected: bool) -> Option<&str> {
        if core_detected {
            self.core.as_deref()
        } else {
            self.no_core.as_deref()
        }
    }
}

/// Overrides of one control; each variant and side is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOverride {
    #[serde(rename = "V2", default, skip_serializing_if = "Option::is_none")]
    pub v2: Option<String>,
    #[serde(rename = "V3", default, skip_serializing_if = "CoreSplitOverride::is_empty")]
    pub v3: CoreSplitOverride,
}

impl ActionOverride {
    pub fn is_empty(&self) -> bool {
        self.v2.is_none() && self.v3.is_empty()
    }

    fn leaf_count(&self) -> usize {
        usize::from(self.v2.is_some())
            + usize::from(self.v3.core.is_some())
            + usize::from(self.v3.no_core.is_some())
    }

    /// Take every leaf `other` sets
    fn merge(&mut self, other: ActionOverride) {
        if other.v2.is_some() {
            self.v2 = other.v2;
        }
        if other.v3.core.is_some() {
            self.v3.core = other.v3.core;
        }
        if other.v3.no_core.is_some() {
            self.v3.no_core = other.v3.no_core;
        }
    }
}

/// User-edited symbol leaves, keyed by control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolOverrides {
    actions: BTreeMap<ActionKind, ActionOverride>,
}

impl SymbolOverrides {
    pub fn is_empty(&self) -> bool {
        self.actions.values().all(ActionOverride::is_empty)
    }

    /// Set a single leaf
    pub fn set(
        &mut self,
        action: ActionKind,
        variant: DeviceVariant,
        core_detected: bool,
        symbol: impl Into<String>,
    ) {
        let symbol = Some(symbol.into());
        let entry = self.actions.entry(action).or_default();
        match (variant, core_detected) {
            (DeviceVariant::V2, _) => entry.v2 = symbol,
            (DeviceVariant::V3, true) => entry.v3.core = symbol,
            (DeviceVariant::V3, false) => entry.v3.no_core = symbol,
        }
    }

    /// Look up a single leaf
    pub fn get(&self, action: ActionKind, variant: DeviceVariant, core_detected: bool) -> Option<&str> {
        let entry = self.actions.get(&action)?;
        match variant {
            DeviceVariant::V2 => entry.v2.as_deref(),
            DeviceVariant::V3 => entry.v3.pick(core_detected),
        }
    }

    /// Overrides of one control
    pub fn action(&self, action: ActionKind) -> Option<&ActionOverride> {
        self.actions.get(&action).filter(|entry| !entry.is_empty())
    }

    /// Controls with at least one leaf, in order
    pub fn actions(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.iter().map(|(action, _)| action)
    }

    /// Non-empty entries, in control order
    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, &ActionOverride)> {
        self.actions
            .iter()
            .filter(|(_, entry)| !entry.is_empty())
            .map(|(action, entry)| (*action, entry))
    }

    /// Deep-merge `other` into `self`; `other` wins per leaf and untouched leaves are kept
    pub fn merge(&mut self, other: SymbolOverrides) {
        for (action, incoming) in other.actions {
            self.actions.entry(action).or_default().merge(incoming);
        }
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.actions.values().map(ActionOverride::leaf_count).sum()
    }
}

/// Keep only the edits that change the effective table
///
/// Empty (or whitespace) entries are ignored; surrounding whitespace is trimmed.
pub fn changed_leaves(
    effective: &VariableTable,
    edits: &SymbolEdits,
    variant: DeviceVariant,
    core_detected: bool,
) -> SymbolOverrides {
    let mut changed = SymbolOverrides::default();
    for (action, raw) in edits {
        let symbol = raw.trim();
        if symbol.is_empty() {
            continue;
        }
        if effective.resolve(*action, variant, core_detected) != symbol {
            changed.set(*action, variant, core_detected, symbol);
        }
    }
    changed
}

/// Result of saving symbol edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No edit differed from the effective table
    NothingToSave,
    /// The listed controls were persisted
    Saved { changed: Vec<ActionKind> },
}

/// Resolves controls to symbols through the effective table
#[derive(Debug)]
pub struct VariableResolver {
    defaults: VariableTable,
    overrides: SymbolOverrides,
    effective: VariableTable,
    /// Where overrides persist; `None` keeps them in memory only
    store: Option<OverrideStore>,
}

impl VariableResolver {
    /// Create a resolver backed by `store`, loading its overrides
    pub fn open(store: OverrideStore) -> Result<Self> {
        let mut resolver = Self::with_store(Some(store));
        resolver.reload()?;
        Ok(resolver)
    }

    /// Like [`open`](Self::open), but falls back to the defaults if the store is unreadable
    pub fn open_or_defaults(store: OverrideStore) -> Self {
        let mut resolver = Self::with_store(Some(store));
        if let Err(e) = resolver.reload() {
            tracing::warn!("Failed to load symbol overrides, using defaults: {}", e);
        }
        resolver
    }

    /// A resolver without persistence
    pub fn in_memory() -> Self {
        Self::with_store(None)
    }

    fn with_store(store: Option<OverrideStore>) -> Self {
        let defaults = VariableTable::defaults();
        Self {
            effective: defaults.clone(),
            defaults,
            overrides: SymbolOverrides::default(),
            store,
        }
    }

    /// Wrap for sharing across threads
    pub fn shared(self) -> SharedResolver {
        Arc::new(RwLock::new(self))
    }

    /// Symbol for `action` on a device of `variant`
    pub fn resolve(&self, action: ActionKind, variant: DeviceVariant, core_detected: bool) -> &str {
        self.effective.resolve(action, variant, core_detected)
    }

    pub fn effective(&self) -> &VariableTable {
        &self.effective
    }

    pub fn defaults(&self) -> &VariableTable {
        &self.defaults
    }

    pub fn overrides(&self) -> &SymbolOverrides {
        &self.overrides
    }

    pub fn store(&self) -> Option<&OverrideStore> {
        self.store.as_ref()
    }

    /// Re-read the persisted overrides and rebuild the effective table
    pub fn reload(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            self.overrides = store.load()?;
        }
        self.effective = self.defaults.with_overrides(&self.overrides);
        tracing::debug!(
            "Symbol table reloaded ({} override leaves)",
            self.overrides.leaf_count()
        );
        Ok(())
    }

    /// Persist the edits that differ from the effective table
    ///
    /// Changed leaves are deep-merged into the overrides currently on disk,
    /// then the effective table is reloaded.
    pub fn save_overrides(
        &mut self,
        edits: &SymbolEdits,
        variant: DeviceVariant,
        core_detected: bool,
    ) -> Result<SaveOutcome> {
        let changed = changed_leaves(&self.effective, edits, variant, core_detected);
        if changed.is_empty() {
            tracing::debug!("No symbol changes to save");
            return Ok(SaveOutcome::NothingToSave);
        }

        let actions: Vec<ActionKind> = changed.actions().collect();

        match &self.store {
            Some(store) => {
                let mut persisted = store
                    .load()
                    .context("Failed to load overrides before merge")?;
                persisted.merge(changed);
                store
                    .save(&persisted)
                    .context("Failed to write merged overrides")?;
            }
            None => self.overrides.merge(changed),
        }
        self.reload()?;

        tracing::info!(
            "Saved {} symbol override(s) for {}{}",
            actions.len(),
            variant,
            match (variant, core_detected) {
                (DeviceVariant::V3, true) => " (core)",
                (DeviceVariant::V3, false) => " (no core)",
                _ => "",
            }
        );
        Ok(SaveOutcome::Saved { changed: actions })
    }

    /// Delete every override; the effective table reverts to the defaults
    pub fn reset_overrides(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            store.clear().context("Failed to reset overrides")?;
        }
        self.overrides = SymbolOverrides::default();
        self.reload()?;
        tracing::info!("Symbol overrides reset to defaults");
        Ok(())
    }
}
