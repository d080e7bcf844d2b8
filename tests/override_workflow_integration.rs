//! Integration tests for symbol overrides
//!
//! These tests validate the override workflow:
//! - Resolution per variant and core flag
//! - Save, deep merge and reload through the controller
//! - Reset back to the defaults
//! - Persistence in the application data directory

mod common;

use common::builders::lgv01;
use common::mock_helpers::{controller_with_store, v3_core_device};
use serial_test::serial;
use superads_rs::config::{self, AppConfig, OVERRIDES_FILE};
use superads_rs::types::{ActionKind, DeviceVariant};
use superads_rs::variables::{
    OverrideStore, SaveOutcome, SymbolEdits, VariableResolver, VariableTable,
};

fn edits(pairs: &[(ActionKind, &str)]) -> SymbolEdits {
    pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

fn temp_store() -> (tempfile::TempDir, OverrideStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = OverrideStore::new(dir.path().join(OVERRIDES_FILE));
    (dir, store)
}

#[test]
fn test_resolution_rules() {
    let resolver = VariableResolver::in_memory();
    for action in ActionKind::ALL {
        assert_eq!(
            resolver.resolve(action, DeviceVariant::V2, true),
            resolver.resolve(action, DeviceVariant::V2, false)
        );
    }
    assert_eq!(resolver.resolve(ActionKind::Run, DeviceVariant::V3, true), "Core.HMI.Run");
    assert_eq!(resolver.resolve(ActionKind::Run, DeviceVariant::V3, false), "MAIN.HMI.Run");
}

#[test]
fn test_save_then_reset() {
    let (_dir, store) = temp_store();
    let device = v3_core_device().with_symbol("X.Y", false);
    let (controller, status) = controller_with_store(&device, store.clone());
    let defaults = VariableTable::defaults();

    let outcome = controller
        .save_overrides(&edits(&[(ActionKind::Run, "X.Y")]), DeviceVariant::V3, true)
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Saved { changed: vec![ActionKind::Run] });

    {
        let resolver = controller.resolver().read().unwrap();
        assert_eq!(resolver.resolve(ActionKind::Run, DeviceVariant::V3, true), "X.Y");
        assert_eq!(
            resolver.resolve(ActionKind::Stop, DeviceVariant::V3, true),
            defaults.resolve(ActionKind::Stop, DeviceVariant::V3, true)
        );
        assert_eq!(
            resolver.resolve(ActionKind::Run, DeviceVariant::V3, false),
            defaults.resolve(ActionKind::Run, DeviceVariant::V3, false)
        );
    }

    // A fresh resolver over the same file sees the override
    let reopened = VariableResolver::open(store.clone()).unwrap();
    assert_eq!(reopened.resolve(ActionKind::Run, DeviceVariant::V3, true), "X.Y");

    // Writes on the live session follow the new symbol
    controller.connect(lgv01()).unwrap().wait().unwrap();
    controller.press(ActionKind::Run).unwrap();
    assert_eq!(device.writes()[0].symbol, "X.Y");
    controller.release(ActionKind::Run).unwrap();
    controller.disconnect();

    controller.reset_overrides().unwrap();
    assert!(!store.path().exists());
    assert_eq!(
        controller
            .resolver()
            .read()
            .unwrap()
            .resolve(ActionKind::Run, DeviceVariant::V3, true),
        "Core.HMI.Run"
    );

    let labels = common::drain_labels(&status);
    assert_eq!(labels.first().map(String::as_str), Some("Variables saved"));
    assert_eq!(labels.last().map(String::as_str), Some("Variables reset to defaults"));
}

#[test]
fn test_save_merges_with_unrelated_keys() {
    let (_dir, store) = temp_store();
    std::fs::write(
        store.path(),
        r#"{ "stop": { "V2": "MAIN.bStop" }, "reset": { "V3": { "no_core": "MAIN.bReset" } } }"#,
    )
    .unwrap();

    let device = v3_core_device();
    let (controller, _status) = controller_with_store(&device, store.clone());
    controller
        .save_overrides(
            &edits(&[(ActionKind::Reset, "Core.bReset"), (ActionKind::Run, "  ")]),
            DeviceVariant::V3,
            true,
        )
        .unwrap();

    let persisted = store.load().unwrap();
    assert_eq!(persisted.get(ActionKind::Stop, DeviceVariant::V2, false), Some("MAIN.bStop"));
    assert_eq!(persisted.get(ActionKind::Reset, DeviceVariant::V3, false), Some("MAIN.bReset"));
    assert_eq!(persisted.get(ActionKind::Reset, DeviceVariant::V3, true), Some("Core.bReset"));
    assert_eq!(persisted.get(ActionKind::Run, DeviceVariant::V3, true), None);

    // The file stays keyed by control name
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["stop"]["V2"], "MAIN.bStop");
    assert_eq!(raw["reset"]["V3"]["no_core"], "MAIN.bReset");
    assert_eq!(raw["reset"]["V3"]["core"], "Core.bReset");
    assert!(raw.get("V2").is_none() && raw.get("V3").is_none());
}

#[test]
fn test_unchanged_edits_are_nothing_to_save() {
    let (_dir, store) = temp_store();
    let device = v3_core_device();
    let (controller, status) = controller_with_store(&device, store.clone());

    let outcome = controller
        .save_overrides(
            &edits(&[(ActionKind::Run, "Core.HMI.Run"), (ActionKind::Stop, "")]),
            DeviceVariant::V3,
            true,
        )
        .unwrap();
    assert_eq!(outcome, SaveOutcome::NothingToSave);
    assert!(!store.path().exists());
    assert_eq!(common::drain_labels(&status), ["Nothing to save"]);
}

#[test]
fn test_unreadable_store_falls_back_to_defaults() {
    let (_dir, store) = temp_store();
    std::fs::write(store.path(), "not json").unwrap();

    assert!(VariableResolver::open(store.clone()).is_err());
    let resolver = VariableResolver::open_or_defaults(store);
    assert_eq!(resolver.effective(), &VariableTable::defaults());
}

#[test]
#[serial]
#[cfg(target_os = "linux")]
fn test_overrides_persist_in_app_data_dir() {
    let data_home = tempfile::tempdir().unwrap();
    let previous = std::env::var_os("XDG_DATA_HOME");
    std::env::set_var("XDG_DATA_HOME", data_home.path());

    let dir = config::ensure_app_data_dir().unwrap();
    assert!(dir.starts_with(data_home.path()));

    let mut config = AppConfig::default();
    config.session.cooldown_ms = 250;
    config.save().unwrap();
    assert_eq!(AppConfig::load().unwrap(), config);

    let store = OverrideStore::from_config(&config).unwrap();
    assert_eq!(store.path(), dir.join(OVERRIDES_FILE));
    let mut resolver = VariableResolver::open(store).unwrap();
    resolver
        .save_overrides(&edits(&[(ActionKind::ManAuto, "MAIN.bMan")]), DeviceVariant::V2, false)
        .unwrap();
    assert!(dir.join(OVERRIDES_FILE).exists());

    match previous {
        Some(value) => std::env::set_var("XDG_DATA_HOME", value),
        None => std::env::remove_var("XDG_DATA_HOME"),
    }
}
