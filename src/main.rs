//! SuperADS bench console - Main Entry Point
//!
//! A line-oriented front end over the session layer, wired to the simulated
//! device so connection handling and the control protocol can be exercised
//! without a vehicle.

use anyhow::{bail, Context};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use superads_rs::{
    backend::SimulatedDevice,
    config::{self, AppConfig},
    fleet::Fleet,
    session::{PressOutcome, ReleaseOutcome, StatusEvent, StatusPump},
    types::{ActionKind, DeviceProfile, DeviceVariant},
    variables::{OverrideStore, SaveOutcome, SymbolEdits, VariableResolver, VariableTable},
    Controller,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HELP: &str = "\
commands:
  connect                      connect to the selected device
  disconnect                   end the session
  press <action>               press a control (reset, run, stop, man_auto, horn)
  release <action>             release a control
  tap <action>                 press and release
  horn                         toggle the horn-disable flag
  select <n>                   select fleet entry n
  list                         show the fleet
  save <V2|V3> <core|no_core> <action>=<symbol>...
                               persist symbol overrides
  reset-overrides              drop all symbol overrides
  status                       show the session state
  quit";

/// Console logging plus a daily log file in the app data directory.
/// The returned guard flushes the file writer and must outlive `main`.
fn setup_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,superads_rs=debug"));

    let file = match config::ensure_app_data_dir() {
        Ok(dir) => Some(tracing_appender::non_blocking(tracing_appender::rolling::daily(
            dir.join("logs"),
            "superads.log",
        ))),
        Err(e) => {
            eprintln!("File logging disabled: {}", e);
            None
        }
    };

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_names(true),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Demo fleet served by one simulated controller
fn bench_fleet() -> Fleet {
    Fleet::new(vec![
        DeviceProfile::new("LGV01", "5.2.1.1.1.1", DeviceVariant::V3),
        DeviceProfile::from_route(2, "192.168.10.2", DeviceVariant::V3),
        DeviceProfile::from_route(10, "192.168.10.10", DeviceVariant::V2),
    ])
}

fn bench_device() -> SimulatedDevice {
    let table = VariableTable::defaults();
    SimulatedDevice::new()
        .with_control_symbols(&table, DeviceVariant::V2, false)
        .with_control_symbols(&table, DeviceVariant::V3, true)
        .with_open_delay(Duration::from_millis(150))
}

fn parse_action(word: Option<&str>) -> anyhow::Result<ActionKind> {
    let word = word.context("missing action")?;
    Ok(word.parse()?)
}

fn parse_edits<'a>(words: impl Iterator<Item = &'a str>) -> anyhow::Result<SymbolEdits> {
    let mut edits = SymbolEdits::new();
    for word in words {
        let (action, symbol) = word
            .split_once('=')
            .with_context(|| format!("expected <action>=<symbol>, got '{}'", word))?;
        edits.insert(action.parse()?, symbol.to_string());
    }
    Ok(edits)
}

fn print_fleet(controller: &Controller) {
    let selected = controller.fleet().selected_index();
    for (i, device) in controller.fleet().devices().iter().enumerate() {
        let marker = if Some(i) == selected { '*' } else { ' ' };
        println!("{} {}: {}", marker, i, device);
    }
}

fn print_status(controller: &Controller) {
    println!("state: {}", controller.state());
    if let Some(info) = controller.session_info() {
        println!(
            "device: {} port {} core library: {}",
            info.profile, info.port, info.core_detected
        );
        println!("connected since {}", info.connected_at.format("%H:%M:%S"));
    }
    if let Some(stats) = controller.manager().link_stats() {
        println!("link: {:?} ({:.1}% ok)", stats, stats.success_rate());
    }
    if let Some(snapshot) = controller.control_snapshot() {
        for (kind, value) in snapshot {
            let value = value.map_or("?".to_string(), |v| v.to_string());
            println!("  {:<12} {}", kind.to_string(), value);
        }
    }
}

/// Run one console command; returns false on quit
fn execute(controller: &mut Controller, line: &str) -> anyhow::Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };

    match command {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "connect" => {
            let attempt = controller.connect_selected()?;
            match attempt.wait() {
                Ok(info) => println!("connected to {}", info.profile.name),
                Err(e) => println!("{}", e),
            }
        }
        "disconnect" => {
            controller.disconnect();
        }
        "press" => {
            let kind = parse_action(words.next())?;
            report_press(controller.press(kind)?);
        }
        "release" => {
            let kind = parse_action(words.next())?;
            report_release(controller.release(kind)?);
        }
        "tap" => {
            let kind = parse_action(words.next())?;
            report_press(controller.press(kind)?);
            report_release(controller.release(kind)?);
        }
        "horn" => report_press(controller.activate_horn_toggle()?),
        "select" => {
            let index: usize = words.next().context("missing index")?.parse()?;
            let change = controller.select_device(index)?;
            if change.horn_was_disabled {
                println!("warning: the previous device still has its horn disabled");
            }
            print_fleet(controller);
        }
        "list" => print_fleet(controller),
        "save" => {
            let variant: DeviceVariant = words.next().context("missing variant")?.parse()?;
            let core = match words.next() {
                Some("core") => true,
                Some("no_core") => false,
                other => bail!("expected core or no_core, got {:?}", other),
            };
            let edits = parse_edits(words)?;
            match controller.save_overrides(&edits, variant, core)? {
                SaveOutcome::NothingToSave => println!("nothing to save"),
                SaveOutcome::Saved { changed } => println!("saved {:?}", changed),
            }
        }
        "reset-overrides" => controller.reset_overrides()?,
        "status" => print_status(controller),
        other => println!("unknown command '{}', try help", other),
    }
    Ok(true)
}

fn report_press(outcome: PressOutcome) {
    match outcome {
        PressOutcome::Written { symbol, value } => println!("{} <- {}", symbol, value),
        PressOutcome::Ignored(reason) => println!("ignored ({:?})", reason),
    }
}

fn report_release(outcome: ReleaseOutcome) {
    match outcome {
        ReleaseOutcome::Written { symbol, value } => println!("{} <- {}", symbol, value),
        ReleaseOutcome::Skipped => println!("release skipped"),
        ReleaseOutcome::NotMomentary => {}
    }
}

fn main() -> anyhow::Result<()> {
    let _log_guard = setup_tracing();

    tracing::info!("Starting SuperADS bench console");

    let config = AppConfig::load_or_default();
    let store = OverrideStore::from_config(&config).context("locating the overrides file")?;
    let resolver = VariableResolver::open_or_defaults(store).shared();
    let status_tick = config.session.status_tick();

    let (controller, status) = Controller::new(config, Arc::new(bench_device()), resolver);
    let mut controller = controller.with_fleet(bench_fleet());

    let pump = StatusPump::spawn(
        status,
        |event: StatusEvent| println!("{}", event),
        status_tick,
    )?;

    println!("{}", HELP);
    print_fleet(&controller);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        match execute(&mut controller, &line?) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {:#}", e),
        }
    }

    tracing::info!("Shutting down...");
    controller.disconnect();
    drop(controller);
    pump.stop();
    Ok(())
}
