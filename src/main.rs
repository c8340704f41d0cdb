//! Application entry point: acoustic sensing node on a desktop host.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load and validate [`NodeConfig`] (defaults on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Choose the telemetry bus: HTTP uplink task or the log.
//! 5. Spawn the hotkey listener thread and the panel task.
//! 6. Open the microphone and start the software watchdog.
//! 7. Build the [`DeviceController`] and run its loop on the main thread
//!    until Ctrl-C.  The signal is watched on a runtime worker, so it also
//!    ends a power-down that is blocking the main thread.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use acoustic_node::{
    audio::MicConverter,
    config::NodeConfig,
    device::{DeviceController, Peripherals},
    hal::host::{
        HostMotion, HostPanel, HostPower, HostRadio, MonotonicClock, SimulatedClimate,
        SimulatedGauge, StaticLocator,
    },
    hal::ThreadWatchdog,
    hotkey::{HotkeyListener, PanelEvent, PanelKeys},
    stream::TcpNetwork,
    telemetry::{run_uplink, HttpUplink, LogTelemetryBus, QueuedTelemetryBus, TelemetryBus},
};

/// Undelivered telemetry events held before publishing starts failing.
const TELEMETRY_QUEUE: usize = 32;

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("acoustic node starting up");

    // 2. Configuration
    let config = NodeConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        NodeConfig::default()
    });
    config.validate().context("invalid settings")?;

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Telemetry
    let telemetry: Box<dyn TelemetryBus> = match &config.telemetry.endpoint {
        Some(endpoint) => {
            let uplink = HttpUplink::new(&config.telemetry, endpoint, &config.identity.device_id);
            let (bus, rx) = QueuedTelemetryBus::new(TELEMETRY_QUEUE);
            rt.spawn(run_uplink(rx, Arc::new(uplink)));
            log::info!("telemetry: posting to {endpoint}");
            Box::new(bus)
        }
        None => {
            log::info!("telemetry: no endpoint configured, logging events");
            Box::new(LogTelemetryBus)
        }
    };

    // 5. Panel controls
    let (panel, signals) = HostPanel::new();
    let (panel_tx, panel_rx) = mpsc::channel::<PanelEvent>(16);
    let keys = PanelKeys::from_names(
        &config.host.mode_key,
        &config.host.setup_key,
        &config.host.tap_key,
    );
    let _hotkey_listener = match HotkeyListener::start(keys, panel_tx) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("Hotkey listener unavailable: {e}");
            None
        }
    };
    rt.spawn(panel.clone().run(panel_rx));

    // 6. Capture and watchdog
    let converter = MicConverter::new().context("audio capture unavailable")?;
    log::info!(
        "capture: input device at {} Hz, {} ch",
        converter.sample_rate(),
        converter.channels()
    );

    let watchdog = ThreadWatchdog::start(
        Duration::from_millis(config.watchdog.timeout_ms),
        || {
            log::error!("watchdog expired, restarting node");
            std::process::exit(70);
        },
    )
    .context("failed to start watchdog")?;

    // 7. Controller
    let host = &config.host;
    let hw = Peripherals {
        clock: Box::new(MonotonicClock::new()),
        power: Box::new(HostPower::new(
            Duration::from_secs(host.sleep_cap_secs),
            &panel,
        )),
        radio: Box::new(HostRadio::new(host, &panel)),
        network: Box::new(TcpNetwork::new(Duration::from_millis(
            config.stream.connect_timeout_ms,
        ))),
        climate: Box::new(SimulatedClimate::new(host)),
        gauge: Box::new(SimulatedGauge::new(host)),
        motion: Box::new(HostMotion::new(&panel)),
        locator: Box::new(StaticLocator::new(host)),
        watchdog: Box::new(watchdog),
        signals: Box::new(signals),
        telemetry,
    };

    let loop_period = Duration::from_millis(config.timing.loop_period_ms);
    let mut controller = DeviceController::new(config, hw, Box::new(converter))
        .context("failed to build controller")?;
    controller.setup();

    let stopper = panel.clone();
    rt.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("interrupted");
                stopper.interrupt();
            }
            Err(e) => log::warn!("Ctrl-C handler unavailable: {e}"),
        }
    });

    rt.block_on(async {
        let mut ticker = tokio::time::interval(loop_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while !panel.is_interrupted() {
            ticker.tick().await;
            controller.run_once();
        }
    });

    controller.shutdown();
    Ok(())
}
