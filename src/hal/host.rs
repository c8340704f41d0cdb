//! Desktop bindings for the collaborator traits.
//!
//! The radio, sensors and locator are simulated from [`HostConfig`]; the
//! node's physical controls (mode button, setup switch, accelerometer tap)
//! are driven by [`HostPanel`], which the hotkey listener feeds.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::{
    BatteryReading, ClimateReading, ClimateSensor, Clock, Connectivity, FuelGauge, Location,
    Locator, MotionSensor, PowerManager, SensorError, SignalSource, SystemEvent, WakeReason,
};
use crate::config::HostConfig;
use crate::hotkey::PanelEvent;

const SLEEP_STEP: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Clock / power
// ---------------------------------------------------------------------------

/// Milliseconds since construction.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Blocks the calling thread in place of a real power-down.
///
/// Sleeps are capped at `cap` so a desktop run cycles in reasonable time,
/// and end at once after [`HostPanel::interrupt`].
pub struct HostPower {
    cap: Duration,
    taps: Arc<AtomicU32>,
    interrupted: Arc<AtomicBool>,
}

impl HostPower {
    pub fn new(cap: Duration, panel: &HostPanel) -> Self {
        Self {
            cap,
            taps: Arc::clone(&panel.taps),
            interrupted: Arc::clone(&panel.interrupted),
        }
    }
}

impl PowerManager for HostPower {
    fn sleep(&mut self, interval: Duration, wake_on_motion: bool) -> WakeReason {
        let limit = interval.min(self.cap);
        if limit < interval {
            log::debug!("power: sleep of {interval:?} capped at {limit:?}");
        }

        let start = Instant::now();
        loop {
            if self.interrupted.load(Ordering::Acquire) {
                log::debug!("power: sleep interrupted");
                return WakeReason::Timer;
            }
            if wake_on_motion && self.taps.load(Ordering::Acquire) > 0 {
                return WakeReason::Motion;
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return WakeReason::Timer;
            }
            std::thread::sleep(SLEEP_STEP.min(limit - elapsed));
        }
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

/// Simulated radio.  The cloud comes up as soon as it is requested with the
/// radio on; listening mode follows the panel's setup switch.
pub struct HostRadio {
    listening: Arc<AtomicBool>,
    powered: bool,
    cloud: bool,
    rssi: i32,
}

impl HostRadio {
    pub fn new(config: &HostConfig, panel: &HostPanel) -> Self {
        Self {
            listening: Arc::clone(&panel.listening),
            powered: false,
            cloud: false,
            rssi: config.rssi_dbm,
        }
    }
}

impl Connectivity for HostRadio {
    fn radio_on(&mut self) {
        if !self.powered {
            log::debug!("radio: on");
        }
        self.powered = true;
    }

    fn radio_off(&mut self) {
        if self.powered {
            log::debug!("radio: off");
        }
        self.powered = false;
        self.cloud = false;
    }

    fn process(&mut self) {}

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    fn cloud_connect(&mut self) {
        self.cloud = true;
    }

    fn cloud_connected(&self) -> bool {
        self.powered && self.cloud
    }

    fn cloud_disconnect(&mut self) {
        self.cloud = false;
    }

    fn rssi(&self) -> i32 {
        if self.powered {
            self.rssi
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Fixed climate reading from the host section of the settings.
pub struct SimulatedClimate {
    reading: ClimateReading,
    ready: bool,
}

impl SimulatedClimate {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            reading: ClimateReading {
                temperature_c: config.temperature_c,
                humidity_pct: config.humidity_pct,
            },
            ready: false,
        }
    }
}

impl ClimateSensor for SimulatedClimate {
    fn init(&mut self) -> Result<(), SensorError> {
        self.ready = true;
        Ok(())
    }

    fn read(&mut self) -> Result<ClimateReading, SensorError> {
        if !self.ready {
            return Err(SensorError::NotInitialised("climate sensor"));
        }
        Ok(self.reading)
    }
}

/// Fixed battery snapshot from the host section of the settings.
pub struct SimulatedGauge {
    reading: BatteryReading,
    capacity_mah: Option<u32>,
}

impl SimulatedGauge {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            reading: BatteryReading {
                soc: config.battery_soc,
                voltage_mv: config.battery_voltage_mv,
                current_ma: config.battery_current_ma,
                power_mw: config.battery_power_mw,
                soh: config.battery_soh,
            },
            capacity_mah: None,
        }
    }
}

impl FuelGauge for SimulatedGauge {
    fn init(&mut self, capacity_mah: u32) -> Result<(), SensorError> {
        log::debug!("gauge: design capacity {capacity_mah} mAh");
        self.capacity_mah = Some(capacity_mah);
        Ok(())
    }

    fn read(&mut self) -> Result<BatteryReading, SensorError> {
        match self.capacity_mah {
            Some(_) => Ok(self.reading),
            None => Err(SensorError::NotInitialised("fuel gauge")),
        }
    }
}

/// Tap latch set by the panel.
pub struct HostMotion {
    taps: Arc<AtomicU32>,
}

impl HostMotion {
    pub fn new(panel: &HostPanel) -> Self {
        Self {
            taps: Arc::clone(&panel.taps),
        }
    }
}

impl MotionSensor for HostMotion {
    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read_tap(&mut self) -> u32 {
        self.taps.swap(0, Ordering::AcqRel)
    }
}

/// Resolves every lookup to the configured position on the next poll.
pub struct StaticLocator {
    position: Location,
    pending: bool,
    fix: Option<Location>,
}

impl StaticLocator {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            position: Location {
                latitude: config.latitude,
                longitude: config.longitude,
                accuracy: config.accuracy_m,
            },
            pending: false,
            fix: None,
        }
    }
}

impl Locator for StaticLocator {
    fn poll(&mut self) {
        if std::mem::take(&mut self.pending) {
            self.fix = Some(self.position);
            log::debug!(
                "locator: fix {:.5},{:.5} ±{} m",
                self.position.latitude,
                self.position.longitude,
                self.position.accuracy
            );
        }
    }

    fn request(&mut self) {
        self.pending = true;
    }

    fn last_fix(&self) -> Option<Location> {
        self.fix
    }
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

/// The node's physical controls.
///
/// Mode clicks become [`SystemEvent::ButtonClicks`] on the paired
/// [`ChannelSignals`]; the setup switch and tap latch are shared with
/// [`HostRadio`] and [`HostMotion`].
#[derive(Clone)]
pub struct HostPanel {
    listening: Arc<AtomicBool>,
    taps: Arc<AtomicU32>,
    interrupted: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SystemEvent>,
}

impl HostPanel {
    pub fn new() -> (Self, ChannelSignals) {
        let (events, rx) = mpsc::unbounded_channel();
        let panel = Self {
            listening: Arc::new(AtomicBool::new(false)),
            taps: Arc::new(AtomicU32::new(0)),
            interrupted: Arc::new(AtomicBool::new(false)),
            events,
        };
        (panel, ChannelSignals { rx })
    }

    pub fn apply(&self, event: PanelEvent) {
        match event {
            PanelEvent::ModeClick => {
                log::info!("panel: mode button");
                let _ = self.events.send(SystemEvent::ButtonClicks(1));
            }
            PanelEvent::SetupToggle => {
                let listening = !self.listening.fetch_xor(true, Ordering::AcqRel);
                log::info!(
                    "panel: radio {}",
                    if listening { "listening" } else { "normal" }
                );
            }
            PanelEvent::Tap => {
                log::info!("panel: tap");
                self.taps.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// Ask the node to stop.  A power-down in progress returns at its next
    /// step.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Apply every event from `rx` until the sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<PanelEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event);
        }
        log::debug!("panel: input closed");
    }
}

/// Receiving side of the panel's system events.
pub struct ChannelSignals {
    rx: mpsc::UnboundedReceiver<SystemEvent>,
}

impl SignalSource for ChannelSignals {
    fn poll(&mut self) -> Option<SystemEvent> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
