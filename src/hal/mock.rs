//! Scriptable test doubles for every collaborator.
//!
//! Each double is a cheap `Clone` over shared state so a test can keep one
//! handle while the code under test owns a boxed copy.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    BatteryReading, ClimateReading, ClimateSensor, Clock, Connectivity, FuelGauge, Location,
    Locator, MotionSensor, PowerManager, SensorError, SignalSource, SystemEvent, WakeReason,
    Watchdog,
};
use crate::audio::{CaptureError, Converter, DmaChannel};
use crate::device::Peripherals;
use crate::stream::{Connection, NetworkStack, TransportError};
use crate::telemetry::{TelemetryBus, TelemetryError, TelemetryEvent};

// ---------------------------------------------------------------------------
// MockConverter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConverterState {
    dma: Option<DmaChannel>,
    rate: Option<u32>,
    arms: usize,
    halts: usize,
    fail_arm: bool,
}

/// Converter whose conversions are supplied by the test.
#[derive(Clone, Default)]
pub struct MockConverter {
    state: Arc<Mutex<ConverterState>>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConverterState> {
        self.state.lock().unwrap()
    }

    /// Play the DMA controller: push `samples` into the armed channel.
    pub fn produce(&self, samples: &[u16]) {
        if let Some(dma) = self.lock().dma.clone() {
            dma.push_slice(samples);
        }
    }

    pub fn armed_rate(&self) -> Option<u32> {
        self.lock().rate
    }

    pub fn arms(&self) -> usize {
        self.lock().arms
    }

    pub fn halts(&self) -> usize {
        self.lock().halts
    }

    pub fn fail_arm(&self, fail: bool) {
        self.lock().fail_arm = fail;
    }
}

impl Converter for MockConverter {
    fn arm(&mut self, _input: u8, rate_hz: u32, dma: DmaChannel) -> Result<(), CaptureError> {
        let mut s = self.lock();
        if s.fail_arm {
            return Err(CaptureError::NoDevice);
        }
        s.arms += 1;
        s.rate = Some(rate_hz);
        s.dma = Some(dma);
        Ok(())
    }

    fn halt(&mut self) {
        let mut s = self.lock();
        s.halts += 1;
        s.rate = None;
    }
}

// ---------------------------------------------------------------------------
// MockNetwork
// ---------------------------------------------------------------------------

/// Scripted outcome of one write.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Accept,
    WouldBlock,
    Partial(usize),
    Error(io::ErrorKind),
}

#[derive(Default)]
struct NetState {
    refuse: bool,
    script: VecDeque<Reply>,
    connects: usize,
    closes: usize,
    attempts: usize,
    written: Vec<Vec<u8>>,
}

/// Network stack whose writes follow a script.  Unscripted writes succeed.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetState>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetState> {
        self.state.lock().unwrap()
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Queue replies for the next writes.
    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.lock().script.extend(replies);
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Every write call, accepted or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Payloads of accepted writes, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }
}

impl NetworkStack for MockNetwork {
    fn connect(&mut self, host: &str, port: u16) -> Result<Box<dyn Connection>, TransportError> {
        let mut s = self.lock();
        if s.refuse {
            return Err(TransportError::Connect {
                addr: format!("{host}:{port}"),
                reason: "connection refused".into(),
            });
        }
        s.connects += 1;
        Ok(Box::new(MockConnection {
            net: self.clone(),
            open: true,
        }))
    }
}

struct MockConnection {
    net: MockNetwork,
    open: bool,
}

impl Connection for MockConnection {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut s = self.net.lock();
        s.attempts += 1;
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        match s.script.pop_front().unwrap_or(Reply::Accept) {
            Reply::Accept => {
                s.written.push(bytes.to_vec());
                Ok(bytes.len())
            }
            Reply::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
            Reply::Partial(n) => {
                let n = n.min(bytes.len());
                s.written.push(bytes[..n].to_vec());
                Ok(n)
            }
            Reply::Error(kind) => Err(kind.into()),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.net.lock().closes += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// MockBoard
// ---------------------------------------------------------------------------

/// Everything the board exposes, in one place.
pub struct BoardState {
    pub now_ms: u64,
    pub sleeps: Vec<(Duration, bool)>,
    pub wake_reason: WakeReason,
    pub radio_on: bool,
    pub listening: bool,
    pub cloud_requested: bool,
    /// Whether a requested cloud session comes up.
    pub cloud_reachable: bool,
    pub cloud_disconnects: usize,
    pub rssi: i32,
    pub climate: Result<ClimateReading, SensorError>,
    pub battery: Result<BatteryReading, SensorError>,
    pub init_error: Option<SensorError>,
    pub inits: usize,
    pub taps: u32,
    pub fix: Option<Location>,
    pub locate_requests: usize,
    pub checkins: usize,
    pub pauses: usize,
    pub events: VecDeque<SystemEvent>,
    pub published: Vec<TelemetryEvent>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            now_ms: 0,
            sleeps: Vec::new(),
            wake_reason: WakeReason::Timer,
            radio_on: false,
            listening: false,
            cloud_requested: false,
            cloud_reachable: true,
            cloud_disconnects: 0,
            rssi: -55,
            climate: Ok(ClimateReading {
                temperature_c: 22.0,
                humidity_pct: 50.0,
            }),
            battery: Ok(BatteryReading {
                soc: 80,
                voltage_mv: 3_900,
                current_ma: -100,
                power_mw: -350,
                soh: 95,
            }),
            init_error: None,
            inits: 0,
            taps: 0,
            fix: None,
            locate_requests: 0,
            checkins: 0,
            pauses: 0,
            events: VecDeque::new(),
            published: Vec::new(),
        }
    }
}

/// Manual clock plus every sensor, radio and bus, sharing one state.
#[derive(Clone, Default)]
pub struct MockBoard {
    state: Arc<Mutex<BoardState>>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap()
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.lock().now_ms += ms;
    }

    pub fn set_soc(&self, soc: u32) {
        if let Ok(b) = self.lock().battery.as_mut() {
            b.soc = soc;
        }
    }

    pub fn push_event(&self, event: SystemEvent) {
        self.lock().events.push_back(event);
    }

    pub fn published_names(&self) -> Vec<&'static str> {
        self.lock().published.iter().map(TelemetryEvent::name).collect()
    }

    /// Box one handle per collaborator.
    pub fn peripherals(&self, network: &MockNetwork) -> Peripherals {
        Peripherals {
            clock: Box::new(self.clone()),
            power: Box::new(self.clone()),
            radio: Box::new(self.clone()),
            network: Box::new(network.clone()),
            climate: Box::new(self.clone()),
            gauge: Box::new(self.clone()),
            motion: Box::new(self.clone()),
            locator: Box::new(self.clone()),
            watchdog: Box::new(self.clone()),
            signals: Box::new(self.clone()),
            telemetry: Box::new(self.clone()),
        }
    }
}

impl Clock for MockBoard {
    fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }
}

impl PowerManager for MockBoard {
    fn sleep(&mut self, interval: Duration, wake_on_motion: bool) -> WakeReason {
        let mut s = self.lock();
        s.sleeps.push((interval, wake_on_motion));
        s.now_ms += interval.as_millis() as u64;
        s.wake_reason
    }
}

impl Connectivity for MockBoard {
    fn radio_on(&mut self) {
        self.lock().radio_on = true;
    }

    fn radio_off(&mut self) {
        let mut s = self.lock();
        s.radio_on = false;
        s.cloud_requested = false;
    }

    fn process(&mut self) {}

    fn is_listening(&self) -> bool {
        self.lock().listening
    }

    fn cloud_connect(&mut self) {
        self.lock().cloud_requested = true;
    }

    fn cloud_connected(&self) -> bool {
        let s = self.lock();
        s.cloud_requested && s.cloud_reachable && s.radio_on
    }

    fn cloud_disconnect(&mut self) {
        let mut s = self.lock();
        s.cloud_requested = false;
        s.cloud_disconnects += 1;
    }

    fn rssi(&self) -> i32 {
        self.lock().rssi
    }
}

impl ClimateSensor for MockBoard {
    fn init(&mut self) -> Result<(), SensorError> {
        let mut s = self.lock();
        s.inits += 1;
        s.init_error.clone().map_or(Ok(()), Err)
    }

    fn read(&mut self) -> Result<ClimateReading, SensorError> {
        self.lock().climate.clone()
    }
}

impl FuelGauge for MockBoard {
    fn init(&mut self, _capacity_mah: u32) -> Result<(), SensorError> {
        let mut s = self.lock();
        s.inits += 1;
        s.init_error.clone().map_or(Ok(()), Err)
    }

    fn read(&mut self) -> Result<BatteryReading, SensorError> {
        self.lock().battery.clone()
    }
}

impl MotionSensor for MockBoard {
    fn init(&mut self) -> Result<(), SensorError> {
        self.lock().inits += 1;
        Ok(())
    }

    fn read_tap(&mut self) -> u32 {
        std::mem::take(&mut self.lock().taps)
    }
}

impl Locator for MockBoard {
    fn poll(&mut self) {}

    fn request(&mut self) {
        self.lock().locate_requests += 1;
    }

    fn last_fix(&self) -> Option<Location> {
        self.lock().fix
    }
}

impl Watchdog for MockBoard {
    fn checkin(&mut self) {
        self.lock().checkins += 1;
    }

    fn pause(&mut self) {
        self.lock().pauses += 1;
    }
}

impl SignalSource for MockBoard {
    fn poll(&mut self) -> Option<SystemEvent> {
        self.lock().events.pop_front()
    }
}

impl TelemetryBus for MockBoard {
    fn publish(&mut self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        self.lock().published.push(event);
        Ok(())
    }
}
