//! Top-level node controller.
//!
//! [`DeviceController`] owns every piece of cross-cycle state: the current
//! [`DeviceState`] and its entry time, the capture driver, the audio
//! pipeline, the streaming [`Session`] and the latest readings.  The host
//! calls [`run_once`](DeviceController::run_once) in a tight loop; no call
//! blocks except the deliberate suspend in `PowerDown`.
//!
//! # One pass
//!
//! ```text
//! run_once
//!   ├─ drain system events   (button clicks → test/run mode, OTA → setup)
//!   ├─ housekeeping          (every housekeeping_ms: watchdog, radio,
//!   │                         setup detection, locator, tap sensor)
//!   └─ state handler         (one step of the state machine)
//! ```
//!
//! Every transition resets the state timer.

use std::time::Duration;

use crate::audio::{CaptureDriver, CaptureError, Converter};
use crate::config::NodeConfig;
use crate::hal::{
    ClimateSensor, Clock, Connectivity, FuelGauge, Locator, MotionSensor, PowerManager,
    SignalSource, SystemEvent, WakeReason, Watchdog,
};
use crate::pipeline::AudioPipeline;
use crate::stream::{
    send_status, CollectorRequest, NetworkStack, SendOutcome, SessionCounters,
    StreamingTransport, TransmitRing, TransportError,
};
use crate::telemetry::{TelemetryBus, TelemetryEvent};

use super::report::{Readings, WirelessStats};
use super::state::DeviceState;

// ---------------------------------------------------------------------------
// Peripherals
// ---------------------------------------------------------------------------

/// The collaborators the controller drives.
pub struct Peripherals {
    pub clock: Box<dyn Clock>,
    pub power: Box<dyn PowerManager>,
    pub radio: Box<dyn Connectivity>,
    pub network: Box<dyn NetworkStack>,
    pub climate: Box<dyn ClimateSensor>,
    pub gauge: Box<dyn FuelGauge>,
    pub motion: Box<dyn MotionSensor>,
    pub locator: Box<dyn Locator>,
    pub watchdog: Box<dyn Watchdog>,
    pub signals: Box<dyn SignalSource>,
    pub telemetry: Box<dyn TelemetryBus>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State of one streaming session.
struct Session {
    ring: TransmitRing,
    counters: SessionCounters,
    transport: Option<StreamingTransport>,
    started_at: u64,
}

impl Session {
    fn begin(&mut self, transport: StreamingTransport, now: u64) {
        self.ring.clear();
        self.counters = SessionCounters::default();
        self.transport = Some(transport);
        self.started_at = now;
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceController
// ---------------------------------------------------------------------------

pub struct DeviceController {
    config: NodeConfig,
    hw: Peripherals,
    request: CollectorRequest,
    capture: CaptureDriver,
    pipeline: AudioPipeline,
    session: Session,

    state: DeviceState,
    state_time: u64,
    housekeeping_at: u64,

    readings: Readings,
    wireless: WirelessStats,
    wake_interval: Duration,
    last_wake: WakeReason,
    motion_seen: bool,
    woke_on_motion: bool,
    published: bool,
    setup_latched: bool,
    ota_active: bool,
    button_clicks: u32,
}

impl DeviceController {
    /// Build a controller around `converter` and the board collaborators.
    ///
    /// `config` must have passed [`NodeConfig::validate`].
    pub fn new(
        config: NodeConfig,
        hw: Peripherals,
        converter: Box<dyn Converter>,
    ) -> Result<Self, CaptureError> {
        let capture = CaptureDriver::new(
            config.capture.input_channel,
            config.capture.buffer_len,
            converter,
        )?;
        let request = CollectorRequest {
            device_id: config.identity.device_id.clone(),
            host: config.stream.server_host.clone(),
            port: config.stream.server_port,
            firmware_version: config.identity.firmware_version,
        };

        Ok(Self {
            pipeline: AudioPipeline::new(config.capture.decimation_ratio),
            session: Session {
                ring: TransmitRing::new(config.stream.slot_count, config.stream.slot_len),
                counters: SessionCounters::default(),
                transport: None,
                started_at: 0,
            },
            wake_interval: config.power.wake_interval(),
            request,
            capture,
            hw,
            config,
            state: DeviceState::default(),
            state_time: 0,
            housekeeping_at: 0,
            readings: Readings::default(),
            wireless: WirelessStats::default(),
            last_wake: WakeReason::Timer,
            motion_seen: false,
            woke_on_motion: false,
            published: false,
            setup_latched: false,
            ota_active: false,
            button_clicks: 0,
        })
    }

    /// Initialise the sensors.  A sensor that fails to come up is logged
    /// and the node keeps running with default readings.
    pub fn setup(&mut self) {
        log::info!(
            "device: {} firmware {}",
            self.config.identity.device_id,
            self.config.identity.firmware_version
        );

        if let Err(e) = self.hw.climate.init() {
            log::warn!("device: climate sensor unavailable ({e}); continuing degraded");
        }
        if let Err(e) = self.hw.gauge.init(self.config.power.battery_capacity_mah) {
            log::warn!("device: fuel gauge unavailable ({e}); continuing degraded");
        }
        if let Err(e) = self.hw.motion.init() {
            log::warn!("device: motion sensor unavailable ({e}); continuing degraded");
        }

        self.hw.watchdog.checkin();
        self.state_time = self.hw.clock.now_ms();
        log::info!("device: setup complete, starting in {}", self.state);
    }

    /// Run one pass of the control loop.
    pub fn run_once(&mut self) {
        self.handle_signals();

        let now = self.hw.clock.now_ms();
        if now >= self.housekeeping_at {
            self.housekeeping();
            self.housekeeping_at = now + self.config.timing.housekeeping_ms;
        }

        match self.state {
            DeviceState::BootWait => self.boot_wait(),
            DeviceState::LpCheck => self.lp_check(),
            DeviceState::Publish => self.publish(),
            DeviceState::PublishWait => self.publish_wait(),
            DeviceState::Connect => self.connect(),
            DeviceState::Stream => self.stream(),
            DeviceState::Finish => self.finish(),
            DeviceState::Sleep => self.sleep(),
            DeviceState::PowerDown => self.power_down(),
            DeviceState::Setup => self.setup_mode(),
            DeviceState::TestPrepare => self.test_prepare(),
            DeviceState::Test => self.test(),
        }
    }

    /// Release capture and the collector connection.
    pub fn shutdown(&mut self) {
        self.teardown();
        log::info!("device: shut down in {}", self.state);
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Counters of the current (or last) streaming session.
    pub fn session(&self) -> &SessionCounters {
        &self.session.counters
    }

    pub fn wireless(&self) -> &WirelessStats {
        &self.wireless
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    /// Interval the next power-down will use.
    pub fn wake_interval(&self) -> Duration {
        self.wake_interval
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn elapsed(&self) -> u64 {
        self.hw.clock.now_ms().saturating_sub(self.state_time)
    }

    fn transition(&mut self, next: DeviceState) {
        if next != self.state {
            log::debug!("device: {} -> {}", self.state, next);
        }
        self.state = next;
        self.state_time = self.hw.clock.now_ms();
    }

    fn teardown(&mut self) {
        self.capture.stop();
        self.session.close_transport();
    }

    fn emit(&mut self, event: TelemetryEvent) {
        let name = event.name();
        if let Err(e) = self.hw.telemetry.publish(event) {
            log::warn!("telemetry: {name} not published: {e}");
        }
    }

    fn handle_signals(&mut self) {
        while let Some(event) = self.hw.signals.poll() {
            match event {
                SystemEvent::ButtonClicks(n) => {
                    self.button_clicks = self.button_clicks.wrapping_add(n);
                    if self.button_clicks % 2 == 1 {
                        log::info!("device: test mode");
                        self.transition(DeviceState::TestPrepare);
                    } else {
                        log::info!("device: run mode");
                        self.teardown();
                        self.transition(DeviceState::BootWait);
                    }
                }
                SystemEvent::FirmwareUpdatePending => {
                    log::info!("device: firmware update pending, entering setup");
                    self.ota_active = true;
                    self.teardown();
                    self.transition(DeviceState::Setup);
                }
                SystemEvent::FirmwareUpdateFinished => {
                    log::info!("device: firmware update finished");
                    self.ota_active = false;
                }
            }
        }
    }

    fn housekeeping(&mut self) {
        self.hw.watchdog.checkin();
        self.hw.radio.process();
        if self.state != DeviceState::Stream {
            log::trace!("device: state {}", self.state);
        }
        self.check_setup();
        self.hw.locator.poll();
        if self.hw.motion.read_tap() != 0 {
            log::info!("device: disturbance detected");
            self.motion_seen = true;
        }
    }

    /// Enter setup mode the first time the radio is seen listening.
    fn check_setup(&mut self) -> bool {
        if self.setup_latched || !self.hw.radio.is_listening() {
            return false;
        }
        log::info!("device: radio listening, entering setup");
        self.setup_latched = true;
        self.teardown();
        self.transition(DeviceState::Setup);
        true
    }

    fn refresh_readings(&mut self) {
        match self.hw.climate.read() {
            Ok(climate) => self.readings.climate = climate,
            Err(e) => log::warn!("device: climate read failed: {e}"),
        }
        match self.hw.gauge.read() {
            Ok(battery) => self.readings.battery = battery,
            Err(e) => log::warn!("device: fuel gauge read failed: {e}"),
        }
        if let Some(fix) = self.hw.locator.last_fix() {
            self.readings.location = Some(fix);
        }
    }

    fn refresh_link(&mut self) {
        self.readings.rssi = self.hw.radio.rssi();
        log::debug!(
            "device: rssi {} dBm, cloud ok/timeout {}/{} (ratio {:.2}), audio good/total {}/{} (ratio {:.2})",
            self.readings.rssi,
            self.wireless.ok,
            self.wireless.timeouts,
            self.wireless.ratio(),
            self.session.counters.good,
            self.session.counters.total,
            self.session.counters.audio_ratio()
        );
    }

    fn log_battery(&self) {
        let b = &self.readings.battery;
        log::debug!(
            "device: battery soc {}% soh {}% {} mV {} mA {} mW",
            b.soc,
            b.soh,
            b.voltage_mv,
            b.current_ma,
            b.power_mw
        );
    }

    // -----------------------------------------------------------------------
    // States
    // -----------------------------------------------------------------------

    fn boot_wait(&mut self) {
        if self.elapsed() >= self.config.timing.boot_wait_ms {
            self.hw.radio.cloud_connect();
            self.published = false;
            self.transition(DeviceState::Publish);
        }
    }

    fn lp_check(&mut self) {
        let tapped = self.hw.motion.read_tap() != 0;
        self.woke_on_motion = tapped || self.motion_seen || self.last_wake == WakeReason::Motion;
        self.motion_seen = false;
        self.last_wake = WakeReason::Timer;
        if self.woke_on_motion {
            log::info!("device: woken by motion");
        }

        self.refresh_readings();
        let soc = self.readings.battery.soc;
        let power = &self.config.power;

        if soc < power.slowdown_percent {
            self.wake_interval = power.low_power_wake_interval();
        } else if soc <= power.full_charge_percent {
            self.wake_interval = power.wake_interval();
        }

        if soc < power.shutdown_percent || soc > power.full_charge_percent {
            log::warn!("device: battery at {soc}%, sleeping until charged");
            self.log_battery();
            self.transition(DeviceState::Sleep);
        } else {
            self.hw.radio.radio_on();
            self.transition(DeviceState::BootWait);
        }
    }

    fn publish(&mut self) {
        if !self.published {
            self.refresh_readings();
            self.refresh_link();
            self.log_battery();
            self.published = true;
        }

        if self.check_setup() {
            return;
        }

        if self.hw.radio.cloud_connected() {
            self.hw.locator.request();
            self.refresh_link();

            let soc = self.readings.battery.soc;
            let power = &self.config.power;
            if soc >= power.shutdown_percent && soc < power.slowdown_percent {
                log::warn!("device: low battery ({soc}%)");
                self.emit(TelemetryEvent::LowBattery);
            }
            if self.woke_on_motion {
                self.emit(TelemetryEvent::Disturbance);
            }

            self.refresh_readings();
            let report = self
                .readings
                .measurements(&self.wireless, &self.session.counters);
            self.emit(TelemetryEvent::Measurements(report));

            self.wireless.ok += 1;
            self.transition(DeviceState::PublishWait);
        } else if self.elapsed() >= self.config.timing.max_publish_ms {
            self.wireless.timeouts += 1;
            log::warn!("device: cloud unreachable, skipping this cycle");
            self.transition(DeviceState::Sleep);
        }
    }

    fn publish_wait(&mut self) {
        if self.elapsed() >= self.config.timing.after_publish_ms {
            self.transition(DeviceState::Connect);
        }
    }

    fn connect(&mut self) {
        let header = self.request.stream_header();
        let opened = StreamingTransport::open(
            self.hw.network.as_mut(),
            &self.request.host,
            self.request.port,
            header.as_bytes(),
            self.config.stream.retry_ms,
        );

        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("stream: failed to connect to collector: {e}");
                self.transition(DeviceState::Sleep);
                return;
            }
        };

        let now = self.hw.clock.now_ms();
        self.session.begin(transport, now);

        if let Err(e) = self.capture.start(self.config.capture.sample_rate_hz) {
            log::error!("capture: failed to start: {e}");
            self.transition(DeviceState::Finish);
            return;
        }

        log::info!(
            "stream: session started ({} Hz, {}:1)",
            self.config.capture.sample_rate_hz,
            self.pipeline.ratio()
        );
        self.transition(DeviceState::Stream);
    }

    fn stream(&mut self) {
        while let Some(half) = self.capture.poll() {
            let samples = self.capture.half(half);
            self.pipeline
                .process_half(samples, &mut self.session.ring, &mut self.session.counters);
        }

        let now = self.hw.clock.now_ms();
        let outcome = match self.session.transport.as_mut() {
            Some(transport) => {
                transport.service(&mut self.session.ring, &mut self.session.counters, now)
            }
            None => SendOutcome::Fatal(TransportError::Closed),
        };

        if let SendOutcome::Fatal(e) = outcome {
            log::error!("stream: connection lost: {e}");
            self.teardown();
            self.woke_on_motion = false;
            self.transition(DeviceState::Finish);
            return;
        }

        if now.saturating_sub(self.session.started_at) >= self.config.timing.max_recording_ms {
            log::debug!("stream: recording window elapsed");
            self.transition(DeviceState::Finish);
        }
    }

    fn finish(&mut self) {
        self.teardown();

        let c = self.session.counters;
        log::info!(
            "stream: session finished; good/fail/overflow {}/{}/{} of {} slots",
            c.good,
            c.would_block,
            c.overflow,
            c.total
        );

        let message = self
            .request
            .status_message(&self.config.stream.status_payload);
        match send_status(
            self.hw.network.as_mut(),
            &self.request.host,
            self.request.port,
            message.as_bytes(),
        ) {
            Ok(()) => log::debug!("stream: status delivered"),
            Err(e) => log::warn!("stream: status not delivered: {e}"),
        }

        self.transition(DeviceState::Sleep);
    }

    fn sleep(&mut self) {
        self.session.ring.clear();
        if self.check_setup() {
            return;
        }
        self.transition(DeviceState::PowerDown);
    }

    fn power_down(&mut self) {
        self.hw.motion.read_tap();
        self.motion_seen = false;
        self.hw.radio.cloud_disconnect();
        self.hw.radio.radio_off();

        log::info!("device: powering down for {:?}", self.wake_interval);
        self.hw.watchdog.pause();
        self.last_wake = self.hw.power.sleep(self.wake_interval, true);
        self.hw.watchdog.checkin();
        log::info!("device: awake ({:?})", self.last_wake);

        self.transition(DeviceState::LpCheck);
    }

    fn setup_mode(&mut self) {
        if self.elapsed() >= self.config.timing.setup_timeout_ms {
            // latch stays set: a radio left listening must not pull the
            // node back into setup on the next wake
            log::warn!("device: setup timed out");
            self.transition(DeviceState::PowerDown);
            return;
        }
        if !self.hw.radio.is_listening() && !self.ota_active {
            log::info!("device: leaving setup");
            self.setup_latched = false;
            self.transition(DeviceState::BootWait);
        }
    }

    fn test_prepare(&mut self) {
        self.teardown();
        self.woke_on_motion = false;
        self.transition(DeviceState::Test);
    }

    fn test(&mut self) {
        if self.elapsed() >= self.config.timing.test_report_ms {
            self.refresh_link();
            self.refresh_readings();
            self.log_battery();
            log::info!(
                "device: test report rssi {} dBm soc {}%",
                self.readings.rssi,
                self.readings.battery.soc
            );
            self.state_time = self.hw.clock.now_ms();
        }
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::convert::ADC_MIDSCALE;
    use crate::hal::mock::{MockBoard, MockConverter, MockNetwork, Reply};
    use crate::hal::{SensorError, WakeReason};
    use std::io;

    /// Small geometry: one full capture buffer (40 samples, 20 pairs) at 5:1
    /// yields 4 codes, exactly one 4-byte slot.
    fn test_config() -> NodeConfig {
        let mut cfg = NodeConfig::default();
        cfg.capture.buffer_len = 40;
        cfg.capture.decimation_ratio = crate::audio::DecimationRatio::X5;
        cfg.stream.slot_len = 4;
        cfg.stream.slot_count = 4;
        cfg
    }

    struct Rig {
        ctl: DeviceController,
        board: MockBoard,
        net: MockNetwork,
        conv: MockConverter,
    }

    fn rig_with(cfg: NodeConfig) -> Rig {
        let board = MockBoard::new();
        let net = MockNetwork::new();
        let conv = MockConverter::new();
        let mut ctl =
            DeviceController::new(cfg, board.peripherals(&net), Box::new(conv.clone())).unwrap();
        ctl.setup();
        Rig {
            ctl,
            board,
            net,
            conv,
        }
    }

    fn rig() -> Rig {
        rig_with(test_config())
    }

    impl Rig {
        fn step(&mut self) -> DeviceState {
            self.ctl.run_once();
            self.ctl.state()
        }

        /// Run passes, advancing the clock by `ms` before each, until `target`
        /// is reached.  Returns every state visited.
        fn run_until(&mut self, target: DeviceState, ms: u64) -> Vec<DeviceState> {
            let mut visited = vec![self.ctl.state()];
            for _ in 0..10_000 {
                if self.ctl.state() == target {
                    return visited;
                }
                self.board.advance(ms);
                let s = self.step();
                if visited.last() != Some(&s) {
                    visited.push(s);
                }
            }
            panic!("never reached {target}; visited {visited:?}");
        }

        fn one_buffer(&self) {
            self.conv.produce(&[ADC_MIDSCALE; 40]);
        }
    }

    // ---- Power check -------------------------------------------------------

    #[test]
    fn low_charge_goes_straight_to_sleep() {
        let mut r = rig();
        r.board.set_soc(10);

        assert_eq!(r.step(), DeviceState::Sleep);
        assert_eq!(r.step(), DeviceState::PowerDown);
        assert_eq!(r.step(), DeviceState::LpCheck);

        let sleeps = r.board.lock().sleeps.clone();
        assert_eq!(sleeps, vec![(Duration::from_secs(3600), true)]);
        assert!(r.board.published_names().is_empty());
        assert_eq!(r.net.connects(), 0);
    }

    #[test]
    fn low_charge_never_visits_boot_or_publish() {
        let mut r = rig();
        r.board.set_soc(10);
        let visited = r.run_until(DeviceState::PowerDown, 1);
        assert_eq!(
            visited,
            vec![DeviceState::LpCheck, DeviceState::Sleep, DeviceState::PowerDown]
        );
    }

    #[test]
    fn over_full_reading_is_treated_as_shutdown() {
        let mut r = rig();
        r.board.set_soc(101);
        assert_eq!(r.step(), DeviceState::Sleep);
    }

    #[test]
    fn charge_selects_wake_cadence() {
        let mut r = rig();
        r.board.set_soc(25);
        assert_eq!(r.step(), DeviceState::BootWait);
        assert_eq!(r.ctl.wake_interval(), Duration::from_secs(3600));
        assert!(r.board.lock().radio_on);

        let mut r = rig();
        r.board.set_soc(30);
        r.step();
        assert_eq!(r.ctl.wake_interval(), Duration::from_secs(1200));
    }

    // ---- Publish -----------------------------------------------------------

    #[test]
    fn full_cycle_publishes_streams_and_sleeps() {
        let mut r = rig();
        let visited = r.run_until(DeviceState::Stream, 10);
        assert_eq!(
            visited,
            vec![
                DeviceState::LpCheck,
                DeviceState::BootWait,
                DeviceState::Publish,
                DeviceState::PublishWait,
                DeviceState::Connect,
                DeviceState::Stream,
            ]
        );
        assert_eq!(r.board.published_names(), vec!["measurements"]);
        assert_eq!(r.ctl.wireless().ok, 1);
        assert_eq!(r.board.lock().locate_requests, 1);

        // stream header went out first
        let written = r.net.written();
        assert!(written[0].starts_with(b"POST /write?db=AudioData HTTP/1.1\r\n"));
        assert_eq!(r.conv.armed_rate(), Some(63_000));

        r.one_buffer();
        r.step();
        assert_eq!(r.ctl.session().total, 1);
        assert_eq!(r.ctl.session().good, 1);
        assert_eq!(r.net.written()[1].len(), 4);

        let visited = r.run_until(DeviceState::PowerDown, 1_000);
        assert_eq!(
            visited,
            vec![
                DeviceState::Stream,
                DeviceState::Finish,
                DeviceState::Sleep,
                DeviceState::PowerDown,
            ]
        );
        assert_eq!(r.conv.halts(), 1);
        assert_eq!(r.net.connects(), 2);
        let status = r.net.written().last().cloned().unwrap();
        assert!(status.ends_with(b"\r\n\r\n0\r\n\r\n"));
    }

    #[test]
    fn low_battery_and_disturbance_events() {
        let mut r = rig();
        r.board.set_soc(20);
        r.board.lock().taps = 1;
        r.run_until(DeviceState::PublishWait, 10);
        assert_eq!(
            r.board.published_names(),
            vec!["Low Battery Warning", "disturbance", "measurements"]
        );
    }

    #[test]
    fn motion_wake_is_reported() {
        let mut r = rig();
        r.board.set_soc(10);
        r.board.lock().wake_reason = WakeReason::Motion;
        assert_eq!(r.step(), DeviceState::Sleep);
        r.run_until(DeviceState::LpCheck, 1);
        r.board.set_soc(80);
        r.step();
        r.run_until(DeviceState::PublishWait, 10);
        assert!(r.board.published_names().contains(&"disturbance"));
    }

    #[test]
    fn cloud_timeout_counts_and_sleeps() {
        let mut r = rig();
        r.board.lock().cloud_reachable = false;
        r.run_until(DeviceState::Publish, 10);
        let visited = r.run_until(DeviceState::Sleep, 1_000);
        assert_eq!(visited, vec![DeviceState::Publish, DeviceState::Sleep]);
        assert_eq!(r.ctl.wireless().timeouts, 1);
        assert!(r.board.published_names().is_empty());
    }

    #[test]
    fn failed_sensor_keeps_previous_reading() {
        let mut r = rig();
        r.step();
        let before = r.ctl.readings().climate;
        r.board.lock().climate = Err(SensorError::NotResponding("climate"));
        r.run_until(DeviceState::PublishWait, 10);
        assert_eq!(r.ctl.readings().climate, before);
    }

    #[test]
    fn sensor_init_failure_is_not_fatal() {
        let board = MockBoard::new();
        board.lock().init_error = Some(SensorError::NotResponding("gauge"));
        let net = MockNetwork::new();
        let mut ctl = DeviceController::new(
            test_config(),
            board.peripherals(&net),
            Box::new(MockConverter::new()),
        )
        .unwrap();
        ctl.setup();
        ctl.run_once();
        assert_eq!(ctl.state(), DeviceState::BootWait);
        assert_eq!(board.lock().inits, 3);
    }

    // ---- Streaming ---------------------------------------------------------

    #[test]
    fn connect_failure_goes_to_sleep() {
        let mut r = rig();
        r.net.refuse_connections(true);
        let visited = r.run_until(DeviceState::Sleep, 10);
        assert_eq!(visited.last(), Some(&DeviceState::Sleep));
        assert!(!visited.contains(&DeviceState::Stream));
        assert_eq!(r.conv.arms(), 0);
    }

    #[test]
    fn would_block_then_fatal_aborts_session() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);

        r.net.script([Reply::WouldBlock; 5]);
        r.net
            .script([Reply::Error(io::ErrorKind::ConnectionReset)]);

        r.one_buffer();
        r.step();
        for _ in 0..4 {
            r.board.advance(50);
            r.step();
        }
        assert_eq!(r.ctl.session().would_block, 5);
        assert_eq!(r.ctl.state(), DeviceState::Stream);

        r.board.advance(50);
        assert_eq!(r.step(), DeviceState::Finish);
        assert_eq!(r.conv.halts(), 1);

        assert_eq!(r.step(), DeviceState::Sleep);
        let c = *r.ctl.session();
        assert_eq!(c.good, 0);
        assert_eq!(c.would_block, 5);
        assert_eq!(r.conv.halts(), 1);
    }

    #[test]
    fn retry_timer_limits_attempts() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);
        let before = r.net.attempts();

        r.net.script([Reply::WouldBlock]);
        r.one_buffer();
        r.step();
        // same instant: timer still running
        r.step();
        r.step();
        assert_eq!(r.net.attempts(), before + 1);

        r.board.advance(50);
        r.step();
        assert_eq!(r.net.attempts(), before + 2);
        assert_eq!(r.ctl.session().good, 1);
    }

    #[test]
    fn short_write_resumes_after_retry() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);
        r.net.script([Reply::Partial(2)]);
        r.one_buffer();
        assert_eq!(r.step(), DeviceState::Stream);
        assert_eq!(r.ctl.session().would_block, 1);
        assert_eq!(r.ctl.session().good, 0);

        r.board.advance(50);
        assert_eq!(r.step(), DeviceState::Stream);
        assert_eq!(r.ctl.session().good, 1);

        let written = r.net.written();
        let tail = &written[written.len() - 2..];
        assert_eq!(tail[0].len() + tail[1].len(), 4);
    }

    #[test]
    fn ring_overflow_is_counted_once_while_link_is_stuck() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);
        r.net.script([Reply::WouldBlock; 20]);

        // 6 slots into a 4-slot ring without a successful drain
        for _ in 0..6 {
            r.one_buffer();
            r.step();
        }
        let c = *r.ctl.session();
        assert_eq!(c.total, 6);
        assert_eq!(c.overflow, 1);
        assert_eq!(c.good, 0);
    }

    #[test]
    fn capture_start_failure_ends_session() {
        let mut r = rig();
        r.conv.fail_arm(true);
        r.run_until(DeviceState::Connect, 10);
        assert_eq!(r.step(), DeviceState::Finish);
        assert_eq!(r.step(), DeviceState::Sleep);
        assert_eq!(r.conv.halts(), 0);
    }

    #[test]
    fn session_counters_reset_on_next_session() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);
        r.one_buffer();
        r.step();
        assert_eq!(r.ctl.session().good, 1);

        r.run_until(DeviceState::LpCheck, 1_000);
        r.run_until(DeviceState::Stream, 10);
        assert_eq!(*r.ctl.session(), SessionCounters::default());
    }

    // ---- Setup / test branches ---------------------------------------------

    #[test]
    fn listening_radio_enters_setup_and_returns() {
        let mut r = rig();
        r.step();
        r.board.lock().listening = true;
        r.board.advance(1_000);
        assert_eq!(r.step(), DeviceState::Setup);

        r.board.advance(1_000);
        assert_eq!(r.step(), DeviceState::Setup);

        r.board.lock().listening = false;
        assert_eq!(r.step(), DeviceState::BootWait);
    }

    #[test]
    fn setup_times_out_into_power_down() {
        let mut r = rig();
        r.board.lock().listening = true;
        assert_eq!(r.step(), DeviceState::Setup);
        r.board.advance(300_000);
        assert_eq!(r.step(), DeviceState::PowerDown);
    }

    #[test]
    fn setup_timeout_keeps_radio_from_reentering_setup() {
        let mut r = rig();
        r.board.lock().listening = true;
        assert_eq!(r.step(), DeviceState::Setup);
        r.board.advance(300_000);
        assert_eq!(r.step(), DeviceState::PowerDown);

        let mut visited = Vec::new();
        for _ in 0..50 {
            r.board.advance(100);
            visited.push(r.step());
        }
        assert!(visited.contains(&DeviceState::LpCheck));
        assert!(!visited.contains(&DeviceState::Setup));
        assert!(r.board.lock().listening);
    }

    #[test]
    fn firmware_update_holds_setup() {
        let mut r = rig();
        r.board.push_event(SystemEvent::FirmwareUpdatePending);
        assert_eq!(r.step(), DeviceState::Setup);
        r.board.advance(10);
        assert_eq!(r.step(), DeviceState::Setup);

        r.board.push_event(SystemEvent::FirmwareUpdateFinished);
        assert_eq!(r.step(), DeviceState::BootWait);
    }

    #[test]
    fn button_clicks_toggle_test_mode() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);

        r.board.push_event(SystemEvent::ButtonClicks(1));
        assert_eq!(r.step(), DeviceState::Test);
        assert_eq!(r.conv.halts(), 1);
        assert_eq!(r.net.closes(), 1);

        r.board.lock().rssi = -80;
        r.board.advance(1_000);
        r.step();
        assert_eq!(r.ctl.readings().rssi, -80);

        r.board.push_event(SystemEvent::ButtonClicks(2));
        assert_eq!(r.step(), DeviceState::Test);

        r.board.push_event(SystemEvent::ButtonClicks(1));
        r.step();
        assert_eq!(r.ctl.state(), DeviceState::BootWait);
    }

    // ---- Housekeeping ------------------------------------------------------

    #[test]
    fn watchdog_checked_in_and_paused_across_sleep() {
        let mut r = rig();
        r.board.set_soc(10);
        let base = r.board.lock().checkins;
        assert_eq!(r.step(), DeviceState::Sleep);
        r.run_until(DeviceState::LpCheck, 1);
        let s = r.board.lock();
        assert!(s.checkins > base);
        assert_eq!(s.pauses, 1);
        assert_eq!(s.cloud_disconnects, 1);
        assert!(!s.radio_on);
    }

    #[test]
    fn shutdown_releases_capture() {
        let mut r = rig();
        r.run_until(DeviceState::Stream, 10);
        r.ctl.shutdown();
        assert_eq!(r.conv.halts(), 1);
        assert_eq!(r.net.closes(), 1);
    }
}
