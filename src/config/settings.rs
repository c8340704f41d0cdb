//! Node settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`: a settings file only needs the keys it changes.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::NodePaths;
use crate::audio::DecimationRatio;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A setting is out of range or inconsistent with another one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("capture.buffer_len {0} must be a non-zero multiple of 4")]
    BufferLength(usize),

    #[error("capture.sample_rate_hz must be greater than zero")]
    ZeroSampleRate,

    #[error("stream.slot_count {0} must be at least 2")]
    SlotCount(usize),

    #[error("stream.slot_len must be greater than zero")]
    ZeroSlotLength,

    #[error("stream.server_host is empty")]
    EmptyHost,

    #[error(
        "power thresholds must satisfy shutdown ({shutdown}) <= slowdown ({slowdown}) <= full ({full})"
    )]
    PowerThresholds {
        shutdown: u32,
        slowdown: u32,
        full: u32,
    },

    #[error("timing.loop_period_ms must be greater than zero")]
    ZeroLoopPeriod,
}

// ---------------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------------

/// Who this node is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Sent as `User-Agent` to the collector.
    pub device_id: String,
    /// Sent as `Accept: fw_<n>` in the stream header.
    pub firmware_version: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_id: "acoustic-node".into(),
            firmware_version: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Analog capture and decimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Analog input the converters sample.
    pub input_channel: u8,
    /// Converter timer rate in Hz.
    pub sample_rate_hz: u32,
    /// Circular capture buffer length in samples (both halves).
    pub buffer_len: usize,
    /// Downsampler ratio: 5, 10, 20, 50 or 100.
    pub decimation_ratio: DecimationRatio,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            input_channel: 0,
            sample_rate_hz: 63_000,
            buffer_len: 2048,
            decimation_ratio: DecimationRatio::X10,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Collector address and transmit ring geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Bytes per transmit slot.
    pub slot_len: usize,
    /// Number of transmit slots.
    pub slot_count: usize,
    /// Delay before retrying a send refused for congestion.
    pub retry_ms: u64,
    pub connect_timeout_ms: u64,
    /// Body of the end-of-session status message.
    pub status_payload: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_host: "osbeehives.com".into(),
            server_port: 8080,
            slot_len: 1024,
            slot_count: 24,
            retry_ms: 50,
            connect_timeout_ms: 5_000,
            status_payload: "0".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// State-machine dwell times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait in `BOOT_WAIT` before connecting to the cloud.
    pub boot_wait_ms: u64,
    /// Give up on the cloud after this long in `PUBLISH`.
    pub max_publish_ms: u64,
    /// Let the publish go out before opening the stream.
    pub after_publish_ms: u64,
    /// Length of one streaming session.
    pub max_recording_ms: u64,
    /// Period of the housekeeping pass.
    pub housekeeping_ms: u64,
    /// Leave setup mode after this long.
    pub setup_timeout_ms: u64,
    /// Report period in test mode.
    pub test_report_ms: u64,
    /// Pace of the control loop.
    pub loop_period_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            boot_wait_ms: 1_000,
            max_publish_ms: 30_000,
            after_publish_ms: 1_000,
            max_recording_ms: 10_000,
            housekeeping_ms: 1_000,
            setup_timeout_ms: 300_000,
            test_report_ms: 1_000,
            loop_period_ms: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// PowerConfig
// ---------------------------------------------------------------------------

/// Battery thresholds and wake cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Below this charge the node skips the cycle and sleeps.
    pub shutdown_percent: u32,
    /// Below this charge the extended wake interval is used.
    pub slowdown_percent: u32,
    /// Readings above this are treated as a gauge fault.
    pub full_charge_percent: u32,
    pub wake_interval_secs: u64,
    pub low_power_wake_interval_secs: u64,
    pub battery_capacity_mah: u32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            shutdown_percent: 15,
            slowdown_percent: 30,
            full_charge_percent: 100,
            wake_interval_secs: 20 * 60,
            low_power_wake_interval_secs: 60 * 60,
            battery_capacity_mah: 850,
        }
    }
}

impl PowerConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_secs)
    }

    pub fn low_power_wake_interval(&self) -> Duration {
        Duration::from_secs(self.low_power_wake_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// WatchdogConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

// ---------------------------------------------------------------------------
// TelemetryConfig
// ---------------------------------------------------------------------------

/// Where telemetry events go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// HTTP endpoint receiving JSON events.  `None` logs them instead.
    pub endpoint: Option<String>,
    /// Maximum seconds to wait for the endpoint.
    pub timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

/// Desktop stand-ins for the node's buttons and sensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Key emulating one click of the mode button.
    pub mode_key: String,
    /// Key toggling radio listening (setup) mode.
    pub setup_key: String,
    /// Key emulating an accelerometer tap.
    pub tap_key: String,
    /// Upper bound on a simulated power-down.
    pub sleep_cap_secs: u64,
    pub battery_soc: u32,
    pub battery_voltage_mv: u32,
    pub battery_current_ma: i32,
    pub battery_power_mw: i32,
    pub battery_soh: u32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub rssi_dbm: i32,
    pub latitude: f32,
    pub longitude: f32,
    pub accuracy_m: f32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mode_key: "F9".into(),
            setup_key: "F10".into(),
            tap_key: "F11".into(),
            sleep_cap_secs: 30,
            battery_soc: 80,
            battery_voltage_mv: 3_900,
            battery_current_ma: -120,
            battery_power_mw: -450,
            battery_soh: 98,
            temperature_c: 24.5,
            humidity_pct: 55.0,
            rssi_dbm: -60,
            latitude: 0.0,
            longitude: 0.0,
            accuracy_m: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level node configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use acoustic_node::config::NodeConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = NodeConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub timing: TimingConfig,
    pub power: PowerConfig,
    pub watchdog: WatchdogConfig,
    pub telemetry: TelemetryConfig,
    pub host: HostConfig,
}

impl NodeConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(NodeConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&NodePaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&NodePaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cap = &self.capture;
        if cap.buffer_len == 0 || cap.buffer_len % 4 != 0 {
            return Err(ConfigError::BufferLength(cap.buffer_len));
        }
        if cap.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }

        let stream = &self.stream;
        if stream.slot_count < 2 {
            return Err(ConfigError::SlotCount(stream.slot_count));
        }
        if stream.slot_len == 0 {
            return Err(ConfigError::ZeroSlotLength);
        }
        if stream.server_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let p = &self.power;
        if !(p.shutdown_percent <= p.slowdown_percent
            && p.slowdown_percent <= p.full_charge_percent)
        {
            return Err(ConfigError::PowerThresholds {
                shutdown: p.shutdown_percent,
                slowdown: p.slowdown_percent,
                full: p.full_charge_percent,
            });
        }

        if self.timing.loop_period_ms == 0 {
            return Err(ConfigError::ZeroLoopPeriod);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
