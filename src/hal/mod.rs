//! Collaborator interfaces the device controller drives.
//!
//! Everything outside the acquisition-to-network core is reached through one
//! of these traits: clock, power management, radio/cloud connectivity, the
//! climate sensor, the battery fuel gauge, the motion (tap) sensor, the
//! geolocation helper, the watchdog and the system-event source.
//!
//! [`host`] binds them to a desktop machine; [`watchdog`] provides a
//! thread-backed software watchdog.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod host;
#[cfg(test)]
pub mod mock;
pub mod watchdog;

pub use watchdog::ThreadWatchdog;

// ---------------------------------------------------------------------------
// SensorError
// ---------------------------------------------------------------------------

/// A collaborator could not be initialised or read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("{0} did not respond")]
    NotResponding(&'static str),

    #[error("{sensor} reported error code {code}")]
    Device { sensor: &'static str, code: i32 },

    #[error("{0} is not initialised")]
    NotInitialised(&'static str),
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Calibrated climate sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Fuel-gauge snapshot.  All values are integers as reported by the gauge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatteryReading {
    /// State of charge, percent.
    pub soc: u32,
    pub voltage_mv: u32,
    /// Average current, mA (negative while discharging).
    pub current_ma: i32,
    /// Power, mW (negative while discharging).
    pub power_mw: i32,
    /// State of health, percent.
    pub soh: u32,
}

/// Last geolocation fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f32,
    pub longitude: f32,
    pub accuracy: f32,
}

/// Why the node came back from a power-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Timer,
    Motion,
}

/// Asynchronous system notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The mode button was clicked `n` times.
    ButtonClicks(u32),
    /// An over-the-air update started.
    FirmwareUpdatePending,
    /// The over-the-air update ended.
    FirmwareUpdateFinished,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Suspends the whole node.
pub trait PowerManager {
    /// Sleep for at most `interval`, waking early on motion when
    /// `wake_on_motion` is set.  Returns only once the node is awake again.
    fn sleep(&mut self, interval: Duration, wake_on_motion: bool) -> WakeReason;
}

/// Radio and cloud session control.
pub trait Connectivity {
    fn radio_on(&mut self);
    fn radio_off(&mut self);
    /// Give the connectivity stack a chance to run.
    fn process(&mut self);
    /// `true` while the radio is in listening (provisioning) mode.
    fn is_listening(&self) -> bool;
    fn cloud_connect(&mut self);
    fn cloud_connected(&self) -> bool;
    fn cloud_disconnect(&mut self);
    /// Received signal strength, dBm.
    fn rssi(&self) -> i32;
}

pub trait ClimateSensor {
    fn init(&mut self) -> Result<(), SensorError>;
    fn read(&mut self) -> Result<ClimateReading, SensorError>;
}

pub trait FuelGauge {
    fn init(&mut self, capacity_mah: u32) -> Result<(), SensorError>;
    fn read(&mut self) -> Result<BatteryReading, SensorError>;
}

pub trait MotionSensor {
    fn init(&mut self) -> Result<(), SensorError>;
    /// Read and clear the tap latch.  Non-zero means motion was seen.
    fn read_tap(&mut self) -> u32;
}

/// Asynchronous geolocation helper.
pub trait Locator {
    /// Advance any in-flight lookup.
    fn poll(&mut self);
    /// Start a lookup and publish the result when it resolves.
    fn request(&mut self);
    fn last_fix(&self) -> Option<Location>;
}

pub trait Watchdog {
    /// Reset the countdown.  Also resumes a paused watchdog.
    fn checkin(&mut self);
    /// Suspend the countdown (across a power-down).
    fn pause(&mut self);
}

/// Source of [`SystemEvent`]s.  Never blocks.
pub trait SignalSource {
    fn poll(&mut self) -> Option<SystemEvent>;
}
