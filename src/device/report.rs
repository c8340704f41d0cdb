//! Sensor snapshot and the measurement report built from it.

use crate::hal::{BatteryReading, ClimateReading, Location};
use crate::stream::SessionCounters;
use crate::telemetry::Measurements;

/// Bucket battery power (mW) into 200 mW bands starting at -600.
///
/// ```
/// use acoustic_node::device::charge_bucket;
///
/// assert_eq!(charge_bucket(-500), 0);
/// assert_eq!(charge_bucket(-1), 2);
/// assert_eq!(charge_bucket(0), 3);
/// assert_eq!(charge_bucket(5_000), 5);
/// ```
pub fn charge_bucket(power_mw: i32) -> u8 {
    let mut low = -600;
    for bucket in 0..5u8 {
        if (low..low + 200).contains(&power_mw) {
            return bucket;
        }
        low += 200;
    }
    5
}

/// Cloud publish outcomes across the node's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WirelessStats {
    pub ok: u32,
    pub timeouts: u32,
}

impl WirelessStats {
    /// `(ok + 1) / (timeouts + ok + 1)`.
    pub fn ratio(&self) -> f32 {
        (self.ok + 1) as f32 / (self.timeouts + self.ok + 1) as f32
    }
}

/// Latest values from every collaborator.  A failed read keeps the previous
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub climate: ClimateReading,
    pub battery: BatteryReading,
    pub rssi: i32,
    pub location: Option<Location>,
}

impl Readings {
    pub fn measurements(&self, wireless: &WirelessStats, audio: &SessionCounters) -> Measurements {
        let location = self.location.unwrap_or_default();
        Measurements {
            temperature_c: self.climate.temperature_c,
            humidity_pct: self.climate.humidity_pct.max(0.0) as u32,
            soc: self.battery.soc,
            soh: self.battery.soh,
            chg: charge_bucket(self.battery.power_mw),
            current_ma: self.battery.current_ma,
            power_mw: self.battery.power_mw,
            rssi: self.rssi,
            wireless_ratio: wireless.ratio(),
            audio_ratio: audio.audio_ratio(),
            accuracy: location.accuracy,
            longitude: location.longitude,
            latitude: location.latitude,
        }
    }
}
