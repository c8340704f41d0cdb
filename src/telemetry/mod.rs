//! Outbound telemetry: measurement reports and event notifications.
//!
//! The control loop publishes through the synchronous [`TelemetryBus`] and
//! never waits on the network.  On the host, [`QueuedTelemetryBus`] hands
//! events to a tokio task ([`run_uplink`]) that delivers them through a
//! [`TelemetryUplink`] such as [`HttpUplink`].
//!
//! ```text
//! DeviceController ──publish──▶ QueuedTelemetryBus ──mpsc──▶ run_uplink
//!                                                             └─ HttpUplink (reqwest)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod http;

pub use http::HttpUplink;

// ---------------------------------------------------------------------------
// TelemetryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("telemetry request timed out")]
    Timeout,

    #[error("endpoint answered with status {0}")]
    Status(u16),

    #[error("telemetry queue is full")]
    QueueFull,

    #[error("telemetry queue is closed")]
    QueueClosed,
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TelemetryError::Timeout
        } else if let Some(status) = e.status() {
            TelemetryError::Status(status.as_u16())
        } else {
            TelemetryError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// One periodic measurement report.  Field names on the wire are the short
/// keys the collector dashboard expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measurements {
    #[serde(rename = "T_in")]
    pub temperature_c: f32,
    #[serde(rename = "RH_i")]
    pub humidity_pct: u32,
    pub soc: u32,
    pub soh: u32,
    /// Charge bucket, see [`crate::device::charge_bucket`].
    pub chg: u8,
    #[serde(rename = "I")]
    pub current_ma: i32,
    #[serde(rename = "P")]
    pub power_mw: i32,
    #[serde(rename = "RSSI")]
    pub rssi: i32,
    /// Wireless (cloud publish) success ratio.
    #[serde(rename = "w_r")]
    pub wireless_ratio: f32,
    /// Audio slot delivery ratio.
    #[serde(rename = "a_r")]
    pub audio_ratio: f32,
    #[serde(rename = "acc")]
    pub accuracy: f32,
    #[serde(rename = "lon")]
    pub longitude: f32,
    #[serde(rename = "lat")]
    pub latitude: f32,
}

// ---------------------------------------------------------------------------
// TelemetryEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Measurements(Measurements),
    /// Charge is between the shutdown and slowdown thresholds.
    LowBattery,
    /// The node was woken by motion.
    Disturbance,
}

impl TelemetryEvent {
    /// Event name on the bus.
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::Measurements(_) => "measurements",
            TelemetryEvent::LowBattery => "Low Battery Warning",
            TelemetryEvent::Disturbance => "disturbance",
        }
    }

    /// JSON body, if the event carries one.
    pub fn payload(&self) -> Option<serde_json::Value> {
        match self {
            TelemetryEvent::Measurements(m) => serde_json::to_value(m).ok(),
            TelemetryEvent::LowBattery | TelemetryEvent::Disturbance => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TelemetryBus
// ---------------------------------------------------------------------------

/// Non-blocking publish side used by the control loop.
pub trait TelemetryBus {
    fn publish(&mut self, event: TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes events to the log.  Used when no endpoint is configured.
#[derive(Debug, Default)]
pub struct LogTelemetryBus;

impl TelemetryBus for LogTelemetryBus {
    fn publish(&mut self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        match event.payload() {
            Some(body) => log::info!("telemetry: {} {body}", event.name()),
            None => log::info!("telemetry: {}", event.name()),
        }
        Ok(())
    }
}

/// Queues events for [`run_uplink`].
pub struct QueuedTelemetryBus {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl QueuedTelemetryBus {
    /// Create a bus with room for `capacity` undelivered events and the
    /// receiver to hand to [`run_uplink`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl TelemetryBus for QueuedTelemetryBus {
    fn publish(&mut self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TelemetryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TelemetryError::QueueClosed,
        })
    }
}

// ---------------------------------------------------------------------------
// TelemetryUplink
// ---------------------------------------------------------------------------

/// Delivers one event to the outside world.
#[async_trait]
pub trait TelemetryUplink: Send + Sync {
    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Drain `rx` until every sender is gone, delivering each event in order.
/// Failures are logged and the event is dropped.
pub async fn run_uplink(
    mut rx: mpsc::Receiver<TelemetryEvent>,
    uplink: Arc<dyn TelemetryUplink>,
) {
    while let Some(event) = rx.recv().await {
        match uplink.send(&event).await {
            Ok(()) => log::debug!("telemetry: delivered {}", event.name()),
            Err(e) => log::warn!("telemetry: failed to deliver {}: {e}", event.name()),
        }
    }
    log::debug!("telemetry: uplink stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every event; fails the ones named in `reject`.
    struct Recording {
        seen: Mutex<Vec<&'static str>>,
        reject: &'static str,
    }

    #[async_trait]
    impl TelemetryUplink for Recording {
        async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
            self.seen.lock().unwrap().push(event.name());
            if event.name() == self.reject {
                Err(TelemetryError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn measurement_keys_match_dashboard() {
        let m = Measurements {
            temperature_c: 21.5,
            humidity_pct: 40,
            soc: 77,
            chg: 3,
            ..Measurements::default()
        };
        let value = TelemetryEvent::Measurements(m).payload().unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "T_in", "RH_i", "soc", "soh", "chg", "I", "P", "RSSI", "w_r", "a_r", "acc", "lon",
            "lat",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 13);
        assert_eq!(value["soc"], 77);
        assert_eq!(value["RH_i"], 40);
    }

    #[test]
    fn event_names() {
        assert_eq!(TelemetryEvent::LowBattery.name(), "Low Battery Warning");
        assert_eq!(TelemetryEvent::Disturbance.name(), "disturbance");
        assert!(TelemetryEvent::Disturbance.payload().is_none());
    }

    #[test]
    fn log_bus_accepts_everything() {
        let mut bus = LogTelemetryBus;
        assert!(bus.publish(TelemetryEvent::LowBattery).is_ok());
    }

    #[test]
    fn queued_bus_reports_full_and_closed() {
        let (mut bus, rx) = QueuedTelemetryBus::new(1);
        bus.publish(TelemetryEvent::Disturbance).unwrap();
        assert!(matches!(
            bus.publish(TelemetryEvent::Disturbance),
            Err(TelemetryError::QueueFull)
        ));

        drop(rx);
        assert!(matches!(
            bus.publish(TelemetryEvent::Disturbance),
            Err(TelemetryError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn uplink_task_delivers_in_order_and_survives_failures() {
        let (mut bus, rx) = QueuedTelemetryBus::new(8);
        let uplink = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reject: "Low Battery Warning",
        });

        bus.publish(TelemetryEvent::LowBattery).unwrap();
        bus.publish(TelemetryEvent::Disturbance).unwrap();
        bus.publish(TelemetryEvent::Measurements(Measurements::default()))
            .unwrap();
        drop(bus);

        run_uplink(rx, uplink.clone()).await;

        assert_eq!(
            *uplink.seen.lock().unwrap(),
            vec!["Low Battery Warning", "disturbance", "measurements"]
        );
    }
}
