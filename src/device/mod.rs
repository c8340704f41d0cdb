//! Device state machine and the measurement report it publishes.
//!
//! [`DeviceController`] sequences the node through its duty cycle: check the
//! battery, publish measurements, stream one audio session to the collector,
//! then power down until the next wake.  Setup and test branches pre-empt the
//! cycle.  See [`DeviceState`] for the full transition diagram.

pub mod controller;
pub mod report;
pub mod state;

pub use controller::{DeviceController, Peripherals};
pub use report::{charge_bucket, Readings, WirelessStats};
pub use state::DeviceState;
