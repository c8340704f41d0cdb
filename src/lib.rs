//! Runtime of a battery-powered acoustic sensing node.
//!
//! Audio is captured continuously into a double buffer, decimated through a
//! biquad cascade, A-law compressed and streamed to a collector over TCP in
//! fixed-size slots.  Around the stream, a duty-cycle state machine reads the
//! battery and climate sensors, publishes measurements, and powers the node
//! down between sessions.

pub mod audio;
pub mod config;
pub mod device;
pub mod hal;
pub mod hotkey;
pub mod pipeline;
pub mod stream;
pub mod telemetry;
