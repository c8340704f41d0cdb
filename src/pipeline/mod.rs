//! Per-half audio processing between the capture driver and the transmit
//! ring.
//!
//! ```text
//! CaptureDriver::poll → half(&[u16])
//!        │
//!        ▼
//! AudioPipeline::process_half
//!        ├─ average_pair + normalize   (2:1, signed unit range)
//!        ├─ Downsampler                (anti-alias + decimate)
//!        ├─ to_pcm16 + compress::encode
//!        └─ TransmitRing::push         (counts total / overflow)
//! ```

pub mod feed;

pub use feed::AudioPipeline;
