//! Acquisition and signal processing: converter → capture buffer →
//! downsampler → compressor.
//!
//! # Pipeline
//!
//! ```text
//! Converter (timer + dual ADC) → DmaChannel (circular, half/full flags)
//!           → CaptureDriver::poll / half → average_pair + normalize
//!           → Downsampler (BiquadCascade + decimation) → to_pcm16
//!           → compress::encode → transmit ring
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acoustic_node::audio::{CaptureDriver, MicConverter};
//!
//! let mic = MicConverter::new().unwrap();
//! let mut capture = CaptureDriver::new(0, 2048, Box::new(mic)).unwrap();
//! capture.start(63_000).unwrap();
//!
//! loop {
//!     while let Some(half) = capture.poll() {
//!         println!("{} samples ready", capture.half(half).len());
//!     }
//! }
//! ```

pub mod capture;
pub mod compress;
pub mod convert;
pub mod downsampler;
pub mod filter;
pub mod mic;

pub use capture::{BufferHalf, CaptureDriver, CaptureError, Converter, DmaChannel};
pub use convert::{average_pair, downmix_to_mono, normalize, to_adc_code, to_pcm16};
pub use downsampler::{DecimationRatio, Downsampler, UnsupportedRatio};
pub use filter::{BiquadCascade, SecondOrderSection};
pub use mic::MicConverter;
