//! Integer-ratio decimator with a matched anti-aliasing low-pass.
//!
//! Every input sample goes through the filter; one filtered value is exposed
//! per `ratio` inputs.  The ready flag is single-read: a sample that is not
//! taken before the next cycle completes is overwritten, so a slow consumer
//! never stalls the capture path.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::filter::{BiquadCascade, SecondOrderSection};

// ---------------------------------------------------------------------------
// DecimationRatio
// ---------------------------------------------------------------------------

/// Supported decimation ratios.  Each one selects a pre-tuned low-pass
/// section whose cutoff sits below the new Nyquist frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DecimationRatio {
    X5,
    X10,
    X20,
    X50,
    X100,
}

/// A ratio outside {5, 10, 20, 50, 100} was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported decimation ratio {0} (expected 5, 10, 20, 50 or 100)")]
pub struct UnsupportedRatio(pub u32);

impl DecimationRatio {
    /// Number of input samples consumed per output sample.
    pub fn get(self) -> u32 {
        match self {
            DecimationRatio::X5 => 5,
            DecimationRatio::X10 => 10,
            DecimationRatio::X20 => 20,
            DecimationRatio::X50 => 50,
            DecimationRatio::X100 => 100,
        }
    }

    /// Design-time low-pass section for this ratio.
    fn section(self) -> SecondOrderSection {
        match self {
            DecimationRatio::X5 => {
                SecondOrderSection::new([0.245_237_28, 0.245_237_28, 0.0, 1.0, -0.509_525_45, 0.0])
            }
            DecimationRatio::X10 => SecondOrderSection::new([
                0.020_083_37,
                0.040_166_73,
                0.020_083_37,
                1.0,
                -1.561_018_08,
                0.641_351_54,
            ]),
            DecimationRatio::X20 => SecondOrderSection::new([
                0.005_542_72,
                0.011_085_43,
                0.005_542_72,
                1.0,
                -1.778_631_78,
                0.800_802_65,
            ]),
            DecimationRatio::X50 => SecondOrderSection::new([
                9.446_918_44e-4,
                1.889_383_69e-3,
                9.446_918_44e-4,
                1.0,
                -1.911_197_07,
                0.914_975_835,
            ]),
            DecimationRatio::X100 => SecondOrderSection::new([
                2.413_590_49e-4,
                4.827_180_98e-4,
                2.413_590_49e-4,
                1.0,
                -1.955_578_24,
                0.956_543_677,
            ]),
        }
    }
}

impl TryFrom<u32> for DecimationRatio {
    type Error = UnsupportedRatio;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DecimationRatio::X5),
            10 => Ok(DecimationRatio::X10),
            20 => Ok(DecimationRatio::X20),
            50 => Ok(DecimationRatio::X50),
            100 => Ok(DecimationRatio::X100),
            other => Err(UnsupportedRatio(other)),
        }
    }
}

impl From<DecimationRatio> for u32 {
    fn from(ratio: DecimationRatio) -> Self {
        ratio.get()
    }
}

impl fmt::Display for DecimationRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:1", self.get())
    }
}

impl Default for DecimationRatio {
    fn default() -> Self {
        DecimationRatio::X10
    }
}

// ---------------------------------------------------------------------------
// Downsampler
// ---------------------------------------------------------------------------

/// Filter-then-decimate stage.
///
/// # Example
///
/// ```rust
/// use acoustic_node::audio::{DecimationRatio, Downsampler};
///
/// let mut ds = Downsampler::new(DecimationRatio::X5);
/// for _ in 0..4 {
///     ds.update(0.1);
///     assert!(!ds.is_ready());
/// }
/// ds.update(0.1);
/// assert!(ds.is_ready());
/// let _ = ds.take_sample();
/// assert!(!ds.is_ready());
/// ```
#[derive(Debug, Clone)]
pub struct Downsampler {
    filter: BiquadCascade,
    ratio: u32,
    count: u32,
    ready: bool,
    last: f32,
}

impl Downsampler {
    /// Build a downsampler for `ratio` with its matching low-pass filter.
    pub fn new(ratio: DecimationRatio) -> Self {
        Self {
            filter: BiquadCascade::new(vec![ratio.section()], 1.0),
            ratio: ratio.get(),
            count: 0,
            ready: false,
            last: 0.0,
        }
    }

    /// Filter one input sample and advance the decimation counter.
    pub fn update(&mut self, x: f32) {
        self.last = self.filter.filter(x);
        self.count += 1;
        if self.count >= self.ratio {
            self.ready = true;
            self.count = 0;
        }
    }

    /// `true` once per `ratio` inputs, until the sample is taken.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Return the most recent filtered value and clear the ready flag.
    pub fn take_sample(&mut self) -> f32 {
        self.ready = false;
        self.last
    }

    /// Decimation ratio in use.
    pub fn ratio(&self) -> u32 {
        self.ratio
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
