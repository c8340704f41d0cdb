//! Capture half → downsampler → compressor → transmit ring.

use crate::audio::{compress, Downsampler};
use crate::audio::{average_pair, normalize, to_pcm16, DecimationRatio};
use crate::stream::{FillAdvance, SessionCounters, TransmitRing};

/// Moves one refreshed capture half into the transmit ring.
///
/// Owns the downsampler so filter state carries across halves and across
/// sessions.
pub struct AudioPipeline {
    downsampler: Downsampler,
}

impl AudioPipeline {
    pub fn new(ratio: DecimationRatio) -> Self {
        Self {
            downsampler: Downsampler::new(ratio),
        }
    }

    /// Process one capture half.
    ///
    /// Sample pairs are averaged and normalised, every value runs through the
    /// downsampler, and each decimated value is compressed into the ring.
    /// Returns the number of compressed codes appended.
    pub fn process_half(
        &mut self,
        half: &[u16],
        ring: &mut TransmitRing,
        counters: &mut SessionCounters,
    ) -> usize {
        let mut produced = 0;

        for pair in half.chunks_exact(2) {
            let value = normalize(average_pair(pair[0], pair[1]));
            self.downsampler.update(value);
            if !self.downsampler.is_ready() {
                continue;
            }

            let code = compress::encode(to_pcm16(self.downsampler.take_sample()));
            produced += 1;

            match ring.push(code as u8) {
                None => {}
                Some(FillAdvance::Advanced) => counters.total += 1,
                Some(FillAdvance::Overflowed) => {
                    counters.total += 1;
                    counters.overflow += 1;
                    log::warn!(
                        "stream: transmit ring exhausted, dropping oldest slot (overflows: {})",
                        counters.overflow
                    );
                }
                Some(FillAdvance::OverflowLatched) => counters.total += 1,
            }
        }

        produced
    }

    pub fn ratio(&self) -> u32 {
        self.downsampler.ratio()
    }
}
