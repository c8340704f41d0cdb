//! Sample format conversions between the converter, the DSP chain and the
//! compressor.
//!
//! 1. [`downmix_to_mono`]: average interleaved host-audio channels.
//! 2. [`to_adc_code`]: map an `f32` host sample onto a left-aligned 12-bit
//!    converter code, as the hardware writes it into the capture buffer.
//! 3. [`average_pair`] + [`normalize`]: fold a dual-converter pair into one
//!    value and centre it on zero in `[-1.0, 1.0)`.
//! 4. [`to_pcm16`]: saturate a filtered value back to a 16-bit sample for
//!    the compressor.

/// Mid-scale converter code (silence).
pub const ADC_MIDSCALE: u16 = 0x8000;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input as an owned `Vec`.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use acoustic_node::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4];
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// to_adc_code
// ---------------------------------------------------------------------------

/// Convert a host sample in `[-1.0, 1.0]` into a left-aligned 12-bit
/// converter code (the low four bits are always zero).
pub fn to_adc_code(sample: f32) -> u16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let code12 = ((clamped + 1.0) * 0.5 * 4095.0).round() as u16;
    code12 << 4
}

// ---------------------------------------------------------------------------
// average_pair / normalize
// ---------------------------------------------------------------------------

/// Average two simultaneous conversions without overflowing.
pub fn average_pair(a: u16, b: u16) -> u16 {
    ((u32::from(a) + u32::from(b)) / 2) as u16
}

/// Centre a converter code on zero and scale it into `[-1.0, 1.0)`.
pub fn normalize(code: u16) -> f32 {
    (f32::from(code) - f32::from(ADC_MIDSCALE)) / 32_768.0
}

// ---------------------------------------------------------------------------
// to_pcm16
// ---------------------------------------------------------------------------

/// Scale a `[-1.0, 1.0]` value to a 16-bit sample, saturating at the rails.
pub fn to_pcm16(value: f32) -> i16 {
    // `as` saturates on overflow and maps NaN to 0.
    (value * 32_768.0) as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
