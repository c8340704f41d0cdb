//! Host microphone converter via `cpal`.
//!
//! [`MicConverter`] stands in for the timer-triggered converter pair on a
//! development host.  The cpal callback plays the interrupt side: it
//! downmixes each buffer to mono, resamples it to the requested timer rate
//! by phase accumulation (sample-and-hold), converts to left-aligned 12-bit
//! codes and pushes two conversions per tick into the [`DmaChannel`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::capture::{CaptureError, Converter, DmaChannel};
use super::convert::{downmix_to_mono, to_adc_code};

// ---------------------------------------------------------------------------
// TickAccumulator
// ---------------------------------------------------------------------------

/// Emits timer ticks at `rate_hz` against a source running at `source_hz`.
#[derive(Debug, Clone)]
struct TickAccumulator {
    rate_hz: u64,
    source_hz: u64,
    phase: u64,
}

impl TickAccumulator {
    fn new(rate_hz: u32, source_hz: u32) -> Self {
        Self {
            rate_hz: u64::from(rate_hz),
            source_hz: u64::from(source_hz.max(1)),
            phase: 0,
        }
    }

    /// Number of ticks that fall within the next source sample.
    fn advance(&mut self) -> u64 {
        self.phase += self.rate_hz;
        let ticks = self.phase / self.source_hz;
        self.phase %= self.source_hz;
        ticks
    }
}

// ---------------------------------------------------------------------------
// MicConverter
// ---------------------------------------------------------------------------

/// Converter backed by the system default input device.
///
/// The device is opened in [`MicConverter::new`]; the stream is built on
/// [`arm`](Converter::arm) and dropped on [`halt`](Converter::halt), which
/// stops the cpal callback.
pub struct MicConverter {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
    stream: Option<cpal::Stream>,
}

impl MicConverter {
    /// Open the default input device and query its preferred configuration.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when no input device exists, or
    /// [`CaptureError::DefaultConfig`] when it cannot report a configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
            stream: None,
        })
    }

    /// Native sample rate of the device in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels the device delivers.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Converter for MicConverter {
    fn arm(&mut self, input: u8, rate_hz: u32, dma: DmaChannel) -> Result<(), CaptureError> {
        self.halt();

        let channels = self.channels;
        let mut ticks = TickAccumulator::new(rate_hz, self.sample_rate);

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for sample in downmix_to_mono(data, channels) {
                    let code = to_adc_code(sample);
                    for _ in 0..ticks.advance() {
                        dma.push(code);
                        dma.push(code);
                    }
                }
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!(
            "capture: microphone armed for input {input} ({} Hz device, {rate_hz} Hz timer, {} ch)",
            self.sample_rate,
            self.channels
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn halt(&mut self) {
        // Dropping the stream joins the callback.
        self.stream = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
