//! Continuous double-buffered capture.
//!
//! A [`Converter`] (timer + dual analog converter) writes samples into a
//! circular [`DmaChannel`] without involving the control loop.  The buffer is
//! split into two halves; finishing the first half raises the *half
//! transferred* flag, finishing the second raises *fully transferred* and
//! wraps to the start.
//!
//! [`CaptureDriver`] owns the buffer and exposes the flags through
//! [`poll`](CaptureDriver::poll), which clears a flag as it reports it.  The
//! loop must consume a half before the producer comes back around to it;
//! there is no lock between the two sides.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while configuring or arming the capture hardware.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture buffer length {0} must be a non-zero multiple of 4")]
    BufferLength(usize),

    #[error("sample rate must be greater than zero")]
    ZeroRate,

    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// BufferHalf
// ---------------------------------------------------------------------------

/// Which half of the capture buffer has been refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHalf {
    First,
    Second,
}

// ---------------------------------------------------------------------------
// DmaChannel
// ---------------------------------------------------------------------------

struct DmaShared {
    samples: Box<[AtomicU16]>,
    write_pos: AtomicUsize,
    half_flag: AtomicBool,
    full_flag: AtomicBool,
    armed: AtomicBool,
}

/// Producer-side handle to the circular capture buffer.
///
/// Cheap to clone.  Exactly one producer may push at a time; it plays the
/// role of the DMA controller.
#[derive(Clone)]
pub struct DmaChannel {
    shared: Arc<DmaShared>,
}

impl DmaChannel {
    fn new(len: usize) -> Self {
        let samples = (0..len).map(|_| AtomicU16::new(0)).collect();
        Self {
            shared: Arc::new(DmaShared {
                samples,
                write_pos: AtomicUsize::new(0),
                half_flag: AtomicBool::new(false),
                full_flag: AtomicBool::new(false),
                armed: AtomicBool::new(false),
            }),
        }
    }

    /// Store one conversion result at the current transfer position.
    ///
    /// Ignored while the channel is disarmed, so nothing lands in the buffer
    /// after [`CaptureDriver::stop`] returns.
    pub fn push(&self, sample: u16) {
        let shared = &*self.shared;
        if !shared.armed.load(Ordering::Acquire) {
            return;
        }

        let len = shared.samples.len();
        let mut pos = shared.write_pos.load(Ordering::Relaxed);
        shared.samples[pos].store(sample, Ordering::Relaxed);
        pos += 1;

        if pos == len / 2 {
            shared.half_flag.store(true, Ordering::Release);
        }
        if pos == len {
            shared.full_flag.store(true, Ordering::Release);
            pos = 0;
        }
        shared.write_pos.store(pos, Ordering::Relaxed);
    }

    /// Store a run of conversion results.
    pub fn push_slice(&self, samples: &[u16]) {
        for &s in samples {
            self.push(s);
        }
    }

    /// Total buffer length in samples.
    pub fn len(&self) -> usize {
        self.shared.samples.len()
    }

    /// Returns `true` for a zero-length buffer (never constructed by the
    /// driver).
    pub fn is_empty(&self) -> bool {
        self.shared.samples.is_empty()
    }

    fn arm(&self) {
        self.shared.write_pos.store(0, Ordering::Relaxed);
        self.shared.half_flag.store(false, Ordering::Relaxed);
        self.shared.full_flag.store(false, Ordering::Relaxed);
        self.shared.armed.store(true, Ordering::Release);
    }

    fn disarm(&self) {
        self.shared.armed.store(false, Ordering::Release);
        self.shared.half_flag.store(false, Ordering::Relaxed);
        self.shared.full_flag.store(false, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Timer-triggered analog converter feeding a [`DmaChannel`].
///
/// Implementations push two conversions per timer tick (the dual converters
/// sample the same input simultaneously).
pub trait Converter {
    /// Start the timer at `rate_hz` and begin transferring into `dma`.
    fn arm(&mut self, input: u8, rate_hz: u32, dma: DmaChannel) -> Result<(), CaptureError>;

    /// Stop conversions and transfers.  Must not return while a transfer
    /// into the channel can still be in progress.
    fn halt(&mut self);
}

// ---------------------------------------------------------------------------
// CaptureDriver
// ---------------------------------------------------------------------------

/// Owns the capture buffer and the converter that fills it.
pub struct CaptureDriver {
    input: u8,
    converter: Box<dyn Converter>,
    dma: DmaChannel,
    running: bool,
    /// Copy of the most recently taken half.
    scratch: Vec<u16>,
}

impl CaptureDriver {
    /// Create a driver for analog `input` with a `buffer_len` sample buffer.
    ///
    /// # Errors
    ///
    /// [`CaptureError::BufferLength`] unless `buffer_len` splits into two
    /// halves of whole sample pairs.
    pub fn new(
        input: u8,
        buffer_len: usize,
        converter: Box<dyn Converter>,
    ) -> Result<Self, CaptureError> {
        if buffer_len == 0 || buffer_len % 4 != 0 {
            return Err(CaptureError::BufferLength(buffer_len));
        }
        Ok(Self {
            input,
            converter,
            dma: DmaChannel::new(buffer_len),
            running: false,
            scratch: Vec::with_capacity(buffer_len / 2),
        })
    }

    /// Arm the buffer and start the converter at `rate_hz`.
    ///
    /// Restarting an already running driver first stops it.
    pub fn start(&mut self, rate_hz: u32) -> Result<(), CaptureError> {
        if rate_hz == 0 {
            return Err(CaptureError::ZeroRate);
        }
        if self.running {
            self.stop();
        }

        self.dma.arm();
        if let Err(e) = self.converter.arm(self.input, rate_hz, self.dma.clone()) {
            self.dma.disarm();
            return Err(e);
        }

        log::debug!(
            "capture: started on input {} at {rate_hz} Hz ({} samples)",
            self.input,
            self.dma.len()
        );
        self.running = true;
        Ok(())
    }

    /// Halt conversions.  No sample is written after this returns.  Calling
    /// it on a stopped driver does nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.dma.disarm();
        self.converter.halt();
        self.running = false;
        log::debug!("capture: stopped");
    }

    /// `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Report and clear one pending completion flag, first half before
    /// second.  Never blocks.
    pub fn poll(&mut self) -> Option<BufferHalf> {
        if !self.running {
            return None;
        }
        let shared = &*self.dma.shared;
        if shared.half_flag.swap(false, Ordering::AcqRel) {
            return Some(BufferHalf::First);
        }
        if shared.full_flag.swap(false, Ordering::AcqRel) {
            return Some(BufferHalf::Second);
        }
        None
    }

    /// Copy out the given half of the capture buffer.
    pub fn half(&mut self, half: BufferHalf) -> &[u16] {
        let shared = &*self.dma.shared;
        let mid = shared.samples.len() / 2;
        let range = match half {
            BufferHalf::First => 0..mid,
            BufferHalf::Second => mid..shared.samples.len(),
        };

        self.scratch.clear();
        self.scratch
            .extend(shared.samples[range].iter().map(|s| s.load(Ordering::Relaxed)));
        &self.scratch
    }

    /// Capture buffer length in samples.
    pub fn buffer_len(&self) -> usize {
        self.dma.len()
    }
}

impl Drop for CaptureDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
