//! Retrying, backpressure-aware streaming of ring slots.
//!
//! [`StreamingTransport`] owns the collector connection.  Each control-loop
//! pass calls [`service`](StreamingTransport::service) once; it issues at
//! most one non-blocking write of the unsent part of one slot and classifies
//! the result:
//!
//! ```text
//! Complete    → confirm slot, good += 1, clear retry timer
//! Partial(n)  → keep offset, would_block += 1, retry after `retry_ms`
//! WouldBlock  → would_block += 1, retry after `retry_ms`, keep slot
//! anything else → Fatal (caller tears the session down)
//! ```
//!
//! A partially accepted write is congestion, not failure: the next pass
//! resumes from the first unsent byte.  The same holds for the stream
//! header, whose unsent tail goes out before any slot.
//!
//! Capture is never blocked by a slow link; the retry timer keeps the loop
//! from hammering a saturated socket.

use std::io;

use thiserror::Error;

use super::ring::TransmitRing;
use super::session::SessionCounters;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Connection-level failures.  Any of these ends the streaming session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    #[error("connection is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Network abstraction
// ---------------------------------------------------------------------------

/// An open byte-stream connection in non-blocking mode.
pub trait Connection {
    /// Attempt to write `bytes` without blocking.  A saturated link reports
    /// `io::ErrorKind::WouldBlock`.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Close the connection.  Further writes fail.
    fn close(&mut self);
}

/// Opens connections to the collector.
pub trait NetworkStack {
    fn connect(&mut self, host: &str, port: u16) -> Result<Box<dyn Connection>, TransportError>;
}

// ---------------------------------------------------------------------------
// WriteOutcome
// ---------------------------------------------------------------------------

/// Classification of one non-blocking write.
#[derive(Debug)]
pub enum WriteOutcome {
    Complete,
    /// Only the first `n` bytes were accepted.
    Partial(usize),
    WouldBlock,
    Fatal(TransportError),
}

impl WriteOutcome {
    /// Classify the result of writing `expected` bytes.
    pub fn classify(result: io::Result<usize>, expected: usize) -> Self {
        match result {
            Ok(n) if n >= expected => WriteOutcome::Complete,
            Ok(0) => WriteOutcome::Fatal(TransportError::Io(io::ErrorKind::WriteZero.into())),
            Ok(n) => WriteOutcome::Partial(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => WriteOutcome::WouldBlock,
            Err(e) => WriteOutcome::Fatal(TransportError::Io(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// SendOutcome
// ---------------------------------------------------------------------------

/// What one [`StreamingTransport::service`] call did.
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing to send, or the retry timer has not elapsed.
    Idle,
    /// One slot was delivered.
    Sent,
    /// The link is saturated; the slot, or what is left of it, stays queued.
    WouldBlock,
    /// The connection is broken.
    Fatal(TransportError),
}

// ---------------------------------------------------------------------------
// StreamingTransport
// ---------------------------------------------------------------------------

/// Collector connection plus retry timer.
pub struct StreamingTransport {
    conn: Option<Box<dyn Connection>>,
    /// Header bytes the link has not accepted yet.
    preamble: Vec<u8>,
    retry_ms: u64,
    retry_at: Option<u64>,
}

impl StreamingTransport {
    /// Connect to `host:port` and send the stream `header`.
    ///
    /// If the link takes only part of the header, the rest is sent by
    /// [`service`](Self::service) ahead of the first slot.
    ///
    /// # Errors
    ///
    /// Propagates connection failures and fatal write errors.
    pub fn open(
        network: &mut dyn NetworkStack,
        host: &str,
        port: u16,
        header: &[u8],
        retry_ms: u64,
    ) -> Result<Self, TransportError> {
        let mut conn = network.connect(host, port)?;

        let preamble = match WriteOutcome::classify(conn.write(header), header.len()) {
            WriteOutcome::Complete => {
                log::debug!("stream: header sent ({} bytes)", header.len());
                Vec::new()
            }
            WriteOutcome::Partial(n) => header[n..].to_vec(),
            WriteOutcome::WouldBlock => header.to_vec(),
            WriteOutcome::Fatal(e) => {
                conn.close();
                return Err(e);
            }
        };
        if !preamble.is_empty() {
            log::debug!("stream: {} header bytes deferred", preamble.len());
        }

        Ok(Self {
            conn: Some(conn),
            preamble,
            retry_ms,
            retry_at: None,
        })
    }

    /// Attempt to deliver the oldest pending slot.
    ///
    /// Issues at most one write.  Skipped when the ring is empty or the
    /// retry timer is still running.  A deferred header tail takes the pass
    /// instead of a slot until it is gone.
    pub fn service(
        &mut self,
        ring: &mut TransmitRing,
        counters: &mut SessionCounters,
        now_ms: u64,
    ) -> SendOutcome {
        if let Some(at) = self.retry_at {
            if now_ms < at {
                return SendOutcome::Idle;
            }
        }

        let Some(slot) = ring.pending() else {
            return SendOutcome::Idle;
        };

        let Some(conn) = self.conn.as_mut() else {
            return SendOutcome::Fatal(TransportError::Closed);
        };

        if !self.preamble.is_empty() {
            return match WriteOutcome::classify(conn.write(&self.preamble), self.preamble.len()) {
                WriteOutcome::Complete => {
                    log::debug!("stream: header sent");
                    self.preamble.clear();
                    self.retry_at = None;
                    SendOutcome::Idle
                }
                WriteOutcome::Partial(n) => {
                    self.preamble.drain(..n);
                    self.congested(counters, now_ms)
                }
                WriteOutcome::WouldBlock => self.congested(counters, now_ms),
                WriteOutcome::Fatal(e) => SendOutcome::Fatal(e),
            };
        }

        log::trace!(
            "stream: sending slot {} (fill {})",
            ring.drain_index(),
            ring.fill_index()
        );

        match WriteOutcome::classify(conn.write(slot), slot.len()) {
            WriteOutcome::Complete => {
                ring.confirm_sent();
                counters.good += 1;
                self.retry_at = None;
                SendOutcome::Sent
            }
            WriteOutcome::Partial(n) => {
                log::trace!("stream: {n} of {} bytes accepted", slot.len());
                ring.record_sent(n);
                self.congested(counters, now_ms)
            }
            WriteOutcome::WouldBlock => self.congested(counters, now_ms),
            WriteOutcome::Fatal(e) => SendOutcome::Fatal(e),
        }
    }

    fn congested(&mut self, counters: &mut SessionCounters, now_ms: u64) -> SendOutcome {
        counters.would_block += 1;
        self.retry_at = Some(now_ms + self.retry_ms);
        log::debug!("stream: link saturated, retry in {} ms", self.retry_ms);
        SendOutcome::WouldBlock
    }

    /// `true` until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Close the connection.  Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// send_status
// ---------------------------------------------------------------------------

/// Deliver `message` on a short-lived connection of its own.
pub fn send_status(
    network: &mut dyn NetworkStack,
    host: &str,
    port: u16,
    message: &[u8],
) -> Result<(), TransportError> {
    let mut conn = network.connect(host, port)?;
    let outcome = WriteOutcome::classify(conn.write(message), message.len());
    conn.close();

    match outcome {
        WriteOutcome::Complete => Ok(()),
        WriteOutcome::Partial(n) => Err(TransportError::ShortWrite {
            written: n,
            expected: message.len(),
        }),
        WriteOutcome::WouldBlock => Err(TransportError::ShortWrite {
            written: 0,
            expected: message.len(),
        }),
        WriteOutcome::Fatal(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
