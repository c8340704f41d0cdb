//! 8-bit logarithmic (A-law) sample compression.
//!
//! Samples are 16-bit signed; the codec works on a 13-bit signed domain, so
//! the magnitude is shifted down by three bits before segment lookup.  Codes
//! carry the sign in bit 7 (set for negative input) and are XOR-ed with
//! `0x55` for on-wire transmission, like G.711.

const MAGNITUDE_MAX: u16 = 0x0FFF;
const EVEN_BIT_TOGGLE: u8 = 0x55;
const SIGN_BIT: u8 = 0x80;

/// Encode one 16-bit sample into an 8-bit A-law code.
///
/// ```rust
/// use acoustic_node::audio::compress;
///
/// let pos = compress::encode(1_000);
/// let neg = compress::encode(-1_000);
/// assert_eq!((pos as u8) ^ (neg as u8), 0x80);
/// ```
pub fn encode(sample: i16) -> i8 {
    let sign = if sample < 0 { SIGN_BIT } else { 0 };
    let magnitude = (sample.unsigned_abs() >> 3).min(MAGNITUDE_MAX);

    // Locate the leading one between bit 11 and bit 5; below that the
    // value sits in segment 0.
    let mut position: u8 = 11;
    let mut mask: u16 = 0x800;
    while magnitude & mask != mask && position >= 5 {
        mask >>= 1;
        position -= 1;
    }

    let shift = if position == 4 { 1 } else { position - 4 };
    let mantissa = ((magnitude >> shift) & 0x0F) as u8;
    let segment = (position - 4) << 4;

    ((sign | segment | mantissa) ^ EVEN_BIT_TOGGLE) as i8
}

/// Decode an A-law code back to a 16-bit sample at the centre of its
/// quantisation interval.
pub fn decode(code: i8) -> i16 {
    let code = (code as u8) ^ EVEN_BIT_TOGGLE;
    let mantissa = i32::from(code & 0x0F);
    let segment = u32::from((code & 0x70) >> 4);

    let magnitude = match segment {
        0 => (mantissa << 1) + 1,
        s => ((mantissa << 1) + 33) << (s - 1),
    };

    let value = magnitude << 3;
    if code & SIGN_BIT != 0 {
        -value as i16
    } else {
        value as i16
    }
}

/// Largest `|decode(encode(x)) - x|` the scheme allows for `x`.
///
/// Half a quantisation step (at most `|x| / 32`, at least one 13-bit LSB)
/// plus the three bits dropped when narrowing to the codec domain.
pub fn max_error(sample: i16) -> u32 {
    let magnitude = u32::from(sample.unsigned_abs());
    (magnitude / 32).max(8) + 8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
