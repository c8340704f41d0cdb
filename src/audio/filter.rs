//! Cascaded second-order IIR ("biquad") filter.
//!
//! [`BiquadCascade`] runs an input sample through an ordered list of
//! [`SecondOrderSection`]s, each realised in Direct Form II so feedback and
//! feed-forward paths share one two-element delay line.
//!
//! # Example
//!
//! ```rust
//! use acoustic_node::audio::{BiquadCascade, SecondOrderSection};
//!
//! // Single pass-through section: b0 = 1, everything else 0.
//! let section = SecondOrderSection::new([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
//! let mut filter = BiquadCascade::new(vec![section], 1.0);
//! assert_eq!(filter.filter(0.25), 0.25);
//! ```

// ---------------------------------------------------------------------------
// SecondOrderSection
// ---------------------------------------------------------------------------

/// Coefficients of one second-order section, laid out as
/// `(b0, b1, b2, 1, a1, a2)`.
///
/// The fourth coefficient is the normalised `a0` and is never read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderSection {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl SecondOrderSection {
    /// Build a section from the six-coefficient row `(b0, b1, b2, 1, a1, a2)`.
    pub const fn new(row: [f32; 6]) -> Self {
        Self {
            b0: row[0],
            b1: row[1],
            b2: row[2],
            a1: row[4],
            a2: row[5],
        }
    }
}

// ---------------------------------------------------------------------------
// BiquadCascade
// ---------------------------------------------------------------------------

/// A stateful cascade of Direct-Form-II biquad sections.
///
/// State (`z`) is zeroed on construction and only ever mutated by
/// [`filter`](Self::filter).  Two instances built from the same sections and
/// fed the same input produce bit-identical output.
#[derive(Debug, Clone)]
pub struct BiquadCascade {
    sections: Vec<SecondOrderSection>,
    /// Input gain applied before the first section.
    gain: f32,
    /// Per-section delay line `[z0, z1]`.
    z: Vec<[f32; 2]>,
}

impl BiquadCascade {
    /// Create a cascade from `sections` (processed in order) and an input
    /// `gain`.
    pub fn new(sections: Vec<SecondOrderSection>, gain: f32) -> Self {
        let z = vec![[0.0; 2]; sections.len()];
        Self { sections, gain, z }
    }

    /// Consume one input sample and return one output sample.
    pub fn filter(&mut self, x: f32) -> f32 {
        let mut y = self.gain * x;

        for (s, z) in self.sections.iter().zip(self.z.iter_mut()) {
            // feedback
            y -= s.a1 * z[0];
            y -= s.a2 * z[1];

            let v = y;

            // feed-forward
            y *= s.b0;
            y += s.b1 * z[0];
            y += s.b2 * z[1];

            z[1] = z[0];
            z[0] = v;
        }

        y
    }

    /// Number of second-order sections in the cascade.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns `true` for a cascade with no sections (gain only).
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
