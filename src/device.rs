//! Sample sources: the acquisition-device seam and its simulator.
//!
//! Hardware readings arrive as text lines that may carry keypress
//! characters interleaved with the numeric value; those are scrubbed out
//! and reported alongside the parsed reading. The simulator replaces the
//! device with two explicit force levels stepped by the same keys.

use thiserror::Error;

use crate::trace::debug;

/// Level change applied per keypress, in raw device units.
pub const FORCE_STEP: f64 = 50.0;

/// Upper clamp for a simulated level, in raw device units.
pub const FORCE_MAX: f64 = 800.0;

/// Errors raised by a sample source.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Device i/o failure.
    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A reading that does not parse as a number after scrubbing.
    #[error("malformed reading: {0:?}")]
    Malformed(String),
    /// A channel index outside the source's range.
    #[error("no such channel: {0}")]
    NoSuchChannel(usize),
}

/// One-sample-at-a-time acquisition seam.
pub trait SampleSource {
    /// Reads the current value of `channel`.
    fn read_channel(&mut self, channel: usize) -> Result<f64, DeviceError>;
}

/// Two-channel simulator with explicit, stepped force levels.
///
/// Levels start at zero and move in [`FORCE_STEP`] increments within
/// `[0, FORCE_MAX]` as keys are applied: `E`/`F` lower and raise channel
/// 0, `A`/`B` lower and raise channel 1. Unknown keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    levels: [f64; 2],
}

impl Simulator {
    /// Creates a simulator with both levels at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one keypress to the levels.
    pub fn apply_key(&mut self, key: char) {
        let (channel, step) = match key.to_ascii_uppercase() {
            'E' => (0, -FORCE_STEP),
            'F' => (0, FORCE_STEP),
            'A' => (1, -FORCE_STEP),
            'B' => (1, FORCE_STEP),
            _ => return,
        };
        self.levels[channel] = (self.levels[channel] + step).clamp(0.0, FORCE_MAX);
        debug!(key = %key, channel, level = self.levels[channel], "simulated level stepped");
    }

    /// The current level of `channel`, if it exists.
    #[must_use]
    pub fn level(&self, channel: usize) -> Option<f64> {
        self.levels.get(channel).copied()
    }
}

impl SampleSource for Simulator {
    fn read_channel(&mut self, channel: usize) -> Result<f64, DeviceError> {
        self.levels
            .get(channel)
            .copied()
            .ok_or(DeviceError::NoSuchChannel(channel))
    }
}

/// Splits a raw reading line into its numeric text and any interleaved
/// keypress characters (`A`–`H`, either case).
#[must_use]
pub fn scrub_reading(line: &str) -> (String, Vec<char>) {
    let mut numeric = String::with_capacity(line.len());
    let mut keys = Vec::new();
    for c in line.chars() {
        if c.is_ascii_alphabetic() && ('A'..='H').contains(&c.to_ascii_uppercase()) {
            keys.push(c);
        } else {
            numeric.push(c);
        }
    }
    (numeric, keys)
}

/// Parses one raw reading line: scrubs keypresses, parses the remainder
/// as a number, and rounds it to three decimals.
///
/// # Errors
///
/// Returns [`DeviceError::Malformed`] if the scrubbed text is not a
/// number.
pub fn parse_reading(line: &str) -> Result<(f64, Vec<char>), DeviceError> {
    let (numeric, keys) = scrub_reading(line);
    let value: f64 = numeric
        .trim()
        .parse()
        .map_err(|_| DeviceError::Malformed(line.to_string()))?;
    Ok(((value * 1000.0).round() / 1000.0, keys))
}
