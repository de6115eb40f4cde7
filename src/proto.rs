//! Wire-level types shared by the client and the codec.
//!
//! The server stores one stream: a header describing the sample shape,
//! a bounded history of sample rows, and a bounded history of events with
//! server-assigned, strictly increasing sequence indices.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod wire;

/// Sample element type declared in the header.
///
/// Wire codes follow the server's numeric type table; this client only
/// ever transmits `Float64` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit IEEE float, wire code 9.
    Float32,
    /// 64-bit IEEE float, wire code 10.
    Float64,
}

impl DataType {
    /// Returns the numeric wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Float32 => 9,
            Self::Float64 => 10,
        }
    }

    /// Looks up a type by wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            9 => Some(Self::Float32),
            10 => Some(Self::Float64),
            _ => None,
        }
    }

    /// Size of one sample element in bytes.
    #[must_use]
    pub const fn sample_size(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
        }
    }
}

/// Server-declared stream metadata, read back after the handshake.
///
/// `sample_count` and `event_count` are the server's running totals at the
/// time of the read; the shape fields are written once and read-only for
/// this client's purposes afterward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Values per sample row.
    pub channels: u32,
    /// Nominal sampling rate in Hz.
    pub sample_rate: f32,
    /// Element type of sample values.
    pub data_type: DataType,
    /// Total sample rows the server has accepted.
    pub sample_count: u64,
    /// Total events the server has accepted.
    pub event_count: u64,
}

/// One time-sampled observation: a fixed-width numeric vector with one
/// value per channel. Constructed per tick, transmitted, discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow(Vec<f64>);

impl SampleRow {
    /// Creates a row of zeros for the given channel count.
    #[must_use]
    pub fn zeroed(channels: usize) -> Self {
        Self(vec![0.0; channels])
    }

    /// Sets one channel's value.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is out of range for this row.
    pub fn set(&mut self, channel: usize, value: f64) {
        self.0[channel] = value;
    }

    /// Returns the channel values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Number of channels in this row.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f64>> for SampleRow {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[f64; N]> for SampleRow {
    fn from(values: [f64; N]) -> Self {
        Self(values.to_vec())
    }
}

/// An event as stored by the server: kind string, opaque value bytes, and
/// the server-assigned sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Server-assigned sequence index (strictly increasing).
    pub seq: u64,
    /// Event kind.
    pub kind: String,
    /// Opaque payload, conventionally JSON-encoded.
    pub value: Vec<u8>,
}

/// Running totals reported by the server's wait primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Total sample rows accepted so far.
    pub samples: u64,
    /// Total events accepted so far.
    pub events: u64,
}
