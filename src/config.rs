//! Server address and stream configuration.
//!
//! The process-level surface (argument parsing, console output) stays
//! outside this crate; these types are the plain values it hands in.

use std::fmt;

use thiserror::Error;

/// Default server port.
pub const DEFAULT_PORT: u16 = 1972;

/// Number of channels in a sample row. The wire format supports any
/// channel count; this client always declares and transmits two.
pub const CHANNEL_COUNT: u32 = 2;

/// Errors from parsing or validating configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Server address has no `:port` suffix.
    #[error("missing ':port' in server address")]
    MissingPort,
    /// Port is not a valid u16.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// Host part is empty.
    #[error("empty host in server address")]
    EmptyHost,
    /// Sample rate must be positive and finite.
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
    /// Active channel count outside the supported range.
    #[error("active channels must be 1..={CHANNEL_COUNT}, got {0}")]
    InvalidChannelCount(usize),
}

/// A server address (host + port), parsed from a `scheme://host:port` URL.
///
/// The scheme is informational and ignored; only `host:port` matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    host: String,
    port: u16,
}

impl ServerAddr {
    /// Creates an address from host and port directly.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a localhost address on the given port.
    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new("localhost", port)
    }

    /// Parses `scheme://host:port` (or bare `host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the port is missing or invalid, or the
    /// host is empty.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let rest = match url.split_once("://") {
            Some((_scheme, rest)) => rest,
            None => url,
        };
        let (host, port) = rest.rsplit_once(':').ok_or(ConfigError::MissingPort)?;
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        Ok(Self::new(host, port))
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for one acquisition stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Address of the ring-buffer server.
    pub server: ServerAddr,
    /// Identifier of the serial device supplying readings.
    pub device: String,
    /// Target sampling rate in Hz.
    pub sample_rate: f64,
    /// Substitute simulated force levels for device readings.
    pub simulation: bool,
    /// Channels actually read from the device (remaining channels are
    /// transmitted as 0.0).
    pub active_channels: usize,
}

impl StreamConfig {
    /// Creates a configuration with the default device, rate, and flags.
    #[must_use]
    pub fn new(server: ServerAddr) -> Self {
        Self {
            server,
            device: "COM5".to_string(),
            sample_rate: 50.0,
            simulation: false,
            active_channels: 1,
        }
    }

    /// Builder-style setter for the device identifier.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Builder-style setter for the sampling rate.
    #[must_use]
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Builder-style setter for the simulation flag.
    #[must_use]
    pub const fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    /// Builder-style setter for the active channel count.
    #[must_use]
    pub const fn with_active_channels(mut self, channels: usize) -> Self {
        self.active_channels = channels;
        self
    }

    /// Validates rate and channel count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a non-positive rate or a channel count
    /// outside `1..=CHANNEL_COUNT`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.active_channels == 0 || self.active_channels > CHANNEL_COUNT as usize {
            return Err(ConfigError::InvalidChannelCount(self.active_channels));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(ServerAddr::localhost(DEFAULT_PORT))
    }
}
