//! Connection manager: handshake, retry policy, cancellation.
//!
//! Establishing a session is a two-step handshake: declare the stream
//! header, then poll the read-back until the server returns a valid
//! header. A transport failure during the declare step is fatal; during
//! the read-back it is treated like a missing header and retried (the
//! transport is re-dialed on the next attempt). The retry loop runs
//! forever by default but honors a deadline and a cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::config::{ServerAddr, CHANNEL_COUNT};
use crate::event::Predicate;
use crate::proto::{DataType, Header, SampleRow};
use crate::trace::{debug, info, warn};
use crate::transport::tcp::TcpTransport;
use crate::transport::{Transport, TransportError};
use crate::wait::{self, WaitOutcome};

/// Backoff between header read-back attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Cooperative cancellation flag, checked between blocking slices.
///
/// Clone the token and hand one copy to the blocked routine; calling
/// [`cancel`](Self::cancel) on any copy stops the wait at its next check.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Errors during connection establishment.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The declare step failed at the transport level.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The cancellation token was triggered.
    #[error("establish cancelled")]
    Cancelled,
    /// The deadline expired before a valid header was observed.
    #[error("deadline expired before a valid header")]
    DeadlineExpired,
}

/// Builder for establishing a [`Connection`].
#[derive(Debug, Clone)]
pub struct Connector {
    channels: u32,
    data_type: DataType,
    retry_backoff: Duration,
    deadline: Timeout,
    cancel: CancelToken,
}

impl Connector {
    /// Creates a connector declaring the given channel count.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero.
    #[must_use]
    pub fn new(channels: u32) -> Self {
        assert!(channels > 0, "channels must be > 0");
        Self {
            channels,
            data_type: DataType::Float64,
            retry_backoff: RETRY_BACKOFF,
            deadline: Timeout::Infinite,
            cancel: CancelToken::new(),
        }
    }

    /// Builder-style setter for the sample element type.
    #[must_use]
    pub const fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Builder-style setter for the read-back retry backoff.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Builder-style setter for the establish deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Timeout) -> Self {
        self.deadline = deadline;
        self
    }

    /// Builder-style setter for the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Establishes a TCP connection to `addr`.
    ///
    /// # Errors
    ///
    /// See [`establish_with`](Self::establish_with).
    pub fn establish(
        &self,
        addr: &ServerAddr,
        sample_rate: f32,
    ) -> Result<Connection<TcpTransport>, ConnectError> {
        self.establish_with(sample_rate, || TcpTransport::connect(addr))
    }

    /// Establishes a connection over transports produced by `dial`.
    ///
    /// Declares the header on a fresh transport, then polls the read-back
    /// with the configured backoff until a valid header appears. A failed
    /// read-back discards the transport and re-dials; a failed re-dial is
    /// retried on the next attempt.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Transport`] if the initial dial or the header
    ///   declaration fails.
    /// - [`ConnectError::Cancelled`] if the token is triggered.
    /// - [`ConnectError::DeadlineExpired`] if the deadline passes without
    ///   a valid header.
    pub fn establish_with<T, D>(
        &self,
        sample_rate: f32,
        mut dial: D,
    ) -> Result<Connection<T>, ConnectError>
    where
        T: Transport,
        D: FnMut() -> Result<T, TransportError>,
    {
        let deadline = match self.deadline {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };

        let mut first = dial()?;
        first.put_header(self.channels, sample_rate, self.data_type)?;
        let mut transport = Some(first);

        loop {
            if self.cancel.is_cancelled() {
                if let Some(mut t) = transport.take() {
                    let _ = t.disconnect();
                }
                return Err(ConnectError::Cancelled);
            }

            if let Some(mut t) = transport.take() {
                match t.get_header() {
                    Ok(Some(header)) => {
                        info!(
                            channels = header.channels,
                            sample_rate = header.sample_rate,
                            "connection established"
                        );
                        return Ok(Connection {
                            transport: t,
                            header,
                        });
                    }
                    Ok(None) => {
                        debug!("header not ready, retrying");
                        transport = Some(t);
                    }
                    Err(_e) => {
                        warn!(error = %_e, "header read-back failed, re-dialing");
                        let _ = t.disconnect();
                    }
                }
            }

            self.sleep_backoff(deadline)?;

            if transport.is_none() {
                match dial() {
                    Ok(t) => transport = Some(t),
                    Err(_e) => {
                        warn!(error = %_e, "re-dial failed, retrying");
                    }
                }
            }
        }
    }

    /// Sleeps one backoff interval, bounded by the deadline.
    fn sleep_backoff(&self, deadline: Option<Instant>) -> Result<(), ConnectError> {
        let nap = match deadline {
            None => self.retry_backoff,
            Some(dl) => {
                let remaining = dl
                    .checked_duration_since(Instant::now())
                    .ok_or(ConnectError::DeadlineExpired)?;
                if remaining.is_zero() {
                    return Err(ConnectError::DeadlineExpired);
                }
                remaining.min(self.retry_backoff)
            }
        };
        std::thread::sleep(nap);
        Ok(())
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(CHANNEL_COUNT)
    }
}

/// A live session with a valid header.
///
/// Created by [`Connector::establish`]; invalid handles cannot exist,
/// since construction requires the header read-back to have succeeded.
pub struct Connection<T: Transport> {
    transport: T,
    header: Header,
}

impl<T: Transport> Connection<T> {
    /// The header observed at establish time.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Direct access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Appends sample rows to the stream.
    ///
    /// # Errors
    ///
    /// Propagates transport failures; there is no retry wrapper at this
    /// layer.
    pub fn put_samples(&mut self, rows: &[SampleRow]) -> Result<(), TransportError> {
        self.transport.put_samples(rows)
    }

    /// Appends one event with a JSON-encoded value.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub fn put_event(&mut self, kind: &str, value: &serde_json::Value) -> Result<(), TransportError> {
        self.transport.put_event(kind, value.to_string().as_bytes())
    }

    /// The server's current total event count.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingHeader`] if the server lost its
    /// header (a server-side reset after establish).
    pub fn event_count(&mut self) -> Result<u64, TransportError> {
        let header = self
            .transport
            .get_header()?
            .ok_or(TransportError::MissingHeader)?;
        Ok(header.event_count)
    }

    /// Blocks until an event matching `predicate` arrives, the stream
    /// delivers an error diagnostic, or `timeout` elapses. See
    /// [`wait::wait_for_event`].
    ///
    /// # Errors
    ///
    /// Propagates transport failures. Timeout, buffer flush, and overrun
    /// are not errors.
    pub fn wait_for_event(
        &mut self,
        cursor: Option<u64>,
        predicate: &Predicate,
        timeout: Duration,
    ) -> Result<WaitOutcome, TransportError> {
        wait::wait_for_event(&mut self.transport, cursor, predicate, timeout)
    }

    /// Tears down the session.
    ///
    /// # Errors
    ///
    /// Propagates transport failures from the shutdown.
    pub fn disconnect(mut self) -> Result<(), TransportError> {
        self.transport.disconnect()
    }
}
