//! Transport seam to the remote ring-buffer server.
//!
//! [`Transport`] is the collaborator boundary: everything above it (the
//! connection manager, the sample sink, the event waiter) is written
//! against this trait, and tests drive those layers with in-memory
//! implementations. [`tcp::TcpTransport`] is the production
//! implementation.

use std::time::Duration;

use thiserror::Error;

use crate::proto::wire::{Status, WireError};
use crate::proto::{Counts, DataType, Header, RawEvent, SampleRow};

pub mod tcp;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed or foreign bytes on the wire.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The server rejected the request.
    #[error("server rejected request: {0:?}")]
    Rejected(Status),
    /// The server reports no header where one is required.
    #[error("server has no header")]
    MissingHeader,
}

/// Blocking session with a ring-buffer server.
///
/// Handles are single-owner: every operation takes `&mut self`, and a
/// handle must not be shared between a publish loop and a wait loop
/// without external serialization.
pub trait Transport {
    /// Declares the stream header on the server.
    fn put_header(
        &mut self,
        channels: u32,
        sample_rate: f32,
        data_type: DataType,
    ) -> Result<(), TransportError>;

    /// Reads back the header, or `None` if the server has none yet.
    fn get_header(&mut self) -> Result<Option<Header>, TransportError>;

    /// Appends sample rows to the stream.
    fn put_samples(&mut self, rows: &[SampleRow]) -> Result<(), TransportError>;

    /// Appends one event; the server assigns its sequence index.
    fn put_event(&mut self, kind: &str, value: &[u8]) -> Result<(), TransportError>;

    /// Fetches events in the inclusive sequence range `[begin, end]`,
    /// in ascending order.
    fn get_events(&mut self, begin: u64, end: u64) -> Result<Vec<RawEvent>, TransportError>;

    /// Blocks until a running total exceeds its threshold (`None` =
    /// ignore that counter) or the timeout elapses, then reports the
    /// totals.
    fn wait(
        &mut self,
        samples: Option<u64>,
        events: Option<u64>,
        timeout: Duration,
    ) -> Result<Counts, TransportError>;

    /// Tears down the session. Best-effort; the handle is unusable after.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}
