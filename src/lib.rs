//! # ringlink — client engine for a ring-buffer sample/event server
//!
//! A synchronous, blocking client for a remote ring-buffer server that
//! accepts header/data/event writes and serves bounded-history reads. One
//! producer streams fixed-shape sample rows at a target rate; any producer
//! may inject events, and consumers block until an event matching a
//! (kind, optional value) predicate arrives.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringlink::{Connector, Predicate, SampleRow, ServerAddr};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = ServerAddr::parse("buffer://localhost:1972")?;
//!     let mut conn = Connector::new(2).establish(&addr, 50.0)?;
//!
//!     // Push one sample row (one value per channel).
//!     conn.put_samples(&[SampleRow::from([0.25, 0.0])])?;
//!
//!     // Block until a matching event arrives (or the budget elapses).
//!     let outcome =
//!         conn.wait_for_event(None, &Predicate::new("trial_start"), Duration::from_secs(5))?;
//!     if let Some(event) = outcome.event {
//!         println!("matched event #{}", event.seq);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  stream: acquisition loop (device -> sink -> pacer)          |
//! +--------------------------------------------------------------+
//! |  connect: handshake/retry     publish: paced     wait: event |
//! |  lifecycle                    transmission       matching    |
//! +--------------------------------------------------------------+
//! |  transport: Transport trait + blocking TCP implementation    |
//! +--------------------------------------------------------------+
//! |  proto: header/data/event wire types and codec               |
//! +--------------------------------------------------------------+
//! ```
//!
//! The model is single-threaded and fully blocking: the only suspension
//! points are the server's bounded wait primitive and the pacer's
//! converging sleep. Connection handles are single-owner (`&mut self`
//! everywhere); callers that share one connection between a publish loop
//! and a wait loop must serialize access themselves.

/// Server address and stream configuration.
pub mod config;
/// Connection manager: handshake, retry policy, cancellation.
pub mod connect;
/// Device-side seam: sample sources and the force simulator.
pub mod device;
/// Tagged event model, value decoding, and wait predicates.
pub mod event;
/// Wire-level types and the request/response codec.
pub mod proto;
/// Sample sink and tick pacing.
pub mod publish;
/// Acquisition loop tying a sample source to a sink.
pub mod stream;
/// Tracing infrastructure (no-op unless the `tracing` feature is enabled).
pub mod trace;
/// Transport seam to the remote server.
pub mod transport;
/// Event wait loop: cursor tracking, flush/overrun recovery, matching.
pub mod wait;

pub use config::{ConfigError, ServerAddr, StreamConfig};
pub use connect::{CancelToken, ConnectError, Connection, Connector, Timeout};
pub use device::{DeviceError, SampleSource, Simulator};
pub use event::{
    DiagnosticEvent, Event, EventValue, Predicate, SignalEvent, ERROR_EVENT_PREFIX,
};
pub use proto::{Counts, DataType, Header, RawEvent, SampleRow};
pub use publish::{Pacer, SampleSink};
pub use stream::{run_stream, StreamError};
pub use transport::tcp::TcpTransport;
pub use transport::{Transport, TransportError};
pub use wait::{wait_for_event, WaitOutcome};
