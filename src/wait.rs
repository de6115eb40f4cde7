//! Polling wait loop for events.
//!
//! The waiter tracks a cursor over the server's monotonically increasing
//! event total and scans new arrivals against a predicate. Three stream
//! anomalies are absorbed rather than raised: a server-side flush (the
//! reported total drops below the cursor) clamps the cursor back, a
//! backlog overrun skips the cursor forward to the newest window, and a
//! peer's error diagnostic short-circuits the scan with its message.

use std::time::Duration;

use minstant::Instant;

use crate::event::{Event, Predicate, SignalEvent};
use crate::trace::{debug, warn};
use crate::transport::{Transport, TransportError};

/// Upper bound on one blocking wait slice; keeps the loop responsive to
/// its own deadline regardless of server-side blocking.
pub const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Maximum backlog consumed after falling behind. Older events are
/// dropped and counted as skipped.
pub const BACKLOG_WINDOW: u64 = 100;

/// Result of one wait call.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome {
    /// The first matching event, or `None` on timeout or diagnostic.
    pub event: Option<SignalEvent>,
    /// Cursor to pass to the next call; counts every consumed event,
    /// matching or not.
    pub cursor: u64,
    /// Error diagnostic from a peer producer, if one arrived before a
    /// match. Takes precedence over any later match.
    pub diagnostic: Option<String>,
}

/// Blocks until an event matching `predicate` arrives, a peer posts an
/// error diagnostic, or `timeout` elapses.
///
/// A `cursor` of `None` starts at the server's current event total, so
/// only events posted after this call can match. Events between the
/// cursor and a match are consumed without matching; the returned cursor
/// always points past the last consumed event, never backwards.
///
/// # Errors
///
/// - [`TransportError::MissingHeader`] if `cursor` is `None` and the
///   server has no header to read the total from.
/// - Any transport failure from the underlying polls.
pub fn wait_for_event<T: Transport>(
    transport: &mut T,
    cursor: Option<u64>,
    predicate: &Predicate,
    timeout: Duration,
) -> Result<WaitOutcome, TransportError> {
    let mut cursor = match cursor {
        Some(c) => c,
        None => {
            transport
                .get_header()?
                .ok_or(TransportError::MissingHeader)?
                .event_count
        }
    };

    let start = Instant::now();
    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            debug!(cursor, "wait timed out without a match");
            return Ok(WaitOutcome {
                event: None,
                cursor,
                diagnostic: None,
            });
        }

        let counts = transport.wait(None, Some(cursor), remaining.min(WAIT_SLICE))?;
        let reported = counts.events;

        if reported < cursor {
            // Server-side flush; resume at the newest event.
            warn!(cursor, reported, "event total dropped, clamping cursor");
            cursor = reported.saturating_sub(1);
            continue;
        }

        if reported - cursor >= BACKLOG_WINDOW {
            let _skipped = reported - cursor - BACKLOG_WINDOW;
            warn!(skipped = _skipped, "fell behind, skipping to newest window");
            cursor = reported - BACKLOG_WINDOW;
        }

        if reported == cursor {
            continue;
        }

        for raw in transport.get_events(cursor, reported - 1)? {
            cursor += 1;
            match Event::classify(raw) {
                Event::Diagnostic(diag) => {
                    warn!(seq = diag.seq, message = %diag.message, "peer reported an error");
                    return Ok(WaitOutcome {
                        event: None,
                        cursor,
                        diagnostic: Some(diag.message),
                    });
                }
                Event::Signal(event) => {
                    if predicate.matches(&event) {
                        return Ok(WaitOutcome {
                            event: Some(event),
                            cursor,
                            diagnostic: None,
                        });
                    }
                }
            }
        }
    }
}
