//! Behavior tests for the connection manager, sample sink, and event
//! waiter, driven through an in-memory transport.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use ringlink::{
    CancelToken, ConnectError, Connection, Connector, Counts, DataType, Header, Predicate,
    RawEvent, SampleRow, SampleSink, Timeout, Transport, TransportError,
};

#[derive(Default)]
struct ServerState {
    header: Option<Header>,
    rows: Vec<SampleRow>,
    events: Vec<RawEvent>,
    /// Overrides the reported event total, for flush/overrun scenarios.
    reported_events: Option<u64>,
    /// Number of header reads to answer with "no header yet".
    header_misses: u32,
    /// Ranges requested via `get_events`, for fetch-window assertions.
    fetched: Vec<(u64, u64)>,
    /// Fail the next header declaration with an i/o error.
    fail_put_header: bool,
}

/// Shared-state in-memory server. Clones observe the same state, so a
/// test can keep a handle after moving a transport into a connection.
#[derive(Clone, Default)]
struct MemoryTransport(Arc<Mutex<ServerState>>);

impl MemoryTransport {
    fn new() -> Self {
        Self::default()
    }

    fn handle(&self) -> Self {
        self.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.0.lock().unwrap()
    }

    fn post_event(&self, kind: &str, value: &[u8]) {
        let mut state = self.state();
        let seq = state.events.len() as u64;
        state.events.push(RawEvent {
            seq,
            kind: kind.to_string(),
            value: value.to_vec(),
        });
    }

    fn set_header(&self, header: Header) {
        self.state().header = Some(header);
    }

    fn set_reported_events(&self, total: u64) {
        self.state().reported_events = Some(total);
    }

    fn set_header_misses(&self, misses: u32) {
        self.state().header_misses = misses;
    }

    fn counts(&self) -> Counts {
        let state = self.state();
        Counts {
            samples: state.rows.len() as u64,
            events: state
                .reported_events
                .unwrap_or(state.events.len() as u64),
        }
    }
}

impl Transport for MemoryTransport {
    fn put_header(
        &mut self,
        channels: u32,
        sample_rate: f32,
        data_type: DataType,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_put_header {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer closed",
            )));
        }
        state.header = Some(Header {
            channels,
            sample_rate,
            data_type,
            sample_count: 0,
            event_count: 0,
        });
        Ok(())
    }

    fn get_header(&mut self) -> Result<Option<Header>, TransportError> {
        let mut state = self.state();
        if state.header_misses > 0 {
            state.header_misses -= 1;
            return Ok(None);
        }
        let mut header = match state.header {
            Some(h) => h,
            None => return Ok(None),
        };
        header.sample_count = state.rows.len() as u64;
        header.event_count = state
            .reported_events
            .unwrap_or(state.events.len() as u64)
            .max(header.event_count);
        Ok(Some(header))
    }

    fn put_samples(&mut self, rows: &[SampleRow]) -> Result<(), TransportError> {
        self.state().rows.extend_from_slice(rows);
        Ok(())
    }

    fn put_event(&mut self, kind: &str, value: &[u8]) -> Result<(), TransportError> {
        self.post_event(kind, value);
        Ok(())
    }

    fn get_events(&mut self, begin: u64, end: u64) -> Result<Vec<RawEvent>, TransportError> {
        let mut state = self.state();
        state.fetched.push((begin, end));
        Ok(state
            .events
            .iter()
            .filter(|e| e.seq >= begin && e.seq <= end)
            .cloned()
            .collect())
    }

    fn wait(
        &mut self,
        _samples: Option<u64>,
        events: Option<u64>,
        timeout: Duration,
    ) -> Result<Counts, TransportError> {
        let counts = self.counts();
        if let Some(threshold) = events {
            if counts.events > threshold {
                return Ok(counts);
            }
        }
        std::thread::sleep(timeout);
        Ok(self.counts())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn connect(transport: &MemoryTransport) -> Connection<MemoryTransport> {
    Connector::new(2)
        .with_retry_backoff(Duration::from_millis(5))
        .establish_with(50.0, || Ok(transport.handle()))
        .expect("establish")
}

#[test]
fn establish_declares_and_reads_back() {
    let transport = MemoryTransport::new();
    let conn = connect(&transport);
    assert_eq!(conn.header().channels, 2);
    assert_eq!(conn.header().sample_rate, 50.0);
    assert_eq!(conn.header().data_type, DataType::Float64);
}

#[test]
fn establish_retries_until_header_appears() {
    let transport = MemoryTransport::new();
    transport.set_header_misses(2);
    let start = Instant::now();
    let conn = connect(&transport);
    assert_eq!(conn.header().channels, 2);
    // Two missed read-backs mean at least two backoff naps.
    assert!(start.elapsed() >= Duration::from_millis(10));
}

#[test]
fn establish_deadline_expires() {
    let transport = MemoryTransport::new();
    transport.set_header_misses(u32::MAX);
    let result = Connector::new(2)
        .with_retry_backoff(Duration::from_millis(5))
        .with_deadline(Timeout::Duration(Duration::from_millis(30)))
        .establish_with(50.0, || Ok(transport.handle()));
    assert!(matches!(result, Err(ConnectError::DeadlineExpired)));
}

#[test]
fn establish_honors_cancellation() {
    let transport = MemoryTransport::new();
    transport.set_header_misses(u32::MAX);
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = Connector::new(2)
        .with_cancel_token(cancel)
        .establish_with(50.0, || Ok(transport.handle()));
    assert!(matches!(result, Err(ConnectError::Cancelled)));
}

#[test]
fn declare_failure_is_fatal() {
    let transport = MemoryTransport::new();
    transport.state().fail_put_header = true;
    let result = Connector::new(2).establish_with(50.0, || Ok(transport.handle()));
    assert!(matches!(result, Err(ConnectError::Transport(_))));
}

#[test]
fn connection_publishes_samples_and_events() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);

    conn.put_samples(&[SampleRow::from([412.5, 0.0])]).unwrap();
    conn.put_event("press", &json!(1)).unwrap();

    assert_eq!(transport.state().rows[0].values(), &[412.5, 0.0]);
    assert_eq!(conn.event_count().unwrap(), 1);
}

#[test]
fn sink_disconnected_is_a_noop() {
    let mut sink = SampleSink::<MemoryTransport>::disconnected();
    assert!(!sink.is_connected());
    sink.publish(&SampleRow::from([1.0, 2.0])).unwrap();
    sink.publish_event("press", &json!(1)).unwrap();
}

#[test]
fn sink_publishes_through_connection() {
    let transport = MemoryTransport::new();
    let mut sink = SampleSink::connected(connect(&transport));
    assert!(sink.is_connected());

    sink.publish(&SampleRow::from([50.0, 0.0])).unwrap();
    sink.publish(&SampleRow::from([100.0, 0.0])).unwrap();

    let state = transport.state();
    assert_eq!(state.rows.len(), 2);
    assert_eq!(state.rows[1].values(), &[100.0, 0.0]);
}

#[test]
fn wait_matches_kind_and_value() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    transport.post_event("press", b"1");
    transport.post_event("release", b"2");
    transport.post_event("press", b"1");

    let pred = Predicate::new("press").with_value(json!(1));
    let outcome = conn
        .wait_for_event(Some(0), &pred, Duration::from_secs(1))
        .unwrap();

    let event = outcome.event.expect("match");
    assert_eq!(event.seq, 0);
    assert_eq!(event.kind, "press");
    assert_eq!(outcome.cursor, 1);
    assert!(outcome.diagnostic.is_none());
}

#[test]
fn wait_skips_value_mismatches() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    transport.post_event("press", b"1");
    transport.post_event("release", b"2");
    transport.post_event("press", b"2");

    let pred = Predicate::new("press").with_value(json!(2));
    let outcome = conn
        .wait_for_event(Some(0), &pred, Duration::from_secs(1))
        .unwrap();

    assert_eq!(outcome.event.expect("match").seq, 2);
    assert_eq!(outcome.cursor, 3);
}

#[test]
fn cursor_carries_across_waits() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    transport.post_event("press", b"1");
    transport.post_event("release", b"2");
    transport.post_event("press", b"1");

    let pred = Predicate::new("press").with_value(json!(1));
    let first = conn
        .wait_for_event(Some(0), &pred, Duration::from_secs(1))
        .unwrap();
    assert_eq!(first.event.as_ref().expect("match").seq, 0);

    // Resuming from the returned cursor finds the later occurrence, not
    // the one already consumed.
    let second = conn
        .wait_for_event(Some(first.cursor), &pred, Duration::from_secs(1))
        .unwrap();
    assert_eq!(second.event.expect("match").seq, 2);
    assert_eq!(second.cursor, 3);
}

#[test]
fn diagnostic_takes_precedence_over_later_match() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    transport.post_event("release", b"2");
    transport.post_event("_MD_ERR.device", b"\"serial device lost\"");
    transport.post_event("press", b"1");

    let pred = Predicate::new("press").with_value(json!(1));
    let outcome = conn
        .wait_for_event(Some(0), &pred, Duration::from_secs(1))
        .unwrap();

    assert!(outcome.event.is_none());
    assert_eq!(outcome.diagnostic.as_deref(), Some("serial device lost"));
    // The scan stopped at the diagnostic; the matching event after it was
    // not consumed.
    assert_eq!(outcome.cursor, 2);
}

#[test]
fn wait_times_out_without_match() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);

    let start = Instant::now();
    let outcome = conn
        .wait_for_event(Some(0), &Predicate::new("never"), Duration::from_millis(50))
        .unwrap();

    assert!(outcome.event.is_none());
    assert!(outcome.diagnostic.is_none());
    assert_eq!(outcome.cursor, 0);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "overshot: {elapsed:?}");
}

#[test]
fn flush_clamps_cursor_to_newest() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    for _ in 0..5 {
        transport.post_event("noise", b"0");
    }

    // Cursor from a previous session is ahead of the rebuilt stream. The
    // budget covers one full blocked slice before the clamp kicks in.
    let outcome = conn
        .wait_for_event(Some(10), &Predicate::new("never"), Duration::from_millis(250))
        .unwrap();

    // Clamped to the newest event (seq 4), which is then re-examined and
    // consumed without matching.
    assert_eq!(outcome.cursor, 5);
    assert!(outcome.event.is_none());
    let state = transport.state();
    assert_eq!(state.fetched, vec![(4, 4)]);
}

#[test]
fn overrun_skips_to_newest_window() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    for _ in 0..150 {
        transport.post_event("noise", b"0");
    }

    let outcome = conn
        .wait_for_event(Some(0), &Predicate::new("never"), Duration::from_millis(50))
        .unwrap();

    // 150 pending with a window of 100: the oldest 50 are never fetched.
    assert_eq!(outcome.cursor, 150);
    let state = transport.state();
    assert_eq!(state.fetched, vec![(50, 149)]);
}

#[test]
fn cursor_initializes_from_server_total() {
    let transport = MemoryTransport::new();
    let mut conn = connect(&transport);
    for _ in 0..7 {
        transport.post_event("stale", b"0");
    }

    // A None cursor starts at the current total: the 7 stale events are
    // invisible, only the one posted while waiting can match.
    let poster = transport.handle();
    let posted = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        poster.post_event("go", b"1");
    });
    let outcome = conn
        .wait_for_event(None, &Predicate::new("go"), Duration::from_secs(1))
        .unwrap();
    posted.join().unwrap();

    let event = outcome.event.expect("match");
    assert_eq!(event.seq, 7);
    assert_eq!(outcome.cursor, 8);
    assert_eq!(transport.state().fetched, vec![(7, 7)]);
}

#[test]
fn wait_without_header_errors() {
    let mut transport = MemoryTransport::new();
    let result = ringlink::wait_for_event(
        &mut transport,
        None,
        &Predicate::new("go"),
        Duration::from_millis(10),
    );
    assert!(matches!(result, Err(TransportError::MissingHeader)));
}
