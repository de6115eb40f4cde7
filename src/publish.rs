//! Paced sample publication.
//!
//! [`SampleSink`] wraps an optional connection so acquisition loops can
//! run unchanged with or without a server: publishing into a disconnected
//! sink is a no-op. [`Pacer`] holds a loop to a nominal sample rate from
//! an absolute schedule, so one late tick does not shift every later one.

use std::time::Duration;

use minstant::Instant;

use crate::connect::Connection;
use crate::proto::SampleRow;
use crate::trace::debug;
use crate::transport::{Transport, TransportError};

/// Below this much slack the pacer stops sleeping and spins.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// A sample destination that may or may not be connected.
pub struct SampleSink<T: Transport> {
    connection: Option<Connection<T>>,
}

impl<T: Transport> SampleSink<T> {
    /// Creates a sink publishing into `connection`.
    #[must_use]
    pub const fn connected(connection: Connection<T>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Creates a sink that discards everything.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self { connection: None }
    }

    /// Whether a connection is attached.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The attached connection, if any.
    pub fn connection_mut(&mut self) -> Option<&mut Connection<T>> {
        self.connection.as_mut()
    }

    /// Attaches a connection, replacing and returning any previous one.
    pub fn attach(&mut self, connection: Connection<T>) -> Option<Connection<T>> {
        self.connection.replace(connection)
    }

    /// Publishes one sample row. A no-op when disconnected.
    ///
    /// # Errors
    ///
    /// Propagates transport failures from the attached connection.
    pub fn publish(&mut self, row: &SampleRow) -> Result<(), TransportError> {
        match self.connection.as_mut() {
            Some(conn) => conn.put_samples(std::slice::from_ref(row)),
            None => Ok(()),
        }
    }

    /// Publishes one event. A no-op when disconnected.
    ///
    /// # Errors
    ///
    /// Propagates transport failures from the attached connection.
    pub fn publish_event(
        &mut self,
        kind: &str,
        value: &serde_json::Value,
    ) -> Result<(), TransportError> {
        match self.connection.as_mut() {
            Some(conn) => conn.put_event(kind, value),
            None => Ok(()),
        }
    }
}

/// Paces a loop to a nominal rate against an absolute schedule.
///
/// Tick `n` completes no earlier than `start + n / rate`; lateness on one
/// tick is absorbed by shorter waits on the following ones instead of
/// accumulating. The wait sleeps half the remaining slack while more than
/// [`MIN_SLEEP`] remains, then spins out the tail for precision.
#[derive(Debug)]
pub struct Pacer {
    start: Instant,
    counter: u64,
    sample_rate: f64,
}

impl Pacer {
    /// Starts the schedule at the current instant.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` is not strictly positive.
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        assert!(sample_rate > 0.0, "sample rate must be > 0");
        debug!(sample_rate, "pacer started");
        Self {
            start: Instant::now(),
            counter: 0,
            sample_rate,
        }
    }

    /// Blocks until the next scheduled instant.
    pub fn tick(&mut self) {
        self.counter += 1;
        let target = self.start + Duration::from_secs_f64(self.counter as f64 / self.sample_rate);
        loop {
            let now = Instant::now();
            let Some(slack) = target.checked_duration_since(now) else {
                return;
            };
            if slack.is_zero() {
                return;
            }
            if slack > MIN_SLEEP {
                std::thread::sleep(slack / 2);
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Number of completed ticks.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.counter
    }
}
