//! Acquisition loop: read, publish, pace.

use thiserror::Error;

use crate::config::{StreamConfig, CHANNEL_COUNT};
use crate::connect::CancelToken;
use crate::device::{DeviceError, SampleSource};
use crate::proto::SampleRow;
use crate::publish::{Pacer, SampleSink};
use crate::trace::info;
use crate::transport::{Transport, TransportError};

/// Errors raised by the acquisition loop.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The sample source failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The publication side failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Runs the acquisition loop until `cancel` is triggered.
///
/// Each iteration reads the active channels from `source`, publishes one
/// row through `sink`, and holds the configured sample rate. Inactive
/// channels publish as zero so the row shape stays constant.
///
/// # Errors
///
/// Stops at the first source or transport failure. Cancellation is a
/// clean `Ok` return.
pub fn run_stream<T, S>(
    sink: &mut SampleSink<T>,
    source: &mut S,
    config: &StreamConfig,
    cancel: &CancelToken,
) -> Result<(), StreamError>
where
    T: Transport,
    S: SampleSource,
{
    let mut pacer = Pacer::new(config.sample_rate);
    info!(
        sample_rate = config.sample_rate,
        active_channels = config.active_channels,
        "stream started"
    );

    while !cancel.is_cancelled() {
        let mut row = SampleRow::zeroed(CHANNEL_COUNT as usize);
        row.set(0, source.read_channel(0)?);
        if config.active_channels > 1 {
            row.set(1, source.read_channel(1)?);
        }
        sink.publish(&row)?;
        pacer.tick();
    }

    info!(ticks = pacer.ticks(), "stream stopped");
    Ok(())
}
