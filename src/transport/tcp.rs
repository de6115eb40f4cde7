//! Blocking TCP implementation of [`Transport`].

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::config::ServerAddr;
use crate::proto::wire::{
    self, Status, HEAD_LEN, IGNORE_THRESHOLD,
};
use crate::proto::{Counts, DataType, Header, RawEvent, SampleRow};
use crate::trace::debug;
use crate::transport::{Transport, TransportError};

/// A blocking TCP session with a ring-buffer server.
///
/// One request/response exchange at a time; the encode buffer is reused
/// across requests to amortize allocation.
pub struct TcpTransport {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TcpTransport {
    /// Connects to the server and disables Nagle's algorithm (sample
    /// rows are small and latency-sensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn connect(addr: &ServerAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((addr.host(), addr.port()))?;
        stream.set_nodelay(true)?;
        debug!(peer = %addr, "connected");
        Ok(Self {
            stream,
            buf: Vec::with_capacity(256),
        })
    }

    /// Writes the framed request in `self.buf` and reads one response,
    /// returning its status and payload.
    fn exchange(&mut self) -> Result<(Status, Vec<u8>), TransportError> {
        self.stream.write_all(&self.buf)?;

        let mut head = [0u8; HEAD_LEN];
        self.stream.read_exact(&mut head)?;
        let (code, len) = wire::decode_head(&head)?;
        let status = wire::decode_status(code)?;

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload)?;
        Ok((status, payload))
    }

    /// Like [`exchange`](Self::exchange) but treats any non-OK status as
    /// [`TransportError::Rejected`].
    fn exchange_ok(&mut self) -> Result<Vec<u8>, TransportError> {
        let (status, payload) = self.exchange()?;
        match status {
            Status::Ok => Ok(payload),
            other => Err(TransportError::Rejected(other)),
        }
    }
}

impl Transport for TcpTransport {
    fn put_header(
        &mut self,
        channels: u32,
        sample_rate: f32,
        data_type: DataType,
    ) -> Result<(), TransportError> {
        wire::encode_put_header(channels, sample_rate, data_type, &mut self.buf);
        self.exchange_ok()?;
        Ok(())
    }

    fn get_header(&mut self) -> Result<Option<Header>, TransportError> {
        wire::encode_get_header(&mut self.buf);
        let (status, payload) = self.exchange()?;
        match status {
            Status::Ok => Ok(Some(wire::decode_header_payload(&payload)?)),
            Status::NoHeader => Ok(None),
            other => Err(TransportError::Rejected(other)),
        }
    }

    fn put_samples(&mut self, rows: &[SampleRow]) -> Result<(), TransportError> {
        let channels = rows.first().map_or(0, SampleRow::channels) as u32;
        wire::encode_put_data(channels, DataType::Float64, rows, &mut self.buf)?;
        self.exchange_ok()?;
        Ok(())
    }

    fn put_event(&mut self, kind: &str, value: &[u8]) -> Result<(), TransportError> {
        wire::encode_put_event(kind, value, &mut self.buf);
        self.exchange_ok()?;
        Ok(())
    }

    fn get_events(&mut self, begin: u64, end: u64) -> Result<Vec<RawEvent>, TransportError> {
        wire::encode_get_events(begin, end, &mut self.buf);
        let payload = self.exchange_ok()?;
        Ok(wire::decode_events_payload(&payload)?)
    }

    fn wait(
        &mut self,
        samples: Option<u64>,
        events: Option<u64>,
        timeout: Duration,
    ) -> Result<Counts, TransportError> {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        wire::encode_wait_data(
            samples.unwrap_or(IGNORE_THRESHOLD),
            events.unwrap_or(IGNORE_THRESHOLD),
            timeout_ms,
            &mut self.buf,
        );
        let payload = self.exchange_ok()?;
        Ok(wire::decode_counts_payload(&payload)?)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already gone is fine for a teardown.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
