//! Request/response framing and codec.
//!
//! ## Wire Format
//!
//! Every message starts with an 8-byte head; all multi-byte integers are
//! little-endian. Requests carry a command code, responses a status code.
//!
//! ```text
//! head: [version:2][code:2][len:4]     len = payload bytes after the head
//! ```
//!
//! | Command  | Code  | Request payload                               |
//! |----------|-------|-----------------------------------------------|
//! | PUT_HDR  | 0x101 | `[channels:4][data_type:4][sample_rate:f32]`  |
//! | PUT_DAT  | 0x102 | `[channels:4][data_type:4][rows:4][values…]`  |
//! | PUT_EVT  | 0x103 | `[kind_len:4][value_len:4][kind][value]`      |
//! | GET_HDR  | 0x201 | empty                                         |
//! | GET_EVT  | 0x203 | `[begin:8][end:8]` (inclusive)                |
//! | WAIT_DAT | 0x402 | `[samples:8][events:8][timeout_ms:4]`         |
//!
//! OK response payloads: GET_HDR returns
//! `[channels:4][data_type:4][sample_rate:f32][sample_count:8][event_count:8]`,
//! GET_EVT returns repeated `[seq:8][kind_len:4][value_len:4][kind][value]`,
//! WAIT_DAT returns `[sample_count:8][event_count:8]`; PUT_* return empty.
//! PUT_DAT values are encoded per the declared element type.

use thiserror::Error;

use super::{Counts, DataType, Header, RawEvent, SampleRow};

/// Protocol version carried in every head.
pub const VERSION: u16 = 1;

/// Size of the fixed message head in bytes.
pub const HEAD_LEN: usize = 8;

/// Threshold sentinel for [`CMD_WAIT_DAT`]: ignore this counter.
pub const IGNORE_THRESHOLD: u64 = u64::MAX;

/// Declare the stream header.
pub const CMD_PUT_HDR: u16 = 0x101;
/// Append sample rows.
pub const CMD_PUT_DAT: u16 = 0x102;
/// Append one event.
pub const CMD_PUT_EVT: u16 = 0x103;
/// Read the header and running totals.
pub const CMD_GET_HDR: u16 = 0x201;
/// Read events in an inclusive sequence range.
pub const CMD_GET_EVT: u16 = 0x203;
/// Block until a counter exceeds its threshold or the timeout elapses.
pub const CMD_WAIT_DAT: u16 = 0x402;

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Request succeeded.
    Ok,
    /// No header has been declared yet.
    NoHeader,
    /// Requested event range is outside the retained history.
    BadRange,
    /// Request was malformed or unrecognized.
    BadRequest,
}

impl Status {
    /// Returns the numeric wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 0,
            Self::NoHeader => 1,
            Self::BadRange => 2,
            Self::BadRequest => 3,
        }
    }

    /// Looks up a status by wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::NoHeader),
            2 => Some(Self::BadRange),
            3 => Some(Self::BadRequest),
            _ => None,
        }
    }
}

/// Errors during encode/decode.
#[derive(Debug, Error)]
pub enum WireError {
    /// Input buffer too short to decode the message.
    #[error("input buffer too small")]
    Truncated,
    /// Unknown command code.
    #[error("unknown command {0:#06x}")]
    UnknownCommand(u16),
    /// Unknown status code.
    #[error("unknown status {0:#06x}")]
    UnknownStatus(u16),
    /// Unknown sample element type code.
    #[error("unknown data type code {0}")]
    UnknownDataType(u32),
    /// Head version differs from ours.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Version this codec speaks.
        expected: u16,
        /// Version found in the head.
        got: u16,
    },
    /// A length field is inconsistent with the payload size.
    #[error("length field inconsistent with payload")]
    BadLength,
    /// A sample row does not match the declared channel count.
    #[error("row has {got} values, request declares {channels} channels")]
    RowShape {
        /// Declared channel count.
        channels: u32,
        /// Values present in the offending row.
        got: usize,
    },
    /// An event kind was not valid UTF-8.
    #[error("event kind is not valid UTF-8")]
    KindEncoding,
}

/// A request as decoded on the server side.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Declare the stream header.
    PutHeader {
        channels: u32,
        sample_rate: f32,
        data_type: DataType,
    },
    /// Append sample rows.
    PutData {
        channels: u32,
        data_type: DataType,
        rows: Vec<SampleRow>,
    },
    /// Append one event.
    PutEvent { kind: String, value: Vec<u8> },
    /// Read the header and running totals.
    GetHeader,
    /// Read events in `[begin, end]` inclusive.
    GetEvents { begin: u64, end: u64 },
    /// Block until a counter exceeds its threshold or the timeout elapses.
    WaitData {
        samples: u64,
        events: u64,
        timeout_ms: u32,
    },
}

/// Writer that frames a message, patching the length field on finish.
struct MessageWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> MessageWriter<'a> {
    fn begin(buf: &'a mut Vec<u8>, code: u16) -> Self {
        buf.clear();
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&code.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // patched in finish()
        Self { buf }
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(self) {
        let len = (self.buf.len() - HEAD_LEN) as u32;
        self.buf[4..8].copy_from_slice(&len.to_le_bytes());
    }
}

/// Reader for decoding payloads.
struct MessageReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> MessageReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take_bytes(2)?;
        let mut arr = [0u8; 2];
        arr.copy_from_slice(bytes);
        Ok(u16::from_le_bytes(arr))
    }

    fn take_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take_bytes(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(arr))
    }

    fn take_u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn take_f32(&mut self) -> Result<f32, WireError> {
        self.take_u32().map(f32::from_bits)
    }

    fn take_f64(&mut self) -> Result<f64, WireError> {
        self.take_u64().map(f64::from_bits)
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.cursor.checked_add(len).ok_or(WireError::BadLength)?;
        if end > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    const fn is_empty(&self) -> bool {
        self.cursor >= self.buf.len()
    }
}

/// Decodes a message head, returning `(code, payload_len)`.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] for a short buffer and
/// [`WireError::VersionMismatch`] for a foreign version.
pub fn decode_head(bytes: &[u8]) -> Result<(u16, u32), WireError> {
    let mut r = MessageReader::new(bytes);
    let version = r.take_u16()?;
    if version != VERSION {
        return Err(WireError::VersionMismatch {
            expected: VERSION,
            got: version,
        });
    }
    let code = r.take_u16()?;
    let len = r.take_u32()?;
    Ok((code, len))
}

/// Encodes a PUT_HDR request into `buf`.
pub fn encode_put_header(channels: u32, sample_rate: f32, data_type: DataType, buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, CMD_PUT_HDR);
    w.put_u32(channels);
    w.put_u32(data_type.code());
    w.put_f32(sample_rate);
    w.finish();
}

/// Encodes a PUT_DAT request into `buf`.
///
/// # Errors
///
/// Returns [`WireError::RowShape`] if any row's width differs from
/// `channels`.
pub fn encode_put_data(
    channels: u32,
    data_type: DataType,
    rows: &[SampleRow],
    buf: &mut Vec<u8>,
) -> Result<(), WireError> {
    for row in rows {
        if row.channels() != channels as usize {
            return Err(WireError::RowShape {
                channels,
                got: row.channels(),
            });
        }
    }
    let mut w = MessageWriter::begin(buf, CMD_PUT_DAT);
    w.put_u32(channels);
    w.put_u32(data_type.code());
    w.put_u32(rows.len() as u32);
    for row in rows {
        for &value in row.values() {
            match data_type {
                DataType::Float32 => w.put_f32(value as f32),
                DataType::Float64 => w.put_f64(value),
            }
        }
    }
    w.finish();
    Ok(())
}

/// Encodes a PUT_EVT request into `buf`.
pub fn encode_put_event(kind: &str, value: &[u8], buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, CMD_PUT_EVT);
    w.put_u32(kind.len() as u32);
    w.put_u32(value.len() as u32);
    w.put_bytes(kind.as_bytes());
    w.put_bytes(value);
    w.finish();
}

/// Encodes a GET_HDR request into `buf`.
pub fn encode_get_header(buf: &mut Vec<u8>) {
    MessageWriter::begin(buf, CMD_GET_HDR).finish();
}

/// Encodes a GET_EVT request for the inclusive range `[begin, end]`.
pub fn encode_get_events(begin: u64, end: u64, buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, CMD_GET_EVT);
    w.put_u64(begin);
    w.put_u64(end);
    w.finish();
}

/// Encodes a WAIT_DAT request. Thresholds use [`IGNORE_THRESHOLD`] to
/// disable a counter.
pub fn encode_wait_data(samples: u64, events: u64, timeout_ms: u32, buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, CMD_WAIT_DAT);
    w.put_u64(samples);
    w.put_u64(events);
    w.put_u32(timeout_ms);
    w.finish();
}

/// Decodes a request payload given the command code from the head.
///
/// # Errors
///
/// Returns [`WireError::UnknownCommand`] for a foreign code and codec
/// errors for a malformed payload.
pub fn decode_request(command: u16, payload: &[u8]) -> Result<Request, WireError> {
    let mut r = MessageReader::new(payload);
    match command {
        CMD_PUT_HDR => {
            let channels = r.take_u32()?;
            let code = r.take_u32()?;
            let data_type = DataType::from_code(code).ok_or(WireError::UnknownDataType(code))?;
            let sample_rate = r.take_f32()?;
            Ok(Request::PutHeader {
                channels,
                sample_rate,
                data_type,
            })
        }
        CMD_PUT_DAT => {
            let channels = r.take_u32()?;
            let code = r.take_u32()?;
            let data_type = DataType::from_code(code).ok_or(WireError::UnknownDataType(code))?;
            let nrows = r.take_u32()?;
            let mut rows = Vec::with_capacity(nrows as usize);
            for _ in 0..nrows {
                let mut row = Vec::with_capacity(channels as usize);
                for _ in 0..channels {
                    let value = match data_type {
                        DataType::Float32 => f64::from(r.take_f32()?),
                        DataType::Float64 => r.take_f64()?,
                    };
                    row.push(value);
                }
                rows.push(SampleRow::from(row));
            }
            Ok(Request::PutData {
                channels,
                data_type,
                rows,
            })
        }
        CMD_PUT_EVT => {
            let kind_len = r.take_u32()? as usize;
            let value_len = r.take_u32()? as usize;
            let kind = std::str::from_utf8(r.take_bytes(kind_len)?)
                .map_err(|_| WireError::KindEncoding)?
                .to_string();
            let value = r.take_bytes(value_len)?.to_vec();
            Ok(Request::PutEvent { kind, value })
        }
        CMD_GET_HDR => Ok(Request::GetHeader),
        CMD_GET_EVT => {
            let begin = r.take_u64()?;
            let end = r.take_u64()?;
            Ok(Request::GetEvents { begin, end })
        }
        CMD_WAIT_DAT => {
            let samples = r.take_u64()?;
            let events = r.take_u64()?;
            let timeout_ms = r.take_u32()?;
            Ok(Request::WaitData {
                samples,
                events,
                timeout_ms,
            })
        }
        other => Err(WireError::UnknownCommand(other)),
    }
}

/// Encodes a bodyless response with the given status.
pub fn encode_response_empty(status: Status, buf: &mut Vec<u8>) {
    MessageWriter::begin(buf, status.code()).finish();
}

/// Encodes an OK response carrying the header and running totals.
pub fn encode_response_header(header: &Header, buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, Status::Ok.code());
    w.put_u32(header.channels);
    w.put_u32(header.data_type.code());
    w.put_f32(header.sample_rate);
    w.put_u64(header.sample_count);
    w.put_u64(header.event_count);
    w.finish();
}

/// Encodes an OK response carrying running totals.
pub fn encode_response_counts(counts: Counts, buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, Status::Ok.code());
    w.put_u64(counts.samples);
    w.put_u64(counts.events);
    w.finish();
}

/// Encodes an OK response carrying a batch of events.
pub fn encode_response_events(events: &[RawEvent], buf: &mut Vec<u8>) {
    let mut w = MessageWriter::begin(buf, Status::Ok.code());
    for event in events {
        w.put_u64(event.seq);
        w.put_u32(event.kind.len() as u32);
        w.put_u32(event.value.len() as u32);
        w.put_bytes(event.kind.as_bytes());
        w.put_bytes(&event.value);
    }
    w.finish();
}

/// Looks up a response status from its head code.
///
/// # Errors
///
/// Returns [`WireError::UnknownStatus`] for a foreign code.
pub fn decode_status(code: u16) -> Result<Status, WireError> {
    Status::from_code(code).ok_or(WireError::UnknownStatus(code))
}

/// Decodes a GET_HDR OK payload.
pub fn decode_header_payload(payload: &[u8]) -> Result<Header, WireError> {
    let mut r = MessageReader::new(payload);
    let channels = r.take_u32()?;
    let code = r.take_u32()?;
    let data_type = DataType::from_code(code).ok_or(WireError::UnknownDataType(code))?;
    let sample_rate = r.take_f32()?;
    let sample_count = r.take_u64()?;
    let event_count = r.take_u64()?;
    Ok(Header {
        channels,
        sample_rate,
        data_type,
        sample_count,
        event_count,
    })
}

/// Decodes a WAIT_DAT OK payload.
pub fn decode_counts_payload(payload: &[u8]) -> Result<Counts, WireError> {
    let mut r = MessageReader::new(payload);
    let samples = r.take_u64()?;
    let events = r.take_u64()?;
    Ok(Counts { samples, events })
}

/// Decodes a GET_EVT OK payload into events in stored order.
pub fn decode_events_payload(payload: &[u8]) -> Result<Vec<RawEvent>, WireError> {
    let mut r = MessageReader::new(payload);
    let mut events = Vec::new();
    while !r.is_empty() {
        let seq = r.take_u64()?;
        let kind_len = r.take_u32()? as usize;
        let value_len = r.take_u32()? as usize;
        let kind = std::str::from_utf8(r.take_bytes(kind_len)?)
            .map_err(|_| WireError::KindEncoding)?
            .to_string();
        let value = r.take_bytes(value_len)?.to_vec();
        events.push(RawEvent { seq, kind, value });
    }
    Ok(events)
}
