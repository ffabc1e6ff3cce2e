//! AWS event-stream framing.
//!
//! Each message is `prelude (total_len u32, headers_len u32, prelude_crc u32)`,
//! then `headers`, `payload` and a trailing `message_crc u32`, all big-endian.
//! CRCs are read but not verified; the transport is already TLS-protected.

use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};

use kiro_types::error::UpstreamError;

use crate::proxy::mappers::codewhisperer::UpstreamEvent;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub type UpstreamEventStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, UpstreamError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// One decoded event-stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }
}

fn malformed(message: impl Into<String>) -> UpstreamError {
    UpstreamError::MalformedResponse { message: message.into() }
}

/// Incremental decoder; bytes go in through [`feed`](Self::feed), complete
/// frames come out of [`next_frame`](Self::next_frame).
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: BytesMut,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// No partial frame is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, UpstreamError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total_len = read_u32(&self.buffer[0..4]) as usize;
        let headers_len = read_u32(&self.buffer[4..8]) as usize;

        if total_len < MIN_FRAME_LEN {
            return Err(malformed(format!("frame length {} is below the minimum", total_len)));
        }
        if total_len > MAX_FRAME_LEN {
            return Err(malformed(format!("frame length {} exceeds the maximum", total_len)));
        }
        if PRELUDE_LEN + headers_len + CRC_LEN > total_len {
            return Err(malformed(format!(
                "headers length {} does not fit in a {} byte frame",
                headers_len, total_len
            )));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total_len).freeze();
        frame.advance(PRELUDE_LEN);
        let headers = parse_headers(frame.split_to(headers_len))?;
        let payload = frame.split_to(frame.len() - CRC_LEN);
        Ok(Some(Frame { headers, payload }))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn take(buf: &mut Bytes, n: usize) -> Result<Bytes, UpstreamError> {
    if buf.remaining() < n {
        return Err(malformed("header block truncated"));
    }
    Ok(buf.split_to(n))
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<(String, HeaderValue)>, UpstreamError> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        let name_len = take(&mut buf, 1)?[0] as usize;
        let name = String::from_utf8(take(&mut buf, name_len)?.to_vec())
            .map_err(|_| malformed("header name is not UTF-8"))?;
        let value_type = take(&mut buf, 1)?[0];
        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(take(&mut buf, 1)?.get_i8()),
            3 => HeaderValue::Short(take(&mut buf, 2)?.get_i16()),
            4 => HeaderValue::Int(take(&mut buf, 4)?.get_i32()),
            5 => HeaderValue::Long(take(&mut buf, 8)?.get_i64()),
            6 => {
                let len = take(&mut buf, 2)?.get_u16() as usize;
                HeaderValue::Bytes(take(&mut buf, len)?)
            },
            7 => {
                let len = take(&mut buf, 2)?.get_u16() as usize;
                let raw = take(&mut buf, len)?;
                HeaderValue::String(
                    String::from_utf8(raw.to_vec()).map_err(|_| malformed("header value is not UTF-8"))?,
                )
            },
            8 => HeaderValue::Timestamp(take(&mut buf, 8)?.get_i64()),
            9 => {
                let mut uuid = [0_u8; 16];
                take(&mut buf, 16)?.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            },
            other => return Err(malformed(format!("unknown header value type {}", other))),
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Decode a response body into upstream events.
///
/// A clean end of body yields [`UpstreamEvent::Completed`]; a body that ends
/// mid-frame yields a malformed-response error instead.
pub fn decode_events<S, E>(body: S) -> UpstreamEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = EventStreamDecoder::new();
        futures::pin_mut!(body);

        loop {
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => match UpstreamEvent::from_frame(&frame) {
                        Ok(event) => yield Ok(event),
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    },
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }

            match body.next().await {
                Some(Ok(chunk)) => decoder.feed(&chunk),
                Some(Err(e)) => {
                    yield Err(UpstreamError::Network { message: e.to_string() });
                    return;
                },
                None => {
                    if decoder.is_empty() {
                        yield Ok(UpstreamEvent::Completed);
                    } else {
                        yield Err(malformed("stream ended inside a frame"));
                    }
                    return;
                },
            }
        }
    };
    Box::pin(stream)
}

/// Encode a frame with string headers. CRC fields are zeroed.
#[cfg(test)]
pub(crate) fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }
    let total = PRELUDE_LEN + header_bytes.len() + payload.len() + CRC_LEN;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0; 4]);
    out
}

/// Frame for a `:message-type event` message.
#[cfg(test)]
pub(crate) fn encode_event(event_type: &str, payload: &serde_json::Value) -> Vec<u8> {
    encode_frame(
        &[(":message-type", "event"), (":event-type", event_type), (":content-type", "application/json")],
        payload.to_string().as_bytes(),
    )
}
