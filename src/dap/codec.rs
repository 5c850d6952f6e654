//! `Content-Length` framing for DAP messages.
//!
//! Each message is a header block terminated by `\r\n\r\n` followed by a
//! JSON body of exactly `Content-Length` bytes. Bodies larger than
//! [`MAX_BODY_BYTES`] are rejected before allocation.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Maximum accepted body size: 16 MiB.
pub const MAX_BODY_BYTES: usize = 16 * 1_048_576;

/// Maximum header block size before the terminator must appear.
const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Codec for bidirectional DAP streams.
#[derive(Debug, Default)]
pub struct DapCodec {
    /// Body length parsed from a header block whose body is still incomplete.
    pending_body: Option<usize>,
}

impl DapCodec {
    /// Create a codec with no partially decoded message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for DapCodec {
    type Item = Value;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        let length = match self.pending_body {
            Some(length) => length,
            None => {
                let Some(end) = find_terminator(src) else {
                    if src.len() > MAX_HEADER_BYTES {
                        return Err(AppError::Protocol(format!(
                            "header block exceeded {MAX_HEADER_BYTES} bytes"
                        )));
                    }
                    return Ok(None);
                };
                let length = parse_content_length(&src[..end])?;
                if length > MAX_BODY_BYTES {
                    return Err(AppError::Protocol(format!(
                        "message body too large: {length} bytes"
                    )));
                }
                src.advance(end + HEADER_TERMINATOR.len());
                self.pending_body = Some(length);
                length
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.pending_body = None;
        let body = src.split_to(length);
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| AppError::Protocol(format!("invalid DAP JSON payload: {e}")))
    }
}

impl Encoder<Value> for DapCodec {
    type Error = AppError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| AppError::Protocol(format!("failed to encode DAP message: {e}")))?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

fn find_terminator(src: &[u8]) -> Option<usize> {
    src.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_content_length(headers: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(headers)
        .map_err(|e| AppError::Protocol(format!("non UTF-8 DAP header: {e}")))?;

    for line in text.split("\r\n") {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse::<usize>().map_err(|e| {
                    AppError::Protocol(format!("invalid Content-Length value: {e}"))
                });
            }
        }
    }

    Err(AppError::Protocol(
        "missing required Content-Length header".into(),
    ))
}
