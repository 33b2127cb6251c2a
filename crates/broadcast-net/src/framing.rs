//! Message framing for the line-oriented transport
//!
//! One JSON envelope per line. A line that is valid framing but not a valid
//! envelope is surfaced as an `Err` item so the stream keeps going; only
//! framing violations end the stream.

use broadcast_core::{DecodeError, Envelope};
use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum line size (1 MiB)
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes (max {MAX_LINE_SIZE})")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] broadcast_core::Error),
}

/// Codec for newline-delimited JSON envelopes
#[derive(Debug, Default)]
pub struct EnvelopeCodec {
    /// Bytes already scanned for a newline
    next_index: usize,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_line(line: &[u8]) -> Option<Result<Envelope, DecodeError>> {
        let line = line.strip_suffix(&b"\r"[..]).unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(Envelope::from_json(line))
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Result<Envelope, DecodeError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > MAX_LINE_SIZE {
                    return Err(FrameError::TooLarge(src.len()));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            if end > MAX_LINE_SIZE {
                return Err(FrameError::TooLarge(end));
            }

            let line = src.split_to(end + 1);
            if let Some(item) = Self::decode_line(&line[..end]) {
                return Ok(Some(item));
            }
            // blank line, keep scanning
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        // Trailing line without a newline
        self.next_index = 0;
        let rest = src.split();
        Ok(Self::decode_line(&rest))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_json()?;
        if line.len() > MAX_LINE_SIZE {
            return Err(FrameError::TooLarge(line.len()));
        }

        dst.reserve(line.len() + 1);
        dst.put_slice(&line);
        dst.put_u8(b'\n');

        Ok(())
    }
}
