//! Newline-delimited JSON decoding for provider output
//!
//! Output arrives in arbitrary chunks. The codec keeps the trailing,
//! not-yet-terminated fragment in the read buffer between chunks and only
//! parses a line once its `\n` has been seen.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::config::{DEFAULT_MAX_LINE_BYTES, LOG_SNIPPET_CHARS};

/// One unit of decoded provider output
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// A complete line that parsed as JSON
    Message(serde_json::Value),
    /// A complete line that did not parse; dropped by the reader
    Malformed {
        /// Parser error
        reason: String,
        /// Start of the offending line
        line: String,
    },
    /// A line longer than the configured limit; its bytes were discarded
    Oversized {
        /// Number of bytes discarded
        len: usize,
    },
}

/// Decoder splitting provider stdout into JSON messages
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_bytes: usize,
    /// Offset up to which the buffer is known to contain no newline
    next_index: usize,
    /// Bytes already thrown away from an oversized line still in progress
    discarded: Option<usize>,
}

impl LineCodec {
    /// Create a codec rejecting lines longer than `max_line_bytes`
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            next_index: 0,
            discarded: None,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl Decoder for LineCodec {
    type Item = DecodedLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedLine>, io::Error> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            let Some(end) = newline else {
                if self.discarded.is_some() || buf.len() > self.max_line_bytes {
                    *self.discarded.get_or_insert(0) += buf.len();
                    buf.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = buf.len();
                }
                return Ok(None);
            };

            let raw = buf.split_to(end + 1);
            self.next_index = 0;

            if let Some(dropped) = self.discarded.take() {
                return Ok(Some(DecodedLine::Oversized { len: dropped + end }));
            }

            let line = strip_carriage_return(&raw[..end]);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if line.len() > self.max_line_bytes {
                return Ok(Some(DecodedLine::Oversized { len: line.len() }));
            }
            return Ok(Some(parse_line(line)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedLine>, io::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if let Some(dropped) = self.discarded.take() {
            buf.clear();
            return Ok(Some(DecodedLine::Oversized { len: dropped }));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        // The process closed its output mid-line; nothing more can arrive.
        let rest = buf.split_to(buf.len());
        self.next_index = 0;
        let line = strip_carriage_return(&rest);
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(parse_line(line)))
    }
}

fn strip_carriage_return(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_line(line: &[u8]) -> DecodedLine {
    match serde_json::from_slice::<serde_json::Value>(line) {
        Ok(value) => DecodedLine::Message(value),
        Err(e) => DecodedLine::Malformed {
            reason: e.to_string(),
            line: String::from_utf8_lossy(line)
                .chars()
                .take(LOG_SNIPPET_CHARS)
                .collect(),
        },
    }
}
