//! Content-Length framing for the debug adapter byte stream.
//!
//! Debug adapters frame every message with a small header block:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//!
//! Unlike a blocking reader, the [`Framer`] never waits on the stream itself.
//! It is fed whatever chunk the pipe produced and yields each body once all of
//! its bytes have arrived, so messages split across reads or packed into one
//! read come out the same way.

use thiserror::Error;
use tracing::warn;

/// Log target for framing faults.
const FRAMING_TARGET: &str = "dap_host::framing";

/// Separator between the header block and the body.
const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Line terminator inside the header block.
const HEADER_LINE_BREAK: &str = "\r\n";

/// The only header the framer interprets.
const CONTENT_LENGTH: &str = "Content-Length";

/// Default ceiling for buffered header bytes.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8192;

/// Default ceiling for a single message body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Progress through the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Still looking for the end of a header block.
    Unknown,
    /// Header consumed; this many body bytes are owed.
    Known(usize),
    /// An oversized body is being dropped; this many bytes remain.
    Skipping(usize),
}

/// Recoverable faults found while framing the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A header block ended without a `Content-Length` entry.
    #[error("header block has no Content-Length entry")]
    MissingContentLength,

    /// The `Content-Length` value is not a byte count.
    #[error("invalid Content-Length value: {value:?}")]
    InvalidContentLength {
        /// The raw header value.
        value: String,
    },

    /// Too many bytes arrived without a header terminator.
    #[error("header exceeded {limit} bytes without a blank line")]
    HeaderTooLarge {
        /// The configured ceiling.
        limit: usize,
    },

    /// The declared body length exceeds the ceiling; the body is skipped.
    #[error("Content-Length {length} exceeds the {limit} byte limit")]
    BodyTooLarge {
        /// The declared length.
        length: usize,
        /// The configured ceiling.
        limit: usize,
    },
}

/// Incremental decoder for Content-Length framed messages.
///
/// The framer owns the byte accumulator exclusively. Bytes only ever leave
/// from the front of the buffer, so bodies are yielded in the order they
/// complete on the wire.
#[derive(Debug)]
pub struct Framer {
    buffer: Vec<u8>,
    state: FrameState,
    max_header_bytes: usize,
    max_body_bytes: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    /// Creates a framer with the default ceilings.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_BODY_BYTES)
    }

    /// Creates a framer that rejects header blocks longer than `limit`.
    #[must_use]
    pub const fn with_max_header_bytes(limit: usize) -> Self {
        Self::with_limits(limit, DEFAULT_MAX_BODY_BYTES)
    }

    /// Creates a framer with explicit header and body ceilings.
    ///
    /// Bodies declared larger than `max_body_bytes` are never buffered:
    /// their bytes are dropped as they arrive and framing resumes after them.
    #[must_use]
    pub const fn with_limits(max_header_bytes: usize, max_body_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            state: FrameState::Unknown,
            max_header_bytes,
            max_body_bytes,
        }
    }

    /// Current frame state.
    #[must_use]
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Number of bytes received but not yet consumed.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `chunk` and returns an iterator over every frame it completes.
    ///
    /// Frames left undrained when the iterator is dropped stay buffered and
    /// are produced by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { framer: self }
    }

    fn next_frame(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        loop {
            match self.state {
                FrameState::Known(length) => {
                    if self.buffer.len() < length {
                        return None;
                    }
                    let body: Vec<u8> = self.buffer.drain(..length).collect();
                    self.state = FrameState::Unknown;
                    return Some(Ok(body));
                }
                FrameState::Skipping(remaining) => {
                    let skipped = remaining.min(self.buffer.len());
                    self.buffer.drain(..skipped);
                    let left = remaining - skipped;
                    if left > 0 {
                        self.state = FrameState::Skipping(left);
                        return None;
                    }
                    self.state = FrameState::Unknown;
                }
                FrameState::Unknown => {
                    let Some(index) = find_separator(&self.buffer) else {
                        return self.enforce_header_limit();
                    };
                    let header: Vec<u8> = self.buffer.drain(..index + SEPARATOR.len()).collect();
                    let block = header.get(..index).unwrap_or_default();
                    match parse_content_length(block) {
                        Ok(length) if length > self.max_body_bytes => {
                            self.state = FrameState::Skipping(length);
                            return Some(Err(report(FramingError::BodyTooLarge {
                                length,
                                limit: self.max_body_bytes,
                            })));
                        }
                        Ok(length) => self.state = FrameState::Known(length),
                        Err(error) => return Some(Err(report(error))),
                    }
                }
            }
        }
    }

    fn enforce_header_limit(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        if self.buffer.len() <= self.max_header_bytes {
            return None;
        }
        self.buffer.clear();
        Some(Err(report(FramingError::HeaderTooLarge {
            limit: self.max_header_bytes,
        })))
    }
}

fn report(error: FramingError) -> FramingError {
    warn!(target: FRAMING_TARGET, %error, "framing fault");
    error
}

/// Draining iterator returned by [`Framer::feed`].
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Vec<u8>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_frame()
    }
}

/// Prefixes `body` with its Content-Length header.
#[must_use]
pub fn encode(body: &[u8]) -> Vec<u8> {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);
    frame
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}

/// Extracts the body length from a header block.
///
/// Lines are `Key: value` pairs split at the first colon. Keys match
/// exactly; the last `Content-Length` line wins.
fn parse_content_length(block: &[u8]) -> Result<usize, FramingError> {
    let text = String::from_utf8_lossy(block);
    let mut raw_value = None;
    for line in text.split(HEADER_LINE_BREAK) {
        if let Some((key, value)) = line.split_once(':')
            && key == CONTENT_LENGTH
        {
            raw_value = Some(value.trim());
        }
    }

    let value = raw_value.ok_or(FramingError::MissingContentLength)?;
    value
        .parse()
        .map_err(|_| FramingError::InvalidContentLength {
            value: value.to_owned(),
        })
}
