//! Incremental Request Frame Reader
//!
//! TCP delivers a byte stream, not messages. A single read may hold half a
//! command, or three pipelined commands and the start of a fourth. The
//! [`FrameReader`] owns the buffer that bridges the two: callers append every
//! chunk they receive with [`FrameReader::feed`] and then drain complete frames
//! with [`FrameReader::next_frame`].
//!
//! ## Request Format
//!
//! Clients send each command as an array of bulk strings:
//!
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<len bytes>\r\n     (repeated argc times)
//! ```
//!
//! Parsing is strictly length-prefixed. Payload bytes are never inspected, so a
//! value may contain `*`, `$`, CR or LF without confusing the reader.
//!
//! ## Results
//!
//! - `Ok(Some(frame))` - a full frame was consumed from the buffer
//! - `Ok(None)` - the frame is incomplete, feed more bytes
//! - `Err(ProtocolError)` - the buffered bytes can never form a valid frame
//!
//! Header lines are validated as soon as their bytes arrive, so `*ab` fails
//! immediately, while `*1` without its CRLF just waits.

use crate::protocol::types::{prefix, CRLF};
use bytes::{Bytes, BytesMut};
use std::ops::Range;
use thiserror::Error;

/// Errors raised when the request stream violates the wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame or element started with the wrong type byte
    #[error("expected '{expected}', got {found:#04x}")]
    UnexpectedByte { expected: char, found: u8 },

    /// A `*` or `$` header line did not hold a valid integer
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// A header line grew past the longest possible integer without a CRLF
    #[error("header line too long")]
    LineTooLong,

    #[error("invalid multibulk length: {0}")]
    InvalidArrayLength(i64),

    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Bulk payload was not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    #[error("{what} too large: {size} (max: {max})")]
    TooLarge {
        what: &'static str,
        size: usize,
        max: usize,
    },

    /// Command name is not valid UTF-8
    #[error("invalid UTF-8 in command name")]
    InvalidUtf8,

    /// A frame declared zero arguments
    #[error("empty command")]
    EmptyCommand,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// One complete request: the raw bulk strings in order, command name first.
pub type Frame = Vec<Bytes>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of bulk strings in one frame
pub const MAX_ARGS: usize = 1024 * 1024;

/// Longest header body we accept: `-9223372036854775808` is 20 bytes.
const MAX_HEADER_LEN: usize = 20;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reassembles request frames from arbitrarily fragmented input.
///
/// Progress through a partial frame is kept between calls, so every header is
/// parsed once no matter how finely the frame is split.
///
/// # Example
///
/// ```
/// use emberkv::protocol::FrameReader;
///
/// let mut reader = FrameReader::new();
/// reader.feed(b"*2\r\n$4\r\nECHO\r\n$2\r\nh");
/// assert!(reader.next_frame().unwrap().is_none());
///
/// reader.feed(b"i\r\n");
/// let frame = reader.next_frame().unwrap().unwrap();
/// assert_eq!(frame, vec!["ECHO", "hi"]);
/// ```
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    progress: Progress,
}

/// How far into the frame at the head of the buffer parsing has got.
///
/// Offsets are relative to the start of the buffer, which only moves when a
/// whole frame is taken or the reader is cleared.
#[derive(Debug, Default)]
struct Progress {
    /// Argument count, once the `*` line is in
    count: Option<usize>,

    /// Offset of the next unread `$` line
    pos: usize,

    /// Payload of the bulk whose header is read but whose bytes are not all in
    bulk: Option<Range<usize>>,

    /// Payload ranges of the arguments completed so far
    ranges: Vec<Range<usize>>,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            progress: Progress::default(),
        }
    }

    /// Appends a chunk received from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Direct access to the buffer, so a socket can `read_buf` straight into it.
    ///
    /// Only append to it; parse progress assumes earlier bytes never change.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes received but not yet consumed by a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes the frame in progress is known to span, declared bulk payloads
    /// included. Zero before its `*` line is complete.
    pub fn claimed(&self) -> usize {
        self.progress.claimed()
    }

    /// Drops any partial data, resetting decode state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.progress = Progress::default();
    }

    /// Attempts to take the next complete frame off the buffer.
    ///
    /// On success the frame's bytes are removed from the buffer and the
    /// arguments are handed out as slices of one shared allocation.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        if !self.progress.advance(&self.buffer)? {
            return Ok(None);
        }

        let done = std::mem::take(&mut self.progress);
        let data = self.buffer.split_to(done.pos).freeze();
        Ok(Some(done.ranges.into_iter().map(|r| data.slice(r)).collect()))
    }
}

impl Progress {
    fn claimed(&self) -> usize {
        match &self.bulk {
            Some(payload) => payload.end + CRLF.len(),
            None => self.pos,
        }
    }

    /// Parses as much of the frame as `buf` holds. Returns `true` once every
    /// argument is in.
    fn advance(&mut self, buf: &[u8]) -> ProtocolResult<bool> {
        let count = match self.count {
            Some(count) => count,
            None => match read_count(buf)? {
                Some((count, next)) => {
                    self.count = Some(count);
                    self.pos = next;
                    self.ranges.reserve(count.min(16));
                    count
                }
                None => return Ok(false),
            },
        };

        while self.ranges.len() < count {
            let payload = match self.bulk.clone() {
                Some(payload) => payload,
                None => match read_bulk_header(buf, self.pos)? {
                    Some(payload) => {
                        self.bulk = Some(payload.clone());
                        payload
                    }
                    None => return Ok(false),
                },
            };

            let end = payload.end;
            if buf.len() < end + CRLF.len() {
                return Ok(false);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(ProtocolError::MissingCrlf);
            }

            self.bulk = None;
            self.ranges.push(payload);
            self.pos = end + CRLF.len();
        }

        Ok(true)
    }
}

/// Reads the `*<count>` line at the start of `buf`.
fn read_count(buf: &[u8]) -> ProtocolResult<Option<(usize, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    expect_prefix(first, prefix::ARRAY)?;

    let (count, next) = match read_header(buf, 0)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if count < 0 {
        return Err(ProtocolError::InvalidArrayLength(count));
    }
    let count = count as usize;
    if count > MAX_ARGS {
        return Err(ProtocolError::TooLarge {
            what: "multibulk",
            size: count,
            max: MAX_ARGS,
        });
    }
    Ok(Some((count, next)))
}

/// Reads the `$<len>` line at `pos` and returns the payload range it declares.
fn read_bulk_header(buf: &[u8], pos: usize) -> ProtocolResult<Option<Range<usize>>> {
    let Some(&first) = buf.get(pos) else {
        return Ok(None);
    };
    expect_prefix(first, prefix::BULK_STRING)?;

    let (len, start) = match read_header(buf, pos)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if len < 0 {
        return Err(ProtocolError::InvalidBulkLength(len));
    }
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(ProtocolError::TooLarge {
            what: "bulk string",
            size: len,
            max: MAX_BULK_SIZE,
        });
    }
    Ok(Some(start..start + len))
}

#[inline]
fn expect_prefix(found: u8, expected: u8) -> ProtocolResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedByte {
            expected: expected as char,
            found,
        })
    }
}

/// Reads the integer on a `*` or `$` line starting at `start`.
///
/// Returns the value and the offset just past its CRLF.
fn read_header(buf: &[u8], start: usize) -> ProtocolResult<Option<(i64, usize)>> {
    let body_start = start + 1;
    let rest = &buf[body_start..];

    match find_crlf(rest) {
        Some(end) => {
            let body = &rest[..end];
            check_header_bytes(body)?;
            if body.len() > MAX_HEADER_LEN {
                return Err(ProtocolError::LineTooLong);
            }
            let text = String::from_utf8_lossy(body);
            let value = text
                .parse::<i64>()
                .map_err(|_| ProtocolError::InvalidInteger(text.to_string()))?;
            Ok(Some((value, body_start + end + CRLF.len())))
        }
        None => {
            // A trailing CR is the first half of a CRLF still in flight.
            let pending = rest.strip_suffix(b"\r").unwrap_or(rest);
            check_header_bytes(pending)?;
            if pending.len() > MAX_HEADER_LEN {
                return Err(ProtocolError::LineTooLong);
            }
            Ok(None)
        }
    }
}

/// Rejects a header body as soon as it holds something other than an optional
/// leading `-` and ASCII digits.
fn check_header_bytes(body: &[u8]) -> ProtocolResult<()> {
    let valid = body
        .iter()
        .enumerate()
        .all(|(i, &b)| b.is_ascii_digit() || (i == 0 && b == b'-'));

    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidInteger(
            String::from_utf8_lossy(body).into_owned(),
        ))
    }
}

/// Position of the first CRLF in `buf`, if any.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &[u8]) -> ProtocolResult<Option<Frame>> {
        let mut reader = FrameReader::new();
        reader.feed(input);
        reader.next_frame()
    }

    #[test]
    fn test_read_complete_frame() {
        let frame = read_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(frame, vec![Bytes::from("GET"), Bytes::from("name")]);
    }

    #[test]
    fn test_empty_input_needs_more() {
        assert!(read_all(b"").unwrap().is_none());
    }

    #[test]
    fn test_every_split_point_waits_for_more() {
        let input = b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n";

        for split in 1..input.len() {
            let mut reader = FrameReader::new();
            reader.feed(&input[..split]);
            assert!(
                reader.next_frame().unwrap().is_none(),
                "split at {} yielded a frame early",
                split
            );

            reader.feed(&input[split..]);
            let frame = reader.next_frame().unwrap().unwrap();
            assert_eq!(frame.len(), 3);
            assert_eq!(frame[2], Bytes::from("value"));
            assert_eq!(reader.buffered(), 0);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"*1\r\n$4\r\nPING\r\n";
        let mut reader = FrameReader::new();
        let mut frames = Vec::new();

        for byte in input.iter() {
            reader.feed(std::slice::from_ref(byte));
            if let Some(frame) = reader.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec![vec![Bytes::from("PING")]]);
    }

    #[test]
    fn test_pipelined_frames() {
        let mut reader = FrameReader::new();
        reader.feed(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*1\r\n$4\r\nPI");

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from("PING")]);

        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from("ECHO"), Bytes::from("hi")]);

        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.buffered(), 10);
    }

    #[test]
    fn test_payload_with_protocol_bytes_is_untouched() {
        // The value contains CRLF and every type prefix.
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$10\r\n*1\r\n$+:-\r\n\r\n";
        let frame = read_all(input).unwrap().unwrap();
        assert_eq!(frame[2], Bytes::from(&b"*1\r\n$+:-\r\n"[..]));
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let frame = read_all(b"*1\r\n$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(frame[0], Bytes::from(&b"hel\x00o"[..]));
    }

    #[test]
    fn test_empty_bulk_string() {
        let frame = read_all(b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(frame[1], Bytes::new());
    }

    #[test]
    fn test_zero_count_frame_is_returned() {
        // Rejecting empty commands is the decoder's job.
        let frame = read_all(b"*0\r\n").unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_non_numeric_count_fails_eagerly() {
        assert!(matches!(
            read_all(b"*ab"),
            Err(ProtocolError::InvalidInteger(_))
        ));
        assert!(matches!(
            read_all(b"*x\r\n"),
            Err(ProtocolError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_partial_count_waits() {
        assert!(read_all(b"*1").unwrap().is_none());
        assert!(read_all(b"*1\r").unwrap().is_none());
        assert!(read_all(b"*-").unwrap().is_none());
    }

    #[test]
    fn test_negative_lengths_rejected() {
        assert_eq!(
            read_all(b"*-1\r\n"),
            Err(ProtocolError::InvalidArrayLength(-1))
        );
        assert_eq!(
            read_all(b"*1\r\n$-3\r\n"),
            Err(ProtocolError::InvalidBulkLength(-3))
        );
    }

    #[test]
    fn test_wrong_prefixes_rejected() {
        assert_eq!(
            read_all(b"PING\r\n"),
            Err(ProtocolError::UnexpectedByte {
                expected: '*',
                found: b'P'
            })
        );
        assert_eq!(
            read_all(b"*1\r\n:4\r\n"),
            Err(ProtocolError::UnexpectedByte {
                expected: '$',
                found: b':'
            })
        );
    }

    #[test]
    fn test_missing_trailing_crlf() {
        assert_eq!(
            read_all(b"*1\r\n$4\r\nPINGxx"),
            Err(ProtocolError::MissingCrlf)
        );
    }

    #[test]
    fn test_header_line_too_long() {
        assert_eq!(
            read_all(b"*123456789012345678901"),
            Err(ProtocolError::LineTooLong)
        );
    }

    #[test]
    fn test_oversized_bulk_rejected() {
        let input = format!("*1\r\n${}\r\n", MAX_BULK_SIZE + 1);
        assert!(matches!(
            read_all(input.as_bytes()),
            Err(ProtocolError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_claimed_tracks_progress() {
        let mut reader = FrameReader::new();
        assert_eq!(reader.claimed(), 0);

        reader.feed(b"*3\r\n$3\r\nSET\r\n");
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.claimed(), 13);

        // A declared payload counts before its bytes arrive
        reader.feed(b"$100\r\nab");
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.claimed(), 13 + 6 + 100 + 2);
    }

    #[test]
    fn test_many_arguments_in_small_chunks() {
        let args: Vec<String> = (0..500).map(|i| format!("k{}", i)).collect();
        let mut input = format!("*{}\r\n", args.len()).into_bytes();
        for arg in &args {
            input.extend_from_slice(format!("${}\r\n{}\r\n", arg.len(), arg).as_bytes());
        }

        let mut reader = FrameReader::new();
        let mut frames = Vec::new();
        for chunk in input.chunks(3) {
            reader.feed(chunk);
            if let Some(frame) = reader.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 500);
        assert_eq!(frames[0][499], Bytes::from("k499"));
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.claimed(), 0);
    }

    #[test]
    fn test_error_after_resumed_progress() {
        let mut reader = FrameReader::new();
        reader.feed(b"*2\r\n$3\r\nGET\r\n");
        assert!(reader.next_frame().unwrap().is_none());

        reader.feed(b":1\r\n");
        assert_eq!(
            reader.next_frame(),
            Err(ProtocolError::UnexpectedByte {
                expected: '$',
                found: b':'
            })
        );
    }

    #[test]
    fn test_clear_resets_state() {
        let mut reader = FrameReader::new();
        reader.feed(b"*2\r\n$3\r\nGE");
        assert!(reader.next_frame().unwrap().is_none());
        reader.clear();
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.claimed(), 0);

        reader.feed(b"*1\r\n$4\r\nPING\r\n");
        assert!(reader.next_frame().unwrap().is_some());
    }
}
