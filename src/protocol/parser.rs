//! Incremental RESP request parser
//!
//! The parser reads from a partially-filled accumulator: given the bytes
//! received so far it either yields one complete frame and the number of
//! bytes it consumed, or reports that more input is needed. Remaining bytes
//! stay buffered for the next read. Malformed input is a hard protocol
//! error; the connection is closed.
//!
//! Clients normally send arrays of bulk strings, but plain text terminated
//! by `\r\n` (inline commands) is accepted for telnet-style interaction.

use crate::errors::{ServerError, ServerResult};
use crate::protocol::frame::Frame;

/// Upper bound on a single bulk string payload (512 MB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Upper bound on the element count of one array.
const MAX_ARRAY_LEN: i64 = 1024 * 1024;
/// Upper bound on one `\r\n`-terminated header or inline line.
const MAX_LINE_LEN: usize = 64 * 1024;
/// Arrays nested deeper than this are rejected.
const MAX_DEPTH: usize = 32;

/// Outcome of one parse attempt over the accumulator.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    /// One complete frame; `consumed` bytes should be drained.
    Complete { frame: Frame, consumed: usize },
    /// The buffer holds only a prefix of a frame; read more bytes.
    Incomplete,
}

/// Try to parse one request frame from the front of `buf`.
pub fn parse_request(buf: &[u8]) -> ServerResult<Parsed> {
    if buf.is_empty() {
        return Ok(Parsed::Incomplete);
    }
    let mut reader = SliceReader::new(buf);
    let frame = match buf[0] {
        b'*' | b'$' | b'+' | b'-' | b':' => parse_value(&mut reader, 0)?,
        _ => parse_inline(&mut reader)?,
    };
    match frame {
        Some(frame) => Ok(Parsed::Complete {
            frame,
            consumed: reader.position(),
        }),
        None => Ok(Parsed::Incomplete),
    }
}

fn parse_value(reader: &mut SliceReader, depth: usize) -> ServerResult<Option<Frame>> {
    if depth > MAX_DEPTH {
        return Err(ServerError::protocol("nesting too deep"));
    }
    let Some(marker) = reader.read_byte() else {
        return Ok(None);
    };
    match marker {
        b'+' => {
            let Some(line) = reader.read_line()? else {
                return Ok(None);
            };
            Ok(Some(Frame::Simple(
                String::from_utf8_lossy(line).into_owned(),
            )))
        }
        b'-' => {
            let Some(line) = reader.read_line()? else {
                return Ok(None);
            };
            Ok(Some(Frame::Error(
                String::from_utf8_lossy(line).into_owned(),
            )))
        }
        b':' => {
            let Some(line) = reader.read_line()? else {
                return Ok(None);
            };
            Ok(Some(Frame::Integer(parse_decimal(line)?)))
        }
        b'$' => {
            let Some(line) = reader.read_line()? else {
                return Ok(None);
            };
            let len = parse_decimal(line)?;
            if len == -1 {
                return Ok(Some(Frame::NullBulk));
            }
            if len < 0 {
                return Err(ServerError::protocol(format!(
                    "invalid bulk length: {}",
                    len
                )));
            }
            if len > MAX_BULK_LEN {
                return Err(ServerError::protocol("bulk length exceeds limit"));
            }
            let Some(data) = reader.read_exact(len as usize) else {
                return Ok(None);
            };
            let data = data.to_vec();
            // The payload must be followed by its own CRLF.
            let Some(term) = reader.read_exact(2) else {
                return Ok(None);
            };
            if term != b"\r\n" {
                return Err(ServerError::protocol("bulk string not CRLF-terminated"));
            }
            Ok(Some(Frame::Bulk(data)))
        }
        b'*' => {
            let Some(line) = reader.read_line()? else {
                return Ok(None);
            };
            let len = parse_decimal(line)?;
            if len == -1 {
                return Ok(Some(Frame::NullArray));
            }
            if len < 0 {
                return Err(ServerError::protocol(format!(
                    "invalid array length: {}",
                    len
                )));
            }
            if len > MAX_ARRAY_LEN {
                return Err(ServerError::protocol("array length exceeds limit"));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse_value(reader, depth + 1)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(items)))
        }
        other => Err(ServerError::protocol(format!(
            "unexpected byte {:#04x} at frame start",
            other
        ))),
    }
}

/// Whitespace-separated plain text terminated by CRLF. An empty line parses
/// to an empty array, which the dispatcher ignores.
fn parse_inline(reader: &mut SliceReader) -> ServerResult<Option<Frame>> {
    let Some(line) = reader.read_line()? else {
        return Ok(None);
    };
    let items = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| Frame::Bulk(part.to_vec()))
        .collect();
    Ok(Some(Frame::Array(items)))
}

fn parse_decimal(line: &[u8]) -> ServerResult<i64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ServerError::protocol("non-ASCII length header"))?;
    text.parse::<i64>()
        .map_err(|_| ServerError::protocol(format!("invalid integer header: {:?}", text)))
}

/// A position-tracked reader over the accumulator slice.
///
/// `None` returns mean "not enough bytes yet"; the caller surfaces them as
/// `Parsed::Incomplete` and no bytes are consumed from the accumulator.
struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_exact(&mut self, count: usize) -> Option<&'a [u8]> {
        if self.buf.len() - self.pos < count {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Some(slice)
    }

    /// Read up to the next CRLF, consuming it; the CRLF is not returned.
    fn read_line(&mut self) -> ServerResult<Option<&'a [u8]>> {
        let rest = &self.buf[self.pos..];
        let limit = rest.len().min(MAX_LINE_LEN + 2);
        for i in 0..limit {
            if rest[i] == b'\n' {
                if i == 0 || rest[i - 1] != b'\r' {
                    return Err(ServerError::protocol("line feed without carriage return"));
                }
                let line = &rest[..i - 1];
                self.pos += i + 1;
                return Ok(Some(line));
            }
        }
        if rest.len() > MAX_LINE_LEN {
            return Err(ServerError::protocol("header line exceeds limit"));
        }
        Ok(None)
    }
}
