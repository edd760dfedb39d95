//! RESP frame model and serializer
//!
//! A `Frame` is one value on the wire: simple string, error, integer, bulk
//! string, or array, plus the two distinct nil encodings and a sentinel for
//! handlers that have already written to the socket themselves. Serialization
//! is byte-exact: every reply the server emits goes through `encode`.

/// A single RESP protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+...\r\n`
    Simple(String),
    /// `-...\r\n`
    Error(String),
    /// `:<n>\r\n`
    Integer(i64),
    /// `$<len>\r\n<bytes>\r\n`
    Bulk(Vec<u8>),
    /// `$-1\r\n` — "missing value" nil
    NullBulk,
    /// `*<n>\r\n<elements>`
    Array(Vec<Frame>),
    /// `*-1\r\n` — nil reply for timed-out blocking reads
    NullArray,
    /// No bytes are written; the handler replied on the socket directly
    NoResponse,
}

impl Frame {
    /// Simple string reply.
    pub fn simple<S: Into<String>>(s: S) -> Self {
        Frame::Simple(s.into())
    }

    /// Error reply; `msg` carries its prefix (`ERR ...`, `WRONGTYPE ...`).
    pub fn error<S: Into<String>>(msg: S) -> Self {
        Frame::Error(msg.into())
    }

    /// Bulk string reply from any byte source.
    pub fn bulk<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Frame::Bulk(bytes.into())
    }

    /// The `+OK` reply.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// Serialize to a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Serialize, appending to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                out.push(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Frame::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(out);
                }
            }
            Frame::NullArray => out.extend_from_slice(b"*-1\r\n"),
            Frame::NoResponse => {}
        }
    }

    /// Borrow the payload of a bulk string frame.
    pub fn as_bulk(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(data) => Some(data),
            _ => None,
        }
    }

    /// Serialize a client request (array of bulk strings) from raw argument
    /// byte vectors. This is the exact framing used for replication
    /// propagation and the replica-side handshake.
    pub fn command(args: &[Vec<u8>]) -> Self {
        Frame::Array(args.iter().map(|a| Frame::Bulk(a.clone())).collect())
    }
}
