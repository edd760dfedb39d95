//! Append-only stream values
//!
//! A stream is an ordered sequence of entries, each carrying a `(ms, seq)`
//! identifier and a list of field/value pairs. Entry IDs are strictly
//! increasing; `0-0` is reserved and never stored.

use std::fmt;

/// A stream entry identifier, ordered by `ms` first, then `seq`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    /// Parse a fully explicit `<ms>-<seq>` ID; a bare `<ms>` reads as
    /// `<ms>-0`.
    pub fn parse(text: &str) -> Option<StreamId> {
        match text.split_once('-') {
            Some((ms, seq)) => Some(StreamId {
                ms: ms.parse().ok()?,
                seq: seq.parse().ok()?,
            }),
            None => Some(StreamId {
                ms: text.parse().ok()?,
                seq: 0,
            }),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// How an `XADD` names its entry: fully explicit, `<ms>-*`, or `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*` — both parts auto-generated from the wall clock
    Auto,
    /// `<ms>-*` — sequence auto-generated against the given millisecond
    AutoSeq(u64),
    /// `<ms>-<seq>` — fully explicit
    Explicit(StreamId),
}

impl IdSpec {
    pub fn parse(text: &str) -> Option<IdSpec> {
        if text == "*" {
            return Some(IdSpec::Auto);
        }
        if let Some((ms, seq)) = text.split_once('-')
            && seq == "*"
        {
            return Some(IdSpec::AutoSeq(ms.parse().ok()?));
        }
        StreamId::parse(text).map(IdSpec::Explicit)
    }
}

/// An inclusive `XRANGE` bound: `-`, `+`, or an ID. A bare `<ms>` resolves
/// to seq 0 at the start of a range and to the maximum sequence at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Min,
    Max,
    Id(StreamId),
}

impl RangeBound {
    pub fn parse(text: &str, is_start: bool) -> Option<RangeBound> {
        match text {
            "-" => Some(RangeBound::Min),
            "+" => Some(RangeBound::Max),
            _ => match text.split_once('-') {
                Some(_) => StreamId::parse(text).map(RangeBound::Id),
                None => {
                    let ms: u64 = text.parse().ok()?;
                    let seq = if is_start { 0 } else { u64::MAX };
                    Some(RangeBound::Id(StreamId { ms, seq }))
                }
            },
        }
    }

    fn resolve(&self) -> StreamId {
        match self {
            RangeBound::Min => StreamId::ZERO,
            RangeBound::Max => StreamId::MAX,
            RangeBound::Id(id) => *id,
        }
    }
}

/// Why an `XADD` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAddError {
    /// The reserved `0-0` was given explicitly
    IdIsZero,
    /// The resolved ID does not exceed the stream's last entry
    IdNotGreater,
}

/// One stream entry: ID plus field/value pairs in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

/// An append-only stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The highest ID ever stored (`0-0` while the stream is empty).
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Append an entry, resolving `*` / `<ms>-*` against `now_ms` and the
    /// current last ID.
    pub fn add(
        &mut self,
        spec: IdSpec,
        fields: Vec<(Vec<u8>, Vec<u8>)>,
        now_ms: u64,
    ) -> Result<StreamId, StreamAddError> {
        let id = match spec {
            IdSpec::Auto => StreamId {
                ms: now_ms,
                seq: self.next_seq(now_ms),
            },
            IdSpec::AutoSeq(ms) => StreamId {
                ms,
                seq: self.next_seq(ms),
            },
            IdSpec::Explicit(id) => id,
        };

        if id == StreamId::ZERO {
            return Err(StreamAddError::IdIsZero);
        }
        if id <= self.last_id {
            return Err(StreamAddError::IdNotGreater);
        }

        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Sequence an auto-generated ID takes within millisecond `ms`: zero
    /// unless the last entry shares the millisecond.
    fn next_seq(&self, ms: u64) -> u64 {
        if !self.entries.is_empty() && self.last_id.ms == ms {
            self.last_id.seq + 1
        } else if ms == 0 {
            // 0-0 is reserved; an auto ID inside millisecond 0 starts at 0-1.
            1
        } else {
            0
        }
    }

    /// Entries with IDs in the inclusive `[start, end]` range.
    pub fn range(&self, start: RangeBound, end: RangeBound) -> &[StreamEntry] {
        let lo = start.resolve();
        let hi = end.resolve();
        if lo > hi {
            return &[];
        }
        let from = self.entries.partition_point(|e| e.id < lo);
        let to = self.entries.partition_point(|e| e.id <= hi);
        &self.entries[from..to]
    }

    /// Entries with IDs strictly greater than `after` (the `XREAD` contract).
    pub fn entries_after(&self, after: StreamId) -> &[StreamEntry] {
        let from = self.entries.partition_point(|e| e.id <= after);
        &self.entries[from..]
    }
}
