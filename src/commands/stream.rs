//! Stream commands: XADD, XRANGE, XLEN, XREAD

use std::sync::Arc;
use std::time::Duration;

use crate::blocking::Deadline;
use crate::commands::{Request, err_wrong_args, err_wrongtype, parse_i64};
use crate::protocol::Frame;
use crate::server::Shared;
use crate::store::Store;
use crate::store::stream::{IdSpec, RangeBound, StreamAddError, StreamEntry, StreamId};
use crate::utils::now_ms;

const ERR_INVALID_ID: &str = "ERR Invalid stream ID specified as stream command argument";

/// `XADD key id field value [field value ...]`
pub fn xadd(req: &Request, store: &mut Store) -> Frame {
    if req.arity() < 4 || (req.arity() - 2) % 2 != 0 {
        return err_wrong_args("xadd");
    }
    let Some(spec) = IdSpec::parse(&req.arg_str(1)) else {
        return Frame::error(ERR_INVALID_ID);
    };
    let fields: Vec<(Vec<u8>, Vec<u8>)> = (2..req.arity())
        .step_by(2)
        .map(|i| (req.arg(i).to_vec(), req.arg(i + 1).to_vec()))
        .collect();

    let stream = match store.stream_entry(req.arg(0)) {
        Ok(stream) => stream,
        Err(_) => return err_wrongtype(),
    };
    match stream.add(spec, fields, now_ms()) {
        Ok(id) => Frame::bulk(id.to_string()),
        Err(StreamAddError::IdIsZero) => {
            Frame::error("ERR The ID specified in XADD must be greater than 0-0")
        }
        Err(StreamAddError::IdNotGreater) => Frame::error(
            "ERR The ID specified in XADD is equal or smaller than the target stream top item",
        ),
    }
}

/// `XRANGE key start end` — inclusive, with `-`/`+` sentinels.
pub fn xrange(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 3 {
        return err_wrong_args("xrange");
    }
    let (Some(start), Some(end)) = (
        RangeBound::parse(&req.arg_str(1), true),
        RangeBound::parse(&req.arg_str(2), false),
    ) else {
        return Frame::error(ERR_INVALID_ID);
    };
    let stream = match store.stream(req.arg(0)) {
        Ok(Some(stream)) => stream,
        Ok(None) => return Frame::Array(vec![]),
        Err(_) => return err_wrongtype(),
    };
    Frame::Array(stream.range(start, end).iter().map(entry_frame).collect())
}

/// `XLEN key`
pub fn xlen(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("xlen");
    }
    match store.stream(req.arg(0)) {
        Ok(Some(stream)) => Frame::Integer(stream.len() as i64),
        Ok(None) => Frame::Integer(0),
        Err(_) => err_wrongtype(),
    }
}

struct XreadArgs {
    block_ms: Option<u64>,
    keys: Vec<Vec<u8>>,
    raw_ids: Vec<String>,
}

fn parse_xread(req: &Request) -> Result<XreadArgs, Frame> {
    let mut idx = 0;
    let mut block_ms: Option<u64> = None;
    if req.arity() > idx && req.arg(idx).eq_ignore_ascii_case(b"BLOCK") {
        if req.arity() < idx + 2 {
            return Err(Frame::error("ERR syntax error"));
        }
        match parse_i64(req.arg(idx + 1)) {
            Some(ms) if ms >= 0 => block_ms = Some(ms as u64),
            _ => return Err(Frame::error("ERR timeout is not an integer or out of range")),
        }
        idx += 2;
    }
    if req.arity() <= idx || !req.arg(idx).eq_ignore_ascii_case(b"STREAMS") {
        return Err(Frame::error("ERR syntax error"));
    }
    idx += 1;
    let rest = req.arity() - idx;
    if rest == 0 || rest % 2 != 0 {
        return Err(Frame::error(
            "ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified",
        ));
    }
    let half = rest / 2;
    Ok(XreadArgs {
        block_ms,
        keys: (0..half).map(|i| req.arg(idx + i).to_vec()).collect(),
        raw_ids: (0..half).map(|i| req.arg_str(idx + half + i)).collect(),
    })
}

/// Resolve `$` against the current last IDs at command entry.
fn resolve_cursors(
    store: &mut Store,
    keys: &[Vec<u8>],
    raw_ids: &[String],
) -> Result<Vec<StreamId>, Frame> {
    let mut after = Vec::with_capacity(keys.len());
    for (key, raw) in keys.iter().zip(raw_ids) {
        let id = if raw == "$" {
            match store.stream(key) {
                Ok(Some(stream)) => stream.last_id(),
                Ok(None) => StreamId::ZERO,
                Err(_) => return Err(err_wrongtype()),
            }
        } else {
            match StreamId::parse(raw) {
                Some(id) => id,
                None => return Err(Frame::error(ERR_INVALID_ID)),
            }
        };
        after.push(id);
    }
    Ok(after)
}

/// `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`
///
/// Returns entries strictly after the given IDs. `$` resolves to each
/// stream's last ID at command entry, so with `BLOCK` it waits for entries
/// appended after arrival.
pub async fn xread(req: &Request, shared: &Arc<Shared>) -> Frame {
    let XreadArgs {
        block_ms,
        keys,
        raw_ids,
    } = match parse_xread(req) {
        Ok(args) => args,
        Err(reply) => return reply,
    };

    let after = {
        let mut store = shared.store.lock().await;
        let after = match resolve_cursors(&mut store, &keys, &raw_ids) {
            Ok(after) => after,
            Err(reply) => return reply,
        };
        if let Some(reply) = collect_batches(&mut store, &keys, &after) {
            return reply;
        }
        after
    };

    let Some(block_ms) = block_ms else {
        return Frame::NullArray;
    };
    let deadline = Deadline::after(Duration::from_millis(block_ms));

    loop {
        // Stream registrations are one-shot; renew before every re-check.
        let notify = shared.wakeups.register_stream_waiter(&keys);
        let batch = {
            let mut store = shared.store.lock().await;
            collect_batches(&mut store, &keys, &after)
        };
        if let Some(reply) = batch {
            shared.wakeups.deregister_stream_waiter(&keys, &notify);
            return reply;
        }
        if deadline.expired() || !deadline.wait(&notify).await {
            shared.wakeups.deregister_stream_waiter(&keys, &notify);
            return Frame::NullArray;
        }
        shared.wakeups.deregister_stream_waiter(&keys, &notify);
    }
}

/// `XREAD` inside `EXEC`: the keyspace lock is already held, so any
/// `BLOCK` option behaves as already timed out when nothing is ready.
pub fn xread_immediate(req: &Request, store: &mut Store) -> Frame {
    let XreadArgs { keys, raw_ids, .. } = match parse_xread(req) {
        Ok(args) => args,
        Err(reply) => return reply,
    };
    let after = match resolve_cursors(store, &keys, &raw_ids) {
        Ok(after) => after,
        Err(reply) => return reply,
    };
    collect_batches(store, &keys, &after).unwrap_or(Frame::NullArray)
}

/// Entries after the per-key cursor, or `None` when every stream is quiet.
fn collect_batches(store: &mut Store, keys: &[Vec<u8>], after: &[StreamId]) -> Option<Frame> {
    let mut batches = Vec::new();
    for (key, cursor) in keys.iter().zip(after) {
        if let Ok(Some(stream)) = store.stream(key) {
            let entries = stream.entries_after(*cursor);
            if !entries.is_empty() {
                batches.push(Frame::Array(vec![
                    Frame::Bulk(key.clone()),
                    Frame::Array(entries.iter().map(entry_frame).collect()),
                ]));
            }
        }
    }
    if batches.is_empty() {
        None
    } else {
        Some(Frame::Array(batches))
    }
}

/// `[id, [f1, v1, f2, v2, ...]]`
fn entry_frame(entry: &StreamEntry) -> Frame {
    let mut flat = Vec::with_capacity(entry.fields.len() * 2);
    for (field, value) in &entry.fields {
        flat.push(Frame::Bulk(field.clone()));
        flat.push(Frame::Bulk(value.clone()));
    }
    Frame::Array(vec![
        Frame::bulk(entry.id.to_string()),
        Frame::Array(flat),
    ])
}
