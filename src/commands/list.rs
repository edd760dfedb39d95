//! List commands: LPUSH, RPUSH, LPOP, RPOP, LLEN, LRANGE, BLPOP

use std::sync::Arc;
use std::time::Duration;

use crate::blocking::Deadline;
use crate::commands::{Request, err_wrong_args, err_wrongtype, parse_i64};
use crate::protocol::Frame;
use crate::server::Shared;
use crate::store::{Store, normalize_range};

/// `LPUSH key value [value ...]` — each argument becomes the new head in
/// the order given, so the last argument ends up at the head.
pub fn lpush(req: &Request, store: &mut Store) -> Frame {
    push(req, store, true)
}

/// `RPUSH key value [value ...]`
pub fn rpush(req: &Request, store: &mut Store) -> Frame {
    push(req, store, false)
}

fn push(req: &Request, store: &mut Store, at_head: bool) -> Frame {
    if req.arity() < 2 {
        return err_wrong_args(if at_head { "lpush" } else { "rpush" });
    }
    let list = match store.list_entry(req.arg(0)) {
        Ok(list) => list,
        Err(_) => return err_wrongtype(),
    };
    for i in 1..req.arity() {
        if at_head {
            list.push_front(req.arg(i).to_vec());
        } else {
            list.push_back(req.arg(i).to_vec());
        }
    }
    Frame::Integer(list.len() as i64)
}

/// `LPOP key [count]`
pub fn lpop(req: &Request, store: &mut Store) -> Frame {
    pop(req, store, true)
}

/// `RPOP key [count]`
pub fn rpop(req: &Request, store: &mut Store) -> Frame {
    pop(req, store, false)
}

fn pop(req: &Request, store: &mut Store, from_head: bool) -> Frame {
    let name = if from_head { "lpop" } else { "rpop" };
    if req.arity() != 1 && req.arity() != 2 {
        return err_wrong_args(name);
    }
    let count = if req.arity() == 2 {
        match parse_i64(req.arg(1)) {
            Some(n) if n >= 0 => Some(n as usize),
            _ => return Frame::error("ERR value is out of range, must be positive"),
        }
    } else {
        None
    };

    let key = req.arg(0);
    let list = match store.list(key) {
        Ok(Some(list)) => list,
        Ok(None) => {
            return match count {
                None => Frame::NullBulk,
                Some(_) => Frame::NullArray,
            };
        }
        Err(_) => return err_wrongtype(),
    };

    let reply = match count {
        None => match take_one(list, from_head) {
            Some(value) => Frame::Bulk(value),
            None => Frame::NullBulk,
        },
        Some(count) => {
            let mut popped = Vec::new();
            while popped.len() < count {
                match take_one(list, from_head) {
                    Some(value) => popped.push(Frame::Bulk(value)),
                    None => break,
                }
            }
            Frame::Array(popped)
        }
    };
    store.drop_if_empty_list(key);
    reply
}

fn take_one(list: &mut std::collections::VecDeque<Vec<u8>>, from_head: bool) -> Option<Vec<u8>> {
    if from_head {
        list.pop_front()
    } else {
        list.pop_back()
    }
}

/// `LLEN key`
pub fn llen(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("llen");
    }
    match store.list(req.arg(0)) {
        Ok(Some(list)) => Frame::Integer(list.len() as i64),
        Ok(None) => Frame::Integer(0),
        Err(_) => err_wrongtype(),
    }
}

/// `LRANGE key start stop` — inclusive indices, Python-style negatives.
pub fn lrange(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 3 {
        return err_wrong_args("lrange");
    }
    let (Some(start), Some(stop)) = (parse_i64(req.arg(1)), parse_i64(req.arg(2))) else {
        return crate::commands::err_not_integer();
    };
    let list = match store.list(req.arg(0)) {
        Ok(Some(list)) => list,
        Ok(None) => return Frame::Array(vec![]),
        Err(_) => return err_wrongtype(),
    };
    match normalize_range(start, stop, list.len()) {
        Some((from, to)) => Frame::Array(
            list.iter()
                .skip(from)
                .take(to - from + 1)
                .map(|v| Frame::Bulk(v.clone()))
                .collect(),
        ),
        None => Frame::Array(vec![]),
    }
}

fn parse_blpop(req: &Request) -> Result<(Vec<Vec<u8>>, Duration), Frame> {
    if req.arity() < 2 {
        return Err(err_wrong_args("blpop"));
    }
    let keys: Vec<Vec<u8>> = (0..req.arity() - 1).map(|i| req.arg(i).to_vec()).collect();
    let timeout = match req.arg_str(req.arity() - 1).parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Ok(_) => return Err(Frame::error("ERR timeout is negative")),
        Err(_) => return Err(Frame::error("ERR timeout is not a float or out of range")),
    };
    Ok((keys, timeout))
}

/// Scan the keys left to right and pop the first non-empty list's head.
fn pop_first_available(store: &mut Store, keys: &[Vec<u8>]) -> Option<Frame> {
    for key in keys {
        if let Ok(Some(list)) = store.list(key)
            && let Some(value) = list.pop_front()
        {
            store.drop_if_empty_list(key);
            return Some(Frame::Array(vec![Frame::Bulk(key.clone()), Frame::Bulk(value)]));
        }
    }
    None
}

/// `BLPOP key [key ...] timeout`
///
/// Scans the keys left to right; if every list is empty, parks until a push
/// touches one of them or the deadline elapses. Waiters on the same key are
/// serviced oldest first.
pub async fn blpop(req: &Request, shared: &Arc<Shared>) -> Frame {
    let (keys, timeout) = match parse_blpop(req) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };
    let deadline = Deadline::after(timeout);

    // Register before the first scan: a push between scan and park would
    // otherwise be missed.
    let guard = shared.wakeups.register_list_waiter(&keys);
    loop {
        {
            let mut store = shared.store.lock().await;
            if let Some(reply) = pop_first_available(&mut store, &keys) {
                return reply;
            }
        }
        if deadline.expired() || !deadline.wait(&guard.notify).await {
            return Frame::NullArray;
        }
    }
}

/// `BLPOP` inside `EXEC`: the keyspace lock is already held, so the
/// deadline behaves as already expired and an empty scan is a null array.
pub fn blpop_immediate(req: &Request, store: &mut Store) -> Frame {
    let (keys, _) = match parse_blpop(req) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };
    pop_first_available(store, &keys).unwrap_or(Frame::NullArray)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(parts: &[&str]) -> Request {
        Request::new(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
    }

    fn frames(parts: &[&str]) -> Frame {
        Frame::Array(parts.iter().map(|p| Frame::bulk(*p)).collect())
    }

    #[test]
    fn lpush_order_puts_last_argument_at_head() {
        let mut store = Store::new();
        assert_eq!(
            lpush(&req(&["LPUSH", "k", "a", "b", "c"]), &mut store),
            Frame::Integer(3)
        );
        assert_eq!(
            lrange(&req(&["LRANGE", "k", "0", "-1"]), &mut store),
            frames(&["c", "b", "a"])
        );
    }

    #[test]
    fn rpush_keeps_argument_order() {
        let mut store = Store::new();
        rpush(&req(&["RPUSH", "k", "a", "b", "c"]), &mut store);
        assert_eq!(
            lrange(&req(&["LRANGE", "k", "0", "-1"]), &mut store),
            frames(&["a", "b", "c"])
        );
    }

    #[test]
    fn lpop_single_and_counted() {
        let mut store = Store::new();
        rpush(&req(&["RPUSH", "k", "a", "b", "c"]), &mut store);
        assert_eq!(lpop(&req(&["LPOP", "k"]), &mut store), Frame::bulk("a"));
        assert_eq!(
            lpop(&req(&["LPOP", "k", "5"]), &mut store),
            frames(&["b", "c"])
        );
        // List is gone once emptied.
        assert!(!store.exists(b"k"));
    }

    #[test]
    fn lpop_count_zero_and_negative() {
        let mut store = Store::new();
        rpush(&req(&["RPUSH", "k", "a"]), &mut store);
        assert_eq!(lpop(&req(&["LPOP", "k", "0"]), &mut store), Frame::Array(vec![]));
        assert!(matches!(
            lpop(&req(&["LPOP", "k", "-1"]), &mut store),
            Frame::Error(_)
        ));
    }

    #[test]
    fn lpop_missing_key() {
        let mut store = Store::new();
        assert_eq!(lpop(&req(&["LPOP", "no"]), &mut store), Frame::NullBulk);
        assert_eq!(lpop(&req(&["LPOP", "no", "2"]), &mut store), Frame::NullArray);
    }

    #[test]
    fn rpop_takes_from_tail() {
        let mut store = Store::new();
        rpush(&req(&["RPUSH", "k", "a", "b"]), &mut store);
        assert_eq!(rpop(&req(&["RPOP", "k"]), &mut store), Frame::bulk("b"));
    }

    #[test]
    fn llen_counts_or_zero() {
        let mut store = Store::new();
        assert_eq!(llen(&req(&["LLEN", "k"]), &mut store), Frame::Integer(0));
        rpush(&req(&["RPUSH", "k", "a", "b"]), &mut store);
        assert_eq!(llen(&req(&["LLEN", "k"]), &mut store), Frame::Integer(2));
    }

    #[test]
    fn lrange_normalizes_indices() {
        let mut store = Store::new();
        rpush(&req(&["RPUSH", "k", "a", "b", "c", "d"]), &mut store);
        assert_eq!(
            lrange(&req(&["LRANGE", "k", "-2", "-1"]), &mut store),
            frames(&["c", "d"])
        );
        assert_eq!(
            lrange(&req(&["LRANGE", "k", "1", "100"]), &mut store),
            frames(&["b", "c", "d"])
        );
        assert_eq!(
            lrange(&req(&["LRANGE", "k", "3", "1"]), &mut store),
            Frame::Array(vec![])
        );
    }

    #[test]
    fn blpop_immediate_pops_or_nulls() {
        let mut store = Store::new();
        assert_eq!(
            blpop_immediate(&req(&["BLPOP", "q", "5"]), &mut store),
            Frame::NullArray
        );
        rpush(&req(&["RPUSH", "q", "a"]), &mut store);
        assert_eq!(
            blpop_immediate(&req(&["BLPOP", "other", "q", "5"]), &mut store),
            frames(&["q", "a"])
        );
        assert!(!store.exists(b"q"));
    }

    #[test]
    fn blpop_rejects_bad_timeouts() {
        let mut store = Store::new();
        assert!(matches!(
            blpop_immediate(&req(&["BLPOP", "q", "-1"]), &mut store),
            Frame::Error(_)
        ));
        assert!(matches!(
            blpop_immediate(&req(&["BLPOP", "q", "soon"]), &mut store),
            Frame::Error(_)
        ));
    }

    #[test]
    fn wrongtype_on_string_key() {
        let mut store = Store::new();
        store.insert(b"s".to_vec(), crate::store::value::Value::Str(b"v".to_vec()), 0);
        for reply in [
            lpush(&req(&["LPUSH", "s", "x"]), &mut store),
            lpop(&req(&["LPOP", "s"]), &mut store),
            llen(&req(&["LLEN", "s"]), &mut store),
            lrange(&req(&["LRANGE", "s", "0", "-1"]), &mut store),
        ] {
            assert!(matches!(reply, Frame::Error(m) if m.starts_with("WRONGTYPE")));
        }
    }
}
