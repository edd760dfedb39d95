//! String commands: SET, GET, INCR

use crate::commands::{Request, err_not_integer, err_wrong_args, err_wrongtype, parse_i64};
use crate::protocol::Frame;
use crate::store::Store;
use crate::store::value::Value;
use crate::utils::now_ms;

/// `SET key value [PX ms]`
pub fn set(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 2 && req.arity() != 4 {
        return err_wrong_args("set");
    }
    let mut expires_at_ms = 0;
    if req.arity() == 4 {
        if !req.arg(2).eq_ignore_ascii_case(b"PX") {
            return Frame::error("ERR syntax error");
        }
        match parse_i64(req.arg(3)) {
            Some(ms) if ms > 0 => expires_at_ms = now_ms() + ms as u64,
            _ => return err_not_integer(),
        }
    }
    store.insert(
        req.arg(0).to_vec(),
        Value::Str(req.arg(1).to_vec()),
        expires_at_ms,
    );
    Frame::ok()
}

/// `GET key`
pub fn get(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("get");
    }
    match store.get_string(req.arg(0)) {
        Ok(Some(value)) => Frame::Bulk(value.clone()),
        Ok(None) => Frame::NullBulk,
        Err(_) => err_wrongtype(),
    }
}

/// `INCR key` — missing keys count up from zero; anything that does not
/// parse as a signed 64-bit decimal is "not an integer".
pub fn incr(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("incr");
    }
    let key = req.arg(0);
    let current = match store.get(key) {
        None => 0,
        Some(Value::Str(s)) => match parse_i64(s) {
            Some(n) => n,
            None => return err_not_integer(),
        },
        Some(_) => return err_not_integer(),
    };
    let Some(next) = current.checked_add(1) else {
        return err_not_integer();
    };
    // Preserve an existing deadline: INCR mutates the value in place.
    match store.get_mut(key) {
        Some(Value::Str(s)) => *s = next.to_string().into_bytes(),
        _ => store.insert(key.to_vec(), Value::Str(next.to_string().into_bytes()), 0),
    }
    Frame::Integer(next)
}
