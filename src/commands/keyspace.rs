//! Key-generic commands: DEL, EXISTS, TYPE, KEYS

use crate::commands::{Request, err_wrong_args};
use crate::protocol::Frame;
use crate::store::Store;

/// `DEL key [key ...]` — count of keys actually removed.
pub fn del(req: &Request, store: &mut Store) -> Frame {
    if req.arity() == 0 {
        return err_wrong_args("del");
    }
    let mut removed = 0;
    for i in 0..req.arity() {
        if store.remove(req.arg(i)) {
            removed += 1;
        }
    }
    Frame::Integer(removed)
}

/// `EXISTS key [key ...]` — count of keys present and unexpired.
pub fn exists(req: &Request, store: &mut Store) -> Frame {
    if req.arity() == 0 {
        return err_wrong_args("exists");
    }
    let mut found = 0;
    for i in 0..req.arity() {
        if store.exists(req.arg(i)) {
            found += 1;
        }
    }
    Frame::Integer(found)
}

/// `TYPE key`
pub fn key_type(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("type");
    }
    Frame::simple(store.type_name(req.arg(0)))
}

/// `KEYS pattern`
pub fn keys(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("keys");
    }
    let mut matched = store.keys(req.arg(0));
    matched.sort();
    Frame::Array(matched.into_iter().map(Frame::Bulk).collect())
}

/// `DBSIZE`
pub fn dbsize(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 0 {
        return err_wrong_args("dbsize");
    }
    Frame::Integer(store.len() as i64)
}
