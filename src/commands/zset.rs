//! Sorted-set commands: ZADD, ZREM, ZCARD, ZRANK, ZSCORE, ZRANGE

use crate::commands::{Request, err_not_float, err_wrong_args, err_wrongtype, parse_f64, parse_i64};
use crate::protocol::Frame;
use crate::store::{Store, normalize_range};
use crate::store::zset::format_score;

/// `ZADD key score member [score member ...]` — counts only newly added
/// members; score updates do not count.
pub fn zadd(req: &Request, store: &mut Store) -> Frame {
    if req.arity() < 3 || (req.arity() - 1) % 2 != 0 {
        return err_wrong_args("zadd");
    }
    let mut pairs = Vec::new();
    for i in (1..req.arity()).step_by(2) {
        let Some(score) = parse_f64(req.arg(i)) else {
            return err_not_float();
        };
        pairs.push((score, req.arg(i + 1).to_vec()));
    }
    let zset = match store.zset_entry(req.arg(0)) {
        Ok(zset) => zset,
        Err(_) => return err_wrongtype(),
    };
    let mut added = 0;
    for (score, member) in pairs {
        if zset.insert(member, score) {
            added += 1;
        }
    }
    Frame::Integer(added)
}

/// `ZREM key member [member ...]`
pub fn zrem(req: &Request, store: &mut Store) -> Frame {
    if req.arity() < 2 {
        return err_wrong_args("zrem");
    }
    let key = req.arg(0);
    let zset = match store.get_mut(key) {
        Some(crate::store::value::Value::SortedSet(zset)) => zset,
        Some(_) => return err_wrongtype(),
        None => return Frame::Integer(0),
    };
    let mut removed = 0;
    for i in 1..req.arity() {
        if zset.remove(req.arg(i)) {
            removed += 1;
        }
    }
    store.drop_if_empty_zset(key);
    Frame::Integer(removed)
}

/// `ZCARD key`
pub fn zcard(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("zcard");
    }
    match store.zset(req.arg(0)) {
        Ok(Some(zset)) => Frame::Integer(zset.len() as i64),
        Ok(None) => Frame::Integer(0),
        Err(_) => err_wrongtype(),
    }
}

/// `ZRANK key member` — 0-based position in (score asc, member asc) order.
pub fn zrank(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 2 {
        return err_wrong_args("zrank");
    }
    match store.zset(req.arg(0)) {
        Ok(Some(zset)) => match zset.rank(req.arg(1)) {
            Some(rank) => Frame::Integer(rank as i64),
            None => Frame::NullBulk,
        },
        Ok(None) => Frame::NullBulk,
        Err(_) => err_wrongtype(),
    }
}

/// `ZSCORE key member`
pub fn zscore(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 2 {
        return err_wrong_args("zscore");
    }
    match store.zset(req.arg(0)) {
        Ok(Some(zset)) => match zset.score(req.arg(1)) {
            Some(score) => Frame::bulk(format_score(score)),
            None => Frame::NullBulk,
        },
        Ok(None) => Frame::NullBulk,
        Err(_) => err_wrongtype(),
    }
}

/// `ZRANGE key start stop [WITHSCORES]` — index range with negatives.
pub fn zrange(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 3 && req.arity() != 4 {
        return err_wrong_args("zrange");
    }
    let with_scores = if req.arity() == 4 {
        if !req.arg(3).eq_ignore_ascii_case(b"WITHSCORES") {
            return Frame::error("ERR syntax error");
        }
        true
    } else {
        false
    };
    let (Some(start), Some(stop)) = (parse_i64(req.arg(1)), parse_i64(req.arg(2))) else {
        return crate::commands::err_not_integer();
    };
    let zset = match store.zset(req.arg(0)) {
        Ok(Some(zset)) => zset,
        Ok(None) => return Frame::Array(vec![]),
        Err(_) => return err_wrongtype(),
    };
    let Some((from, to)) = normalize_range(start, stop, zset.len()) else {
        return Frame::Array(vec![]);
    };
    let mut items = Vec::new();
    for (member, score) in zset.range(from, to) {
        items.push(Frame::Bulk(member.to_vec()));
        if with_scores {
            items.push(Frame::bulk(format_score(score)));
        }
    }
    Frame::Array(items)
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
    fn zadd_counts_only_new_members() {
        let mut store = Store::new();
        assert_eq!(
            zadd(&req(&["ZADD", "z", "1", "a", "2", "b"]), &mut store),
            Frame::Integer(2)
        );
        // Update existing + add one new.
        assert_eq!(
            zadd(&req(&["ZADD", "z", "5", "a", "3", "c"]), &mut store),
            Frame::Integer(1)
        );
        assert_eq!(zcard(&req(&["ZCARD", "z"]), &mut store), Frame::Integer(3));
    }

    #[test]
    fn zrange_sorts_by_score_then_member() {
        let mut store = Store::new();
        zadd(&req(&["ZADD", "z", "1", "a", "1", "b", "2", "c"]), &mut store);
        assert_eq!(
            zrange(&req(&["ZRANGE", "z", "0", "-1"]), &mut store),
            frames(&["a", "b", "c"])
        );
        assert_eq!(zrank(&req(&["ZRANK", "z", "b"]), &mut store), Frame::Integer(1));
        assert_eq!(zscore(&req(&["ZSCORE", "z", "c"]), &mut store), Frame::bulk("2"));
    }

    #[test]
    fn zrange_withscores_interleaves() {
        let mut store = Store::new();
        zadd(&req(&["ZADD", "z", "1.5", "a", "2", "b"]), &mut store);
        assert_eq!(
            zrange(&req(&["ZRANGE", "z", "0", "-1", "WITHSCORES"]), &mut store),
            frames(&["a", "1.5", "b", "2"])
        );
    }

    #[test]
    fn zrange_handles_negatives_and_empties() {
        let mut store = Store::new();
        zadd(&req(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]), &mut store);
        assert_eq!(
            zrange(&req(&["ZRANGE", "z", "-2", "-1"]), &mut store),
            frames(&["b", "c"])
        );
        assert_eq!(
            zrange(&req(&["ZRANGE", "z", "5", "9"]), &mut store),
            Frame::Array(vec![])
        );
        assert_eq!(
            zrange(&req(&["ZRANGE", "missing", "0", "-1"]), &mut store),
            Frame::Array(vec![])
        );
    }

    #[test]
    fn zrem_removes_and_drops_empty_key() {
        let mut store = Store::new();
        zadd(&req(&["ZADD", "z", "1", "a", "2", "b"]), &mut store);
        assert_eq!(
            zrem(&req(&["ZREM", "z", "a", "missing"]), &mut store),
            Frame::Integer(1)
        );
        assert_eq!(zrem(&req(&["ZREM", "z", "b"]), &mut store), Frame::Integer(1));
        assert!(!store.exists(b"z"));
        assert_eq!(zrem(&req(&["ZREM", "z", "x"]), &mut store), Frame::Integer(0));
    }

    #[test]
    fn missing_member_lookups_are_null() {
        let mut store = Store::new();
        zadd(&req(&["ZADD", "z", "1", "a"]), &mut store);
        assert_eq!(zrank(&req(&["ZRANK", "z", "no"]), &mut store), Frame::NullBulk);
        assert_eq!(zscore(&req(&["ZSCORE", "z", "no"]), &mut store), Frame::NullBulk);
        assert_eq!(zrank(&req(&["ZRANK", "nokey", "m"]), &mut store), Frame::NullBulk);
    }

    #[test]
    fn zadd_rejects_bad_scores() {
        let mut store = Store::new();
        assert_eq!(
            zadd(&req(&["ZADD", "z", "high", "a"]), &mut store),
            err_not_float()
        );
    }

    #[test]
    fn wrongtype_against_string_key() {
        let mut store = Store::new();
        store.insert(b"s".to_vec(), crate::store::value::Value::Str(b"v".to_vec()), 0);
        assert!(matches!(
            zadd(&req(&["ZADD", "s", "1", "a"]), &mut store),
            Frame::Error(m) if m.starts_with("WRONGTYPE")
        ));
        assert!(matches!(
            zcard(&req(&["ZCARD", "s"]), &mut store),
            Frame::Error(m) if m.starts_with("WRONGTYPE")
        ));
    }
}
