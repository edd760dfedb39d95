//! Command parsing and dispatch
//!
//! A client request is an array of bulk strings; `Request` keeps the raw
//! argument bytes so transactions can queue commands verbatim and the
//! replication path can re-serialize them exactly as received. The
//! dispatcher uppercases the command name, enforces the subscribed-mode
//! allowlist and transaction queueing, and routes to the handler modules.
//!
//! Pure keyspace commands run through `execute_data_command` against an
//! already-locked `Store`, so the same code path serves normal dispatch,
//! `EXEC`, and the replica apply loop.

pub mod geo;
pub mod keyspace;
pub mod list;
pub mod pubsub;
pub mod server;
pub mod stream;
pub mod string;
pub mod txn;
pub mod zset;

use std::sync::Arc;

use crate::connection::ConnState;
use crate::errors::{ServerError, ServerResult};
use crate::protocol::Frame;
use crate::replication::Role;
use crate::replication::master;
use crate::server::Shared;
use crate::store::Store;

/// One parsed client request: the raw argument byte strings, command name
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub args: Vec<Vec<u8>>,
}

impl Request {
    pub fn new(args: Vec<Vec<u8>>) -> Self {
        Self { args }
    }

    /// Build a request from a parsed frame. Returns `Ok(None)` for an empty
    /// array (blank inline line), which the connection loop skips.
    pub fn from_frame(frame: Frame) -> ServerResult<Option<Request>> {
        let items = match frame {
            Frame::Array(items) => items,
            _ => {
                return Err(ServerError::protocol(
                    "request must be an array of bulk strings",
                ));
            }
        };
        if items.is_empty() {
            return Ok(None);
        }
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Frame::Bulk(data) => args.push(data),
                Frame::Simple(s) => args.push(s.into_bytes()),
                _ => {
                    return Err(ServerError::protocol(
                        "request arguments must be bulk strings",
                    ));
                }
            }
        }
        Ok(Some(Request { args }))
    }

    /// Uppercased command name.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_uppercase()
    }

    /// Number of arguments after the command name.
    pub fn arity(&self) -> usize {
        self.args.len() - 1
    }

    /// The i-th argument after the command name.
    pub fn arg(&self, i: usize) -> &[u8] {
        &self.args[i + 1]
    }

    /// The i-th argument as lossy UTF-8.
    pub fn arg_str(&self, i: usize) -> String {
        String::from_utf8_lossy(self.arg(i)).into_owned()
    }

    /// Serialize back to the client wire form (array of bulk strings).
    pub fn encode(&self) -> Vec<u8> {
        Frame::command(&self.args).encode()
    }
}

/// Commands a connection in subscribed mode may still run.
const SUBSCRIBED_MODE_ALLOWED: &[&str] = &[
    "SUBSCRIBE",
    "UNSUBSCRIBE",
    "PSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PING",
    "QUIT",
    "RESET",
];

/// The fixed set of commands mirrored to replicas.
pub fn is_write_command(name: &str) -> bool {
    matches!(
        name,
        "SET" | "DEL" | "INCR" | "LPUSH" | "RPUSH" | "LPOP" | "XADD" | "ZADD" | "ZREM" | "GEOADD"
    )
}

pub(crate) fn is_data_command(name: &str) -> bool {
    matches!(
        name,
        "SET" | "GET" | "INCR" | "DEL" | "EXISTS" | "TYPE" | "KEYS" | "DBSIZE" | "LPUSH"
            | "RPUSH" | "LPOP" | "RPOP" | "LLEN" | "LRANGE" | "XADD" | "XRANGE" | "XLEN" | "ZADD"
            | "ZREM" | "ZCARD" | "ZRANK" | "ZSCORE" | "ZRANGE" | "GEOADD" | "GEOPOS" | "GEODIST"
            | "GEOSEARCH"
    )
}

/// Dispatch one request on a connection.
pub async fn dispatch(req: Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    let name = req.name();

    // A promoted replica link only ever sends acknowledgments; answering
    // anything else would corrupt the propagated command stream.
    if conn.is_replica_link && name != "REPLCONF" {
        return Frame::NoResponse;
    }

    if conn.in_subscribed_mode() && !SUBSCRIBED_MODE_ALLOWED.contains(&name.as_str()) {
        return Frame::error(format!(
            "ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
            name.to_ascii_lowercase()
        ));
    }

    // A connection with an open transaction queues everything except the
    // transaction-control commands themselves.
    if conn.queue.is_some() {
        match name.as_str() {
            "MULTI" => return Frame::error("ERR MULTI calls cannot be nested"),
            "EXEC" => return txn::exec(shared, conn).await,
            "DISCARD" => return txn::discard(conn),
            "WATCH" => return Frame::error("ERR WATCH inside MULTI is not allowed"),
            "UNWATCH" => return Frame::ok(),
            _ => {
                if let Some(queue) = conn.queue.as_mut() {
                    queue.push(req);
                }
                return Frame::simple("QUEUED");
            }
        }
    }

    match name.as_str() {
        _ if is_data_command(&name) => run_data_command(&req, shared).await,
        "PING" => server::ping(&req, conn),
        "ECHO" => server::echo(&req),
        "INFO" => server::info(&req, shared),
        "CONFIG" => server::config(&req, shared),
        "COMMAND" => server::command_stub(&req),
        "SELECT" => server::select(&req),
        "QUIT" => server::quit(conn),
        "RESET" => server::reset(shared, conn),
        "BLPOP" => list::blpop(&req, shared).await,
        "XREAD" => stream::xread(&req, shared).await,
        "SUBSCRIBE" => pubsub::subscribe(&req, shared, conn).await,
        "UNSUBSCRIBE" => pubsub::unsubscribe(&req, shared, conn).await,
        "PSUBSCRIBE" => pubsub::psubscribe(&req, shared, conn).await,
        "PUNSUBSCRIBE" => pubsub::punsubscribe(&req, shared, conn).await,
        "PUBLISH" => pubsub::publish(&req, shared).await,
        "MULTI" => txn::multi(&req, conn),
        "EXEC" => Frame::error("ERR EXEC without MULTI"),
        "DISCARD" => Frame::error("ERR DISCARD without MULTI"),
        "WATCH" => txn::watch(&req),
        "UNWATCH" => Frame::ok(),
        "REPLCONF" => server::replconf(&req, shared, conn),
        "PSYNC" => master::psync(&req, shared, conn).await,
        "WAIT" => master::wait(&req, shared).await,
        _ => Frame::error(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(&req.args[0])
        )),
    }
}

/// Execute one queued command during `EXEC`, against the already-held
/// keyspace lock.
///
/// The handler table mirrors `dispatch`; the differences are forced by the
/// lock being held across the whole queue: blocking commands run in their
/// immediate form (the deadline behaves as already expired), `WAIT`
/// reports the current acknowledgment count without broadcasting or
/// parking, and the subscribe family — whose replies are several top-level
/// frames, not one — is rejected as an in-array error.
pub(crate) async fn execute_queued_command(
    req: &Request,
    shared: &Arc<Shared>,
    conn: &mut ConnState,
    store: &mut Store,
    propagated: &mut Vec<Request>,
) -> Frame {
    let name = req.name();
    if is_data_command(&name) {
        let reply = execute_data_command(req, store);
        if shared.replication.role() == Role::Master
            && is_write_command(&name)
            && !matches!(reply, Frame::Error(_))
        {
            master::propagate(shared, req).await;
            propagated.push(req.clone());
        }
        return reply;
    }
    match name.as_str() {
        "PING" => server::ping(req, conn),
        "ECHO" => server::echo(req),
        "INFO" => server::info(req, shared),
        "CONFIG" => server::config(req, shared),
        "COMMAND" => server::command_stub(req),
        "SELECT" => server::select(req),
        "QUIT" => server::quit(conn),
        "RESET" => server::reset(shared, conn),
        "BLPOP" => list::blpop_immediate(req, store),
        "XREAD" => stream::xread_immediate(req, store),
        "PUBLISH" => pubsub::publish(req, shared).await,
        "WAIT" => master::wait_immediate(req, shared),
        "REPLCONF" => server::replconf(req, shared, conn),
        "WATCH" => txn::watch(req),
        "UNWATCH" => Frame::ok(),
        "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" => {
            Frame::error(format!("ERR {} is not allowed in transactions", name))
        }
        "MULTI" => Frame::error("ERR MULTI calls cannot be nested"),
        "EXEC" => Frame::error("ERR EXEC without MULTI"),
        "DISCARD" => Frame::error("ERR DISCARD without MULTI"),
        _ => Frame::error(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(&req.args[0])
        )),
    }
}

/// Execute a pure keyspace command, propagate it if it is an effective
/// write, and fire blocking-client wakeups.
async fn run_data_command(req: &Request, shared: &Arc<Shared>) -> Frame {
    let name = req.name();
    let reply = {
        let mut store = shared.store.lock().await;
        let reply = execute_data_command(req, &mut store);
        // Propagation happens while the keyspace lock is held so replicas
        // observe writes in master apply order.
        if shared.replication.role() == Role::Master
            && is_write_command(&name)
            && !matches!(reply, Frame::Error(_))
        {
            master::propagate(shared, req).await;
        }
        reply
    };
    if !matches!(reply, Frame::Error(_)) {
        notify_blocked_clients(req, &name, shared);
    }
    reply
}

/// Wake clients blocked on keys this write touched.
pub fn notify_blocked_clients(req: &Request, name: &str, shared: &Shared) {
    match name {
        "LPUSH" | "RPUSH" if req.arity() >= 2 => {
            shared
                .wakeups
                .notify_list_push(req.arg(0), req.arity() - 1);
        }
        "XADD" if req.arity() >= 1 => {
            shared.wakeups.notify_stream_append(req.arg(0));
        }
        _ => {}
    }
}

/// Run one keyspace command against an already-locked store.
///
/// This is the path `EXEC` runs its queue through and the replica apply
/// loop feeds propagated commands into.
pub fn execute_data_command(req: &Request, store: &mut Store) -> Frame {
    match req.name().as_str() {
        "SET" => string::set(req, store),
        "GET" => string::get(req, store),
        "INCR" => string::incr(req, store),
        "DEL" => keyspace::del(req, store),
        "EXISTS" => keyspace::exists(req, store),
        "TYPE" => keyspace::key_type(req, store),
        "KEYS" => keyspace::keys(req, store),
        "DBSIZE" => keyspace::dbsize(req, store),
        "LPUSH" => list::lpush(req, store),
        "RPUSH" => list::rpush(req, store),
        "LPOP" => list::lpop(req, store),
        "RPOP" => list::rpop(req, store),
        "LLEN" => list::llen(req, store),
        "LRANGE" => list::lrange(req, store),
        "XADD" => stream::xadd(req, store),
        "XRANGE" => stream::xrange(req, store),
        "XLEN" => stream::xlen(req, store),
        "ZADD" => zset::zadd(req, store),
        "ZREM" => zset::zrem(req, store),
        "ZCARD" => zset::zcard(req, store),
        "ZRANK" => zset::zrank(req, store),
        "ZSCORE" => zset::zscore(req, store),
        "ZRANGE" => zset::zrange(req, store),
        "GEOADD" => geo::geoadd(req, store),
        "GEOPOS" => geo::geopos(req, store),
        "GEODIST" => geo::geodist(req, store),
        "GEOSEARCH" => geo::geosearch(req, store),
        other => Frame::error(format!("ERR unknown command '{}'", other)),
    }
}

// Shared reply and parsing helpers for the handler modules.

pub(crate) fn err_wrong_args(name: &str) -> Frame {
    Frame::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

pub(crate) fn err_wrongtype() -> Frame {
    Frame::error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

pub(crate) fn err_not_integer() -> Frame {
    Frame::error("ERR value is not an integer or out of range")
}

pub(crate) fn err_not_float() -> Frame {
    Frame::error("ERR value is not a valid float")
}

pub(crate) fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub(crate) fn parse_f64(bytes: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value: f64 = text.parse().ok()?;
    if value.is_nan() { None } else { Some(value) }
}
