//! Connection and server introspection commands:
//! PING, ECHO, INFO, CONFIG, SELECT, QUIT, RESET, REPLCONF

use std::sync::Arc;

use crate::commands::{Request, err_wrong_args, parse_i64};
use crate::connection::ConnState;
use crate::protocol::Frame;
use crate::server::Shared;

/// `PING [msg]` — `+PONG` or echo; in subscribed mode the reply is the
/// array `["pong", ""]` regardless of any message argument.
pub fn ping(req: &Request, conn: &ConnState) -> Frame {
    if conn.in_subscribed_mode() {
        return Frame::Array(vec![Frame::bulk("pong"), Frame::bulk("")]);
    }
    match req.arity() {
        0 => Frame::simple("PONG"),
        1 => Frame::Bulk(req.arg(0).to_vec()),
        _ => err_wrong_args("ping"),
    }
}

/// `ECHO msg`
pub fn echo(req: &Request) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("echo");
    }
    Frame::Bulk(req.arg(0).to_vec())
}

/// `INFO [section]` — section filters are accepted and ignored; all
/// sections are always reported.
pub fn info(_req: &Request, shared: &Arc<Shared>) -> Frame {
    let replication = &shared.replication;
    let clients = shared
        .connected_clients
        .load(std::sync::atomic::Ordering::Relaxed);
    let text = format!(
        "# Server\r\nrespkv_version:0.1.0\r\ntcp_port:{}\r\n\r\n\
         # Clients\r\nconnected_clients:{}\r\n\r\n\
         # Replication\r\nrole:{}\r\nconnected_slaves:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
        shared.config.port,
        clients,
        replication.role().as_str(),
        replication.replica_count(),
        replication.replid(),
        replication.master_offset(),
    );
    Frame::bulk(text)
}

/// `COMMAND [subcommand ...]` — stubbed: clients probe it at connect time
/// and only need a well-formed reply.
pub fn command_stub(_req: &Request) -> Frame {
    Frame::Array(vec![])
}

/// `CONFIG GET param [param ...]` — alternating key/value bulk strings;
/// unknown parameters are reported with an empty value.
pub fn config(req: &Request, shared: &Arc<Shared>) -> Frame {
    if req.arity() < 1 {
        return err_wrong_args("config");
    }
    let sub = req.arg_str(0).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            if req.arity() < 2 {
                return err_wrong_args("config|get");
            }
            let mut items = Vec::new();
            for i in 1..req.arity() {
                let name = req.arg_str(i).to_ascii_lowercase();
                let value = shared.config.parameter(&name).unwrap_or_default();
                items.push(Frame::bulk(name));
                items.push(Frame::bulk(value));
            }
            Frame::Array(items)
        }
        other => Frame::error(format!(
            "ERR Unknown CONFIG subcommand or wrong number of arguments for '{}'",
            other.to_ascii_lowercase()
        )),
    }
}

/// `SELECT n` — single-database server; accepted and ignored.
pub fn select(req: &Request) -> Frame {
    if req.arity() != 1 {
        return err_wrong_args("select");
    }
    match parse_i64(req.arg(0)) {
        Some(_) => Frame::ok(),
        None => crate::commands::err_not_integer(),
    }
}

/// `QUIT` — reply `+OK`, then the connection loop closes the socket.
pub fn quit(conn: &mut ConnState) -> Frame {
    conn.should_close = true;
    Frame::ok()
}

/// `RESET` — drop subscriptions and any open transaction, reply `+RESET`.
pub fn reset(shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    shared.pubsub.drop_connection(conn.id);
    conn.channels.clear();
    conn.patterns.clear();
    conn.queue = None;
    Frame::simple("RESET")
}

/// `REPLCONF` — handshake options get `+OK`; `ACK <offset>` from a
/// registered replica updates the acknowledgment ledger and produces no
/// reply.
pub fn replconf(req: &Request, shared: &Arc<Shared>, conn: &ConnState) -> Frame {
    if req.arity() < 1 {
        return err_wrong_args("replconf");
    }
    let option = req.arg_str(0).to_ascii_uppercase();
    match option.as_str() {
        "LISTENING-PORT" | "CAPA" => Frame::ok(),
        "ACK" => {
            if let Some(offset) = req.args.get(2).and_then(|a| parse_i64(a))
                && offset >= 0
            {
                shared.replication.record_ack(conn.id, offset as u64);
            }
            Frame::NoResponse
        }
        _ => Frame::error(format!(
            "ERR Unrecognized REPLCONF option: {}",
            req.arg_str(0)
        )),
    }
}
