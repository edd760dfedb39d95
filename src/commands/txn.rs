//! Transaction commands: MULTI, EXEC, DISCARD, WATCH, UNWATCH
//!
//! Transaction state is connection-scoped: an open queue turns subsequent
//! commands into `QUEUED` replies until `EXEC` runs them in order under a
//! single keyspace lock acquisition, or `DISCARD` drops them.

use std::sync::Arc;

use crate::commands::{Request, err_wrong_args, execute_queued_command, notify_blocked_clients};
use crate::connection::ConnState;
use crate::protocol::Frame;
use crate::server::Shared;

/// `MULTI` — opens the queue. Nesting is rejected by the dispatcher.
pub fn multi(req: &Request, conn: &mut ConnState) -> Frame {
    if req.arity() != 0 {
        return err_wrong_args("multi");
    }
    conn.queue = Some(Vec::new());
    Frame::ok()
}

/// `EXEC` — pop the queue and run everything under one keyspace lock; no
/// command from any other connection interleaves. Per-command errors become
/// in-array elements and do not abort the rest.
pub async fn exec(shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    let Some(queue) = conn.queue.take() else {
        return Frame::error("ERR EXEC without MULTI");
    };

    let mut replies = Vec::with_capacity(queue.len());
    let mut propagated: Vec<Request> = Vec::new();
    {
        let mut store = shared.store.lock().await;
        for req in &queue {
            let reply =
                execute_queued_command(req, shared, conn, &mut store, &mut propagated).await;
            replies.push(reply);
        }
    }
    for req in propagated {
        let name = req.name();
        notify_blocked_clients(&req, &name, shared);
    }
    Frame::Array(replies)
}

/// `DISCARD` — drop the queue unexecuted.
pub fn discard(conn: &mut ConnState) -> Frame {
    if conn.queue.take().is_none() {
        return Frame::error("ERR DISCARD without MULTI");
    }
    Frame::ok()
}

/// `WATCH key [key ...]` — accepted for compatibility; no optimistic-lock
/// semantics are attached to it.
pub fn watch(req: &Request) -> Frame {
    if req.arity() == 0 {
        return err_wrong_args("watch");
    }
    Frame::ok()
}
