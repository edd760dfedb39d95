//! Master-side replication: PSYNC handling, write propagation, WAIT
//!
//! A client that completes the `REPLCONF`/`PSYNC` handshake is promoted to
//! a replica link: it receives `+FULLRESYNC`, a bulk-framed RDB snapshot
//! (no trailing CRLF), and from then on a mirror of every write command.
//! Propagation happens while the keyspace lock is held, so replicas observe
//! writes in the exact order the master applied them.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::commands::Request;
use crate::connection::ConnState;
use crate::protocol::Frame;
use crate::rdb;
use crate::server::Shared;

/// `PSYNC ? -1` — reply `+FULLRESYNC <replid> <offset>`, ship the snapshot,
/// and register the connection as a replica.
pub async fn psync(req: &Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    if req.arity() != 2 {
        return crate::commands::err_wrong_args("psync");
    }

    let replid = shared.replication.replid().to_string();
    let offset = shared.replication.master_offset();

    // The snapshot: the persisted file if one exists, the canonical empty
    // snapshot otherwise.
    let snapshot = match shared.config.rdb_path() {
        Some(path) if path.exists() => match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to read snapshot {}: {}", path.display(), e);
                rdb::EMPTY_SNAPSHOT.to_vec()
            }
        },
        _ => rdb::EMPTY_SNAPSHOT.to_vec(),
    };

    let mut payload = format!("+FULLRESYNC {} {}\r\n", replid, offset).into_bytes();
    payload.extend_from_slice(format!("${}\r\n", snapshot.len()).as_bytes());
    payload.extend_from_slice(&snapshot);

    {
        let mut socket = conn.writer.lock().await;
        if let Err(e) = socket.write_all(&payload).await {
            warn!("failed to ship snapshot to replica: {}", e);
            return Frame::NoResponse;
        }
    }

    shared
        .replication
        .register_replica(conn.id, conn.writer.clone());
    conn.is_replica_link = true;
    info!(
        "connection {} promoted to replica, snapshot of {} bytes shipped",
        conn.id,
        snapshot.len()
    );
    Frame::NoResponse
}

/// Mirror a write command to every registered replica and advance the
/// master offset by its serialized length. Runs under the keyspace lock.
pub async fn propagate(shared: &Arc<Shared>, req: &Request) {
    let bytes = req.encode();
    shared.replication.add_master_offset(bytes.len() as u64);
    for replica in shared.replication.replica_handles() {
        let mut socket = replica.writer.lock().await;
        if let Err(e) = socket.write_all(&bytes).await {
            warn!(
                "dropping replica on connection {}: propagation failed: {}",
                replica.conn_id, e
            );
            shared.replication.remove_replica(replica.conn_id);
        }
    }
}

fn parse_wait(req: &Request) -> Result<(i64, i64), Frame> {
    if req.arity() != 2 {
        return Err(crate::commands::err_wrong_args("wait"));
    }
    let (Some(numreplicas), Some(timeout_ms)) = (
        crate::commands::parse_i64(req.arg(0)),
        crate::commands::parse_i64(req.arg(1)),
    ) else {
        return Err(crate::commands::err_not_integer());
    };
    if numreplicas < 0 || timeout_ms < 0 {
        return Err(Frame::error("ERR timeout is negative"));
    }
    Ok((numreplicas, timeout_ms))
}

/// `WAIT numreplicas timeout_ms`
///
/// Broadcasts `REPLCONF GETACK *`, then parks until enough replicas have
/// acknowledged the pre-broadcast offset or the deadline fires. A timeout
/// with no acknowledgment ever seen falls back to the connected-replica
/// count.
pub async fn wait(req: &Request, shared: &Arc<Shared>) -> Frame {
    let (numreplicas, timeout_ms) = match parse_wait(req) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let barrier = shared.replication.master_offset();
    if barrier == 0 {
        // Nothing was ever propagated; every connected replica is caught up.
        return Frame::Integer(shared.replication.replica_count() as i64);
    }

    broadcast_getack(shared).await;

    let deadline = crate::blocking::Deadline::after(Duration::from_millis(timeout_ms as u64));
    loop {
        let notified = shared.replication.ack_notify().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let acked = shared.replication.acked_at_least(barrier);
        if acked >= numreplicas as usize {
            return Frame::Integer(acked as i64);
        }
        if deadline.expired() || !deadline.wait_pinned(notified).await {
            let acked = shared.replication.acked_at_least(barrier);
            if acked == 0 && !shared.replication.any_ack_seen() {
                return Frame::Integer(shared.replication.replica_count() as i64);
            }
            return Frame::Integer(acked as i64);
        }
    }
}

/// `WAIT` inside `EXEC`: the keyspace lock is held across the queue, so no
/// broadcast or parking happens — report how many replicas have already
/// acknowledged the current offset.
pub fn wait_immediate(req: &Request, shared: &Arc<Shared>) -> Frame {
    let (_numreplicas, _timeout_ms) = match parse_wait(req) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };
    let barrier = shared.replication.master_offset();
    if barrier == 0 {
        return Frame::Integer(shared.replication.replica_count() as i64);
    }
    Frame::Integer(shared.replication.acked_at_least(barrier) as i64)
}

/// Send `REPLCONF GETACK *` to every replica; the bytes count toward the
/// offset only after the barrier was taken.
async fn broadcast_getack(shared: &Arc<Shared>) {
    let getack = Request::new(vec![
        b"REPLCONF".to_vec(),
        b"GETACK".to_vec(),
        b"*".to_vec(),
    ]);
    propagate(shared, &getack).await;
}
