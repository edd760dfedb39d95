//! Process-wide replication state
//!
//! Tracks the server's role, its 40-hex replication ID, the running byte
//! offset of the propagated command stream, and the registry of connected
//! replicas with their acknowledged offsets. On a replica, additionally
//! tracks how many bytes of the master stream have been applied.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::connection::SharedWriter;
use crate::utils::generate_replication_id;

/// Which side of replication this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    /// The name `INFO` reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }
}

/// A registered replica connection on the master.
#[derive(Debug, Clone)]
pub struct ReplicaHandle {
    pub conn_id: u64,
    pub writer: SharedWriter,
    acked_offset: std::sync::Arc<AtomicU64>,
}

impl ReplicaHandle {
    pub fn acked_offset(&self) -> u64 {
        self.acked_offset.load(Ordering::Acquire)
    }
}

/// Replication bookkeeping shared by every connection.
#[derive(Debug)]
pub struct ReplicationState {
    role: Role,
    replid: String,
    /// Bytes of the propagated command stream (master side).
    master_offset: AtomicU64,
    /// Bytes of the master stream applied locally (replica side).
    applied_offset: AtomicU64,
    replicas: Mutex<Vec<ReplicaHandle>>,
    /// Signalled whenever a replica acknowledgment arrives; `WAIT` parks here.
    ack_notify: Notify,
    any_ack_seen: AtomicBool,
}

impl ReplicationState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            replid: generate_replication_id(),
            master_offset: AtomicU64::new(0),
            applied_offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
            ack_notify: Notify::new(),
            any_ack_seen: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn replid(&self) -> &str {
        &self.replid
    }

    pub fn master_offset(&self) -> u64 {
        self.master_offset.load(Ordering::Acquire)
    }

    /// Account `bytes` of newly propagated command stream; returns the new
    /// offset.
    pub fn add_master_offset(&self, bytes: u64) -> u64 {
        self.master_offset.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    pub fn applied_offset(&self) -> u64 {
        self.applied_offset.load(Ordering::Acquire)
    }

    pub fn add_applied_offset(&self, bytes: u64) {
        self.applied_offset.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Register a connection that completed `PSYNC` as a replica.
    pub fn register_replica(&self, conn_id: u64, writer: SharedWriter) {
        let mut replicas = self.replicas.lock().unwrap();
        replicas.push(ReplicaHandle {
            conn_id,
            writer,
            acked_offset: std::sync::Arc::new(AtomicU64::new(0)),
        });
    }

    /// Drop the registration slot of a closed replica connection.
    pub fn remove_replica(&self, conn_id: u64) {
        let mut replicas = self.replicas.lock().unwrap();
        replicas.retain(|r| r.conn_id != conn_id);
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Snapshot of replica handles for propagation or `GETACK` broadcast.
    pub fn replica_handles(&self) -> Vec<ReplicaHandle> {
        self.replicas.lock().unwrap().clone()
    }

    /// Record a `REPLCONF ACK <offset>` from a replica and wake `WAIT`ers.
    pub fn record_ack(&self, conn_id: u64, offset: u64) {
        {
            let replicas = self.replicas.lock().unwrap();
            if let Some(replica) = replicas.iter().find(|r| r.conn_id == conn_id) {
                replica.acked_offset.store(offset, Ordering::Release);
            }
        }
        self.any_ack_seen.store(true, Ordering::Release);
        self.ack_notify.notify_waiters();
    }

    /// Number of replicas whose last acknowledgment reached `offset`.
    pub fn acked_at_least(&self, offset: u64) -> usize {
        self.replicas
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.acked_offset() >= offset)
            .count()
    }

    /// Whether any acknowledgment has ever arrived; `WAIT`'s bootstrap
    /// fallback keys off this.
    pub fn any_ack_seen(&self) -> bool {
        self.any_ack_seen.load(Ordering::Acquire)
    }

    pub fn ack_notify(&self) -> &Notify {
        &self.ack_notify
    }
}
