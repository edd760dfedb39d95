//! Server core: shared state and the accept loop
//!
//! `Shared` owns the four process-wide mutable stores — the keyspace, the
//! pub/sub index, the replication registry, and the blocked-client registry
//! — each behind its own guard. One instance is created at startup and
//! handed to every connection task.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection;
use crate::errors::ServerResult;
use crate::blocking::Wakeups;
use crate::pubsub::PubSub;
use crate::rdb;
use crate::replication::{ReplicationState, Role};
use crate::store::Store;

/// Process-wide server state.
#[derive(Debug)]
pub struct Shared {
    pub config: ServerConfig,
    /// The keyspace. Held for the duration of a non-blocking command;
    /// blocking commands release it while parked.
    pub store: tokio::sync::Mutex<Store>,
    /// Blocked-client registry for `BLPOP` / `XREAD BLOCK`.
    pub wakeups: Wakeups,
    /// Pub/sub subscription index.
    pub pubsub: PubSub,
    /// Role, replication ID, offsets, replica registry.
    pub replication: ReplicationState,
    /// Live client connections, reported by `INFO`.
    pub connected_clients: std::sync::atomic::AtomicUsize,
}

impl Shared {
    pub fn new(config: ServerConfig) -> Self {
        let role = if config.is_replica() {
            Role::Slave
        } else {
            Role::Master
        };
        Self {
            config,
            store: tokio::sync::Mutex::new(Store::new()),
            wakeups: Wakeups::new(),
            pubsub: PubSub::new(),
            replication: ReplicationState::new(role),
            connected_clients: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Load the configured RDB snapshot into the keyspace, if one exists.
    pub async fn load_snapshot(&self) -> ServerResult<()> {
        let Some(path) = self.config.rdb_path() else {
            return Ok(());
        };
        if !path.exists() {
            info!("no snapshot at {}, starting empty", path.display());
            return Ok(());
        }
        let entries = rdb::load_file(&path)?;
        let count = entries.len();
        let mut store = self.store.lock().await;
        for (key, entry) in entries {
            store.load_entry(key, entry);
        }
        info!("loaded {} key(s) from {}", count, path.display());
        Ok(())
    }
}

/// Accept connections forever, one spawned worker per connection.
pub async fn run(shared: Arc<Shared>, listener: TcpListener) -> ServerResult<()> {
    info!(
        "listening on port {} as {}",
        shared.config.port,
        shared.replication.role().as_str()
    );
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    connection::handle(shared, stream, addr).await;
                });
            }
            Err(e) => {
                // Transient accept failures (EMFILE and friends) should not
                // take the server down.
                warn!("accept failed: {}", e);
            }
        }
    }
}
