//! respkv — an in-memory RESP key-value server
//!
//! A single-node data server speaking the RESP protocol over TCP: strings,
//! lists, streams, sorted sets with a geospatial overlay, pub/sub,
//! connection-scoped transactions, and one-way master→replica propagation.

mod blocking;
mod commands;
mod config;
mod connection;
mod errors;
mod protocol;
mod pubsub;
mod rdb;
mod replication;
mod server;
mod store;
#[cfg(test)]
mod test_end_to_end;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::ServerConfig;
use crate::server::Shared;

#[derive(Parser, Debug)]
#[command(name = "respkv", about = "In-memory RESP key-value server", version = "0.1.0")]
struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Directory holding the persisted RDB snapshot
    #[arg(long)]
    dir: Option<String>,

    /// Filename of the RDB snapshot inside --dir
    #[arg(long)]
    dbfilename: Option<String>,

    /// Run as a replica of "<host> <port>"
    #[arg(long)]
    replicaof: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    let args = Args::parse();
    let config = ServerConfig::new(args.port, args.dir, args.dbfilename, args.replicaof)?;

    match run_server(config).await {
        Ok(()) => {
            info!("server completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("server failed: {}", e);
            Err(e)
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let shared = Arc::new(Shared::new(config));
    shared.load_snapshot().await?;

    // Bind before starting the replica link so a bind failure is fatal
    // immediately.
    let address = format!("0.0.0.0:{}", shared.config.port);
    let listener = TcpListener::bind(&address).await?;

    if let Some((host, port)) = shared.config.replica_of.clone() {
        let shared = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = replication::replica::run(shared, host, port).await {
                error!("replication link failed: {}", e);
            }
        });
    }

    server::run(shared, listener).await?;
    Ok(())
}
