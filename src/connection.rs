//! Per-connection worker
//!
//! One task per accepted TCP connection: read bytes into an accumulator,
//! drain complete RESP frames, dispatch each request, write the reply.
//! Connection-scoped state (subscriptions, transaction queue) lives here
//! and is torn down when the socket closes.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, warn};

use crate::commands::{self, Request};
use crate::errors::ServerResult;
use crate::protocol::{Frame, Parsed, parse_request};
use crate::server::Shared;

/// A connection's outbound socket half, shareable with pub/sub fan-out and
/// replication propagation. Writes serialize on the lock.
pub type SharedWriter = Arc<tokio::sync::Mutex<tokio::net::tcp::OwnedWriteHalf>>;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Connection-scoped state.
#[derive(Debug)]
pub struct ConnState {
    pub id: u64,
    pub writer: SharedWriter,
    /// Channels this connection is subscribed to
    pub channels: HashSet<Vec<u8>>,
    /// Patterns this connection is subscribed to
    pub patterns: HashSet<Vec<u8>>,
    /// Open transaction queue, if `MULTI` is active
    pub queue: Option<Vec<Request>>,
    /// Set by `QUIT`; the loop closes after the reply is flushed
    pub should_close: bool,
    /// Set once this connection completed `PSYNC` and became a replica link
    pub is_replica_link: bool,
}

impl ConnState {
    fn new(id: u64, writer: SharedWriter) -> Self {
        Self {
            id,
            writer,
            channels: HashSet::new(),
            patterns: HashSet::new(),
            queue: None,
            should_close: false,
            is_replica_link: false,
        }
    }

    /// Subscribed mode restricts the permitted command set.
    pub fn in_subscribed_mode(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }

    /// Total subscriptions (channels plus patterns); reported in
    /// subscribe/unsubscribe replies.
    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

/// Entry point for one accepted connection; runs until the peer closes or a
/// protocol error occurs, then tears down the connection's shared-state
/// footprint.
pub async fn handle(shared: Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    let id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    shared.connected_clients.fetch_add(1, Ordering::Relaxed);
    debug!("accepted connection {} from {}", id, addr);

    let (mut read_half, write_half) = stream.into_split();
    let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));
    let mut conn = ConnState::new(id, writer);

    if let Err(e) = serve(&shared, &mut conn, &mut read_half).await {
        warn!("connection {} closed on error: {}", id, e);
    }

    // Teardown: subscriptions, transaction state, replica slot.
    shared.pubsub.drop_connection(conn.id);
    shared.replication.remove_replica(conn.id);
    shared.connected_clients.fetch_sub(1, Ordering::Relaxed);
    debug!("connection {} from {} closed", id, addr);
}

async fn serve(
    shared: &Arc<Shared>,
    conn: &mut ConnState,
    read_half: &mut OwnedReadHalf,
) -> ServerResult<()> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        // Drain every complete frame before reading again; one read may
        // carry several pipelined requests or a partial one.
        loop {
            match parse_request(&buf) {
                Ok(Parsed::Complete { frame, consumed }) => {
                    buf.advance(consumed);
                    let Some(req) = Request::from_frame(frame)? else {
                        continue;
                    };
                    let reply = commands::dispatch(req, shared, conn).await;
                    if !matches!(reply, Frame::NoResponse) {
                        let mut socket = conn.writer.lock().await;
                        socket.write_all(&reply.encode()).await?;
                    }
                    if conn.should_close {
                        let mut socket = conn.writer.lock().await;
                        socket.flush().await?;
                        return Ok(());
                    }
                }
                Ok(Parsed::Incomplete) => break,
                Err(e) => {
                    // Framing violation: tell the client, then hang up.
                    let detail = match &e {
                        crate::errors::ServerError::Protocol { message } => message.clone(),
                        other => other.to_string(),
                    };
                    let reply = Frame::error(format!("ERR Protocol error: {}", detail));
                    let mut socket = conn.writer.lock().await;
                    let _ = socket.write_all(&reply.encode()).await;
                    return Err(e);
                }
            }
        }

        let n = read_half.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
    }
}
