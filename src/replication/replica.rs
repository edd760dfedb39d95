//! Replica-side replication: handshake, snapshot ingest, apply loop
//!
//! On startup a replica opens one connection to its master, walks the
//! `PING` → `REPLCONF` → `PSYNC` handshake, ingests the bulk-framed
//! snapshot, and then applies every propagated command without replying.
//! The only bytes it ever sends after the handshake are `REPLCONF ACK`
//! responses to `REPLCONF GETACK *`.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::commands::{self, Request};
use crate::errors::{ServerError, ServerResult};
use crate::protocol::{Frame, Parsed, parse_request};
use crate::rdb;
use crate::server::Shared;

/// Connect to the master and run the replication link until it drops.
pub async fn run(shared: Arc<Shared>, host: String, port: u16) -> ServerResult<()> {
    let address = format!("{}:{}", host, port);
    info!("connecting to master at {}", address);
    let mut stream = TcpStream::connect(&address).await?;
    let mut buf = BytesMut::with_capacity(8192);

    handshake(&shared, &mut stream, &mut buf).await?;

    let snapshot = read_snapshot(&mut stream, &mut buf).await?;
    ingest_snapshot(&shared, &snapshot).await?;

    info!("full resync complete, applying propagated commands");
    apply_loop(&shared, &mut stream, &mut buf).await
}

/// `PING` → `REPLCONF listening-port` → `REPLCONF capa psync2` →
/// `PSYNC ? -1`, ending on the `+FULLRESYNC` line.
async fn handshake(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> ServerResult<()> {
    send_command(stream, &[b"PING".as_slice()]).await?;
    expect_simple(read_frame(stream, buf).await?, "PONG")?;
    debug!("handshake: PING acknowledged");

    let listen_port = shared.config.port.to_string();
    send_command(
        stream,
        &[
            b"REPLCONF".as_slice(),
            b"listening-port".as_slice(),
            listen_port.as_bytes(),
        ],
    )
    .await?;
    expect_simple(read_frame(stream, buf).await?, "OK")?;

    send_command(
        stream,
        &[b"REPLCONF".as_slice(), b"capa".as_slice(), b"psync2".as_slice()],
    )
    .await?;
    expect_simple(read_frame(stream, buf).await?, "OK")?;
    debug!("handshake: REPLCONF acknowledged");

    send_command(stream, &[b"PSYNC".as_slice(), b"?".as_slice(), b"-1".as_slice()]).await?;
    match read_frame(stream, buf).await? {
        Frame::Simple(line) if line.starts_with("FULLRESYNC") => {
            info!("master replied {}", line);
            Ok(())
        }
        other => Err(ServerError::replication_with_context(
            "expected +FULLRESYNC from master",
            format!("{:?}", other),
        )),
    }
}

/// The snapshot is framed `$<len>\r\n<bytes>` with no trailing CRLF, so it
/// cannot go through the ordinary bulk-string parser.
async fn read_snapshot(stream: &mut TcpStream, buf: &mut BytesMut) -> ServerResult<Vec<u8>> {
    loop {
        if let Some(header_end) = buf.windows(2).position(|w| w == b"\r\n") {
            if buf[0] != b'$' {
                return Err(ServerError::replication("snapshot is not bulk-framed"));
            }
            let len: usize = std::str::from_utf8(&buf[1..header_end])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ServerError::replication("bad snapshot length header"))?;
            let total = header_end + 2 + len;
            if buf.len() >= total {
                let snapshot = buf[header_end + 2..total].to_vec();
                buf.advance(total);
                return Ok(snapshot);
            }
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(ServerError::replication(
                "master closed connection during snapshot transfer",
            ));
        }
    }
}

async fn ingest_snapshot(shared: &Arc<Shared>, snapshot: &[u8]) -> ServerResult<()> {
    let entries = rdb::load_bytes(snapshot)?;
    let count = entries.len();
    let mut store = shared.store.lock().await;
    for (key, entry) in entries {
        store.load_entry(key, entry);
    }
    info!("ingested snapshot with {} key(s)", count);
    Ok(())
}

/// Apply propagated commands without replying; answer `GETACK` with the
/// applied-byte offset as of before the `GETACK` itself.
async fn apply_loop(
    shared: &Arc<Shared>,
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> ServerResult<()> {
    loop {
        let frame = match read_frame(stream, buf).await {
            Ok(frame) => frame,
            Err(ServerError::Replication { message, .. })
                if message.contains("closed connection") =>
            {
                warn!("replication link dropped: {}", message);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let Some(req) = Request::from_frame(frame)? else {
            continue;
        };
        let name = req.name();
        let encoded_len = req.encode().len() as u64;

        if name == "REPLCONF" && req.arity() >= 1 && req.arg(0).eq_ignore_ascii_case(b"GETACK") {
            let offset = shared.replication.applied_offset().to_string();
            send_command(
                stream,
                &[b"REPLCONF".as_slice(), b"ACK".as_slice(), offset.as_bytes()],
            )
            .await?;
            shared.replication.add_applied_offset(encoded_len);
            continue;
        }

        match name.as_str() {
            "PING" => {}
            _ => {
                let mut store = shared.store.lock().await;
                let reply = commands::execute_data_command(&req, &mut store);
                if let Frame::Error(message) = reply {
                    warn!("propagated command {} failed locally: {}", name, message);
                }
                drop(store);
                commands::notify_blocked_clients(&req, &name, shared);
            }
        }
        shared.replication.add_applied_offset(encoded_len);
    }
}

async fn send_command(stream: &mut TcpStream, args: &[&[u8]]) -> ServerResult<()> {
    let args: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
    stream.write_all(&Frame::command(&args).encode()).await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> ServerResult<Frame> {
    loop {
        match parse_request(buf)? {
            Parsed::Complete { frame, consumed } => {
                buf.advance(consumed);
                return Ok(frame);
            }
            Parsed::Incomplete => {
                if stream.read_buf(buf).await? == 0 {
                    return Err(ServerError::replication("master closed connection"));
                }
            }
        }
    }
}

fn expect_simple(frame: Frame, expected: &str) -> ServerResult<()> {
    match frame {
        Frame::Simple(ref line) if line == expected => Ok(()),
        other => Err(ServerError::replication_with_context(
            format!("expected +{} from master", expected),
            format!("{:?}", other),
        )),
    }
}
