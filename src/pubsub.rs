//! Pub/sub channel registry and fan-out
//!
//! The registry maps `channel → subscribers` (and `pattern → subscribers`);
//! the per-connection view (which channels a connection holds) lives in its
//! connection state, and both sides are updated under one registry lock per
//! operation. Delivery on `PUBLISH` is synchronous: the publisher writes to
//! every subscriber socket before its own reply is produced.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::connection::SharedWriter;
use crate::protocol::Frame;
use crate::store::glob::glob_match;

/// Process-wide subscription index.
#[derive(Debug, Default)]
pub struct PubSub {
    inner: Mutex<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    channels: HashMap<Vec<u8>, HashMap<u64, SharedWriter>>,
    patterns: HashMap<Vec<u8>, HashMap<u64, SharedWriter>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn_id` to `channel`'s subscriber set. Idempotent.
    pub fn subscribe(&self, channel: &[u8], conn_id: u64, writer: SharedWriter) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .channels
            .entry(channel.to_vec())
            .or_default()
            .insert(conn_id, writer);
    }

    pub fn unsubscribe(&self, channel: &[u8], conn_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subs) = inner.channels.get_mut(channel) {
            subs.remove(&conn_id);
            if subs.is_empty() {
                inner.channels.remove(channel);
            }
        }
    }

    /// Add `conn_id` to `pattern`'s subscriber set. Idempotent.
    pub fn psubscribe(&self, pattern: &[u8], conn_id: u64, writer: SharedWriter) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .patterns
            .entry(pattern.to_vec())
            .or_default()
            .insert(conn_id, writer);
    }

    pub fn punsubscribe(&self, pattern: &[u8], conn_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subs) = inner.patterns.get_mut(pattern) {
            subs.remove(&conn_id);
            if subs.is_empty() {
                inner.patterns.remove(pattern);
            }
        }
    }

    /// Remove every subscription held by `conn_id` (connection teardown).
    pub fn drop_connection(&self, conn_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.retain(|_, subs| {
            subs.remove(&conn_id);
            !subs.is_empty()
        });
        inner.patterns.retain(|_, subs| {
            subs.remove(&conn_id);
            !subs.is_empty()
        });
    }

    /// Deliver `message` on `channel` to every exact and pattern subscriber.
    ///
    /// Returns the number of deliveries attempted. Individual socket
    /// failures are logged and do not reduce the count.
    pub async fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        // Collect targets under the lock, write after releasing it.
        let targets: Vec<(SharedWriter, Frame)> = {
            let inner = self.inner.lock().unwrap();
            let mut targets = Vec::new();
            if let Some(subs) = inner.channels.get(channel) {
                let frame = Frame::Array(vec![
                    Frame::bulk("message"),
                    Frame::bulk(channel),
                    Frame::bulk(message),
                ]);
                for writer in subs.values() {
                    targets.push((writer.clone(), frame.clone()));
                }
            }
            for (pattern, subs) in &inner.patterns {
                if glob_match(pattern, channel) {
                    let frame = Frame::Array(vec![
                        Frame::bulk("pmessage"),
                        Frame::bulk(pattern.as_slice()),
                        Frame::bulk(channel),
                        Frame::bulk(message),
                    ]);
                    for writer in subs.values() {
                        targets.push((writer.clone(), frame.clone()));
                    }
                }
            }
            targets
        };

        let count = targets.len();
        for (writer, frame) in targets {
            use tokio::io::AsyncWriteExt;
            let mut socket = writer.lock().await;
            if let Err(e) = socket.write_all(&frame.encode()).await {
                warn!("pub/sub delivery failed: {}", e);
            }
        }
        debug!(
            "published to {} subscriber(s) on {}",
            count,
            String::from_utf8_lossy(channel)
        );
        count
    }

    /// Number of channels with at least one subscriber; test helper.
    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.inner.lock().unwrap().channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn writer_pair() -> (SharedWriter, tokio::net::tcp::OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (read_half, _) = client.into_split();
        let (_, write_half) = server.into_split();
        (Arc::new(tokio::sync::Mutex::new(write_half)), read_half)
    }

    #[tokio::test]
    async fn publish_delivers_message_frames() {
        let pubsub = PubSub::new();
        let (writer, mut reader) = writer_pair().await;
        pubsub.subscribe(b"news", 1, writer);

        let count = pubsub.publish(b"news", b"hello").await;
        assert_eq!(count, 1);

        let mut buf = vec![0u8; 256];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(
            &buf[..n],
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n"
        );
    }

    #[tokio::test]
    async fn pattern_subscribers_receive_pmessage() {
        let pubsub = PubSub::new();
        let (writer, mut reader) = writer_pair().await;
        pubsub.psubscribe(b"news.*", 1, writer);

        let count = pubsub.publish(b"news.tech", b"x").await;
        assert_eq!(count, 1);

        let mut buf = vec![0u8; 256];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(
            &buf[..n],
            b"*4\r\n$8\r\npmessage\r\n$6\r\nnews.*\r\n$9\r\nnews.tech\r\n$1\r\nx\r\n"
        );
    }

    #[tokio::test]
    async fn publish_counts_all_attempted_deliveries() {
        let pubsub = PubSub::new();
        let (w1, _r1) = writer_pair().await;
        let (w2, _r2) = writer_pair().await;
        pubsub.subscribe(b"ch", 1, w1);
        pubsub.subscribe(b"ch", 2, w2);
        assert_eq!(pubsub.publish(b"ch", b"m").await, 2);
        assert_eq!(pubsub.publish(b"other", b"m").await, 0);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_connection() {
        let pubsub = PubSub::new();
        let (writer, _reader) = writer_pair().await;
        pubsub.subscribe(b"ch", 1, writer.clone());
        pubsub.subscribe(b"ch", 1, writer);
        assert_eq!(pubsub.publish(b"ch", b"m").await, 1);
    }

    #[tokio::test]
    async fn drop_connection_clears_all_subscriptions() {
        let pubsub = PubSub::new();
        let (writer, _reader) = writer_pair().await;
        pubsub.subscribe(b"a", 7, writer.clone());
        pubsub.subscribe(b"b", 7, writer.clone());
        pubsub.psubscribe(b"c.*", 7, writer);
        pubsub.drop_connection(7);
        assert_eq!(pubsub.channel_count(), 0);
        assert_eq!(pubsub.publish(b"a", b"m").await, 0);
        assert_eq!(pubsub.publish(b"c.x", b"m").await, 0);
    }
}
