//! Pub/sub commands: SUBSCRIBE, UNSUBSCRIBE, PSUBSCRIBE, PUNSUBSCRIBE, PUBLISH
//!
//! Subscribe-family commands emit one reply frame per channel, so they write
//! to the socket themselves and return `NoResponse` to the dispatcher.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::commands::{Request, err_wrong_args};
use crate::connection::ConnState;
use crate::protocol::Frame;
use crate::server::Shared;

/// `SUBSCRIBE channel [channel ...]`
pub async fn subscribe(req: &Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    if req.arity() == 0 {
        return err_wrong_args("subscribe");
    }
    for i in 0..req.arity() {
        let channel = req.arg(i).to_vec();
        shared.pubsub.subscribe(&channel, conn.id, conn.writer.clone());
        conn.channels.insert(channel.clone());
        let reply = Frame::Array(vec![
            Frame::bulk("subscribe"),
            Frame::Bulk(channel),
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
    }
    Frame::NoResponse
}

/// `UNSUBSCRIBE [channel ...]` — all subscribed channels when none given.
pub async fn unsubscribe(req: &Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    let channels: Vec<Vec<u8>> = if req.arity() == 0 {
        conn.channels.iter().cloned().collect()
    } else {
        (0..req.arity()).map(|i| req.arg(i).to_vec()).collect()
    };

    if channels.is_empty() {
        let reply = Frame::Array(vec![
            Frame::bulk("unsubscribe"),
            Frame::NullBulk,
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
        return Frame::NoResponse;
    }

    for channel in channels {
        shared.pubsub.unsubscribe(&channel, conn.id);
        conn.channels.remove(&channel);
        let reply = Frame::Array(vec![
            Frame::bulk("unsubscribe"),
            Frame::Bulk(channel),
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
    }
    Frame::NoResponse
}

/// `PSUBSCRIBE pattern [pattern ...]`
pub async fn psubscribe(req: &Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    if req.arity() == 0 {
        return err_wrong_args("psubscribe");
    }
    for i in 0..req.arity() {
        let pattern = req.arg(i).to_vec();
        shared.pubsub.psubscribe(&pattern, conn.id, conn.writer.clone());
        conn.patterns.insert(pattern.clone());
        let reply = Frame::Array(vec![
            Frame::bulk("psubscribe"),
            Frame::Bulk(pattern),
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
    }
    Frame::NoResponse
}

/// `PUNSUBSCRIBE [pattern ...]`
pub async fn punsubscribe(req: &Request, shared: &Arc<Shared>, conn: &mut ConnState) -> Frame {
    let patterns: Vec<Vec<u8>> = if req.arity() == 0 {
        conn.patterns.iter().cloned().collect()
    } else {
        (0..req.arity()).map(|i| req.arg(i).to_vec()).collect()
    };

    if patterns.is_empty() {
        let reply = Frame::Array(vec![
            Frame::bulk("punsubscribe"),
            Frame::NullBulk,
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
        return Frame::NoResponse;
    }

    for pattern in patterns {
        shared.pubsub.punsubscribe(&pattern, conn.id);
        conn.patterns.remove(&pattern);
        let reply = Frame::Array(vec![
            Frame::bulk("punsubscribe"),
            Frame::Bulk(pattern),
            Frame::Integer(conn.subscription_count() as i64),
        ]);
        send(conn, reply).await;
    }
    Frame::NoResponse
}

/// `PUBLISH channel message` — count of deliveries attempted.
pub async fn publish(req: &Request, shared: &Arc<Shared>) -> Frame {
    if req.arity() != 2 {
        return err_wrong_args("publish");
    }
    let count = shared.pubsub.publish(req.arg(0), req.arg(1)).await;
    Frame::Integer(count as i64)
}

async fn send(conn: &ConnState, frame: Frame) {
    let mut socket = conn.writer.lock().await;
    if let Err(e) = socket.write_all(&frame.encode()).await {
        warn!("failed to write subscription reply: {}", e);
    }
}
