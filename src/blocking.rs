//! Wait-until-condition primitives for blocking commands
//!
//! `BLPOP` and `XREAD BLOCK` park their connections here. Each watched key
//! has a waiter registry; writers notify it after mutating the keyspace and
//! parked tasks re-acquire the keyspace lock and re-check their condition.
//!
//! List waiters are FIFO per key: a push of N elements notifies the N
//! oldest waiters, in arrival order. Stream waiters are all notified on any
//! append to the watched stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Process-wide registry of blocked clients, keyed by watched key.
#[derive(Debug, Default)]
pub struct Wakeups {
    next_ticket: AtomicU64,
    lists: Mutex<HashMap<Vec<u8>, VecDeque<ListWaiter>>>,
    streams: Mutex<HashMap<Vec<u8>, Vec<Arc<Notify>>>>,
}

#[derive(Debug)]
struct ListWaiter {
    ticket: u64,
    notify: Arc<Notify>,
}

/// A registered list waiter; deregisters itself on drop so a cancelled or
/// timed-out `BLPOP` never leaves a stale queue slot behind.
pub struct ListWaitGuard<'a> {
    wakeups: &'a Wakeups,
    keys: Vec<Vec<u8>>,
    ticket: u64,
    pub notify: Arc<Notify>,
}

impl Drop for ListWaitGuard<'_> {
    fn drop(&mut self) {
        let mut lists = self.wakeups.lists.lock().unwrap();
        for key in &self.keys {
            if let Some(queue) = lists.get_mut(key) {
                queue.retain(|w| w.ticket != self.ticket);
                if queue.is_empty() {
                    lists.remove(key);
                }
            }
        }
    }
}

impl Wakeups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `BLPOP` waiter at the tail of every watched key's queue.
    pub fn register_list_waiter(&self, keys: &[Vec<u8>]) -> ListWaitGuard<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        let mut lists = self.lists.lock().unwrap();
        for key in keys {
            lists.entry(key.clone()).or_default().push_back(ListWaiter {
                ticket,
                notify: notify.clone(),
            });
        }
        ListWaitGuard {
            wakeups: self,
            keys: keys.to_vec(),
            ticket,
            notify,
        }
    }

    /// Wake up to `count` oldest waiters on `key` after a push of `count`
    /// elements.
    pub fn notify_list_push(&self, key: &[u8], count: usize) {
        let lists = self.lists.lock().unwrap();
        if let Some(queue) = lists.get(key) {
            for waiter in queue.iter().take(count) {
                waiter.notify.notify_one();
            }
        }
    }

    /// Register an `XREAD BLOCK` waiter against every watched stream key.
    pub fn register_stream_waiter(&self, keys: &[Vec<u8>]) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut streams = self.streams.lock().unwrap();
        for key in keys {
            streams.entry(key.clone()).or_default().push(notify.clone());
        }
        notify
    }

    /// Wake every waiter watching stream `key`. Registrations are one-shot;
    /// waiters re-register before the next wait.
    pub fn notify_stream_append(&self, key: &[u8]) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(waiters) = streams.remove(key) {
            for notify in waiters {
                notify.notify_one();
            }
        }
    }

    /// Drop a stream waiter registration without waking it.
    pub fn deregister_stream_waiter(&self, keys: &[Vec<u8>], notify: &Arc<Notify>) {
        let mut streams = self.streams.lock().unwrap();
        for key in keys {
            if let Some(waiters) = streams.get_mut(key) {
                waiters.retain(|w| !Arc::ptr_eq(w, notify));
                if waiters.is_empty() {
                    streams.remove(key);
                }
            }
        }
    }
}

/// The absolute deadline for a blocking command; `timeout` of zero means
/// wait forever.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    Never,
    At(Instant),
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            Deadline::Never
        } else {
            Deadline::At(Instant::now() + timeout)
        }
    }

    pub fn expired(&self) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Await `notify`, bounded by the deadline. Returns false when the
    /// deadline fired first.
    pub async fn wait(&self, notify: &Notify) -> bool {
        match self {
            Deadline::Never => {
                notify.notified().await;
                true
            }
            Deadline::At(at) => tokio::time::timeout_at(*at, notify.notified())
                .await
                .is_ok(),
        }
    }

    /// Await an already-pinned, enabled `Notified` future, bounded by the
    /// deadline. Used where the waiter must be registered before its
    /// condition is checked.
    pub async fn wait_pinned(
        &self,
        notified: std::pin::Pin<&mut tokio::sync::futures::Notified<'_>>,
    ) -> bool {
        match self {
            Deadline::Never => {
                notified.await;
                true
            }
            Deadline::At(at) => tokio::time::timeout_at(*at, notified).await.is_ok(),
        }
    }
}
