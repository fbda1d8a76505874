//! In-process messaging substrate.
//!
//! Every topic name maps to one `tokio::sync::broadcast` channel. Joining
//! the same name twice yields two topic handles over the same channel, so a
//! message published through either reaches every subscription. Slow
//! subscribers that fall behind the channel capacity skip the messages they
//! missed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PubSubError, PubSubResult};
use crate::substrate::{Subscription, Topic, TopicJoiner};

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Inner {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    joins: AtomicUsize,
    closes: AtomicUsize,
    shutdown: CancellationToken,
}

/// Broadcast-backed [`TopicJoiner`].
#[derive(Debug, Clone)]
pub struct LocalPubSub {
    inner: Arc<Inner>,
}

impl LocalPubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
                joins: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Number of successful joins so far.
    pub fn joins(&self) -> usize {
        self.inner.joins.load(Ordering::SeqCst)
    }

    /// Number of topic handles closed so far.
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Shut the substrate down. Joins fail and every open subscription
    /// stops yielding messages.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    fn sender(&self, name: &str) -> broadcast::Sender<Bytes> {
        let mut channels = self.inner.channels.lock();
        channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicJoiner for LocalPubSub {
    async fn join(&self, name: &str) -> PubSubResult<Arc<dyn Topic>> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PubSubError::Closed);
        }
        let tx = self.sender(name);
        self.inner.joins.fetch_add(1, Ordering::SeqCst);
        debug!(topic = name, "local topic joined");
        Ok(Arc::new(LocalTopic {
            name: name.to_string(),
            tx,
            closed: self.inner.shutdown.child_token(),
            left: AtomicBool::new(false),
            owner: Arc::clone(&self.inner),
        }))
    }
}

/// One joined handle on a local topic.
#[derive(Debug)]
pub struct LocalTopic {
    name: String,
    tx: broadcast::Sender<Bytes>,
    closed: CancellationToken,
    left: AtomicBool,
    owner: Arc<Inner>,
}

#[async_trait]
impl Topic for LocalTopic {
    async fn publish(&self, data: Bytes) -> PubSubResult<()> {
        if self.closed.is_cancelled() {
            return Err(PubSubError::Closed);
        }
        // No subscriber is not an error; the message is simply dropped.
        let _ = self.tx.send(data);
        Ok(())
    }

    async fn subscribe(&self) -> PubSubResult<Box<dyn Subscription>> {
        if self.closed.is_cancelled() {
            return Err(PubSubError::Closed);
        }
        Ok(Box::new(LocalSubscription {
            topic: self.name.clone(),
            rx: self.tx.subscribe(),
            closed: self.closed.clone(),
            cancelled: false,
        }))
    }

    async fn close(&self) -> PubSubResult<()> {
        if self.left.swap(true, Ordering::AcqRel) {
            return Err(PubSubError::AlreadyClosed);
        }
        self.closed.cancel();
        self.owner.closes.fetch_add(1, Ordering::SeqCst);
        debug!(topic = %self.name, "local topic closed");
        Ok(())
    }
}

/// Subscription on a [`LocalTopic`].
#[derive(Debug)]
pub struct LocalSubscription {
    topic: String,
    rx: broadcast::Receiver<Bytes>,
    closed: CancellationToken,
    cancelled: bool,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next(&mut self) -> PubSubResult<Bytes> {
        loop {
            if self.cancelled {
                return Err(PubSubError::Closed);
            }
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(PubSubError::Closed),
                received = self.rx.recv() => match received {
                    Ok(msg) => return Ok(msg),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %self.topic, skipped, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(PubSubError::Closed),
                },
            }
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}
