//! Registry of joined topics.
//!
//! [`TopicRegistry`] maps topic names to shared [`RefTopic`]s. The first
//! request for a name joins it on the substrate; later requests share the
//! same topic and bump its count. When the count reaches zero the entry is
//! removed and the topic is closed in the background.
//!
//! Each subscription runs a fan-out task that pulls from the substrate and
//! pushes into the subscriber's handler. Every background task of the
//! registry is tracked, so [`TopicRegistry::close`] returns only once all of
//! them have finished.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use ww_cap::Client;

use crate::error::{PubSubError, PubSubResult};
use crate::handler::{push, Handler};
use crate::substrate::{Subscription, TopicJoiner};
use crate::topic::{RefTopic, Teardown};

/// Topic registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Cluster namespace, attached to every log record of the registry.
    pub ns: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { ns: "ww".into() }
    }
}

/// One lock per topic name being joined, so a name is joined at most once
/// while joins of other names proceed.
#[derive(Default)]
struct JoinGates {
    gates: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JoinGates {
    async fn enter(&self, name: &str) -> JoinPermit<'_> {
        let gate = Arc::clone(self.gates.lock().entry(name.to_string()).or_default());
        let guard = Arc::clone(&gate).lock_owned().await;
        JoinPermit {
            gates: self,
            name: name.to_string(),
            gate,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.gates.lock().len()
    }
}

struct JoinPermit<'a> {
    gates: &'a JoinGates,
    name: String,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for JoinPermit<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.gates.lock();
        self.guard.take();
        // Only the map and this permit hold the gate: nobody is waiting.
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.name);
        }
    }
}

struct Inner {
    config: RegistryConfig,
    joiner: Arc<dyn TopicJoiner>,
    topics: RwLock<HashMap<String, Arc<RefTopic>>>,
    joining: JoinGates,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    closed: AtomicBool,
    runtime: Handle,
}

impl Inner {
    fn ensure_open(&self) -> PubSubResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(PubSubError::Closed);
        }
        Ok(())
    }

    /// A new reference to the live entry for `name`, if any.
    fn live(&self, name: &str) -> Option<Arc<RefTopic>> {
        let topics = self.topics.read();
        topics.get(name).and_then(|t| t.add_ref().ok())
    }

    /// Remove `topic` from the map unless a newer entry replaced it.
    fn evict(&self, topic: &RefTopic) {
        let mut topics = self.topics.write();
        let current = topics
            .get(topic.name())
            .is_some_and(|t| std::ptr::eq(Arc::as_ptr(t), topic));
        if current {
            topics.remove(topic.name());
        }
    }
}

/// Shared registry of joined topics.
///
/// Cloning yields another handle on the same registry.
#[derive(Clone)]
pub struct TopicRegistry {
    inner: Arc<Inner>,
}

impl TopicRegistry {
    /// Create a registry joining topics through `joiner`.
    ///
    /// Must be called from within a tokio runtime, which background topic
    /// closes are spawned onto.
    pub fn new(joiner: Arc<dyn TopicJoiner>, config: RegistryConfig) -> PubSubResult<Self> {
        let runtime = Handle::try_current().map_err(|_| PubSubError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                joiner,
                topics: RwLock::new(HashMap::new()),
                joining: JoinGates::default(),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                closed: AtomicBool::new(false),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Return the topic for `name`, joining it on first use.
    ///
    /// The caller owns one reference on the returned topic and must
    /// [`release`](RefTopic::release) it.
    pub async fn get_or_create(&self, name: &str) -> PubSubResult<Arc<RefTopic>> {
        self.inner.ensure_open()?;
        if let Some(topic) = self.inner.live(name) {
            return Ok(topic);
        }

        let _task = self.inner.tracker.token();
        let _joining = self.inner.joining.enter(name).await;
        self.inner.ensure_open()?;
        if let Some(topic) = self.inner.live(name) {
            return Ok(topic);
        }

        let joined = self
            .inner
            .joiner
            .join(name)
            .await
            .map_err(|e| PubSubError::JoinFailed {
                topic: name.to_string(),
                reason: e.to_string(),
            })?;

        if self.inner.shutdown.is_cancelled() {
            if let Err(e) = joined.close().await {
                error!(ns = %self.inner.config.ns, topic = name, error = %e, "unable to close topic");
            }
            return Err(PubSubError::Closed);
        }

        let topic = Arc::new(RefTopic::new(
            name,
            joined,
            self.inner.shutdown.child_token(),
            self.teardown(),
        ));
        self.inner
            .topics
            .write()
            .insert(name.to_string(), Arc::clone(&topic));
        info!(ns = %self.inner.config.ns, topic = name, "topic joined");
        Ok(topic)
    }

    /// Teardown for a topic of this registry: evict it and close it in the
    /// background, logging close failures.
    fn teardown(&self) -> Teardown {
        let owner: Weak<Inner> = Arc::downgrade(&self.inner);
        let tracker = self.inner.tracker.clone();
        let runtime = self.inner.runtime.clone();
        let ns = self.inner.config.ns.clone();

        Box::new(move |topic: &RefTopic| {
            if let Some(inner) = owner.upgrade() {
                inner.evict(topic);
            }
            debug!(ns = %ns, topic = %topic.name(), "topic torn down");

            let mut pending = PendingClose {
                ns,
                name: topic.name().to_string(),
                done: false,
            };
            let joined = Arc::clone(topic.topic());
            tracker.spawn_on(
                async move {
                    if let Err(e) = joined.close().await {
                        error!(ns = %pending.ns, topic = %pending.name, error = %e, "unable to close topic");
                    }
                    pending.done = true;
                },
                &runtime,
            );
        })
    }

    /// Publish `data` on `topic`.
    pub async fn publish(&self, topic: &RefTopic, data: Bytes) -> PubSubResult<()> {
        self.inner.ensure_open()?;
        topic.publish(data).await
    }

    /// Deliver every message of `topic` to `sink` until the topic's scope is
    /// cancelled or delivery fails.
    ///
    /// The fan-out task holds its own reference on the topic and owns
    /// `sink`, releasing both when it ends.
    pub async fn subscribe<H: Handler>(
        &self,
        topic: &Arc<RefTopic>,
        sink: Client<H>,
    ) -> PubSubResult<Uuid> {
        self.inner.ensure_open()?;
        if !topic.try_add_ref() {
            return Err(PubSubError::Closed);
        }

        // Keeps close() waiting until the subscription is running or undone.
        let _task = self.inner.tracker.token();
        let mut sub = match topic.topic().subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                topic.release();
                return Err(e);
            }
        };
        if let Err(e) = self.inner.ensure_open() {
            sub.cancel();
            topic.release();
            return Err(e);
        }

        let id = Uuid::now_v7();
        debug!(ns = %self.inner.config.ns, topic = %topic.name(), sub = %id, "subscription started");
        self.inner
            .tracker
            .spawn(fan_out(Arc::clone(topic), sub, sink, id));
        Ok(id)
    }

    /// Returns `true` if `name` has a live entry.
    pub fn contains(&self, name: &str) -> bool {
        self.refcount(name).is_some_and(|refs| refs > 0)
    }

    /// Current reference count of the entry for `name`.
    pub fn refcount(&self, name: &str) -> Option<usize> {
        self.inner.topics.read().get(name).map(|t| t.ref_count())
    }

    /// Names and reference counts of all entries, sorted by name.
    pub fn topics(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .inner
            .topics
            .read()
            .iter()
            .map(|(name, t)| (name.clone(), t.ref_count()))
            .collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.inner.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.topics.read().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fires when the registry shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Shut the registry down and wait for tracked tasks to drain.
    ///
    /// Only the first call does the work; any other call fails immediately
    /// with [`PubSubError::AlreadyClosed`].
    pub async fn close(&self) -> PubSubResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(PubSubError::AlreadyClosed);
        }
        info!(ns = %self.inner.config.ns, topics = self.len(), "closing topic registry");

        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        info!(ns = %self.inner.config.ns, "topic registry closed");
        Ok(())
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("ns", &self.inner.config.ns)
            .field("topics", &self.len())
            .field("tasks", &self.inner.tracker.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Logs a background topic close that was dropped before it ran, which
/// happens when the runtime shuts down first.
struct PendingClose {
    ns: String,
    name: String,
    done: bool,
}

impl Drop for PendingClose {
    fn drop(&mut self) {
        if !self.done {
            warn!(ns = %self.ns, topic = %self.name, "topic close abandoned, runtime is gone");
        }
    }
}

async fn fan_out<H: Handler>(
    topic: Arc<RefTopic>,
    mut sub: Box<dyn Subscription>,
    sink: Client<H>,
    id: Uuid,
) {
    let scope = topic.scope().clone();
    loop {
        let msg = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            next = sub.next() => match next {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(topic = %topic.name(), sub = %id, error = %e, "subscription pull failed");
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            pushed = push(&sink, msg) => {
                if let Err(e) = pushed {
                    debug!(topic = %topic.name(), sub = %id, error = %e, "subscription push failed");
                    break;
                }
            }
        }
    }

    topic.release();
    sub.cancel();
    drop(sink);
    debug!(topic = %topic.name(), sub = %id, "subscription ended");
}
