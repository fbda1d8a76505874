use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::{PubSubError, PubSubResult};
use crate::substrate::Topic;

/// Runs once, when the reference count of a [`RefTopic`] reaches zero.
pub type Teardown = Box<dyn FnOnce(&RefTopic) + Send>;

struct State {
    refs: usize,
    teardown: Option<Teardown>,
}

/// A joined topic shared by every capability built over it.
///
/// Starts with one reference. Each additional capability or subscription
/// takes another; the teardown registered at construction runs exactly once
/// when the count reaches zero. A topic at zero can never be revived.
pub struct RefTopic {
    name: String,
    topic: Arc<dyn Topic>,
    scope: CancellationToken,
    state: Mutex<State>,
}

impl RefTopic {
    /// Wrap a joined topic. `scope` is cancelled on teardown.
    pub fn new(
        name: impl Into<String>,
        topic: Arc<dyn Topic>,
        scope: CancellationToken,
        teardown: Teardown,
    ) -> Self {
        Self {
            name: name.into(),
            topic,
            scope,
            state: Mutex::new(State {
                refs: 1,
                teardown: Some(teardown),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    /// Cancellation scope of everything running on behalf of this topic.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Returns `true` once torn down or once the owning registry shut down.
    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// The underlying joined topic.
    pub fn topic(&self) -> &Arc<dyn Topic> {
        &self.topic
    }

    /// Take a reference unless the count already reached zero.
    pub fn try_add_ref(&self) -> bool {
        let mut state = self.state.lock();
        if state.refs == 0 {
            return false;
        }
        state.refs += 1;
        true
    }

    /// Take a reference, failing with [`PubSubError::Closed`] once torn down.
    pub fn add_ref(self: &Arc<Self>) -> PubSubResult<Arc<Self>> {
        if self.try_add_ref() {
            Ok(Arc::clone(self))
        } else {
            Err(PubSubError::Closed)
        }
    }

    /// Drop one reference, tearing the topic down at zero.
    ///
    /// Releases past zero are ignored.
    pub fn release(&self) {
        let teardown = {
            let mut state = self.state.lock();
            match state.refs {
                0 => {
                    warn!(topic = %self.name, "release of torn down topic ignored");
                    return;
                }
                1 => {
                    state.refs = 0;
                    state.teardown.take()
                }
                _ => {
                    state.refs -= 1;
                    trace!(topic = %self.name, refs = state.refs, "topic released");
                    None
                }
            }
        };

        if let Some(teardown) = teardown {
            self.scope.cancel();
            teardown(self);
        }
    }

    /// Forward `data` to the joined topic.
    pub async fn publish(&self, data: Bytes) -> PubSubResult<()> {
        if self.is_closed() {
            return Err(PubSubError::Closed);
        }
        self.topic.publish(data).await
    }
}

impl fmt::Debug for RefTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefTopic")
            .field("name", &self.name)
            .field("refs", &self.ref_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
