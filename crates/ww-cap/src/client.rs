use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::trace;

use crate::error::{CapError, CapResult};
use crate::policy::Policy;

/// The server side of a capability.
///
/// Implementations are shared by every [`Client`] of the same export and
/// therefore must be `Send + Sync`.
pub trait Server: Send + Sync + 'static {
    /// Called exactly once, when the last client reference is released.
    fn shutdown(&self) {}
}

/// The shared state behind every client of one export.
struct Export<S: Server> {
    server: S,
    calls: Semaphore,
    policy: Policy,
}

impl<S: Server> Drop for Export<S> {
    fn drop(&mut self) {
        self.calls.close();
        self.server.shutdown();
        trace!(server = std::any::type_name::<S>(), "capability shut down");
    }
}

/// A counted reference to an exported [`Server`].
///
/// Cloning is [`Client::add_ref`]; dropping is [`Client::release`].
pub struct Client<S: Server> {
    export: Arc<Export<S>>,
}

impl<S: Server> Client<S> {
    /// Export `server` under `policy`, returning its first reference.
    pub fn export(server: S, policy: &Policy) -> Self {
        trace!(
            server = std::any::type_name::<S>(),
            max_calls = policy.slots(),
            "capability exported"
        );
        Self {
            export: Arc::new(Export {
                server,
                calls: Semaphore::new(policy.slots()),
                policy: *policy,
            }),
        }
    }

    /// Take an additional reference to the same export.
    pub fn add_ref(&self) -> Self {
        Self {
            export: Arc::clone(&self.export),
        }
    }

    /// Drop this reference. The server shuts down once no reference remains.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live references to the export.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.export)
    }

    /// Returns `true` if both clients refer to the same export.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.export, &other.export)
    }

    /// The policy this capability was exported with.
    pub fn policy(&self) -> Policy {
        self.export.policy
    }

    /// Number of call slots currently free.
    pub fn available_calls(&self) -> usize {
        self.export.calls.available_permits()
    }

    /// Wait for a call slot and return a guard granting access to the server.
    pub async fn acquire(&self) -> CapResult<CallGuard<'_, S>> {
        let permit = self
            .export
            .calls
            .acquire()
            .await
            .map_err(|_| CapError::Released)?;
        Ok(CallGuard {
            server: &self.export.server,
            _permit: permit,
        })
    }

    /// Take a call slot without waiting.
    pub fn try_acquire(&self) -> CapResult<CallGuard<'_, S>> {
        match self.export.calls.try_acquire() {
            Ok(permit) => Ok(CallGuard {
                server: &self.export.server,
                _permit: permit,
            }),
            Err(TryAcquireError::NoPermits) => Err(CapError::Busy {
                max: self.export.policy.slots(),
            }),
            Err(TryAcquireError::Closed) => Err(CapError::Released),
        }
    }
}

impl<S: Server> Clone for Client<S> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

impl<S: Server> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("server", &std::any::type_name::<S>())
            .field("refs", &self.ref_count())
            .field("policy", &self.export.policy)
            .finish()
    }
}

/// Access to a server for the duration of one call.
pub struct CallGuard<'a, S> {
    server: &'a S,
    _permit: SemaphorePermit<'a>,
}

impl<S> Deref for CallGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.server
    }
}
