use serde::{Deserialize, Serialize};

/// Default bound on concurrently in-flight calls per exported capability.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 64;

/// Per-capability call policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum number of calls admitted at once. Values below one are
    /// treated as one.
    pub max_concurrent_calls: usize,
}

impl Policy {
    pub fn new(max_concurrent_calls: usize) -> Self {
        Self { max_concurrent_calls }
    }

    /// Effective number of call slots.
    pub fn slots(&self) -> usize {
        self.max_concurrent_calls.max(1)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_CALLS)
    }
}
