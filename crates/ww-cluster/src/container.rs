use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

/// Byte blobs stored by container anchors, keyed by joined anchor path.
///
/// One store is shared by every container anchor of an
/// [`AnchorServer`](crate::AnchorServer). Writes are last-writer-wins.
#[derive(Debug, Default)]
pub struct ContainerStore {
    values: Mutex<HashMap<String, Bytes>>,
}

impl ContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: Bytes) {
        self.values.lock().insert(key.to_string(), value);
    }

    /// The value under `key`, or empty bytes if nothing was stored.
    pub fn get(&self, key: &str) -> Bytes {
        self.values.lock().get(key).cloned().unwrap_or_default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}
