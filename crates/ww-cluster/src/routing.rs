//! Cluster membership view.
//!
//! The anchor namespace enumerates hosts through a [`RoutingTable`]. How the
//! table is populated (announcements, gossip) is not this crate's concern;
//! [`InMemoryRoutingTable`] is a local implementation that the node host
//! feeds with its own heartbeat and that tests fill by hand.

use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use ww_types::{PeerId, Record};

use crate::error::ClusterResult;

/// Read access to the cluster membership view.
#[async_trait]
pub trait RoutingTable: Send + Sync {
    /// Live records, in view order.
    async fn iter(&self) -> ClusterResult<Vec<Record>>;

    /// The live record for `peer`, if any.
    async fn lookup(&self, peer: &PeerId) -> ClusterResult<Option<Record>> {
        Ok(self.iter().await?.into_iter().find(|r| r.peer == *peer))
    }
}

/// Membership view held in process memory.
///
/// Records keep the order in which their peer first appeared. Expired
/// records stay stored until [`InMemoryRoutingTable::expire`] runs but are
/// never returned.
#[derive(Debug, Default)]
pub struct InMemoryRoutingTable {
    records: RwLock<Vec<Record>>,
}

impl InMemoryRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `record.peer`.
    ///
    /// An existing record is only replaced by one with a higher sequence
    /// number. Returns `true` if the table changed.
    pub fn upsert(&self, record: Record) -> bool {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.peer == record.peer) {
            Some(existing) if existing.seq >= record.seq => false,
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                debug!(peer = %record.peer.short_id(), seq = record.seq, "peer joined view");
                records.push(record);
                true
            }
        }
    }

    /// Remove the record for `peer`. Returns `true` if it was present.
    pub fn remove(&self, peer: &PeerId) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.peer != *peer);
        before != records.len()
    }

    /// Drop every record expired at `now`, returning how many were removed.
    pub fn expire(&self, now: Instant) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| {
            let expired = r.is_expired(now);
            if expired {
                debug!(peer = %r.peer.short_id(), seq = r.seq, "peer expired from view");
            }
            !expired
        });
        before - records.len()
    }

    /// Records live at `now`.
    pub fn snapshot(&self, now: Instant) -> Vec<Record> {
        self.records
            .read()
            .iter()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RoutingTable for InMemoryRoutingTable {
    async fn iter(&self) -> ClusterResult<Vec<Record>> {
        Ok(self.snapshot(Instant::now()))
    }

    async fn lookup(&self, peer: &PeerId) -> ClusterResult<Option<Record>> {
        let now = Instant::now();
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.peer == *peer && !r.is_expired(now))
            .cloned())
    }
}
