use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use ww_cluster::InMemoryRoutingTable;
use ww_types::{PeerId, Record};

/// Keeps the local peer's record alive in the membership view.
///
/// Every beat announces the record with the next sequence number and a
/// fresh deadline, then drops records whose deadline has passed.
#[derive(Debug)]
pub struct Heartbeat {
    view: Arc<InMemoryRoutingTable>,
    record: Record,
}

impl Heartbeat {
    /// Announce `peer` with sequence zero.
    pub fn announce(view: Arc<InMemoryRoutingTable>, peer: PeerId, ttl: Duration) -> Self {
        let record = Record::new(peer, 0, ttl);
        view.upsert(record.clone());
        debug!(peer = %peer.short_id(), ttl_ms = ttl.as_millis() as u64, "local peer announced");
        Self { view, record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Interval between beats, half the record lifetime.
    pub fn period(&self) -> Duration {
        (self.record.ttl / 2).max(Duration::from_millis(1))
    }

    /// Renew the local record and expire stale ones. Returns how many
    /// records expired.
    pub fn beat(&mut self, now: Instant) -> usize {
        self.record = self.record.renewed();
        self.view.upsert(self.record.clone());
        let expired = self.view.expire(now);
        trace!(seq = self.record.seq, expired, "heartbeat");
        expired
    }

    /// Beat every [`period`](Heartbeat::period) until `cancel` fires, then
    /// withdraw the local record.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period());
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.beat(Instant::now());
                    }
                }
            }
            self.view.remove(&self.record.peer);
            debug!(peer = %self.record.peer.short_id(), "local peer withdrawn");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ww_cluster::RoutingTable;

    #[tokio::test]
    async fn announce_inserts_record() {
        let view = Arc::new(InMemoryRoutingTable::new());
        let peer = PeerId::ephemeral();
        let hb = Heartbeat::announce(Arc::clone(&view), peer, Duration::from_secs(10));

        let rec = view.lookup(&peer).await.unwrap().unwrap();
        assert_eq!(rec.seq, 0);
        assert_eq!(hb.period(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn beat_renews_and_expires() {
        let view = Arc::new(InMemoryRoutingTable::new());
        let peer = PeerId::ephemeral();
        let stale = PeerId::ephemeral();
        view.upsert(Record::new(stale, 0, Duration::ZERO));

        let mut hb = Heartbeat::announce(Arc::clone(&view), peer, Duration::from_secs(10));
        assert_eq!(hb.beat(Instant::now()), 1);
        assert_eq!(hb.record().seq, 1);

        let rec = view.lookup(&peer).await.unwrap().unwrap();
        assert_eq!(rec.seq, 1);
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn spawned_heartbeat_withdraws_on_cancel() {
        let view = Arc::new(InMemoryRoutingTable::new());
        let peer = PeerId::ephemeral();
        let cancel = CancellationToken::new();
        let task = Heartbeat::announce(Arc::clone(&view), peer, Duration::from_millis(20))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let rec = view.lookup(&peer).await.unwrap().unwrap();
        assert!(rec.seq >= 1);

        cancel.cancel();
        task.await.unwrap();
        assert!(view.lookup(&peer).await.unwrap().is_none());
    }
}
