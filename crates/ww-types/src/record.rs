use std::time::{Duration, Instant};

use crate::peer::PeerId;

/// Longest lifetime a deadline is computed for. Longer ttls are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One entry of the cluster membership view.
///
/// A peer announces itself periodically with a monotonically increasing
/// `seq`. Each announcement is valid for `ttl`; the record is considered
/// dead once `deadline` has passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Identity of the announcing peer.
    pub peer: PeerId,
    /// Announcement sequence number. Higher supersedes lower.
    pub seq: u64,
    /// Validity period of this announcement.
    pub ttl: Duration,
    /// Instant after which the record is expired.
    pub deadline: Instant,
}

impl Record {
    /// Create a record that expires `ttl` from now.
    pub fn new(peer: PeerId, seq: u64, ttl: Duration) -> Self {
        Self {
            peer,
            seq,
            ttl,
            deadline: deadline(Instant::now(), ttl),
        }
    }

    /// Returns `true` if the record has expired at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// The next announcement for the same peer: `seq + 1`, deadline reset.
    pub fn renewed(&self) -> Self {
        Self::new(self.peer, self.seq + 1, self.ttl)
    }

    /// Time remaining until expiry, zero if already expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

fn deadline(now: Instant, ttl: Duration) -> Instant {
    let mut ttl = ttl.min(MAX_TTL);
    loop {
        match now.checked_add(ttl) {
            Some(deadline) => return deadline,
            None => ttl /= 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_live() {
        let rec = Record::new(PeerId::ephemeral(), 0, Duration::from_secs(10));
        assert!(!rec.is_expired(Instant::now()));
        assert!(rec.remaining(Instant::now()) > Duration::ZERO);
    }

    #[test]
    fn record_expires_at_deadline() {
        let rec = Record::new(PeerId::ephemeral(), 0, Duration::from_secs(10));
        assert!(rec.is_expired(rec.deadline));
        assert!(rec.is_expired(rec.deadline + Duration::from_millis(1)));
        assert_eq!(rec.remaining(rec.deadline), Duration::ZERO);
    }

    #[test]
    fn renewed_bumps_sequence() {
        let rec = Record::new(PeerId::ephemeral(), 7, Duration::from_secs(1));
        let next = rec.renewed();
        assert_eq!(next.peer, rec.peer);
        assert_eq!(next.seq, 8);
        assert!(next.deadline >= rec.deadline);
    }

    #[test]
    fn huge_ttl_does_not_overflow() {
        let rec = Record::new(PeerId::ephemeral(), 0, Duration::MAX);
        assert_eq!(rec.ttl, Duration::MAX);
        assert!(!rec.is_expired(Instant::now()));
        assert!(rec.remaining(Instant::now()) <= MAX_TTL);
        assert_eq!(rec.renewed().seq, 1);
    }
}
