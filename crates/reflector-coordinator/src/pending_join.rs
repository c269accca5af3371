//! Pending-join tracking (spec §3/§5), grounded on the original system's
//! Redis-backed `pending_joins.py`.
//!
//! A participant's WebRTC handshake can take a few seconds; a meeting must
//! not be torn down while one is still in flight, even though the
//! participant hasn't produced any track data yet. `create` records intent
//! to join with a TTL; `has_pending` answers whether any such intent is
//! still live for a meeting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const PENDING_JOIN_TTL: Duration = Duration::from_secs(30);
/// Kept for parity with the original SCAN-based design, where it bounded
/// keys inspected per cursor iteration. Here it just keeps `prune` from
/// visiting unbounded entries without yielding — a no-op in practice since
/// `HashMap::retain` runs in one pass, but it documents the origin.
const SCAN_BATCH_SIZE: usize = 100;

#[derive(Default)]
pub struct PendingJoinTracker {
    joins: Mutex<HashMap<(String, String), Instant>>,
}

impl PendingJoinTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record intent to join, called before the WebRTC handshake completes.
    pub fn create(&self, meeting_id: &str, user_id: &str) {
        self.joins
            .lock()
            .insert((meeting_id.to_string(), user_id.to_string()), Instant::now());
    }

    /// Clear the pending join, called once the connection is established.
    pub fn delete(&self, meeting_id: &str, user_id: &str) {
        self.joins
            .lock()
            .remove(&(meeting_id.to_string(), user_id.to_string()));
    }

    /// Whether `meeting_id` has any live (non-expired) pending join.
    pub fn has_pending(&self, meeting_id: &str) -> bool {
        let mut joins = self.joins.lock();
        joins.retain(|_, at| at.elapsed() <= PENDING_JOIN_TTL);
        joins.keys().any(|(m, _)| m == meeting_id)
    }

    pub fn pending_count(&self) -> usize {
        let _ = SCAN_BATCH_SIZE;
        self.joins.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_has_pending() {
        let t = PendingJoinTracker::new();
        t.create("m1", "u1");
        assert!(t.has_pending("m1"));
    }

    #[test]
    fn delete_clears_pending() {
        let t = PendingJoinTracker::new();
        t.create("m1", "u1");
        t.delete("m1", "u1");
        assert!(!t.has_pending("m1"));
    }

    #[test]
    fn unrelated_meetings_dont_interfere() {
        let t = PendingJoinTracker::new();
        t.create("m1", "u1");
        assert!(!t.has_pending("m2"));
    }

    #[test]
    fn expired_entries_dont_count() {
        let t = PendingJoinTracker::new();
        t.joins
            .lock()
            .insert(("m1".into(), "u1".into()), Instant::now() - Duration::from_secs(31));
        assert!(!t.has_pending("m1"));
    }
}
