//! One-shot poll-request flags (spec §4.3, §5, testable property 7).
//!
//! A worker sets the flag to ask its peer to re-check room state; the peer
//! claims it exactly once, which both consumes the request and tells the
//! peer it actually happened (so it knows a re-check is due instead of
//! polling blind). Equivalent to a Redis `GETDEL`.

use std::collections::HashSet;

use parking_lot::Mutex;

#[derive(Default)]
pub struct PollFlagRegistry {
    flags: Mutex<HashSet<String>>,
}

impl PollFlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a poll for `room_id`. Returns `true` if this call set a
    /// flag that wasn't already pending (idempotent — a second request
    /// before the first is claimed is a no-op).
    pub fn request(&self, room_id: &str) -> bool {
        self.flags.lock().insert(room_id.to_string())
    }

    /// Atomically take and clear the flag for `room_id`. Returns `true`
    /// exactly once per [`request`](Self::request) call, no matter how
    /// many callers race to claim it.
    pub fn claim(&self, room_id: &str) -> bool {
        self.flags.lock().remove(room_id)
    }

    pub fn is_pending(&self, room_id: &str) -> bool {
        self.flags.lock().contains(room_id)
    }
}
