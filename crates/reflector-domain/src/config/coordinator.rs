use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator (C5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// `room:{room_id}` workflow-start serialisation lock TTL.
    #[serde(default = "d_lock_ttl")]
    pub room_lock_ttl_secs: u64,
    /// `pending_join:{meeting_id}:{user_id}` TTL (spec §3).
    #[serde(default = "d_pending_join_ttl")]
    pub pending_join_ttl_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            room_lock_ttl_secs: d_lock_ttl(),
            pending_join_ttl_secs: d_pending_join_ttl(),
        }
    }
}

fn d_lock_ttl() -> u64 {
    10
}

fn d_pending_join_ttl() -> u64 {
    30
}
