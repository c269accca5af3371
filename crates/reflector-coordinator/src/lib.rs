//! Cross-worker coordination primitives (C5): room locks, one-shot poll
//! flags, and pending-join tracking. All realized in-process — the
//! spec scopes out any particular storage backend, so where the original
//! system reached for Redis we use atomics and `parking_lot` mutexes
//! scoped to the single gateway process.

pub mod lock;
pub mod pending_join;
pub mod poll_flag;

pub use lock::{RoomLockGuard, RoomLockRegistry};
pub use pending_join::PendingJoinTracker;
pub use poll_flag::PollFlagRegistry;
