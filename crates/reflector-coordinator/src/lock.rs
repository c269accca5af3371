//! Room-scoped exclusive locks (spec §4.3/§5).
//!
//! Reworks the teacher's per-session `Semaphore(1)` pattern into a TTL'd
//! lock: a held lock that outlives its TTL is assumed to belong to a dead
//! holder and can be stolen by the next acquirer, the same trade-off the
//! original system made with a Redis `SETEX` key instead of an in-process
//! semaphore.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use reflector_domain::error::{Error, Result};

struct LockState {
    holder: Uuid,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockState {
    fn expired(&self) -> bool {
        self.acquired_at.elapsed() > self.ttl
    }
}

/// Registry of room locks, one `LockState` per currently-held room.
#[derive(Default)]
pub struct RoomLockRegistry {
    locks: Mutex<HashMap<String, LockState>>,
}

impl RoomLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `room_id`. Fails with [`Error::Locked`] if
    /// another live holder has it; a holder past its TTL is treated as
    /// abandoned and silently replaced.
    pub fn acquire(self: &Arc<Self>, room_id: &str, ttl: Duration) -> Result<RoomLockGuard> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(room_id) {
            if !existing.expired() {
                return Err(Error::Locked(room_id.to_string()));
            }
        }

        let holder = Uuid::new_v4();
        locks.insert(
            room_id.to_string(),
            LockState {
                holder,
                acquired_at: Instant::now(),
                ttl,
            },
        );

        Ok(RoomLockGuard {
            registry: self.clone(),
            room_id: room_id.to_string(),
            holder,
        })
    }

    pub fn is_locked(&self, room_id: &str) -> bool {
        self.locks
            .lock()
            .get(room_id)
            .map(|l| !l.expired())
            .unwrap_or(false)
    }

    fn release(&self, room_id: &str, holder: Uuid) {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(room_id) {
            if existing.holder == holder {
                locks.remove(room_id);
            }
        }
    }
}

/// RAII guard: releases the room lock on drop, unless it's already been
/// superseded by a stolen (expired) lock held by someone else.
pub struct RoomLockGuard {
    registry: Arc<RoomLockRegistry>,
    room_id: String,
    holder: Uuid,
}

impl Drop for RoomLockGuard {
    fn drop(&mut self) {
        self.registry.release(&self.room_id, self.holder);
    }
}

impl std::fmt::Debug for RoomLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomLockGuard")
            .field("room_id", &self.room_id)
            .field("holder", &self.holder)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let reg = Arc::new(RoomLockRegistry::new());
        let _guard = reg.acquire("room-1", Duration::from_secs(10)).unwrap();
        let err = reg.acquire("room-1", Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, Error::Locked(_)));
    }

    #[test]
    fn lock_releases_on_drop() {
        let reg = Arc::new(RoomLockRegistry::new());
        {
            let _guard = reg.acquire("room-1", Duration::from_secs(10)).unwrap();
            assert!(reg.is_locked("room-1"));
        }
        assert!(!reg.is_locked("room-1"));
    }

    #[test]
    fn expired_lock_can_be_stolen() {
        let reg = Arc::new(RoomLockRegistry::new());
        let guard = reg.acquire("room-1", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = reg.acquire("room-1", Duration::from_secs(10));
        assert!(second.is_ok());
        drop(guard); // must not clobber the new holder's lock
        assert!(reg.is_locked("room-1"));
    }

    #[test]
    fn independent_rooms_dont_contend() {
        let reg = Arc::new(RoomLockRegistry::new());
        let _a = reg.acquire("room-a", Duration::from_secs(10)).unwrap();
        let _b = reg.acquire("room-b", Duration::from_secs(10)).unwrap();
    }
}
