//! Worker pools partitioned by label (spec §4.4/§5): `"llm-io"` with many
//! slots, `"cpu-heavy"` with exactly one so mixdown serialises. Adapts the
//! teacher's per-session `Semaphore` map to per-label pools configured at
//! startup instead of created lazily per key.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct WorkerPools {
    pools: HashMap<String, Arc<Semaphore>>,
}

impl WorkerPools {
    pub fn from_config(pools: &HashMap<String, usize>) -> Self {
        Self {
            pools: pools
                .iter()
                .map(|(label, slots)| (label.clone(), Arc::new(Semaphore::new((*slots).max(1)))))
                .collect(),
        }
    }

    /// Acquire one slot in `label`'s pool. Suspends (cooperatively — this is
    /// a task suspension point that must also observe cancellation, which
    /// callers enforce via `tokio::select!` against the cancel token).
    pub async fn acquire(&self, label: &str) -> OwnedSemaphorePermit {
        let sem = self
            .pools
            .get(label)
            .cloned()
            .unwrap_or_else(|| Arc::new(Semaphore::new(1)));
        sem.acquire_owned()
            .await
            .expect("pool semaphores are never closed")
    }

    pub fn slots(&self, label: &str) -> usize {
        self.pools.get(label).map(|s| s.available_permits()).unwrap_or(0)
    }
}
