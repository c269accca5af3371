//! Per-run cancellation tokens with group fan-out (spec §4.4/§5).
//!
//! Each workflow run gets a `CancelToken`. Calling `cancel()` signals every
//! in-flight task for that run to stop at its next suspension point.
//! Child workflows (fan-out, chunk-topic sub-runs) register into the
//! parent's cancel group so cancelling the parent cascades to them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
    /// group_key (parent run) → set of child run ids.
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, run_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running workflow. Cascades to every child run registered in
    /// its cancel group. Returns true if a token was found for `run_id`.
    pub fn cancel(&self, run_id: &str) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(run_id) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(run_id) {
            let tokens = self.tokens.lock();
            for child in children {
                if let Some(child_token) = tokens.get(child) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    pub fn remove(&self, run_id: &str) {
        self.tokens.lock().remove(run_id);
        self.groups.lock().remove(run_id);
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.tokens.lock().contains_key(run_id)
    }

    pub fn add_to_group(&self, parent_run_id: &str, child_run_id: &str) {
        self.groups
            .lock()
            .entry(parent_run_id.to_owned())
            .or_default()
            .insert(child_run_id.to_owned());
    }
}
