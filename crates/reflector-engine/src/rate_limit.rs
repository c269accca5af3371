//! Named rate-limit buckets with "N units per second" semantics (spec
//! §4.4). A task that can't acquire a unit waits cooperatively without
//! holding a worker-pool slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    units_per_second: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(units_per_second: f64) -> Self {
        Self {
            units_per_second,
            tokens: units_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.units_per_second).min(self.units_per_second);
        self.last_refill = now;
    }

    /// Try to take one unit; if unavailable, returns how long to wait
    /// before the next attempt is likely to succeed.
    fn try_take(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.units_per_second))
        }
    }
}

pub struct RateLimiters {
    buckets: HashMap<String, Arc<Mutex<Bucket>>>,
}

impl RateLimiters {
    pub fn from_config(rate_limits: &HashMap<String, f64>) -> Self {
        Self {
            buckets: rate_limits
                .iter()
                .map(|(name, ups)| (name.clone(), Arc::new(Mutex::new(Bucket::new(*ups)))))
                .collect(),
        }
    }

    /// Wait until one unit is available in `bucket_name`'s bucket. A task
    /// with no configured bucket passes through immediately.
    pub async fn acquire(&self, bucket_name: &str) {
        let Some(bucket) = self.buckets.get(bucket_name) else {
            return;
        };
        loop {
            let wait = {
                let mut b = bucket.lock();
                match b.try_take() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
