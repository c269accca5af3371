use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DAG engine (C6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Worker pool sizing, keyed by pool label (spec §4.4: `"llm-io"` with many
/// slots, `"cpu-heavy"` with exactly one slot for serialised mixdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "d_pools")]
    pub pools: HashMap<String, usize>,
    #[serde(default = "d_rate_limits")]
    pub rate_limits: HashMap<String, RateLimitConfig>,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pools: d_pools(),
            rate_limits: d_rate_limits(),
            max_retries: d_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub units_per_second: f64,
}

fn d_pools() -> HashMap<String, usize> {
    let mut m = HashMap::new();
    m.insert("llm-io".to_string(), 16);
    m.insert("cpu-heavy".to_string(), 1);
    m
}

fn d_rate_limits() -> HashMap<String, RateLimitConfig> {
    let mut m = HashMap::new();
    m.insert(
        "llm-io".to_string(),
        RateLimitConfig {
            units_per_second: 10.0,
        },
    );
    m
}

fn d_max_retries() -> u32 {
    3
}
