use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blob storage (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the blob store client. The store itself is an
/// external collaborator (spec §1); this only carries what the core
/// needs to address it — default bucket and presign TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_bucket")]
    pub default_bucket: String,
    #[serde(default = "d_presign_ttl")]
    pub presign_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_bucket: d_bucket(),
            presign_ttl_secs: d_presign_ttl(),
        }
    }
}

fn d_bucket() -> String {
    "reflector".into()
}

fn d_presign_ttl() -> u64 {
    7_200
}
