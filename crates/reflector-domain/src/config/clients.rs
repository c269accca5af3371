use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// External service clients (C2): ASR, diarization, translation, LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One client endpoint: base URL + auth + timeout. Shared shape for
/// ASR/diarization/translation/LLM backends (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub base_url: String,
    /// Env var holding the bearer token, if any.
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default = "d_short_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token_env: None,
            timeout_ms: d_short_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    #[serde(default)]
    pub asr: EndpointConfig,
    #[serde(default)]
    pub diarization: EndpointConfig,
    #[serde(default)]
    pub translation: EndpointConfig,
    #[serde(default = "d_llm_endpoint")]
    pub llm: EndpointConfig,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            asr: EndpointConfig::default(),
            diarization: EndpointConfig::default(),
            translation: EndpointConfig::default(),
            llm: d_llm_endpoint(),
        }
    }
}

/// Heavy (transcription/LLM) calls default to a longer timeout than the
/// generic short one, per spec §4.7 (60s short / 600s heavy).
fn d_llm_endpoint() -> EndpointConfig {
    EndpointConfig {
        base_url: String::new(),
        auth_token_env: None,
        timeout_ms: d_heavy_timeout_ms(),
    }
}

fn d_short_timeout_ms() -> u64 {
    60_000
}

fn d_heavy_timeout_ms() -> u64 {
    600_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_asr_uses_short_timeout() {
        assert_eq!(ClientsConfig::default().asr.timeout_ms, 60_000);
    }

    #[test]
    fn default_llm_uses_heavy_timeout() {
        assert_eq!(ClientsConfig::default().llm.timeout_ms, 600_000);
    }
}
