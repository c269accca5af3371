mod clients;
mod coordinator;
mod engine;
mod observability;
mod server;
mod storage;

pub use clients::*;
pub use coordinator::*;
pub use engine::*;
pub use observability::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.storage.default_bucket.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "storage.default_bucket".into(),
                message: "default_bucket must not be empty".into(),
            });
        }

        for (name, endpoint) in [
            ("clients.asr", &self.clients.asr),
            ("clients.diarization", &self.clients.diarization),
            ("clients.translation", &self.clients.translation),
            ("clients.llm", &self.clients.llm),
        ] {
            if endpoint.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: name.into(),
                    message: "no base_url configured — calls to this service will fail".into(),
                });
            } else if !endpoint.base_url.starts_with("http://")
                && !endpoint.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: name.into(),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        endpoint.base_url
                    ),
                });
            }
        }

        if !self.engine.pools.contains_key("cpu-heavy") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "engine.pools".into(),
                message: "no \"cpu-heavy\" pool configured — mixdown will not be serialised"
                    .into(),
            });
        } else if self.engine.pools.get("cpu-heavy") != Some(&1) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "engine.pools.cpu-heavy".into(),
                message: "cpu-heavy pool should have exactly 1 slot to serialise mixdown".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_only_warnings() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(
            issues.iter().all(|i| i.severity == ConfigSeverity::Warning),
            "unexpected errors in default config: {issues:?}"
        );
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "server.port" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn bad_url_scheme_is_an_error() {
        let mut cfg = Config::default();
        cfg.clients.asr.base_url = "ftp://example.com".into();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "clients.asr" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn misconfigured_cpu_heavy_pool_warns() {
        let mut cfg = Config::default();
        cfg.engine.pools.insert("cpu-heavy".into(), 4);
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.field == "engine.pools.cpu-heavy"));
    }
}
