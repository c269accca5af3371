//! Fire-and-forget notifiers (spec §4.5 steps 12, §7): failures are logged
//! and never propagate, mirroring `original_source/hatchet/broadcast.py`'s
//! try/except-and-log pattern.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, transcript_id: &str, message: &str);
}

/// Discards every notification. Default when no webhook/Zulip target is
/// configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _transcript_id: &str, _message: &str) {}
}

/// Posts a JSON payload to a configured webhook URL. Errors are logged and
/// swallowed — a notifier can never fail the workflow.
pub struct WebhookNotifier {
    pub url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, transcript_id: &str, message: &str) {
        let body = serde_json::json!({ "transcript_id": transcript_id, "message": message });
        if let Err(err) = self.http.post(&self.url).json(&body).send().await {
            tracing::warn!(transcript_id, %err, "webhook notify failed");
        }
    }
}
