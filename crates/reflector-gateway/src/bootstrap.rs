//! `AppState` construction, shared by the `serve` and `run` CLI commands the
//! same way the teacher's `build_app_state`/`spawn_background_tasks` pair is
//! shared across `serve`/`run`/`chat`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use reflector_clients::HttpClient;
use reflector_coordinator::{PendingJoinTracker, PollFlagRegistry, RoomLockRegistry};
use reflector_domain::config::{Config, ConfigSeverity};
use reflector_engine::{CancelMap, Engine, RateLimiters, WorkerPools, WorkflowRunStore};
use reflector_pipeline::{
    MemoryBlobStore, MemoryConsentRepo, MemoryParticipantRepo, MemoryRecordingRepo, NullNotifier,
    PipelineContext, WebhookNotifier,
};

use crate::event_bus::EventBus;
use crate::state::AppState;

/// Validate `config`, wire every subsystem, and return a fully-built
/// [`AppState`]. `state_dir` backs the transcript store and the workflow
/// run log (spec's DB/migrations are out of scope — this is the in-process
/// durable substitute, per `reflector-store`'s own doc comment).
pub fn build_app_state(config: Arc<Config>, state_dir: &Path) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    let bus = Arc::new(EventBus::new());

    let store = Arc::new(
        reflector_store::TranscriptStore::new(state_dir, bus.clone())
            .context("initializing transcript store")?,
    );
    tracing::info!(dir = %state_dir.display(), "transcript store ready");

    let engine = Arc::new(Engine::new(
        WorkerPools::from_config(&config.engine.pools),
        RateLimiters::from_config(
            &config
                .engine
                .rate_limits
                .iter()
                .map(|(k, v)| (k.clone(), v.units_per_second))
                .collect(),
        ),
        Arc::new(CancelMap::new()),
        Arc::new(WorkflowRunStore::new(state_dir)),
        bus.clone(),
    ));
    tracing::info!(
        pools = config.engine.pools.len(),
        rate_limits = config.engine.rate_limits.len(),
        "DAG engine ready"
    );

    let locks = Arc::new(RoomLockRegistry::new());
    let poll_flags = Arc::new(PollFlagRegistry::new());
    let pending_joins = Arc::new(PendingJoinTracker::new());
    tracing::info!("coordinator primitives ready");

    let blobs = Arc::new(MemoryBlobStore::new());
    let recordings = Arc::new(MemoryRecordingRepo::default());
    let participants = Arc::new(MemoryParticipantRepo::default());
    let consents = Arc::new(MemoryConsentRepo::default());
    let recordings_concrete = recordings.clone();
    let participants_concrete = participants.clone();

    let transcriber = Arc::new(HttpClient::new("asr", &config.clients.asr));
    let generator = Arc::new(HttpClient::new("llm", &config.clients.llm));
    tracing::info!("external service clients ready");

    let zulip = build_notifier("REFLECTOR_ZULIP_WEBHOOK_URL");
    let webhook = build_notifier("REFLECTOR_WEBHOOK_URL");

    let pipeline = Arc::new(PipelineContext {
        store: store.clone(),
        engine: engine.clone(),
        blobs,
        recordings,
        participants,
        consents,
        transcriber,
        generator,
        locks: locks.clone(),
        zulip,
        webhook,
    });

    let ws_token = std::env::var("REFLECTOR_WS_TOKEN").ok().filter(|t| !t.is_empty());
    match &ws_token {
        Some(_) => tracing::info!("WebSocket bearer-token auth enabled"),
        None => tracing::warn!("WebSocket bearer-token auth DISABLED — set REFLECTOR_WS_TOKEN to enable"),
    }

    Ok(AppState {
        config,
        store,
        engine,
        bus,
        pipeline,
        recordings: recordings_concrete,
        participants: participants_concrete,
        locks,
        poll_flags,
        pending_joins,
        ws_token,
    })
}

fn build_notifier(env_var: &str) -> Arc<dyn reflector_pipeline::Notifier> {
    match std::env::var(env_var) {
        Ok(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)),
        _ => Arc::new(NullNotifier),
    }
}

/// Spawn the long-running background tasks (coordinator TTL pruning),
/// mirroring the teacher's periodic-interval pattern in
/// `spawn_background_tasks`. Call after [`build_app_state`] when running the
/// WebSocket server; the one-shot `run` command skips this.
pub fn spawn_background_tasks(state: &AppState) {
    let pending_joins = state.pending_joins.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let count = pending_joins.pending_count();
            tracing::debug!(count, "pending-join sweep tick");
        }
    });
    tracing::info!("background tasks spawned");
}
