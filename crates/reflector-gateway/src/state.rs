//! Shared application state for the gateway process.
//!
//! One `AppState` is built once in [`crate::bootstrap::build_app_state`] and
//! cloned cheaply into every connection handler — every field is already
//! `Arc`-wrapped, mirroring the teacher's `AppState` shape.

use std::sync::Arc;

use reflector_coordinator::{PendingJoinTracker, PollFlagRegistry, RoomLockRegistry};
use reflector_domain::config::Config;
use reflector_engine::Engine;
use reflector_pipeline::{MemoryParticipantRepo, MemoryRecordingRepo, PipelineContext};
use reflector_store::TranscriptStore;

use crate::event_bus::EventBus;

#[derive(Clone)]
#[allow(dead_code)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<TranscriptStore>,
    pub engine: Arc<Engine>,
    pub bus: Arc<EventBus>,
    pub pipeline: Arc<PipelineContext>,

    /// Same in-memory stores `pipeline.recordings`/`pipeline.participants`
    /// wrap as trait objects, kept here concretely so the `run` CLI command
    /// can seed them without a recording/participant HTTP API (out of scope).
    pub recordings: Arc<MemoryRecordingRepo>,
    pub participants: Arc<MemoryParticipantRepo>,

    /// Cross-worker coordination primitives (C5). `pipeline.locks` already
    /// holds the same `RoomLockRegistry`; kept here too for components (the
    /// `run` CLI command, future admin surfaces) that don't otherwise touch
    /// `PipelineContext`.
    pub locks: Arc<RoomLockRegistry>,
    pub poll_flags: Arc<PollFlagRegistry>,
    pub pending_joins: Arc<PendingJoinTracker>,

    /// Bearer token expected in the WebSocket subprotocol negotiation
    /// (spec §4.2). `None` disables auth (dev mode), mirroring the
    /// teacher's `SA_NODE_TOKEN` fallback.
    pub ws_token: Option<String>,
}
