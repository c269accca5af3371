use serde::Serialize;

/// Structured trace events emitted across all Reflector crates.
///
/// Every variant is serialized to a single JSON blob and logged through
/// `tracing`; this keeps ambient logging uniform without threading a
/// dedicated metrics client through every task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TranscriptCreated {
        transcript_id: String,
    },
    TranscriptMutated {
        transcript_id: String,
        change_seq: u64,
        event_name: String,
    },
    ClientCall {
        client: String,
        endpoint: String,
        duration_ms: u64,
        status: Option<u16>,
    },
    ClientRetry {
        client: String,
        endpoint: String,
        attempt: u32,
        reason: String,
    },
    TaskTransition {
        run_id: String,
        task_name: String,
        status: String,
    },
    WorkflowTerminal {
        run_id: String,
        transcript_id: String,
        status: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "reflector_event");
    }
}
