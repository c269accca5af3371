//! Progress emission (spec §4.4): after every task state transition the
//! engine reports `{current_step, step_index, total_steps, step_status}`
//! for the transcript the task belongs to. Emission is fire-and-forget —
//! a sink failure never fails the task, mirroring [`crate::cancel`]'s
//! decoupling from the store via a trait the pipeline crate implements.

use serde::Serialize;

use crate::task::TaskStatus;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineProgress {
    pub current_step: String,
    pub step_index: u32,
    pub total_steps: u32,
    pub step_status: TaskStatus,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, transcript_id: &str, progress: PipelineProgress);
}

/// Sink that discards every update. Useful for engine-only tests that don't
/// care about progress fan-out.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _transcript_id: &str, _progress: PipelineProgress) {}
}
