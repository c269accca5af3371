//! The concrete diarization pipeline (C7) and multi-track audio assembly
//! (C8) built on top of `reflector-engine`'s DAG primitives.

pub mod audio;
pub mod blob;
pub mod notify;
pub mod webvtt;
pub mod workflow_defs;

pub use blob::{BlobStore, MemoryBlobStore};
pub use notify::{NullNotifier, Notifier, WebhookNotifier};
pub use workflow_defs::{
    ConsentRepo, MemoryConsentRepo, MemoryParticipantRepo, MemoryRecordingRepo, ParticipantInfo,
    ParticipantRepo, PipelineContext, RecordingInfo, RecordingRepo, TrackInput, WorkflowInput,
    start_workflow,
};
