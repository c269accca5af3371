//! End-to-end diarization workflow scenarios, driven against in-memory
//! doubles for every external seam (blob store, clients, notifiers, repos).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use reflector_clients::{
    GenerateRequest, GenerateResponse, Generator, TranscribeRequest, TranscribeResponse,
    Transcriber,
};
use reflector_coordinator::RoomLockRegistry;
use reflector_domain::error::{Error, Result};
use reflector_domain::model::{TranscriptStatus, Word};
use reflector_engine::{
    CancelMap, Engine, NullProgressSink, RateLimiters, WorkerPools, WorkflowRunStore, WorkflowStatus,
};
use reflector_pipeline::workflow_defs::{
    start_workflow, MemoryConsentRepo, MemoryParticipantRepo, MemoryRecordingRepo, ParticipantInfo,
    ParticipantRepo, PipelineContext, RecordingInfo, TrackInput, WorkflowInput,
};
use reflector_pipeline::{MemoryBlobStore, NullNotifier};
use reflector_store::TranscriptStore;

struct StubTranscriber {
    fail_track: Option<u32>,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscribeResponse> {
        if let Some(track) = self.fail_track {
            if req.audio_url.contains(&format!("/padded/{track}.opus")) {
                return Err(Error::Http("400 bad audio".into()));
            }
        }
        Ok(TranscribeResponse {
            words: vec![
                Word { text: "hello".into(), start: 0.0, end: 0.5, speaker: 0 },
                Word { text: "world".into(), start: 0.5, end: 1.0, speaker: 0 },
            ],
        })
    }
}

struct StubGenerator;

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        if req.prompt.contains("title") {
            Ok(GenerateResponse { text: "Weekly Sync".into() })
        } else {
            Ok(GenerateResponse {
                text: r#"{"short_summary":"short","long_summary":"long","action_items":[{"task":"follow up"}]}"#.into(),
            })
        }
    }
}

fn context(dir: &tempfile::TempDir, fail_track: Option<u32>) -> (PipelineContext, Arc<MemoryRecordingRepo>, Arc<MemoryParticipantRepo>, Arc<MemoryConsentRepo>) {
    let store = Arc::new(TranscriptStore::new(dir.path(), Arc::new(reflector_store::publisher::NullPublisher)).unwrap());
    let mut pools = HashMap::new();
    pools.insert("llm-io".to_string(), 8usize);
    pools.insert("cpu-heavy".to_string(), 1usize);
    let engine = Arc::new(Engine::new(
        WorkerPools::from_config(&pools),
        RateLimiters::from_config(&HashMap::new()),
        Arc::new(CancelMap::new()),
        Arc::new(WorkflowRunStore::new(dir.path())),
        Arc::new(NullProgressSink),
    ));

    let recordings = Arc::new(MemoryRecordingRepo::default());
    let participants = Arc::new(MemoryParticipantRepo::default());
    let consents = Arc::new(MemoryConsentRepo::default());

    let ctx = PipelineContext {
        store,
        engine,
        blobs: Arc::new(MemoryBlobStore::new()),
        recordings: recordings.clone(),
        participants: participants.clone(),
        consents: consents.clone(),
        transcriber: Arc::new(StubTranscriber { fail_track }),
        generator: Arc::new(StubGenerator),
        locks: Arc::new(RoomLockRegistry::new()),
        zulip: Arc::new(NullNotifier),
        webhook: Arc::new(NullNotifier),
    };
    (ctx, recordings, participants, consents)
}

fn seed_recording(
    recordings: &MemoryRecordingRepo,
    participants: &MemoryParticipantRepo,
    recording_id: &str,
    track_count: u32,
) {
    recordings
        .0
        .lock()
        .insert(recording_id.to_string(), RecordingInfo { id: recording_id.to_string(), duration: 60.0 });
    let infos = (0..track_count)
        .map(|i| ParticipantInfo { track_index: i, name: format!("p{i}"), language: "en".into() })
        .collect();
    participants.0.lock().insert(recording_id.to_string(), infos);
}

#[tokio::test]
async fn happy_path_produces_a_finalized_transcript_with_title_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, _consents) = context(&dir, None);
    ctx.store.create("t1", None, Some("room-1".into()));
    seed_recording(&recordings, &participants, "rec-1", 2);

    let samples = vec![0.1f32; 48_000];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    ctx.blobs.put("bucket", "rec-1/raw/0.pcm", bytes.clone()).await.unwrap();
    ctx.blobs.put("bucket", "rec-1/raw/1.pcm", bytes).await.unwrap();

    let input = WorkflowInput {
        transcript_id: "t1".into(),
        recording_id: "rec-1".into(),
        bucket: "bucket".into(),
        tracks: vec![
            TrackInput { track_index: 0, raw_key: "rec-1/raw/0.pcm".into(), start_offset: 0.0 },
            TrackInput { track_index: 1, raw_key: "rec-1/raw/1.pcm".into(), start_offset: 1.0 },
        ],
        room_id: Some("room-1".into()),
        meeting_id: None,
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = ctx.store.get_by_id("t1").unwrap();
    assert_eq!(transcript.status, TranscriptStatus::Ended);
    assert_eq!(transcript.title.as_deref(), Some("Weekly Sync"));
    assert_eq!(transcript.short_summary.as_deref(), Some("short"));
    assert_eq!(transcript.action_items.len(), 1);
    assert!(transcript.webvtt.unwrap().contains("-->"));
}

#[tokio::test]
async fn zero_tracks_finalizes_with_empty_topics_and_no_title() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, _consents) = context(&dir, None);
    ctx.store.create("t2", None, None);
    seed_recording(&recordings, &participants, "rec-2", 0);

    let input = WorkflowInput {
        transcript_id: "t2".into(),
        recording_id: "rec-2".into(),
        bucket: "bucket".into(),
        tracks: vec![],
        room_id: None,
        meeting_id: None,
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = ctx.store.get_by_id("t2").unwrap();
    assert_eq!(transcript.status, TranscriptStatus::Ended);
    assert!(transcript.title.is_none());
    assert!(transcript.topics.is_empty());
}

#[tokio::test]
async fn one_permanently_failing_track_does_not_fail_the_whole_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, _consents) = context(&dir, Some(1));
    ctx.store.create("t3", None, None);
    seed_recording(&recordings, &participants, "rec-3", 2);

    let samples = vec![0.1f32; 48_000];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    ctx.blobs.put("bucket", "rec-3/raw/0.pcm", bytes.clone()).await.unwrap();
    ctx.blobs.put("bucket", "rec-3/raw/1.pcm", bytes).await.unwrap();

    let input = WorkflowInput {
        transcript_id: "t3".into(),
        recording_id: "rec-3".into(),
        bucket: "bucket".into(),
        tracks: vec![
            TrackInput { track_index: 0, raw_key: "rec-3/raw/0.pcm".into(), start_offset: 0.0 },
            TrackInput { track_index: 1, raw_key: "rec-3/raw/1.pcm".into(), start_offset: 0.0 },
        ],
        room_id: None,
        meeting_id: None,
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = ctx.store.get_by_id("t3").unwrap();
    assert_eq!(transcript.status, TranscriptStatus::Ended);
    assert!(transcript.webvtt.unwrap().contains("hello"));
}

#[tokio::test]
async fn duplicate_start_on_the_same_room_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, _consents) = context(&dir, None);
    ctx.store.create("t4", None, Some("room-4".into()));
    seed_recording(&recordings, &participants, "rec-4", 0);

    let input = || WorkflowInput {
        transcript_id: "t4".into(),
        recording_id: "rec-4".into(),
        bucket: "bucket".into(),
        tracks: vec![],
        room_id: Some("room-4".into()),
        meeting_id: None,
        source_language: None,
        target_language: None,
    };

    let first = start_workflow(&ctx, input()).await.unwrap();
    let transcript = ctx.store.get_by_id("t4").unwrap();
    assert_eq!(transcript.workflow_run_id.as_deref(), Some(first.to_string().as_str()));

    let second = start_workflow(&ctx, input()).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn declined_consent_masks_that_speakers_words_and_marks_audio_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, consents) = context(&dir, None);
    ctx.store.create("t5", None, None);
    seed_recording(&recordings, &participants, "rec-5", 1);

    let samples = vec![0.1f32; 48_000];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    ctx.blobs.put("bucket", "rec-5/raw/0.pcm", bytes).await.unwrap();

    consents.0.lock().insert(
        "meeting-5".to_string(),
        vec![reflector_domain::model::Consent {
            meeting_id: "meeting-5".into(),
            participant_id: "0".into(),
            consent_given: false,
        }],
    );

    let input = WorkflowInput {
        transcript_id: "t5".into(),
        recording_id: "rec-5".into(),
        bucket: "bucket".into(),
        tracks: vec![TrackInput { track_index: 0, raw_key: "rec-5/raw/0.pcm".into(), start_offset: 0.0 }],
        room_id: None,
        meeting_id: Some("meeting-5".into()),
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = ctx.store.get_by_id("t5").unwrap();
    assert!(transcript.audio_deleted);
    assert!(!transcript.webvtt.unwrap_or_default().contains("hello"));
}

#[tokio::test]
async fn partial_decline_masks_only_that_speaker_but_still_marks_audio_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, recordings, participants, consents) = context(&dir, None);
    ctx.store.create("t6", None, None);
    seed_recording(&recordings, &participants, "rec-6", 2);

    let samples = vec![0.1f32; 48_000];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    ctx.blobs.put("bucket", "rec-6/raw/0.pcm", bytes.clone()).await.unwrap();
    ctx.blobs.put("bucket", "rec-6/raw/1.pcm", bytes).await.unwrap();

    // Only speaker 1 declines; speaker 0's words must survive.
    consents.0.lock().insert(
        "meeting-6".to_string(),
        vec![reflector_domain::model::Consent {
            meeting_id: "meeting-6".into(),
            participant_id: "1".into(),
            consent_given: false,
        }],
    );

    let input = WorkflowInput {
        transcript_id: "t6".into(),
        recording_id: "rec-6".into(),
        bucket: "bucket".into(),
        tracks: vec![
            TrackInput { track_index: 0, raw_key: "rec-6/raw/0.pcm".into(), start_offset: 0.0 },
            TrackInput { track_index: 1, raw_key: "rec-6/raw/1.pcm".into(), start_offset: 0.0 },
        ],
        room_id: None,
        meeting_id: Some("meeting-6".into()),
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = ctx.store.get_by_id("t6").unwrap();
    assert!(transcript.audio_deleted);
    let remaining_speakers: std::collections::HashSet<u32> =
        transcript.topics.iter().flat_map(|t| &t.words).map(|w| w.speaker).collect();
    assert_eq!(remaining_speakers, std::collections::HashSet::from([0]));
    assert!(transcript.webvtt.unwrap_or_default().contains("hello"));
}

/// Cancels the run as soon as `list()` is called — i.e. right after
/// get_participants (step 2) succeeds and just before the pad_track fan-out
/// (step 3) begins.
struct CancelingParticipantRepo {
    inner: Arc<MemoryParticipantRepo>,
    store: Arc<TranscriptStore>,
    cancel_map: Arc<CancelMap>,
    transcript_id: String,
}

#[async_trait]
impl ParticipantRepo for CancelingParticipantRepo {
    async fn list(&self, recording_id: &str) -> Result<Vec<ParticipantInfo>> {
        let result = self.inner.list(recording_id).await;
        if let Some(transcript) = self.store.get_by_id(&self.transcript_id) {
            if let Some(run_id) = transcript.workflow_run_id {
                self.cancel_map.cancel(&run_id);
            }
        }
        result
    }
}

#[tokio::test]
async fn cancellation_during_fan_out_aborts_the_whole_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TranscriptStore::new(dir.path(), Arc::new(reflector_store::publisher::NullPublisher)).unwrap());
    let mut pools = HashMap::new();
    pools.insert("llm-io".to_string(), 8usize);
    pools.insert("cpu-heavy".to_string(), 1usize);
    let engine = Arc::new(Engine::new(
        WorkerPools::from_config(&pools),
        RateLimiters::from_config(&HashMap::new()),
        Arc::new(CancelMap::new()),
        Arc::new(WorkflowRunStore::new(dir.path())),
        Arc::new(NullProgressSink),
    ));

    let recordings = Arc::new(MemoryRecordingRepo::default());
    let participants = Arc::new(MemoryParticipantRepo::default());
    seed_recording(&recordings, &participants, "rec-7", 2);

    let transcript_id = "t7".to_string();
    store.create(&transcript_id, None, None);

    let ctx = PipelineContext {
        store: store.clone(),
        engine: engine.clone(),
        blobs: Arc::new(MemoryBlobStore::new()),
        recordings: recordings.clone(),
        participants: Arc::new(CancelingParticipantRepo {
            inner: participants.clone(),
            store: store.clone(),
            cancel_map: engine.cancel.clone(),
            transcript_id: transcript_id.clone(),
        }),
        consents: Arc::new(MemoryConsentRepo::default()),
        transcriber: Arc::new(StubTranscriber { fail_track: None }),
        generator: Arc::new(StubGenerator),
        locks: Arc::new(RoomLockRegistry::new()),
        zulip: Arc::new(NullNotifier),
        webhook: Arc::new(NullNotifier),
    };

    let samples = vec![0.1f32; 48_000];
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    ctx.blobs.put("bucket", "rec-7/raw/0.pcm", bytes.clone()).await.unwrap();
    ctx.blobs.put("bucket", "rec-7/raw/1.pcm", bytes).await.unwrap();

    let input = WorkflowInput {
        transcript_id: transcript_id.clone(),
        recording_id: "rec-7".into(),
        bucket: "bucket".into(),
        tracks: vec![
            TrackInput { track_index: 0, raw_key: "rec-7/raw/0.pcm".into(), start_offset: 0.0 },
            TrackInput { track_index: 1, raw_key: "rec-7/raw/1.pcm".into(), start_offset: 0.0 },
        ],
        room_id: None,
        meeting_id: None,
        source_language: None,
        target_language: None,
    };

    start_workflow(&ctx, input).await.unwrap();

    let transcript = store.get_by_id(&transcript_id).unwrap();
    assert_ne!(transcript.status, TranscriptStatus::Ended);

    let run_id: uuid::Uuid = transcript.workflow_run_id.as_deref().unwrap().parse().unwrap();
    let run = engine.runs.get(&run_id).unwrap();
    assert_eq!(run.status, WorkflowStatus::Cancelled);
}
