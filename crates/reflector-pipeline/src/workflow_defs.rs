//! The concrete 13-step diarization workflow (spec §4.5), wired onto
//! `reflector-engine`'s task/workflow primitives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use reflector_clients::{
    ErrorClass as ClientErrorClass, GenerateRequest, Generator, TranscribeRequest, Transcriber,
};
use reflector_coordinator::RoomLockRegistry;
use reflector_domain::error::{Error, Result};
use reflector_domain::model::{ActionItem, Consent, EventName, Topic, TranscriptStatus, Word};
use reflector_engine::{fan_out, CancelToken, Engine, TaskError, TaskSpec};
use reflector_store::TranscriptStore;

use crate::audio::{self, AudioTrack};
use crate::blob::{mixdown_key, padded_track_key, waveform_key, BlobStore};
use crate::notify::Notifier;
use crate::webvtt;

pub const TOTAL_STEPS: u32 = 13;
const ROOM_LOCK_TTL: Duration = Duration::from_secs(10);
const TOPIC_CHUNK_WORDS: usize = 300;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Small repo seams (spec §3 entities resolved via store queries, not
// embedded pointers — recording/participant/consent lookups are thin
// collaborators, same dependency-injection shape as `BlobStore`).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub id: String,
    pub duration: f64,
}

#[async_trait]
pub trait RecordingRepo: Send + Sync {
    async fn get(&self, recording_id: &str) -> Result<RecordingInfo>;
}

#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub track_index: u32,
    pub name: String,
    pub language: String,
}

#[async_trait]
pub trait ParticipantRepo: Send + Sync {
    async fn list(&self, recording_id: &str) -> Result<Vec<ParticipantInfo>>;
}

#[async_trait]
pub trait ConsentRepo: Send + Sync {
    async fn list(&self, meeting_id: &str) -> Result<Vec<Consent>>;
}

#[derive(Default)]
pub struct MemoryRecordingRepo(pub Mutex<HashMap<String, RecordingInfo>>);

#[async_trait]
impl RecordingRepo for MemoryRecordingRepo {
    async fn get(&self, recording_id: &str) -> Result<RecordingInfo> {
        self.0
            .lock()
            .get(recording_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(recording_id.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryParticipantRepo(pub Mutex<HashMap<String, Vec<ParticipantInfo>>>);

#[async_trait]
impl ParticipantRepo for MemoryParticipantRepo {
    async fn list(&self, recording_id: &str) -> Result<Vec<ParticipantInfo>> {
        Ok(self.0.lock().get(recording_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryConsentRepo(pub Mutex<HashMap<String, Vec<Consent>>>);

#[async_trait]
impl ConsentRepo for MemoryConsentRepo {
    async fn list(&self, meeting_id: &str) -> Result<Vec<Consent>> {
        Ok(self.0.lock().get(meeting_id).cloned().unwrap_or_default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow input/context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct TrackInput {
    pub track_index: u32,
    pub raw_key: String,
    /// Start offset relative to the recording, in seconds (spec §4.6
    /// "from filename metadata or sidecar" — resolved into input here).
    pub start_offset: f64,
}

#[derive(Debug, Clone)]
pub struct WorkflowInput {
    pub transcript_id: String,
    pub recording_id: String,
    pub bucket: String,
    pub tracks: Vec<TrackInput>,
    pub room_id: Option<String>,
    pub meeting_id: Option<String>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
}

pub struct PipelineContext {
    pub store: Arc<TranscriptStore>,
    pub engine: Arc<Engine>,
    pub blobs: Arc<dyn BlobStore>,
    pub recordings: Arc<dyn RecordingRepo>,
    pub participants: Arc<dyn ParticipantRepo>,
    pub consents: Arc<dyn ConsentRepo>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub locks: Arc<RoomLockRegistry>,
    pub zulip: Arc<dyn Notifier>,
    pub webhook: Arc<dyn Notifier>,
}

fn store_err_to_task(err: Error) -> TaskError {
    match err {
        Error::NotFound(_) | Error::Locked(_) | Error::InvariantViolation(_) | Error::Config(_) => {
            TaskError::permanent(err.to_string())
        }
        _ => TaskError::transient(err.to_string()),
    }
}

fn client_err_to_task(err: Error) -> TaskError {
    let retry_after = reflector_clients::retry_after(&err);
    match reflector_clients::classify_error(&err) {
        ClientErrorClass::Transient => TaskError::transient(err.to_string()).with_retry_after(retry_after),
        ClientErrorClass::Permanent => TaskError::permanent(err.to_string()),
    }
}

/// Entry point: serialises workflow creation on `room:{room_id}` (spec §4.5
/// duplicate-start edge case), then drives the 13-step DAG to completion.
pub async fn start_workflow(ctx: &PipelineContext, input: WorkflowInput) -> Result<Uuid> {
    if let Some(room_id) = input.room_id.clone() {
        let room_key = format!("room:{room_id}");
        let guard = match ctx.locks.acquire(&room_key, ROOM_LOCK_TTL) {
            Ok(guard) => guard,
            Err(_) => {
                return existing_run_id(ctx, &input.transcript_id).ok_or(Error::Locked(room_key));
            }
        };
        if let Some(run_id) = existing_run_id(ctx, &input.transcript_id) {
            drop(guard);
            return Ok(run_id);
        }
        let (run_id, token) = ctx.engine.start_run(&input.transcript_id);
        ctx.store
            .set_workflow_run_id(&input.transcript_id, &run_id.to_string())?;
        drop(guard);
        run_diagram(ctx, input, run_id, token).await?;
        Ok(run_id)
    } else {
        let (run_id, token) = ctx.engine.start_run(&input.transcript_id);
        ctx.store
            .set_workflow_run_id(&input.transcript_id, &run_id.to_string())?;
        run_diagram(ctx, input, run_id, token).await?;
        Ok(run_id)
    }
}

fn existing_run_id(ctx: &PipelineContext, transcript_id: &str) -> Option<Uuid> {
    let transcript = ctx.store.get_by_id(transcript_id)?;
    let run_id = transcript.workflow_run_id?;
    Uuid::parse_str(&run_id).ok()
}

async fn run_diagram(
    ctx: &PipelineContext,
    input: WorkflowInput,
    run_id: Uuid,
    token: CancelToken,
) -> Result<()> {
    let transcript_id = input.transcript_id.clone();

    let outcome = run_diagram_inner(ctx, &input, run_id, &token).await;

    match outcome {
        Ok(()) => {
            ctx.engine
                .finish_run(run_id, reflector_engine::WorkflowStatus::Succeeded);
        }
        Err(TaskError { class: reflector_engine::ErrorClass::Cancelled, .. }) => {
            ctx.engine
                .finish_run(run_id, reflector_engine::WorkflowStatus::Cancelled);
        }
        Err(err) => {
            ctx.engine
                .finish_run(run_id, reflector_engine::WorkflowStatus::Failed);
            let _ = ctx.store.set_status(&transcript_id, TranscriptStatus::Error);
            return Err(Error::Other(err.to_string()));
        }
    }
    Ok(())
}

async fn run_diagram_inner(
    ctx: &PipelineContext,
    input: &WorkflowInput,
    run_id: Uuid,
    token: &CancelToken,
) -> std::result::Result<(), TaskError> {
    let transcript_id = &input.transcript_id;

    // 1. get_recording
    let recording = ctx.recordings.get(&input.recording_id).await.map_err(store_err_to_task)?;
    ctx.engine
        .run_task(
            run_id,
            transcript_id,
            "get_recording",
            &TaskSpec::new("get_recording", "llm-io"),
            token,
            (1, TOTAL_STEPS, "get_recording"),
            || async {
                Ok(serde_json::json!({ "duration": recording.duration }))
            },
        )
        .await?;
    ctx.store
        .set_status(transcript_id, TranscriptStatus::Processing)
        .map_err(store_err_to_task)?;

    // 2. get_participants
    let participants = ctx
        .participants
        .list(&input.recording_id)
        .await
        .map_err(store_err_to_task)?;
    let source_language = input
        .source_language
        .clone()
        .or_else(|| participants.first().map(|p| p.language.clone()))
        .unwrap_or_else(|| "en".to_string());
    let target_language = input.target_language.clone().unwrap_or_else(|| "en".to_string());
    ctx.engine
        .run_task(
            run_id,
            transcript_id,
            "get_participants",
            &TaskSpec::new("get_participants", "llm-io"),
            token,
            (2, TOTAL_STEPS, "get_participants"),
            || async { Ok(serde_json::json!({ "count": participants.len() })) },
        )
        .await?;
    {
        let mut fields = serde_json::Map::new();
        fields.insert("source_language".into(), serde_json::json!(source_language));
        fields.insert("target_language".into(), serde_json::json!(target_language));
        ctx.store
            .update_fields(transcript_id, EventName::Transcript, fields)
            .map_err(store_err_to_task)?;
    }

    if input.tracks.is_empty() {
        return finalize(ctx, input, run_id, token, Vec::new()).await;
    }

    // 3. pad_track (fan-out)
    let t0 = input
        .tracks
        .iter()
        .map(|t| t.start_offset)
        .fold(f64::INFINITY, f64::min);
    let padded: Vec<std::result::Result<Option<(u32, String)>, TaskError>> =
        fan_out(input.tracks.clone(), |_, track| {
            pad_one_track(ctx, run_id, transcript_id, token, &input.bucket, &input.recording_id, t0, track)
        })
        .await;
    let mut surviving: Vec<(u32, String)> = Vec::with_capacity(padded.len());
    for outcome in padded {
        if let Some(track) = outcome? {
            surviving.push(track);
        }
    }

    if surviving.is_empty() {
        return finalize(ctx, input, run_id, token, Vec::new()).await;
    }

    // 4. mixdown_tracks
    let mixdown_samples = mixdown_tracks(ctx, run_id, transcript_id, token, &input.bucket, &surviving).await?;

    // 5. generate_waveform
    generate_waveform(ctx, run_id, transcript_id, token, &input.bucket, &mixdown_samples).await?;

    // 6. transcribe_track (fan-out)
    let transcribed: Vec<std::result::Result<Option<(u32, Vec<Word>)>, TaskError>> =
        fan_out(surviving.clone(), |_, (track_index, padded_key)| {
            transcribe_one_track(ctx, run_id, transcript_id, token, &source_language, track_index, padded_key)
        })
        .await;

    // 7. merge_transcripts (join)
    let mut all_words: Vec<Word> = Vec::new();
    for outcome in transcribed {
        if let Some((_, words)) = outcome? {
            all_words.extend(words);
        }
    }
    all_words = ctx
        .engine
        .run_task(
            run_id,
            transcript_id,
            "merge_transcripts",
            &TaskSpec::new("merge_transcripts", "llm-io"),
            token,
            (7, TOTAL_STEPS, "merge_transcripts"),
            move || {
                let mut words = all_words.clone();
                async move {
                    words.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
                    serde_json::to_value(&words).map_err(Error::Json).map_err(store_err_to_task)
                }
            },
        )
        .await
        .and_then(|v| serde_json::from_value::<Vec<Word>>(v).map_err(|e| TaskError::permanent(e.to_string())))?;

    finalize(ctx, input, run_id, token, all_words).await
}

async fn pad_one_track(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    bucket: &str,
    recording_id: &str,
    t0: f64,
    track: super::workflow_defs::TrackInput,
) -> std::result::Result<Option<(u32, String)>, TaskError> {
    let task_key = format!("pad_track#{}", track.track_index);
    let spec = TaskSpec::new("pad_track", "llm-io");
    let blobs = ctx.blobs.clone();
    let bucket = bucket.to_string();
    let recording_id = recording_id.to_string();
    let track_index = track.track_index;

    let result = ctx
        .engine
        .run_task(run_id, transcript_id, &task_key, &spec, token, (3, TOTAL_STEPS, "pad_track"), move || {
            let blobs = blobs.clone();
            let bucket = bucket.clone();
            let recording_id = recording_id.clone();
            let raw_key = track.raw_key.clone();
            let start_offset = track.start_offset;
            async move {
                let bytes = blobs.get(&bucket, &raw_key).await.map_err(store_err_to_task)?;
                let samples = audio::decode_pcm(&bytes);
                let audio_track = AudioTrack {
                    track_index,
                    sample_rate: audio::OPUS_STANDARD_SAMPLE_RATE,
                    samples,
                    start_offset,
                };
                let padded = audio::pad_track(&audio_track, t0);
                let key = padded_track_key(&recording_id, track_index);
                blobs
                    .put(&bucket, &key, audio::encode_pcm(&padded.samples))
                    .await
                    .map_err(store_err_to_task)?;
                Ok(serde_json::json!({ "padded_key": key, "track_index": track_index }))
            }
        })
        .await;

    match result {
        Ok(value) => Ok(value
            .get("padded_key")
            .and_then(|v| v.as_str())
            .map(|key| (track_index, key.to_string()))),
        Err(err) if err.class == reflector_engine::ErrorClass::Cancelled => Err(err),
        Err(_) => Ok(None),
    }
}

async fn mixdown_tracks(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    bucket: &str,
    surviving: &[(u32, String)],
) -> std::result::Result<Vec<f32>, TaskError> {
    let spec = TaskSpec::new("mixdown_tracks", "cpu-heavy");
    let blobs = ctx.blobs.clone();
    let bucket = bucket.to_string();
    let tracks = surviving.to_vec();
    let mixdown_key_ = mixdown_key(transcript_id);

    let value = ctx
        .engine
        .run_task(run_id, transcript_id, "mixdown_tracks", &spec, token, (4, TOTAL_STEPS, "mixdown_tracks"), move || {
            let blobs = blobs.clone();
            let bucket = bucket.clone();
            let tracks = tracks.clone();
            let mixdown_key_ = mixdown_key_.clone();
            async move {
                let mut audio_tracks = Vec::with_capacity(tracks.len());
                for (track_index, padded_key) in &tracks {
                    let bytes = blobs.get(&bucket, padded_key).await.map_err(store_err_to_task)?;
                    audio_tracks.push(AudioTrack {
                        track_index: *track_index,
                        sample_rate: audio::OPUS_STANDARD_SAMPLE_RATE,
                        samples: audio::decode_pcm(&bytes),
                        start_offset: 0.0,
                    });
                }
                let mixed = audio::mixdown(&audio_tracks);
                blobs
                    .put(&bucket, &mixdown_key_, audio::encode_pcm(&mixed))
                    .await
                    .map_err(store_err_to_task)?;
                Ok(serde_json::json!({ "samples": mixed }))
            }
        })
        .await?;

    serde_json::from_value::<Vec<f32>>(value["samples"].clone())
        .map_err(|e| TaskError::permanent(e.to_string()))
}

async fn generate_waveform(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    bucket: &str,
    samples: &[f32],
) -> std::result::Result<(), TaskError> {
    let spec = TaskSpec::new("generate_waveform", "cpu-heavy");
    let blobs = ctx.blobs.clone();
    let bucket = bucket.to_string();
    let samples = samples.to_vec();
    let waveform_key_ = waveform_key(transcript_id);

    let envelope = ctx
        .engine
        .run_task(run_id, transcript_id, "generate_waveform", &spec, token, (5, TOTAL_STEPS, "generate_waveform"), move || {
            let blobs = blobs.clone();
            let bucket = bucket.clone();
            let samples = samples.clone();
            let waveform_key_ = waveform_key_.clone();
            async move {
                let envelope = audio::waveform(&samples);
                let json_bytes = serde_json::to_vec(&envelope).map_err(Error::Json).map_err(store_err_to_task)?;
                blobs
                    .put(&bucket, &waveform_key_, json_bytes)
                    .await
                    .map_err(store_err_to_task)?;
                Ok(serde_json::json!({ "envelope": envelope }))
            }
        })
        .await?;

    ctx.store
        .append_event(transcript_id, EventName::Waveform, envelope["envelope"].clone(), |_| {})
        .map_err(store_err_to_task)?;
    Ok(())
}

async fn transcribe_one_track(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    language: &str,
    track_index: u32,
    padded_key: String,
) -> std::result::Result<Option<(u32, Vec<Word>)>, TaskError> {
    let task_key = format!("transcribe_track#{track_index}");
    let spec = TaskSpec::new("transcribe_track", "llm-io").with_rate_limit("llm-io");
    let transcriber = ctx.transcriber.clone();
    let language = language.to_string();

    let result = ctx
        .engine
        .run_task(run_id, transcript_id, &task_key, &spec, token, (6, TOTAL_STEPS, "transcribe_track"), move || {
            let transcriber = transcriber.clone();
            let language = language.clone();
            let padded_key = padded_key.clone();
            async move {
                let response = transcriber
                    .transcribe(TranscribeRequest {
                        audio_url: padded_key,
                        language: Some(language),
                    })
                    .await
                    .map_err(client_err_to_task)?;
                let words: Vec<Word> = response
                    .words
                    .into_iter()
                    .map(|w| Word {
                        speaker: track_index,
                        ..w
                    })
                    .collect();
                serde_json::to_value(&words).map_err(Error::Json).map_err(store_err_to_task)
            }
        })
        .await;

    match result {
        Ok(value) => Ok(serde_json::from_value::<Vec<Word>>(value)
            .ok()
            .map(|words| (track_index, words))),
        Err(err) if err.class == reflector_engine::ErrorClass::Cancelled => Err(err),
        Err(_) => Ok(None),
    }
}

async fn finalize(
    ctx: &PipelineContext,
    input: &WorkflowInput,
    run_id: Uuid,
    token: &CancelToken,
    words: Vec<Word>,
) -> std::result::Result<(), TaskError> {
    let transcript_id = &input.transcript_id;

    let (title, topics) = if words.is_empty() {
        (None, Vec::new())
    } else {
        let topics = detect_topics(ctx, run_id, transcript_id, token, &words).await?;
        let title = generate_title(ctx, run_id, transcript_id, token, &words).await?;
        generate_summary(ctx, run_id, transcript_id, token, &words, &topics).await?;
        (title, topics)
    };

    for topic in &topics {
        ctx.store
            .append_event(transcript_id, EventName::Topic, serde_json::to_value(topic).unwrap(), {
                let topic = topic.clone();
                move |t| t.topics.push(topic)
            })
            .map_err(store_err_to_task)?;
    }

    let duration = words.last().map(|w| w.end).unwrap_or(0.0) - words.first().map(|w| w.start).unwrap_or(0.0);
    let vtt = webvtt::render(&words);

    ctx.engine
        .run_task(
            run_id,
            transcript_id,
            "finalize",
            &TaskSpec::new("finalize", "llm-io"),
            token,
            (10, TOTAL_STEPS, "finalize"),
            || async { Ok(serde_json::json!({ "duration": duration })) },
        )
        .await?;

    ctx.store
        .append_event(transcript_id, EventName::Webvtt, serde_json::json!(vtt), {
            let vtt = vtt.clone();
            move |t| t.webvtt = Some(vtt)
        })
        .map_err(store_err_to_task)?;
    ctx.store
        .append_event(transcript_id, EventName::Duration, serde_json::json!(duration), move |t| {
            t.duration = Some(duration)
        })
        .map_err(store_err_to_task)?;
    ctx.store
        .append_event(transcript_id, EventName::FinalTitle, serde_json::json!(title), {
            let title = title.clone();
            move |t| t.title = title
        })
        .map_err(store_err_to_task)?;
    ctx.store
        .set_status(transcript_id, TranscriptStatus::Ended)
        .map_err(store_err_to_task)?;

    cleanup_consent(ctx, input, run_id, token).await?;
    notify(ctx, run_id, transcript_id, token).await;

    Ok(())
}

async fn detect_topics(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    words: &[Word],
) -> std::result::Result<Vec<Topic>, TaskError> {
    let chunks: Vec<Vec<Word>> = words
        .chunks(TOPIC_CHUNK_WORDS)
        .map(|c| c.to_vec())
        .collect();

    let topics: Vec<Option<Topic>> = fan_out(chunks, |i, chunk| {
        detect_chunk_topic(ctx, run_id, transcript_id, token, i, chunk)
    })
    .await;

    Ok(topics.into_iter().flatten().collect())
}

async fn detect_chunk_topic(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    index: usize,
    chunk: Vec<Word>,
) -> Option<Topic> {
    let task_key = format!("detect_chunk_topic#{index}");
    let spec = TaskSpec::new("detect_chunk_topic", "llm-io").with_rate_limit("llm-io");
    let generator = ctx.generator.clone();

    let result = ctx
        .engine
        .run_task(run_id, transcript_id, &task_key, &spec, token, (8, TOTAL_STEPS, "detect_topics"), move || {
            let generator = generator.clone();
            let chunk = chunk.clone();
            async move {
                let text = chunk.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
                let prompt = format!(
                    "Summarise this meeting chunk as JSON {{\"title\":...,\"summary\":...}}:\n{text}"
                );
                let response = generator
                    .generate(GenerateRequest { prompt, max_tokens: None })
                    .await
                    .map_err(client_err_to_task)?;
                let (title, summary) = parse_title_summary(&response.text);
                Ok(serde_json::json!({
                    "title": title,
                    "summary": summary,
                    "timestamp": chunk.first().map(|w| w.start).unwrap_or(0.0),
                    "duration": chunk.last().map(|w| w.end).unwrap_or(0.0) - chunk.first().map(|w| w.start).unwrap_or(0.0),
                    "words": chunk,
                }))
            }
        })
        .await;

    result.ok().and_then(|value| {
        Some(Topic {
            id: format!("topic-{index}"),
            title: value.get("title")?.as_str().map(str::to_string),
            summary: value.get("summary")?.as_str().map(str::to_string),
            timestamp: value.get("timestamp")?.as_f64()?,
            duration: value.get("duration")?.as_f64()?,
            words: serde_json::from_value(value.get("words")?.clone()).ok()?,
        })
    })
}

async fn generate_title(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    words: &[Word],
) -> std::result::Result<Option<String>, TaskError> {
    let spec = TaskSpec::new("generate_title", "llm-io").with_rate_limit("llm-io");
    let generator = ctx.generator.clone();
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");

    let value = ctx
        .engine
        .run_task(run_id, transcript_id, "generate_title", &spec, token, (9, TOTAL_STEPS, "generate_title"), move || {
            let generator = generator.clone();
            let text = text.clone();
            async move {
                let response = generator
                    .generate(GenerateRequest {
                        prompt: format!("Give a short title (max 10 words) for this meeting transcript:\n{text}"),
                        max_tokens: Some(32),
                    })
                    .await
                    .map_err(client_err_to_task)?;
                Ok(serde_json::json!({ "title": webvtt::clean_title(&response.text) }))
            }
        })
        .await?;

    Ok(value.get("title").and_then(|v| v.as_str()).map(str::to_string))
}

async fn generate_summary(
    ctx: &PipelineContext,
    run_id: Uuid,
    transcript_id: &str,
    token: &CancelToken,
    words: &[Word],
    topics: &[Topic],
) -> std::result::Result<(), TaskError> {
    let spec = TaskSpec::new("generate_summary", "llm-io").with_rate_limit("llm-io");
    let generator = ctx.generator.clone();
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let topic_titles = topics
        .iter()
        .filter_map(|t| t.title.clone())
        .collect::<Vec<_>>()
        .join(", ");

    let value = ctx
        .engine
        .run_task(run_id, transcript_id, "generate_summary", &spec, token, (9, TOTAL_STEPS, "generate_summary"), move || {
            let generator = generator.clone();
            let text = text.clone();
            let topic_titles = topic_titles.clone();
            async move {
                let prompt = format!(
                    "Topics: {topic_titles}\nProduce JSON {{\"short_summary\":...,\"long_summary\":...,\"action_items\":[{{\"task\":...}}]}} for:\n{text}"
                );
                let response = generator
                    .generate(GenerateRequest { prompt, max_tokens: None })
                    .await
                    .map_err(client_err_to_task)?;
                Ok(parse_summary(&response.text))
            }
        })
        .await?;

    let short_summary = value.get("short_summary").and_then(|v| v.as_str()).map(str::to_string);
    let long_summary = value.get("long_summary").and_then(|v| v.as_str()).map(str::to_string);
    let action_items: Vec<ActionItem> = value
        .get("action_items")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    ctx.store
        .append_event(transcript_id, EventName::ShortSummary, serde_json::json!(short_summary), {
            let short_summary = short_summary.clone();
            move |t| t.short_summary = short_summary
        })
        .map_err(store_err_to_task)?;
    ctx.store
        .append_event(transcript_id, EventName::LongSummary, serde_json::json!(long_summary), {
            let long_summary = long_summary.clone();
            move |t| t.long_summary = long_summary
        })
        .map_err(store_err_to_task)?;
    ctx.store
        .append_event(transcript_id, EventName::ActionItems, serde_json::to_value(&action_items).unwrap(), {
            let action_items = action_items.clone();
            move |t| t.action_items = action_items
        })
        .map_err(store_err_to_task)?;

    Ok(())
}

/// Best-effort JSON extraction from a generator response; falls back to
/// treating the whole response as the summary with a truncated title.
fn parse_title_summary(text: &str) -> (Option<String>, Option<String>) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let title = value.get("title").and_then(|v| v.as_str()).map(str::to_string);
        let summary = value.get("summary").and_then(|v| v.as_str()).map(str::to_string);
        if title.is_some() || summary.is_some() {
            return (title, summary);
        }
    }
    let title = text.split_whitespace().take(10).collect::<Vec<_>>().join(" ");
    (Some(title), Some(text.to_string()))
}

fn parse_summary(text: &str) -> serde_json::Value {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if value.is_object() {
            return value;
        }
    }
    serde_json::json!({ "short_summary": text, "long_summary": text, "action_items": [] })
}

async fn cleanup_consent(
    ctx: &PipelineContext,
    input: &WorkflowInput,
    run_id: Uuid,
    token: &CancelToken,
) -> std::result::Result<(), TaskError> {
    let Some(meeting_id) = input.meeting_id.clone() else {
        return Ok(());
    };
    let transcript_id = input.transcript_id.clone();
    let consents_repo = ctx.consents.clone();
    let store = ctx.store.clone();
    let body_transcript_id = transcript_id.clone();

    ctx.engine
        .run_task(
            run_id,
            &transcript_id,
            "cleanup_consent",
            &TaskSpec::new("cleanup_consent", "llm-io"),
            token,
            (11, TOTAL_STEPS, "cleanup_consent"),
            move || {
                let meeting_id = meeting_id.clone();
                let transcript_id = body_transcript_id.clone();
                let consents_repo = consents_repo.clone();
                let store = store.clone();
                async move {
                    let consents = consents_repo.list(&meeting_id).await.map_err(store_err_to_task)?;
                    let declined: std::collections::HashSet<u32> = consents
                        .iter()
                        .filter(|c| !c.consent_given)
                        .filter_map(|c| c.participant_id.parse::<u32>().ok())
                        .collect();
                    if declined.is_empty() {
                        return Ok(serde_json::json!({ "declined": 0 }));
                    }

                    let transcript = store
                        .get_by_id(&transcript_id)
                        .ok_or_else(|| TaskError::permanent("transcript vanished during cleanup_consent"))?;
                    let any_words_removed = transcript
                        .topics
                        .iter()
                        .flat_map(|t| &t.words)
                        .any(|w| declined.contains(&w.speaker));
                    let remaining_words: Vec<Word> = transcript
                        .topics
                        .iter()
                        .flat_map(|t| t.words.clone())
                        .filter(|w| !declined.contains(&w.speaker))
                        .collect();
                    let new_vtt = webvtt::render(&remaining_words);

                    let mut fields = serde_json::Map::new();
                    let retained_topics: Vec<Topic> = transcript
                        .topics
                        .into_iter()
                        .map(|mut t| {
                            t.words.retain(|w| !declined.contains(&w.speaker));
                            t
                        })
                        .collect();
                    fields.insert("topics".into(), serde_json::to_value(&retained_topics).unwrap());
                    fields.insert("webvtt".into(), serde_json::json!(new_vtt));
                    fields.insert("audio_deleted".into(), serde_json::json!(any_words_removed));

                    store
                        .update_fields(&transcript_id, EventName::Webvtt, fields)
                        .map_err(store_err_to_task)?;
                    Ok(serde_json::json!({ "declined": declined.len(), "audio_deleted": any_words_removed }))
                }
            },
        )
        .await?;
    Ok(())
}

async fn notify(ctx: &PipelineContext, run_id: Uuid, transcript_id: &str, token: &CancelToken) {
    let message = format!("transcript {transcript_id} finished processing");

    let zulip = ctx.zulip.clone();
    let tid = transcript_id.to_string();
    let msg = message.clone();
    let _ = ctx
        .engine
        .run_task(
            run_id,
            transcript_id,
            "notify_zulip",
            &TaskSpec::new("notify_zulip", "llm-io"),
            token,
            (12, TOTAL_STEPS, "notify_zulip"),
            move || {
                let zulip = zulip.clone();
                let tid = tid.clone();
                let msg = msg.clone();
                async move {
                    zulip.notify(&tid, &msg).await;
                    Ok(serde_json::json!({}))
                }
            },
        )
        .await;

    let webhook = ctx.webhook.clone();
    let tid = transcript_id.to_string();
    let msg = message.clone();
    let _ = ctx
        .engine
        .run_task(
            run_id,
            transcript_id,
            "notify_webhook",
            &TaskSpec::new("notify_webhook", "llm-io"),
            token,
            (13, TOTAL_STEPS, "notify_webhook"),
            move || {
                let webhook = webhook.clone();
                let tid = tid.clone();
                let msg = msg.clone();
                async move {
                    webhook.notify(&tid, &msg).await;
                    Ok(serde_json::json!({}))
                }
            },
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_title_summary_extracts_json_fields() {
        let (title, summary) = parse_title_summary(r#"{"title":"Sync","summary":"We discussed X"}"#);
        assert_eq!(title.as_deref(), Some("Sync"));
        assert_eq!(summary.as_deref(), Some("We discussed X"));
    }

    #[test]
    fn parse_title_summary_falls_back_to_raw_text() {
        let (title, summary) = parse_title_summary("just plain text here");
        assert_eq!(title.as_deref(), Some("just plain text here"));
        assert_eq!(summary.as_deref(), Some("just plain text here"));
    }

    #[test]
    fn parse_summary_falls_back_when_not_json() {
        let value = parse_summary("no json here");
        assert_eq!(value["short_summary"], "no json here");
        assert_eq!(value["action_items"], serde_json::json!([]));
    }

    fn test_context(dir: &std::path::Path) -> PipelineContext {
        let store = Arc::new(TranscriptStore::new(dir, Arc::new(reflector_store::publisher::NullPublisher)).unwrap());
        let mut pools = HashMap::new();
        pools.insert("llm-io".to_string(), 4usize);
        let engine = Arc::new(Engine::new(
            reflector_engine::WorkerPools::from_config(&pools),
            reflector_engine::RateLimiters::from_config(&HashMap::new()),
            Arc::new(reflector_engine::CancelMap::new()),
            Arc::new(reflector_engine::WorkflowRunStore::new(dir)),
            Arc::new(reflector_engine::NullProgressSink),
        ));
        PipelineContext {
            store,
            engine,
            blobs: Arc::new(crate::blob::MemoryBlobStore::new()),
            recordings: Arc::new(MemoryRecordingRepo::default()),
            participants: Arc::new(MemoryParticipantRepo::default()),
            consents: Arc::new(MemoryConsentRepo::default()),
            transcriber: Arc::new(reflector_clients::mock::MockTranscriber::new(vec![])),
            generator: Arc::new(reflector_clients::mock::FixedGenerator::new("{}")),
            locks: Arc::new(RoomLockRegistry::new()),
            zulip: Arc::new(crate::notify::NullNotifier),
            webhook: Arc::new(crate::notify::NullNotifier),
        }
    }

    #[tokio::test]
    async fn pad_one_track_propagates_cancellation_instead_of_dropping_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let (run_id, token) = ctx.engine.start_run("t-cancel");
        token.cancel();

        let track = TrackInput { track_index: 0, raw_key: "rec/raw/0.pcm".into(), start_offset: 0.0 };
        let err = pad_one_track(&ctx, run_id, "t-cancel", &token, "bucket", "rec", 0.0, track)
            .await
            .unwrap_err();
        assert_eq!(err.class, reflector_engine::ErrorClass::Cancelled);
    }

    #[tokio::test]
    async fn transcribe_one_track_propagates_cancellation_instead_of_dropping_the_track() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let (run_id, token) = ctx.engine.start_run("t-cancel-2");
        token.cancel();

        let err = transcribe_one_track(&ctx, run_id, "t-cancel-2", &token, "en", 0, "rec/padded/0.opus".into())
            .await
            .unwrap_err();
        assert_eq!(err.class, reflector_engine::ErrorClass::Cancelled);
    }
}
