//! In-process durable transcript store.
//!
//! Transcripts are kept in memory behind a `parking_lot::RwLock` and
//! persisted as one append-only JSONL event log per transcript under
//! `state_dir/transcripts/{id}.jsonl` — the same "materialised struct +
//! JSONL event log" shape the teacher's `RunStore` uses for agent runs.
//!
//! `change_seq` is a single process-wide `AtomicU64`: spec §4.1 requires a
//! "monotonic DB primitive"; in a single-process in-memory store the atomic
//! counter *is* that primitive, so no additional locking is needed around it.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use reflector_domain::error::{Error, Result};
use reflector_domain::model::{EventName, Transcript, TranscriptEvent, TranscriptStatus};
use reflector_domain::trace::TraceEvent;

use crate::publisher::EventPublisher;
use crate::search::TranscriptSearchIndex;

pub struct TranscriptStore {
    dir: PathBuf,
    transcripts: RwLock<HashMap<String, Transcript>>,
    change_seq: AtomicU64,
    publisher: Arc<dyn EventPublisher>,
    pub search: TranscriptSearchIndex,
}

impl TranscriptStore {
    pub fn new(state_dir: &Path, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let dir = state_dir.join("transcripts");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self {
            dir,
            transcripts: RwLock::new(HashMap::new()),
            change_seq: AtomicU64::new(0),
            publisher,
            search: TranscriptSearchIndex::new(),
        })
    }

    fn log_path(&self, transcript_id: &str) -> PathBuf {
        self.dir.join(format!("{transcript_id}.jsonl"))
    }

    pub fn create(
        &self,
        id: impl Into<String>,
        user_id: Option<String>,
        room_id: Option<String>,
    ) -> Transcript {
        let transcript = Transcript::new(id, user_id, room_id);
        self.transcripts
            .write()
            .insert(transcript.id.clone(), transcript.clone());
        TraceEvent::TranscriptCreated {
            transcript_id: transcript.id.clone(),
        }
        .emit();
        transcript
    }

    pub fn get_by_id(&self, id: &str) -> Option<Transcript> {
        self.transcripts.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Transcript> {
        self.transcripts.read().values().cloned().collect()
    }

    /// Search by relevance over title + long_summary + webvtt (spec §4.1).
    /// Returns empty when the index has nothing — never degrades silently
    /// into a different ranking.
    pub fn search(&self, query: &str) -> Vec<crate::search::SearchHit> {
        self.search.query(query)
    }

    pub fn set_workflow_run_id(&self, transcript_id: &str, run_id: &str) -> Result<()> {
        let mut transcripts = self.transcripts.write();
        let transcript = transcripts
            .get_mut(transcript_id)
            .ok_or_else(|| Error::NotFound(transcript_id.to_string()))?;
        transcript.workflow_run_id = Some(run_id.to_string());
        transcript.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete(&self, transcript_id: &str) -> Result<()> {
        self.transcripts.write().remove(transcript_id);
        let _ = std::fs::remove_file(self.log_path(transcript_id));
        Ok(())
    }

    /// `set_status` per spec §4.1: atomically updates the materialised
    /// `status` column, appends a `STATUS` event, and bumps `change_seq`.
    pub fn set_status(&self, transcript_id: &str, status: TranscriptStatus) -> Result<TranscriptEvent> {
        let data = serde_json::json!(status);
        self.mutate(transcript_id, EventName::Status, data, |t| {
            t.status = status;
        })
    }

    /// `append_event` per spec §4.1. `apply` is how the caller expresses the
    /// materialised-field side effect that must land in the same atomic step
    /// as the event append (e.g. setting `title` alongside a `FINAL_TITLE`
    /// event).
    pub fn append_event(
        &self,
        transcript_id: &str,
        event_name: EventName,
        data: Value,
        apply: impl FnOnce(&mut Transcript),
    ) -> Result<TranscriptEvent> {
        self.mutate(transcript_id, event_name, data, apply)
    }

    /// Generic field patch via a JSON merge, for callers that don't need a
    /// typed `apply` closure (spec §4.1 `update_fields`).
    pub fn update_fields(
        &self,
        transcript_id: &str,
        event_name: EventName,
        fields: serde_json::Map<String, Value>,
    ) -> Result<TranscriptEvent> {
        let data = Value::Object(fields.clone());
        self.mutate(transcript_id, event_name, data, move |t| {
            let mut value = serde_json::to_value(&*t).expect("Transcript always serializes");
            if let Value::Object(obj) = &mut value {
                for (k, v) in fields {
                    obj.insert(k, v);
                }
            }
            if let Ok(patched) = serde_json::from_value::<Transcript>(value) {
                *t = patched;
            }
        })
    }

    fn mutate(
        &self,
        transcript_id: &str,
        event_name: EventName,
        data: Value,
        apply: impl FnOnce(&mut Transcript),
    ) -> Result<TranscriptEvent> {
        let mut transcripts = self.transcripts.write();
        let transcript = transcripts
            .get_mut(transcript_id)
            .ok_or_else(|| Error::NotFound(transcript_id.to_string()))?;

        if transcript.locked {
            return Err(Error::Locked(transcript_id.to_string()));
        }

        let event = TranscriptEvent {
            event_name,
            data,
            occurred_at: Utc::now(),
        };

        // Persist the event to disk BEFORE committing the in-memory change:
        // if this fails we return an error with no partial state applied,
        // satisfying the "failure leaves no partial state" contract.
        self.append_to_log(transcript_id, &event)?;

        let seq = self.change_seq.fetch_add(1, Ordering::SeqCst) + 1;

        apply(transcript);
        // Events carrying `event_name == Status` must keep `status` in sync
        // with the event (spec §8 invariant 2) — `apply` is responsible for
        // that when called from `set_status`; nothing further to do here.
        transcript.change_seq = seq;
        transcript.events.push(event.clone());
        transcript.updated_at = Utc::now();

        if matches!(event.event_name, EventName::FinalTitle) {
            self.search
                .index(transcript_id, transcript.title.as_deref().unwrap_or(""), "title");
        }
        if matches!(event.event_name, EventName::LongSummary) {
            self.search.index(
                transcript_id,
                transcript.long_summary.as_deref().unwrap_or(""),
                "long_summary",
            );
        }
        if matches!(event.event_name, EventName::Webvtt) {
            self.search
                .index(transcript_id, transcript.webvtt.as_deref().unwrap_or(""), "webvtt");
        }

        let room_id = format!("ts:{transcript_id}");
        self.publisher.publish(&room_id, &event);
        if event.event_name.is_user_room_event() {
            if let Some(user_id) = &transcript.user_id {
                self.publisher.publish(&format!("user:{user_id}"), &event);
            }
        }

        TraceEvent::TranscriptMutated {
            transcript_id: transcript_id.to_string(),
            change_seq: seq,
            event_name: format!("{:?}", event.event_name),
        }
        .emit();

        Ok(event)
    }

    fn append_to_log(&self, transcript_id: &str, event: &TranscriptEvent) -> Result<()> {
        let line = serde_json::to_string(event).map_err(Error::Json)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(transcript_id))
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;
        file.write_all(b"\n").map_err(Error::Io)?;
        Ok(())
    }
}
