//! Core domain types shared by the store, engine, pipeline and gateway.
//!
//! These are plain data — the Transcript Store (`reflector-store`) is the
//! only component allowed to mutate them; every other crate reads and
//! produces values of these types but funnels writes back through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Idle,
    Recording,
    Processing,
    Ended,
    Error,
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Ended => "ended",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub speaker: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub timestamp: f64,
    pub duration: f64,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The closed set of event names (spec §6). Versioned only by addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    Transcript,
    Status,
    Duration,
    Topic,
    FinalTitle,
    LongSummary,
    ShortSummary,
    ActionItems,
    Webvtt,
    Waveform,
    PipelineProgress,
    DagStatus,
}

impl EventName {
    /// Events republished on the owning user's personal room (spec §4.1).
    pub fn is_user_room_event(self) -> bool {
        matches!(self, Self::Status | Self::FinalTitle | Self::Duration)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub event_name: EventName,
    pub data: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub status: TranscriptStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_summary: Option<String>,
    pub topics: Vec<Topic>,
    pub action_items: Vec<ActionItem>,
    pub webvtt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    pub source_language: String,
    pub target_language: String,
    pub audio_deleted: bool,

    pub change_seq: u64,
    pub events: Vec<TranscriptEvent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    pub locked: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(id: impl Into<String>, user_id: Option<String>, room_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id,
            room_id,
            status: TranscriptStatus::Idle,
            title: None,
            short_summary: None,
            long_summary: None,
            topics: Vec::new(),
            action_items: Vec::new(),
            webvtt: None,
            duration: None,
            source_language: "en".into(),
            target_language: "en".into(),
            audio_deleted: false,
            change_seq: 0,
            events: Vec::new(),
            workflow_run_id: None,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Pending,
    Orphan,
    Active,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub meeting_id: Option<String>,
    pub bucket: String,
    pub object_key: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_keys: Option<Vec<String>>,
    pub status: RecordingStatus,
}

impl Recording {
    /// Enforces the `status='orphan' <=> meeting_id IS NULL` check constraint
    /// from spec §3 at construction time rather than leaving it as a comment.
    pub fn new(
        id: impl Into<String>,
        meeting_id: Option<String>,
        bucket: impl Into<String>,
        object_key: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let status = if meeting_id.is_none() {
            RecordingStatus::Orphan
        } else {
            RecordingStatus::Pending
        };
        Self {
            id: id.into(),
            meeting_id,
            bucket: bucket.into(),
            object_key: object_key.into(),
            recorded_at,
            track_keys: None,
            status,
        }
    }

    pub fn set_status(&mut self, status: RecordingStatus) {
        assert_eq!(
            status == RecordingStatus::Orphan,
            self.meeting_id.is_none(),
            "orphan status must coincide with a null meeting_id"
        );
        self.status = status;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Meeting / Room / Participant session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub room_id: String,
    pub recording_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSession {
    pub id: String,
    pub meeting_id: String,
    pub user_id: String,
    pub track_index: Option<u32>,
    pub joined_at: DateTime<Utc>,
    /// Immutable once set — never updated again (spec §3).
    pub left_at: Option<DateTime<Utc>>,
}

impl ParticipantSession {
    pub fn mark_left(&mut self, at: DateTime<Utc>) {
        if self.left_at.is_some() {
            return;
        }
        self.left_at = Some(at);
    }
}

/// Recording consent per participant, consulted by the `cleanup_consent`
/// pipeline step (spec §4.5 step 11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    pub meeting_id: String,
    pub participant_id: String,
    pub consent_given: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_recording_requires_null_meeting_id() {
        let rec = Recording::new("r1", None, "bucket", "key", Utc::now());
        assert_eq!(rec.status, RecordingStatus::Orphan);
    }

    #[test]
    fn non_orphan_recording_has_meeting_id() {
        let rec = Recording::new("r1", Some("m1".into()), "bucket", "key", Utc::now());
        assert_eq!(rec.status, RecordingStatus::Pending);
    }

    #[test]
    #[should_panic(expected = "orphan status must coincide")]
    fn setting_orphan_with_meeting_id_panics() {
        let mut rec = Recording::new("r1", Some("m1".into()), "bucket", "key", Utc::now());
        rec.set_status(RecordingStatus::Orphan);
    }

    #[test]
    fn left_at_is_sticky() {
        let mut p = ParticipantSession {
            id: "p1".into(),
            meeting_id: "m1".into(),
            user_id: "u1".into(),
            track_index: Some(0),
            joined_at: Utc::now(),
            left_at: None,
        };
        let first = Utc::now();
        p.mark_left(first);
        let later = first + chrono::Duration::seconds(10);
        p.mark_left(later);
        assert_eq!(p.left_at, Some(first));
    }
}
