//! In-process pub/sub for transcript events (C4), keyed by room id.
//!
//! Modeled directly on the teacher's `NodeRegistry`/node WebSocket handler:
//! one `tokio::sync::mpsc` sender per connected subscriber, rooms held in a
//! `HashMap<RoomId, Vec<Subscriber>>` behind `parking_lot::RwLock`. Doubles
//! as both the store's [`EventPublisher`] and the engine's [`ProgressSink`]
//! so every transcript mutation and every DAG step transition reaches the
//! same room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use reflector_domain::model::{EventName, TranscriptEvent};
use reflector_engine::{PipelineProgress, ProgressSink};
use reflector_store::publisher::EventPublisher;

pub type RoomId = String;

pub fn transcript_room(transcript_id: &str) -> RoomId {
    format!("ts:{transcript_id}")
}

pub fn user_room(user_id: &str) -> RoomId {
    format!("user:{user_id}")
}

struct Subscriber {
    id: u64,
    sink: mpsc::UnboundedSender<TranscriptEvent>,
}

/// A live subscription returned by [`EventBus::subscribe`]. Dropping the
/// receiver alone leaks the registry entry until the next publish notices
/// the closed channel; callers should call [`EventBus::unsubscribe`]
/// explicitly on disconnect, the way `nodes/ws.rs` calls `registry.remove`.
pub struct Subscription {
    pub id: u64,
    pub room_id: RoomId,
    pub receiver: mpsc::UnboundedReceiver<TranscriptEvent>,
}

#[derive(Default)]
pub struct EventBus {
    rooms: RwLock<HashMap<RoomId, Vec<Subscriber>>>,
    /// Latest `DAG_STATUS` per room, for the connect-time "all-but-last"
    /// replay rule (spec §4.2) — `DAG_STATUS` never lands in the store's
    /// durable event log, so the bus is the only place it can be replayed
    /// from.
    last_dag_status: RwLock<HashMap<RoomId, TranscriptEvent>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, room_id: impl Into<String>) -> Subscription {
        let room_id = room_id.into();
        let (sink, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .write()
            .entry(room_id.clone())
            .or_default()
            .push(Subscriber { id, sink });
        Subscription { id, room_id, receiver }
    }

    pub fn unsubscribe(&self, room_id: &str, id: u64) {
        let mut rooms = self.rooms.write();
        if let Some(subs) = rooms.get_mut(room_id) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Exposed for an admin/metrics surface, not otherwise wired up.
    #[allow(dead_code)]
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms.read().get(room_id).map(Vec::len).unwrap_or(0)
    }

    pub fn last_dag_status(&self, room_id: &str) -> Option<TranscriptEvent> {
        self.last_dag_status.read().get(room_id).cloned()
    }

    fn fan_out(&self, room_id: &str, event: &TranscriptEvent) {
        let rooms = self.rooms.read();
        let Some(subs) = rooms.get(room_id) else {
            return;
        };
        for sub in subs {
            // A subscriber whose receiver was dropped without unsubscribing
            // just silently misses the event; it'll be pruned on its next
            // disconnect handling pass.
            let _ = sub.sink.send(event.clone());
        }
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, room_id: &str, event: &TranscriptEvent) {
        self.fan_out(room_id, event);
    }
}

impl ProgressSink for EventBus {
    fn emit(&self, transcript_id: &str, progress: PipelineProgress) {
        let room_id = transcript_room(transcript_id);
        let data = serde_json::to_value(&progress).expect("PipelineProgress always serializes");
        let now = Utc::now();

        let progress_event = TranscriptEvent {
            event_name: EventName::PipelineProgress,
            data: data.clone(),
            occurred_at: now,
        };
        self.fan_out(&room_id, &progress_event);

        let dag_event = TranscriptEvent {
            event_name: EventName::DagStatus,
            data,
            occurred_at: now,
        };
        self.last_dag_status.write().insert(room_id.clone(), dag_event.clone());
        self.fan_out(&room_id, &dag_event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_engine::TaskStatus;

    fn progress(step: &str, index: u32) -> PipelineProgress {
        PipelineProgress {
            current_step: step.into(),
            step_index: index,
            total_steps: 13,
            step_status: TaskStatus::Running,
        }
    }

    #[test]
    fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ts:t1");
        let event = TranscriptEvent {
            event_name: EventName::Status,
            data: serde_json::json!("processing"),
            occurred_at: Utc::now(),
        };
        bus.publish("ts:t1", &event);
        let received = sub.receiver.try_recv().unwrap();
        assert_eq!(received.event_name, EventName::Status);
    }

    #[test]
    fn unsubscribed_room_receives_nothing() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ts:t1");
        bus.unsubscribe("ts:t1", sub.id);
        let event = TranscriptEvent {
            event_name: EventName::Status,
            data: serde_json::json!("processing"),
            occurred_at: Utc::now(),
        };
        bus.publish("ts:t1", &event);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[test]
    fn unrelated_rooms_dont_cross_talk() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ts:t1");
        let event = TranscriptEvent {
            event_name: EventName::Status,
            data: serde_json::json!("processing"),
            occurred_at: Utc::now(),
        };
        bus.publish("ts:t2", &event);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[test]
    fn progress_emits_both_progress_and_dag_status() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ts:t1");
        bus.emit("t1", progress("pad_track", 3));

        let first = sub.receiver.try_recv().unwrap();
        assert_eq!(first.event_name, EventName::PipelineProgress);
        let second = sub.receiver.try_recv().unwrap();
        assert_eq!(second.event_name, EventName::DagStatus);
    }

    #[test]
    fn last_dag_status_keeps_only_the_latest() {
        let bus = EventBus::new();
        bus.emit("t1", progress("pad_track", 3));
        bus.emit("t1", progress("mixdown_tracks", 4));

        let last = bus.last_dag_status("ts:t1").unwrap();
        assert_eq!(last.data["current_step"], "mixdown_tracks");
    }

    #[test]
    fn subscriber_count_reflects_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count("ts:t1"), 0);
        let sub = bus.subscribe("ts:t1");
        assert_eq!(bus.subscriber_count("ts:t1"), 1);
        bus.unsubscribe("ts:t1", sub.id);
        assert_eq!(bus.subscriber_count("ts:t1"), 0);
    }
}
