//! Decouples the store from the Event Bus (C4).
//!
//! The store calls [`EventPublisher::publish`] after every successful
//! mutation; `reflector-gateway` supplies the real implementation that
//! fans events out to WebSocket subscribers. Tests use a no-op or
//! recording implementation.

use reflector_domain::model::TranscriptEvent;

pub trait EventPublisher: Send + Sync {
    /// `room_id` is `"ts:" + transcript_id`, or `"user:" + user_id` for the
    /// subset of events republished to the owning user's personal room
    /// (spec §4.1).
    fn publish(&self, room_id: &str, event: &TranscriptEvent);
}

/// Publisher that drops everything. Useful for store-only unit tests.
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _room_id: &str, _event: &TranscriptEvent) {}
}
