//! Thin blob-store seam (spec §6 blob layout). The concrete object-store
//! backend is out of scope (spec §1 Non-goals); pipeline steps depend only
//! on this trait, the same dependency-injection shape as
//! `reflector_store::EventPublisher` and `reflector_engine::ProgressSink`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use reflector_domain::error::{Error, Result};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;
}

/// In-memory blob store for tests and for single-process deployments that
/// don't need a real object store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }
}

/// Deterministic key for a padded track (spec §6: `{recording_prefix}/padded/{track_index}.opus`).
pub fn padded_track_key(recording_id: &str, track_index: u32) -> String {
    format!("{recording_id}/padded/{track_index}.opus")
}

pub fn mixdown_key(transcript_id: &str) -> String {
    format!("{transcript_id}/audio.mp3")
}

pub fn waveform_key(transcript_id: &str) -> String {
    format!("{transcript_id}/waveform.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryBlobStore::new();
        store.put("b", "k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get("b", "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn keys_match_spec_layout() {
        assert_eq!(padded_track_key("rec1", 2), "rec1/padded/2.opus");
        assert_eq!(mixdown_key("t1"), "t1/audio.mp3");
        assert_eq!(waveform_key("t1"), "t1/waveform.json");
    }
}
