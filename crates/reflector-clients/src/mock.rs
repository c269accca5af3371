//! Deterministic backends for tests that exercise the pipeline without a
//! live ASR/diarization/translation/LLM service.

use async_trait::async_trait;
use reflector_domain::error::Result;
use reflector_domain::model::Word;

use crate::traits::*;

/// Splits `audio_url` on whitespace and returns one word per 0.5s slot,
/// all attributed to speaker 0. Good enough to exercise downstream
/// word-ordering invariants without a real transcriber.
pub struct MockTranscriber {
    pub words: Vec<Word>,
}

impl MockTranscriber {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _req: TranscribeRequest) -> Result<TranscribeResponse> {
        Ok(TranscribeResponse {
            words: self.words.clone(),
        })
    }
}

/// Returns a single segment covering the whole file attributed to speaker 0.
pub struct MockDiarizer {
    pub segments: Vec<SpeakerSegment>,
}

impl MockDiarizer {
    pub fn new(segments: Vec<SpeakerSegment>) -> Self {
        Self { segments }
    }
}

#[async_trait]
impl Diarizer for MockDiarizer {
    async fn diarize(&self, _req: DiarizeRequest) -> Result<DiarizeResponse> {
        Ok(DiarizeResponse {
            segments: self.segments.clone(),
        })
    }
}

/// Echoes the input text back unchanged, tagged with the target language.
pub struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&self, req: TranslateRequest) -> Result<TranslateResponse> {
        Ok(TranslateResponse {
            text: format!("[{}] {}", req.target_language, req.text),
        })
    }
}

/// Returns a fixed response regardless of prompt, for deterministic tests.
pub struct FixedGenerator {
    pub response: String,
}

impl FixedGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: self.response.clone(),
        })
    }
}
