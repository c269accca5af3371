//! Provider-agnostic request/response types and the trait each external
//! service client implements (spec §4.7). Each trait exposes one async
//! method per endpoint — the actual ASR/diarization/translation/LLM
//! backends are out of scope; only the thin client interface is.

use async_trait::async_trait;
use reflector_domain::error::Result;
use reflector_domain::model::Word;

#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub audio_url: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranscribeResponse {
    pub words: Vec<Word>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscribeResponse>;
}

#[derive(Debug, Clone)]
pub struct SpeakerSegment {
    pub speaker: u32,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone)]
pub struct DiarizeRequest {
    pub audio_url: String,
}

#[derive(Debug, Clone)]
pub struct DiarizeResponse {
    pub segments: Vec<SpeakerSegment>,
}

#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, req: DiarizeRequest) -> Result<DiarizeResponse>;
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Clone)]
pub struct TranslateResponse {
    pub text: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, req: TranslateRequest) -> Result<TranslateResponse>;
}

/// Covers the LLM-driven pipeline steps: title, short/long summary, action
/// items. Each is a plain prompt-in/text-out call; the pipeline owns the
/// prompt templates, not the client.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse>;
}
