//! Generic HTTP backend shared by the ASR/diarization/translation/LLM
//! clients. Each wraps the same `reqwest::Client` + bearer-token + timeout
//! plumbing and differs only in request/response shape (spec §4.7).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reflector_domain::config::EndpointConfig;
use reflector_domain::error::{Error, Result};
use reflector_domain::model::Word;
use reflector_domain::trace::TraceEvent;
use serde::{Deserialize, Serialize};

use crate::traits::{
    DiarizeRequest, DiarizeResponse, Diarizer, GenerateRequest, GenerateResponse, Generator,
    SpeakerSegment, TranscribeRequest, TranscribeResponse, Transcriber, TranslateRequest,
    TranslateResponse, Translator,
};
use crate::util::{from_reqwest, resolve_bearer_token};

/// A single named HTTP endpoint. One instance backs one of the four client
/// traits depending on which `impl` block is used against it.
pub struct HttpClient {
    name: &'static str,
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpClient {
    pub fn new(name: &'static str, config: &EndpointConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("reqwest client builds with a static config");
        Self {
            name,
            http,
            base_url: config.base_url.clone(),
            bearer: resolve_bearer_token(&config.auth_token_env),
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let start = Instant::now();

        let mut req = self.http.post(&url).json(body);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(from_reqwest)?;
        let status = response.status();
        let duration_ms = start.elapsed().as_millis() as u64;

        TraceEvent::ClientCall {
            client: self.name.to_string(),
            endpoint: path.to_string(),
            duration_ms,
            status: Some(status.as_u16()),
        }
        .emit();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(Error::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(Error::Http(format!("{} {}: HTTP {}", self.name, path, status.as_u16())));
        }

        response.json::<Resp>().await.map_err(from_reqwest)
    }
}

#[derive(Serialize)]
struct TranscribeWire<'a> {
    audio_url: &'a str,
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranscribeWireResponse {
    words: Vec<Word>,
}

#[async_trait]
impl Transcriber for HttpClient {
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscribeResponse> {
        let wire = TranscribeWire {
            audio_url: &req.audio_url,
            language: req.language.as_deref(),
        };
        let resp: TranscribeWireResponse = self.post("/transcribe", &wire).await?;
        Ok(TranscribeResponse { words: resp.words })
    }
}

#[derive(Serialize)]
struct DiarizeWire<'a> {
    audio_url: &'a str,
}

#[derive(Deserialize)]
struct SpeakerSegmentWire {
    speaker: u32,
    start: f64,
    end: f64,
}

#[derive(Deserialize)]
struct DiarizeWireResponse {
    segments: Vec<SpeakerSegmentWire>,
}

#[async_trait]
impl Diarizer for HttpClient {
    async fn diarize(&self, req: DiarizeRequest) -> Result<DiarizeResponse> {
        let wire = DiarizeWire {
            audio_url: &req.audio_url,
        };
        let resp: DiarizeWireResponse = self.post("/diarize", &wire).await?;
        Ok(DiarizeResponse {
            segments: resp
                .segments
                .into_iter()
                .map(|s| SpeakerSegment {
                    speaker: s.speaker,
                    start: s.start,
                    end: s.end,
                })
                .collect(),
        })
    }
}

#[derive(Serialize)]
struct TranslateWire<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
}

#[derive(Deserialize)]
struct TranslateWireResponse {
    text: String,
}

#[async_trait]
impl Translator for HttpClient {
    async fn translate(&self, req: TranslateRequest) -> Result<TranslateResponse> {
        let wire = TranslateWire {
            text: &req.text,
            source_language: &req.source_language,
            target_language: &req.target_language,
        };
        let resp: TranslateWireResponse = self.post("/translate", &wire).await?;
        Ok(TranslateResponse { text: resp.text })
    }
}

#[derive(Serialize)]
struct GenerateWire<'a> {
    prompt: &'a str,
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateWireResponse {
    text: String,
}

#[async_trait]
impl Generator for HttpClient {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        let wire = GenerateWire {
            prompt: &req.prompt,
            max_tokens: req.max_tokens,
        };
        let resp: GenerateWireResponse = self.post("/generate", &wire).await?;
        Ok(GenerateResponse { text: resp.text })
    }
}
