//! Thin clients for the external ASR, diarization, translation and LLM
//! services the diarization pipeline depends on (C2). Retries live in the
//! DAG engine, not here — a client call either succeeds or returns a
//! classified error.

pub mod error;
pub mod http;
pub mod mock;
pub mod traits;
pub(crate) mod util;

pub use error::{classify_error, classify_status, retry_after, ErrorClass};
pub use http::HttpClient;
pub use traits::{
    DiarizeRequest, DiarizeResponse, Diarizer, GenerateRequest, GenerateResponse, Generator,
    SpeakerSegment, TranscribeRequest, TranscribeResponse, Transcriber, TranslateRequest,
    TranslateResponse, Translator,
};
