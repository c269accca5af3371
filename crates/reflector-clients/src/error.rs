//! Error classification for external service calls (spec §4.7).
//!
//! Clients never retry — they classify. The DAG engine decides whether and
//! how to retry based on the classification a client attaches to its error.

use reflector_domain::error::Error;

/// How a call failure should be treated by the engine's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying: network blip, timeout, 5xx, or 429.
    Transient,
    /// Retrying won't help: 4xx other than 429, malformed request.
    Permanent,
}

/// Classify an HTTP status code per spec §4.7: 5xx and 429 are transient,
/// everything else in the 4xx range is permanent. Statuses outside 400..600
/// (i.e. no response was received — connection/timeout failure) are
/// transient.
pub fn classify_status(status: Option<u16>) -> ErrorClass {
    match status {
        Some(429) => ErrorClass::Transient,
        Some(s) if (500..600).contains(&s) => ErrorClass::Transient,
        Some(s) if (400..500).contains(&s) => ErrorClass::Permanent,
        _ => ErrorClass::Transient,
    }
}

pub fn classify_error(err: &Error) -> ErrorClass {
    match err {
        Error::Timeout(_) => ErrorClass::Transient,
        Error::RateLimited { .. } => ErrorClass::Transient,
        Error::Http(msg) => classify_status(extract_status(msg)),
        _ => ErrorClass::Permanent,
    }
}

/// `Some(duration)` when `err` carries a server-provided `Retry-After` hint
/// the engine should honor instead of its own backoff schedule.
pub fn retry_after(err: &Error) -> Option<std::time::Duration> {
    match err {
        Error::RateLimited { retry_after_secs: Some(secs) } => Some(std::time::Duration::from_secs(*secs)),
        _ => None,
    }
}

fn extract_status(msg: &str) -> Option<u16> {
    msg.split_whitespace()
        .find_map(|tok| tok.parse::<u16>().ok().filter(|s| (100..600).contains(s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify_status(Some(502)), ErrorClass::Transient);
        assert_eq!(classify_status(Some(500)), ErrorClass::Transient);
    }

    #[test]
    fn rate_limited_is_transient() {
        assert_eq!(classify_status(Some(429)), ErrorClass::Transient);
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(classify_status(Some(400)), ErrorClass::Permanent);
        assert_eq!(classify_status(Some(404)), ErrorClass::Permanent);
    }

    #[test]
    fn no_response_is_transient() {
        assert_eq!(classify_status(None), ErrorClass::Transient);
    }

    #[test]
    fn timeout_error_is_transient() {
        let err = Error::Timeout("slow".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }
}
