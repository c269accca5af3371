//! Shared utility functions for client backends.

use reflector_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type. Timeout
/// errors map to [`Error::Timeout`]; everything else maps to [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the bearer token from the env var named by `auth_token_env`, if
/// configured. Absence is not an error — an unauthenticated endpoint is
/// a valid configuration.
pub(crate) fn resolve_bearer_token(auth_token_env: &Option<String>) -> Option<String> {
    auth_token_env.as_ref().and_then(|var| std::env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bearer_token_reads_configured_env_var() {
        std::env::set_var("REFLECTOR_TEST_TOKEN_UTIL_1", "secret-123");
        let token = resolve_bearer_token(&Some("REFLECTOR_TEST_TOKEN_UTIL_1".into()));
        assert_eq!(token.as_deref(), Some("secret-123"));
        std::env::remove_var("REFLECTOR_TEST_TOKEN_UTIL_1");
    }

    #[test]
    fn resolve_bearer_token_none_when_unset() {
        assert!(resolve_bearer_token(&None).is_none());
    }
}
