//! Provider error classification and retry policy.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Broad category of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// HTTP 4xx other than 429; retrying will not help
    ClientError,
    /// Timeout, connection refused, reset
    NetworkError,
    /// Response body did not match the expected shape
    ParseError,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::NetworkError => "network_error",
            Self::ParseError => "parse_error",
        };
        f.write_str(s)
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            status: None,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            status: Some(429),
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, message)
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self {
            status: Some(status),
            ..Self::new(LlmErrorKind::ServerError, message)
        }
    }

    pub fn client_error(status: u16, message: String) -> Self {
        Self {
            status: Some(status),
            ..Self::new(LlmErrorKind::ClientError, message)
        }
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, message)
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }

    /// Delay before the next attempt: the server's `Retry-After` if given,
    /// otherwise exponential backoff from one second, capped at 30 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(delay) = self.retry_after {
            return delay;
        }
        let secs = 1u64.checked_shl(attempt.min(5)).unwrap_or(32).min(30);
        Duration::from_secs(secs)
    }

    /// Message safe to show to API clients. Provider bodies are not included.
    pub fn public_message(&self) -> String {
        let summary = match self.kind {
            LlmErrorKind::RateLimited => "AI provider rate limit exceeded",
            LlmErrorKind::ServerError => "AI provider is unavailable",
            LlmErrorKind::ClientError => "AI provider rejected the request",
            LlmErrorKind::NetworkError => "Could not reach the AI provider",
            LlmErrorKind::ParseError => "AI provider returned an unreadable response",
        };
        match self.status {
            Some(status) => format!("{} (HTTP {})", summary, status),
            None => summary.to_string(),
        }
    }
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError) -> bool {
        error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_retry_policy() {
        let config = RetryConfig::default();
        assert!(config.should_retry(&LlmError::rate_limited("slow down".into(), None)));
        assert!(config.should_retry(&LlmError::network_error("reset".into())));
        assert!(!config.should_retry(&LlmError::client_error(400, "bad".into())));
        assert!(!config.should_retry(&LlmError::parse_error("junk".into())));
    }

    #[test]
    fn test_suggested_delay() {
        let err = LlmError::server_error(502, "bad gateway".into());
        assert_eq!(err.suggested_delay(0), Duration::from_secs(1));
        assert_eq!(err.suggested_delay(2), Duration::from_secs(4));
        assert_eq!(err.suggested_delay(10), Duration::from_secs(30));

        let limited = LlmError::rate_limited("wait".into(), Some(Duration::from_secs(7)));
        assert_eq!(limited.suggested_delay(3), Duration::from_secs(7));
    }

    #[test]
    fn test_public_message_hides_body() {
        let err = LlmError::client_error(401, "invalid api key sk-abc".into());
        let msg = err.public_message();
        assert_eq!(msg, "AI provider rejected the request (HTTP 401)");
        assert!(!msg.contains("sk-abc"));
    }
}
