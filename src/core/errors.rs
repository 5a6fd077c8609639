use serde::Serialize;
use thiserror::Error;

/// Response code used when a failure never reached the exchange's envelope.
pub const TRANSPORT_ERROR_CODE: i64 = -1;

/// Flat classification of every failure this layer returns to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    AuthFailure,
    GenericApiFailure,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::AuthFailure => "auth_failure",
            Self::GenericApiFailure => "generic_api_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Request timed out after {retries} retries: {message}")]
    Timeout { message: String, retries: u32 },

    #[error("Rate limited ({code}): {message}")]
    RateLimited { code: i64, message: String },

    #[error("Authentication error: {0}")]
    AuthFailure(String),

    #[error("API error: {code} - {message}")]
    GenericApiFailure { code: i64, message: String },
}

impl ExchangeError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            retries: 0,
        }
    }

    pub fn generic(code: i64, message: impl Into<String>) -> Self {
        Self::GenericApiFailure {
            code,
            message: message.into(),
        }
    }

    /// Build an error of the given kind around a raw message.
    pub fn from_kind(kind: ErrorKind, code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Timeout => Self::timeout(message),
            ErrorKind::RateLimited => Self::RateLimited { code, message },
            ErrorKind::AuthFailure => Self::AuthFailure(message),
            ErrorKind::GenericApiFailure => Self::GenericApiFailure { code, message },
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
            Self::GenericApiFailure { .. } => ErrorKind::GenericApiFailure,
        }
    }

    /// Only timeouts are retried by the REST pipeline.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Exchange or transport response code attached to this error.
    pub const fn code(&self) -> i64 {
        match self {
            Self::Timeout { .. } => -2,
            Self::RateLimited { code, .. } | Self::GenericApiFailure { code, .. } => *code,
            Self::AuthFailure(_) => TRANSPORT_ERROR_CODE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Timeout { message, .. }
            | Self::RateLimited { message, .. }
            | Self::GenericApiFailure { message, .. }
            | Self::AuthFailure(message) => message,
        }
    }

    /// Record how many retries were spent before this error surfaced.
    #[must_use]
    pub fn with_retries(self, retries: u32) -> Self {
        match self {
            Self::Timeout { message, .. } => Self::Timeout { message, retries },
            other => other,
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::generic(
            TRANSPORT_ERROR_CODE,
            format!("Failed to decode payload: {}", err),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(ExchangeError::timeout("x").kind(), ErrorKind::Timeout);
        assert_eq!(
            ExchangeError::from_kind(ErrorKind::RateLimited, 10006, "too many visits").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ExchangeError::AuthFailure("bad sign".to_string()).kind(),
            ErrorKind::AuthFailure
        );
        assert_eq!(
            ExchangeError::generic(1, "nope").kind(),
            ErrorKind::GenericApiFailure
        );
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(ExchangeError::timeout("read timed out").is_retryable());
        assert!(!ExchangeError::AuthFailure("x".into()).is_retryable());
        assert!(!ExchangeError::generic(10001, "params error").is_retryable());
    }

    #[test]
    fn test_with_retries_only_touches_timeouts() {
        let err = ExchangeError::timeout("slow").with_retries(3);
        assert_eq!(
            err,
            ExchangeError::Timeout {
                message: "slow".into(),
                retries: 3
            }
        );

        let err = ExchangeError::generic(7, "other").with_retries(3);
        assert_eq!(err, ExchangeError::generic(7, "other"));
    }
}
