//! Maps raw failures onto the four-member [`ErrorKind`] taxonomy.
//!
//! Message text is matched case-insensitively. Rate-limit wording wins over
//! auth wording, which wins over timeout wording; anything else is generic.

use crate::core::errors::{ErrorKind, ExchangeError, TRANSPORT_ERROR_CODE};
use reqwest::StatusCode;

const RATE_LIMIT_VOCABULARY: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many visits",
    "too many requests",
];

const AUTH_VOCABULARY: &[&str] = &[
    "auth",
    "signature",
    "api key",
    "api-key",
    "sign error",
    "permission denied",
];

const TIMEOUT_VOCABULARY: &[&str] = &[
    "timeout",
    "timed out",
    "httpsconnectionpool",
    "connection pool",
];

pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    let matches = |vocabulary: &[&str]| vocabulary.iter().any(|word| lowered.contains(word));

    if matches(RATE_LIMIT_VOCABULARY) {
        ErrorKind::RateLimited
    } else if matches(AUTH_VOCABULARY) {
        ErrorKind::AuthFailure
    } else if matches(TIMEOUT_VOCABULARY) {
        ErrorKind::Timeout
    } else {
        ErrorKind::GenericApiFailure
    }
}

/// Classify a non-zero application return code together with its message.
///
/// `known_code` lets an exchange adapter pin codes whose wording is unreliable.
pub fn classify_envelope(
    code: i64,
    message: &str,
    known_code: impl Fn(i64) -> Option<ErrorKind>,
) -> ExchangeError {
    let kind = known_code(code).unwrap_or_else(|| classify_message(message));
    ExchangeError::from_kind(kind, code, message)
}

pub fn classify_http_status(status: StatusCode, body: &str) -> ExchangeError {
    let code = i64::from(status.as_u16());
    match status {
        StatusCode::TOO_MANY_REQUESTS => ExchangeError::RateLimited {
            code,
            message: body.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::AuthFailure(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ExchangeError::timeout(format!("HTTP {}: {}", status.as_u16(), body))
        }
        _ => ExchangeError::from_kind(classify_message(body), code, body),
    }
}

/// Timeouts, refused connects and failures while sending count as `Timeout`.
pub fn classify_transport(err: &reqwest::Error) -> ExchangeError {
    let unreachable = err.is_timeout() || err.is_connect() || err.is_request();
    classify_transport_failure(unreachable, format!("Request failed: {}", err))
}

fn classify_transport_failure(unreachable: bool, message: String) -> ExchangeError {
    if unreachable {
        return ExchangeError::timeout(message);
    }
    ExchangeError::from_kind(classify_message(&message), TRANSPORT_ERROR_CODE, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_vocabulary() {
        assert_eq!(
            classify_message("Signature verification failed"),
            ErrorKind::AuthFailure
        );
        assert_eq!(classify_message("read timed out"), ErrorKind::Timeout);
        assert_eq!(classify_message("too many visits"), ErrorKind::RateLimited);
        assert_eq!(
            classify_message("HTTPSConnectionPool(host='api.bybit.com')"),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_message("params error: symbol invalid"),
            ErrorKind::GenericApiFailure
        );
    }

    #[test]
    fn test_rate_limit_wins_over_auth() {
        assert_eq!(
            classify_message("api key rate limit exceeded"),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_known_code_overrides_wording() {
        let err = classify_envelope(10006, "please slow down", |code| {
            (code == 10006).then_some(ErrorKind::RateLimited)
        });
        assert_eq!(
            err,
            ExchangeError::RateLimited {
                code: 10006,
                message: "please slow down".to_string()
            }
        );

        let err = classify_envelope(170131, "Insufficient balance.", |_| None);
        assert_eq!(err.kind(), ErrorKind::GenericApiFailure);
        assert_eq!(err.code(), 170131);
    }

    #[test]
    fn test_unreachable_transport_is_timeout() {
        let err = classify_transport_failure(
            true,
            "Request failed: tcp connect error: Connection refused".to_string(),
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());

        let err = classify_transport_failure(false, "Request failed: builder error".to_string());
        assert_eq!(err.kind(), ErrorKind::GenericApiFailure);
        assert_eq!(err.code(), TRANSPORT_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_refused_connection_is_timeout() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/v5/market/time")
            .send()
            .await
            .expect_err("nothing listens on the discard port");
        assert!(err.is_connect());

        let classified = classify_transport(&err);
        match classified {
            ExchangeError::Timeout { .. } => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            classify_http_status(StatusCode::TOO_MANY_REQUESTS, "").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_http_status(StatusCode::UNAUTHORIZED, "").kind(),
            ErrorKind::AuthFailure
        );
        assert_eq!(
            classify_http_status(StatusCode::INTERNAL_SERVER_ERROR, "boom").kind(),
            ErrorKind::GenericApiFailure
        );
    }
}
