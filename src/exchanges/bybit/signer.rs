use crate::core::kernel::signer::{hmac_sha256_hex, SignatureResult};
use crate::core::errors::ExchangeError;
use crate::core::kernel::Signer;
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;

pub const RECV_WINDOW: &str = "5000";

/// Bybit HMAC-SHA256 signer for the V5 API and private WebSocket auth
#[derive(Debug, Clone)]
pub struct BybitSigner {
    api_key: String,
    secret_key: Secret<String>,
}

impl BybitSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: Secret::new(secret_key),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// timestamp + api_key + recv_window + (query string | body)
    pub fn sign_v5(&self, timestamp: u64, payload: &str) -> Result<String, ExchangeError> {
        let message = format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW, payload);
        hmac_sha256_hex(self.secret_key.expose_secret(), &message)
    }

    /// Signature for the private stream `auth` op, valid until `expires_ms`.
    pub fn websocket_signature(&self, expires_ms: u64) -> Result<String, ExchangeError> {
        hmac_sha256_hex(
            self.secret_key.expose_secret(),
            &format!("GET/realtime{}", expires_ms),
        )
    }
}

impl Signer for BybitSigner {
    fn sign_request(
        &self,
        method: &str,
        _endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        let payload = if method == "GET" || method == "DELETE" {
            query_string
        } else {
            std::str::from_utf8(body)
                .map_err(|_| ExchangeError::AuthFailure("Invalid body encoding".to_string()))?
        };
        let signature = self.sign_v5(timestamp, payload)?;

        let mut headers = HashMap::new();
        headers.insert("X-BAPI-API-KEY".to_string(), self.api_key.clone());
        headers.insert("X-BAPI-TIMESTAMP".to_string(), timestamp.to_string());
        headers.insert("X-BAPI-RECV-WINDOW".to_string(), RECV_WINDOW.to_string());
        headers.insert("X-BAPI-SIGN-TYPE".to_string(), "2".to_string());
        headers.insert("X-BAPI-SIGN".to_string(), signature);

        // V5 carries everything in headers
        Ok((headers, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_signs_query_string() {
        let signer = BybitSigner::new("key".to_string(), "secret".to_string());
        let (headers, params) = signer
            .sign_request(
                "GET",
                "/v5/account/wallet-balance",
                "accountType=UNIFIED",
                &[],
                1_700_000_000_000,
            )
            .unwrap();

        assert!(params.is_empty());
        assert_eq!(headers["X-BAPI-API-KEY"], "key");
        assert_eq!(headers["X-BAPI-RECV-WINDOW"], "5000");
        assert_eq!(headers["X-BAPI-TIMESTAMP"], "1700000000000");
        assert_eq!(
            headers["X-BAPI-SIGN"],
            hmac_sha256_hex("secret", "1700000000000key5000accountType=UNIFIED").unwrap()
        );
    }

    #[test]
    fn test_post_signs_body() {
        let signer = BybitSigner::new("key".to_string(), "secret".to_string());
        let body = br#"{"category":"spot","symbol":"BTCUSDT"}"#;
        let (headers, _) = signer
            .sign_request("POST", "/v5/order/cancel", "", body, 42)
            .unwrap();

        assert_eq!(
            headers["X-BAPI-SIGN"],
            hmac_sha256_hex(
                "secret",
                r#"42key5000{"category":"spot","symbol":"BTCUSDT"}"#
            )
            .unwrap()
        );
    }

    #[test]
    fn test_websocket_signature() {
        let signer = BybitSigner::new("key".to_string(), "secret".to_string());
        assert_eq!(
            signer.websocket_signature(1_700_000_010_000).unwrap(),
            hmac_sha256_hex("secret", "GET/realtime1700000010000").unwrap()
        );
    }
}
