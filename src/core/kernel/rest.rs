use crate::core::errors::{ExchangeError, TRANSPORT_ERROR_CODE};
use crate::core::kernel::cache::render_param;
use crate::core::kernel::classifier::{classify_http_status, classify_transport};
use crate::core::kernel::signer::{timestamp_millis, Signer};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};

/// REST transport trait
///
/// One call is one HTTP round trip. Failures come back already classified.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Make a request
    ///
    /// # Arguments
    /// * `method` - HTTP method; GET and DELETE send `params` as a query string,
    ///   everything else sends them as a JSON object body
    /// * `endpoint` - The API endpoint path
    /// * `params` - Ordered request parameters
    /// * `authenticated` - Whether to sign the request
    ///
    /// # Returns
    /// The response body as a JSON value
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, Value)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError>;
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Per-request transport timeout
    pub timeout: Duration,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout: Duration::from_secs(30),
            user_agent: concat!("bybit-link/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ExchangeError::generic(
                    TRANSPORT_ERROR_CODE,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    fn build_url(&self, endpoint: &str) -> Result<Url, ExchangeError> {
        let raw = format!("{}{}", self.config.base_url, endpoint);
        Url::parse(&raw).map_err(|e| {
            ExchangeError::generic(TRANSPORT_ERROR_CODE, format!("Invalid URL {}: {}", raw, e))
        })
    }

    fn encode_body(params: &[(String, Value)]) -> Result<Vec<u8>, ExchangeError> {
        let body: Map<String, Value> = params.iter().cloned().collect();
        Ok(serde_json::to_vec(&Value::Object(body))?)
    }

    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| classify_transport(&e))?;

        trace!("Response body: {}", response_text);

        if status.is_success() {
            serde_json::from_str(&response_text).map_err(|e| {
                ExchangeError::generic(
                    TRANSPORT_ERROR_CODE,
                    format!("Failed to parse JSON response: {}", e),
                )
            })
        } else {
            Err(classify_http_status(status, &response_text))
        }
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, Value)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        let mut url = self.build_url(endpoint)?;
        let in_query = method == Method::GET || method == Method::DELETE;

        let body = if in_query {
            if !params.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    pairs.append_pair(key, &render_param(value));
                }
            }
            Vec::new()
        } else {
            Self::encode_body(params)?
        };
        let query_string = url.query().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        if authenticated {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthFailure(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;
            let (signed_headers, signed_params) = signer.sign_request(
                method.as_str(),
                endpoint,
                &query_string,
                &body,
                timestamp_millis(),
            )?;
            if !signed_params.is_empty() {
                url.query_pairs_mut().extend_pairs(signed_params);
            }
            headers.extend(signed_headers);
        }

        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if !in_query {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_body_keeps_params_as_json() {
        let body = ReqwestRest::encode_body(&[
            ("symbol".to_string(), json!("BTCUSDT")),
            ("qty".to_string(), json!("0.01")),
            ("reduceOnly".to_string(), json!(false)),
        ])
        .unwrap();
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            decoded,
            json!({"symbol": "BTCUSDT", "qty": "0.01", "reduceOnly": false})
        );
    }

    #[tokio::test]
    async fn test_signed_request_without_signer_is_auth_failure() {
        let rest = RestClientBuilder::new(RestClientConfig::new(
            "http://127.0.0.1:9".to_string(),
            "bybit".to_string(),
        ))
        .build()
        .unwrap();

        let err = rest
            .request(Method::GET, "/v5/account/info", &[], true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
    }

    #[test]
    fn test_invalid_base_url() {
        let rest = RestClientBuilder::new(RestClientConfig::new(
            "not a url".to_string(),
            "bybit".to_string(),
        ))
        .build()
        .unwrap();
        assert!(rest.build_url("/v5/market/time").is_err());
    }
}
