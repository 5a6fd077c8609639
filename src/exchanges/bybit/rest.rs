use crate::core::audit::{ApiRequestRecord, AuditSink};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::ConnectivitySettings;
use crate::core::errors::{ErrorKind, ExchangeError, TRANSPORT_ERROR_CODE};
use crate::core::kernel::classifier::classify_envelope;
use crate::core::kernel::{cache_key, RateLimitStatus, RateLimiter, ResponseCache, RestClient};
use crate::core::stats::{ApiStats, ApiStatsSnapshot};
use crate::exchanges::bybit::endpoints::{Endpoint, RequestSpec};
use crate::exchanges::bybit::types::{
    AmendRequest, BybitApiResponse, BybitKlineList, BybitOrderAck, BybitOrderBook,
    BybitOrderList, BybitPositionList, BybitServerTime, BybitTickerList, BybitWalletBalance,
    Category, KlineQuery, MarginMode, OrderRef, OrderRequest,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, instrument, warn};

/// Bybit return codes whose meaning is fixed regardless of `retMsg` wording.
pub fn bybit_error_kind(code: i64) -> Option<ErrorKind> {
    match code {
        10006 | 10018 => Some(ErrorKind::RateLimited),
        10003 | 10004 | 10005 | 10007 | 33004 => Some(ErrorKind::AuthFailure),
        _ => None,
    }
}

/// Rate-limited, cached, retrying client for the Bybit V5 REST API.
///
/// Every network attempt goes through the cache check, the limiter, the
/// transport and the classifier in that order. Only `Timeout` is retried.
pub struct BybitRestClient<R: RestClient> {
    rest: R,
    settings: ConnectivitySettings,
    limiter: RateLimiter,
    cache: ResponseCache,
    stats: Arc<ApiStats>,
    audit: Option<Arc<dyn AuditSink>>,
}

pub struct BybitRestClientBuilder<R: RestClient> {
    rest: R,
    settings: ConnectivitySettings,
    clock: Arc<dyn Clock>,
    stats: Arc<ApiStats>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<R: RestClient> BybitRestClientBuilder<R> {
    pub fn with_settings(mut self, settings: ConnectivitySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share counters with another component, e.g. the WebSocket client
    pub fn with_stats(mut self, stats: Arc<ApiStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> BybitRestClient<R> {
        BybitRestClient {
            limiter: RateLimiter::new(
                self.settings.rate_limit_max_requests,
                self.settings.rate_limit_window,
                self.clock.clone(),
            ),
            cache: ResponseCache::new(self.clock),
            rest: self.rest,
            settings: self.settings,
            stats: self.stats,
            audit: self.audit,
        }
    }
}

impl<R: RestClient> BybitRestClient<R> {
    pub fn builder(rest: R) -> BybitRestClientBuilder<R> {
        BybitRestClientBuilder {
            rest,
            settings: ConnectivitySettings::default(),
            clock: Arc::new(SystemClock),
            stats: Arc::new(ApiStats::new()),
            audit: None,
        }
    }

    pub fn new(rest: R, settings: ConnectivitySettings) -> Self {
        Self::builder(rest).with_settings(settings).build()
    }

    /// Execute one logical call, retrying timeouts with linear back-off.
    #[instrument(skip(self, spec), fields(endpoint = %spec.endpoint, signed = spec.requires_signature))]
    pub async fn call(&self, spec: RequestSpec) -> Result<Value, ExchangeError> {
        let attempts = AtomicU32::new(0);
        let base = self.settings.retry_base_delay;
        let backoff = (1..=self.settings.max_retries).map(move |n| base * n);

        let result = RetryIf::spawn(
            backoff,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.attempt(&spec)
            },
            |err: &ExchangeError| {
                if err.is_retryable() {
                    warn!(
                        attempt = attempts.load(Ordering::Relaxed),
                        error = %err,
                        "Request timed out, retrying"
                    );
                }
                err.is_retryable()
            },
        )
        .await;

        let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
        result.map_err(|err| err.with_retries(retries))
    }

    async fn attempt(&self, spec: &RequestSpec) -> Result<Value, ExchangeError> {
        let key = spec
            .cacheable
            .then(|| cache_key(spec.endpoint.name(), &spec.params));
        if let Some(key) = &key {
            let ttl = spec.cache_ttl.unwrap_or(self.settings.default_cache_ttl);
            if let Some(hit) = self.cache.get(key, ttl) {
                debug!(endpoint = %spec.endpoint, "Cache hit");
                return Ok(hit);
            }
        }

        self.limiter.acquire().await;
        self.stats.record_request();

        let route = spec.endpoint.route();
        let outcome = match self
            .rest
            .request(
                spec.method.clone(),
                route.path,
                &spec.params,
                spec.requires_signature,
            )
            .await
        {
            Ok(body) => Self::unwrap_envelope(body),
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(payload) => {
                self.stats.record_success();
                if let Some(key) = key {
                    self.cache.set(key, payload.clone());
                }
                self.audit_request(spec, 0, true, None);
            }
            Err(err) => {
                self.stats.record_failure();
                if err.kind() == ErrorKind::RateLimited {
                    self.stats.record_rate_limit_hit();
                }
                self.audit_request(spec, err.code(), false, Some(err.to_string()));
            }
        }

        outcome
    }

    fn unwrap_envelope(body: Value) -> Result<Value, ExchangeError> {
        let envelope: BybitApiResponse<Value> = serde_json::from_value(body).map_err(|e| {
            ExchangeError::generic(
                TRANSPORT_ERROR_CODE,
                format!("Unexpected response shape: {}", e),
            )
        })?;

        if envelope.ret_code == 0 {
            Ok(envelope.result)
        } else {
            Err(classify_envelope(
                envelope.ret_code,
                &envelope.ret_msg,
                bybit_error_kind,
            ))
        }
    }

    fn audit_request(&self, spec: &RequestSpec, code: i64, success: bool, error: Option<String>) {
        let Some(sink) = &self.audit else {
            return;
        };
        let record = ApiRequestRecord {
            endpoint: spec.endpoint.name().to_string(),
            method: spec.method.to_string(),
            params: spec.params.clone(),
            response_code: code,
            success,
            error_message: error,
            timestamp: Utc::now(),
        };
        if let Err(e) = sink.log_api_request(&record) {
            error!(error = %e, endpoint = %spec.endpoint, "Failed to write API audit record");
        }
    }

    async fn call_typed<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, ExchangeError> {
        let payload = self.call(spec).await?;
        Ok(serde_json::from_value(payload)?)
    }

    pub async fn get_server_time(&self) -> Result<BybitServerTime, ExchangeError> {
        self.call_typed(RequestSpec::new(Endpoint::ServerTime))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_tickers(
        &self,
        category: Category,
        symbol: Option<&str>,
    ) -> Result<BybitTickerList, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::Tickers)
            .param("category", category.as_str())
            .optional_param("symbol", symbol);
        self.call_typed(spec).await
    }

    #[instrument(skip(self), fields(symbol = %query.symbol, interval = %query.interval))]
    pub async fn get_klines(&self, query: &KlineQuery) -> Result<BybitKlineList, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::Kline)
            .param("category", query.category.as_str())
            .param("symbol", query.symbol.as_str())
            .param("interval", query.interval.as_str())
            .optional_param("limit", query.limit)
            .optional_param("start", query.start)
            .optional_param("end", query.end);
        self.call_typed(spec).await
    }

    #[instrument(skip(self))]
    pub async fn get_orderbook(
        &self,
        category: Category,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<BybitOrderBook, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::Orderbook)
            .param("category", category.as_str())
            .param("symbol", symbol)
            .optional_param("limit", limit);
        self.call_typed(spec).await
    }

    pub async fn get_instruments_info(
        &self,
        category: Category,
        symbol: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::InstrumentsInfo)
            .param("category", category.as_str())
            .optional_param("symbol", symbol);
        self.call(spec).await
    }

    /// Always hits the exchange.
    #[instrument(skip(self))]
    pub async fn get_wallet_balance(
        &self,
        account_type: &str,
    ) -> Result<BybitWalletBalance, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::WalletBalance).param("accountType", account_type);
        self.call_typed(spec).await
    }

    /// Always hits the exchange.
    #[instrument(skip(self))]
    pub async fn get_positions(
        &self,
        category: Category,
        symbol: Option<&str>,
    ) -> Result<BybitPositionList, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::Positions)
            .param("category", category.as_str())
            .optional_param("symbol", symbol);
        self.call_typed(spec).await
    }

    pub async fn get_account_info(&self) -> Result<Value, ExchangeError> {
        self.call(RequestSpec::new(Endpoint::AccountInfo)).await
    }

    pub async fn get_open_orders(
        &self,
        category: Category,
        symbol: Option<&str>,
    ) -> Result<BybitOrderList, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::OpenOrders)
            .param("category", category.as_str())
            .optional_param("symbol", symbol);
        self.call_typed(spec).await
    }

    pub async fn get_order_history(
        &self,
        category: Category,
        symbol: Option<&str>,
        limit: Option<u32>,
    ) -> Result<BybitOrderList, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::OrderHistory)
            .param("category", category.as_str())
            .optional_param("symbol", symbol)
            .optional_param("limit", limit);
        self.call_typed(spec).await
    }

    pub async fn get_executions(
        &self,
        category: Category,
        symbol: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Value, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::Executions)
            .param("category", category.as_str())
            .optional_param("symbol", symbol)
            .optional_param("limit", limit);
        self.call(spec).await
    }

    #[instrument(skip(self, order), fields(symbol = %order.symbol, side = order.side.as_str()))]
    pub async fn place_order(&self, order: &OrderRequest) -> Result<BybitOrderAck, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::PlaceOrder)
            .param("category", order.category.as_str())
            .param("symbol", order.symbol.as_str())
            .param("side", order.side.as_str())
            .param("orderType", order.order_type.as_str())
            .param("qty", order.qty.as_str())
            .optional_param("price", order.price.as_deref())
            .optional_param("timeInForce", order.time_in_force.map(|tif| tif.as_str()))
            .optional_param("orderLinkId", order.order_link_id.as_deref())
            .optional_param("reduceOnly", order.reduce_only);
        self.call_typed(spec).await
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        category: Category,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<BybitOrderAck, ExchangeError> {
        let (key, value) = order.param();
        let spec = RequestSpec::new(Endpoint::CancelOrder)
            .param("category", category.as_str())
            .param("symbol", symbol)
            .param(&key, value);
        self.call_typed(spec).await
    }

    pub async fn cancel_all_orders(
        &self,
        category: Category,
        symbol: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::CancelAllOrders)
            .param("category", category.as_str())
            .optional_param("symbol", symbol);
        self.call(spec).await
    }

    #[instrument(skip(self, amend), fields(symbol = %amend.symbol))]
    pub async fn amend_order(&self, amend: &AmendRequest) -> Result<BybitOrderAck, ExchangeError> {
        let (key, value) = amend.order.param();
        let spec = RequestSpec::new(Endpoint::AmendOrder)
            .param("category", amend.category.as_str())
            .param("symbol", amend.symbol.as_str())
            .param(&key, value)
            .optional_param("qty", amend.qty.as_deref())
            .optional_param("price", amend.price.as_deref());
        self.call_typed(spec).await
    }

    pub async fn set_leverage(
        &self,
        category: Category,
        symbol: &str,
        buy_leverage: &str,
        sell_leverage: &str,
    ) -> Result<Value, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::SetLeverage)
            .param("category", category.as_str())
            .param("symbol", symbol)
            .param("buyLeverage", buy_leverage)
            .param("sellLeverage", sell_leverage);
        self.call(spec).await
    }

    pub async fn switch_margin_mode(
        &self,
        category: Category,
        symbol: &str,
        mode: MarginMode,
        leverage: &str,
    ) -> Result<Value, ExchangeError> {
        let spec = RequestSpec::new(Endpoint::SwitchMarginMode)
            .param("category", category.as_str())
            .param("symbol", symbol)
            .param("tradeMode", mode.trade_mode())
            .param("buyLeverage", leverage)
            .param("sellLeverage", leverage);
        self.call(spec).await
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    pub fn stats(&self) -> ApiStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Response cache cleared");
    }

    /// Cheap public round trip; `false` on any failure.
    pub async fn test_connection(&self) -> bool {
        match self.get_tickers(Category::Spot, Some("BTCUSDT")).await {
            Ok(_) => {
                info!("Bybit API connection OK");
                true
            }
            Err(e) => {
                warn!(error = %e, "Bybit API connection test failed");
                false
            }
        }
    }
}

impl<R: RestClient> std::fmt::Debug for BybitRestClient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitRestClient")
            .field("limiter", &self.limiter)
            .field("cache", &self.cache)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_codes() {
        assert_eq!(bybit_error_kind(10006), Some(ErrorKind::RateLimited));
        assert_eq!(bybit_error_kind(10004), Some(ErrorKind::AuthFailure));
        assert_eq!(bybit_error_kind(10001), None);
    }

    #[test]
    fn test_unwrap_envelope() {
        type Client = BybitRestClient<crate::core::kernel::ReqwestRest>;

        let ok = Client::unwrap_envelope(json!({"retCode": 0, "retMsg": "OK", "result": {"a": 1}}));
        assert_eq!(ok.unwrap(), json!({"a": 1}));

        let err = Client::unwrap_envelope(json!({"retCode": 10004, "retMsg": "error sign!"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);

        let err = Client::unwrap_envelope(json!({"retCode": 10016, "retMsg": "Too many visits!"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = Client::unwrap_envelope(json!({"retCode": 170131, "retMsg": "Insufficient balance."}))
            .unwrap_err();
        assert_eq!(
            err,
            ExchangeError::GenericApiFailure {
                code: 170131,
                message: "Insufficient balance.".to_string()
            }
        );

        let err = Client::unwrap_envelope(json!(["not", "an", "envelope"])).unwrap_err();
        assert_eq!(err.code(), TRANSPORT_ERROR_CODE);
    }
}
