#![allow(dead_code)]

use async_trait::async_trait;
use bybit_link::core::audit::{ApiRequestRecord, AuditSink, MarketDataRecord};
use bybit_link::core::config::ConnectivitySettings;
use bybit_link::core::errors::{ExchangeError, TRANSPORT_ERROR_CODE};
use bybit_link::core::kernel::{RestClient, WsSession};
use bybit_link::exchanges::bybit::BybitCodec;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// Wrap a result payload in a successful Bybit envelope
pub fn ok_envelope(result: Value) -> Value {
    json!({ "retCode": 0, "retMsg": "OK", "result": result, "time": 1_700_000_000_000_i64 })
}

pub fn error_envelope(code: i64, message: &str) -> Value {
    json!({ "retCode": code, "retMsg": message, "result": {} })
}

pub fn ticker_result(symbol: &str, last_price: &str) -> Value {
    json!({
        "category": "spot",
        "list": [{ "symbol": symbol, "lastPrice": last_price }]
    })
}

pub fn wallet_result() -> Value {
    json!({
        "list": [{
            "accountType": "UNIFIED",
            "totalEquity": "1000",
            "coin": [{ "coin": "USDT", "walletBalance": "1000" }]
        }]
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, Value)>,
    pub authenticated: bool,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

#[derive(Default)]
struct MockRestInner {
    responses: Mutex<VecDeque<Result<Value, ExchangeError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Scripted REST transport. Replies are consumed in order; an empty script
/// answers with an empty successful envelope.
#[derive(Clone, Default)]
pub struct MockRest {
    inner: Arc<MockRestInner>,
}

impl MockRest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, result: Value) -> &Self {
        self.push(Ok(ok_envelope(result)))
    }

    pub fn push(&self, response: Result<Value, ExchangeError>) -> &Self {
        self.inner.responses.lock().push_back(response);
        self
    }

    pub fn push_timeouts(&self, count: usize) -> &Self {
        for _ in 0..count {
            self.push(Err(ExchangeError::timeout("operation timed out")));
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }
}

#[async_trait]
impl RestClient for MockRest {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, Value)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.inner.calls.lock().push(RecordedCall {
            method,
            endpoint: endpoint.to_string(),
            params: params.to_vec(),
            authenticated,
        });
        self.inner
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ok_envelope(json!({}))))
    }
}

#[derive(Default)]
struct ServerState {
    /// Text frames sent by the client, one list per successful connect
    connections: Vec<Vec<String>>,
    inbound: Option<mpsc::UnboundedSender<String>>,
    connect_failures: usize,
    auth_reply: Option<bool>,
}

/// The exchange side of a [`MockWs`] session.
#[derive(Default)]
pub struct MockServer {
    state: Mutex<ServerState>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every `auth` op with the given outcome
    pub fn reply_to_auth(&self, success: bool) {
        self.state.lock().auth_reply = Some(success);
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().connect_failures = count;
    }

    /// Deliver a text frame on the live connection; `false` if there is none.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.state
            .lock()
            .inbound
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    pub fn push_data(&self, topic: &str, data: Value) -> bool {
        self.push(json!({ "topic": topic, "type": "snapshot", "ts": 1, "data": data }).to_string())
    }

    /// Simulate the exchange closing the socket.
    pub fn drop_connection(&self) {
        self.state.lock().inbound = None;
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn sent(&self, connection: usize) -> Vec<Value> {
        self.state
            .lock()
            .connections
            .get(connection)
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(|frame| serde_json::from_str(frame).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topics carried by `op` frames on the given connection, in send order.
    pub fn topics_sent(&self, connection: usize, op: &str) -> Vec<String> {
        self.sent(connection)
            .iter()
            .filter(|frame| frame["op"] == op)
            .filter_map(|frame| frame["args"].as_array().cloned())
            .flatten()
            .filter_map(|topic| topic.as_str().map(str::to_string))
            .collect()
    }

    fn accept(&self) -> Result<mpsc::UnboundedReceiver<String>, ExchangeError> {
        let mut state = self.state.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ExchangeError::generic(
                TRANSPORT_ERROR_CODE,
                "connection refused",
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        state.connections.push(Vec::new());
        Ok(rx)
    }

    fn record(&self, text: &str) {
        let mut state = self.state.lock();
        if let Some(frames) = state.connections.last_mut() {
            frames.push(text.to_string());
        }

        let is_auth = serde_json::from_str::<Value>(text)
            .is_ok_and(|frame| frame["op"] == "auth");
        if let (true, Some(success)) = (is_auth, state.auth_reply) {
            let reply = json!({ "op": "auth", "success": success, "ret_msg": "" }).to_string();
            if let Some(tx) = &state.inbound {
                let _ = tx.send(reply);
            }
        }
    }
}

/// In-memory WebSocket session backed by a [`MockServer`].
pub struct MockWs {
    server: Arc<MockServer>,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    codec: BybitCodec,
}

impl MockWs {
    pub fn new(server: Arc<MockServer>) -> Self {
        Self {
            server,
            inbound: None,
            codec: BybitCodec,
        }
    }
}

#[async_trait]
impl WsSession<BybitCodec> for MockWs {
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        self.inbound = Some(self.server.accept()?);
        Ok(())
    }

    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        if self.inbound.is_none() {
            return Err(ExchangeError::generic(
                TRANSPORT_ERROR_CODE,
                "WebSocket not connected",
            ));
        }
        if let Message::Text(text) = msg {
            self.server.record(&text);
        }
        Ok(())
    }

    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        let inbound = self.inbound.as_mut()?;
        match inbound.recv().await {
            Some(text) => Some(Ok(Message::Text(text))),
            None => {
                self.inbound = None;
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.inbound = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inbound.is_some()
    }

    fn codec(&self) -> &BybitCodec {
        &self.codec
    }
}

/// Audit sink that always fails
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    pub attempts: Mutex<usize>,
}

impl AuditSink for FailingAuditSink {
    fn log_api_request(&self, _record: &ApiRequestRecord) -> anyhow::Result<()> {
        *self.attempts.lock() += 1;
        anyhow::bail!("audit store unavailable")
    }

    fn log_market_data(&self, _record: &MarketDataRecord) -> anyhow::Result<()> {
        *self.attempts.lock() += 1;
        anyhow::bail!("audit store unavailable")
    }
}

/// Audit sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    pub requests: Mutex<Vec<ApiRequestRecord>>,
    pub market_data: Mutex<Vec<MarketDataRecord>>,
}

impl AuditSink for RecordingAuditSink {
    fn log_api_request(&self, record: &ApiRequestRecord) -> anyhow::Result<()> {
        self.requests.lock().push(record.clone());
        Ok(())
    }

    fn log_market_data(&self, record: &MarketDataRecord) -> anyhow::Result<()> {
        self.market_data.lock().push(record.clone());
        Ok(())
    }
}

/// Fast reconnects, no heartbeats during a test
pub fn ws_test_settings() -> ConnectivitySettings {
    ConnectivitySettings::default()
        .with_reconnect_delay(Duration::from_millis(20))
        .with_ping_interval(Duration::from_secs(3600))
        .with_auth_response_timeout(Duration::from_millis(500))
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
