//! Write-only audit trail for REST calls and streamed market data.
//!
//! The sink is an external collaborator (a database, a file, a log shipper).
//! Every write is best effort: callers log a failed write and carry on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// One REST call, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct ApiRequestRecord {
    pub endpoint: String,
    pub method: String,
    pub params: Vec<(String, Value)>,
    pub response_code: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One data frame received on a WebSocket topic.
#[derive(Debug, Clone, Serialize)]
pub struct MarketDataRecord {
    pub symbol: String,
    pub data_type: String,
    pub raw_payload: Value,
    pub source: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn log_api_request(&self, record: &ApiRequestRecord) -> anyhow::Result<()>;

    fn log_market_data(&self, record: &MarketDataRecord) -> anyhow::Result<()>;
}

/// Emits records as structured tracing events under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_api_request(&self, record: &ApiRequestRecord) -> anyhow::Result<()> {
        info!(
            target: "audit",
            endpoint = %record.endpoint,
            method = %record.method,
            response_code = record.response_code,
            success = record.success,
            error = record.error_message.as_deref().unwrap_or(""),
            "api request"
        );
        Ok(())
    }

    fn log_market_data(&self, record: &MarketDataRecord) -> anyhow::Result<()> {
        info!(
            target: "audit",
            symbol = %record.symbol,
            data_type = %record.data_type,
            source = record.source,
            "market data"
        );
        Ok(())
    }
}
