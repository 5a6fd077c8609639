use serde::{Deserialize, Serialize};
use serde_json::Value;

/// V5 response envelope
#[derive(Debug, Deserialize)]
pub struct BybitApiResponse<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spot,
    Linear,
    Inverse,
    Option,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Linear => "linear",
            Self::Inverse => "inverse",
            Self::Option => "option",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "Market",
            Self::Limit => "Limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTillCancel,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
    PostOnly,
}

impl TimeInForce {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoodTillCancel => "GTC",
            Self::ImmediateOrCancel => "IOC",
            Self::FillOrKill => "FOK",
            Self::PostOnly => "PostOnly",
        }
    }
}

/// `tradeMode` for switching between cross and isolated margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    Cross,
    Isolated,
}

impl MarginMode {
    pub const fn trade_mode(self) -> i64 {
        match self {
            Self::Cross => 0,
            Self::Isolated => 1,
        }
    }
}

/// Identifies an order either by exchange id or by client link id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(String),
    LinkId(String),
}

impl OrderRef {
    pub(crate) fn param(&self) -> (String, Value) {
        match self {
            Self::Id(id) => ("orderId".to_string(), Value::from(id.as_str())),
            Self::LinkId(id) => ("orderLinkId".to_string(), Value::from(id.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub category: Category,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: String,
    pub price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub order_link_id: Option<String>,
    pub reduce_only: Option<bool>,
}

impl OrderRequest {
    pub fn market(category: Category, symbol: &str, side: Side, qty: &str) -> Self {
        Self {
            category,
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            qty: qty.to_string(),
            price: None,
            time_in_force: None,
            order_link_id: None,
            reduce_only: None,
        }
    }

    pub fn limit(category: Category, symbol: &str, side: Side, qty: &str, price: &str) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price.to_string()),
            time_in_force: Some(TimeInForce::GoodTillCancel),
            ..Self::market(category, symbol, side, qty)
        }
    }

    #[must_use]
    pub fn with_link_id(mut self, link_id: &str) -> Self {
        self.order_link_id = Some(link_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmendRequest {
    pub category: Category,
    pub symbol: String,
    pub order: OrderRef,
    pub qty: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineQuery {
    pub category: Category,
    pub symbol: String,
    /// Bybit interval code: 1 3 5 15 30 60 120 240 360 720 D W M
    pub interval: String,
    pub limit: Option<u32>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl KlineQuery {
    pub fn new(category: Category, symbol: &str, interval: &str) -> Self {
        Self {
            category,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            limit: None,
            start: None,
            end: None,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitServerTime {
    pub time_second: String,
    pub time_nano: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BybitTickerList {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub list: Vec<BybitTicker>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTicker {
    pub symbol: String,
    pub last_price: String,
    #[serde(default)]
    pub bid1_price: String,
    #[serde(default)]
    pub ask1_price: String,
    #[serde(default)]
    pub high_price24h: String,
    #[serde(default)]
    pub low_price24h: String,
    #[serde(default)]
    pub volume24h: String,
    #[serde(default)]
    pub turnover24h: String,
    #[serde(default)]
    pub price24h_pcnt: String,
}

/// Rows are `[startTime, open, high, low, close, volume, turnover]`, newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BybitKlineList {
    #[serde(default)]
    pub category: String,
    pub symbol: String,
    pub list: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BybitOrderBook {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "u")]
    pub update_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BybitWalletBalance {
    #[serde(default)]
    pub list: Vec<BybitAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitAccount {
    pub account_type: String,
    #[serde(default)]
    pub total_equity: String,
    #[serde(default)]
    pub total_wallet_balance: String,
    #[serde(default)]
    pub total_available_balance: String,
    #[serde(default)]
    pub coin: Vec<BybitCoinBalance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitCoinBalance {
    pub coin: String,
    #[serde(default)]
    pub wallet_balance: String,
    #[serde(default)]
    pub equity: String,
    #[serde(default)]
    pub locked: String,
    #[serde(default)]
    pub unrealised_pnl: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitPositionList {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub list: Vec<BybitPosition>,
    #[serde(default)]
    pub next_page_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitPosition {
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub position_value: String,
    #[serde(default)]
    pub leverage: String,
    #[serde(default)]
    pub mark_price: String,
    #[serde(default)]
    pub unrealised_pnl: String,
    #[serde(default)]
    pub trade_mode: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderList {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub list: Vec<BybitOrder>,
    #[serde(default)]
    pub next_page_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrder {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    #[serde(default)]
    pub price: String,
    pub qty: String,
    pub order_status: String,
    #[serde(default)]
    pub cum_exec_qty: String,
    #[serde(default)]
    pub created_time: String,
}

/// Acknowledgement returned by create, cancel and amend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderAck {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_without_result() {
        let envelope: BybitApiResponse<Value> =
            serde_json::from_value(json!({"retCode": 10003, "retMsg": "API key is invalid."}))
                .unwrap();
        assert_eq!(envelope.ret_code, 10003);
        assert_eq!(envelope.result, Value::Null);
    }

    #[test]
    fn test_ticker_list() {
        let list: BybitTickerList = serde_json::from_value(json!({
            "category": "spot",
            "list": [{
                "symbol": "BTCUSDT",
                "lastPrice": "43000.5",
                "bid1Price": "43000.4",
                "ask1Price": "43000.6",
                "highPrice24h": "44000",
                "lowPrice24h": "42000",
                "volume24h": "1234.5",
                "turnover24h": "53000000",
                "price24hPcnt": "0.012"
            }]
        }))
        .unwrap();
        assert_eq!(list.list[0].symbol, "BTCUSDT");
        assert_eq!(list.list[0].last_price, "43000.5");
        assert_eq!(list.list[0].price24h_pcnt, "0.012");
    }

    #[test]
    fn test_orderbook_short_keys() {
        let book: BybitOrderBook = serde_json::from_value(json!({
            "s": "BTCUSDT",
            "b": [["43000", "1.5"]],
            "a": [["43001", "0.2"]],
            "ts": 1_700_000_000_000_i64,
            "u": 18
        }))
        .unwrap();
        assert_eq!(book.bids[0][0], "43000");
        assert_eq!(book.asks[0][1], "0.2");
        assert_eq!(book.update_id, 18);
    }

    #[test]
    fn test_limit_order_defaults() {
        let order = OrderRequest::limit(Category::Spot, "BTCUSDT", Side::Buy, "0.01", "40000")
            .with_link_id("my-1");
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.time_in_force, Some(TimeInForce::GoodTillCancel));
        assert_eq!(order.order_link_id.as_deref(), Some("my-1"));
    }
}
