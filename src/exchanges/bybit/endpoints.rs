//! Lookup table from logical operation to concrete V5 route.
//!
//! Adding an endpoint means adding one variant and one row in [`Endpoint::route`].

use crate::core::errors::{ExchangeError, TRANSPORT_ERROR_CODE};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Live state; never served from cache.
    Never,
    /// Cached for the client's configured default TTL.
    DefaultTtl,
    Ttl(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub signed: bool,
    pub cache: CachePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ServerTime,
    Tickers,
    Kline,
    Orderbook,
    InstrumentsInfo,
    WalletBalance,
    Positions,
    AccountInfo,
    OpenOrders,
    OrderHistory,
    Executions,
    PlaceOrder,
    CancelOrder,
    CancelAllOrders,
    AmendOrder,
    SetLeverage,
    SwitchMarginMode,
}

impl Endpoint {
    pub const ALL: [Self; 17] = [
        Self::ServerTime,
        Self::Tickers,
        Self::Kline,
        Self::Orderbook,
        Self::InstrumentsInfo,
        Self::WalletBalance,
        Self::Positions,
        Self::AccountInfo,
        Self::OpenOrders,
        Self::OrderHistory,
        Self::Executions,
        Self::PlaceOrder,
        Self::CancelOrder,
        Self::CancelAllOrders,
        Self::AmendOrder,
        Self::SetLeverage,
        Self::SwitchMarginMode,
    ];

    pub fn route(self) -> Route {
        use CachePolicy::{DefaultTtl, Never, Ttl};

        let (method, path, signed, cache) = match self {
            Self::ServerTime => (Method::GET, "/v5/market/time", false, Never),
            Self::Tickers => (Method::GET, "/v5/market/tickers", false, DefaultTtl),
            Self::Kline => (Method::GET, "/v5/market/kline", false, DefaultTtl),
            Self::Orderbook => (Method::GET, "/v5/market/orderbook", false, DefaultTtl),
            Self::InstrumentsInfo => {
                (Method::GET, "/v5/market/instruments-info", false, DefaultTtl)
            }
            Self::WalletBalance => (Method::GET, "/v5/account/wallet-balance", true, Never),
            Self::Positions => (Method::GET, "/v5/position/list", true, Never),
            Self::AccountInfo => (
                Method::GET,
                "/v5/account/info",
                true,
                Ttl(Duration::from_secs(60)),
            ),
            Self::OpenOrders => (Method::GET, "/v5/order/realtime", true, Never),
            Self::OrderHistory => (Method::GET, "/v5/order/history", true, Never),
            Self::Executions => (Method::GET, "/v5/execution/list", true, Never),
            Self::PlaceOrder => (Method::POST, "/v5/order/create", true, Never),
            Self::CancelOrder => (Method::POST, "/v5/order/cancel", true, Never),
            Self::CancelAllOrders => (Method::POST, "/v5/order/cancel-all", true, Never),
            Self::AmendOrder => (Method::POST, "/v5/order/amend", true, Never),
            Self::SetLeverage => (Method::POST, "/v5/position/set-leverage", true, Never),
            Self::SwitchMarginMode => {
                (Method::POST, "/v5/position/switch-isolated", true, Never)
            }
        };

        Route {
            method,
            path,
            signed,
            cache,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::ServerTime => "get_server_time",
            Self::Tickers => "get_tickers",
            Self::Kline => "get_kline",
            Self::Orderbook => "get_orderbook",
            Self::InstrumentsInfo => "get_instruments_info",
            Self::WalletBalance => "get_wallet_balance",
            Self::Positions => "get_positions",
            Self::AccountInfo => "get_account_info",
            Self::OpenOrders => "get_open_orders",
            Self::OrderHistory => "get_order_history",
            Self::Executions => "get_executions",
            Self::PlaceOrder => "place_order",
            Self::CancelOrder => "cancel_order",
            Self::CancelAllOrders => "cancel_all_orders",
            Self::AmendOrder => "amend_order",
            Self::SetLeverage => "set_leverage",
            Self::SwitchMarginMode => "switch_margin_mode",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|endpoint| endpoint.name() == s)
            .ok_or_else(|| {
                ExchangeError::generic(TRANSPORT_ERROR_CODE, format!("Unknown endpoint: {}", s))
            })
    }
}

/// One REST call, built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub endpoint: Endpoint,
    pub params: Vec<(String, Value)>,
    pub requires_signature: bool,
    pub cacheable: bool,
    /// `None` means the client's default TTL.
    pub cache_ttl: Option<Duration>,
}

impl RequestSpec {
    pub fn new(endpoint: Endpoint) -> Self {
        let route = endpoint.route();
        let (cacheable, cache_ttl) = match route.cache {
            CachePolicy::Never => (false, None),
            CachePolicy::DefaultTtl => (true, None),
            CachePolicy::Ttl(ttl) => (true, Some(ttl)),
        };

        Self {
            method: route.method,
            endpoint,
            params: Vec::new(),
            requires_signature: route.signed,
            cacheable,
            cache_ttl,
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn optional_param<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Override the TTL. Ignored for endpoints that are never cached.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        if self.cacheable {
            self.cache_ttl = Some(ttl);
        }
        self
    }
}
