pub mod core;
pub mod exchanges;

pub use crate::core::{
    config::{ConnectivitySettings, ExchangeConfig},
    errors::{ErrorKind, ExchangeError},
};
pub use exchanges::bybit::{BybitRestClient, BybitWebSocketClient, ChannelScope};
