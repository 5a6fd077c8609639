pub mod builder;
pub mod codec;
pub mod endpoints;
pub mod rest;
pub mod signer;
pub mod topics;
pub mod types;
pub mod websocket;

// Re-export main types for easier importing
pub use builder::{build_clients, build_rest_client, build_websocket_client};
pub use codec::{BybitCodec, BybitWsFrame};
pub use endpoints::{CachePolicy, Endpoint, RequestSpec, Route};
pub use rest::BybitRestClient;
pub use signer::BybitSigner;
pub use types::{
    AmendRequest, Category, KlineQuery, MarginMode, OrderRef, OrderRequest, OrderType, Side,
    TimeInForce,
};
pub use websocket::{BybitWebSocketClient, ChannelScope, ConnectionState, WebSocketStats};
