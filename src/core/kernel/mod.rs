/// Kernel - exchange-agnostic transport layer
///
/// Everything here is free of exchange specifics: HTTP and WebSocket
/// transports, request signing, message codecs, and the admission, caching
/// and classification machinery the REST pipeline is composed from.
///
/// ## Transport
/// - `RestClient` / `ReqwestRest`: one HTTP round trip, failures classified
/// - `WsSession` / `TungsteniteWs`: one reconnectable WebSocket session
///
/// ## Authentication
/// - `Signer`: pluggable request signing
///
/// ## Message Handling
/// - `WsCodec`: exchange-specific frame encoding/decoding
///
/// ## REST pipeline building blocks
/// - `RateLimiter`: sliding-window admission control
/// - `ResponseCache`: TTL store for idempotent reads
/// - `classifier`: maps failures onto `ErrorKind`
///
/// ```rust,no_run
/// use bybit_link::core::kernel::*;
/// use bybit_link::exchanges::bybit::signer::BybitSigner;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let rest_config = RestClientConfig::new(
///     "https://api.bybit.com".to_string(),
///     "bybit".to_string(),
/// );
/// let signer = Arc::new(BybitSigner::new("key".to_string(), "secret".to_string()));
/// let rest = RestClientBuilder::new(rest_config)
///     .with_signer(signer)
///     .build()?;
/// # let _ = rest;
/// # Ok(())
/// # }
/// ```
pub mod cache;
pub mod classifier;
pub mod codec;
pub mod rate_limiter;
pub mod rest;
pub mod signer;
pub mod ws;

pub use cache::{cache_key, ResponseCache};
pub use codec::WsCodec;
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{SignatureResult, Signer};
pub use ws::{TungsteniteWs, WsSession};
