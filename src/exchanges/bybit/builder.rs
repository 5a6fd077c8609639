use crate::core::config::{ConnectivitySettings, ExchangeConfig};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig, TungsteniteWs};
use crate::core::stats::ApiStats;
use crate::exchanges::bybit::codec::BybitCodec;
use crate::exchanges::bybit::rest::BybitRestClient;
use crate::exchanges::bybit::signer::BybitSigner;
use crate::exchanges::bybit::websocket::BybitWebSocketClient;
use std::sync::Arc;

const EXCHANGE_NAME: &str = "bybit";

pub fn rest_base_url(config: &ExchangeConfig) -> String {
    config.base_url.clone().unwrap_or_else(|| {
        if config.testnet {
            "https://api-testnet.bybit.com".to_string()
        } else {
            "https://api.bybit.com".to_string()
        }
    })
}

pub fn public_ws_url(testnet: bool) -> &'static str {
    if testnet {
        "wss://stream-testnet.bybit.com/v5/public/spot"
    } else {
        "wss://stream.bybit.com/v5/public/spot"
    }
}

pub fn private_ws_url(testnet: bool) -> &'static str {
    if testnet {
        "wss://stream-testnet.bybit.com/v5/private"
    } else {
        "wss://stream.bybit.com/v5/private"
    }
}

fn signer_for(config: &ExchangeConfig) -> Option<Arc<BybitSigner>> {
    config.has_credentials().then(|| {
        Arc::new(BybitSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
        ))
    })
}

fn ws_session(url: &str, settings: &ConnectivitySettings) -> TungsteniteWs<BybitCodec> {
    TungsteniteWs::new(url.to_string(), EXCHANGE_NAME.to_string(), BybitCodec)
        .with_connect_timeout(settings.connect_timeout)
}

/// Create the REST client; signed endpoints need credentials in `config`.
pub fn build_rest_client(
    config: &ExchangeConfig,
    settings: ConnectivitySettings,
) -> Result<BybitRestClient<ReqwestRest>, ExchangeError> {
    build_rest_client_with_stats(config, settings, Arc::new(ApiStats::new()))
}

fn build_rest_client_with_stats(
    config: &ExchangeConfig,
    settings: ConnectivitySettings,
    stats: Arc<ApiStats>,
) -> Result<BybitRestClient<ReqwestRest>, ExchangeError> {
    let rest_config = RestClientConfig::new(rest_base_url(config), EXCHANGE_NAME.to_string())
        .with_timeout(settings.request_timeout);

    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(signer) = signer_for(config) {
        rest_builder = rest_builder.with_signer(signer);
    }

    let rest = rest_builder.build()?;
    Ok(BybitRestClient::builder(rest)
        .with_settings(settings)
        .with_stats(stats)
        .build())
}

/// Create the WebSocket client. The private scope is enabled only when
/// `config` carries credentials.
pub fn build_websocket_client(
    config: &ExchangeConfig,
    settings: ConnectivitySettings,
) -> BybitWebSocketClient<TungsteniteWs<BybitCodec>> {
    build_websocket_client_with_stats(config, settings, Arc::new(ApiStats::new()))
}

fn build_websocket_client_with_stats(
    config: &ExchangeConfig,
    settings: ConnectivitySettings,
    stats: Arc<ApiStats>,
) -> BybitWebSocketClient<TungsteniteWs<BybitCodec>> {
    let mut builder =
        BybitWebSocketClient::builder(ws_session(public_ws_url(config.testnet), &settings));
    if let Some(signer) = signer_for(config) {
        builder = builder.with_private(ws_session(private_ws_url(config.testnet), &settings), signer);
    }
    builder.with_settings(settings).with_stats(stats).build()
}

/// REST and WebSocket clients sharing one set of API counters.
pub fn build_clients(
    config: &ExchangeConfig,
    settings: ConnectivitySettings,
) -> Result<
    (
        BybitRestClient<ReqwestRest>,
        BybitWebSocketClient<TungsteniteWs<BybitCodec>>,
    ),
    ExchangeError,
> {
    let stats = Arc::new(ApiStats::new());
    let rest = build_rest_client_with_stats(config, settings.clone(), stats.clone())?;
    let ws = build_websocket_client_with_stats(config, settings, stats);
    Ok((rest, ws))
}
