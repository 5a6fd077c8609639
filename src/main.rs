use bybit_link::core::config::{ConnectivitySettings, ExchangeConfig};
use bybit_link::exchanges::bybit::{build_clients, Category};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SYMBOL: &str = "BTCUSDT";

fn load_config() -> ExchangeConfig {
    #[cfg(feature = "env-file")]
    let loaded = ExchangeConfig::from_env_file("BYBIT");
    #[cfg(not(feature = "env-file"))]
    let loaded = ExchangeConfig::from_env("BYBIT");

    loaded.unwrap_or_else(|e| {
        warn!(error = %e, "No credentials found, using read-only testnet config");
        ExchangeConfig::read_only().testnet(true)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config();
    let settings = ConnectivitySettings::from_env("BYBIT")?;

    let (rest, ws) = build_clients(&config, settings)?;

    println!("Fetching {} ticker...", SYMBOL);
    match rest.get_tickers(Category::Spot, Some(SYMBOL)).await {
        Ok(tickers) => {
            for ticker in &tickers.list {
                println!(
                    "{}: last {} bid {} ask {}",
                    ticker.symbol, ticker.last_price, ticker.bid1_price, ticker.ask1_price
                );
            }
        }
        Err(e) => println!("Error fetching ticker: {} ({})", e, e.kind()),
    }

    ws.add_handler(&format!("tickers.{}", SYMBOL), |message| {
        let data = &message.payload["data"];
        info!(
            topic = %message.topic,
            last_price = %data["lastPrice"],
            "Ticker update"
        );
        Ok(())
    });
    ws.subscribe_tickers(SYMBOL)?;
    ws.start();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let stats = ws.get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("Rate limit: {:?}", rest.rate_limit_status());

    ws.stop().await;
    Ok(())
}
