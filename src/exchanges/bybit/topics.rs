//! Topic names for the V5 public and private streams.

pub const ORDER: &str = "order";
pub const EXECUTION: &str = "execution";
pub const POSITION: &str = "position";
pub const WALLET: &str = "wallet";

pub fn orderbook(depth: u32, symbol: &str) -> String {
    format!("orderbook.{}.{}", depth, symbol)
}

pub fn public_trade(symbol: &str) -> String {
    format!("publicTrade.{}", symbol)
}

pub fn kline(interval: &str, symbol: &str) -> String {
    format!("kline.{}.{}", interval, symbol)
}

pub fn tickers(symbol: &str) -> String {
    format!("tickers.{}", symbol)
}

/// Last dotted segment; the whole topic for bare private names.
pub fn symbol_of(topic: &str) -> &str {
    topic.rsplit('.').next().unwrap_or(topic)
}

pub fn data_type_of(topic: &str) -> &'static str {
    match topic.split('.').next() {
        Some("orderbook") => "orderbook",
        Some("publicTrade") => "trade",
        Some("kline") => "kline",
        Some("tickers") => "ticker",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders() {
        assert_eq!(orderbook(50, "BTCUSDT"), "orderbook.50.BTCUSDT");
        assert_eq!(public_trade("ETHUSDT"), "publicTrade.ETHUSDT");
        assert_eq!(kline("60", "BTCUSDT"), "kline.60.BTCUSDT");
        assert_eq!(tickers("BTCUSDT"), "tickers.BTCUSDT");
    }

    #[test]
    fn test_symbol_and_data_type() {
        assert_eq!(symbol_of("kline.1h.BTCUSDT"), "BTCUSDT");
        assert_eq!(symbol_of(WALLET), "wallet");
        assert_eq!(data_type_of("publicTrade.BTCUSDT"), "trade");
        assert_eq!(data_type_of("tickers.BTCUSDT"), "ticker");
        assert_eq!(data_type_of(ORDER), "unknown");
    }
}
