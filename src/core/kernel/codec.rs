use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for exchange-specific WebSocket message encoding/decoding
///
/// Converts between raw WebSocket messages and the exchange's typed frames.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send + Sync;

    /// Encode a subscription request for the given topics
    fn encode_subscription(&self, topics: &[String]) -> Result<Message, ExchangeError>;

    /// Encode an unsubscription request for the given topics
    fn encode_unsubscription(&self, topics: &[String]) -> Result<Message, ExchangeError>;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// Transport control frames (ping, pong, close) never reach the codec.
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored by the codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}
