use crate::core::errors::{ExchangeError, TRANSPORT_ERROR_CODE};
use crate::core::kernel::codec::WsCodec;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn network_error(message: impl Into<String>) -> ExchangeError {
    ExchangeError::generic(TRANSPORT_ERROR_CODE, message)
}

/// WebSocket session trait - pure transport layer
///
/// A session can be connected, closed and connected again any number of
/// times; reconnection policy lives with the caller.
#[async_trait]
pub trait WsSession<C: WsCodec>: Send + Sync {
    /// Open a fresh connection, dropping any previous one
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    /// Send a raw message
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError>;

    /// Receive the next raw message; `None` once the connection is gone
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ExchangeError>;

    /// Check if the connection is alive
    fn is_connected(&self) -> bool;

    fn codec(&self) -> &C;

    /// Subscribe to topics using the codec
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), ExchangeError> {
        if topics.is_empty() {
            return Ok(());
        }
        let message = self.codec().encode_subscription(topics)?;
        self.send_raw(message).await
    }

    /// Unsubscribe from topics using the codec
    async fn unsubscribe(&mut self, topics: &[String]) -> Result<(), ExchangeError> {
        if topics.is_empty() {
            return Ok(());
        }
        let message = self.codec().encode_unsubscription(topics)?;
        self.send_raw(message).await
    }

    /// Get the next decoded message; `None` once the connection is gone
    async fn next_message(&mut self) -> Option<Result<C::Message, ExchangeError>> {
        loop {
            match self.next_raw().await? {
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(raw_msg) => match self.codec().decode_message(raw_msg) {
                    Ok(Some(decoded)) => return Some(Ok(decoded)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Tungstenite-based WebSocket session
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    write: Option<SplitSink<WsStream, Message>>,
    read: Option<SplitStream<WsStream>>,
    connected: bool,
    exchange_name: String,
    codec: C,
    connect_timeout: Duration,
}

impl<C: WsCodec> TungsteniteWs<C> {
    /// Create a new WebSocket session with the specified codec
    ///
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to
    /// * `exchange_name` - Name of the exchange for logging/tracing
    /// * `codec` - The codec to handle message encoding/decoding
    pub fn new(url: String, exchange_name: String, codec: C) -> Self {
        Self {
            url,
            write: None,
            read: None,
            connected: false,
            exchange_name,
            codec,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    #[instrument(skip(self), fields(exchange = %self.exchange_name, url = %self.url))]
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        self.write = None;
        self.read = None;
        self.connected = false;

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| ExchangeError::timeout("WebSocket connection timeout"))?
            .map_err(|e| network_error(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;
        Ok(())
    }

    #[instrument(skip(self, msg), fields(exchange = %self.exchange_name))]
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        if !self.connected {
            return Err(network_error("WebSocket not connected"));
        }

        let write = self
            .write
            .as_mut()
            .ok_or_else(|| network_error("WebSocket write stream not available"))?;

        if let Err(e) = write.send(msg).await {
            self.connected = false;
            return Err(network_error(format!(
                "Failed to send WebSocket message: {}",
                e
            )));
        }
        Ok(())
    }

    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        loop {
            if !self.connected {
                return None;
            }
            let read = self.read.as_mut()?;

            match read.next().await {
                Some(Ok(Message::Ping(data))) => {
                    // Auto-respond to pings at transport level
                    if let Err(e) = self.send_raw(Message::Pong(data)).await {
                        warn!("Failed to send pong response: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(message)) => {
                    if matches!(message, Message::Close(_)) {
                        self.connected = false;
                    }
                    return Some(Ok(message));
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(network_error(format!("WebSocket error: {}", e))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    async fn close(&mut self) -> Result<(), ExchangeError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn codec(&self) -> &C {
        &self.codec
    }
}
