use crate::core::errors::ExchangeError;
use crate::core::kernel::WsCodec;
use serde::Serialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// A decoded frame from a Bybit V5 stream
#[derive(Debug, Clone, PartialEq)]
pub enum BybitWsFrame {
    Pong,
    Auth {
        success: bool,
        ret_msg: String,
    },
    Subscription {
        op: String,
        success: bool,
        ret_msg: String,
    },
    Data {
        topic: String,
        payload: Value,
    },
    /// Well-formed JSON that is neither a control frame nor topic data
    Unknown(Value),
    /// Text that could not be parsed at all
    Invalid {
        raw: String,
        reason: String,
    },
}

impl BybitWsFrame {
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Pong | Self::Auth { .. } | Self::Subscription { .. }
        )
    }
}

#[derive(Debug, Serialize)]
struct BybitRequest<'a> {
    op: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
}

/// Bybit WebSocket codec implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct BybitCodec;

impl BybitCodec {
    fn encode(op: &str, args: Vec<Value>) -> Result<Message, ExchangeError> {
        let json_str = serde_json::to_string(&BybitRequest { op, args })?;
        Ok(Message::Text(json_str))
    }

    fn encode_topics(op: &str, topics: &[String]) -> Result<Message, ExchangeError> {
        Self::encode(op, topics.iter().map(|t| Value::from(t.as_str())).collect())
    }

    /// `{"op":"auth","args":[api_key, expires, signature]}`
    pub fn encode_auth(
        &self,
        api_key: &str,
        expires_ms: u64,
        signature: &str,
    ) -> Result<Message, ExchangeError> {
        Self::encode(
            "auth",
            vec![
                Value::from(api_key),
                Value::from(expires_ms),
                Value::from(signature),
            ],
        )
    }

    /// Application-level heartbeat
    pub fn encode_ping(&self) -> Result<Message, ExchangeError> {
        Self::encode("ping", Vec::new())
    }

    fn decode_text(text: &str) -> BybitWsFrame {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                return BybitWsFrame::Invalid {
                    raw: text.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
        let ret_msg = value
            .get("ret_msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(op) = value.get("op").and_then(Value::as_str) {
            return match op {
                "pong" => BybitWsFrame::Pong,
                // Spot echoes the ping op with ret_msg "pong"
                "ping" if ret_msg == "pong" => BybitWsFrame::Pong,
                "auth" => BybitWsFrame::Auth { success, ret_msg },
                "subscribe" | "unsubscribe" => BybitWsFrame::Subscription {
                    op: op.to_string(),
                    success,
                    ret_msg,
                },
                _ => BybitWsFrame::Unknown(value),
            };
        }

        if let Some(topic) = value.get("topic").and_then(Value::as_str) {
            return BybitWsFrame::Data {
                topic: topic.to_string(),
                payload: value.clone(),
            };
        }

        BybitWsFrame::Unknown(value)
    }
}

impl WsCodec for BybitCodec {
    type Message = BybitWsFrame;

    fn encode_subscription(&self, topics: &[String]) -> Result<Message, ExchangeError> {
        Self::encode_topics("subscribe", topics)
    }

    fn encode_unsubscription(&self, topics: &[String]) -> Result<Message, ExchangeError> {
        Self::encode_topics("unsubscribe", topics)
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        match message {
            Message::Text(text) => Ok(Some(Self::decode_text(&text))),
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => Ok(Some(Self::decode_text(text))),
                // Bybit only sends text frames
                Err(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }
}
