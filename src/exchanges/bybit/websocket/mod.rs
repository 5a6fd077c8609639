pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod registry;

pub use client::{BybitWebSocketClient, BybitWebSocketClientBuilder, WebSocketStats};
pub use connection::{ConnectionCommand, ConnectionManager, ConnectionState, SharedContext};
pub use dispatcher::{BufferedMessage, HandlerId, MessageDispatcher, MessageHandler};
pub use registry::{ChannelScope, SubscriptionRegistry};
