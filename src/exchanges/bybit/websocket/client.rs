use crate::core::audit::AuditSink;
use crate::core::config::ConnectivitySettings;
use crate::core::errors::ExchangeError;
use crate::core::kernel::WsSession;
use crate::core::stats::{ApiStats, ApiStatsSnapshot, StreamStats, StreamStatsSnapshot};
use crate::exchanges::bybit::codec::BybitCodec;
use crate::exchanges::bybit::signer::BybitSigner;
use crate::exchanges::bybit::topics;
use crate::exchanges::bybit::websocket::connection::{
    ConnectionCommand, ConnectionManager, ConnectionState, SharedContext,
};
use crate::exchanges::bybit::websocket::dispatcher::{BufferedMessage, HandlerId, MessageDispatcher};
use crate::exchanges::bybit::websocket::registry::{ChannelScope, SubscriptionRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebSocketStats {
    pub api: ApiStatsSnapshot,
    pub stream: StreamStatsSnapshot,
    pub public_state: ConnectionState,
    /// `None` when no credentials are configured
    pub private_state: Option<ConnectionState>,
    pub public_subscriptions: Vec<String>,
    pub private_subscriptions: Vec<String>,
    pub buffer_sizes: BTreeMap<String, usize>,
}

/// Per-scope worker bookkeeping
struct ScopeSlot<S> {
    scope: ChannelScope,
    state: Arc<watch::Sender<ConnectionState>>,
    running: watch::Sender<bool>,
    commands: Mutex<Option<mpsc::UnboundedSender<ConnectionCommand>>>,
    session: Mutex<Option<S>>,
    worker: Mutex<Option<JoinHandle<S>>>,
    signer: Option<Arc<BybitSigner>>,
}

impl<S> ScopeSlot<S> {
    fn new(scope: ChannelScope, session: S, signer: Option<Arc<BybitSigner>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (running, _) = watch::channel(false);
        Self {
            scope,
            state: Arc::new(state),
            running,
            commands: Mutex::new(None),
            session: Mutex::new(Some(session)),
            worker: Mutex::new(None),
            signer,
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Forward a command only while the socket is live; otherwise replay covers it.
    fn notify(&self, command: ConnectionCommand) {
        if self.current_state() != ConnectionState::Active {
            return;
        }
        if let Some(commands) = self.commands.lock().as_ref() {
            if commands.send(command).is_err() {
                debug!(scope = %self.scope, "Worker gone; command dropped");
            }
        }
    }
}

pub struct BybitWebSocketClientBuilder<S> {
    public: S,
    private: Option<(S, Arc<BybitSigner>)>,
    settings: ConnectivitySettings,
    api_stats: Arc<ApiStats>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<S: WsSession<BybitCodec> + 'static> BybitWebSocketClientBuilder<S> {
    /// Enable the private scope
    pub fn with_private(mut self, session: S, signer: Arc<BybitSigner>) -> Self {
        self.private = Some((session, signer));
        self
    }

    pub fn with_settings(mut self, settings: ConnectivitySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share counters with the REST client
    pub fn with_stats(mut self, stats: Arc<ApiStats>) -> Self {
        self.api_stats = stats;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> BybitWebSocketClient<S> {
        let stream_stats = Arc::new(StreamStats::new());
        let mut dispatcher =
            MessageDispatcher::new(self.settings.buffer_capacity, stream_stats.clone());
        if let Some(sink) = self.audit {
            dispatcher = dispatcher.with_audit_sink(sink);
        }

        BybitWebSocketClient {
            public: ScopeSlot::new(ChannelScope::Public, self.public, None),
            private: self.private.map(|(session, signer)| {
                ScopeSlot::new(ChannelScope::Private, session, Some(signer))
            }),
            ctx: SharedContext {
                registry: Arc::new(SubscriptionRegistry::new()),
                dispatcher: Arc::new(dispatcher),
                api_stats: self.api_stats,
                stream_stats,
                settings: self.settings,
            },
        }
    }
}

/// Self-healing Bybit V5 WebSocket client with one worker per scope.
///
/// Subscriptions are durable: they are recorded immediately and replayed on
/// every successful connect, whether made before `start`, while connected or
/// during a reconnect.
pub struct BybitWebSocketClient<S: WsSession<BybitCodec> + 'static> {
    public: ScopeSlot<S>,
    private: Option<ScopeSlot<S>>,
    ctx: SharedContext,
}

impl<S: WsSession<BybitCodec> + 'static> BybitWebSocketClient<S> {
    pub fn builder(public: S) -> BybitWebSocketClientBuilder<S> {
        BybitWebSocketClientBuilder {
            public,
            private: None,
            settings: ConnectivitySettings::default(),
            api_stats: Arc::new(ApiStats::new()),
            audit: None,
        }
    }

    fn slots(&self) -> impl Iterator<Item = &ScopeSlot<S>> {
        std::iter::once(&self.public).chain(self.private.as_ref())
    }

    fn slot(&self, scope: ChannelScope) -> Result<&ScopeSlot<S>, ExchangeError> {
        match scope {
            ChannelScope::Public => Ok(&self.public),
            ChannelScope::Private => self.private.as_ref().ok_or_else(|| {
                ExchangeError::AuthFailure(
                    "Private stream requires API credentials".to_string(),
                )
            }),
        }
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(&self) {
        for slot in self.slots() {
            self.start_slot(slot);
        }
    }

    fn start_slot(&self, slot: &ScopeSlot<S>) {
        let mut worker = slot.worker.lock();
        if worker.is_some() {
            warn!(scope = %slot.scope, "WebSocket worker already running");
            return;
        }
        let Some(session) = slot.session.lock().take() else {
            warn!(scope = %slot.scope, "No session available to start");
            return;
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        *slot.commands.lock() = Some(commands_tx);
        slot.running.send_replace(true);

        let mut manager = ConnectionManager::new(
            slot.scope,
            session,
            self.ctx.clone(),
            slot.state.clone(),
            slot.running.subscribe(),
            commands_rx,
        );
        if let Some(signer) = &slot.signer {
            manager = manager.with_signer(signer.clone());
        }

        *worker = Some(tokio::spawn(manager.run()));
        info!(scope = %slot.scope, "WebSocket worker started");
    }

    /// Stop both workers and wait for them to close their sockets.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        for slot in self.slots() {
            slot.running.send_replace(false);
            *slot.commands.lock() = None;

            let worker = slot.worker.lock().take();
            let Some(worker) = worker else {
                continue;
            };
            match worker.await {
                Ok(session) => *slot.session.lock() = Some(session),
                Err(e) => {
                    error!(scope = %slot.scope, error = %e, "WebSocket worker failed");
                    slot.state.send_replace(ConnectionState::Disconnected);
                }
            }
        }
        info!("WebSocket client stopped");
    }

    /// Record the topic and, if the scope is live, subscribe right away.
    pub fn subscribe(&self, scope: ChannelScope, topic: &str) -> Result<(), ExchangeError> {
        let slot = self.slot(scope)?;
        if self.ctx.registry.add(scope, topic) {
            info!(scope = %scope, topic = %topic, "Subscribed");
            slot.notify(ConnectionCommand::Subscribe(topic.to_string()));
        } else {
            debug!(scope = %scope, topic = %topic, "Already subscribed");
        }
        Ok(())
    }

    pub fn unsubscribe(&self, scope: ChannelScope, topic: &str) -> Result<(), ExchangeError> {
        let slot = self.slot(scope)?;
        if self.ctx.registry.remove(scope, topic) {
            info!(scope = %scope, topic = %topic, "Unsubscribed");
            slot.notify(ConnectionCommand::Unsubscribe(topic.to_string()));
        }
        Ok(())
    }

    pub fn add_handler<F>(&self, topic: &str, handler: F) -> HandlerId
    where
        F: Fn(&BufferedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.ctx.dispatcher.add_handler(topic, handler)
    }

    pub fn remove_handler(&self, topic: &str, id: HandlerId) -> bool {
        self.ctx.dispatcher.remove_handler(topic, id)
    }

    pub fn get_latest(&self, topic: &str, count: usize) -> Vec<Arc<BufferedMessage>> {
        self.ctx.dispatcher.latest(topic, count)
    }

    pub fn clear_buffers(&self) {
        self.ctx.dispatcher.clear_buffers();
    }

    /// `Disconnected` for a scope that is not configured.
    pub fn state(&self, scope: ChannelScope) -> ConnectionState {
        self.slot(scope)
            .map_or(ConnectionState::Disconnected, ScopeSlot::current_state)
    }

    /// Watch a scope's state transitions.
    pub fn state_changes(
        &self,
        scope: ChannelScope,
    ) -> Result<watch::Receiver<ConnectionState>, ExchangeError> {
        Ok(self.slot(scope)?.state.subscribe())
    }

    pub fn is_connected(&self, scope: ChannelScope) -> bool {
        self.state(scope) == ConnectionState::Active
    }

    pub fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            api: self.ctx.api_stats.snapshot(),
            stream: self.ctx.stream_stats.snapshot(),
            public_state: self.public.current_state(),
            private_state: self.private.as_ref().map(ScopeSlot::current_state),
            public_subscriptions: self.ctx.registry.topics(ChannelScope::Public),
            private_subscriptions: self.ctx.registry.topics(ChannelScope::Private),
            buffer_sizes: self.ctx.dispatcher.buffer_sizes(),
        }
    }

    pub fn subscribe_orderbook(&self, symbol: &str, depth: u32) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Public, &topics::orderbook(depth, symbol))
    }

    pub fn subscribe_trades(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Public, &topics::public_trade(symbol))
    }

    pub fn subscribe_klines(&self, symbol: &str, interval: &str) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Public, &topics::kline(interval, symbol))
    }

    pub fn subscribe_tickers(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Public, &topics::tickers(symbol))
    }

    pub fn subscribe_orders(&self) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Private, topics::ORDER)
    }

    pub fn subscribe_executions(&self) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Private, topics::EXECUTION)
    }

    pub fn subscribe_positions(&self) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Private, topics::POSITION)
    }

    pub fn subscribe_wallet(&self) -> Result<(), ExchangeError> {
        self.subscribe(ChannelScope::Private, topics::WALLET)
    }
}

impl<S: WsSession<BybitCodec> + 'static> std::fmt::Debug for BybitWebSocketClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitWebSocketClient")
            .field("public_state", &self.public.current_state())
            .field(
                "private_state",
                &self.private.as_ref().map(ScopeSlot::current_state),
            )
            .field("dispatcher", &self.ctx.dispatcher)
            .finish_non_exhaustive()
    }
}
