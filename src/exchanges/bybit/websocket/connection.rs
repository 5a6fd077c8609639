use crate::core::config::ConnectivitySettings;
use crate::core::errors::{ExchangeError, TRANSPORT_ERROR_CODE};
use crate::core::kernel::signer::timestamp_millis;
use crate::core::kernel::WsSession;
use crate::core::stats::{ApiStats, StreamStats};
use crate::exchanges::bybit::codec::{BybitCodec, BybitWsFrame};
use crate::exchanges::bybit::signer::BybitSigner;
use crate::exchanges::bybit::websocket::dispatcher::MessageDispatcher;
use crate::exchanges::bybit::websocket::registry::{ChannelScope, SubscriptionRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Topics per subscribe frame during resubscription replay
pub const RESUBSCRIBE_CHUNK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Private scope only
    Authenticating,
    Active,
    ReconnectPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// State shared by both scopes' workers.
#[derive(Debug, Clone)]
pub struct SharedContext {
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub api_stats: Arc<ApiStats>,
    pub stream_stats: Arc<StreamStats>,
    pub settings: ConnectivitySettings,
}

enum ReadEvent {
    Stop,
    Command(ConnectionCommand),
    Ping,
    Frame(Option<Result<BybitWsFrame, ExchangeError>>),
}

/// Resolves once the running flag is cleared or its sender is gone.
async fn stopped(running: &mut watch::Receiver<bool>) {
    while *running.borrow_and_update() {
        if running.changed().await.is_err() {
            return;
        }
    }
}

/// Drives one scope's socket: connect, authenticate, replay, read, reconnect.
///
/// The manager owns its session for as long as it runs and hands it back
/// from [`ConnectionManager::run`] once stopped.
pub struct ConnectionManager<S: WsSession<BybitCodec>> {
    scope: ChannelScope,
    session: S,
    signer: Option<Arc<BybitSigner>>,
    ctx: SharedContext,
    state: Arc<watch::Sender<ConnectionState>>,
    running: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl<S: WsSession<BybitCodec> + 'static> ConnectionManager<S> {
    pub fn new(
        scope: ChannelScope,
        session: S,
        ctx: SharedContext,
        state: Arc<watch::Sender<ConnectionState>>,
        running: watch::Receiver<bool>,
        commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            scope,
            session,
            signer: None,
            ctx,
            state,
            running,
            commands,
        }
    }

    /// Credentials for the `auth` op; required for the private scope.
    pub fn with_signer(mut self, signer: Arc<BybitSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    fn is_running(&self) -> bool {
        *self.running.borrow() && self.running.has_changed().is_ok()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(scope = %self.scope, from = ?previous, to = ?state, "Connection state changed");
        }
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn run(mut self) -> S {
        while self.is_running() {
            self.set_state(ConnectionState::Connecting);

            match self.connect_and_read().await {
                Ok(()) => debug!("Read phase ended"),
                Err(e) => {
                    self.ctx.stream_stats.record_connection_error();
                    warn!(error = %e, "WebSocket connection failed");
                }
            }

            if let Err(e) = self.session.close().await {
                debug!(error = %e, "Error while closing socket");
            }
            if !self.is_running() {
                break;
            }

            self.set_state(ConnectionState::ReconnectPending);
            let delay = self.ctx.settings.reconnect_delay;
            let resumed = tokio::select! {
                () = tokio::time::sleep(delay) => true,
                () = stopped(&mut self.running) => false,
            };
            if !resumed {
                break;
            }
            self.ctx.api_stats.record_reconnection();
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Connection manager stopped");
        self.session
    }

    async fn connect_and_read(&mut self) -> Result<(), ExchangeError> {
        let connected = tokio::select! {
            result = self.session.connect() => Some(result),
            () = stopped(&mut self.running) => None,
        };
        let Some(result) = connected else {
            return Ok(());
        };
        result?;
        info!("WebSocket connected");

        if self.scope == ChannelScope::Private {
            self.set_state(ConnectionState::Authenticating);
            if !self.authenticate().await? {
                return Ok(());
            }
        }

        // Queued commands are superseded by the replay below
        while self.commands.try_recv().is_ok() {}
        self.set_state(ConnectionState::Active);
        self.resubscribe().await?;
        self.read_loop().await
    }

    /// `Ok(false)` when stopped while waiting for the response.
    async fn authenticate(&mut self) -> Result<bool, ExchangeError> {
        let signer = self.signer.clone().ok_or_else(|| {
            ExchangeError::AuthFailure("Private stream requires API credentials".to_string())
        })?;

        let expires = timestamp_millis() + self.ctx.settings.auth_expiry.as_millis() as u64;
        let signature = signer.websocket_signature(expires)?;
        let frame = self
            .session
            .codec()
            .encode_auth(signer.api_key(), expires, &signature)?;
        self.session.send_raw(frame).await?;

        let timeout = self.ctx.settings.auth_response_timeout;
        let response = tokio::select! {
            response = tokio::time::timeout(timeout, self.session.next_message()) => Some(response),
            () = stopped(&mut self.running) => None,
        };
        let Some(response) = response else {
            return Ok(false);
        };

        match response {
            Err(_) => Err(ExchangeError::AuthFailure(format!(
                "No auth response within {:?}",
                timeout
            ))),
            Ok(None) => Err(ExchangeError::generic(
                TRANSPORT_ERROR_CODE,
                "Connection closed during authentication",
            )),
            Ok(Some(Err(e))) => Err(e),
            Ok(Some(Ok(frame))) => {
                self.ctx.stream_stats.record_received();
                match frame {
                    BybitWsFrame::Auth { success: true, .. } => {
                        info!("WebSocket authenticated");
                        Ok(true)
                    }
                    BybitWsFrame::Auth { ret_msg, .. } => Err(ExchangeError::AuthFailure(
                        format!("Authentication rejected: {}", ret_msg),
                    )),
                    other => Err(ExchangeError::AuthFailure(format!(
                        "Expected auth response, got {:?}",
                        other
                    ))),
                }
            }
        }
    }

    async fn resubscribe(&mut self) -> Result<(), ExchangeError> {
        let topics = self.ctx.registry.topics(self.scope);
        if topics.is_empty() {
            return Ok(());
        }
        for chunk in topics.chunks(RESUBSCRIBE_CHUNK) {
            self.session.subscribe(chunk).await?;
        }
        info!(topics = topics.len(), "Resubscribed");
        Ok(())
    }

    async fn read_loop(&mut self) -> Result<(), ExchangeError> {
        let period = self.ctx.settings.ping_interval.max(Duration::from_millis(1));
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                () = stopped(&mut self.running) => ReadEvent::Stop,
                Some(command) = self.commands.recv() => ReadEvent::Command(command),
                _ = ping.tick() => ReadEvent::Ping,
                frame = self.session.next_message() => ReadEvent::Frame(frame),
            };

            match event {
                ReadEvent::Stop => return Ok(()),
                ReadEvent::Command(command) => self.apply(command).await?,
                ReadEvent::Ping => {
                    let frame = self.session.codec().encode_ping()?;
                    self.session.send_raw(frame).await?;
                }
                ReadEvent::Frame(None) => {
                    info!("WebSocket closed by remote");
                    return Ok(());
                }
                ReadEvent::Frame(Some(Err(e))) => return Err(e),
                ReadEvent::Frame(Some(Ok(frame))) => self.handle_frame(frame),
            }
        }
    }

    async fn apply(&mut self, command: ConnectionCommand) -> Result<(), ExchangeError> {
        match command {
            ConnectionCommand::Subscribe(topic) => {
                // Skip if removed again before we got here
                if self.ctx.registry.contains(self.scope, &topic) {
                    self.session.subscribe(&[topic]).await?;
                }
            }
            ConnectionCommand::Unsubscribe(topic) => {
                if !self.ctx.registry.contains(self.scope, &topic) {
                    self.session.unsubscribe(&[topic]).await?;
                }
            }
        }
        Ok(())
    }

    fn handle_frame(&self, frame: BybitWsFrame) {
        self.ctx.stream_stats.record_received();

        if frame.is_control() {
            log_control(&frame);
            return;
        }
        match frame {
            BybitWsFrame::Data { topic, payload } => self.ctx.dispatcher.dispatch(&topic, payload),
            BybitWsFrame::Invalid { raw, reason } => {
                self.ctx.stream_stats.record_decode_error();
                warn!(reason = %reason, raw = %raw, "Undecodable frame");
            }
            other => debug!(frame = ?other, "Unhandled frame"),
        }
    }
}

/// Acks and pongs are only logged; they never reach handlers.
fn log_control(frame: &BybitWsFrame) {
    match frame {
        BybitWsFrame::Pong => debug!("Pong"),
        BybitWsFrame::Auth { success, ret_msg } => {
            debug!(success, ret_msg = %ret_msg, "Auth ack");
        }
        BybitWsFrame::Subscription {
            op,
            success,
            ret_msg,
        } => {
            if *success {
                debug!(op = %op, "Subscription ack");
            } else {
                warn!(op = %op, ret_msg = %ret_msg, "Subscription request rejected");
            }
        }
        _ => {}
    }
}
