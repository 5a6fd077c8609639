use crate::core::audit::{AuditSink, MarketDataRecord};
use crate::core::stats::StreamStats;
use crate::exchanges::bybit::topics::{data_type_of, symbol_of};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// One data frame as received on a topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferedMessage {
    pub topic: String,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

pub type MessageHandler = Arc<dyn Fn(&BufferedMessage) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Routes data frames to per-topic handlers and bounded ring buffers.
pub struct MessageDispatcher {
    handlers: RwLock<HashMap<String, Vec<(HandlerId, MessageHandler)>>>,
    buffers: Mutex<HashMap<String, VecDeque<Arc<BufferedMessage>>>>,
    capacity: usize,
    next_id: AtomicU64,
    stats: Arc<StreamStats>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl MessageDispatcher {
    pub fn new(capacity: usize, stats: Arc<StreamStats>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            stats,
            audit: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn add_handler<F>(&self, topic: &str, handler: F) -> HandlerId
    where
        F: Fn(&BufferedMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns `true` if the handler was registered for the topic.
    pub fn remove_handler(&self, topic: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(topic);
        }
        removed
    }

    /// Buffer the frame, then run every handler for its topic in order.
    pub fn dispatch(&self, topic: &str, payload: Value) {
        let message = Arc::new(BufferedMessage {
            topic: topic.to_string(),
            received_at: Utc::now(),
            payload,
        });

        self.buffer(message.clone());
        self.audit(&message);

        // Clone out so handlers can register or remove handlers themselves
        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .get(topic)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&message))) {
                Ok(Ok(())) => self.stats.record_processed(),
                Ok(Err(e)) => {
                    self.stats.record_handler_error();
                    error!(topic = %topic, error = %e, "Message handler failed");
                }
                Err(_) => {
                    self.stats.record_handler_error();
                    error!(topic = %topic, "Message handler panicked");
                }
            }
        }
    }

    fn buffer(&self, message: Arc<BufferedMessage>) {
        let mut buffers = self.buffers.lock();
        let ring = buffers
            .entry(message.topic.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(message);
    }

    fn audit(&self, message: &BufferedMessage) {
        let Some(sink) = &self.audit else {
            return;
        };
        let record = MarketDataRecord {
            symbol: symbol_of(&message.topic).to_string(),
            data_type: data_type_of(&message.topic).to_string(),
            raw_payload: message.payload.clone(),
            source: "websocket",
            timestamp: message.received_at,
        };
        if let Err(e) = sink.log_market_data(&record) {
            warn!(topic = %message.topic, error = %e, "Failed to write market data audit record");
        }
    }

    /// Newest `count` messages for the topic, oldest first.
    pub fn latest(&self, topic: &str, count: usize) -> Vec<Arc<BufferedMessage>> {
        self.buffers
            .lock()
            .get(topic)
            .map(|ring| {
                let skip = ring.len().saturating_sub(count);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn clear_buffers(&self) {
        self.buffers.lock().clear();
    }

    pub fn buffer_sizes(&self) -> BTreeMap<String, usize> {
        self.buffers
            .lock()
            .iter()
            .map(|(topic, ring)| (topic.clone(), ring.len()))
            .collect()
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("capacity", &self.capacity)
            .field("topics", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}
