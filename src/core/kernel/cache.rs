use crate::core::clock::Clock;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry {
    payload: Value,
    stored_at: Instant,
}

/// TTL-keyed store for idempotent read responses.
///
/// The TTL is supplied on each read; stale entries are dropped by the read
/// that finds them.
pub struct ResponseCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        let mut entries = self.entries.lock();
        let now = self.clock.now();

        let fresh = entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.stored_at) < ttl)?;
        if fresh {
            entries.get(key).map(|entry| entry.payload.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn set(&self, key: String, payload: Value) {
        let stored_at = self.clock.now();
        self.entries
            .lock()
            .insert(key, CacheEntry { payload, stored_at });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Deterministic key over an endpoint name and its parameters, in any order.
pub fn cache_key(endpoint: &str, params: &[(String, Value)]) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, render_param(v)))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(b"?");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a parameter value the way it appears on the wire.
pub fn render_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use serde_json::json;

    #[test]
    fn test_ttl_boundary() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::new(clock.clone());
        let ttl = Duration::from_secs(5);

        cache.set("k".to_string(), json!("v"));
        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get("k", ttl), Some(json!("v")));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get("k", ttl), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_at_exact_ttl_is_stale() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::new(clock.clone());

        cache.set("k".to_string(), json!(1));
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("k", Duration::from_secs(5)), None);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(Arc::new(ManualClock::new()));
        cache.set("a".to_string(), json!(1));
        cache.set("b".to_string(), json!(2));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert_eq!(cache.get("a", Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_ignores_param_order() {
        let a = vec![
            ("symbol".to_string(), json!("BTCUSDT")),
            ("category".to_string(), json!("spot")),
        ];
        let b = vec![
            ("category".to_string(), json!("spot")),
            ("symbol".to_string(), json!("BTCUSDT")),
        ];
        assert_eq!(cache_key("get_tickers", &a), cache_key("get_tickers", &b));
        assert_ne!(cache_key("get_tickers", &a), cache_key("get_kline", &a));
    }
}
